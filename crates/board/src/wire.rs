//! W3C WebDriver JSON wire types.
//!
//! Only the subset of the protocol this crate actually speaks. Every
//! response body is a `{"value": ...}` envelope; element references use
//! the fixed web-element identifier key from the standard.

use serde::Deserialize;

/// Web-element identifier key, fixed by the WebDriver standard.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// The `{"value": ...}` envelope wrapping every WebDriver response.
#[derive(Debug, Deserialize)]
pub struct ValueEnvelope<T> {
    pub value: T,
}

/// Payload of a failed WebDriver command.
#[derive(Debug, Deserialize)]
pub struct WireError {
    pub error: String,
    pub message: String,
}

/// `POST /session` response value.
#[derive(Debug, Deserialize)]
pub struct NewSessionValue {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// An element reference as returned by find commands.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementRef {
    #[serde(rename = "element-6066-11e4-a52e-4f735466cecf")]
    pub id: String,
}

/// Locator strategy for find commands.
#[derive(Debug, Clone, Copy)]
pub enum Locator {
    Css,
}

impl Locator {
    pub fn using(self) -> &'static str {
        match self {
            Self::Css => "css selector",
        }
    }
}
