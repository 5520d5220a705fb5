//! Placeholder segmentation for composed bodies.
//!
//! A body is plain text interleaved with `{{image_k}}` tokens. The
//! engine composes the document strictly in source order: text segments
//! are appended as-is and each token becomes an upload of the k-th
//! supplied image. Document order wins over numeric order: a body of
//! `{{image_2}} .. {{image_1}}` places image 2 first.

use std::sync::OnceLock;

use regex::Regex;

use crate::failure::FailureKind;

/// One ordered piece of the composed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text to append to the editor.
    Text(String),
    /// Zero-based index into the payload's ordered image list.
    Image(usize),
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{image_(\d+)\}\}").expect("placeholder regex is valid"))
}

/// Split a body into ordered text/image segments.
///
/// Empty and whitespace-only text runs between adjacent tokens are
/// dropped; image indices are converted from the 1-based token form to
/// zero-based list indices. Tokens with an index of `0` are not valid
/// placeholders and are left in the text untouched.
pub fn split_body(body: &str) -> Vec<Segment> {
    let re = token_regex();
    let mut segments = Vec::new();
    let mut last_end = 0;

    for caps in re.captures_iter(body) {
        let m = caps.get(0).expect("capture 0 always present");
        let index: usize = match caps[1].parse::<usize>() {
            Ok(k) if k >= 1 => k - 1,
            _ => continue, // `{{image_0}}` or overflow: treat as literal text
        };

        let text = &body[last_end..m.start()];
        if !text.trim().is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }
        segments.push(Segment::Image(index));
        last_end = m.end();
    }

    let tail = &body[last_end..];
    if !tail.trim().is_empty() {
        segments.push(Segment::Text(tail.to_string()));
    }

    segments
}

/// Validate that tokens and supplied images line up both ways.
///
/// Fails with [`FailureKind::MissingPlaceholder`] when a token references
/// an image index with no file, or a supplied image has no token. Runs
/// before any browser session is started so broken input never costs an
/// attempt.
pub fn validate_placeholders(body: &str, image_count: usize) -> Result<(), PlaceholderError> {
    let mut referenced = vec![false; image_count];

    for segment in split_body(body) {
        if let Segment::Image(index) = segment {
            match referenced.get_mut(index) {
                Some(seen) => *seen = true,
                None => {
                    return Err(PlaceholderError {
                        kind: FailureKind::MissingPlaceholder,
                        message: format!(
                            "token {{{{image_{}}}}} has no corresponding image (got {image_count})",
                            index + 1
                        ),
                    })
                }
            }
        }
    }

    if let Some(orphan) = referenced.iter().position(|seen| !seen) {
        return Err(PlaceholderError {
            kind: FailureKind::MissingPlaceholder,
            message: format!("image {} is never referenced by a placeholder", orphan + 1),
        });
    }

    Ok(())
}

/// A token/image mismatch detected before any automation ran.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct PlaceholderError {
    /// Always [`FailureKind::MissingPlaceholder`].
    pub kind: FailureKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                Segment::Image(_) => None,
            })
            .collect()
    }

    #[test]
    fn interleaves_text_and_images_in_source_order() {
        let segments = split_body("Hello {{image_1}} World {{image_2}}!");
        assert_eq!(
            segments,
            vec![
                Segment::Text("Hello ".into()),
                Segment::Image(0),
                Segment::Text(" World ".into()),
                Segment::Image(1),
                Segment::Text("!".into()),
            ]
        );
    }

    #[test]
    fn document_order_wins_over_numeric_order() {
        let segments = split_body("a {{image_2}} b {{image_1}} c");
        let images: Vec<usize> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Image(i) => Some(*i),
                _ => None,
            })
            .collect();
        // Image 2 appears first because its token appears first.
        assert_eq!(images, vec![1, 0]);
        assert_eq!(texts(&segments), vec!["a ", " b ", " c"]);
    }

    #[test]
    fn adjacent_tokens_produce_no_empty_text_segments() {
        let segments = split_body("{{image_1}}{{image_2}}");
        assert_eq!(segments, vec![Segment::Image(0), Segment::Image(1)]);
    }

    #[test]
    fn body_without_tokens_is_one_text_segment() {
        let segments = split_body("just words");
        assert_eq!(segments, vec![Segment::Text("just words".into())]);
    }

    #[test]
    fn image_zero_token_is_left_as_text() {
        let segments = split_body("before {{image_0}} after");
        assert_eq!(
            segments,
            vec![Segment::Text("before {{image_0}} after".into())]
        );
    }

    #[test]
    fn each_image_appears_exactly_once() {
        let body = "x {{image_3}} y {{image_1}} z {{image_2}} w";
        let segments = split_body(body);
        let mut images: Vec<usize> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Image(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(images, vec![2, 0, 1]);
        images.sort_unstable();
        images.dedup();
        assert_eq!(images.len(), 3);
    }

    #[test]
    fn validate_accepts_matching_tokens_and_images() {
        assert!(validate_placeholders("a {{image_1}} b {{image_2}}", 2).is_ok());
    }

    #[test]
    fn validate_rejects_token_without_image() {
        let err = validate_placeholders("a {{image_3}}", 2).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingPlaceholder);
        assert!(err.message.contains("image_3"));
    }

    #[test]
    fn validate_rejects_image_without_token() {
        let err = validate_placeholders("a {{image_1}}", 2).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingPlaceholder);
        assert!(err.message.contains("image 2"));
    }

    #[test]
    fn validate_accepts_plain_text_with_no_images() {
        assert!(validate_placeholders("no tokens here", 0).is_ok());
    }
}
