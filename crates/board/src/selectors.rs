//! CSS selector tables for the SALON BOARD pages.
//!
//! Centralized so a CMS markup change is a one-file fix. Several flows
//! carry fallback selectors because the login markup differs between
//! the main form and its legacy variant.

/// Login page.
pub mod login {
    pub const USER_INPUTS: &[&str] = &[
        "input[name='userId']",
        "input[name='login_id']",
        "input[type='text']",
    ];
    pub const PASSWORD_INPUTS: &[&str] = &[
        "#jsiPwInput",
        "input[name='password']",
        "input[type='password']",
    ];
    pub const SUBMIT_BUTTONS: &[&str] = &[
        "#idPasswordInputForm > div > div > a",
        "a.common-CNCcommon__primaryBtn.loginBtnSize",
        "button[type='submit']",
    ];
    /// Any of these present means the session is authenticated.
    pub const SUCCESS_MARKERS: &[&str] = &["#globalNavi", "#biyouStoreInfoArea", "a[href*='logout']"];
    /// Explicit login failure messages.
    pub const ERROR_MARKERS: &[&str] = &["#errMsg", "div.errorMessage", "p.error", ".loginError"];
    /// Secondary image-authentication challenge shown on suspicious logins.
    pub const CAPTCHA_MARKERS: &[&str] = &[
        "div.capy-captcha",
        "#avatar_image",
        "input[name='capy_captchakey']",
        "div#capy-captcha-caption",
    ];
}

/// Overlay widgets that intercept clicks and must be hidden.
pub const BLOCKERS: &[&str] = &[
    ".karte-widget__container",
    "[class*='_reception-Skin']",
    "[class*='_reception-MinimumWidget']",
    "[id^='karte-']",
];

/// Robot / CAPTCHA challenge markers checked after every navigation.
pub const ROBOT_MARKERS: &[&str] = &[
    "iframe[src*='recaptcha']",
    "div.g-recaptcha",
    "img[alt*='認証']",
    "form[action*='auth']",
];

/// Navigation between sections.
pub mod nav {
    /// Salon chooser table, present only for multi-salon accounts.
    pub const SALON_TABLE: &str = "#biyouStoreInfoArea";
    pub const PUBLISH_MANAGE: &str =
        "#globalNavi > ul.common-CLPcommon__globalNavi > li:nth-child(2) > a";
    pub const BLOG_MENU: &str = "#cmsForm > div > div > ul > li:nth-child(9) > a";
    pub const NEW_POST_BUTTON: &str = "#newPosts";
}

/// Blog post form.
pub mod form {
    pub const STYLIST: &str = "select#stylistId";
    pub const CATEGORY: &str = "select#blogCategoryCd";
    pub const TITLE: &str = "input#blogTitle";
    pub const EDITOR_DIV: &str = "div.nicEdit-main[contenteditable='true']";
    pub const EDITOR_TEXTAREA: &str = "textarea#blogContents";
}

/// Image upload modal.
pub mod image {
    pub const TRIGGER_BUTTON: &str = "a#upload";
    pub const MODAL: &str = "div.imageUploaderModal";
    pub const FILE_INPUT: &str = "input#sendFile";
    pub const THUMBNAIL: &str = "img.imageUploaderModalThumbnail";
    /// Only matches once the modal enables submission.
    pub const SUBMIT_BUTTON: &str = "input.imageUploaderModalSubmitButton.isActive";
}

/// Coupon attachment modal.
pub mod coupon {
    pub const TRIGGER_BUTTON: &str = "a.jsc_SB_modal_trigger";
    pub const MODAL: &str = "div#couponWrap";
    pub const LABELS: &str = "div#couponWrap label";
    pub const SETTING_BUTTON: &str = "a.jsc_SB_modal_setting_btn";
}

/// Form-level actions.
pub mod actions {
    pub const CONFIRM_BUTTON: &str = "a#confirm";
    pub const REFLECT_BUTTON: &str = "a#reflect";
}

/// Completion page.
pub mod complete {
    /// Back-to-list affordance rendered only on the completion page.
    pub const LIST_AFFORDANCES: &[&str] = &["a#back", "a[href*='blogList']"];
}
