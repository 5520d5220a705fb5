//! Pure decision logic for post-submit verification.
//!
//! Publication is only ever reported as success on positive evidence
//! from the completion page. Absence of an error is NOT success.

/// Success phrases rendered on the completion page. The first entry is
/// the canonical message; the rest cover historical wording variants.
const SUCCESS_PHRASES: &[&str] = &[
    "ブログの登録が完了しました",
    "ブログ登録が完了しました",
    "ブログの登録が完了いたしました",
    "投稿しました",
    "公開しました",
];

/// URL fragments identifying the completion page.
const COMPLETION_URL_MARKERS: &[&str] = &["/clp/bt/blog/blog/complete", "/blog/complete"];

/// URL fragments identifying the pre-submit confirmation page. Seeing
/// these after submit means the post did NOT go through.
const CONFIRM_URL_MARKERS: &[&str] = &["/clp/bt/blog/blog/confirm", "/blog/confirm"];

/// Whether the page text carries a success phrase. Also checks with
/// whitespace stripped, since the CMS sometimes splits characters
/// across spans.
pub fn contains_success_text(page_text: &str) -> bool {
    if SUCCESS_PHRASES.iter().any(|phrase| page_text.contains(phrase)) {
        return true;
    }
    let normalized: String = page_text.split_whitespace().collect();
    SUCCESS_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

/// Decide whether an observed post-submit page state proves successful
/// publication.
///
/// Success requires either:
/// - a success phrase, on any page that is not the confirmation page, or
/// - the back-to-list affordance on the completion page itself.
pub fn completion_decision(url: &str, page_text: &str, has_list_affordance: bool) -> bool {
    let url_lower = url.to_lowercase();
    let on_completion_page = COMPLETION_URL_MARKERS
        .iter()
        .any(|marker| url_lower.contains(marker));
    let on_confirm_page = CONFIRM_URL_MARKERS
        .iter()
        .any(|marker| url_lower.contains(marker));

    if contains_success_text(page_text) && (on_completion_page || !on_confirm_page) {
        return true;
    }
    has_list_affordance && on_completion_page
}

/// First robot-challenge marker with a non-zero match count, if any.
pub fn matched_robot_marker<'a>(
    counts: impl IntoIterator<Item = (&'a str, usize)>,
) -> Option<&'a str> {
    counts
        .into_iter()
        .find_map(|(selector, count)| (count > 0).then_some(selector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_phrase_on_completion_page() {
        assert!(completion_decision(
            "https://salonboard.com/CLP/bt/blog/blog/complete/",
            "ブログの登録が完了しました。",
            false,
        ));
    }

    #[test]
    fn success_phrase_on_unknown_page_counts() {
        assert!(completion_decision(
            "https://salonboard.com/CLP/bt/blog/blogList/",
            "ブログの登録が完了しました",
            false,
        ));
    }

    #[test]
    fn success_phrase_on_confirm_page_is_not_success() {
        // Still on the confirmation page means the submit never landed.
        assert!(!completion_decision(
            "https://salonboard.com/CLP/bt/blog/blog/confirm/",
            "ブログの登録が完了しました",
            false,
        ));
    }

    #[test]
    fn list_affordance_only_counts_on_completion_page() {
        assert!(completion_decision(
            "https://salonboard.com/CLP/bt/blog/blog/complete/",
            "",
            true,
        ));
        assert!(!completion_decision(
            "https://salonboard.com/CLP/bt/blog/blogList/",
            "",
            true,
        ));
    }

    #[test]
    fn no_evidence_is_not_success() {
        assert!(!completion_decision(
            "https://salonboard.com/CLP/bt/blog/blog/complete/",
            "エラーが発生しました",
            false,
        ));
    }

    #[test]
    fn success_text_survives_span_splitting() {
        assert!(contains_success_text("ブログの登録が完了 しました。"));
    }

    #[test]
    fn robot_marker_picks_first_present() {
        let counts = [("iframe[src*='recaptcha']", 0), ("div.g-recaptcha", 2)];
        assert_eq!(matched_robot_marker(counts), Some("div.g-recaptcha"));
        assert_eq!(matched_robot_marker([("div.g-recaptcha", 0)]), None);
    }
}
