//! Keyword vocabularies used by the detector and ranker.
//!
//! Matching is done on lowercased text. Close glyphs are compared after
//! trimming whitespace, everything else is a substring or token match.

/// Texts that, on their own, mean "dismiss this".
pub const CLOSE_TEXTS: &[&str] = &[
    "×", "✕", "✖", "╳", "x", "close", "skip", "dismiss", "cancel", "not now", "no thanks",
    "关闭", "跳过", "取消", "我知道了", "稍后再说", "以后再说", "知道了", "暂不",
];

/// Substrings of a resource id that mark a close control.
pub const CLOSE_ID_KEYWORDS: &[&str] = &["close", "dismiss", "cancel"];

/// Substrings of a content description that mark a close control.
pub const CLOSE_DESC_KEYWORDS: &[&str] = &[
    "close", "dismiss", "cancel", "skip", "关闭", "跳过", "取消", "关掉",
];

/// Class name fragments of dialog-like containers.
pub const DIALOG_CLASS_KEYWORDS: &[&str] = &["dialog", "modal", "alert", "sheet", "popup"];

/// Resource id fragments of dialog and overlay containers.
pub const DIALOG_ID_KEYWORDS: &[&str] = &["dialog", "overlay", "mask", "popup", "modal"];

/// Resource id tokens of ad surfaces. Compared against `_`-separated tokens so
/// that `header` or `download` do not count as `ad`.
pub const AD_ID_TOKENS: &[&str] = &[
    "ad", "ads", "advert", "advertisement", "interstitial", "reward", "rewarded",
];

/// Ad fragments long enough to match as plain substrings.
pub const AD_ID_FRAGMENTS: &[&str] = &["interstitial", "reward", "advert"];

pub const NAV_BAR_KEYWORDS: &[&str] = &[
    "navigation", "nav_bar", "navbar", "bottom_nav", "bottomnav", "tab_bar", "tabbar",
    "bottom_bar", "bottombar",
];

pub const SEARCH_BAR_KEYWORDS: &[&str] = &["search"];

/// Class name fragments of image views across platforms.
pub const IMAGE_CLASS_KEYWORDS: &[&str] = &["image"];

pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    if haystack.is_empty() {
        return false;
    }
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// True if `text` is exactly one of the close glyphs/words.
pub fn is_close_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    CLOSE_TEXTS.iter().any(|t| *t == lower)
}

pub fn is_close_id(resource_id: &str) -> bool {
    contains_any(id_suffix(resource_id), CLOSE_ID_KEYWORDS)
}

pub fn is_ad_id(resource_id: &str) -> bool {
    let suffix = id_suffix(resource_id).to_lowercase();
    if suffix.is_empty() {
        return false;
    }
    if AD_ID_FRAGMENTS.iter().any(|f| suffix.contains(f)) {
        return true;
    }
    suffix
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| AD_ID_TOKENS.contains(&token))
}

/// Strips the `package:id/` prefix of an Android resource id.
fn id_suffix(resource_id: &str) -> &str {
    match resource_id.rsplit_once(":id/") {
        Some((_, suffix)) => suffix,
        None => resource_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_text_is_exact_and_case_insensitive() {
        assert!(is_close_text("×"));
        assert!(is_close_text(" Close "));
        assert!(is_close_text("跳过"));
        assert!(!is_close_text("Close all tabs"));
        assert!(!is_close_text(""));
    }

    #[test]
    fn ad_ids_match_tokens_not_substrings() {
        assert!(is_ad_id("com.app:id/ad_container"));
        assert!(is_ad_id("com.app:id/splash_ads_view"));
        assert!(is_ad_id("com.app:id/rewardVideo"));
        assert!(!is_ad_id("com.app:id/header"));
        assert!(!is_ad_id("com.app:id/download_button"));
        // package name must not leak into the match
        assert!(!is_ad_id("com.ad.app:id/title"));
    }

    #[test]
    fn close_ids_use_resource_suffix() {
        assert!(is_close_id("com.app:id/btn_close"));
        assert!(is_close_id("iv_dismiss"));
        assert!(!is_close_id("com.closet.app:id/title"));
    }
}
