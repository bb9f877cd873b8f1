//! User-agent classification for visitor summaries
//!
//! Coarse OS/browser family detection, just enough to make a visitor
//! summary readable. Match order matters: most UA strings impersonate
//! several engines (every Chrome claims to be Safari, every Edge claims to
//! be Chrome), so the more specific token is checked first.

use once_cell::sync::Lazy;

/// `(needle, family)` pairs checked in order against the UA string.
static OS_FAMILIES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("Windows", "Windows"),
        ("Android", "Android"),
        ("iPhone", "iOS"),
        ("iPad", "iOS"),
        ("Mac OS X", "macOS"),
        ("Macintosh", "macOS"),
        ("CrOS", "Chrome OS"),
        ("Linux", "Linux"),
    ]
});

static BROWSER_FAMILIES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("Edg/", "Edge"),
        ("Edge/", "Edge"),
        ("OPR/", "Opera"),
        ("Opera", "Opera"),
        ("YaBrowser/", "Yandex Browser"),
        ("SamsungBrowser/", "Samsung Internet"),
        ("Firefox/", "Firefox"),
        ("FxiOS/", "Firefox"),
        ("CriOS/", "Chrome"),
        ("Chrome/", "Chrome"),
        ("Safari/", "Safari"),
        ("curl/", "curl"),
        ("Wget/", "Wget"),
    ]
});

/// OS and browser family derived from a User-Agent header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UaFamilies {
    pub os: &'static str,
    pub browser: &'static str,
}

/// Classify a raw User-Agent string. Empty input maps to `Unknown`,
/// unrecognized input to `Other`.
pub fn classify(ua: &str) -> UaFamilies {
    if ua.trim().is_empty() {
        return UaFamilies {
            os: "Unknown",
            browser: "Unknown",
        };
    }

    let os = OS_FAMILIES
        .iter()
        .find(|(needle, _)| ua.contains(needle))
        .map(|(_, family)| *family)
        .unwrap_or("Other");

    let browser = BROWSER_FAMILIES
        .iter()
        .find(|(needle, _)| ua.contains(needle))
        .map(|(_, family)| *family)
        .unwrap_or("Other");

    UaFamilies { os, browser }
}
