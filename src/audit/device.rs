//! Coarse device classification from a user-agent string

use regex::Regex;
use std::sync::OnceLock;

use crate::models::DeviceInfo;

/// Ordered: the first matching pattern wins, so more specific tokens
/// (Edge and Opera both claim to be Chrome) come first.
const BROWSER_PATTERNS: &[(&str, &str)] = &[
    ("edge", r"(?i)\bEdg(e|A|iOS)?/"),
    ("opera", r"(?i)\b(OPR|Opera)/"),
    ("firefox", r"(?i)\b(Firefox|FxiOS)/"),
    ("chrome", r"(?i)\b(Chrome|CriOS)/"),
    ("safari", r"(?i)\bVersion/[\d.]+.*Safari/"),
    ("internet_explorer", r"(?i)(\bMSIE\b|Trident/)"),
];

const OS_PATTERNS: &[(&str, &str)] = &[
    ("windows", r"(?i)Windows NT"),
    ("ios", r"(?i)\b(iPhone|iPad|iPod)\b"),
    ("android", r"(?i)\bAndroid\b"),
    ("macos", r"(?i)(Mac OS X|Macintosh)"),
    ("chrome_os", r"(?i)\bCrOS\b"),
    ("linux", r"(?i)\bLinux\b"),
];

const MOBILE_PATTERN: &str = r"(?i)(\bMobi|\bAndroid\b|\biPhone\b|\biPad\b|\biPod\b)";

struct Classifier {
    browsers: Vec<(&'static str, Regex)>,
    systems: Vec<(&'static str, Regex)>,
    mobile: Option<Regex>,
}

fn compile(patterns: &'static [(&'static str, &'static str)]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (*name, re)))
        .collect()
}

fn classifier() -> &'static Classifier {
    static CLASSIFIER: OnceLock<Classifier> = OnceLock::new();
    CLASSIFIER.get_or_init(|| Classifier {
        browsers: compile(BROWSER_PATTERNS),
        systems: compile(OS_PATTERNS),
        mobile: Regex::new(MOBILE_PATTERN).ok(),
    })
}

fn first_match(patterns: &[(&'static str, Regex)], user_agent: &str) -> String {
    patterns
        .iter()
        .find(|(_, re)| re.is_match(user_agent))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Classify a client signature; a missing or blank signature is "unknown"
pub fn classify(user_agent: Option<&str>) -> DeviceInfo {
    let user_agent = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua,
        _ => return DeviceInfo::unknown(),
    };

    let classifier = classifier();
    DeviceInfo {
        browser: first_match(&classifier.browsers, user_agent),
        os: first_match(&classifier.systems, user_agent),
        mobile: classifier
            .mobile
            .as_ref()
            .map(|re| re.is_match(user_agent))
            .unwrap_or(false),
    }
}
