use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static REEL_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:https?://(?:www\.)?instagram\.com)/(?:reel|reels)/[A-Za-z0-9_-]+/?(?:[?#].*)?$").unwrap()
});

static HASHTAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").unwrap());

/// Check whether `url` points at a single Instagram reel.
///
/// Scheme and host are matched case-insensitively, the trailing slash is optional and
/// tracking parameters (`?igsh=...`) are tolerated since [`canonicalize_url`] drops them.
pub fn validate_reel_url(url: &str) -> bool {
    REEL_URL_PATTERN.is_match(url.trim())
}

/// Strip query parameters and fragment, leaving scheme, host and path untouched.
///
/// Input that does not parse as a URL is returned unchanged.
pub fn canonicalize_url(url: &str) -> String {
    if Url::parse(url).is_err() {
        tracing::debug!(url = %url, "Could not parse URL, using it as-is");
        return url.to_string();
    }

    url.split(['?', '#']).next().unwrap_or(url).to_string()
}

/// Collect `#tag` tokens from a caption in order of appearance
pub fn extract_hashtags(caption: &str) -> Vec<String> {
    HASHTAG_PATTERN
        .find_iter(caption)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parse a count such as `3,482`, `1.2` + `M` or `950` + `K` into an integer.
///
/// Thousands separators are removed, the number is scaled by the suffix and floored.
/// The arithmetic is done on the decimal digits so `1.2M` is exactly 1 200 000.
pub fn parse_scaled_count(number: &str, suffix: Option<char>) -> Option<u64> {
    let digits: String = number.chars().filter(|c| *c != ',').collect();
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits.as_str(), ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let multiplier: u64 = match suffix.map(|c| c.to_ascii_uppercase()) {
        None => 1,
        Some('K') => 1_000,
        Some('M') => 1_000_000,
        Some('B') => 1_000_000_000,
        Some(_) => return None,
    };

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut total = whole.checked_mul(multiplier)?;

    // Only as many fraction digits as the multiplier can resolve matter for the floor.
    let precision = multiplier.ilog10() as usize;
    let significant: String = fraction.chars().take(precision).collect();
    if !significant.is_empty() {
        let scale = 10u64.pow(significant.len() as u32);
        let fraction_value: u64 = significant.parse().ok()?;
        total = total.checked_add(fraction_value * (multiplier / scale))?;
    }

    Some(total)
}

/// Parse a count from loosely typed JSON: numbers, numeric strings, or nothing at all.
pub fn json_count(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f.floor() as u64)
            }),
        serde_json::Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Reel shortcode, the last path segment of the canonical URL
pub fn reel_shortcode(url: &str) -> Option<String> {
    let parsed = Url::parse(&canonicalize_url(url)).ok()?;
    parsed
        .path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Short unique identifier used to key temporary media files of one run
pub fn run_identifier(index: usize) -> String {
    format!("reel_{}_{}", index, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Check if the current environment has required tools
pub async fn check_dependencies(ffmpeg_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(ffmpeg_path, "-version").await {
        missing.push(format!(
            "{} - required for audio extraction before transcription",
            ffmpeg_path
        ));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
