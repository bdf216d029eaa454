//! Field recovery over a rendered reel page.
//!
//! Every field has an ordered list of recovery methods. Each method looks at the
//! [`PageSnapshot`] and returns a value or nothing; the first value wins.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

use crate::extractors::ContentRecord;
use crate::utils::parse_scaled_count;

static VIDEO: LazyLock<Selector> = LazyLock::new(|| Selector::parse("video").unwrap());
static SOURCE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("source").unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

static CAPTION_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""caption":\{[^{}]*?"text":"((?:[^"\\]|\\.)*)""#).unwrap());
static CAPTION_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""caption":"((?:[^"\\]|\\.)*)""#).unwrap());

static SCRIPT_VIEWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:video_view_count|play_count)":\s*(\d+)"#).unwrap());
static SCRIPT_LIKES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""like_count":\s*(\d+)"#).unwrap());
static SCRIPT_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""comment_count":\s*(\d+)"#).unwrap());

static TEXT_VIEWS: LazyLock<Regex> = LazyLock::new(|| count_pattern("views?"));
static TEXT_LIKES: LazyLock<Regex> = LazyLock::new(|| count_pattern("likes?"));
static TEXT_COMMENTS: LazyLock<Regex> = LazyLock::new(|| count_pattern("comments?"));

static TITLE_HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([\w.]+)").unwrap());
static SUMMARY_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s-\s+([\w.]+)\s+on\b").unwrap());

fn count_pattern(noun: &str) -> Regex {
    Regex::new(&format!(r"(?i)(\d+(?:,\d{{3}})*(?:\.\d+)?)\s*([KMB])?\s*{}\b", noun)).unwrap()
}

/// What the extraction needs from a rendered page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub video_src: Option<String>,
    pub nested_source_src: Option<String>,
    pub meta_description: Option<String>,
    pub meta_title: Option<String>,
    pub structured_data: Vec<String>,
    pub scripts: Vec<String>,
    pub body_text: String,
    pub location_path: String,
}

impl PageSnapshot {
    /// Parse serialized DOM of the rendered page loaded from `location`
    pub fn from_html(html: &str, location: &str) -> Self {
        let document = Html::parse_document(html);

        let video = document.select(&VIDEO).next();
        let video_src = video.and_then(|v| non_empty(v.value().attr("src")));
        let nested_source_src = video.and_then(|v| {
            v.select(&SOURCE)
                .find_map(|s| non_empty(s.value().attr("src")))
        });

        let meta_content = |selector: &Selector| {
            document
                .select(selector)
                .find_map(|m| non_empty(m.value().attr("content")))
        };

        Self {
            video_src,
            nested_source_src,
            meta_description: meta_content(&*OG_DESCRIPTION),
            meta_title: meta_content(&*OG_TITLE),
            structured_data: document
                .select(&LD_JSON)
                .map(|s| s.text().collect::<String>())
                .collect(),
            scripts: document
                .select(&SCRIPT)
                .map(|s| s.text().collect::<String>())
                .filter(|s| !s.trim().is_empty())
                .collect(),
            body_text: visible_text(&document),
            location_path: url::Url::parse(location)
                .map(|u| u.path().to_string())
                .unwrap_or_default(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Text of the body as a reader would see it, without script or style contents
fn visible_text(document: &Html) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };

    let mut text = String::new();
    for node in body.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .is_some_and(|name| {
                matches!(name.as_str(), "script" | "style" | "noscript" | "template")
            });
        let fragment = fragment.trim();
        if !hidden && !fragment.is_empty() {
            text.push_str(fragment);
            text.push('\n');
        }
    }
    text
}

/// View, like and comment counts recovered together from one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Engagement {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

pub type Recovery<T> = fn(&PageSnapshot) -> Option<T>;

pub const VIDEO_SOURCE: &[Recovery<String>] = &[video_element_src, nested_source_src];
pub const CAPTION: &[Recovery<String>] =
    &[meta_description, structured_data_description, inline_script_caption];
pub const ENGAGEMENT: &[Recovery<Engagement>] =
    &[script_payload_counts, visible_text_counts, description_counts];
pub const AUTHOR_HANDLE: &[Recovery<String>] = &[title_handle, path_handle, description_handle];

/// Run recovery methods in order and keep the first value found
pub fn first_present<T>(snapshot: &PageSnapshot, methods: &[Recovery<T>]) -> Option<T> {
    methods.iter().find_map(|method| method(snapshot))
}

/// Assemble a record for `url` from everything the snapshot yields
pub fn recover_record(snapshot: &PageSnapshot, url: &str) -> ContentRecord {
    let caption = first_present(snapshot, CAPTION).unwrap_or_default();
    let mut record = ContentRecord::new(url).with_caption(caption);
    record.video_url = first_present(snapshot, VIDEO_SOURCE).unwrap_or_default();

    if let Some(engagement) = first_present(snapshot, ENGAGEMENT) {
        record.view_count = engagement.views;
        record.like_count = engagement.likes;
        record.comment_count = engagement.comments;
    }

    record.author.username = first_present(snapshot, AUTHOR_HANDLE).unwrap_or_default();
    record.author.full_name = title_full_name(snapshot).unwrap_or_default();
    record
}

fn playable(src: &Option<String>) -> Option<String> {
    src.clone().filter(|s| !s.starts_with("blob:"))
}

fn video_element_src(snapshot: &PageSnapshot) -> Option<String> {
    playable(&snapshot.video_src)
}

fn nested_source_src(snapshot: &PageSnapshot) -> Option<String> {
    playable(&snapshot.nested_source_src)
}

fn meta_description(snapshot: &PageSnapshot) -> Option<String> {
    snapshot.meta_description.clone()
}

fn structured_data_description(snapshot: &PageSnapshot) -> Option<String> {
    snapshot
        .structured_data
        .iter()
        .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
        .find_map(|value| ld_description(&value))
}

fn ld_description(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(ld_description),
        Value::Object(map) => map
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| map.get("@graph").and_then(ld_description)),
        _ => None,
    }
}

fn inline_script_caption(snapshot: &PageSnapshot) -> Option<String> {
    snapshot
        .scripts
        .iter()
        .filter(|script| script.contains("caption"))
        .find_map(|script| {
            [&*CAPTION_OBJECT, &*CAPTION_STRING]
                .iter()
                .find_map(|pattern| pattern.captures(script))
                .map(|caps| unescape_json_string(&caps[1]))
                .filter(|caption| !caption.is_empty())
        })
}

fn unescape_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

fn script_payload_counts(snapshot: &PageSnapshot) -> Option<Engagement> {
    let capture = |pattern: &Regex, text: &str| {
        pattern
            .captures(text)
            .and_then(|caps| caps[1].parse::<u64>().ok())
    };

    snapshot
        .scripts
        .iter()
        .filter(|script| script.contains("video_view_count") || script.contains("play_count"))
        .find_map(|script| {
            let views = capture(&*SCRIPT_VIEWS, script);
            let likes = capture(&*SCRIPT_LIKES, script);
            let comments = capture(&*SCRIPT_COMMENTS, script);
            views.map(|views| Engagement {
                views,
                likes: likes.unwrap_or(0),
                comments: comments.unwrap_or(0),
            })
        })
}

/// Count for one noun in free text, e.g. `1.2M views` or `3,482 comments`
pub fn text_count(pattern: &Regex, text: &str) -> Option<u64> {
    let caps = pattern.captures(text)?;
    let suffix = caps.get(2).and_then(|m| m.as_str().chars().next());
    parse_scaled_count(&caps[1], suffix)
}

fn counts_in_text(text: &str) -> Option<Engagement> {
    let views = text_count(&TEXT_VIEWS, text);
    let likes = text_count(&TEXT_LIKES, text);
    let comments = text_count(&TEXT_COMMENTS, text);

    if views.is_none() && likes.is_none() && comments.is_none() {
        return None;
    }
    Some(Engagement {
        views: views.unwrap_or(0),
        likes: likes.unwrap_or(0),
        comments: comments.unwrap_or(0),
    })
}

fn visible_text_counts(snapshot: &PageSnapshot) -> Option<Engagement> {
    counts_in_text(&snapshot.body_text)
}

fn description_counts(snapshot: &PageSnapshot) -> Option<Engagement> {
    snapshot.meta_description.as_deref().and_then(counts_in_text)
}

fn title_handle(snapshot: &PageSnapshot) -> Option<String> {
    let title = snapshot.meta_title.as_deref()?;
    let handle = TITLE_HANDLE.captures(title)?[1].trim_end_matches('.').to_string();
    Some(handle).filter(|h| !h.is_empty())
}

fn title_full_name(snapshot: &PageSnapshot) -> Option<String> {
    let title = snapshot.meta_title.as_deref()?;
    let (name, _) = title.split_once('@')?;
    let name = name.trim().trim_end_matches(['(', '•', '|', '-']).trim();
    Some(name.to_string()).filter(|n| !n.is_empty())
}

fn path_handle(snapshot: &PageSnapshot) -> Option<String> {
    let segments: Vec<&str> = snapshot
        .location_path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let position = segments.iter().position(|s| *s == "reel" || *s == "reels")?;
    position
        .checked_sub(1)
        .map(|i| segments[i].to_string())
}

fn description_handle(snapshot: &PageSnapshot) -> Option<String> {
    let description = snapshot.meta_description.as_deref()?;
    SUMMARY_HANDLE
        .captures(description)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.instagram.com/reel/ABC123/";

    fn page(head: &str, body: &str) -> String {
        format!("<html><head>{}</head><body>{}</body></html>", head, body)
    }

    #[test]
    fn test_snapshot_parsing() {
        let html = page(
            r#"<meta property="og:description" content="Caption &amp; more #tag">
               <meta property="og:title" content="Jane Doe (@jane.doe) • Instagram reel">
               <script type="application/ld+json">{"description": "ld caption"}</script>"#,
            r#"<video><source src="https://cdn/src.mp4"></video>
               <span>1.2M</span> <span>views</span>
               <script>var x = 1;</script><style>.a{}</style>"#,
        );
        let snapshot =
            PageSnapshot::from_html(&html, "https://www.instagram.com/jane.doe/reel/ABC123/");

        assert_eq!(snapshot.video_src, None);
        assert_eq!(snapshot.nested_source_src.as_deref(), Some("https://cdn/src.mp4"));
        assert_eq!(snapshot.meta_description.as_deref(), Some("Caption & more #tag"));
        assert_eq!(snapshot.structured_data.len(), 1);
        assert!(snapshot.body_text.contains("1.2M"));
        assert!(!snapshot.body_text.contains("var x"));
        assert!(!snapshot.body_text.contains(".a{}"));
        assert_eq!(snapshot.location_path, "/jane.doe/reel/ABC123/");
    }

    #[test]
    fn test_video_source_prefers_element_src() {
        let snapshot = PageSnapshot {
            video_src: Some("https://cdn/direct.mp4".into()),
            nested_source_src: Some("https://cdn/nested.mp4".into()),
            ..Default::default()
        };
        assert_eq!(first_present(&snapshot, VIDEO_SOURCE).unwrap(), "https://cdn/direct.mp4");

        let snapshot = PageSnapshot {
            video_src: Some("blob:https://www.instagram.com/1234".into()),
            nested_source_src: Some("https://cdn/nested.mp4".into()),
            ..Default::default()
        };
        assert_eq!(first_present(&snapshot, VIDEO_SOURCE).unwrap(), "https://cdn/nested.mp4");
    }

    #[test]
    fn test_caption_chain() {
        let mut snapshot = PageSnapshot {
            structured_data: vec![r#"[{"@type": "VideoObject", "description": "from ld"}]"#.into()],
            scripts: vec![r#"{"caption":"from script"}"#.into()],
            ..Default::default()
        };
        assert_eq!(first_present(&snapshot, CAPTION).unwrap(), "from ld");

        snapshot.meta_description = Some("from meta".into());
        assert_eq!(first_present(&snapshot, CAPTION).unwrap(), "from meta");

        snapshot.meta_description = None;
        snapshot.structured_data = vec!["not json".into()];
        assert_eq!(first_present(&snapshot, CAPTION).unwrap(), "from script");
    }

    #[test]
    fn test_inline_script_caption_variants() {
        let snapshot = PageSnapshot {
            scripts: vec![
                "window.config = {};".into(),
                r#"{"edge":{"caption":{"created_at":1,"text":"Line one\nline \"two\" #go"}}}"#
                    .into(),
            ],
            ..Default::default()
        };
        assert_eq!(
            inline_script_caption(&snapshot).unwrap(),
            "Line one\nline \"two\" #go"
        );

        let snapshot = PageSnapshot {
            scripts: vec![r#"{"caption":"café time"}"#.into()],
            ..Default::default()
        };
        assert_eq!(inline_script_caption(&snapshot).unwrap(), "café time");
    }

    #[test]
    fn test_text_count_suffixes() {
        assert_eq!(text_count(&TEXT_VIEWS, "1.2M views"), Some(1_200_000));
        assert_eq!(text_count(&TEXT_LIKES, "950K likes"), Some(950_000));
        assert_eq!(text_count(&TEXT_COMMENTS, "3,482 comments"), Some(3482));
        assert_eq!(text_count(&TEXT_VIEWS, "2B views"), Some(2_000_000_000));
        assert_eq!(text_count(&TEXT_LIKES, "1 like"), Some(1));
        assert_eq!(text_count(&TEXT_LIKES, "12 liked this"), None);
        assert_eq!(text_count(&TEXT_VIEWS, "no numbers"), None);
    }

    #[test]
    fn test_engagement_prefers_script_payload() {
        let snapshot = PageSnapshot {
            scripts: vec![
                r#"{"video_view_count":5120,"like_count":300,"comment_count":12}"#.into(),
            ],
            body_text: "9M views\n1K likes".into(),
            ..Default::default()
        };
        assert_eq!(
            first_present(&snapshot, ENGAGEMENT).unwrap(),
            Engagement { views: 5120, likes: 300, comments: 12 }
        );
    }

    #[test]
    fn test_engagement_falls_back_to_text_then_description() {
        let snapshot = PageSnapshot {
            scripts: vec![r#"{"like_count":300}"#.into()],
            body_text: "Reel\n1.5K\nviews\n88 likes".into(),
            meta_description: Some("2 likes, 0 comments - someone on May 1".into()),
            ..Default::default()
        };
        assert_eq!(
            first_present(&snapshot, ENGAGEMENT).unwrap(),
            Engagement { views: 1500, likes: 88, comments: 0 }
        );

        let snapshot = PageSnapshot {
            meta_description: Some("2 likes, 7 comments - someone on May 1".into()),
            ..Default::default()
        };
        assert_eq!(
            first_present(&snapshot, ENGAGEMENT).unwrap(),
            Engagement { views: 0, likes: 2, comments: 7 }
        );
    }

    #[test]
    fn test_author_chain() {
        let mut snapshot = PageSnapshot {
            meta_title: Some("Jane Doe (@jane.doe) • Instagram reel".into()),
            meta_description: Some("2 likes, 0 comments - other on May 1".into()),
            location_path: "/pathuser/reel/ABC/".into(),
            ..Default::default()
        };
        assert_eq!(first_present(&snapshot, AUTHOR_HANDLE).unwrap(), "jane.doe");
        assert_eq!(title_full_name(&snapshot).unwrap(), "Jane Doe");

        snapshot.meta_title = Some("Instagram".into());
        assert_eq!(first_present(&snapshot, AUTHOR_HANDLE).unwrap(), "pathuser");
        assert_eq!(title_full_name(&snapshot), None);

        snapshot.location_path = "/reel/ABC/".into();
        assert_eq!(first_present(&snapshot, AUTHOR_HANDLE).unwrap(), "other");

        snapshot.meta_description = None;
        assert_eq!(first_present(&snapshot, AUTHOR_HANDLE), None);
    }

    #[test]
    fn test_recover_record_from_page() {
        let html = page(
            r#"<meta property="og:title" content="Chef Max (@chefmax) on Instagram">
               <meta property="og:description" content="Pasta night #food #italian">"#,
            r#"<video src="https://cdn/pasta.mp4"></video>
               <script>{"video_view_count":1000,"like_count":50,"comment_count":5}</script>"#,
        );
        let record = recover_record(&PageSnapshot::from_html(&html, URL), URL);

        assert_eq!(record.url, URL);
        assert_eq!(record.video_url, "https://cdn/pasta.mp4");
        assert_eq!(record.caption, "Pasta night #food #italian");
        assert_eq!(record.hashtags, vec!["#food", "#italian"]);
        assert_eq!((record.view_count, record.like_count, record.comment_count), (1000, 50, 5));
        assert_eq!(record.author.username, "chefmax");
        assert_eq!(record.author.full_name, "Chef Max");
    }

    #[test]
    fn test_login_wall_page_is_blank() {
        let html = page("<title>Login • Instagram</title>", r#"<form id="loginForm"></form>"#);
        let record = recover_record(&PageSnapshot::from_html(&html, URL), URL);
        assert!(record.is_blank());
    }
}
