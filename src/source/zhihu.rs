use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ActionKind, Content, ContentKind, TrackedUser};

use super::{ActivityRecord, ContentSource, FolloweePage};

const API_BASE: &str = "https://www.zhihu.com/api/v4";

const USER_AGENT_STRING: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Authenticated profile returned by [`ZhihuSource::me`].
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProfile {
    pub id: String,
    #[serde(rename = "url_token")]
    pub handle: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    url_token: String,
    name: String,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    is_end: bool,
}

#[derive(Debug, Deserialize)]
struct FolloweeEnvelope {
    data: Vec<RemoteUser>,
    paging: Paging,
}

#[derive(Debug, Deserialize)]
struct ActivityEnvelope {
    data: Vec<Value>,
}

/// Cookie-authenticated client for the Zhihu v4 API. Activity payloads are
/// heterogeneous per target type, so they are traversed as JSON values and
/// normalized into [`Content`].
pub struct ZhihuSource {
    client: Client,
    cookies: String,
}

impl ZhihuSource {
    pub fn new(cookies: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, cookies }
    }

    fn headers(&self, referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert("x-api-version", HeaderValue::from_static("3.0.91"));
        headers.insert("x-requested-with", HeaderValue::from_static("fetch"));
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.cookies) {
            headers.insert(COOKIE, value);
        }
        headers
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, referer: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .headers(self.headers(referer))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Auth(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!("HTTP {status} from {url}")));
        }

        Ok(response.json().await?)
    }

    /// Resolve the authenticated account; used to validate credentials and
    /// to default the root handle for a followee sync.
    pub async fn me(&self) -> Result<RemoteProfile> {
        self.get_json(&format!("{API_BASE}/me"), "https://www.zhihu.com/")
            .await
    }
}

#[async_trait]
impl ContentSource for ZhihuSource {
    async fn followees(
        &self,
        root_handle: &str,
        offset: u32,
        limit: u32,
    ) -> Result<FolloweePage> {
        let url =
            format!("{API_BASE}/members/{root_handle}/followees?offset={offset}&limit={limit}");
        let referer = format!("https://www.zhihu.com/people/{root_handle}/following");
        let envelope: FolloweeEnvelope = self.get_json(&url, &referer).await?;

        let users = envelope
            .data
            .into_iter()
            .map(|user| TrackedUser {
                id: user.id,
                handle: user.url_token,
                name: user.name,
                headline: user.headline,
                avatar_url: user.avatar_url,
                last_fetched_at: None,
            })
            .collect();

        Ok(FolloweePage {
            users,
            is_end: envelope.paging.is_end,
        })
    }

    async fn recent_activity(&self, handle: &str, limit: u32) -> Result<Vec<ActivityRecord>> {
        let url = format!("{API_BASE}/members/{handle}/activities?limit={limit}");
        let referer = format!("https://www.zhihu.com/people/{handle}/activities");
        let envelope: ActivityEnvelope = self.get_json(&url, &referer).await?;

        let mut records = Vec::new();
        for item in &envelope.data {
            // Items whose action or target cannot be classified are skipped.
            let Some(action_kind) = item
                .get("action_text")
                .and_then(Value::as_str)
                .and_then(parse_action_kind)
            else {
                continue;
            };
            let Some(content) = item.get("target").and_then(normalize_target) else {
                continue;
            };

            let action_time = item
                .get("created_time")
                .or_else(|| item.get("action_time"))
                .and_then(Value::as_i64)
                .unwrap_or_else(|| Utc::now().timestamp());

            records.push(ActivityRecord {
                content,
                action_kind,
                action_time,
            });
        }

        Ok(records)
    }
}

/// Classify the localized action description of an activity item.
fn parse_action_kind(action_text: &str) -> Option<ActionKind> {
    if action_text.contains("赞同") || action_text.contains("喜欢") {
        return Some(ActionKind::Like);
    }
    if action_text.contains("发布") || action_text.contains("回答") || action_text.contains("写了")
    {
        return Some(ActionKind::Create);
    }
    None
}

fn normalize_target(target: &Value) -> Option<Content> {
    match target.get("type").and_then(Value::as_str)? {
        "article" => normalize_article(target),
        "answer" => normalize_answer(target),
        "pin" => normalize_pin(target),
        _ => None,
    }
}

fn normalize_article(item: &Value) -> Option<Content> {
    let id = id_field(item)?;
    let body = str_field(item, "content");
    let excerpt = str_field(item, "excerpt");
    let word_count = count_words(if body.is_empty() { &excerpt } else { &body });

    Some(Content {
        url: format!("https://zhuanlan.zhihu.com/p/{id}"),
        id,
        kind: ContentKind::Article,
        title: str_field(item, "title"),
        excerpt,
        body,
        author_id: author_field(item, "id"),
        author_name: author_field(item, "name"),
        word_count,
        voteup_count: u32_field(item, "voteup_count"),
        comment_count: u32_field(item, "comment_count"),
        created_time: first_nonzero(i64_field(item, "created"), i64_field(item, "created_time")),
        updated_time: first_nonzero(i64_field(item, "updated"), i64_field(item, "updated_time")),
    })
}

fn normalize_answer(item: &Value) -> Option<Content> {
    let id = id_field(item)?;
    let question = item.get("question");
    let question_id = question.and_then(id_field);
    let body = str_field(item, "content");
    let excerpt = str_field(item, "excerpt");
    let word_count = count_words(if body.is_empty() { &excerpt } else { &body });

    Some(Content {
        url: format!(
            "https://www.zhihu.com/question/{}/answer/{id}",
            question_id.unwrap_or_default()
        ),
        id,
        kind: ContentKind::Answer,
        title: question
            .map(|q| str_field(q, "title"))
            .unwrap_or_default(),
        excerpt,
        body,
        author_id: author_field(item, "id"),
        author_name: author_field(item, "name"),
        word_count,
        voteup_count: u32_field(item, "voteup_count"),
        comment_count: u32_field(item, "comment_count"),
        created_time: i64_field(item, "created_time"),
        updated_time: i64_field(item, "updated_time"),
    })
}

/// Short posts ("pins") have no title of their own; one is derived from the
/// stripped body text.
fn normalize_pin(item: &Value) -> Option<Content> {
    let id = id_field(item)?;
    let body = {
        let inline = item
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .map(|block| str_field(block, "content"))
            .unwrap_or_default();
        let html = str_field(item, "content_html");
        if html.is_empty() {
            inline
        } else {
            html
        }
    };
    let text = strip_html(&body);
    let excerpt_title = str_field(item, "excerpt_title");
    let created = i64_field(item, "created");
    let updated = i64_field(item, "updated");

    Some(Content {
        url: format!("https://www.zhihu.com/pin/{id}"),
        id,
        kind: ContentKind::Shortform,
        title: truncate(&text, 50),
        excerpt: if excerpt_title.is_empty() {
            truncate(&text, 200)
        } else {
            excerpt_title
        },
        word_count: count_words(&body),
        body,
        author_id: author_field(item, "id"),
        author_name: author_field(item, "name"),
        voteup_count: u32_field(item, "like_count"),
        comment_count: u32_field(item, "comment_count"),
        created_time: created,
        updated_time: if updated == 0 { created } else { updated },
    })
}

fn id_field(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn u32_field(value: &Value, key: &str) -> u32 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0) as u32
}

fn i64_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn first_nonzero(a: i64, b: i64) -> i64 {
    if a != 0 {
        a
    } else {
        b
    }
}

fn author_field(value: &Value, key: &str) -> String {
    value
        .get("author")
        .map(|author| str_field(author, key))
        .unwrap_or_default()
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn cjk_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{4e00}-\u{9fff}]").expect("valid regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-zA-Z]+").expect("valid regex"))
}

fn strip_html(html: &str) -> String {
    tag_regex()
        .replace_all(html, "")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

/// CJK text counts per character, Latin text per word.
fn count_words(html: &str) -> u32 {
    let text = strip_html(html);
    let cjk = cjk_regex().find_iter(&text).count();
    let words = word_regex().find_iter(&text).count();
    (cjk + words) as u32
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_text_classification() {
        assert_eq!(parse_action_kind("赞同了回答"), Some(ActionKind::Like));
        assert_eq!(parse_action_kind("喜欢了文章"), Some(ActionKind::Like));
        assert_eq!(parse_action_kind("发布了文章"), Some(ActionKind::Create));
        assert_eq!(parse_action_kind("回答了问题"), Some(ActionKind::Create));
        assert_eq!(parse_action_kind("关注了问题"), None);
        assert_eq!(parse_action_kind(""), None);
    }

    #[test]
    fn word_count_mixes_cjk_chars_and_latin_words() {
        assert_eq!(count_words("<p>你好世界</p>"), 4);
        assert_eq!(count_words("hello brave new world"), 4);
        assert_eq!(count_words("你好 hello&nbsp;world 世界"), 6);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn strip_html_removes_tags_and_entities() {
        assert_eq!(
            strip_html("<p>one&nbsp;<a href=\"x\">two</a></p> "),
            "one two"
        );
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("一二三四五", 3), "一二三...");
    }

    #[test]
    fn normalizes_article_target() {
        let target = json!({
            "type": "article",
            "id": 123,
            "title": "Title",
            "excerpt": "An excerpt",
            "content": "<p>hello world 你好</p>",
            "author": { "id": "a1", "name": "Ada" },
            "voteup_count": 7,
            "comment_count": 2,
            "created": 1000,
            "updated": 2000
        });
        let content = normalize_target(&target).unwrap();
        assert_eq!(content.id, "123");
        assert_eq!(content.kind, ContentKind::Article);
        assert_eq!(content.url, "https://zhuanlan.zhihu.com/p/123");
        assert_eq!(content.author_name, "Ada");
        assert_eq!(content.word_count, 4);
        assert_eq!(content.voteup_count, 7);
        assert_eq!(content.created_time, 1000);
        assert_eq!(content.updated_time, 2000);
    }

    #[test]
    fn normalizes_answer_target() {
        let target = json!({
            "type": "answer",
            "id": "456",
            "question": { "id": 99, "title": "Why?" },
            "excerpt": "Because",
            "content": "<p>Because of reasons</p>",
            "author": { "id": "a2", "name": "Bob" },
            "voteup_count": 1,
            "comment_count": 0,
            "created_time": 500,
            "updated_time": 600
        });
        let content = normalize_target(&target).unwrap();
        assert_eq!(content.kind, ContentKind::Answer);
        assert_eq!(content.title, "Why?");
        assert_eq!(content.url, "https://www.zhihu.com/question/99/answer/456");
        assert_eq!(content.word_count, 3);
    }

    #[test]
    fn normalizes_pin_target_with_derived_title() {
        let target = json!({
            "type": "pin",
            "id": 789,
            "content_html": "<p>a very short thought</p>",
            "author": { "id": "a3", "name": "Eve" },
            "like_count": 5,
            "comment_count": 1,
            "created": 300
        });
        let content = normalize_target(&target).unwrap();
        assert_eq!(content.kind, ContentKind::Shortform);
        assert_eq!(content.title, "a very short thought");
        assert_eq!(content.excerpt, "a very short thought");
        assert_eq!(content.voteup_count, 5);
        // Missing updated falls back to created.
        assert_eq!(content.updated_time, 300);
    }

    #[test]
    fn unknown_target_type_is_skipped() {
        assert!(normalize_target(&json!({ "type": "live", "id": 1 })).is_none());
        assert!(normalize_target(&json!({ "id": 1 })).is_none());
    }
}
