//! Telegram Bot API delivery

use super::{Channel, Notifier};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://api.telegram.org";
const PROVIDER: &str = "Telegram";

/// Telegram's limit for a single message
pub const MAX_MESSAGE_LEN: usize = 4096;

const PARSE_MODE: &str = "Markdown";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

/// Envelope around every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Sends Markdown messages to one chat
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    base_url: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            base_url: BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Build from configured credentials
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let (Some(token), Some(chat_id)) = (&config.telegram_bot_token, &config.telegram_chat_id) else {
            return Err(TrackerError::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must both be set".to_string(),
            ));
        };
        Ok(Self::new(token.clone(), chat_id.clone())
            .with_http_client(config.http_client()?)
            .with_retry(config.retry_policy()))
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Identity of the bot behind the token
    pub async fn get_me(&self) -> Result<BotUser> {
        self.retry
            .execute("Telegram getMe", || async {
                let response = self.client.get(self.method_url("getMe")).send().await?;
                read_response(response).await
            })
            .await
    }

    async fn send_chunk(&self, text: &str, parse_mode: Option<&'static str>) -> Result<()> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode,
            disable_web_page_preview: true,
        };

        self.retry
            .execute("Telegram sendMessage", || async {
                let response = self
                    .client
                    .post(self.method_url("sendMessage"))
                    .json(&payload)
                    .send()
                    .await?;
                read_response::<serde_json::Value>(response).await.map(|_| ())
            })
            .await
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TrackerError::rate_limited(PROVIDER));
    }

    let body = response.text().await?;
    match parse_response(&body) {
        Ok(value) => Ok(value),
        Err(e) if status.is_success() => Err(e),
        Err(TrackerError::Json(_)) => Err(TrackerError::Http {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
        }),
        Err(e) => Err(e),
    }
}

/// Telegram refused the chunk's Markdown markup
fn is_markup_error(error: &TrackerError) -> bool {
    matches!(error, TrackerError::Notification(m) if m.contains("can't parse entities"))
}

/// Unwrap an `ApiResponse`, turning `ok: false` into a notification error
fn parse_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: ApiResponse<T> = serde_json::from_str(body)?;
    if !envelope.ok {
        let description = envelope.description.unwrap_or_else(|| "unknown error".to_string());
        let message = match envelope.error_code {
            Some(code) => format!("Telegram API error {code}: {description}"),
            None => format!("Telegram API error: {description}"),
        };
        return Err(TrackerError::Notification(message));
    }
    envelope
        .result
        .ok_or_else(|| TrackerError::Notification("Telegram response missing result".to_string()))
}

/// Split text into chunks of at most `max_len` characters, preferring line breaks
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_len {
            let chars: Vec<char> = line.chars().collect();
            let mut rest = chars.as_slice();
            while rest.len() > max_len {
                let cut = entity_safe_cut(rest, max_len);
                chunks.push(rest[..cut].iter().collect());
                rest = &rest[cut..];
            }
            current.extend(rest);
            current_len = rest.len();
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Longest prefix of at most `limit` chars that leaves no `*`, `_` or backtick entity open
///
/// Falls back to `limit` when the entity itself is longer than the limit.
fn entity_safe_cut(chars: &[char], limit: usize) -> usize {
    let mut open: Option<char> = None;
    let mut escaped = false;
    let mut last_safe = 0;

    for (i, &c) in chars.iter().enumerate().take(limit) {
        if escaped {
            escaped = false;
        } else if c == '\\' && open != Some('`') {
            escaped = true;
        } else if matches!(c, '*' | '_' | '`') {
            match open {
                None => open = Some(c),
                Some(marker) if marker == c => open = None,
                Some(_) => {}
            }
        }
        if open.is_none() && !escaped {
            last_safe = i + 1;
        }
    }

    if last_safe == 0 {
        limit.min(chars.len())
    } else {
        last_safe
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            match self.send_chunk(chunk, Some(PARSE_MODE)).await {
                Err(e) if is_markup_error(&e) => {
                    tracing::warn!(part = i + 1, error = %e, "Markdown rejected, resending as plain text");
                    self.send_chunk(chunk, None).await?;
                }
                sent => sent?,
            }
            tracing::debug!(part = i + 1, total, chars = chunk.chars().count(), "Telegram message sent");
        }
        tracing::info!(chat_id = %self.chat_id, parts = total, "Telegram notification delivered");
        Ok(())
    }

    async fn test_connection(&self) -> Result<String> {
        let me = self.get_me().await?;
        let name = me.username.map(|u| format!("@{u}")).unwrap_or(me.first_name);
        tracing::info!(bot = %name, id = me.id, "Telegram connection ok");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("hello", MAX_MESSAGE_LEN), vec!["hello"]);
    }

    #[test]
    fn test_split_on_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_split_long_line() {
        let text = "x".repeat(10);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks, vec!["xxxx", "xxxx", "xx"]);
    }

    #[test]
    fn test_split_respects_limit_and_preserves_text() {
        let text: String = (0..500).map(|i| format!("line {i} 📈\n")).collect();
        let chunks = split_message(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.join("\n").trim_end(), text.trim_end());
    }

    #[test]
    fn test_payload_shape() {
        let payload = SendMessage {
            chat_id: "42",
            text: "*hi*",
            parse_mode: Some(PARSE_MODE),
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["parse_mode"], "Markdown");
        assert_eq!(json["disable_web_page_preview"], true);

        let plain = SendMessage {
            chat_id: "42",
            text: "*hi",
            parse_mode: None,
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("parse_mode").is_none());
    }

    #[test]
    fn test_split_keeps_bold_entity_whole() {
        let text = format!("{} *bold words here* tail", "a".repeat(10));
        let chunks = split_message(&text, 20);

        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        for chunk in &chunks {
            assert_eq!(chunk.matches('*').count() % 2, 0, "unbalanced chunk {chunk:?}");
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_ignores_escaped_markers() {
        let text = format!("{}\\_{}", "a".repeat(5), "b".repeat(10));
        let chunks = split_message(&text, 6);

        assert!(chunks.iter().all(|c| !c.ends_with('\\')));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_markup_error_detection() {
        let err = parse_response::<serde_json::Value>(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 12"}"#,
        )
        .unwrap_err();
        assert!(is_markup_error(&err));
        assert!(!is_markup_error(&TrackerError::Notification("chat not found".to_string())));
    }

    #[test]
    fn test_parse_ok_response() {
        let user: BotUser = parse_response(
            r#"{"ok":true,"result":{"id":7,"is_bot":true,"first_name":"Tracker","username":"tracker_bot"}}"#,
        )
        .unwrap();
        assert_eq!(user.username.as_deref(), Some("tracker_bot"));
    }

    #[test]
    fn test_parse_error_response() {
        let err = parse_response::<serde_json::Value>(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TrackerError::Notification(ref m) if m.contains("chat not found")));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        assert!(TelegramNotifier::from_config(&TrackerConfig::default()).is_err());

        let config = TrackerConfig::builder().telegram("123:abc", "42").build().unwrap();
        let notifier = TelegramNotifier::from_config(&config).unwrap();
        assert_eq!(notifier.chat_id(), "42");
        assert_eq!(notifier.method_url("getMe"), "https://api.telegram.org/bot123:abc/getMe");
    }

    #[tokio::test]
    #[ignore = "requires TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID"]
    async fn test_live_connection() {
        let config = TrackerConfig::from_env().unwrap();
        let notifier = TelegramNotifier::from_config(&config).unwrap();
        assert!(notifier.test_connection().await.is_ok());
    }
}
