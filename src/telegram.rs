use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::debug;

use crate::config::Config;
use crate::model::NotificationMessage;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/";

/// Result of one `sendMessage` call. `delivered` is true only when the HTTP
/// status is a success and the body carries `"ok": true`.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    pub delivered: bool,
    pub status: u16,
    pub body: Value,
}

impl SendReport {
    pub fn classify(status: u16, body: Value) -> Self {
        let acked = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
        Self {
            delivered: (200..300).contains(&status) && acked,
            status,
            body,
        }
    }

    /// Telegram's `description` for a rejected call, if any.
    pub fn description(&self) -> Option<&str> {
        self.body.get("description").and_then(Value::as_str)
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Exactly one outbound call. `Err` means the call never produced a
    /// response (connection, timeout, unreadable body).
    async fn send(&self, chat_id: &str, message: &NotificationMessage) -> Result<SendReport>;
}

#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        let base_url = Url::parse(TELEGRAM_API_BASE).expect("valid default Telegram URL");
        Self::with_base_url(token, base_url)
    }

    pub fn with_base_url(token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("booking-notifier/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url =
            Url::parse(&cfg.telegram.api_base).context("invalid telegram.api_base URL")?;
        Ok(Self::with_base_url(cfg.telegram.bot_token.clone(), base_url))
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("./bot{}/sendMessage", self.token))
            .context("invalid Telegram base URL")?;
        self.http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .map_err(|e| e.without_url())
            .context("failed to build Telegram request")
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send(&self, chat_id: &str, message: &NotificationMessage) -> Result<SendReport> {
        if chat_id.trim().is_empty() {
            bail!("refusing to send to an empty chat id");
        }
        let body = build_send_message_body(chat_id, message);
        let request = self.build_request(&body)?;
        debug!(chat_id, "sending telegram message");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| e.without_url())
            .context("failed to reach Telegram")?;
        let status = res.status().as_u16();
        let raw = res
            .text()
            .await
            .map_err(|e| e.without_url())
            .context("failed to read Telegram response")?;
        let body = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        Ok(SendReport::classify(status, body))
    }
}

pub fn build_send_message_body(chat_id: &str, message: &NotificationMessage) -> Value {
    let mut body = Map::new();
    body.insert("chat_id".into(), json!(chat_id));
    body.insert("text".into(), json!(message.text));
    if let Some(mode) = message.parse_mode.as_api_str() {
        body.insert("parse_mode".into(), json!(mode));
    }
    body.insert("disable_web_page_preview".into(), json!(true));
    Value::Object(body)
}
