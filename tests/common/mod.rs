#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use booking_notifier::airtable::RecordStore;
use booking_notifier::config::{Config, Fields};
use booking_notifier::extract;
use booking_notifier::model::{BookingRecord, NotificationMessage};
use booking_notifier::telegram::{MessageSender, SendReport};

pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(booking_notifier::config::example()).unwrap();
    cfg.app.send_delay_ms = 0;
    cfg
}

pub fn record(id: &str, fields: Value) -> BookingRecord {
    BookingRecord {
        id: id.into(),
        fields: fields.as_object().cloned().unwrap_or_default(),
    }
}

pub fn due_record(id: &str, recipient: Value, course: &str, date: &str) -> BookingRecord {
    record(
        id,
        json!({
            "Send notification Telegram to instructor": true,
            "Course status": "Scheduled",
            "Instructor Telegram ID": recipient,
            "Instructor": ["Jane Doe"],
            "Course (text)": course,
            "Matrix date": date,
        }),
    )
}

pub fn ack(ok: bool) -> SendReport {
    if ok {
        SendReport::classify(200, json!({"ok": true, "result": {"message_id": 1}}))
    } else {
        SendReport::classify(
            200,
            json!({"ok": false, "description": "Forbidden: bot was blocked by the user"}),
        )
    }
}

/// Ordered log of side effects shared by the fakes.
pub type Events = Arc<Mutex<Vec<String>>>;

/// Bookings table held in memory. `fetch_due` applies the same predicate
/// as the store's filter formula.
#[derive(Clone)]
pub struct InMemoryStore {
    pub records: Arc<Mutex<Vec<BookingRecord>>>,
    pub fields: Fields,
    pub events: Events,
    pub fail_fetch: bool,
    pub fail_updates: bool,
    pub update_calls: Arc<Mutex<Vec<String>>>,
}

impl InMemoryStore {
    pub fn new(records: Vec<BookingRecord>, events: Events) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            fields: Fields::default(),
            events,
            fail_fetch: false,
            fail_updates: false,
            update_calls: Arc::default(),
        }
    }

    pub async fn update_calls(&self) -> Vec<String> {
        self.update_calls.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<BookingRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn is_due(&self, id: &str) -> bool {
        self.get(id)
            .await
            .map(|r| extract::flag(r.fields.get(&self.fields.notify_due)))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryStore {
    async fn fetch_due(&self) -> Result<Vec<BookingRecord>> {
        if self.fail_fetch {
            return Err(anyhow!("airtable error 503: unavailable"));
        }
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| extract::is_eligible(r, &self.fields, "Scheduled"))
            .cloned()
            .collect())
    }

    async fn mark_notified(&self, record_id: &str) -> Result<()> {
        self.update_calls.lock().await.push(record_id.to_string());
        self.events.lock().await.push(format!("update:{}", record_id));
        if self.fail_updates {
            return Err(anyhow!("airtable error 422: INVALID_VALUE_FOR_COLUMN"));
        }
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| anyhow!("airtable error 404: NOT_FOUND"))?;
        record
            .fields
            .insert(self.fields.notify_due.clone(), json!(false));
        record.fields.insert(
            self.fields.notified_at.clone(),
            json!("2024-05-01T09:30:00Z"),
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SendCall {
    pub chat_id: String,
    pub message: NotificationMessage,
}

#[derive(Clone)]
pub struct RecordingSender {
    pub responses: Arc<Mutex<VecDeque<Result<SendReport>>>>,
    pub calls: Arc<Mutex<Vec<SendCall>>>,
    pub events: Events,
}

impl RecordingSender {
    pub fn new(events: Events) -> Self {
        Self::with_responses(vec![], events)
    }

    pub fn with_responses(responses: Vec<Result<SendReport>>, events: Events) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            calls: Arc::default(),
            events,
        }
    }

    pub async fn calls(&self) -> Vec<SendCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, chat_id: &str, message: &NotificationMessage) -> Result<SendReport> {
        self.calls.lock().await.push(SendCall {
            chat_id: chat_id.to_string(),
            message: message.clone(),
        });
        self.events.lock().await.push(format!("send:{}", chat_id));
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or_else(|| Ok(ack(true)))
    }
}
