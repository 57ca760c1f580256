use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, warn};

use crate::config::{Config, Fields};
use crate::model::BookingRecord;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records currently matching the eligibility filter, in store order.
    async fn fetch_due(&self) -> Result<Vec<BookingRecord>>;

    /// Clear the due flag and stamp the sent time. Safe to repeat.
    async fn mark_notified(&self, record_id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct AirtableClient {
    http: Client,
    base_url: Url,
    api_key: String,
    base_id: String,
    table: String,
    fields: Fields,
    filter_formula: String,
}

impl fmt::Debug for AirtableClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableClient")
            .field("base_url", &self.base_url)
            .field("base_id", &self.base_id)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl AirtableClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url =
            Url::parse(&cfg.airtable.api_base).context("invalid airtable.api_base URL")?;
        Ok(Self::with_base_url(cfg, base_url))
    }

    pub fn with_base_url(cfg: &Config, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("booking-notifier/0.1")
            .build()
            .expect("reqwest client");
        let filter_formula = cfg
            .airtable
            .filter_formula
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| {
                due_filter_formula(&cfg.airtable.fields, &cfg.airtable.eligible_status)
            });
        Self {
            http,
            base_url,
            api_key: cfg.airtable.api_key.clone(),
            base_id: cfg.airtable.base_id.clone(),
            table: cfg.airtable.table.clone(),
            fields: cfg.airtable.fields.clone(),
            filter_formula,
        }
    }

    pub fn filter_formula(&self) -> &str {
        &self.filter_formula
    }

    /// `v0/{base}/{table}[/{record}]`, each segment percent-encoded.
    pub fn table_url(&self, record_id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Airtable base URL cannot be a base"))?;
            segments.pop_if_empty();
            segments.push("v0").push(&self.base_id).push(&self.table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    pub fn build_list_request(&self, offset: Option<&str>) -> Result<reqwest::Request> {
        let mut url = self.table_url(None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("filterByFormula", &self.filter_formula);
            if let Some(offset) = offset {
                query.append_pair("offset", offset);
            }
        }
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .build()
            .context("failed to build Airtable list request")
    }

    pub fn build_update_request(
        &self,
        record_id: &str,
        now: DateTime<Utc>,
    ) -> Result<reqwest::Request> {
        let url = self.table_url(Some(record_id))?;
        let body = build_mark_notified_body(&self.fields, now);
        self.http
            .patch(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .context("failed to build Airtable update request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<Value> {
        debug!(method=%request.method(), path=%request.url().path(), "sending airtable request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Airtable")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Airtable: {}", body);
            return Err(anyhow!("received 429 from Airtable: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("airtable error {}: {}", status, body));
        }
        res.json::<Value>()
            .await
            .context("invalid Airtable response JSON")
    }
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn fetch_due(&self) -> Result<Vec<BookingRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let request = self.build_list_request(offset.as_deref())?;
            let value = self.execute(request).await?;
            let page: ListRecordsResponse =
                serde_json::from_value(value).context("unexpected Airtable list shape")?;
            records.extend(page.records);
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn mark_notified(&self, record_id: &str) -> Result<()> {
        let request = self.build_update_request(record_id, Utc::now())?;
        self.execute(request)
            .await
            .with_context(|| format!("failed to update record {}", record_id))?;
        Ok(())
    }
}

/// Formula selecting due, scheduled bookings that have a recipient.
pub fn due_filter_formula(fields: &Fields, eligible_status: &str) -> String {
    format!(
        "AND({{{}}} = 1, {{{}}} = \"{}\", {{{}}} != \"\")",
        fields.notify_due,
        fields.status,
        eligible_status.replace('"', "\\\""),
        fields.recipient
    )
}

pub fn build_mark_notified_body(fields: &Fields, now: DateTime<Utc>) -> Value {
    let mut update = Map::new();
    update.insert(fields.notify_due.clone(), json!(false));
    update.insert(
        fields.notified_at.clone(),
        json!(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    json!({ "fields": Value::Object(update) })
}

#[derive(Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<BookingRecord>,
    offset: Option<String>,
}
