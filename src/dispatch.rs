//! Pipeline driver: extract, validate, render, send, then mark the record.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use crate::airtable::RecordStore;
use crate::config::{Config, Fields};
use crate::extract;
use crate::model::{Booking, BookingRecord, CycleReport, DispatchOutcome};
use crate::render;
use crate::telegram::{MessageSender, SendReport};

/// Numeric chat id (negative for groups) or a public `@channel` handle.
static CHAT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d{1,20}|@[A-Za-z][A-Za-z0-9_]{4,31})$").expect("chat id regex"));

pub fn is_valid_chat_id(raw: &str) -> bool {
    CHAT_ID_RE.is_match(raw)
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("telegram rejected the message: {0}")]
    SendRejected(String),
    #[error("message delivered but record {record_id} was not marked as notified: {reason}")]
    RecordNotMarked { record_id: String, reason: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TriggerError {
    pub fn status_code(&self) -> u16 {
        match self {
            TriggerError::InvalidRecipient(_) | TriggerError::SendRejected(_) => 400,
            TriggerError::RecordNotMarked { .. } | TriggerError::Internal(_) => 500,
        }
    }
}

/// Successful trigger call. `record_updated` is `None` when the payload
/// carried no record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerResult {
    pub record_updated: Option<bool>,
}

enum Step {
    Skipped(String),
    Rejected(SendReport),
    Failed(anyhow::Error),
    Unmarked { record_id: String, err: anyhow::Error },
    Sent { updated: Option<bool> },
}

pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    sender: Arc<dyn MessageSender>,
    fields: Fields,
    details_url: Option<String>,
    send_delay: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RecordStore>, sender: Arc<dyn MessageSender>, cfg: &Config) -> Self {
        Self {
            store,
            sender,
            fields: cfg.airtable.fields.clone(),
            details_url: cfg.telegram.details_url.clone(),
            send_delay: cfg.send_delay(),
        }
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// One poll cycle. Errors only when the store query itself fails;
    /// per-record failures are reported in the returned tally.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let records = self
            .store
            .fetch_due()
            .await
            .context("failed to fetch due bookings")?;

        let mut report = CycleReport::default();
        if records.is_empty() {
            info!("no pending notifications");
            return Ok(report);
        }
        info!(count = records.len(), "processing due bookings");

        let mut sent_any = false;
        for record in &records {
            let outcome = self.paced_dispatch(record, sent_any).await;
            sent_any |= outcome != DispatchOutcome::SkippedInvalidRecipient;
            report.outcomes.push((record.id.clone(), outcome));
        }

        info!(
            sent = report.count(DispatchOutcome::Sent),
            skipped = report.count(DispatchOutcome::SkippedInvalidRecipient),
            send_failed = report.count(DispatchOutcome::SendFailed),
            update_failed = report.count(DispatchOutcome::UpdateFailed),
            "cycle finished"
        );
        Ok(report)
    }

    /// Drive a single store record through the pipeline.
    #[instrument(skip_all, fields(record_id = %record.id))]
    pub async fn dispatch_record(&self, record: &BookingRecord) -> DispatchOutcome {
        self.paced_dispatch(record, false).await
    }

    /// With `pace` set, waits `send_delay` right before the Telegram call.
    /// Records skipped at validation never wait.
    async fn paced_dispatch(&self, record: &BookingRecord, pace: bool) -> DispatchOutcome {
        let booking = extract::booking_from_record(record, &self.fields);
        match self.deliver(&booking, pace).await {
            Step::Skipped(_) => DispatchOutcome::SkippedInvalidRecipient,
            Step::Rejected(_) | Step::Failed(_) => DispatchOutcome::SendFailed,
            Step::Unmarked { .. } => DispatchOutcome::UpdateFailed,
            Step::Sent { .. } => DispatchOutcome::Sent,
        }
    }

    /// Handle one pre-extracted payload from the inbound trigger.
    ///
    /// Concurrent calls for the same record id are not serialized; both may
    /// send before either marks the record.
    #[instrument(skip_all)]
    pub async fn dispatch_trigger(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<TriggerResult, TriggerError> {
        let record_id = extract::scalar(payload.get("record_id"));
        let booking =
            extract::booking_from_fields(record_id, payload, &extract::trigger_fields());
        match self.deliver(&booking, false).await {
            Step::Skipped(reason) => Err(TriggerError::InvalidRecipient(reason)),
            Step::Rejected(report) => Err(TriggerError::SendRejected(
                report
                    .description()
                    .map(str::to_string)
                    .unwrap_or_else(|| report.body.to_string()),
            )),
            Step::Failed(err) => Err(TriggerError::Internal(err)),
            Step::Unmarked { record_id, err } => Err(TriggerError::RecordNotMarked {
                record_id,
                reason: format!("{:#}", err),
            }),
            Step::Sent { updated } => Ok(TriggerResult {
                record_updated: updated,
            }),
        }
    }

    async fn deliver(&self, booking: &Booking, pace: bool) -> Step {
        let record_id = booking.record_id.as_deref().unwrap_or("-");
        let recipient = match booking.recipient.as_deref() {
            Some(r) if is_valid_chat_id(r) => r,
            Some(r) => {
                warn!(record_id, recipient = r, stage = "validate", "invalid telegram chat id; skipping");
                return Step::Skipped(format!("'{}' is not a telegram chat id", r));
            }
            None => {
                warn!(record_id, stage = "validate", "missing telegram chat id; skipping");
                return Step::Skipped("missing telegram chat id".into());
            }
        };

        let message = render::render(booking, self.details_url.as_deref());
        if pace && !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        let report = match self.sender.send(recipient, &message).await {
            Ok(report) => report,
            Err(err) => {
                error!(?err, record_id, recipient, stage = "send", "telegram call failed");
                return Step::Failed(err);
            }
        };
        if !report.delivered {
            error!(
                record_id,
                recipient,
                stage = "send",
                status = report.status,
                response = %report.body,
                "telegram rejected message"
            );
            return Step::Rejected(report);
        }
        info!(record_id, recipient, "telegram message sent");

        let Some(id) = booking.record_id.as_deref() else {
            return Step::Sent { updated: None };
        };
        match self.store.mark_notified(id).await {
            Ok(()) => {
                info!(record_id = id, "record marked as notified");
                Step::Sent {
                    updated: Some(true),
                }
            }
            Err(err) => {
                error!(
                    ?err,
                    record_id = id,
                    recipient,
                    stage = "update",
                    "message sent but record not marked; it will be sent again next cycle"
                );
                Step::Unmarked {
                    record_id: id.to_string(),
                    err,
                }
            }
        }
    }
}

/// Run cycles every `interval` until `shutdown` resolves. A cycle in progress
/// always finishes before shutdown is observed.
pub async fn run_poll_loop<F>(dispatcher: &Dispatcher, interval: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested; stopping poll loop");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = dispatcher.run_cycle().await {
                    error!(?err, stage = "fetch", "poll cycle failed");
                }
            }
        }
    }
}
