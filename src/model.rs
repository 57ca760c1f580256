use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row of the bookings table as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A booking after field normalization. Only `recipient` may be absent;
/// every other field already carries its default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Booking {
    pub record_id: Option<String>,
    pub recipient: Option<String>,
    pub instructor: String,
    pub course: String,
    pub date: String,
    pub duration: String,
    pub business: String,
    pub location: String,
    pub address: String,
    pub map_link: String,
    pub fee: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParseMode {
    Plain,
    Html,
}

impl ParseMode {
    /// Value of Telegram's `parse_mode` parameter, `None` for plain text.
    pub fn as_api_str(&self) -> Option<&'static str> {
        match self {
            ParseMode::Plain => None,
            ParseMode::Html => Some("HTML"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub text: String,
    pub parse_mode: ParseMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    SkippedInvalidRecipient,
    SendFailed,
    /// Message delivered but the record still reads as due.
    UpdateFailed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::SkippedInvalidRecipient => "skipped_invalid_recipient",
            DispatchOutcome::SendFailed => "send_failed",
            DispatchOutcome::UpdateFailed => "update_failed",
        }
    }
}

/// Tally of one poll cycle, in store order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub outcomes: Vec<(String, DispatchOutcome)>,
}

impl CycleReport {
    pub fn count(&self, outcome: DispatchOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
