//! Normalization of raw store fields.
//!
//! Lookup and linked-record columns come back as single-element arrays while
//! plain columns come back as bare scalars; both collapse to the same value here.

use serde_json::{Map, Value};

use crate::config::Fields;
use crate::model::{Booking, BookingRecord};

pub const DEFAULT_COURSE: &str = "Unknown Course";
pub const DEFAULT_DATE: &str = "Unknown Date";
pub const DEFAULT_INSTRUCTOR: &str = "Instructor";

/// Collapse a raw field into a scalar string.
///
/// Arrays yield their first element, blank strings and nulls yield `None`.
/// Objects have no scalar reading and also yield `None`.
pub fn scalar(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Null => None,
        Value::Array(items) => scalar(items.first()),
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(format_number(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) => None,
    }
}

/// `scalar` with a fallback for absent values.
pub fn scalar_or(raw: Option<&Value>, default: &str) -> String {
    scalar(raw).unwrap_or_else(|| default.to_string())
}

/// Checkbox-style reading of a field: `true`, `1`, or `"true"`.
pub fn flag(raw: Option<&Value>) -> bool {
    match scalar(raw).as_deref() {
        Some("true") | Some("1") => true,
        Some(other) => other.eq_ignore_ascii_case("true"),
        None => false,
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        _ => n.to_string(),
    }
}

/// Normalize a field mapping using the given column names.
pub fn booking_from_fields(
    record_id: Option<String>,
    fields: &Map<String, Value>,
    names: &Fields,
) -> Booking {
    let get = |name: &str| fields.get(name);
    Booking {
        record_id: record_id.filter(|id| !id.trim().is_empty()),
        recipient: scalar(get(&names.recipient)),
        instructor: scalar_or(get(&names.instructor), DEFAULT_INSTRUCTOR),
        course: scalar_or(get(&names.course), DEFAULT_COURSE),
        date: scalar_or(get(&names.date), DEFAULT_DATE),
        duration: scalar_or(get(&names.duration), ""),
        business: scalar_or(get(&names.business), ""),
        location: scalar_or(get(&names.location), ""),
        address: scalar_or(get(&names.address), ""),
        map_link: scalar_or(get(&names.map_link), ""),
        fee: scalar_or(get(&names.fee), ""),
        contact_email: scalar_or(get(&names.contact_email), ""),
    }
}

pub fn booking_from_record(record: &BookingRecord, names: &Fields) -> Booking {
    booking_from_fields(Some(record.id.clone()), &record.fields, names)
}

/// Store-side eligibility check, mirroring the list filter formula.
pub fn is_eligible(record: &BookingRecord, names: &Fields, eligible_status: &str) -> bool {
    let fields = &record.fields;
    flag(fields.get(&names.notify_due))
        && scalar(fields.get(&names.status)).as_deref() == Some(eligible_status)
        && scalar(fields.get(&names.recipient)).is_some()
}

/// Key names used by the inbound trigger payload.
pub fn trigger_fields() -> Fields {
    Fields {
        notify_due: "notify".into(),
        status: "status".into(),
        recipient: "telegram_id".into(),
        instructor: "instructor".into(),
        course: "course".into(),
        date: "date".into(),
        duration: "duration".into(),
        business: "business".into(),
        location: "location".into(),
        address: "full_address".into(),
        map_link: "map_link".into(),
        fee: "instructor_fee".into(),
        contact_email: "contact_email".into(),
        notified_at: "notified_at".into(),
    }
}
