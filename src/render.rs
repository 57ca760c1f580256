//! Telegram HTML rendering of a booking notification.

use crate::model::{Booking, NotificationMessage, ParseMode};

pub const ADDRESS_PLACEHOLDER: &str = "Not provided";

/// Render the assignment notice for one booking. Pure: the same booking and
/// link always produce byte-identical text.
pub fn render(booking: &Booking, details_url: Option<&str>) -> NotificationMessage {
    let mut lines = Vec::with_capacity(12);
    lines.push(format!(
        "👋 Hello <b>{}</b>, you’ve been assigned a course:",
        escape(first_name(&booking.instructor))
    ));
    lines.push(String::new());
    lines.push(format!("📚 <b>Course:</b> {}", escape(&booking.course)));
    lines.push(format!("📅 <b>Date:</b> {}", escape(&booking.date)));
    if !booking.duration.is_empty() {
        lines.push(format!("⏱ <b>Duration:</b> {}", escape(&booking.duration)));
    }
    if !booking.business.is_empty() {
        lines.push(format!("🏢 <b>Business:</b> {}", escape(&booking.business)));
    }
    if !booking.location.is_empty() {
        lines.push(format!("🏫 <b>Location:</b> {}", escape(&booking.location)));
    }
    lines.push(format!("📍 <b>Address:</b> {}", address_line(booking)));
    if !booking.fee.is_empty() {
        lines.push(format!("💷 <b>Instructor Fee:</b> {}", escape(&fee(&booking.fee))));
    }
    if !booking.contact_email.is_empty() {
        lines.push(format!("✉️ <b>Contact:</b> {}", escape(&booking.contact_email)));
    }
    lines.push(String::new());
    lines.push("💬 Any questions or comments, please contact the office.".to_string());
    if let Some(url) = details_url.map(str::trim).filter(|u| !u.is_empty()) {
        lines.push(format!(
            "📂 Full details of all courses assigned to you can be <a href=\"{}\">found in the database</a>.",
            escape_attr(url)
        ));
    }

    NotificationMessage {
        text: lines.join("\n"),
        parse_mode: ParseMode::Html,
    }
}

fn first_name(instructor: &str) -> &str {
    instructor.split_whitespace().next().unwrap_or("Instructor")
}

fn address_line(booking: &Booking) -> String {
    match (booking.address.is_empty(), booking.map_link.is_empty()) {
        (false, false) => format!(
            "<a href=\"{}\">{}</a>",
            escape_attr(&booking.map_link),
            escape(&booking.address)
        ),
        (false, true) => escape(&booking.address),
        (true, false) => format!("<a href=\"{}\">View map</a>", escape_attr(&booking.map_link)),
        (true, true) => ADDRESS_PLACEHOLDER.to_string(),
    }
}

fn fee(raw: &str) -> String {
    if raw.starts_with('£') {
        raw.to_string()
    } else {
        format!("£{}", raw)
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    escape(s).replace('"', "&quot;")
}
