//! Event id assignment.
//!
//! Precedence: an explicit `event_id` on the event, then `EVT-<request_id>`,
//! then a synthesized `EVT-<YYYYMMDD>-<6 digits>`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use auditchain_contracts::event::NewAuditEvent;

pub const EVENT_ID_PREFIX: &str = "EVT-";

/// Resolve the event id for `event`, synthesizing one if needed.
pub fn resolve_event_id(event: &NewAuditEvent, now: DateTime<Utc>) -> String {
    match non_blank(event.event_id.as_deref()) {
        Some(explicit) => explicit.to_string(),
        None => generate_event_id(event.request_id.as_deref(), now),
    }
}

/// `EVT-<request_id>` when a request id is present, else
/// `EVT-<YYYYMMDD>-<6 digits>` for the UTC date of `now`.
pub fn generate_event_id(request_id: Option<&str>, now: DateTime<Utc>) -> String {
    match non_blank(request_id) {
        Some(req) => format!("{}{}", EVENT_ID_PREFIX, req),
        None => format!("{}{}-{:06}", EVENT_ID_PREFIX, now.format("%Y%m%d"), random_six_digits()),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn random_six_digits() -> u32 {
    (Uuid::new_v4().as_u128() % 1_000_000) as u32
}
