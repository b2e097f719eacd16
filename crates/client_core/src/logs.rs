//! Pipeline history table.

use chrono::{DateTime, Local, NaiveDateTime};
use shared::protocol::LogEntry;
use tracing::{error, info};

use crate::{
    error::ClientError,
    state::{DashboardEvent, LogTable},
    Dashboard,
};

const ID_PREFIX_LEN: usize = 8;
const MISSING_ID: &str = "N/A";
const UNKNOWN_INTENT: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDot {
    Online,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyBadge {
    Valid,
    Blocked,
}

impl SafetyBadge {
    pub fn label(&self) -> &'static str {
        match self {
            SafetyBadge::Valid => "Valid",
            SafetyBadge::Blocked => "Blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub status: StatusDot,
    pub time: String,
    pub id: String,
    pub intent: String,
    pub safety: SafetyBadge,
}

impl LogRow {
    pub fn from_entry(entry: &LogEntry) -> Self {
        let valid = entry.is_valid();
        let id_prefix = entry
            .request_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| id.chars().take(ID_PREFIX_LEN).collect::<String>())
            .unwrap_or_else(|| MISSING_ID.to_string());

        Self {
            status: if valid {
                StatusDot::Online
            } else {
                StatusDot::Error
            },
            time: format_saved_at(entry.saved_at.as_deref()),
            id: format!("{id_prefix}..."),
            intent: entry.intent().unwrap_or(UNKNOWN_INTENT).to_string(),
            safety: if valid {
                SafetyBadge::Valid
            } else {
                SafetyBadge::Blocked
            },
        }
    }
}

/// Local wall-clock time of the entry; entries without a usable timestamp
/// show the current time.
fn format_saved_at(saved_at: Option<&str>) -> String {
    const TIME_FORMAT: &str = "%H:%M:%S";

    let Some(raw) = saved_at.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Local::now().format(TIME_FORMAT).to_string();
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Local).format(TIME_FORMAT).to_string();
    }
    // Offset-less ISO timestamps are already local time.
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.format(TIME_FORMAT).to_string();
    }

    Local::now().format(TIME_FORMAT).to_string()
}

impl Dashboard {
    /// Replaces the table with the loading placeholder and renders the
    /// fetched history. A failed fetch leaves the placeholder in place.
    pub async fn load_logs(&self) -> Result<Vec<LogRow>, ClientError> {
        {
            let mut state = self.inner.lock().await;
            state.logs = LogTable::Loading;
        }
        self.emit(DashboardEvent::LogsLoading);

        let entries = match self.api.history().await {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, "failed to load pipeline history");
                return Err(err);
            }
        };

        let rows: Vec<LogRow> = entries.iter().map(LogRow::from_entry).collect();
        {
            let mut state = self.inner.lock().await;
            state.logs = LogTable::Rendered(rows.clone());
        }
        info!(rows = rows.len(), "rendered pipeline history");
        self.emit(DashboardEvent::LogsRendered(rows.clone()));
        Ok(rows)
    }

    pub async fn refresh_logs(&self) -> Result<Vec<LogRow>, ClientError> {
        self.load_logs().await
    }
}

#[cfg(test)]
mod tests {
    use shared::protocol::{RouterDigest, ValidatorDigest};

    use super::*;

    #[test]
    fn blocked_entry_without_request_id_uses_fallbacks() {
        let row = LogRow::from_entry(&LogEntry {
            saved_at: Some("2024-05-01T09:15:30.123456".into()),
            request_id: None,
            router: None,
            validator: Some(ValidatorDigest { valid: false }),
        });

        assert_eq!(row.status, StatusDot::Error);
        assert_eq!(row.safety, SafetyBadge::Blocked);
        assert_eq!(row.safety.label(), "Blocked");
        assert_eq!(row.id, "N/A...");
        assert_eq!(row.intent, "Unknown");
        assert_eq!(row.time, "09:15:30");
    }

    #[test]
    fn valid_entry_truncates_id_and_shows_intent() {
        let row = LogRow::from_entry(&LogEntry {
            saved_at: None,
            request_id: Some("0f3c9a7e-1d2b-4c5d-8e9f-001122334455".into()),
            router: Some(RouterDigest {
                intent: Some("summarize quarterly report".into()),
            }),
            validator: Some(ValidatorDigest { valid: true }),
        });

        assert_eq!(row.status, StatusDot::Online);
        assert_eq!(row.safety.label(), "Valid");
        assert_eq!(row.id, "0f3c9a7e...");
        assert_eq!(row.intent, "summarize quarterly report");
        assert_eq!(row.time.len(), 8);
    }

    #[test]
    fn empty_intent_and_id_are_treated_as_missing() {
        let row = LogRow::from_entry(&LogEntry {
            request_id: Some(String::new()),
            router: Some(RouterDigest {
                intent: Some(String::new()),
            }),
            ..Default::default()
        });
        assert_eq!(row.id, "N/A...");
        assert_eq!(row.intent, "Unknown");
    }

    #[test]
    fn unparsable_timestamp_falls_back_to_now() {
        assert_eq!(format_saved_at(Some("yesterday")).len(), 8);
    }
}
