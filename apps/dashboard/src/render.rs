//! Plain-text rendering of the dashboard model for the terminal.

use client_core::{DashboardEvent, DashboardState, LogRow, LogTable, StatusDot};
use shared::domain::{Tier, View};

pub fn log_table(rows: &[LogRow]) -> String {
    if rows.is_empty() {
        return "no pipeline runs recorded yet".to_string();
    }

    let mut out = format!(
        "{:<7} {:<9} {:<12} {:<32} {}\n",
        "STATUS", "TIME", "ID", "INTENT", "SAFETY"
    );
    for row in rows {
        let dot = match row.status {
            StatusDot::Online => "ok",
            StatusDot::Error => "error",
        };
        out.push_str(&format!(
            "{:<7} {:<9} {:<12} {:<32} {}\n",
            dot,
            row.time,
            row.id,
            row.intent,
            row.safety.label()
        ));
    }
    out
}

/// One line per live event worth showing; quiet events map to `None`.
pub fn event_line(event: &DashboardEvent) -> Option<String> {
    match event {
        DashboardEvent::PanelUpdated {
            stage,
            status,
            output: Some(output),
        } => Some(format!("== {stage} [{}] ==\n{output}", status.label())),
        DashboardEvent::PanelUpdated { stage, status, .. } => {
            Some(format!("-- {stage}: {}", status.label()))
        }
        DashboardEvent::PaywallOpened => Some("settings require the commander tier".to_string()),
        DashboardEvent::PaymentMessage(message) if message.is_error => {
            Some(format!("payment error: {}", message.text))
        }
        DashboardEvent::PaymentMessage(message) => Some(message.text.clone()),
        DashboardEvent::PaymentAlert(alert) => Some(format!("alert: {alert}")),
        DashboardEvent::TierUpgraded(tier) => Some(format!("tier is now {tier}")),
        _ => None,
    }
}

pub fn describe(state: &DashboardState, tier: Tier) -> String {
    let mut out = format!("view: {}\ntier: {tier}\n", state.active_view);
    if state.paywall.visible {
        out.push_str("paywall: open\n");
    }
    if let Some(message) = &state.paywall.message {
        out.push_str(&format!("payment: {}\n", message.text));
    }
    match state.active_view {
        View::Dashboard => {
            for panel in &state.panels {
                out.push_str(&format!(
                    "{}: {}\n",
                    panel.stage,
                    panel.status.label()
                ));
            }
        }
        View::Logs => match &state.logs {
            LogTable::Rendered(rows) => out.push_str(&log_table(rows)),
            LogTable::Loading => out.push_str("logs: loading\n"),
            LogTable::Empty => {}
        },
        View::Settings => out.push_str("settings unlocked\n"),
    }
    out
}
