use std::{
    collections::HashMap,
    fs,
    path::Path,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use client_core::{
    DashboardTimings, PaymentMode, PaymentSettings, StagePolicy, DEFAULT_BANK_LATENCY,
    DEFAULT_LOGIN_LOCATION, DEFAULT_STAGE_DELAY, DEFAULT_UPGRADE_SETTLE_DELAY,
};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "dashboard.toml";

const FIELDS: [&str; 9] = [
    "server_url",
    "database_url",
    "payment_mode",
    "stage_delay_ms",
    "upgrade_settle_delay_ms",
    "bank_latency_ms",
    "stripe_api_url",
    "stripe_payment_method",
    "login_location",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub database_url: String,
    pub payment_mode: PaymentMode,
    pub stage_delay_ms: u64,
    pub upgrade_settle_delay_ms: u64,
    pub bank_latency_ms: u64,
    pub stripe_api_url: String,
    pub stripe_payment_method: String,
    pub login_location: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            database_url: "sqlite://./data/client_state.db".into(),
            payment_mode: PaymentMode::Hosted,
            stage_delay_ms: whole_millis(DEFAULT_STAGE_DELAY),
            upgrade_settle_delay_ms: whole_millis(DEFAULT_UPGRADE_SETTLE_DELAY),
            bank_latency_ms: whole_millis(DEFAULT_BANK_LATENCY),
            stripe_api_url: "https://api.stripe.com".into(),
            stripe_payment_method: "pm_card_visa".into(),
            login_location: DEFAULT_LOGIN_LOCATION.into(),
        }
    }
}

impl Settings {
    pub fn timings(&self) -> DashboardTimings {
        DashboardTimings {
            stages: StagePolicy::new(Duration::from_millis(self.stage_delay_ms)),
            upgrade_settle_delay: Duration::from_millis(self.upgrade_settle_delay_ms),
        }
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings {
            mode: self.payment_mode,
            stripe_api_url: self.stripe_api_url.clone(),
            stripe_payment_method: self.stripe_payment_method.clone(),
            bank_latency: Duration::from_millis(self.bank_latency_ms),
        }
    }

    fn set(&mut self, field: &str, raw: &str) -> Result<()> {
        let raw = raw.trim();
        match field {
            "server_url" => self.server_url = raw.to_string(),
            "database_url" => self.database_url = normalize_database_url(raw),
            "payment_mode" => self.payment_mode = raw.parse()?,
            "stage_delay_ms" => self.stage_delay_ms = parse_millis(field, raw)?,
            "upgrade_settle_delay_ms" => self.upgrade_settle_delay_ms = parse_millis(field, raw)?,
            "bank_latency_ms" => self.bank_latency_ms = parse_millis(field, raw)?,
            "stripe_api_url" => self.stripe_api_url = raw.to_string(),
            "stripe_payment_method" => self.stripe_payment_method = raw.to_string(),
            "login_location" => self.login_location = raw.to_string(),
            other => return Err(anyhow!("unknown setting '{other}'")),
        }
        Ok(())
    }
}

/// Defaults, then the config file, then `LIFTOPS_*` and `APP__*` variables.
/// An explicitly named config file must exist; the default one is optional.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let raw = match config_path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_PATH).ok(),
    };
    if let Some(raw) = raw {
        apply_file(&mut settings, &raw)?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

pub(crate) fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg: HashMap<String, toml::Value> =
        toml::from_str(raw).context("config file is not valid toml")?;

    for (key, value) in file_cfg {
        if !FIELDS.contains(&key.as_str()) {
            warn!(key = %key, "ignoring unknown config key");
            continue;
        }
        let raw = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(n) => n.to_string(),
            other => {
                return Err(anyhow!(
                    "config key '{key}' must be a string or integer, got {}",
                    other.type_str()
                ))
            }
        };
        settings
            .set(&key, &raw)
            .with_context(|| format!("invalid value for config key '{key}'"))?;
    }
    Ok(())
}

/// For each field `foo_bar`, `LIFTOPS_FOO_BAR` applies first and
/// `APP__FOO_BAR` wins over it.
pub(crate) fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    for field in FIELDS {
        let upper = field.to_ascii_uppercase();
        for key in [format!("LIFTOPS_{upper}"), format!("APP__{upper}")] {
            if let Some(value) = lookup(&key) {
                settings
                    .set(field, &value)
                    .with_context(|| format!("invalid value in {key}"))?;
            }
        }
    }
    Ok(())
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_millis(field: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .with_context(|| format!("{field} must be a whole number of milliseconds, got '{raw}'"))
}

/// Plain file paths become `sqlite://` urls; anything that already looks
/// like a url is kept as is.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
