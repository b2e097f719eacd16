use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Pilot,
    Commander,
}

impl Tier {
    /// Anything other than `commander` is treated as the entry tier.
    pub fn from_stored(raw: &str) -> Self {
        if raw.trim() == "commander" {
            Tier::Commander
        } else {
            Tier::Pilot
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Pilot => "pilot",
            Tier::Commander => "commander",
        }
    }

    /// Precedence: persisted override, then the profile's tier, then `Pilot`.
    /// Admins are always promoted.
    pub fn resolve(stored_override: Option<&str>, profile_tier: Option<&str>, role: Option<Role>) -> Self {
        if role == Some(Role::Admin) {
            return Tier::Commander;
        }

        stored_override
            .filter(|raw| !raw.trim().is_empty())
            .or_else(|| profile_tier.filter(|raw| !raw.trim().is_empty()))
            .map(Tier::from_stored)
            .unwrap_or_default()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == "admin" { Role::Admin } else { Role::User })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Dashboard,
    Logs,
    Settings,
}

impl View {
    pub const ALL: [View; 3] = [View::Dashboard, View::Logs, View::Settings];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Dashboard => "dashboard",
            View::Logs => "logs",
            View::Settings => "settings",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Router,
    Planner,
    Executor,
    Validator,
}

impl PipelineStage {
    /// Fixed reveal order of the dashboard panels.
    pub const ORDER: [PipelineStage; 4] = [
        PipelineStage::Router,
        PipelineStage::Planner,
        PipelineStage::Executor,
        PipelineStage::Validator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Router => "router",
            PipelineStage::Planner => "planner",
            PipelineStage::Executor => "executor",
            PipelineStage::Validator => "validator",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile persisted by the login page under `liftops_user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl UserProfile {
    pub const GUEST_EMAIL: &'static str = "guest@example.com";

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    pub fn email_or_guest(&self) -> &str {
        self.email
            .as_deref()
            .filter(|email| !email.is_empty())
            .unwrap_or(Self::GUEST_EMAIL)
    }
}
