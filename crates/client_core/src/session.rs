//! Session bootstrap from persisted client state.

use anyhow::{Context, Result};
use shared::domain::{Tier, UserProfile};
use storage::StateStore;
use tracing::{info, warn};

pub const DEFAULT_LOGIN_LOCATION: &str = "/login.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// No auth token is stored; the caller must navigate away.
    Redirect { location: String },
    Ready(Session),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    user: UserProfile,
    tier: Tier,
}

impl Session {
    pub fn new(token: impl Into<String>, user: UserProfile, tier: Tier) -> Self {
        Self {
            token: token.into(),
            user,
            tier,
        }
    }

    /// Reads the session once. Admins are promoted and the promotion is
    /// written back as the tier override.
    pub async fn bootstrap(store: &dyn StateStore, login_location: &str) -> Result<Bootstrap> {
        let snapshot = store
            .load_snapshot()
            .await
            .context("failed to read persisted session")?;

        let Some(token) = snapshot.auth_token.filter(|token| !token.is_empty()) else {
            info!(location = login_location, "no auth token stored; redirecting");
            return Ok(Bootstrap::Redirect {
                location: login_location.to_string(),
            });
        };

        let user = match snapshot.user_json.as_deref() {
            Some(raw) => serde_json::from_str::<UserProfile>(raw).unwrap_or_else(|err| {
                warn!(error = %err, "stored user profile is not valid json; ignoring it");
                UserProfile::default()
            }),
            None => UserProfile::default(),
        };

        let tier = Tier::resolve(
            snapshot.tier_override.as_deref(),
            user.tier.as_deref(),
            user.role,
        );

        if user.is_admin() {
            store
                .save_tier(Tier::Commander)
                .await
                .context("failed to persist admin tier")?;
        }

        info!(tier = %tier, admin = user.is_admin(), "session restored");
        Ok(Bootstrap::Ready(Self { token, user, tier }))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn email_or_guest(&self) -> &str {
        self.user.email_or_guest()
    }

    /// The only place the tier changes after bootstrap. The store is
    /// written first so a failed write leaves the session untouched.
    pub async fn upgrade_to_commander(&mut self, store: &dyn StateStore) -> Result<()> {
        store
            .save_tier(Tier::Commander)
            .await
            .context("failed to persist upgraded tier")?;
        self.tier = Tier::Commander;
        Ok(())
    }
}
