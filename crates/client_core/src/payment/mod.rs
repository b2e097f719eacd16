//! Tier upgrade checkout behind the settings paywall.
//!
//! Exactly one [`PaymentFlow`] is wired into a dashboard. The hosted flow is
//! the production path; the mock card flow exists for local development and
//! upgrades without any payment proof.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::View;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    api::DashboardApi,
    state::{DashboardEvent, PaymentMessage},
    Dashboard,
};

mod hosted;
mod mock;

pub use hosted::{ConfirmedPayment, HostedPaymentFlow, PaymentConfirmer, StripeConfirmer};
pub use mock::{
    card_digit_count, format_card_number, MockCardFlow, DEFAULT_BANK_LATENCY, MIN_CARD_DIGITS,
};

pub const DEFAULT_UPGRADE_SETTLE_DELAY: Duration = Duration::from_millis(1500);
pub const UPGRADE_SUCCESS_MESSAGE: &str = "Payment Success! Upgrading...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    Hosted,
    Mock,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Hosted => "hosted",
            PaymentMode::Mock => "mock",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hosted" | "stripe" => Ok(PaymentMode::Hosted),
            "mock" => Ok(PaymentMode::Mock),
            other => Err(anyhow!("unknown payment mode '{other}' (expected hosted or mock)")),
        }
    }
}

/// Card fields typed into the checkout form. The hosted flow collects card
/// data through the provider instead and ignores these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentForm {
    pub card_number: String,
    pub expiry: String,
    pub cvc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub mode: PaymentMode,
    /// Provider payment reference, when there is one.
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("payment form is not loaded")]
    NotReady,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Declined(String),
    #[error("unexpected payment status '{0}'")]
    UnexpectedStatus(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("upgrade failed: {0}")]
    Upgrade(String),
    #[error("failed to load payment form: {0}")]
    Load(String),
}

impl PaymentError {
    pub const LOAD_FAILED_MESSAGE: &'static str =
        "Failed to load payment form. Check server logs.";

    /// Text shown in the paywall message area.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::NotReady => String::new(),
            PaymentError::Validation(message) | PaymentError::Declined(message) => {
                message.clone()
            }
            PaymentError::UnexpectedStatus(_) => "Unexpected payment status.".to_string(),
            PaymentError::Verification(message) => {
                format!("Payment succeeded but upgrade failed: {message}")
            }
            PaymentError::Upgrade(message) => format!("Upgrade failed: {message}"),
            PaymentError::Load(_) => Self::LOAD_FAILED_MESSAGE.to_string(),
        }
    }
}

#[async_trait]
pub trait PaymentFlow: Send + Sync {
    fn mode(&self) -> PaymentMode;

    /// One-time provider setup when the page loads.
    async fn init(&self) {}

    /// Loads the checkout surface; a no-op once loaded.
    async fn prepare(&self, email: &str) -> Result<(), PaymentError>;

    /// Collects payment and returns only once the upgrade is confirmed.
    async fn submit(&self, email: &str, form: &PaymentForm)
        -> Result<PaymentReceipt, PaymentError>;
}

/// Settings needed to build either flow from configuration.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub mode: PaymentMode,
    pub stripe_api_url: String,
    pub stripe_payment_method: String,
    pub bank_latency: Duration,
}

pub fn build_payment_flow(
    settings: &PaymentSettings,
    api: Arc<dyn DashboardApi>,
) -> Arc<dyn PaymentFlow> {
    match settings.mode {
        PaymentMode::Hosted => Arc::new(HostedPaymentFlow::new(
            api,
            Arc::new(StripeConfirmer::new(
                settings.stripe_api_url.clone(),
                settings.stripe_payment_method.clone(),
            )),
        )),
        PaymentMode::Mock => {
            warn!("mock card payments enabled; upgrades are granted without payment proof");
            Arc::new(MockCardFlow::new(api, settings.bank_latency))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Upgraded(PaymentReceipt),
    /// The checkout surface is not loaded yet; nothing happened.
    NotReady,
    /// A submission is already in flight.
    Busy,
    /// Blocking validation alert; nothing was submitted.
    Rejected(String),
    Failed(String),
}

impl Dashboard {
    pub async fn submit_payment(&self, form: &PaymentForm) -> SubmitOutcome {
        {
            let mut state = self.inner.lock().await;
            if state.paywall.loading {
                return SubmitOutcome::Busy;
            }
            state.paywall.loading = true;
        }
        self.emit(DashboardEvent::PaymentLoading(true));

        let email = self.session.read().await.email_or_guest().to_string();
        let outcome = match self.payment.submit(&email, form).await {
            Ok(receipt) => self.complete_upgrade(receipt).await,
            Err(PaymentError::NotReady) => SubmitOutcome::NotReady,
            Err(PaymentError::Validation(message)) => {
                self.emit(DashboardEvent::PaymentAlert(message.clone()));
                SubmitOutcome::Rejected(message)
            }
            Err(err) => {
                warn!(mode = %self.payment.mode(), error = %err, "payment failed");
                let text = err.user_message();
                self.show_payment_message(PaymentMessage {
                    text: text.clone(),
                    is_error: true,
                })
                .await;
                SubmitOutcome::Failed(text)
            }
        };

        self.set_payment_loading(false).await;
        outcome
    }

    async fn complete_upgrade(&self, receipt: PaymentReceipt) -> SubmitOutcome {
        self.show_payment_message(PaymentMessage {
            text: UPGRADE_SUCCESS_MESSAGE.to_string(),
            is_error: false,
        })
        .await;

        let upgraded = {
            let mut session = self.session.write().await;
            session
                .upgrade_to_commander(self.store.as_ref())
                .await
                .map(|_| session.tier())
        };
        let tier = match upgraded {
            Ok(tier) => tier,
            Err(err) => {
                error!(error = %err, "payment accepted but tier could not be saved");
                let text = PaymentError::Verification(format!("{err:#}")).user_message();
                self.show_payment_message(PaymentMessage {
                    text: text.clone(),
                    is_error: true,
                })
                .await;
                return SubmitOutcome::Failed(text);
            }
        };
        info!(mode = %receipt.mode, tier = %tier, "tier upgraded");
        self.emit(DashboardEvent::TierUpgraded(tier));

        tokio::time::sleep(self.timings.upgrade_settle_delay).await;
        self.close_paywall().await;
        self.toggle_view(View::Settings).await;

        SubmitOutcome::Upgraded(receipt)
    }

    pub(crate) async fn show_payment_message(&self, message: PaymentMessage) {
        {
            let mut state = self.inner.lock().await;
            state.paywall.message = Some(message.clone());
        }
        self.emit(DashboardEvent::PaymentMessage(message));
    }

    async fn set_payment_loading(&self, loading: bool) {
        {
            let mut state = self.inner.lock().await;
            state.paywall.loading = loading;
        }
        self.emit(DashboardEvent::PaymentLoading(loading));
    }
}
