//! View switching and the tier gate in front of settings.

use shared::domain::{Tier, View};
use tracing::{debug, info, warn};

use crate::{
    payment::PaymentError,
    state::{DashboardEvent, PaymentMessage},
    Dashboard,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    Activated(View),
    /// Settings was requested below the required tier; the paywall is shown instead.
    Paywalled,
}

impl Dashboard {
    /// Navigation entry point. Opening logs reloads them; opening settings
    /// requires the commander tier.
    pub async fn activate(&self, view: View) -> ViewOutcome {
        if view == View::Settings {
            let tier = self.session.read().await.tier();
            if tier != Tier::Commander {
                info!(tier = %tier, "settings gated; opening paywall");
                self.open_paywall().await;
                return ViewOutcome::Paywalled;
            }
        }

        self.toggle_view(view).await;
        ViewOutcome::Activated(view)
    }

    /// Ungated switch: exactly one view ends up visible.
    pub async fn toggle_view(&self, view: View) {
        {
            let mut state = self.inner.lock().await;
            state.active_view = view;
        }
        debug!(view = %view, "view activated");
        self.emit(DashboardEvent::ViewChanged(view));

        if view == View::Logs {
            // Failures are already logged by the loader.
            let _ = self.load_logs().await;
        }
    }

    pub async fn close_paywall(&self) {
        {
            let mut state = self.inner.lock().await;
            state.paywall.visible = false;
        }
        self.emit(DashboardEvent::PaywallClosed);
    }

    async fn open_paywall(&self) {
        {
            let mut state = self.inner.lock().await;
            state.paywall.visible = true;
        }
        self.emit(DashboardEvent::PaywallOpened);

        let email = self.session.read().await.email_or_guest().to_string();
        if let Err(err) = self.payment.prepare(&email).await {
            warn!(error = %err, "failed to load payment form");
            self.show_payment_message(PaymentMessage {
                text: PaymentError::LOAD_FAILED_MESSAGE.to_string(),
                is_error: true,
            })
            .await;
        }
    }
}
