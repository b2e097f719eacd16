use std::{sync::Arc, time::Duration};

use shared::domain::Tier;
use storage::StateStore;
use tokio::sync::{broadcast, Mutex, RwLock};

pub mod api;
pub mod error;
pub mod logs;
pub mod payment;
pub mod sequencer;
pub mod session;
pub mod state;
pub mod view;

pub use api::{DashboardApi, HttpDashboardApi};
pub use error::ClientError;
pub use logs::{LogRow, SafetyBadge, StatusDot};
pub use payment::{
    build_payment_flow, HostedPaymentFlow, MockCardFlow, PaymentError, PaymentFlow, PaymentForm,
    PaymentMode, PaymentReceipt, PaymentSettings, StripeConfirmer, SubmitOutcome,
    DEFAULT_BANK_LATENCY, DEFAULT_UPGRADE_SETTLE_DELAY,
};
pub use sequencer::{RunOutcome, StagePolicy, DEFAULT_STAGE_DELAY};
pub use session::{Bootstrap, Session, DEFAULT_LOGIN_LOCATION};
pub use state::{DashboardEvent, DashboardState, LogTable, PanelState, PanelStatus};
pub use view::ViewOutcome;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardTimings {
    pub stages: StagePolicy,
    /// Pause between a confirmed upgrade and switching to settings.
    pub upgrade_settle_delay: Duration,
}

impl Default for DashboardTimings {
    fn default() -> Self {
        Self {
            stages: StagePolicy::default(),
            upgrade_settle_delay: payment::DEFAULT_UPGRADE_SETTLE_DELAY,
        }
    }
}

/// Page controller for one authenticated session. All rendering state lives
/// in [`DashboardState`]; every change is also published as a
/// [`DashboardEvent`].
pub struct Dashboard {
    api: Arc<dyn DashboardApi>,
    payment: Arc<dyn PaymentFlow>,
    store: Arc<dyn StateStore>,
    session: RwLock<Session>,
    timings: DashboardTimings,
    inner: Mutex<DashboardState>,
    events: broadcast::Sender<DashboardEvent>,
}

impl Dashboard {
    pub fn new(
        session: Session,
        api: Arc<dyn DashboardApi>,
        payment: Arc<dyn PaymentFlow>,
        store: Arc<dyn StateStore>,
        timings: DashboardTimings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api,
            payment,
            store,
            session: RwLock::new(session),
            timings,
            inner: Mutex::new(DashboardState::default()),
            events,
        })
    }

    /// Page-load work that does not depend on user interaction.
    pub async fn start(&self) {
        self.payment.init().await;
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.inner.lock().await.clone()
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn tier(&self) -> Tier {
        self.session.read().await.tier()
    }

    pub fn payment_mode(&self) -> PaymentMode {
        self.payment.mode()
    }

    pub fn timings(&self) -> DashboardTimings {
        self.timings
    }

    fn emit(&self, event: DashboardEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod api_tests;
