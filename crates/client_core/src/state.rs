//! Render model of the dashboard page and the events that describe changes to it.

use shared::domain::{PipelineStage, Tier, View};

use crate::logs::LogRow;

pub const WAITING_PLACEHOLDER: &str = "// Waiting...";
pub const IDLE_BUTTON_LABEL: &str = "Execute Pipeline";
pub const RUNNING_BUTTON_LABEL: &str = "Running...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStatus {
    Idle,
    Processing,
    Complete,
}

impl PanelStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PanelStatus::Idle => "Idle",
            PanelStatus::Processing => "Processing",
            PanelStatus::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState {
    pub stage: PipelineStage,
    pub status: PanelStatus,
    pub output: String,
}

impl PanelState {
    fn waiting(stage: PipelineStage) -> Self {
        Self {
            stage,
            status: PanelStatus::Idle,
            output: WAITING_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputControls {
    pub enabled: bool,
    pub button_label: &'static str,
}

impl Default for InputControls {
    fn default() -> Self {
        Self {
            enabled: true,
            button_label: IDLE_BUTTON_LABEL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTable {
    #[default]
    Empty,
    Loading,
    Rendered(Vec<LogRow>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMessage {
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaywallState {
    pub visible: bool,
    /// Submit button disabled and spinner shown.
    pub loading: bool,
    pub message: Option<PaymentMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardState {
    pub active_view: View,
    pub panels: Vec<PanelState>,
    pub controls: InputControls,
    pub logs: LogTable,
    pub paywall: PaywallState,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            active_view: View::Dashboard,
            panels: PipelineStage::ORDER
                .into_iter()
                .map(PanelState::waiting)
                .collect(),
            controls: InputControls::default(),
            logs: LogTable::default(),
            paywall: PaywallState::default(),
        }
    }
}

impl DashboardState {
    pub fn is_visible(&self, view: View) -> bool {
        self.active_view == view
    }

    /// The highlighted navigation entry always follows the visible view.
    pub fn nav_highlight(&self) -> View {
        self.active_view
    }

    pub fn panel(&self, stage: PipelineStage) -> Option<&PanelState> {
        self.panels.iter().find(|panel| panel.stage == stage)
    }

    pub(crate) fn panel_mut(&mut self, stage: PipelineStage) -> Option<&mut PanelState> {
        self.panels.iter_mut().find(|panel| panel.stage == stage)
    }

    pub(crate) fn reset_panels(&mut self) {
        for panel in &mut self.panels {
            *panel = PanelState::waiting(panel.stage);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    ViewChanged(View),
    PaywallOpened,
    PaywallClosed,
    PanelsReset,
    PanelUpdated {
        stage: PipelineStage,
        status: PanelStatus,
        output: Option<String>,
    },
    ControlsChanged {
        enabled: bool,
    },
    LogsLoading,
    LogsRendered(Vec<LogRow>),
    PaymentLoading(bool),
    PaymentMessage(PaymentMessage),
    /// Blocking validation alert; nothing was submitted.
    PaymentAlert(String),
    TierUpgraded(Tier),
}
