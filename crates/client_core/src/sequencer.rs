//! Pipeline run sequencing: one request, then a staged reveal of the four panels.

use std::time::Duration;

use shared::{domain::PipelineStage, protocol::PipelineResult};
use tracing::{error, info, warn};

use crate::{
    state::{DashboardEvent, PanelStatus, IDLE_BUTTON_LABEL, RUNNING_BUTTON_LABEL},
    Dashboard,
};

pub const DEFAULT_STAGE_DELAY: Duration = Duration::from_millis(600);

/// Cosmetic per-stage delay. It does not track how long a stage really took
/// on the backend; every stage waits the same fixed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    pub per_stage_delay: Duration,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            per_stage_delay: DEFAULT_STAGE_DELAY,
        }
    }
}

impl StagePolicy {
    pub fn new(per_stage_delay: Duration) -> Self {
        Self { per_stage_delay }
    }

    pub fn delay_for(&self, _stage: PipelineStage) -> Duration {
        self.per_stage_delay
    }

    /// Time from response arrival until the validator panel completes.
    pub fn total_reveal_time(&self) -> Duration {
        PipelineStage::ORDER
            .iter()
            .map(|stage| self.delay_for(*stage))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Empty or whitespace-only input; nothing happened.
    Ignored,
    /// A run is already in flight and the controls are disabled.
    Busy,
    Completed(PipelineResult),
    /// Request or decode failure; logged only.
    Failed,
}

impl Dashboard {
    pub async fn run_pipeline(&self, raw_input: &str) -> RunOutcome {
        let input = raw_input.trim();
        if input.is_empty() {
            return RunOutcome::Ignored;
        }

        {
            let mut state = self.inner.lock().await;
            if !state.controls.enabled {
                return RunOutcome::Busy;
            }
            state.reset_panels();
            state.controls.enabled = false;
            state.controls.button_label = RUNNING_BUTTON_LABEL;
        }
        self.emit(DashboardEvent::PanelsReset);
        self.emit(DashboardEvent::ControlsChanged { enabled: false });

        let outcome = match self.api.run_pipeline(input).await {
            Ok(result) => {
                if let Some(pipeline_error) = &result.error {
                    warn!(
                        request_id = result.request_id.as_deref().unwrap_or_default(),
                        stage = %pipeline_error.stage,
                        error_type = %pipeline_error.error_type,
                        message = %pipeline_error.message,
                        "pipeline reported an error"
                    );
                }
                self.reveal_stages(&result).await;
                info!(
                    request_id = result.request_id.as_deref().unwrap_or_default(),
                    "pipeline run rendered"
                );
                RunOutcome::Completed(result)
            }
            Err(err) => {
                error!(error = %err, "pipeline run failed");
                RunOutcome::Failed
            }
        };

        {
            let mut state = self.inner.lock().await;
            state.controls.enabled = true;
            state.controls.button_label = IDLE_BUTTON_LABEL;
        }
        self.emit(DashboardEvent::ControlsChanged { enabled: true });

        outcome
    }

    async fn reveal_stages(&self, result: &PipelineResult) {
        let policy = self.timings.stages;
        for stage in PipelineStage::ORDER {
            self.set_panel(stage, PanelStatus::Processing, None).await;
            tokio::time::sleep(policy.delay_for(stage)).await;
            self.set_panel(stage, PanelStatus::Complete, Some(result.render_stage(stage)))
                .await;
        }
    }

    async fn set_panel(&self, stage: PipelineStage, status: PanelStatus, output: Option<String>) {
        {
            let mut state = self.inner.lock().await;
            if let Some(panel) = state.panel_mut(stage) {
                panel.status = status;
                if let Some(output) = &output {
                    panel.output = output.clone();
                }
            }
        }
        self.emit(DashboardEvent::PanelUpdated {
            stage,
            status,
            output,
        });
    }
}
