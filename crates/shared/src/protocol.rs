use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::domain::PipelineStage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeKeyResponse {
    pub publishable_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub payment_intent_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

impl VerifyPaymentResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub input: String,
}

/// In-band failure reported by the pipeline backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineError {
    pub stage: String,
    pub error_type: String,
    pub message: String,
}

/// Result of one pipeline run. Stage payloads are kept verbatim for display;
/// typed views are decoded on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub router: Option<Value>,
    #[serde(default)]
    pub planner: Option<Value>,
    #[serde(default)]
    pub executor: Option<Value>,
    #[serde(default)]
    pub validator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
}

impl PipelineResult {
    pub fn stage(&self, stage: PipelineStage) -> Option<&Value> {
        match stage {
            PipelineStage::Router => self.router.as_ref(),
            PipelineStage::Planner => self.planner.as_ref(),
            PipelineStage::Executor => self.executor.as_ref(),
            PipelineStage::Validator => self.validator.as_ref(),
        }
        .filter(|value| !value.is_null())
    }

    /// Two-space indented JSON, `null` for a stage that never ran.
    pub fn render_stage(&self, stage: PipelineStage) -> String {
        match self.stage(stage) {
            Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            None => "null".to_string(),
        }
    }

    pub fn router_output(&self) -> Option<RouterOutput> {
        decode_stage(self.stage(PipelineStage::Router))
    }

    pub fn planner_output(&self) -> Option<PlannerOutput> {
        decode_stage(self.stage(PipelineStage::Planner))
    }

    pub fn executor_output(&self) -> Option<ExecutorOutput> {
        decode_stage(self.stage(PipelineStage::Executor))
    }

    pub fn validator_output(&self) -> Option<ValidatorOutput> {
        decode_stage(self.stage(PipelineStage::Validator))
    }
}

fn decode_stage<T: DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    value.and_then(|value| serde_json::from_value(value.clone()).ok())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterOutput {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub step_number: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_clarification: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerOutput {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub blocking_questions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    #[serde(default)]
    pub execution_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOutput {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommended_action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDigest {
    #[serde(default)]
    pub intent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDigest {
    #[serde(default)]
    pub valid: bool,
}

/// One audit-log row from `/api/antigravity/history`, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorDigest>,
}

impl LogEntry {
    pub fn is_valid(&self) -> bool {
        self.validator.as_ref().map(|v| v.valid).unwrap_or(false)
    }

    pub fn intent(&self) -> Option<&str> {
        self.router
            .as_ref()
            .and_then(|router| router.intent.as_deref())
            .filter(|intent| !intent.is_empty())
    }
}
