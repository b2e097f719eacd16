//! HTTP access to the dashboard backend.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    error::ErrorBody,
    protocol::{
        EmailRequest, LogEntry, PaymentIntentResponse, PipelineRequest, PipelineResult,
        StripeKeyResponse, UpgradeResponse, VerifyPaymentRequest, VerifyPaymentResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::error::ClientError;

const STRIPE_KEY_PATH: &str = "/api/config/stripe-key";
const CREATE_PAYMENT_INTENT_PATH: &str = "/api/create-payment-intent";
const VERIFY_PAYMENT_PATH: &str = "/api/verify-payment";
const UPGRADE_PATH: &str = "/api/upgrade";
const PIPELINE_RUN_PATH: &str = "/api/antigravity/run";
const PIPELINE_HISTORY_PATH: &str = "/api/antigravity/history";

#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn stripe_publishable_key(&self) -> Result<String, ClientError>;
    /// Returns the client secret of the new payment intent.
    async fn create_payment_intent(&self, email: &str) -> Result<String, ClientError>;
    async fn verify_payment(
        &self,
        payment_intent_id: &str,
        email: &str,
    ) -> Result<VerifyPaymentResponse, ClientError>;
    async fn upgrade(&self, email: &str) -> Result<UpgradeResponse, ClientError>;
    async fn run_pipeline(&self, input: &str) -> Result<PipelineResult, ClientError>;
    async fn history(&self) -> Result<Vec<LogEntry>, ClientError>;
}

pub struct HttpDashboardApi {
    http: Client,
    server_url: String,
    auth_token: Option<String>,
}

impl HttpDashboardApi {
    pub fn new(server_url: &str, auth_token: Option<String>) -> Result<Self, ClientError> {
        Self::with_client(Client::new(), server_url, auth_token)
    }

    pub fn with_client(
        http: Client,
        server_url: &str,
        auth_token: Option<String>,
    ) -> Result<Self, ClientError> {
        let parsed = Url::parse(server_url.trim())?;
        Ok(Self {
            http,
            server_url: parsed.as_str().trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|token| !token.is_empty()),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{path}", self.server_url));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let bytes = send_checked(builder).await?;
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

async fn send_checked(builder: RequestBuilder) -> Result<Vec<u8>, ClientError> {
    let res = builder.send().await?;
    let status = res.status();
    let url = res.url().path().to_string();
    let bytes = res.bytes().await?;
    debug!(%status, path = %url, len = bytes.len(), "dashboard api response");

    if !status.is_success() {
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            detail: body.message(),
        });
    }

    Ok(bytes.to_vec())
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn stripe_publishable_key(&self) -> Result<String, ClientError> {
        let body: StripeKeyResponse = self
            .send_json(self.request(Method::GET, STRIPE_KEY_PATH))
            .await?;
        Ok(body.publishable_key)
    }

    async fn create_payment_intent(&self, email: &str) -> Result<String, ClientError> {
        let body: PaymentIntentResponse = self
            .send_json(
                self.request(Method::POST, CREATE_PAYMENT_INTENT_PATH)
                    .json(&EmailRequest {
                        email: email.to_string(),
                    }),
            )
            .await?;
        Ok(body.client_secret)
    }

    async fn verify_payment(
        &self,
        payment_intent_id: &str,
        email: &str,
    ) -> Result<VerifyPaymentResponse, ClientError> {
        self.send_json(
            self.request(Method::POST, VERIFY_PAYMENT_PATH)
                .json(&VerifyPaymentRequest {
                    payment_intent_id: payment_intent_id.to_string(),
                    email: email.to_string(),
                }),
        )
        .await
    }

    async fn upgrade(&self, email: &str) -> Result<UpgradeResponse, ClientError> {
        let bytes = send_checked(
            self.request(Method::POST, UPGRADE_PATH)
                .json(&EmailRequest {
                    email: email.to_string(),
                }),
        )
        .await?;
        // Any 2xx counts as an upgrade; the body is informational only.
        Ok(serde_json::from_slice(&bytes).unwrap_or_default())
    }

    async fn run_pipeline(&self, input: &str) -> Result<PipelineResult, ClientError> {
        self.send_json(
            self.request(Method::POST, PIPELINE_RUN_PATH)
                .json(&PipelineRequest {
                    input: input.to_string(),
                }),
        )
        .await
    }

    async fn history(&self) -> Result<Vec<LogEntry>, ClientError> {
        self.send_json(self.request(Method::GET, PIPELINE_HISTORY_PATH))
            .await
    }
}
