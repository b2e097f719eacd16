use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{PaymentError, PaymentFlow, PaymentForm, PaymentMode, PaymentReceipt};
use crate::{api::DashboardApi, error::ClientError};

const SUCCEEDED_STATUS: &str = "succeeded";
const DEFAULT_UPGRADE_FAILURE: &str = "Upgrade failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    pub payment_intent_id: String,
    pub status: String,
}

/// Client-side confirmation of a payment intent against the provider.
#[async_trait]
pub trait PaymentConfirmer: Send + Sync {
    async fn confirm(
        &self,
        publishable_key: &str,
        client_secret: &str,
    ) -> Result<ConfirmedPayment, PaymentError>;
}

/// Confirms intents through the provider's public REST endpoint using the
/// publishable key and the intent's client secret.
pub struct StripeConfirmer {
    http: Client,
    api_url: String,
    payment_method: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorEnvelope {
    #[serde(default)]
    error: StripeErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl StripeConfirmer {
    pub fn new(api_url: impl Into<String>, payment_method: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            payment_method: payment_method.into(),
        }
    }
}

/// `pi_123_secret_abc` → `pi_123`.
pub(crate) fn intent_id_from_client_secret(client_secret: &str) -> Option<&str> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty())
}

#[async_trait]
impl PaymentConfirmer for StripeConfirmer {
    async fn confirm(
        &self,
        publishable_key: &str,
        client_secret: &str,
    ) -> Result<ConfirmedPayment, PaymentError> {
        let intent_id = intent_id_from_client_secret(client_secret)
            .ok_or_else(|| PaymentError::Declined("Invalid payment session.".to_string()))?;

        let res = self
            .http
            .post(format!(
                "{}/v1/payment_intents/{intent_id}/confirm",
                self.api_url
            ))
            .bearer_auth(publishable_key)
            .form(&[
                ("client_secret", client_secret),
                ("payment_method", self.payment_method.as_str()),
            ])
            .send()
            .await
            .map_err(|err| PaymentError::Declined(err.to_string()))?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|err| PaymentError::Declined(err.to_string()))?;

        if !status.is_success() {
            let envelope: StripeErrorEnvelope = serde_json::from_slice(&bytes).unwrap_or_default();
            return Err(PaymentError::Declined(
                envelope
                    .error
                    .message
                    .unwrap_or_else(|| format!("Payment provider returned {status}")),
            ));
        }

        let intent: StripeIntent = serde_json::from_slice(&bytes)
            .map_err(|err| PaymentError::Declined(format!("malformed provider response: {err}")))?;
        debug!(payment_intent_id = %intent.id, status = %intent.status, "payment intent confirmed");
        Ok(ConfirmedPayment {
            payment_intent_id: intent.id,
            status: intent.status,
        })
    }
}

#[derive(Default)]
struct HostedSurface {
    publishable_key: Option<String>,
    /// Set once the checkout element is mounted.
    client_secret: Option<String>,
}

/// Provider-hosted checkout: the backend creates an intent, the provider
/// confirms it, and the backend verifies it before the upgrade is granted.
pub struct HostedPaymentFlow {
    api: Arc<dyn DashboardApi>,
    confirmer: Arc<dyn PaymentConfirmer>,
    surface: Mutex<HostedSurface>,
}

impl HostedPaymentFlow {
    pub fn new(api: Arc<dyn DashboardApi>, confirmer: Arc<dyn PaymentConfirmer>) -> Self {
        Self {
            api,
            confirmer,
            surface: Mutex::new(HostedSurface::default()),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.surface.lock().await.client_secret.is_some()
    }

    async fn verify_and_upgrade(
        &self,
        payment_intent_id: &str,
        email: &str,
    ) -> Result<PaymentReceipt, PaymentError> {
        let verification = match self.api.verify_payment(payment_intent_id, email).await {
            Ok(verification) => verification,
            Err(ClientError::Status { detail, .. }) => {
                return Err(PaymentError::Verification(
                    detail.unwrap_or_else(|| DEFAULT_UPGRADE_FAILURE.to_string()),
                ))
            }
            Err(err) => return Err(PaymentError::Verification(err.to_string())),
        };

        if !verification.is_success() {
            return Err(PaymentError::Verification(
                verification
                    .details
                    .filter(|details| !details.is_empty())
                    .unwrap_or_else(|| DEFAULT_UPGRADE_FAILURE.to_string()),
            ));
        }

        info!(payment_intent_id, "payment verified by server");
        Ok(PaymentReceipt {
            mode: PaymentMode::Hosted,
            reference: Some(payment_intent_id.to_string()),
        })
    }
}

#[async_trait]
impl PaymentFlow for HostedPaymentFlow {
    fn mode(&self) -> PaymentMode {
        PaymentMode::Hosted
    }

    async fn init(&self) {
        match self.api.stripe_publishable_key().await {
            Ok(key) => {
                self.surface.lock().await.publishable_key = Some(key);
            }
            Err(err) => error!(error = %err, "failed to load payment provider key"),
        }
    }

    async fn prepare(&self, email: &str) -> Result<(), PaymentError> {
        if self.is_loaded().await {
            return Ok(());
        }

        let client_secret = self
            .api
            .create_payment_intent(email)
            .await
            .map_err(|err| {
                PaymentError::Load(
                    err.api_error()
                        .map(|api| api.message)
                        .unwrap_or_else(|| err.to_string()),
                )
            })?;

        self.surface.lock().await.client_secret = Some(client_secret);
        debug!("hosted payment element mounted");
        Ok(())
    }

    async fn submit(
        &self,
        email: &str,
        _form: &PaymentForm,
    ) -> Result<PaymentReceipt, PaymentError> {
        let (publishable_key, client_secret) = {
            let surface = self.surface.lock().await;
            match (&surface.publishable_key, &surface.client_secret) {
                (Some(key), Some(secret)) => (key.clone(), secret.clone()),
                _ => return Err(PaymentError::NotReady),
            }
        };

        let confirmed = self
            .confirmer
            .confirm(&publishable_key, &client_secret)
            .await?;
        if confirmed.status != SUCCEEDED_STATUS {
            return Err(PaymentError::UnexpectedStatus(confirmed.status));
        }

        self.verify_and_upgrade(&confirmed.payment_intent_id, email)
            .await
    }
}
