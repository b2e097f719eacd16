use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

use super::{PaymentError, PaymentFlow, PaymentForm, PaymentMode, PaymentReceipt};
use crate::{api::DashboardApi, error::ClientError};

pub const MIN_CARD_DIGITS: usize = 16;
pub const DEFAULT_BANK_LATENCY: Duration = Duration::from_millis(2000);
const INVALID_CARD_MESSAGE: &str = "Please enter a valid card number.";

/// Groups the digits of a typed card number in fours: `4242424242424242`
/// becomes `4242 4242 4242 4242`. Anything that is not a digit is dropped.
pub fn format_card_number(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    digits
        .chunks(4)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number of ASCII digits in the card number; separators and stray
/// characters do not count.
pub fn card_digit_count(card_number: &str) -> usize {
    card_number.chars().filter(char::is_ascii_digit).count()
}

/// Development checkout. It only checks the card length, waits a fixed
/// delay, and asks the backend to upgrade the account by email.
pub struct MockCardFlow {
    api: Arc<dyn DashboardApi>,
    bank_latency: Duration,
}

impl MockCardFlow {
    pub fn new(api: Arc<dyn DashboardApi>, bank_latency: Duration) -> Self {
        Self { api, bank_latency }
    }
}

#[async_trait]
impl PaymentFlow for MockCardFlow {
    fn mode(&self) -> PaymentMode {
        PaymentMode::Mock
    }

    async fn prepare(&self, _email: &str) -> Result<(), PaymentError> {
        Ok(())
    }

    async fn submit(&self, email: &str, form: &PaymentForm) -> Result<PaymentReceipt, PaymentError> {
        // Expiry and CVC are collected but intentionally unchecked.
        let card_number = format_card_number(&form.card_number);
        if card_digit_count(&card_number) < MIN_CARD_DIGITS {
            return Err(PaymentError::Validation(INVALID_CARD_MESSAGE.to_string()));
        }

        tokio::time::sleep(self.bank_latency).await;

        match self.api.upgrade(email).await {
            Ok(response) => {
                info!(email, status = %response.status, "mock payment accepted");
                Ok(PaymentReceipt {
                    mode: PaymentMode::Mock,
                    reference: None,
                })
            }
            Err(ClientError::Status { status, detail }) => {
                warn!(email, status, "mock upgrade rejected");
                Err(PaymentError::Upgrade(
                    detail.unwrap_or_else(|| "Upgrade failed".to_string()),
                ))
            }
            Err(err) => Err(PaymentError::Upgrade(err.to_string())),
        }
    }
}
