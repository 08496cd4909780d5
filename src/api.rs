use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::database::{self, NewPayment};
use crate::error::{PaymentError, SpinError};
use crate::spin::SpinService;
use crate::types::{PaymentStatus, PaymentTransaction};

#[derive(Serialize, Debug)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RelayRequest {
    Transfer {
        amount: i64,
        number_phone: String,
    },
    Status {
        #[serde(rename = "transactionId")]
        transaction_id: String,
    },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Success,
    Error,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Complete,
    Pending,
    Failed,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub status: RelayStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<TransactionData>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TransactionData {
    pub id: String,
    pub amount: String,
    pub number_phone: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: TransactionStatus,
    pub at_created: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub transaction: Option<TransactionData>,
    pub payment: PaymentTransaction,
    pub balance: i64,
}

/// Talks to the server-side relay that fronts the mobile-money gateway.
#[derive(Clone)]
pub struct PaymentRelayClient {
    client: reqwest::Client,
    relay_url: String,
}

impl PaymentRelayClient {
    pub fn new(relay_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: relay_url.to_string(),
        }
    }

    async fn call(&self, request: &RelayRequest) -> Result<RelayResponse, PaymentError> {
        let response = self
            .client
            .post(&self.relay_url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let relay_response: RelayResponse = response.json().await?;
        Ok(relay_response)
    }

    pub async fn transfer(&self, amount: i64, number_phone: &str) -> Result<RelayResponse, PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::InvalidRequest(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        let number_phone = number_phone.trim();
        if number_phone.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "phone number is required".to_string(),
            ));
        }

        info!(amount, number_phone, "requesting mobile-money transfer");
        self.call(&RelayRequest::Transfer {
            amount,
            number_phone: number_phone.to_string(),
        })
        .await
    }

    pub async fn check_status(&self, transaction_id: &str) -> Result<RelayResponse, PaymentError> {
        if transaction_id.trim().is_empty() {
            return Err(PaymentError::InvalidRequest(
                "transaction id is required".to_string(),
            ));
        }
        self.call(&RelayRequest::Status {
            transaction_id: transaction_id.trim().to_string(),
        })
        .await
    }
}

fn record_attempt(service: &SpinService, attempt: &NewPayment<'_>) {
    if let Err(e) = service.record_payment(attempt) {
        error!(user_id = attempt.user_id, status = %attempt.status, "failed to record payment: {}", e);
    }
}

/// Credits the purchase reward when the relay reports success. Every outcome
/// lands in the payment ledger.
pub fn apply_transfer_response(
    service: &SpinService,
    user_id: &str,
    amount: i64,
    number_phone: &str,
    response: RelayResponse,
) -> Result<PurchaseReceipt, PaymentError> {
    let attempt = NewPayment {
        user_id,
        amount,
        number_phone,
        status: PaymentStatus::Failed,
        transaction_id: response.data.as_ref().map(|d| d.id.as_str()),
        message: &response.message,
        credits_awarded: 0,
    };

    if response.status != RelayStatus::Success {
        warn!(user_id, message = %response.message, "payment rejected by relay");
        record_attempt(service, &attempt);
        return Err(PaymentError::Rejected(response.message.clone()));
    }

    match service.settle_payment(&attempt) {
        Ok((payment, balance)) => {
            info!(user_id, balance, "purchase credited");
            Ok(PurchaseReceipt {
                transaction: response.data.clone(),
                payment,
                balance,
            })
        }
        Err(e) => {
            error!(
                user_id,
                transaction_id = ?attempt.transaction_id,
                "relay settled the payment but credits were not awarded: {}",
                e
            );
            let message = e.to_string();
            record_attempt(
                service,
                &NewPayment {
                    status: PaymentStatus::Uncredited,
                    message: &message,
                    ..attempt
                },
            );
            Err(e.into())
        }
    }
}

pub async fn purchase_credits(
    client: &PaymentRelayClient,
    service: &SpinService,
    user_id: &str,
    amount: i64,
    number_phone: &str,
) -> Result<PurchaseReceipt, PaymentError> {
    let known = database::get_user(&service.lock(), user_id)
        .map_err(SpinError::from)?
        .is_some();
    if !known {
        return Err(SpinError::UnknownUser(user_id.to_string()).into());
    }

    let response = match client.transfer(amount, number_phone).await {
        Ok(response) => response,
        Err(PaymentError::Http(e)) => {
            let message = e.to_string();
            record_attempt(
                service,
                &NewPayment {
                    user_id,
                    amount,
                    number_phone: number_phone.trim(),
                    status: PaymentStatus::Failed,
                    transaction_id: None,
                    message: &message,
                    credits_awarded: 0,
                },
            );
            return Err(PaymentError::Http(e));
        }
        Err(e) => return Err(e),
    };
    apply_transfer_response(service, user_id, amount, number_phone.trim(), response)
}
