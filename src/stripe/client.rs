//! HTTP client for the Stripe API.
//!
//! Transport failures (timeouts, 5xx) feed the circuit breaker; API-level
//! outcomes such as a declined card come back as 4xx payloads and are
//! classified after the breaker, so expected declines never open it.

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use uuid::Uuid;

use crate::ports::{
    BalanceInfo, ChargeAuthorization, ChargeRequest, ConnectedAccountStatus, GatewayError,
    PaymentGateway, PaymentMethodInfo, PayoutRef, TransferRef,
};
use crate::stripe::types::*;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: Breaker,
}

impl StripeGateway {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_circuit_breaker(base_url, secret_key, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        StripeGateway {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// One API call through the breaker. Returns status + raw body so the
    /// caller can classify API errors without counting them as outages.
    async fn request(
        &self,
        method: Method,
        path: &str,
        form: Option<Vec<(String, String)>>,
        stripe_account: Option<&str>,
        idempotency_key: Option<String>,
    ) -> Result<(StatusCode, String), GatewayError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let account = stripe_account.map(str::to_string);

        let result = self
            .circuit_breaker
            .call(async move {
                let mut builder = client.request(method, &url).bearer_auth(&secret);
                if let Some(account) = &account {
                    builder = builder.header("Stripe-Account", account);
                }
                if let Some(key) = &idempotency_key {
                    builder = builder.header("Idempotency-Key", key);
                }
                if let Some(form) = &form {
                    builder = builder.form(form);
                }

                let response = builder
                    .send()
                    .await
                    .map_err(|e| GatewayError::Request(e.to_string()))?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(GatewayError::Request(format!(
                        "stripe returned {}",
                        status
                    )));
                }

                let body = response
                    .text()
                    .await
                    .map_err(|e| GatewayError::Request(e.to_string()))?;
                Ok((status, body))
            })
            .await;

        match result {
            Ok(ok) => Ok(ok),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    fn classify_error(status: StatusCode, body: &str) -> GatewayError {
        let detail = serde_json::from_str::<StripeErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or(StripeErrorDetail {
                message: None,
                error_type: None,
                code: None,
                decline_code: None,
            });

        let message = detail
            .message
            .unwrap_or_else(|| format!("stripe returned {}", status));

        match detail.code.as_deref() {
            Some("card_declined") | Some("expired_card") | Some("incorrect_cvc")
            | Some("insufficient_funds") | Some("processing_error") => {
                GatewayError::CardDeclined(message)
            }
            Some("balance_insufficient") => GatewayError::InsufficientBalance(message),
            Some("account_invalid") | Some("payouts_not_allowed") => {
                GatewayError::AccountNotReady(message)
            }
            _ if detail.error_type.as_deref() == Some("card_error") => {
                GatewayError::CardDeclined(message)
            }
            _ => GatewayError::Request(message),
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(
        status: StatusCode,
        body: &str,
    ) -> Result<T, GatewayError> {
        if !status.is_success() {
            return Err(Self::classify_error(status, body));
        }
        serde_json::from_str(body)
            .map_err(|e| GatewayError::Request(format!("invalid stripe response: {}", e)))
    }

    fn metadata_form(metadata: &serde_json::Value, form: &mut Vec<(String, String)>) {
        if let Some(map) = metadata.as_object() {
            for (key, value) in map {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form.push((format!("metadata[{}]", key), rendered));
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(&self, email: &str) -> Result<String, GatewayError> {
        let form = vec![("email".to_string(), email.to_string())];
        let (status, body) = self
            .request(
                Method::POST,
                "/v1/customers",
                Some(form),
                None,
                Some(Uuid::new_v4().to_string()),
            )
            .await?;

        let customer: StripeCustomer = Self::parse(status, &body)?;
        Ok(customer.id)
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodInfo>, GatewayError> {
        let path = format!("/v1/payment_methods?customer={}&type=card", customer_id);
        let (status, body) = self.request(Method::GET, &path, None, None, None).await?;

        let list: StripePaymentMethodList = Self::parse(status, &body)?;
        Ok(list
            .data
            .into_iter()
            .map(|m| PaymentMethodInfo {
                card_last4: m.card.map(|c| c.last4).unwrap_or_default(),
                id: m.id,
            })
            .collect())
    }

    async fn authorize_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeAuthorization, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), request.amount_yen.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("customer".to_string(), request.customer_id.clone()),
            (
                "payment_method".to_string(),
                request.payment_method_id.clone(),
            ),
            ("capture_method".to_string(), "manual".to_string()),
            ("confirm".to_string(), request.confirm.to_string()),
            ("description".to_string(), request.description.clone()),
        ];
        Self::metadata_form(&request.metadata, &mut form);

        let (status, body) = self
            .request(
                Method::POST,
                "/v1/payment_intents",
                Some(form),
                None,
                Some(Uuid::new_v4().to_string()),
            )
            .await?;

        let intent: StripePaymentIntent = Self::parse(status, &body)?;
        Ok(ChargeAuthorization {
            charge_id: intent.id,
        })
    }

    async fn capture_charge(
        &self,
        charge_id: &str,
        amount_yen: Option<i64>,
    ) -> Result<(), GatewayError> {
        let mut form = Vec::new();
        if let Some(amount) = amount_yen {
            form.push(("amount_to_capture".to_string(), amount.to_string()));
        }

        let path = format!("/v1/payment_intents/{}/capture", charge_id);
        let (status, body) = self
            .request(
                Method::POST,
                &path,
                Some(form),
                None,
                Some(Uuid::new_v4().to_string()),
            )
            .await?;

        let _: StripePaymentIntent = Self::parse(status, &body)?;
        Ok(())
    }

    async fn create_transfer(
        &self,
        destination_account_id: &str,
        amount_yen: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<TransferRef, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), amount_yen.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("destination".to_string(), destination_account_id.to_string()),
        ];
        Self::metadata_form(metadata, &mut form);

        let (status, body) = self
            .request(
                Method::POST,
                "/v1/transfers",
                Some(form),
                None,
                Some(Uuid::new_v4().to_string()),
            )
            .await?;

        let transfer: StripeTransfer = Self::parse(status, &body)?;
        Ok(TransferRef { id: transfer.id })
    }

    async fn create_payout(
        &self,
        connected_account_id: &str,
        amount_yen: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<PayoutRef, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), amount_yen.to_string()),
            ("currency".to_string(), currency.to_string()),
        ];
        Self::metadata_form(metadata, &mut form);

        let (status, body) = self
            .request(
                Method::POST,
                "/v1/payouts",
                Some(form),
                Some(connected_account_id),
                Some(Uuid::new_v4().to_string()),
            )
            .await?;

        let payout: StripePayout = Self::parse(status, &body)?;
        Ok(PayoutRef {
            id: payout.id,
            status: payout.status,
        })
    }

    async fn platform_balance(&self, currency: &str) -> Result<BalanceInfo, GatewayError> {
        let (status, body) = self
            .request(Method::GET, "/v1/balance", None, None, None)
            .await?;

        let balance: StripeBalance = Self::parse(status, &body)?;
        let sum = |entries: &[StripeBalanceEntry]| -> i64 {
            entries
                .iter()
                .filter(|e| e.currency.eq_ignore_ascii_case(currency))
                .map(|e| e.amount)
                .sum()
        };

        Ok(BalanceInfo {
            available_yen: sum(&balance.available),
            pending_yen: sum(&balance.pending),
        })
    }

    async fn connected_account_status(
        &self,
        account_id: &str,
    ) -> Result<ConnectedAccountStatus, GatewayError> {
        let path = format!("/v1/accounts/{}", account_id);
        let (status, body) = self.request(Method::GET, &path, None, None, None).await?;

        let account: StripeAccount = Self::parse(status, &body)?;
        Ok(ConnectedAccountStatus {
            payouts_enabled: account.payouts_enabled,
            requirements_due: account
                .requirements
                .map(|r| r.currently_due)
                .unwrap_or_default(),
        })
    }
}
