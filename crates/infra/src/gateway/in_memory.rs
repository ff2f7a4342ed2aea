use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use procura_purchasing::GatewayStatus;

use super::r#trait::{CreatedIntent, GatewayError, IntentRequest, PaymentGateway};

/// Scripted behaviour for the next `create_intent` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateScript {
    /// Fail without creating anything.
    Fail(GatewayError),
    /// Create the intent remotely but lose the response.
    CreateThenTimeout,
}

/// Gateway-side view of an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentSnapshot {
    pub intent_id: String,
    pub idempotency_key: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: GatewayStatus,
}

#[derive(Debug, Default)]
struct Inner {
    intents: HashMap<String, (IntentSnapshot, String)>,
    by_key: HashMap<String, String>,
    create_calls: usize,
    create_scripts: VecDeque<CreateScript>,
    cancel_failures: VecDeque<GatewayError>,
    cancelled: Vec<String>,
}

/// In-process stand-in for the external payment processor.
///
/// Honours idempotency keys the way a real processor does, and lets tests
/// script failures, lost responses and latency.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    inner: Mutex<Inner>,
    latency: Duration,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every create call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>, GatewayError> {
        self.inner
            .lock()
            .map_err(|_| GatewayError::Unavailable("gateway state poisoned".to_string()))
    }

    pub fn script_create(&self, script: CreateScript) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.create_scripts.push_back(script);
        }
    }

    pub fn fail_next_cancel(&self, err: GatewayError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancel_failures.push_back(err);
        }
    }

    /// Move an intent to `status`, as the payer's client would.
    pub fn set_status(&self, intent_id: &str, status: GatewayStatus) -> Result<(), GatewayError> {
        let mut inner = self.inner()?;
        let (intent, _) = inner
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))?;
        intent.status = status;
        Ok(())
    }

    /// Distinct intents created so far.
    pub fn intents_created(&self) -> usize {
        self.inner.lock().map(|i| i.intents.len()).unwrap_or(0)
    }

    /// Every create call that reached the gateway, replays included.
    pub fn create_calls(&self) -> usize {
        self.inner.lock().map(|i| i.create_calls).unwrap_or(0)
    }

    pub fn intent(&self, intent_id: &str) -> Option<IntentSnapshot> {
        self.inner
            .lock()
            .ok()
            .and_then(|i| i.intents.get(intent_id).map(|(s, _)| s.clone()))
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.inner.lock().map(|i| i.cancelled.clone()).unwrap_or_default()
    }
}

impl PaymentGateway for SimulatedGateway {
    fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency.min(request.timeout));
        }

        let amount_minor = request
            .amount
            .minor_units()
            .map_err(|e| GatewayError::InvalidAmount(e.to_string()))?;
        if amount_minor <= 0 {
            return Err(GatewayError::InvalidAmount(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }

        let mut inner = self.inner()?;
        inner.create_calls += 1;

        let script = inner.create_scripts.pop_front();
        if let Some(CreateScript::Fail(err)) = &script {
            return Err(err.clone());
        }

        let created = match inner.by_key.get(&request.idempotency_key) {
            Some(intent_id) => {
                let (snapshot, secret) = &inner.intents[intent_id];
                if snapshot.amount_minor != amount_minor || snapshot.currency != request.currency {
                    return Err(GatewayError::Declined(format!(
                        "idempotency key {} reused with different parameters",
                        request.idempotency_key
                    )));
                }
                CreatedIntent {
                    intent_id: snapshot.intent_id.clone(),
                    client_secret: secret.clone(),
                }
            }
            None => {
                let intent_id = format!("pi_{}", Uuid::now_v7().simple());
                let client_secret = format!("{intent_id}_secret_{}", Uuid::now_v7().simple());
                let snapshot = IntentSnapshot {
                    intent_id: intent_id.clone(),
                    idempotency_key: request.idempotency_key.clone(),
                    amount_minor,
                    currency: request.currency.clone(),
                    status: GatewayStatus::Pending,
                };
                inner
                    .by_key
                    .insert(request.idempotency_key.clone(), intent_id.clone());
                inner
                    .intents
                    .insert(intent_id.clone(), (snapshot, client_secret.clone()));
                CreatedIntent {
                    intent_id,
                    client_secret,
                }
            }
        };

        if self.latency > request.timeout || script == Some(CreateScript::CreateThenTimeout) {
            return Err(GatewayError::Timeout(request.timeout));
        }
        Ok(created)
    }

    fn cancel_intent(&self, intent_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner()?;
        if let Some(err) = inner.cancel_failures.pop_front() {
            return Err(err);
        }

        let (intent, _) = inner
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))?;
        match intent.status {
            GatewayStatus::Succeeded => Err(GatewayError::Declined(format!(
                "intent {intent_id} already succeeded"
            ))),
            GatewayStatus::Canceled => Ok(()),
            _ => {
                intent.status = GatewayStatus::Canceled;
                inner.cancelled.push(intent_id.to_string());
                Ok(())
            }
        }
    }
}
