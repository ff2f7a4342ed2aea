use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value as JsonValue;

use procura_events::{EventEnvelope, InMemoryEventBus};
use procura_infra::gateway::SimulatedGateway;
use procura_infra::repository::InMemoryOrderRepository;
use procura_infra::stock_ledger::InMemoryStockLedger;
use procura_infra::{EngineConfig, EngineError, ProcurementEngine};

use crate::app::errors;

pub type EventBusImpl = InMemoryEventBus<EventEnvelope<JsonValue>>;

pub type Engine = ProcurementEngine<
    Arc<InMemoryOrderRepository>,
    Arc<SimulatedGateway>,
    Arc<InMemoryStockLedger>,
    Arc<EventBusImpl>,
>;

/// Shared state behind every route.
#[derive(Debug)]
pub struct AppServices {
    engine: Arc<Engine>,
}

impl AppServices {
    /// Wire the engine over in-memory collaborators and the simulated gateway.
    pub fn in_memory(config: EngineConfig) -> Self {
        let engine = ProcurementEngine::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(SimulatedGateway::new()),
            Arc::new(InMemoryStockLedger::new()),
            Arc::new(EventBusImpl::new()),
            config,
        );
        Self::new(Arc::new(engine))
    }

    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run a synchronous engine operation on the blocking pool.
    ///
    /// The engine holds per-order locks across gateway calls, so it must never
    /// run on an async worker thread.
    pub async fn run<T, F>(&self, op: F) -> Result<T, Response>
    where
        F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || op(&engine)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(errors::engine_error_to_response(err)),
            Err(join) => {
                tracing::error!(error = %join, "engine task aborted");
                Err(errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "engine task aborted",
                ))
            }
        }
    }
}
