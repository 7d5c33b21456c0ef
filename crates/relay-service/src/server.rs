//! HTTP server for the relay API.
//!
//! Exposes the relay pipeline and its read queries under `/api`, plus a
//! liveness probe.

use axum::{
	extract::{DefaultBodyLimit, Path, Query, State},
	response::Json,
	routing::{get, post},
	Router,
};
use relay_config::ApiConfig;
use relay_core::{QueryError, RelayEngine};
use relay_types::{
	APIError, BalanceResponse, HistoryParams, HistoryResponse, RelayRequest, RelayResponse,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Seconds a client should wait before retrying after a ledger or storage outage.
const RETRY_AFTER_SECONDS: u64 = 5;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<RelayEngine>,
}

/// Builds the API router.
pub fn router(api_config: &ApiConfig, engine: Arc<RelayEngine>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/relay", post(handle_relay))
				.route("/balance/{address}", get(handle_balance))
				.route("/transactions/{address}", get(handle_history)),
		)
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

/// Serves the API until `shutdown` resolves.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<RelayEngine>,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!(address = %bind_address, "Relay API server listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;
	Ok(())
}

fn query_error(error: QueryError) -> APIError {
	match error {
		QueryError::InvalidAddress(address) => APIError::BadRequest {
			error_type: "INVALID_ADDRESS".to_string(),
			message: format!("Invalid address: {}", address),
		},
		QueryError::InvalidFilter(message) => APIError::BadRequest {
			error_type: "INVALID_STATUS_FILTER".to_string(),
			message,
		},
		QueryError::Ledger(message) => APIError::ServiceUnavailable {
			error_type: "LEDGER_UNAVAILABLE".to_string(),
			message,
			retry_after: Some(RETRY_AFTER_SECONDS),
		},
		QueryError::Storage(message) => APIError::ServiceUnavailable {
			error_type: "STORAGE_UNAVAILABLE".to_string(),
			message,
			retry_after: Some(RETRY_AFTER_SECONDS),
		},
	}
}

/// Handles POST /api/relay.
///
/// A declined or failed relay is a verdict, not an HTTP error. The pipeline
/// runs on its own task so that a dropped or timed-out request cannot stop
/// it between submission and recording.
async fn handle_relay(
	State(state): State<AppState>,
	Json(request): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, APIError> {
	let engine = state.engine.clone();
	let pipeline = tokio::spawn(async move { engine.relay(&request.raw_transaction).await });

	let outcome = pipeline.await.map_err(|e| {
		tracing::error!(error = %e, "Relay pipeline task failed");
		APIError::InternalServerError {
			error_type: "RELAY_FAILED".to_string(),
			message: "Relay pipeline failed unexpectedly".to_string(),
		}
	})?;
	Ok(Json(RelayResponse {
		schema_valid: outcome.schema_valid,
		sponsored: outcome.sponsored,
		nonce_consistent: outcome.nonce_consistent,
	}))
}

/// Handles GET /api/balance/{address}.
async fn handle_balance(
	Path(address): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, APIError> {
	match state.engine.balance_of(&address).await {
		Ok(balance) => Ok(Json(BalanceResponse { address, balance })),
		Err(e) => {
			tracing::warn!(address = %address, error = %e, "Balance query failed");
			Err(query_error(e))
		},
	}
}

/// Handles GET /api/transactions/{address}.
async fn handle_history(
	Path(address): Path<String>,
	Query(params): Query<HistoryParams>,
	State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, APIError> {
	state
		.engine
		.history(&address, &params.status, params.before, params.limit)
		.await
		.map(|transactions| Json(HistoryResponse { transactions }))
		.map_err(|e| {
			tracing::warn!(address = %address, error = %e, "History query failed");
			query_error(e)
		})
}

async fn handle_health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use relay_core::testing::{dead_address, sign_legacy, signer, FakeLedger};
	use relay_core::{EngineSettings, NoopThrottler, StorageRecorder};
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_storage::StorageService;
	use tower::ServiceExt;

	fn api_config(timeout_seconds: u64) -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".to_string(),
			port: 0,
			timeout_seconds,
			max_request_size: 64 * 1024,
		}
	}

	fn app(ledger: &Arc<FakeLedger>) -> Router {
		app_with_timeout(ledger, 10)
	}

	fn app_with_timeout(ledger: &Arc<FakeLedger>, timeout_seconds: u64) -> Router {
		let config = relay_config::ConfigBuilder::new().max_history_limit(10).build();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let engine = RelayEngine::new(
			EngineSettings::from_config(&config).unwrap(),
			storage.clone(),
			ledger.service(),
			Arc::new(StorageRecorder::new(storage, Duration::from_secs(1))),
			Arc::new(NoopThrottler),
		);
		router(&api_config(timeout_seconds), Arc::new(engine))
	}

	async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, serde_json::from_slice(&body).unwrap_or(Value::Null))
	}

	fn get(uri: &str) -> Request<Body> {
		Request::get(uri).body(Body::empty()).unwrap()
	}

	fn relay_request(raw: &str) -> Request<Body> {
		Request::post("/api/relay")
			.header("content-type", "application/json")
			.body(Body::from(json!({ "rawTransaction": raw }).to_string()))
			.unwrap()
	}

	#[tokio::test]
	async fn test_health() {
		let (status, body) = call(&app(&FakeLedger::new()), get("/health")).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "ok");
	}

	#[tokio::test]
	async fn test_relay_then_history() {
		let ledger = FakeLedger::new();
		let app = app(&ledger);
		let raw = sign_legacy(&signer(), 5, Some(43114), Some(dead_address()));

		let (status, body) = call(&app, relay_request(&raw)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(
			body,
			json!({"schemaValid": true, "sponsored": true, "nonceConsistent": true})
		);

		let sender = format!("{:#x}", signer().address());
		let uri = format!(
			"/api/transactions/{}?status=SENT&before={}",
			sender,
			u64::MAX
		);
		let (status, body) = call(&app, get(&uri)).await;
		assert_eq!(status, StatusCode::OK);
		let transactions = body["transactions"].as_array().unwrap();
		assert_eq!(transactions.len(), 1);
		assert_eq!(transactions[0]["status"], "SENT");
		assert_eq!(transactions[0]["tx"]["nonce"], 5);
		assert!(transactions[0]["createdAt"].as_u64().unwrap() > 0);
	}

	#[tokio::test]
	async fn test_timed_out_request_still_completes_relay() {
		let ledger = FakeLedger::new();
		*ledger.send_delay.lock().unwrap() = Duration::from_millis(700);
		let app = app_with_timeout(&ledger, 1);
		let first = sign_legacy(&signer(), 1, Some(43114), Some(dead_address()));
		let second = sign_legacy(&signer(), 2, Some(43114), Some(dead_address()));

		// One relay queues behind the other and outlives the HTTP timeout
		let ((first_status, _), (second_status, _)) = tokio::join!(
			call(&app, relay_request(&first)),
			call(&app, relay_request(&second))
		);
		let mut statuses = [first_status.as_u16(), second_status.as_u16()];
		statuses.sort_unstable();
		assert_eq!(statuses, [200, 408]);

		let uri = format!(
			"/api/transactions/{:#x}?before={}",
			signer().address(),
			u64::MAX
		);
		let mut recorded = 0;
		for _ in 0..40 {
			let (_, body) = call(&app, get(&uri)).await;
			recorded = body["transactions"].as_array().map_or(0, Vec::len);
			if recorded == 2 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		assert_eq!(recorded, 2);
		assert_eq!(ledger.send_count(), 2);
	}

	#[tokio::test]
	async fn test_dropped_request_still_records_outcome() {
		let ledger = FakeLedger::new();
		*ledger.send_delay.lock().unwrap() = Duration::from_millis(200);
		let app = app(&ledger);
		let raw = sign_legacy(&signer(), 3, Some(43114), Some(dead_address()));

		let dropped =
			tokio::time::timeout(Duration::from_millis(50), call(&app, relay_request(&raw))).await;
		assert!(dropped.is_err());

		tokio::time::sleep(Duration::from_millis(400)).await;
		let uri = format!(
			"/api/transactions/{:#x}?status=SENT&before={}",
			signer().address(),
			u64::MAX
		);
		let (_, body) = call(&app, get(&uri)).await;
		assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
		assert_eq!(ledger.send_count(), 1);
	}

	#[tokio::test]
	async fn test_garbage_relay_is_a_verdict() {
		let ledger = FakeLedger::new();
		let (status, body) = call(&app(&ledger), relay_request("0x1234")).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(
			body,
			json!({"schemaValid": false, "sponsored": false, "nonceConsistent": null})
		);
	}

	#[tokio::test]
	async fn test_balance_endpoint() {
		let ledger = FakeLedger::new();
		let app = app(&ledger);
		let address = format!("{:#x}", signer().address());

		let (status, body) = call(&app, get(&format!("/api/balance/{}", address))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["address"], address);
		assert!(body["balance"].as_str().unwrap().starts_with("0."));

		let (status, body) = call(&app, get("/api/balance/0xnope")).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_ADDRESS");
	}

	#[tokio::test]
	async fn test_unknown_status_filter_is_bad_request() {
		let ledger = FakeLedger::new();
		let address = format!("{:#x}", signer().address());
		let uri = format!("/api/transactions/{}?status=PENDING", address);

		let (status, body) = call(&app(&ledger), get(&uri)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_STATUS_FILTER");
	}
}
