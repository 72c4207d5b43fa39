mod intake;
mod telegram;
#[cfg(test)]
mod testutil;
mod webhook;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use intake::IntakeOutcome;
use lw_core::tenant::{StaticTenantDirectory, TenantConfig, TenantDirectory};
use lw_storage::LeadStore;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telegram::{Notifier, TelegramNotifier};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    db_path: String,
    tenants_path: String,
    telegram_api: String,
    send_timeout: Duration,
    dev: bool,
}

#[derive(Parser, Debug)]
#[command(name = "lw-gateway")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    db: String,
    #[arg(long, default_value = "")]
    tenants: String,
    #[arg(long, default_value = "")]
    telegram_api: String,
    #[arg(long, default_value_t = 10)]
    send_timeout: u64,
    #[arg(long, default_value_t = false)]
    dev: bool,
}

/// Process-wide service state shared by every handler. The tenant directory
/// is read-only after startup; the store serializes its own access.
struct Gateway {
    config: Config,
    tenants: Box<dyn TenantDirectory>,
    store: Mutex<LeadStore>,
    notifier: Arc<dyn Notifier>,
}

type SharedGateway = Arc<Gateway>;

#[tokio::main]
async fn main() {
    let config = load_config();
    init_logging(&config);

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };

    let tenants = match load_tenants(&config.tenants_path) {
        Ok(directory) => directory,
        Err(err) => {
            error!(event = "tenant_registry_error", error = %err, path = %config.tenants_path);
            return;
        }
    };

    let store = match open_store(&config.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(event = "lead_store_error", error = %err, path = %config.db_path);
            return;
        }
    };

    let notifier = match TelegramNotifier::new(config.telegram_api.clone(), config.send_timeout) {
        Ok(notifier) => notifier,
        Err(err) => {
            error!(event = "notifier_error", error = %err);
            return;
        }
    };

    info!(
        event = "gateway_start",
        addr = %config.addr,
        tenants = tenants.len(),
        db = %config.db_path,
        dev = config.dev
    );

    let gateway: SharedGateway = Arc::new(Gateway {
        config,
        tenants: Box::new(tenants),
        store: Mutex::new(store),
        notifier: Arc::new(notifier),
    });

    let app = Router::new()
        .route("/v1/lead-capture", post(capture_lead).get(health))
        .route("/v1/webhook", post(claim_webhook))
        .route("/v1/analytics/recent", get(recent_leads))
        .route("/v1/analytics/summary", get(intake_summary))
        .with_state(gateway);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "gateway_error", error = %err);
            return;
        }
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(event = "gateway_error", error = %err);
    }
}

async fn capture_lead(
    State(gateway): State<SharedGateway>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let header_client_id = headers
        .get("x-client-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    let dev = gateway.config.dev;

    // Detached task: a caller disconnect drops this handler's future, but the
    // pipeline still runs to the audit write.
    let outcome = tokio::spawn(intake::run(gateway, body.to_vec(), header_client_id)).await;
    match outcome {
        Ok(outcome) => intake_response(dev, outcome),
        Err(err) => {
            error!(event = "intake_task_failed", error = %err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": "System logic fault."})),
            )
        }
    }
}

fn intake_response(dev: bool, outcome: IntakeOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        IntakeOutcome::Delivered {
            trace_id,
            client_name,
        } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "traceId": trace_id,
                "message": "Value Delivered.",
                "client": client_name,
            })),
        ),
        IntakeOutcome::DeliveryFailed { trace_id, error } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"success": false, "traceId": trace_id, "error": error})),
        ),
        IntakeOutcome::Unauthorized { trace_id } => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "traceId": trace_id, "error": "Invalid Routing"})),
        ),
        IntakeOutcome::Fault { trace_id, error } => {
            let message = if dev {
                error
            } else {
                "System logic fault.".to_string()
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "traceId": trace_id, "error": message})),
            )
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "lead-capture"}))
}

async fn claim_webhook(
    State(gateway): State<SharedGateway>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let update: webhook::WebhookUpdate = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "webhook_unreadable", error = %err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Webhook Failed"})),
            );
        }
    };

    match webhook::reconcile(&gateway, update).await {
        Ok(_) => (StatusCode::OK, Json(json!({"ok": true}))),
        Err(err) => {
            error!(event = "webhook_failed", error = %err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Webhook Failed"})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

async fn recent_leads(
    State(gateway): State<SharedGateway>,
    Query(query): Query<RecentQuery>,
) -> (StatusCode, Json<Value>) {
    let result = gateway.store.lock().unwrap().recent(query.limit);
    match result {
        Ok(leads) => (StatusCode::OK, Json(json!({"leads": leads}))),
        Err(err) => {
            error!(event = "analytics_query_failed", error = %err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Analytics unavailable"})),
            )
        }
    }
}

async fn intake_summary(State(gateway): State<SharedGateway>) -> (StatusCode, Json<Value>) {
    let result = gateway.store.lock().unwrap().summary();
    match result {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(err) => {
            error!(event = "analytics_query_failed", error = %err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Analytics unavailable"})),
            )
        }
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        addr: resolve_setting(&args.addr, "LW_ADDR", "127.0.0.1:8080"),
        db_path: resolve_setting(&args.db, "LW_DB_PATH", "leads.db"),
        tenants_path: resolve_setting(&args.tenants, "LW_TENANTS", "tenants.toml"),
        telegram_api: resolve_setting(
            &args.telegram_api,
            "LW_TELEGRAM_API",
            telegram::DEFAULT_API_BASE,
        ),
        send_timeout: Duration::from_secs(args.send_timeout),
        dev: args.dev || env_true("LW_DEV"),
    }
}

fn resolve_setting(flag: &str, env_key: &str, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    default.to_string()
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn init_logging(config: &Config) {
    let level = if config.dev {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("LW_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(Debug, Deserialize)]
struct TenantsFile {
    #[serde(default)]
    tenants: Vec<TenantConfig>,
}

fn load_tenants(path: &str) -> Result<StaticTenantDirectory, String> {
    let content =
        std::fs::read_to_string(path).map_err(|err| format!("read {path}: {err}"))?;
    let file: TenantsFile =
        toml::from_str(&content).map_err(|err| format!("parse {path}: {err}"))?;
    if file.tenants.is_empty() {
        warn!(event = "tenant_registry_empty", path = path);
    }
    StaticTenantDirectory::new(file.tenants).map_err(|err| err.to_string())
}

fn open_store(path: &str) -> Result<LeadStore, String> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("create {}: {err}", parent.display()))?;
        }
    }
    LeadStore::open(path).map_err(|err| err.to_string())
}
