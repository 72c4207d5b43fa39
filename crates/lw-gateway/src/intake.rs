use crate::Gateway;
use chrono::{DateTime, Utc};
use lw_core::error::IntakeError;
use lw_core::lead::{validate_lead, Lead};
use lw_core::trace::{new_trace_id, DeliveryStatus, TraceRecord};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Terminal result of one intake attempt, mapped onto an HTTP response by
/// the handler. Every variant has already been recorded in the lead log.
#[derive(Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    Delivered { trace_id: String, client_name: String },
    DeliveryFailed { trace_id: String, error: String },
    Unauthorized { trace_id: String },
    Fault { trace_id: String, error: String },
}

/// Runs the intake pipeline for one submission: assign a trace id, validate,
/// resolve the tenant, dispatch the alert, and append exactly one trace
/// record once the outcome is known. Failures before dispatch short-circuit
/// to a FAILED record with placeholder lead fields so the attempt is still
/// auditable.
pub async fn run(gateway: Arc<Gateway>, body: Vec<u8>, header_client_id: String) -> IntakeOutcome {
    let trace_id = new_trace_id();
    let started = Instant::now();
    let timestamp = Utc::now();
    info!(event = "intake_started", trace_id = %trace_id);

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "intake_payload_unreadable", trace_id = %trace_id, error = %err);
            let client_id = audit_client_id(header_client_id.trim());
            record_short_circuit(&gateway, &trace_id, client_id, started, timestamp);
            return IntakeOutcome::Fault {
                trace_id,
                error: IntakeError::InvalidPayload.to_string(),
            };
        }
    };

    let client_id = payload
        .get("clientId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| header_client_id.trim().to_string());

    let lead = match validate_lead(&payload) {
        Ok(lead) => lead,
        Err(err) => {
            warn!(event = "intake_validation_failed", trace_id = %trace_id, error = %err);
            record_short_circuit(
                &gateway,
                &trace_id,
                audit_client_id(&client_id),
                started,
                timestamp,
            );
            return IntakeOutcome::Fault {
                trace_id,
                error: err.to_string(),
            };
        }
    };
    info!(event = "intake_validated", trace_id = %trace_id);

    if client_id.is_empty() {
        warn!(event = "intake_missing_client_id", trace_id = %trace_id);
        record_short_circuit(&gateway, &trace_id, "unknown", started, timestamp);
        return IntakeOutcome::Unauthorized { trace_id };
    }

    let tenant = match gateway.tenants.resolve(&client_id) {
        Ok(tenant) => tenant.clone(),
        Err(err) => {
            warn!(
                event = "intake_tenant_rejected",
                trace_id = %trace_id,
                client_id = %client_id,
                error = %err
            );
            record_short_circuit(&gateway, &trace_id, &client_id, started, timestamp);
            return IntakeOutcome::Unauthorized { trace_id };
        }
    };
    info!(
        event = "intake_tenant_resolved",
        trace_id = %trace_id,
        client_id = %client_id,
        tier = %tenant.tier
    );

    let outcome = gateway.notifier.send_alert(&lead, &trace_id, &tenant).await;
    let latency_ms = started.elapsed().as_millis() as u64;
    let status = if outcome.ok {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Failed
    };

    persist(
        &gateway,
        &TraceRecord {
            trace_id: trace_id.clone(),
            client_id,
            client_name: Some(tenant.display_name.clone()),
            client_tier: Some(tenant.tier),
            latency_ms,
            status,
            timestamp,
            lead,
            claimed: false,
        },
    );
    info!(
        event = "intake_recorded",
        trace_id = %trace_id,
        status = %status,
        latency_ms = latency_ms
    );

    if outcome.ok {
        IntakeOutcome::Delivered {
            trace_id,
            client_name: tenant.display_name,
        }
    } else {
        let error = outcome.description.unwrap_or_else(|| match outcome.status {
            Some(code) => format!("Telegram error ({code})"),
            None => "Telegram error".to_string(),
        });
        IntakeOutcome::DeliveryFailed { trace_id, error }
    }
}

fn audit_client_id(client_id: &str) -> &str {
    if client_id.is_empty() {
        "unknown"
    } else {
        client_id
    }
}

fn record_short_circuit(
    gateway: &Gateway,
    trace_id: &str,
    client_id: &str,
    started: Instant,
    timestamp: DateTime<Utc>,
) {
    persist(
        gateway,
        &TraceRecord {
            trace_id: trace_id.to_string(),
            client_id: client_id.to_string(),
            client_name: None,
            client_tier: None,
            latency_ms: started.elapsed().as_millis() as u64,
            status: DeliveryStatus::Failed,
            timestamp,
            lead: Lead::placeholder(),
            claimed: false,
        },
    );
}

/// The audit write must never drop a lead silently: on storage faults the
/// full record is logged with its trace id for manual recovery, and the
/// response path continues.
fn persist(gateway: &Gateway, record: &TraceRecord) {
    let result = gateway.store.lock().unwrap().append(record);
    if let Err(err) = result {
        let payload =
            serde_json::to_string(record).unwrap_or_else(|_| format!("{record:?}"));
        error!(
            event = "lead_store_append_failed",
            trace_id = %record.trace_id,
            error = %err,
            payload = %payload
        );
    }
}
