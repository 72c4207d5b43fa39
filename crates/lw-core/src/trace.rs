use crate::error::IntakeError;
use crate::lead::Lead;
use crate::tenant::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of the structured token carried in a claim control's callback
/// data, so a callback correlates to exactly one trace record.
pub const CLAIM_PREFIX: &str = "claim:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            "FAILED" => Ok(DeliveryStatus::Failed),
            other => Err(format!("Unknown delivery status: {other}")),
        }
    }
}

/// Durable audit entry for one intake attempt. Append-only; `claimed` is the
/// single field that may change after creation, and only from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub trace_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_tier: Option<Tier>,
    pub latency_ms: u64,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    pub lead: Lead,
    #[serde(default)]
    pub claimed: bool,
}

/// Generates a trace id of the form `L-3FA9C1D2E`, assigned once at intake
/// start and echoed back to the caller.
pub fn new_trace_id() -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("L-{}", entropy[..9].to_uppercase())
}

pub fn claim_token(trace_id: &str) -> String {
    format!("{CLAIM_PREFIX}{trace_id}")
}

/// Extracts the trace id from a claim control's callback data.
pub fn parse_claim_token(data: &str) -> Result<&str, IntakeError> {
    match data.strip_prefix(CLAIM_PREFIX) {
        Some(trace_id) if !trace_id.trim().is_empty() => Ok(trace_id.trim()),
        _ => Err(IntakeError::MalformedCallback(data.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_carry_prefix_and_are_unique() {
        let first = new_trace_id();
        let second = new_trace_id();
        assert!(first.starts_with("L-"));
        assert_eq!(first.len(), 11);
        assert_ne!(first, second);
    }

    #[test]
    fn claim_token_round_trips() {
        let token = claim_token("L-ABC123DEF");
        assert_eq!(token, "claim:L-ABC123DEF");
        assert_eq!(parse_claim_token(&token), Ok("L-ABC123DEF"));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for data in ["", "claim:", "claim:   ", "ack:L-ABC123DEF", "L-ABC123DEF"] {
            assert!(
                matches!(parse_claim_token(data), Err(IntakeError::MalformedCallback(_))),
                "expected rejection for {data:?}"
            );
        }
    }

    #[test]
    fn delivery_status_serializes_screaming() {
        let json = serde_json::to_string(&DeliveryStatus::Delivered).expect("serialize");
        assert_eq!(json, "\"DELIVERED\"");
        assert_eq!("failed".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Failed));
    }

    #[test]
    fn trace_record_serializes_camel_case_and_omits_absent_tenant_fields() {
        let record = TraceRecord {
            trace_id: "L-ABC123DEF".to_string(),
            client_id: "unknown".to_string(),
            client_name: None,
            client_tier: None,
            latency_ms: 42,
            status: DeliveryStatus::Failed,
            timestamp: Utc::now(),
            lead: Lead::placeholder(),
            claimed: false,
        };

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["traceId"], "L-ABC123DEF");
        assert_eq!(value["latencyMs"], 42);
        assert_eq!(value["status"], "FAILED");
        assert!(value.get("clientName").is_none());
        assert!(value.get("clientTier").is_none());
    }
}
