use async_trait::async_trait;
use chrono::Utc;
use lw_core::lead::Lead;
use lw_core::tenant::TenantConfig;
use lw_core::trace::claim_token;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Status markers embedded in the alert text. The claim reconciler rewrites
/// the first into the second when the lead is acknowledged.
pub const UNCLAIMED_MARKER: &str = "⚠️ Status: UNCLAIMED";
pub const CLAIMED_MARKER: &str = "✅ Status: CLAIMED";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram rejected request: {0}")]
    Rejected(String),
}

/// Outcome of one outbound alert. Transport failures and provider rejections
/// both land here as `ok = false` so the orchestrator can record a FAILED
/// attempt instead of unwinding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryOutcome {
    pub ok: bool,
    pub status: Option<u16>,
    pub provider_message_id: Option<i64>,
    pub description: Option<String>,
}

/// Seam between the orchestrator/reconciler and the messaging channel.
/// `send_alert` performs exactly one outbound send and never retries;
/// retry policy belongs to the caller, not here.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(
        &self,
        lead: &Lead,
        trace_id: &str,
        tenant: &TenantConfig,
    ) -> DeliveryOutcome;

    async fn edit_claimed(
        &self,
        tenant: &TenantConfig,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError>;

    async fn ack_callback(&self, tenant: &TenantConfig, callback_id: &str)
        -> Result<(), NotifyError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<ApiResult>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    message_id: Option<i64>,
}

/// Telegram Bot API client. The base URL is configurable so tests and local
/// stubs can stand in for the real endpoint.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(api_base: impl Into<String>, send_timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(send_timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
        })
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, token, method)
    }

    async fn call(
        &self,
        token: &str,
        method: &str,
        body: &Value,
    ) -> Result<(u16, ApiResponse), reqwest::Error> {
        let response = self
            .client
            .post(self.method_url(token, method))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let parsed = response.json::<ApiResponse>().await?;
        Ok((status, parsed))
    }

    async fn expect_ok(&self, token: &str, method: &str, body: &Value) -> Result<(), NotifyError> {
        let (status, api) = self.call(token, method, body).await?;
        if !api.ok {
            return Err(NotifyError::Rejected(
                api.description
                    .unwrap_or_else(|| format!("telegram error ({status})")),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_alert(
        &self,
        lead: &Lead,
        trace_id: &str,
        tenant: &TenantConfig,
    ) -> DeliveryOutcome {
        let Some((token, chat_id)) = tenant.credentials() else {
            // Resolution should have failed closed before we get here.
            return DeliveryOutcome {
                ok: false,
                description: Some("tenant has no channel credentials".to_string()),
                ..DeliveryOutcome::default()
            };
        };

        let body = json!({
            "chat_id": chat_id,
            "text": render_alert(lead, trace_id, &tenant.display_name),
            "parse_mode": "HTML",
            "reply_markup": {
                "inline_keyboard": [[{
                    "text": "✅ CLAIM THIS LEAD",
                    "callback_data": claim_token(trace_id),
                }]],
            },
        });

        match self.call(token, "sendMessage", &body).await {
            Ok((status, api)) => DeliveryOutcome {
                ok: api.ok,
                status: Some(status),
                provider_message_id: api.result.and_then(|result| result.message_id),
                description: api.description,
            },
            Err(err) => {
                warn!(event = "telegram_send_failed", trace_id = trace_id, error = %err);
                DeliveryOutcome {
                    ok: false,
                    status: err.status().map(|code| code.as_u16()),
                    provider_message_id: None,
                    description: Some(err.to_string()),
                }
            }
        }
    }

    async fn edit_claimed(
        &self,
        tenant: &TenantConfig,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError> {
        let Some((token, _)) = tenant.credentials() else {
            return Err(NotifyError::Rejected(
                "tenant has no channel credentials".to_string(),
            ));
        };
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        self.expect_ok(token, "editMessageText", &body).await
    }

    async fn ack_callback(
        &self,
        tenant: &TenantConfig,
        callback_id: &str,
    ) -> Result<(), NotifyError> {
        let Some((token, _)) = tenant.credentials() else {
            return Err(NotifyError::Rejected(
                "tenant has no channel credentials".to_string(),
            ));
        };
        let body = json!({ "callback_query_id": callback_id });
        self.expect_ok(token, "answerCallbackQuery", &body).await
    }
}

/// Renders the staff-facing alert: requester details, trace id, tap-to-call
/// action, and the unclaimed status marker the reconciler later rewrites.
pub fn render_alert(lead: &Lead, trace_id: &str, client_name: &str) -> String {
    let divider = "─".repeat(28);
    format!(
        "⚡ <b>NEW LEAD INCOMING</b> ⚡\n\
         {divider}\n\
         <b>👤 Name:</b> {name}\n\
         <b>📍 Address:</b> {address}\n\
         <b>🧾 Trace:</b> {trace_id}\n\
         <b>🏷 Client:</b> {client_name}\n\
         <b>🏙 City:</b> {city}\n\
         <b>🛠 Service:</b> {service}\n\
         <b>💬 Note:</b> {note}\n\
         \n\
         <b>📞 Action:</b> <a href=\"tel:{phone}\">TAP TO CALL NOW</a>\n\
         {UNCLAIMED_MARKER}\n\
         {divider}\n\
         <i>⏱ Sent via LeadWire @ {sent_at}</i>",
        name = lead.name,
        address = lead.address.as_deref().unwrap_or("N/A"),
        city = lead.city,
        service = lead.service,
        note = lead.message.as_deref().unwrap_or("No additional notes"),
        phone = lead.phone,
        sent_at = Utc::now().to_rfc3339(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead() -> Lead {
        Lead {
            name: "Ada Byrne".to_string(),
            phone: "+44 7700 900123".to_string(),
            service: "Roof repair".to_string(),
            address: Some("12 Elm St, Springfield".to_string()),
            city: "Springfield".to_string(),
            message: None,
        }
    }

    #[test]
    fn alert_embeds_lead_details_and_claim_plumbing() {
        let text = render_alert(&sample_lead(), "L-ABC123DEF", "High Range Roofing");

        assert!(text.contains("Ada Byrne"));
        assert!(text.contains("12 Elm St, Springfield"));
        assert!(text.contains("L-ABC123DEF"));
        assert!(text.contains("High Range Roofing"));
        assert!(text.contains("Springfield"));
        assert!(text.contains("Roof repair"));
        assert!(text.contains("No additional notes"));
        assert!(text.contains("<a href=\"tel:+44 7700 900123\">"));
        assert!(text.contains(UNCLAIMED_MARKER));
    }

    #[test]
    fn alert_uses_placeholders_for_absent_optionals() {
        let mut lead = sample_lead();
        lead.address = None;
        lead.city = "Unknown".to_string();

        let text = render_alert(&lead, "L-ABC123DEF", "High Range Roofing");
        assert!(text.contains("<b>📍 Address:</b> N/A"));
        assert!(text.contains("<b>🏙 City:</b> Unknown"));
    }

    #[test]
    fn marker_rewrite_produces_the_claimed_variant() {
        let text = render_alert(&sample_lead(), "L-ABC123DEF", "High Range Roofing");
        let edited = text.replace(UNCLAIMED_MARKER, CLAIMED_MARKER);
        assert!(edited.contains(CLAIMED_MARKER));
        assert!(!edited.contains(UNCLAIMED_MARKER));
    }
}
