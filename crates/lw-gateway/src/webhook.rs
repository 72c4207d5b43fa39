use crate::telegram::{CLAIMED_MARKER, UNCLAIMED_MARKER};
use crate::Gateway;
use lw_core::trace::parse_claim_token;
use lw_storage::StorageError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Channel-originated update, narrowed to the fields the reconciler reads.
/// Everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMessage {
    pub message_id: i64,
    pub chat: CallbackChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackChat {
    pub id: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Not a claim interaction; accepted and ignored.
    NoOp,
    Claimed { trace_id: String },
    /// Unrecognized callback data; logged and ignored.
    Malformed,
    UnknownTrace { trace_id: String },
}

/// Marks the lead claimed and rewrites the original alert. The flag update
/// is the authoritative transition and is idempotent; the message edit and
/// the callback acknowledgment are cosmetic, so their failures are logged
/// and never surfaced. Only storage faults error out.
pub async fn reconcile(
    gateway: &Arc<Gateway>,
    update: WebhookUpdate,
) -> Result<ClaimOutcome, StorageError> {
    let Some(callback) = update.callback_query else {
        return Ok(ClaimOutcome::NoOp);
    };

    let data = callback.data.clone().unwrap_or_default();
    let trace_id = match parse_claim_token(&data) {
        Ok(trace_id) => trace_id.to_string(),
        Err(err) => {
            warn!(event = "claim_token_malformed", error = %err);
            return Ok(ClaimOutcome::Malformed);
        }
    };

    let updated = gateway.store.lock().unwrap().set_claimed(&trace_id)?;
    if !updated {
        warn!(event = "claim_unknown_trace", trace_id = %trace_id);
        return Ok(ClaimOutcome::UnknownTrace { trace_id });
    }
    info!(event = "lead_claimed", trace_id = %trace_id);

    apply_visual_edit(gateway, &trace_id, &callback).await;
    Ok(ClaimOutcome::Claimed { trace_id })
}

async fn apply_visual_edit(gateway: &Arc<Gateway>, trace_id: &str, callback: &CallbackQuery) {
    let Some(message) = &callback.message else {
        warn!(event = "claim_edit_skipped", trace_id = %trace_id, reason = "no_message");
        return;
    };

    let chat_id = message.chat.id.to_string();
    let Some(tenant) = gateway.tenants.resolve_by_chat(&chat_id) else {
        warn!(event = "claim_tenant_unresolved", trace_id = %trace_id, chat_id = %chat_id);
        return;
    };

    match &message.text {
        Some(original) => {
            let text = original.replace(UNCLAIMED_MARKER, CLAIMED_MARKER);
            if let Err(err) = gateway
                .notifier
                .edit_claimed(tenant, &chat_id, message.message_id, &text)
                .await
            {
                warn!(event = "claim_edit_failed", trace_id = %trace_id, error = %err);
            }
        }
        None => {
            warn!(event = "claim_edit_skipped", trace_id = %trace_id, reason = "no_text");
        }
    }

    if let Err(err) = gateway.notifier.ack_callback(tenant, &callback.id).await {
        warn!(event = "claim_ack_failed", trace_id = %trace_id, error = %err);
    }
}
