use crate::telegram::{DeliveryOutcome, Notifier, NotifyError};
use crate::{Config, Gateway};
use async_trait::async_trait;
use chrono::Utc;
use lw_core::lead::Lead;
use lw_core::tenant::{StaticTenantDirectory, TenantConfig, Tier};
use lw_core::trace::{DeliveryStatus, TraceRecord};
use lw_storage::LeadStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted notifier that records interactions instead of calling out.
pub struct MockNotifier {
    pub send_calls: AtomicUsize,
    pub edits: Mutex<Vec<String>>,
    pub acks: AtomicUsize,
    fail_sends: bool,
    fail_edits: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            send_calls: AtomicUsize::new(0),
            edits: Mutex::new(Vec::new()),
            acks: AtomicUsize::new(0),
            fail_sends: false,
            fail_edits: false,
        }
    }

    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::new()
        }
    }

    pub fn failing_edits() -> Self {
        Self {
            fail_edits: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_alert(
        &self,
        _lead: &Lead,
        _trace_id: &str,
        _tenant: &TenantConfig,
    ) -> DeliveryOutcome {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends {
            DeliveryOutcome {
                ok: false,
                status: Some(400),
                provider_message_id: None,
                description: Some("Bad Request: chat not found".to_string()),
            }
        } else {
            DeliveryOutcome {
                ok: true,
                status: Some(200),
                provider_message_id: Some(101),
                description: None,
            }
        }
    }

    async fn edit_claimed(
        &self,
        _tenant: &TenantConfig,
        _chat_id: &str,
        _message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError> {
        self.edits.lock().unwrap().push(text.to_string());
        if self.fail_edits {
            Err(NotifyError::Rejected("message is not modified".to_string()))
        } else {
            Ok(())
        }
    }

    async fn ack_callback(
        &self,
        _tenant: &TenantConfig,
        _callback_id: &str,
    ) -> Result<(), NotifyError> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Registered tenants: one fully configured, one missing its chat id so
/// credential failures can be exercised.
fn tenant_fixtures() -> Vec<TenantConfig> {
    vec![
        TenantConfig {
            client_id: "UK-ROOF-001".to_string(),
            display_name: "High Range Roofing".to_string(),
            bot_token: Some("tok-a".to_string()),
            chat_id: Some("-1001".to_string()),
            tier: Tier::Premium,
        },
        TenantConfig {
            client_id: "US-MOLD-002".to_string(),
            display_name: "Exit Mold NY".to_string(),
            bot_token: Some("tok-b".to_string()),
            chat_id: None,
            tier: Tier::Standard,
        },
    ]
}

pub fn gateway_with(notifier: Arc<MockNotifier>) -> Arc<Gateway> {
    let tenants = StaticTenantDirectory::new(tenant_fixtures()).expect("directory");
    Arc::new(Gateway {
        config: Config {
            addr: "127.0.0.1:0".to_string(),
            db_path: ":memory:".to_string(),
            tenants_path: "tenants.toml".to_string(),
            telegram_api: "http://127.0.0.1:1".to_string(),
            send_timeout: Duration::from_secs(1),
            dev: true,
        },
        tenants: Box::new(tenants),
        store: Mutex::new(LeadStore::open_in_memory().expect("store")),
        notifier,
    })
}

pub fn seed_record(gateway: &Gateway, trace_id: &str) {
    let record = TraceRecord {
        trace_id: trace_id.to_string(),
        client_id: "UK-ROOF-001".to_string(),
        client_name: Some("High Range Roofing".to_string()),
        client_tier: Some(Tier::Premium),
        latency_ms: 120,
        status: DeliveryStatus::Delivered,
        timestamp: Utc::now(),
        lead: Lead {
            name: "Ada Byrne".to_string(),
            phone: "+44 7700 900123".to_string(),
            service: "Roof repair".to_string(),
            address: Some("12 Elm St, Springfield".to_string()),
            city: "Springfield".to_string(),
            message: None,
        },
        claimed: false,
    };
    gateway.store.lock().unwrap().append(&record).expect("seed");
}
