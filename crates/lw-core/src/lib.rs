pub mod error;
pub mod lead;
pub mod tenant;
pub mod trace;

pub use error::{IntakeError, TenantLoadError};
pub use lead::{validate_lead, Lead};
pub use tenant::{StaticTenantDirectory, TenantConfig, TenantDirectory, Tier};
pub use trace::{claim_token, new_trace_id, parse_claim_token, DeliveryStatus, TraceRecord};
