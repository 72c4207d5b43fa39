use thiserror::Error;

/// Request-scoped failures raised while taking in a lead or reconciling a
/// claim callback. Each variant maps to exactly one client-facing outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("invalid payload: expected a JSON object")]
    InvalidPayload,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unauthorized client id: {0}")]
    UnauthorizedClient(String),
    #[error("missing channel credentials for client: {0}")]
    IncompleteCredentials(String),
    #[error("malformed claim callback data: {0}")]
    MalformedCallback(String),
}

/// Startup-time tenant registry faults. The registry is loaded once; any of
/// these aborts boot instead of surfacing at request time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantLoadError {
    #[error("duplicate client id in tenant registry: {0}")]
    DuplicateClientId(String),
    #[error("chat id {chat_id} is shared by clients {first} and {second}")]
    DuplicateChatId {
        chat_id: String,
        first: String,
        second: String,
    },
}
