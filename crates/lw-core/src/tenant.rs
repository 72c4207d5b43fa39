use crate::error::{IntakeError, TenantLoadError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Standard,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Standard
    }
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Premium => "premium",
            Tier::Standard => "standard",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "premium" => Ok(Tier::Premium),
            "standard" => Ok(Tier::Standard),
            other => Err(format!("Unknown tier: {other}")),
        }
    }
}

/// Static per-client delivery configuration. A tenant is usable for intake
/// only when both the channel credential and destination are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub client_id: String,
    pub display_name: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub tier: Tier,
}

impl TenantConfig {
    /// Returns the channel credential and destination, or `None` when either
    /// is missing or blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let chat_id = self.chat_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }
}

/// Read-only lookup of tenants, injected into the orchestrator and the claim
/// reconciler so tests can swap in fixtures.
pub trait TenantDirectory: Send + Sync {
    /// Resolves a client id to a usable tenant, failing closed on unknown or
    /// misconfigured entries.
    fn resolve(&self, client_id: &str) -> Result<&TenantConfig, IntakeError>;

    /// Reverse lookup by channel destination. Claim callbacks carry the
    /// originating chat id, not the client id.
    fn resolve_by_chat(&self, chat_id: &str) -> Option<&TenantConfig>;
}

/// Process-wide tenant table loaded once at startup.
pub struct StaticTenantDirectory {
    by_client: HashMap<String, TenantConfig>,
    chat_index: HashMap<String, String>,
}

impl StaticTenantDirectory {
    /// Builds the directory, validating the configuration invariants that
    /// must hold before any request is served: client ids are unique, and no
    /// two tenants share a chat destination.
    pub fn new(tenants: Vec<TenantConfig>) -> Result<Self, TenantLoadError> {
        let mut by_client = HashMap::new();
        let mut chat_index: HashMap<String, String> = HashMap::new();

        for tenant in tenants {
            if let Some((_, chat_id)) = tenant.credentials() {
                if let Some(existing) = chat_index.get(chat_id) {
                    return Err(TenantLoadError::DuplicateChatId {
                        chat_id: chat_id.to_string(),
                        first: existing.clone(),
                        second: tenant.client_id.clone(),
                    });
                }
                chat_index.insert(chat_id.to_string(), tenant.client_id.clone());
            }
            if by_client
                .insert(tenant.client_id.clone(), tenant.clone())
                .is_some()
            {
                return Err(TenantLoadError::DuplicateClientId(tenant.client_id));
            }
        }

        Ok(Self {
            by_client,
            chat_index,
        })
    }

    pub fn len(&self) -> usize {
        self.by_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_client.is_empty()
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn resolve(&self, client_id: &str) -> Result<&TenantConfig, IntakeError> {
        let tenant = self
            .by_client
            .get(client_id)
            .ok_or_else(|| IntakeError::UnauthorizedClient(client_id.to_string()))?;
        if tenant.credentials().is_none() {
            return Err(IntakeError::IncompleteCredentials(client_id.to_string()));
        }
        Ok(tenant)
    }

    fn resolve_by_chat(&self, chat_id: &str) -> Option<&TenantConfig> {
        self.chat_index
            .get(chat_id)
            .and_then(|client_id| self.by_client.get(client_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(client_id: &str, token: Option<&str>, chat_id: Option<&str>) -> TenantConfig {
        TenantConfig {
            client_id: client_id.to_string(),
            display_name: format!("{client_id} Ltd"),
            bot_token: token.map(str::to_string),
            chat_id: chat_id.map(str::to_string),
            tier: Tier::Standard,
        }
    }

    #[test]
    fn resolves_registered_tenant() {
        let directory =
            StaticTenantDirectory::new(vec![tenant("UK-ROOF-001", Some("tok"), Some("-100"))])
                .expect("directory");
        let resolved = directory.resolve("UK-ROOF-001").expect("resolve");
        assert_eq!(resolved.display_name, "UK-ROOF-001 Ltd");
        assert_eq!(resolved.credentials(), Some(("tok", "-100")));
    }

    #[test]
    fn unknown_client_is_unauthorized() {
        let directory = StaticTenantDirectory::new(Vec::new()).expect("directory");
        assert_eq!(
            directory.resolve("NOPE").unwrap_err(),
            IntakeError::UnauthorizedClient("NOPE".to_string())
        );
    }

    #[test]
    fn tenant_without_credentials_fails_closed() {
        let directory =
            StaticTenantDirectory::new(vec![tenant("US-MOLD-002", Some("tok"), None)])
                .expect("directory");
        assert_eq!(
            directory.resolve("US-MOLD-002").unwrap_err(),
            IntakeError::IncompleteCredentials("US-MOLD-002".to_string())
        );
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let directory =
            StaticTenantDirectory::new(vec![tenant("US-MOLD-002", Some("  "), Some("-100"))])
                .expect("directory");
        assert!(matches!(
            directory.resolve("US-MOLD-002"),
            Err(IntakeError::IncompleteCredentials(_))
        ));
    }

    #[test]
    fn reverse_lookup_by_chat_id() {
        let directory = StaticTenantDirectory::new(vec![
            tenant("UK-ROOF-001", Some("tok-a"), Some("-100")),
            tenant("US-MOLD-002", Some("tok-b"), Some("-200")),
        ])
        .expect("directory");

        let owner = directory.resolve_by_chat("-200").expect("owner");
        assert_eq!(owner.client_id, "US-MOLD-002");
        assert!(directory.resolve_by_chat("-999").is_none());
    }

    #[test]
    fn duplicate_chat_id_is_a_load_error() {
        let result = StaticTenantDirectory::new(vec![
            tenant("UK-ROOF-001", Some("tok-a"), Some("-100")),
            tenant("US-MOLD-002", Some("tok-b"), Some("-100")),
        ]);
        assert_eq!(
            result.err(),
            Some(TenantLoadError::DuplicateChatId {
                chat_id: "-100".to_string(),
                first: "UK-ROOF-001".to_string(),
                second: "US-MOLD-002".to_string(),
            })
        );
    }

    #[test]
    fn duplicate_client_id_is_a_load_error() {
        let result = StaticTenantDirectory::new(vec![
            tenant("UK-ROOF-001", Some("tok-a"), Some("-100")),
            tenant("UK-ROOF-001", Some("tok-b"), Some("-200")),
        ]);
        assert_eq!(
            result.err(),
            Some(TenantLoadError::DuplicateClientId("UK-ROOF-001".to_string()))
        );
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Premium".parse::<Tier>(), Ok(Tier::Premium));
        assert_eq!(" standard ".parse::<Tier>(), Ok(Tier::Standard));
        assert!("gold".parse::<Tier>().is_err());
    }
}
