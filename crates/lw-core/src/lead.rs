use crate::error::IntakeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One captured service inquiry, normalized from an inbound form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub name: String,
    pub phone: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Lead {
    /// Stand-in lead recorded when intake fails before a submission could be
    /// validated, so the attempt is still auditable.
    pub fn placeholder() -> Self {
        Self {
            name: "Unknown".to_string(),
            phone: "Unknown".to_string(),
            service: "Unknown".to_string(),
            address: None,
            city: "Unknown".to_string(),
            message: None,
        }
    }
}

/// Normalizes and validates a raw submission into a canonical [`Lead`].
///
/// Required fields must be non-empty strings after trimming; non-string
/// values count as missing. Optional fields that trim to empty are dropped.
/// The city falls back to the last comma segment of the address, then to
/// `"Unknown"`.
pub fn validate_lead(raw: &Value) -> Result<Lead, IntakeError> {
    let payload = raw.as_object().ok_or(IntakeError::InvalidPayload)?;

    let name = field_str(payload, &["name", "leadName"]);
    let phone = field_str(payload, &["phone", "leadPhone"]);
    let service = field_str(payload, &["service", "serviceType"]);
    let address = field_str(payload, &["address"]);
    let city = field_str(payload, &["city"]);
    let message = field_str(payload, &["message"]);

    if name.is_empty() {
        return Err(IntakeError::MissingField("name"));
    }
    if phone.is_empty() {
        return Err(IntakeError::MissingField("phone"));
    }
    if service.is_empty() {
        return Err(IntakeError::MissingField("service"));
    }

    let city = if city.is_empty() {
        city_from_address(&address)
    } else {
        city
    };

    Ok(Lead {
        name,
        phone,
        service,
        address: (!address.is_empty()).then_some(address),
        city,
        message: (!message.is_empty()).then_some(message),
    })
}

fn field_str(payload: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        if let Some(Value::String(value)) = payload.get(*key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    String::new()
}

fn city_from_address(address: &str) -> String {
    address
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown".to_string())
}
