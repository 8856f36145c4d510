use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest body the messaging app accepts as a single send
pub const MAX_BODY_CHARS: usize = 1600;

/// Contact data supplied by the CRM for template expansion
///
/// Unknown keys are kept in `extra` so the full snapshot can be stored with
/// the history record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ContactFields {
    pub fn with_first_name(mut self, first_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_company(mut self, company: &str) -> Self {
        self.company = Some(company.to_string());
        self
    }
}

/// A validated, fully rendered message
///
/// Only the composer builds these, so `recipient` always holds exactly ten
/// digits and `body` is within [`MAX_BODY_CHARS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    recipient: String,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact_ref: Option<String>,
    contact: ContactFields,
}

impl OutboundMessage {
    pub(crate) fn new(
        recipient: String,
        body: String,
        contact_ref: Option<String>,
        contact: ContactFields,
    ) -> Self {
        Self {
            recipient,
            body,
            contact_ref,
            contact,
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn contact_ref(&self) -> Option<&str> {
        self.contact_ref.as_deref()
    }

    pub fn contact(&self) -> &ContactFields {
        &self.contact
    }

    pub fn char_count(&self) -> usize {
        self.body.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_fields_keep_unknown_keys() {
        let fields: ContactFields = serde_json::from_str(
            r#"{"firstName":"Jane","company":"Acme","listingId":"MLS-42"}"#,
        )
        .unwrap();

        assert_eq!(fields.first_name.as_deref(), Some("Jane"));
        assert_eq!(fields.extra.get("listingId").map(String::as_str), Some("MLS-42"));

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["listingId"], "MLS-42");
        assert!(json.get("lastName").is_none());
    }
}
