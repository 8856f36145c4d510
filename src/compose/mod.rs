//! Message composition
//!
//! Pure functions: phone normalization, template expansion and length
//! checks. Nothing here touches a device.

pub mod phone;
pub mod template;

pub use phone::{format_phone_number, is_valid};
pub use template::{check_length, render_template};

use crate::error::SendError;
use crate::models::{ContactFields, OutboundMessage, MAX_BODY_CHARS};

/// Validate the recipient, render the body and check its length
pub fn compose(
    recipient: &str,
    template: &str,
    fields: &ContactFields,
    contact_ref: Option<String>,
) -> Result<OutboundMessage, SendError> {
    let number = format_phone_number(recipient).ok_or_else(|| SendError::InvalidPhone {
        raw: recipient.to_string(),
    })?;

    let body = render_template(template, fields);
    if body.is_empty() {
        return Err(SendError::EmptyMessage);
    }
    if !check_length(&body) {
        return Err(SendError::MessageTooLong {
            length: body.chars().count(),
            max: MAX_BODY_CHARS,
        });
    }

    Ok(OutboundMessage::new(number, body, contact_ref, fields.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_scenario() {
        let fields = ContactFields::default().with_first_name("Jane");
        let message = compose("(555) 123-4567", "Hi {firstName}", &fields, Some("c-1".into())).unwrap();

        assert_eq!(message.recipient(), "5551234567");
        assert_eq!(message.body(), "Hi Jane");
        assert_eq!(message.contact_ref(), Some("c-1"));
        assert_eq!(message.contact(), &fields);
    }

    #[test]
    fn test_compose_checks_phone_first() {
        let err = compose("123", &"x".repeat(2000), &ContactFields::default(), None).unwrap_err();
        assert!(matches!(err, SendError::InvalidPhone { .. }));
    }

    #[test]
    fn test_compose_rejects_long_body() {
        let err = compose("5551234567", &"x".repeat(1601), &ContactFields::default(), None).unwrap_err();
        assert!(matches!(err, SendError::MessageTooLong { length: 1601, max: 1600 }));
    }

    #[test]
    fn test_compose_rejects_empty_body() {
        let err = compose("5551234567", " {firstName} ", &ContactFields::default(), None).unwrap_err();
        assert!(matches!(err, SendError::EmptyMessage));
    }
}
