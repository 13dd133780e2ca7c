//! Normalization boundary for untyped contact documents.
//!
//! Historical records spell the same field several ways (`phone`,
//! `contactPhone`, `mobile`, nested `contact.phone`, ...). This runs once at
//! the edge and yields the canonical [`Contact`]; nothing past it sees the raw
//! shape.

use serde_json::Value as JsonValue;

use carefleet_orders::Contact;

use crate::error::{ServiceError, ServiceResult};

const NAME_KEYS: &[&str] = &[
    "name",
    "customerName",
    "customer_name",
    "fullName",
    "full_name",
    "contact.name",
    "customer.name",
];

const PHONE_KEYS: &[&str] = &[
    "phone",
    "contactPhone",
    "contact_phone",
    "mobile",
    "phoneNumber",
    "phone_number",
    "contact.phone",
    "customer.phone",
];

const EMAIL_KEYS: &[&str] = &["email", "contactEmail", "contact_email", "contact.email", "customer.email"];

const ADDRESS_KEYS: &[&str] = &["address", "deliveryAddress", "delivery_address", "contact.address"];

pub fn normalize_contact(raw: &JsonValue) -> ServiceResult<Contact> {
    if !raw.is_object() {
        return Err(ServiceError::validation("contact must be a JSON object"));
    }

    let name = first_text(raw, NAME_KEYS)
        .ok_or_else(|| ServiceError::validation("contact has no name"))?;

    Ok(Contact {
        name,
        phone: first_text(raw, PHONE_KEYS),
        email: first_text(raw, EMAIL_KEYS),
        address: first_text(raw, ADDRESS_KEYS),
    })
}

/// First non-blank string (or number) among the candidate keys. Dotted keys
/// address nested objects.
fn first_text(raw: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let value = key.split('.').try_fold(raw, |node, part| node.get(part))?;
        match value {
            JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_shape_passes_through() {
        let contact = normalize_contact(&json!({
            "name": "A. Menon",
            "phone": "+91 90000 11111",
            "email": "menon@example.com",
            "address": "4 Hill St"
        }))
        .unwrap();
        assert_eq!(contact.name, "A. Menon");
        assert_eq!(contact.phone.as_deref(), Some("+91 90000 11111"));
        assert_eq!(contact.address.as_deref(), Some("4 Hill St"));
    }

    #[test]
    fn legacy_field_names_are_mapped() {
        let contact = normalize_contact(&json!({
            "customerName": "  K. Das ",
            "contactPhone": "",
            "mobile": 9845000000u64,
            "contact": { "email": "das@example.com" }
        }))
        .unwrap();
        assert_eq!(contact.name, "K. Das");
        assert_eq!(contact.phone.as_deref(), Some("9845000000"));
        assert_eq!(contact.email.as_deref(), Some("das@example.com"));
        assert_eq!(contact.address, None);
    }

    #[test]
    fn nested_contact_block_is_read() {
        let contact = normalize_contact(&json!({
            "contact": { "name": "S. Rao", "phone": "080-1234" }
        }))
        .unwrap();
        assert_eq!(contact.name, "S. Rao");
        assert_eq!(contact.phone.as_deref(), Some("080-1234"));
    }

    #[test]
    fn missing_name_is_a_validation_error() {
        let err = normalize_contact(&json!({ "phone": "1" })).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(normalize_contact(&json!("just a string")).is_err());
    }
}
