//! State sanitizer - strips PII from snapshots before they are stored
//!
//! Classification is a maintained deny list, never inferred from values.
//! Keys are compared after lowercasing and dropping every non-alphanumeric
//! character, so `first_name`, `firstName` and `FIRST-NAME` are one entry.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Marker written in place of a redacted value
pub const REDACTED: &str = "[REDACTED]";

const DEFAULT_DENY_LIST: &[&str] = &[
    // Names
    "name",
    "first_name",
    "middle_name",
    "last_name",
    "full_name",
    "legal_name",
    "maiden_name",
    // Contact
    "email",
    "email_address",
    "phone",
    "phone_number",
    "mobile",
    "mobile_phone",
    "home_phone",
    "work_phone",
    "fax",
    // Physical address
    "address",
    "street",
    "street_address",
    "address_line1",
    "address_line2",
    "mailing_address",
    "postal_code",
    "zip",
    "zip_code",
    // Government identifiers
    "date_of_birth",
    "dob",
    "ssn",
    "social_security_number",
    "sin",
    "tax_id",
    "tin",
    "ein",
    "national_id",
    "passport_number",
    "drivers_license",
    "drivers_license_number",
    // Bank identifiers
    "bank_account",
    "bank_account_number",
    "account_number",
    "routing_number",
    "iban",
];

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Deny list of PII field names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerPolicy {
    denied: BTreeSet<String>,
}

impl SanitizerPolicy {
    /// Policy with an explicit deny list (no defaults)
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            denied: fields.into_iter().map(|f| normalize_key(f.as_ref())).collect(),
        }
    }

    /// Add a field to the deny list
    pub fn deny(mut self, field: &str) -> Self {
        self.denied.insert(normalize_key(field));
        self
    }

    /// Remove a field from the deny list
    pub fn allow(mut self, field: &str) -> Self {
        self.denied.remove(&normalize_key(field));
        self
    }

    pub fn is_denied(&self, key: &str) -> bool {
        self.denied.contains(&normalize_key(key))
    }

    /// Return a copy of `state` with every deny-listed field redacted,
    /// recursing through nested objects and arrays.
    pub fn sanitize(&self, state: &Value) -> Value {
        match state {
            Value::Object(fields) => {
                let mut out = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    let cleaned = if self.is_denied(key) && !value.is_null() {
                        Value::String(REDACTED.to_string())
                    } else {
                        self.sanitize(value)
                    };
                    out.insert(key.clone(), cleaned);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.sanitize(v)).collect()),
            scalar => scalar.clone(),
        }
    }
}

impl Default for SanitizerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DENY_LIST)
    }
}

/// Sanitize with the default deny list
pub fn sanitize(state: &Value) -> Value {
    static DEFAULT: OnceLock<SanitizerPolicy> = OnceLock::new();
    DEFAULT.get_or_init(SanitizerPolicy::default).sanitize(state)
}
