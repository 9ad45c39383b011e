use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use stockwatch_core::validation::{require_non_empty, validate_email, validate_name};
use stockwatch_core::ValidationError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub message: String,
}

/// Validation messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    fn record(&mut self, result: Result<(), ValidationError>) {
        if let Err(e) = result {
            self.0.entry(e.field()).or_insert_with(|| e.to_string());
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        f.write_str(&parts.join("; "))
    }
}

impl ContactForm {
    /// Check every field, collecting one message per failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();

        for (field, value) in [("firstName", &self.first_name), ("lastName", &self.last_name)] {
            errors.record(require_non_empty(field, value));
            errors.record(validate_name(field, value));
        }
        errors.record(require_non_empty("email", &self.email));
        errors.record(validate_email(&self.email));
        errors.record(require_non_empty("message", &self.message));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
