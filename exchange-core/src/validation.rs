//! Structural validation of decoded JSON
//!
//! The validator is an injected capability with a fixed, pre-loaded
//! schema set keyed by `"message"`, `"resource"`, and each concrete
//! kind name. It checks shape only; decoding into typed payloads and
//! signature verification happen afterwards, in that order.

use serde_json::{Map, Value};
use std::fmt;

/// One structural violation: where and what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// JSON-pointer-style location of the violation
    pub pointer: String,
    /// What was wrong there
    pub message: String,
}

impl FieldError {
    /// Build a field error
    pub fn new(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pointer, self.message)
    }
}

/// Injected structural-validation capability
///
/// Returns the collected violations; an empty list means the value
/// conforms to the named schema.
pub trait StructuralValidator: Send + Sync {
    /// Validate `value` against the schema named `schema`
    fn validate(&self, value: &Value, schema: &str) -> Vec<FieldError>;
}

/// The built-in fixed schema set
///
/// Hand-rolled shape checks standing in for the protocol's published
/// JSON Schemas; the schema content itself is out of scope, the
/// sequencing in the parser is not.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSchemas;

impl BuiltinSchemas {
    /// Create the schema set
    pub fn new() -> Self {
        Self
    }
}

impl StructuralValidator for BuiltinSchemas {
    fn validate(&self, value: &Value, schema: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        match schema {
            "message" => check_envelope(value, true, &mut errors),
            "resource" => check_envelope(value, false, &mut errors),
            "rfq" => check_rfq(value, &mut errors),
            "quote" => check_quote(value, &mut errors),
            "order" => check_order(value, &mut errors),
            "orderstatus" => check_order_status(value, &mut errors),
            "close" => check_close(value, &mut errors),
            "offering" => check_offering(value, &mut errors),
            "balance" => check_balance(value, &mut errors),
            other => errors.push(FieldError::new("", format!("no schema named '{other}'"))),
        }
        errors
    }
}

// =========================================================================
// ENVELOPE SCHEMAS
// =========================================================================

fn check_envelope(value: &Value, is_message: bool, errors: &mut Vec<FieldError>) {
    let root = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };

    if let Some(metadata) = require_key(root, "", "metadata", errors) {
        if let Some(meta) = require_object(metadata, "/metadata", errors) {
            require_string_key(meta, "/metadata", "kind", errors);
            require_string_key(meta, "/metadata", "from", errors);
            require_string_key(meta, "/metadata", "id", errors);
            require_string_key(meta, "/metadata", "protocol", errors);
            require_string_key(meta, "/metadata", "createdAt", errors);
            if is_message {
                require_string_key(meta, "/metadata", "to", errors);
                require_string_key(meta, "/metadata", "exchangeId", errors);
                optional_string_key(meta, "/metadata", "externalId", errors);
            } else {
                optional_string_key(meta, "/metadata", "updatedAt", errors);
            }
        }
    }

    if let Some(data) = require_key(root, "", "data", errors) {
        require_object(data, "/data", errors);
    }

    optional_string_key(root, "", "signature", errors);
}

// =========================================================================
// KIND SCHEMAS (applied to the data value)
// =========================================================================

fn check_rfq(value: &Value, errors: &mut Vec<FieldError>) {
    let data = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };
    require_string_key(data, "", "offeringId", errors);

    if let Some(payin) = require_key(data, "", "payin", errors) {
        if let Some(payin) = require_object(payin, "/payin", errors) {
            require_string_key(payin, "/payin", "kind", errors);
            require_string_key(payin, "/payin", "amount", errors);
        }
    }
    if let Some(payout) = require_key(data, "", "payout", errors) {
        if let Some(payout) = require_object(payout, "/payout", errors) {
            require_string_key(payout, "/payout", "kind", errors);
        }
    }
    if let Some(claims) = data.get("claims") {
        if !claims.is_array() {
            errors.push(FieldError::new("/claims", "must be an array"));
        }
    }
}

fn check_quote(value: &Value, errors: &mut Vec<FieldError>) {
    let data = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };
    require_string_key(data, "", "expiresAt", errors);
    require_string_key(data, "", "payoutUnitsPerPayinUnit", errors);
    for side in ["payin", "payout"] {
        if let Some(details) = require_key(data, "", side, errors) {
            let pointer = format!("/{side}");
            if let Some(details) = require_object(details, &pointer, errors) {
                require_string_key(details, &pointer, "currencyCode", errors);
                require_string_key(details, &pointer, "subtotal", errors);
                require_string_key(details, &pointer, "total", errors);
            }
        }
    }
}

fn check_order(value: &Value, errors: &mut Vec<FieldError>) {
    // An order carries no fields; only the shape is constrained.
    require_object(value, "", errors);
}

fn check_order_status(value: &Value, errors: &mut Vec<FieldError>) {
    let data = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };
    require_string_key(data, "", "status", errors);
    optional_string_key(data, "", "details", errors);
}

fn check_close(value: &Value, errors: &mut Vec<FieldError>) {
    let data = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };
    optional_string_key(data, "", "reason", errors);
    if let Some(success) = data.get("success") {
        if !success.is_boolean() {
            errors.push(FieldError::new("/success", "must be a boolean"));
        }
    }
}

fn check_offering(value: &Value, errors: &mut Vec<FieldError>) {
    let data = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };
    require_string_key(data, "", "description", errors);
    require_string_key(data, "", "payoutUnitsPerPayinUnit", errors);
    for side in ["payin", "payout"] {
        if let Some(details) = require_key(data, "", side, errors) {
            let pointer = format!("/{side}");
            if let Some(details) = require_object(details, &pointer, errors) {
                require_string_key(details, &pointer, "currencyCode", errors);
                match details.get("methods") {
                    Some(Value::Array(methods)) => {
                        for (i, method) in methods.iter().enumerate() {
                            let method_ptr = format!("{pointer}/methods/{i}");
                            if let Some(method) = require_object(method, &method_ptr, errors) {
                                require_string_key(method, &method_ptr, "kind", errors);
                            }
                        }
                    }
                    Some(_) => {
                        errors.push(FieldError::new(format!("{pointer}/methods"), "must be an array"))
                    }
                    None => errors.push(FieldError::new(
                        format!("{pointer}/methods"),
                        "required key is missing",
                    )),
                }
            }
        }
    }
}

fn check_balance(value: &Value, errors: &mut Vec<FieldError>) {
    let data = match require_object(value, "", errors) {
        Some(map) => map,
        None => return,
    };
    require_string_key(data, "", "currencyCode", errors);
    require_string_key(data, "", "available", errors);
}

// =========================================================================
// SHAPE HELPERS
// =========================================================================

fn require_object<'a>(
    value: &'a Value,
    pointer: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Map<String, Value>> {
    match value.as_object() {
        Some(map) => Some(map),
        None => {
            errors.push(FieldError::new(pointer, "must be an object"));
            None
        }
    }
}

fn require_key<'a>(
    map: &'a Map<String, Value>,
    pointer: &str,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Value> {
    match map.get(key) {
        Some(value) => Some(value),
        None => {
            errors.push(FieldError::new(
                format!("{pointer}/{key}"),
                "required key is missing",
            ));
            None
        }
    }
}

fn require_string_key(
    map: &Map<String, Value>,
    pointer: &str,
    key: &str,
    errors: &mut Vec<FieldError>,
) {
    match map.get(key) {
        Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(format!("{pointer}/{key}"), "must be a string")),
        None => errors.push(FieldError::new(
            format!("{pointer}/{key}"),
            "required key is missing",
        )),
    }
}

fn optional_string_key(
    map: &Map<String, Value>,
    pointer: &str,
    key: &str,
    errors: &mut Vec<FieldError>,
) {
    if let Some(value) = map.get(key) {
        if !value.is_string() {
            errors.push(FieldError::new(format!("{pointer}/{key}"), "must be a string"));
        }
    }
}
