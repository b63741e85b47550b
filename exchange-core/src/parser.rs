//! Ingress parsing pipeline
//!
//! The single entry point for untrusted payloads. Stage order is a
//! hard contract: JSON parse, top-level shape, envelope schema,
//! kind-specific data schema, typed construction, then signature
//! verification. Malformed input is always rejected with a precise
//! structural error before any cryptography runs.

use crate::crypto::SignerResolver;
use crate::types::{Message, MessageKind, Resource, ResourceKind};
use crate::validation::StructuralValidator;
use crate::{Error, Result};
use serde_json::Value;
use std::str::FromStr;
use tracing::trace;

/// Parser with injected validation and resolution capabilities
pub struct Parser<'a> {
    validator: &'a dyn StructuralValidator,
    resolver: &'a dyn SignerResolver,
}

impl<'a> Parser<'a> {
    /// Create a parser over the given capabilities
    pub fn new(validator: &'a dyn StructuralValidator, resolver: &'a dyn SignerResolver) -> Self {
        Self {
            validator,
            resolver,
        }
    }

    /// Parse, validate, and verify one message
    pub fn parse_message(&self, text: &str) -> Result<Message> {
        let value = self.decode(text)?;
        self.check_schema(&value, "message")?;

        let kind_name = declared_kind(&value);
        let kind = MessageKind::from_str(kind_name)?;
        self.check_schema(&value["data"], kind.as_str())?;

        let message: Message = serde_json::from_value(value)?;
        trace!(kind = %kind, id = %message.metadata.id, "message decoded, verifying signature");

        message.verify(self.resolver)?;
        Ok(message)
    }

    /// Parse, validate, and verify one resource
    pub fn parse_resource(&self, text: &str) -> Result<Resource> {
        let value = self.decode(text)?;
        self.check_schema(&value, "resource")?;

        let kind_name = declared_kind(&value);
        let kind = ResourceKind::from_str(kind_name)?;
        self.check_schema(&value["data"], kind.as_str())?;

        let resource: Resource = serde_json::from_value(value)?;
        trace!(kind = %kind, id = %resource.metadata.id, "resource decoded, verifying signature");

        resource.verify(self.resolver)?;
        Ok(resource)
    }

    fn decode(&self, text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| malformed_json(text, &e))?;
        if !value.is_object() {
            return Err(Error::InvalidPayloadShape(
                "top-level JSON value must be an object".to_string(),
            ));
        }
        Ok(value)
    }

    fn check_schema(&self, value: &Value, schema: &str) -> Result<()> {
        let errors = self.validator.validate(value, schema);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaValidation {
                schema: schema.to_string(),
                errors,
            })
        }
    }
}

/// Kind string out of an envelope that already passed its schema
fn declared_kind(value: &Value) -> &str {
    value["metadata"]["kind"].as_str().unwrap_or_default()
}

fn malformed_json(text: &str, error: &serde_json::Error) -> Error {
    // serde_json reports 1-based line/column; convert to a byte offset.
    let line = error.line();
    let column = error.column();
    let offset = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>()
        + column.saturating_sub(1);

    Error::MalformedJson {
        offset,
        message: error.to_string(),
    }
}
