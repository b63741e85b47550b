//! # Exchange Core
//!
//! Peer-to-peer financial exchange protocol core: typed, signed
//! messages and resources, a per-exchange state machine, and the
//! parsing pipeline that validates structure and authenticity before
//! any business logic sees the data.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Parser      │ ← sole ingress for untrusted payloads
//! └────────┬────────┘
//!          │ schema check, then signature check
//! ┌────────▼────────┐
//! │ Message/Resource│ ← tagged kinds over shared metadata
//! └────────┬────────┘
//!          │ canonical digest, detached signature
//! ┌────────▼────────┐
//! │    Exchange     │ ← legal next-message transitions
//! └─────────────────┘
//! ```
//!
//! Signing/DID resolution and structural schemas are injected
//! capabilities ([`crypto::SignerResolver`],
//! [`validation::StructuralValidator`]), so tests and alternate
//! deployments substitute their own.
//!
//! ## Safety
//!
//! - `#![forbid(unsafe_code)]`: no unsafe operations
//! - Entities are immutable after construction; signatures populate once
//! - Deterministic canonical serialization backs every digest

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod parser;
pub mod typeid;
pub mod types;
pub mod validation;

pub use crypto::{InMemoryDidStore, ResolvedKey, SignatureAlgorithm, SignerResolver};
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use parser::Parser;
pub use typeid::TypeId;
pub use types::*;
pub use validation::{BuiltinSchemas, FieldError, StructuralValidator};

/// Protocol version carried in every entity's metadata
pub const PROTOCOL_VERSION: &str = "1.0";
