//! Error types for protocol operations

use thiserror::Error;

/// Protocol result type
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol errors
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier failed prefix/suffix/alphabet validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Input is not parseable JSON
    #[error("Malformed JSON at byte offset {offset}: {message}")]
    MalformedJson {
        /// Byte offset of the first unparseable input
        offset: usize,
        /// Parser diagnostic
        message: String,
    },

    /// Decoded JSON is not the expected top-level shape
    #[error("Invalid payload shape: {0}")]
    InvalidPayloadShape(String),

    /// Structural schema validation collected field errors
    #[error("Schema validation against '{schema}' failed with {} error(s)", errors.len())]
    SchemaValidation {
        /// Name of the violated schema
        schema: String,
        /// Collected pointer + message pairs
        errors: Vec<crate::validation::FieldError>,
    },

    /// Declared kind is not in the registry
    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    /// Data variant does not match the declared metadata kind
    #[error("Kind/data mismatch: metadata declares '{declared}' but data is '{actual}'")]
    KindDataMismatch {
        /// Kind declared in metadata
        declared: String,
        /// Kind of the attached data variant
        actual: String,
    },

    /// Entity carries no signature
    #[error("Signature missing")]
    SignatureMissing,

    /// Signature string is not a well-formed compact detached signature
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Signer resolution capability failed
    #[error("DID resolution failed: {0}")]
    DidResolution(String),

    /// Resolution succeeded but yielded no usable verification key
    #[error("No matching verification method: {0}")]
    NoMatchingVerificationMethod(String),

    /// Signature is valid but was produced by a different identity
    #[error("Signer mismatch: expected {expected}, resolved {actual}")]
    SignerMismatch {
        /// Identity the metadata claims
        expected: String,
        /// Identity the key resolved to
        actual: String,
    },

    /// Cryptographic verification failed
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Entity is already signed; signatures are populate-once
    #[error("Entity is already signed")]
    AlreadySigned,

    /// Message kind is not a legal next step for the exchange
    #[error("Invalid next message '{kind}': exchange accepts {accepts:?}")]
    InvalidNextMessage {
        /// Kind of the rejected message
        kind: String,
        /// Kinds the exchange currently accepts
        accepts: Vec<String>,
    },

    /// Message belongs to a different exchange
    #[error("Exchange ID mismatch: exchange is {expected}, message carries {actual}")]
    ExchangeIdMismatch {
        /// Identifier established by the exchange's RFQ
        expected: String,
        /// Identifier carried by the rejected message
        actual: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
