//! Protocol types: kinds, metadata, messages, and resources
//!
//! Messages are the per-exchange protocol steps (rfq, quote, order,
//! orderstatus, close); resources are standalone signed documents
//! (offering, balance). Both pair shared metadata with kind-specific
//! data and an optional detached signature.

use crate::crypto::SignerResolver;
use crate::typeid::TypeId;
use crate::validation::FieldError;
use crate::{canonical, crypto, Error, Result, PROTOCOL_VERSION};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// =========================================================================
// SIGNER IDENTITY
// =========================================================================

/// Decentralized identifier naming a signing identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(pub String);

impl Did {
    /// Wrap a DID string
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// DID URI as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =========================================================================
// KINDS AND TRANSITION REGISTRY
// =========================================================================

/// Message kinds, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Request for quote; opens an exchange
    Rfq,
    /// Counterparty's priced response to an RFQ
    Quote,
    /// Originator's commitment to a quote
    Order,
    /// Counterparty's progress report on an order
    OrderStatus,
    /// Terminal message ending the exchange
    Close,
}

impl MessageKind {
    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Rfq => "rfq",
            MessageKind::Quote => "quote",
            MessageKind::Order => "order",
            MessageKind::OrderStatus => "orderstatus",
            MessageKind::Close => "close",
        }
    }

    /// Kinds legally allowed to follow this one in an exchange
    ///
    /// The transition table is data, not dispatch: the exchange state
    /// machine reads it and nothing overrides it per message type.
    pub fn valid_next(self) -> &'static [MessageKind] {
        use MessageKind::*;
        match self {
            Rfq => &[Quote, Close],
            Quote => &[Order, Close],
            Order => &[OrderStatus],
            OrderStatus => &[OrderStatus, Close],
            Close => &[],
        }
    }

    /// True when no message may follow
    pub fn is_terminal(self) -> bool {
        self.valid_next().is_empty()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rfq" => Ok(MessageKind::Rfq),
            "quote" => Ok(MessageKind::Quote),
            "order" => Ok(MessageKind::Order),
            "orderstatus" => Ok(MessageKind::OrderStatus),
            "close" => Ok(MessageKind::Close),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

/// Resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Advertised currency pair with accepted payment methods
    Offering,
    /// Per-currency balance held with the counterparty
    Balance,
}

impl ResourceKind {
    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Offering => "offering",
            ResourceKind::Balance => "balance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "offering" => Ok(ResourceKind::Offering),
            "balance" => Ok(ResourceKind::Balance),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

// =========================================================================
// METADATA
// =========================================================================

/// Fields shared by every message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Declared message kind; must match the data variant
    pub kind: MessageKind,
    /// Receiver identity
    pub to: Did,
    /// Sender identity; the expected signer
    pub from: Did,
    /// This message's identifier
    pub id: TypeId,
    /// Identifier grouping all messages of one transaction
    pub exchange_id: TypeId,
    /// Protocol version string
    pub protocol: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Caller-supplied correlation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Fields shared by every resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Declared resource kind; must match the data variant
    pub kind: ResourceKind,
    /// Publisher identity; the expected signer
    pub from: Did,
    /// This resource's identifier
    pub id: TypeId,
    /// Protocol version string
    pub protocol: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// =========================================================================
// MESSAGE DATA PAYLOADS
// =========================================================================

/// Request-for-quote payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqData {
    /// Offering this RFQ responds to
    pub offering_id: TypeId,
    /// Selected payin method and amount
    pub payin: SelectedPayinMethod,
    /// Selected payout method
    pub payout: SelectedPayoutMethod,
    /// Credentials satisfying the offering's required claims
    #[serde(default)]
    pub claims: Vec<String>,
}

/// Payin selection inside an RFQ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedPayinMethod {
    /// Payment method kind, e.g. "DEBIT_CARD"
    pub kind: String,
    /// Amount of the payin currency
    pub amount: Decimal,
    /// Details matching the method's required schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<Value>,
}

/// Payout selection inside an RFQ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedPayoutMethod {
    /// Payment method kind
    pub kind: String,
    /// Details matching the method's required schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<Value>,
}

/// Quote payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteData {
    /// Instant the quote stops being honored
    pub expires_at: DateTime<Utc>,
    /// Exchange rate offered
    pub payout_units_per_payin_unit: Decimal,
    /// Payin side amounts
    pub payin: QuoteDetails,
    /// Payout side amounts
    pub payout: QuoteDetails,
}

/// One side of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDetails {
    /// ISO 4217 or token currency code
    pub currency_code: String,
    /// Amount before fees
    pub subtotal: Decimal,
    /// Fee charged on this side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    /// Subtotal plus fee
    pub total: Decimal,
}

/// Order payload; commitment carries no fields of its own
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderData {}

/// Order status payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusData {
    /// Lifecycle status
    pub status: Status,
    /// Human-readable elaboration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Order lifecycle statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    PayinPending,
    PayinInitiated,
    PayinSettled,
    PayinFailed,
    PayinExpired,
    PayoutPending,
    PayoutInitiated,
    PayoutSettled,
    PayoutFailed,
    RefundPending,
    RefundInitiated,
    RefundSettled,
    RefundFailed,
}

/// Close payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseData {
    /// Why the exchange ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whether the exchange completed successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

// =========================================================================
// RESOURCE DATA PAYLOADS
// =========================================================================

/// Offering payload: a currency pair the counterparty will trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingData {
    /// Human-readable description
    pub description: String,
    /// Exchange rate advertised
    pub payout_units_per_payin_unit: Decimal,
    /// Payin side: currency, bounds, accepted methods
    pub payin: PayinDetails,
    /// Payout side: currency, bounds, accepted methods
    pub payout: PayoutDetails,
    /// Presentation definition for required credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_claims: Option<Value>,
}

/// Payin side of an offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayinDetails {
    /// Currency the counterparty accepts
    pub currency_code: String,
    /// Minimum accepted amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    /// Maximum accepted amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    /// Accepted payment methods
    pub methods: Vec<PayinMethod>,
}

/// One accepted payin method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayinMethod {
    /// Method kind, e.g. "DEBIT_CARD"
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    /// JSON Schema the RFQ's payment details must satisfy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_payment_details: Option<Value>,
}

/// Payout side of an offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDetails {
    /// Currency the counterparty pays out
    pub currency_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    /// Accepted payout methods
    pub methods: Vec<PayoutMethod>,
}

/// One accepted payout method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutMethod {
    /// Method kind
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    /// Expected settlement time in seconds
    pub estimated_settlement_time: u64,
    /// JSON Schema the RFQ's payment details must satisfy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_payment_details: Option<Value>,
}

/// Balance payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    /// Currency of the balance
    pub currency_code: String,
    /// Amount available
    pub available: Decimal,
}

// =========================================================================
// TAGGED DATA UNIONS
// =========================================================================

/// Kind-specific message data
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    Rfq(RfqData),
    Quote(QuoteData),
    Order(OrderData),
    OrderStatus(OrderStatusData),
    Close(CloseData),
}

impl MessageData {
    /// Kind of this data variant
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageData::Rfq(_) => MessageKind::Rfq,
            MessageData::Quote(_) => MessageKind::Quote,
            MessageData::Order(_) => MessageKind::Order,
            MessageData::OrderStatus(_) => MessageKind::OrderStatus,
            MessageData::Close(_) => MessageKind::Close,
        }
    }

    /// Decode a JSON value as the payload for `kind`
    pub fn from_value(kind: MessageKind, value: Value) -> Result<Self> {
        Ok(match kind {
            MessageKind::Rfq => MessageData::Rfq(serde_json::from_value(value)?),
            MessageKind::Quote => MessageData::Quote(serde_json::from_value(value)?),
            MessageKind::Order => MessageData::Order(serde_json::from_value(value)?),
            MessageKind::OrderStatus => MessageData::OrderStatus(serde_json::from_value(value)?),
            MessageKind::Close => MessageData::Close(serde_json::from_value(value)?),
        })
    }
}

// Wire form carries no tag; the kind lives in metadata.
impl Serialize for MessageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MessageData::Rfq(d) => d.serialize(serializer),
            MessageData::Quote(d) => d.serialize(serializer),
            MessageData::Order(d) => d.serialize(serializer),
            MessageData::OrderStatus(d) => d.serialize(serializer),
            MessageData::Close(d) => d.serialize(serializer),
        }
    }
}

/// Kind-specific resource data
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    Offering(OfferingData),
    Balance(BalanceData),
}

impl ResourceData {
    /// Kind of this data variant
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceData::Offering(_) => ResourceKind::Offering,
            ResourceData::Balance(_) => ResourceKind::Balance,
        }
    }

    /// Decode a JSON value as the payload for `kind`
    pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self> {
        Ok(match kind {
            ResourceKind::Offering => ResourceData::Offering(serde_json::from_value(value)?),
            ResourceKind::Balance => ResourceData::Balance(serde_json::from_value(value)?),
        })
    }
}

impl Serialize for ResourceData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ResourceData::Offering(d) => d.serialize(serializer),
            ResourceData::Balance(d) => d.serialize(serializer),
        }
    }
}

// =========================================================================
// MESSAGE
// =========================================================================

/// A signed protocol message
///
/// Immutable after construction except for `sign`, which populates the
/// signature exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Shared metadata
    pub metadata: MessageMetadata,
    /// Kind-specific payload
    pub data: MessageData,
    /// Detached compact signature, absent until signed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Message {
    /// Assemble a message, enforcing that data matches the declared kind
    pub fn new(metadata: MessageMetadata, data: MessageData) -> Result<Self> {
        if metadata.kind != data.kind() {
            return Err(Error::KindDataMismatch {
                declared: metadata.kind.to_string(),
                actual: data.kind().to_string(),
            });
        }
        Ok(Self {
            metadata,
            data,
            signature: None,
        })
    }

    /// Create an unsigned RFQ, opening a new exchange
    ///
    /// An RFQ originates its exchange, so its own id doubles as the
    /// exchange id.
    pub fn rfq(to: Did, from: Did, data: RfqData) -> Result<Self> {
        let id = TypeId::generate(MessageKind::Rfq.as_str())?;
        let metadata = MessageMetadata {
            kind: MessageKind::Rfq,
            to,
            from,
            exchange_id: id.clone(),
            id,
            protocol: PROTOCOL_VERSION.to_string(),
            created_at: Utc::now(),
            external_id: None,
        };
        Ok(Self {
            metadata,
            data: MessageData::Rfq(data),
            signature: None,
        })
    }

    /// Create an unsigned quote within an exchange
    pub fn quote(to: Did, from: Did, exchange_id: TypeId, data: QuoteData) -> Result<Self> {
        Self::reply(MessageKind::Quote, to, from, exchange_id, MessageData::Quote(data))
    }

    /// Create an unsigned order within an exchange
    pub fn order(to: Did, from: Did, exchange_id: TypeId) -> Result<Self> {
        Self::reply(
            MessageKind::Order,
            to,
            from,
            exchange_id,
            MessageData::Order(OrderData::default()),
        )
    }

    /// Create an unsigned order status within an exchange
    pub fn order_status(
        to: Did,
        from: Did,
        exchange_id: TypeId,
        data: OrderStatusData,
    ) -> Result<Self> {
        Self::reply(
            MessageKind::OrderStatus,
            to,
            from,
            exchange_id,
            MessageData::OrderStatus(data),
        )
    }

    /// Create an unsigned close within an exchange
    pub fn close(to: Did, from: Did, exchange_id: TypeId, data: CloseData) -> Result<Self> {
        Self::reply(MessageKind::Close, to, from, exchange_id, MessageData::Close(data))
    }

    fn reply(
        kind: MessageKind,
        to: Did,
        from: Did,
        exchange_id: TypeId,
        data: MessageData,
    ) -> Result<Self> {
        let metadata = MessageMetadata {
            kind,
            to,
            from,
            id: TypeId::generate(kind.as_str())?,
            exchange_id,
            protocol: PROTOCOL_VERSION.to_string(),
            created_at: Utc::now(),
            external_id: None,
        };
        Ok(Self {
            metadata,
            data,
            signature: None,
        })
    }

    /// Set the caller-supplied correlation id (builder style)
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.metadata.external_id = Some(external_id.into());
        self
    }

    /// Message kind, read from metadata
    pub fn kind(&self) -> MessageKind {
        self.metadata.kind
    }

    /// Canonical SHA-256 digest of `{metadata, data}`
    pub fn digest(&self) -> Result<[u8; 32]> {
        canonical::digest_of(&self.metadata, &self.data)
    }

    /// Sign with the key of `metadata.from`; populate-once
    pub fn sign(&mut self, signer: &dyn SignerResolver) -> Result<()> {
        if self.signature.is_some() {
            return Err(Error::AlreadySigned);
        }
        let digest = self.digest()?;
        self.signature = Some(signer.sign(&self.metadata.from, &digest)?);
        Ok(())
    }

    /// Verify the detached signature against `metadata.from`
    pub fn verify(&self, resolver: &dyn SignerResolver) -> Result<()> {
        let digest = self.digest()?;
        crypto::verify_detached(
            resolver,
            &digest,
            self.signature.as_deref(),
            &self.metadata.from,
        )
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Envelope {
            metadata: MessageMetadata,
            data: Value,
            #[serde(default)]
            signature: Option<String>,
        }

        let env = Envelope::deserialize(deserializer)?;
        let data =
            MessageData::from_value(env.metadata.kind, env.data).map_err(serde::de::Error::custom)?;
        Ok(Message {
            metadata: env.metadata,
            data,
            signature: env.signature,
        })
    }
}

// =========================================================================
// RESOURCE
// =========================================================================

/// A signed protocol resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// Shared metadata
    pub metadata: ResourceMetadata,
    /// Kind-specific payload
    pub data: ResourceData,
    /// Detached compact signature, absent until signed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Resource {
    /// Assemble a resource, enforcing that data matches the declared kind
    pub fn new(metadata: ResourceMetadata, data: ResourceData) -> Result<Self> {
        if metadata.kind != data.kind() {
            return Err(Error::KindDataMismatch {
                declared: metadata.kind.to_string(),
                actual: data.kind().to_string(),
            });
        }
        Ok(Self {
            metadata,
            data,
            signature: None,
        })
    }

    /// Create an unsigned offering
    pub fn offering(from: Did, data: OfferingData) -> Result<Self> {
        Self::create(ResourceKind::Offering, from, ResourceData::Offering(data))
    }

    /// Create an unsigned balance
    pub fn balance(from: Did, data: BalanceData) -> Result<Self> {
        Self::create(ResourceKind::Balance, from, ResourceData::Balance(data))
    }

    fn create(kind: ResourceKind, from: Did, data: ResourceData) -> Result<Self> {
        let metadata = ResourceMetadata {
            kind,
            from,
            id: TypeId::generate(kind.as_str())?,
            protocol: PROTOCOL_VERSION.to_string(),
            created_at: Utc::now(),
            updated_at: None,
        };
        Ok(Self {
            metadata,
            data,
            signature: None,
        })
    }

    /// Resource kind, read from metadata
    pub fn kind(&self) -> ResourceKind {
        self.metadata.kind
    }

    /// Canonical SHA-256 digest of `{metadata, data}`
    pub fn digest(&self) -> Result<[u8; 32]> {
        canonical::digest_of(&self.metadata, &self.data)
    }

    /// Sign with the key of `metadata.from`; populate-once
    pub fn sign(&mut self, signer: &dyn SignerResolver) -> Result<()> {
        if self.signature.is_some() {
            return Err(Error::AlreadySigned);
        }
        let digest = self.digest()?;
        self.signature = Some(signer.sign(&self.metadata.from, &digest)?);
        Ok(())
    }

    /// Verify the detached signature against `metadata.from`
    pub fn verify(&self, resolver: &dyn SignerResolver) -> Result<()> {
        let digest = self.digest()?;
        crypto::verify_detached(
            resolver,
            &digest,
            self.signature.as_deref(),
            &self.metadata.from,
        )
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Envelope {
            metadata: ResourceMetadata,
            data: Value,
            #[serde(default)]
            signature: Option<String>,
        }

        let env = Envelope::deserialize(deserializer)?;
        let data = ResourceData::from_value(env.metadata.kind, env.data)
            .map_err(serde::de::Error::custom)?;
        Ok(Resource {
            metadata: env.metadata,
            data,
            signature: env.signature,
        })
    }
}

// =========================================================================
// RFQ BUSINESS RULES
// =========================================================================

impl RfqData {
    /// Check this RFQ against the offering it responds to
    ///
    /// A protocol business rule, invoked explicitly by the
    /// counterparty before quoting; construction never runs it.
    /// Collects every violation rather than stopping at the first.
    pub fn check_against_offering(&self, offering: &Resource) -> Result<()> {
        let mut errors = Vec::new();

        let data = match &offering.data {
            ResourceData::Offering(data) => data,
            other => {
                return Err(Error::KindDataMismatch {
                    declared: ResourceKind::Offering.to_string(),
                    actual: other.kind().to_string(),
                })
            }
        };

        if self.offering_id != offering.metadata.id {
            errors.push(FieldError::new(
                "/offeringId",
                format!(
                    "references {} but offering is {}",
                    self.offering_id, offering.metadata.id
                ),
            ));
        }

        match data.payin.methods.iter().find(|m| m.kind == self.payin.kind) {
            None => errors.push(FieldError::new(
                "/payin/kind",
                format!("'{}' is not an accepted payin method", self.payin.kind),
            )),
            Some(method) => self.check_payment_details(
                method.required_payment_details.as_ref(),
                self.payin.payment_details.as_ref(),
                "/payin/paymentDetails",
                &mut errors,
            ),
        }

        if let Some(min) = data.payin.min {
            if self.payin.amount < min {
                errors.push(FieldError::new(
                    "/payin/amount",
                    format!("{} is below the offering minimum {}", self.payin.amount, min),
                ));
            }
        }
        if let Some(max) = data.payin.max {
            if self.payin.amount > max {
                errors.push(FieldError::new(
                    "/payin/amount",
                    format!("{} exceeds the offering maximum {}", self.payin.amount, max),
                ));
            }
        }

        match data.payout.methods.iter().find(|m| m.kind == self.payout.kind) {
            None => errors.push(FieldError::new(
                "/payout/kind",
                format!("'{}' is not an accepted payout method", self.payout.kind),
            )),
            Some(method) => self.check_payment_details(
                method.required_payment_details.as_ref(),
                self.payout.payment_details.as_ref(),
                "/payout/paymentDetails",
                &mut errors,
            ),
        }

        if data.required_claims.is_some() && self.claims.is_empty() {
            errors.push(FieldError::new(
                "/claims",
                "offering requires claims but none were supplied",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaValidation {
                schema: "rfq-offering".to_string(),
                errors,
            })
        }
    }

    /// Check that every `required` key of the method's payment-detail
    /// schema is present in the supplied details
    fn check_payment_details(
        &self,
        schema: Option<&Value>,
        details: Option<&Value>,
        pointer: &str,
        errors: &mut Vec<FieldError>,
    ) {
        let required = schema
            .and_then(|s| s.get("required"))
            .and_then(Value::as_array);
        let required = match required {
            Some(keys) if !keys.is_empty() => keys,
            _ => return,
        };

        let details = match details.and_then(Value::as_object) {
            Some(map) => map,
            None => {
                errors.push(FieldError::new(
                    pointer,
                    "method requires payment details but none were supplied",
                ));
                return;
            }
        };

        for key in required.iter().filter_map(Value::as_str) {
            if !details.contains_key(key) {
                errors.push(FieldError::new(
                    format!("{}/{}", pointer, key),
                    "required payment detail is missing",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    pub(crate) fn sample_offering_data() -> OfferingData {
        OfferingData {
            description: "USD to KES on-ramp".to_string(),
            payout_units_per_payin_unit: dec!(145.50),
            payin: PayinDetails {
                currency_code: "USD".to_string(),
                min: Some(dec!(10)),
                max: Some(dec!(1000)),
                methods: vec![PayinMethod {
                    kind: "DEBIT_CARD".to_string(),
                    name: None,
                    description: None,
                    fee: Some(dec!(0.30)),
                    required_payment_details: Some(json!({
                        "type": "object",
                        "required": ["cardNumber", "expiry"],
                    })),
                }],
            },
            payout: PayoutDetails {
                currency_code: "KES".to_string(),
                min: None,
                max: None,
                methods: vec![PayoutMethod {
                    kind: "MOMO_MPESA".to_string(),
                    name: None,
                    description: None,
                    fee: None,
                    estimated_settlement_time: 60,
                    required_payment_details: None,
                }],
            },
            required_claims: None,
        }
    }

    fn sample_rfq_data(offering_id: TypeId) -> RfqData {
        RfqData {
            offering_id,
            payin: SelectedPayinMethod {
                kind: "DEBIT_CARD".to_string(),
                amount: dec!(100),
                payment_details: Some(json!({
                    "cardNumber": "4111111111111111",
                    "expiry": "12/30",
                })),
            },
            payout: SelectedPayoutMethod {
                kind: "MOMO_MPESA".to_string(),
                payment_details: None,
            },
            claims: vec![],
        }
    }

    #[test]
    fn test_kind_registry_table() {
        assert_eq!(
            MessageKind::Rfq.valid_next(),
            &[MessageKind::Quote, MessageKind::Close]
        );
        assert_eq!(
            MessageKind::Quote.valid_next(),
            &[MessageKind::Order, MessageKind::Close]
        );
        assert_eq!(MessageKind::Order.valid_next(), &[MessageKind::OrderStatus]);
        assert_eq!(
            MessageKind::OrderStatus.valid_next(),
            &[MessageKind::OrderStatus, MessageKind::Close]
        );
        assert!(MessageKind::Close.valid_next().is_empty());
        assert!(MessageKind::Close.is_terminal());
        assert!(!MessageKind::Rfq.is_terminal());
    }

    #[test]
    fn test_rfq_id_doubles_as_exchange_id() {
        let rfq = Message::rfq(
            Did::new("did:ex:pfi"),
            Did::new("did:ex:alice"),
            sample_rfq_data(TypeId::generate("offering").unwrap()),
        )
        .unwrap();

        assert_eq!(rfq.metadata.id, rfq.metadata.exchange_id);
        assert_eq!(rfq.metadata.id.prefix(), "rfq");
    }

    #[test]
    fn test_new_rejects_kind_data_mismatch() {
        let rfq = Message::rfq(
            Did::new("did:ex:pfi"),
            Did::new("did:ex:alice"),
            sample_rfq_data(TypeId::generate("offering").unwrap()),
        )
        .unwrap();

        let mut metadata = rfq.metadata.clone();
        metadata.kind = MessageKind::Quote;
        let err = Message::new(metadata, rfq.data.clone()).unwrap_err();
        assert!(matches!(err, Error::KindDataMismatch { .. }));
    }

    #[test]
    fn test_message_wire_roundtrip() {
        let msg = Message::rfq(
            Did::new("did:ex:pfi"),
            Did::new("did:ex:alice"),
            sample_rfq_data(TypeId::generate("offering").unwrap()),
        )
        .unwrap()
        .with_external_id("inv-42");

        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);

        // kind is serialized inside metadata, not as a data tag
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["metadata"]["kind"], "rfq");
        assert!(value["data"].get("offeringId").is_some());
    }

    #[test]
    fn test_resource_wire_roundtrip() {
        let offering =
            Resource::offering(Did::new("did:ex:pfi"), sample_offering_data()).unwrap();
        let text = serde_json::to_string(&offering).unwrap();
        let back: Resource = serde_json::from_str(&text).unwrap();
        assert_eq!(back, offering);
    }

    #[test]
    fn test_order_status_wire_value() {
        let data = OrderStatusData {
            status: Status::PayinSettled,
            details: None,
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["status"], "PAYIN_SETTLED");
    }

    #[test]
    fn test_rfq_accepted_by_matching_offering() {
        let offering =
            Resource::offering(Did::new("did:ex:pfi"), sample_offering_data()).unwrap();
        let rfq = sample_rfq_data(offering.metadata.id.clone());
        assert!(rfq.check_against_offering(&offering).is_ok());
    }

    #[test]
    fn test_rfq_rejected_for_unknown_method() {
        let offering =
            Resource::offering(Did::new("did:ex:pfi"), sample_offering_data()).unwrap();
        let mut rfq = sample_rfq_data(offering.metadata.id.clone());
        rfq.payin.kind = "CASH".to_string();

        let err = rfq.check_against_offering(&offering).unwrap_err();
        match err {
            Error::SchemaValidation { errors, .. } => {
                assert!(errors.iter().any(|e| e.pointer == "/payin/kind"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rfq_rejected_for_amount_out_of_bounds() {
        let offering =
            Resource::offering(Did::new("did:ex:pfi"), sample_offering_data()).unwrap();
        let mut rfq = sample_rfq_data(offering.metadata.id.clone());
        rfq.payin.amount = dec!(5000);

        assert!(rfq.check_against_offering(&offering).is_err());
    }

    #[test]
    fn test_rfq_rejected_for_missing_payment_detail() {
        let offering =
            Resource::offering(Did::new("did:ex:pfi"), sample_offering_data()).unwrap();
        let mut rfq = sample_rfq_data(offering.metadata.id.clone());
        rfq.payin.payment_details = Some(json!({ "cardNumber": "4111111111111111" }));

        let err = rfq.check_against_offering(&offering).unwrap_err();
        match err {
            Error::SchemaValidation { errors, .. } => {
                assert!(errors
                    .iter()
                    .any(|e| e.pointer == "/payin/paymentDetails/expiry"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
