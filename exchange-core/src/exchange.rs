//! Exchange state machine
//!
//! Aggregates all messages sharing one exchange identifier and
//! enforces legal next-message transitions using the kind registry's
//! static table. An `Exchange` is not safe for concurrent mutation;
//! callers serialize writers externally.

use crate::typeid::TypeId;
use crate::types::{Message, MessageKind};
use crate::{Error, Result};
use tracing::debug;

/// In-memory aggregate of one transaction's messages
///
/// Holds at most one rfq, quote, order, and close, plus the ordered
/// list of order statuses.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    rfq: Option<Message>,
    quote: Option<Message>,
    order: Option<Message>,
    order_statuses: Vec<Message>,
    close: Option<Message>,
}

impl Exchange {
    /// Create an empty exchange
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier established by the held RFQ, if any
    ///
    /// An RFQ's own id equals its exchange id, since it originates the
    /// exchange.
    pub fn exchange_id(&self) -> Option<&TypeId> {
        self.rfq.as_ref().map(|m| &m.metadata.exchange_id)
    }

    /// The message that currently ends the exchange
    pub fn latest_message(&self) -> Option<&Message> {
        self.close
            .as_ref()
            .or_else(|| self.order_statuses.last())
            .or(self.order.as_ref())
            .or(self.quote.as_ref())
            .or(self.rfq.as_ref())
    }

    /// Kinds the exchange accepts next
    pub fn valid_next(&self) -> &'static [MessageKind] {
        match self.latest_message() {
            Some(message) => message.kind().valid_next(),
            None => &[MessageKind::Rfq],
        }
    }

    /// True once a close has been accepted
    pub fn is_closed(&self) -> bool {
        self.close.is_some()
    }

    /// Accept the next message of the transaction
    ///
    /// Atomic: on any failure no slot is touched. The transition check
    /// runs before the exchange-id check, so an out-of-order message
    /// is reported as such even when it also belongs elsewhere.
    pub fn add_message(&mut self, message: Message) -> Result<()> {
        let kind = message.kind();
        let accepts = self.valid_next();
        if !accepts.contains(&kind) {
            return Err(Error::InvalidNextMessage {
                kind: kind.to_string(),
                accepts: accepts.iter().map(|k| k.to_string()).collect(),
            });
        }

        if let Some(expected) = self.exchange_id() {
            if &message.metadata.exchange_id != expected {
                return Err(Error::ExchangeIdMismatch {
                    expected: expected.to_string(),
                    actual: message.metadata.exchange_id.to_string(),
                });
            }
        }

        debug!(
            kind = %kind,
            message_id = %message.metadata.id,
            exchange_id = %message.metadata.exchange_id,
            "message accepted into exchange"
        );

        match kind {
            MessageKind::Rfq => self.rfq = Some(message),
            MessageKind::Quote => self.quote = Some(message),
            MessageKind::Order => self.order = Some(message),
            MessageKind::OrderStatus => self.order_statuses.push(message),
            MessageKind::Close => self.close = Some(message),
        }
        Ok(())
    }

    /// Accept a batch of messages in `created_at` order
    ///
    /// Sorts ascending by creation time, then inserts one at a time.
    /// An inconsistent batch fails at the first offending message and
    /// earlier insertions stay in place; callers needing all-or-nothing
    /// snapshot the exchange beforehand.
    pub fn add_messages(&mut self, mut messages: Vec<Message>) -> Result<()> {
        messages.sort_by_key(|m| m.metadata.created_at);
        for message in messages {
            self.add_message(message)?;
        }
        Ok(())
    }

    /// All held messages in canonical slot order
    ///
    /// Listing convention: rfq, quote, order, close, then order
    /// statuses in insertion order. Deliberately not chronological;
    /// sort by `metadata.created_at` for that.
    pub fn messages(&self) -> Vec<&Message> {
        self.rfq
            .iter()
            .chain(self.quote.iter())
            .chain(self.order.iter())
            .chain(self.close.iter())
            .chain(self.order_statuses.iter())
            .collect()
    }

    /// Held RFQ
    pub fn rfq(&self) -> Option<&Message> {
        self.rfq.as_ref()
    }

    /// Held quote
    pub fn quote(&self) -> Option<&Message> {
        self.quote.as_ref()
    }

    /// Held order
    pub fn order(&self) -> Option<&Message> {
        self.order.as_ref()
    }

    /// Held order statuses in insertion order
    pub fn order_statuses(&self) -> &[Message] {
        &self.order_statuses
    }

    /// Held close
    pub fn close(&self) -> Option<&Message> {
        self.close.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeid::TypeId;
    use crate::types::{
        CloseData, Did, OrderStatusData, QuoteData, QuoteDetails, RfqData, SelectedPayinMethod,
        SelectedPayoutMethod, Status,
    };
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn alice() -> Did {
        Did::new("did:ex:alice")
    }

    fn pfi() -> Did {
        Did::new("did:ex:pfi")
    }

    fn rfq_data() -> RfqData {
        RfqData {
            offering_id: TypeId::generate("offering").unwrap(),
            payin: SelectedPayinMethod {
                kind: "DEBIT_CARD".to_string(),
                amount: dec!(100),
                payment_details: None,
            },
            payout: SelectedPayoutMethod {
                kind: "MOMO_MPESA".to_string(),
                payment_details: None,
            },
            claims: vec![],
        }
    }

    fn quote_data() -> QuoteData {
        QuoteData {
            expires_at: Utc::now() + Duration::minutes(5),
            payout_units_per_payin_unit: dec!(145.50),
            payin: QuoteDetails {
                currency_code: "USD".to_string(),
                subtotal: dec!(100),
                fee: Some(dec!(0.30)),
                total: dec!(100.30),
            },
            payout: QuoteDetails {
                currency_code: "KES".to_string(),
                subtotal: dec!(14550),
                fee: None,
                total: dec!(14550),
            },
        }
    }

    /// Rfq, quote, order, one status, close, spaced one second apart
    fn full_flow() -> Vec<Message> {
        let base = Utc::now();
        let mut rfq = Message::rfq(pfi(), alice(), rfq_data()).unwrap();
        rfq.metadata.created_at = base;
        let exchange_id = rfq.metadata.exchange_id.clone();

        let mut quote = Message::quote(alice(), pfi(), exchange_id.clone(), quote_data()).unwrap();
        quote.metadata.created_at = base + Duration::seconds(1);

        let mut order = Message::order(pfi(), alice(), exchange_id.clone()).unwrap();
        order.metadata.created_at = base + Duration::seconds(2);

        let mut status = Message::order_status(
            alice(),
            pfi(),
            exchange_id.clone(),
            OrderStatusData {
                status: Status::PayinSettled,
                details: None,
            },
        )
        .unwrap();
        status.metadata.created_at = base + Duration::seconds(3);

        let mut close = Message::close(
            alice(),
            pfi(),
            exchange_id,
            CloseData {
                reason: None,
                success: Some(true),
            },
        )
        .unwrap();
        close.metadata.created_at = base + Duration::seconds(4);

        vec![rfq, quote, order, status, close]
    }

    #[test]
    fn test_empty_exchange_accepts_only_rfq() {
        let mut exchange = Exchange::new();
        assert_eq!(exchange.valid_next(), &[MessageKind::Rfq]);

        let flow = full_flow();
        let err = exchange.add_message(flow[1].clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidNextMessage { .. }));
        assert!(exchange.messages().is_empty());
    }

    #[test]
    fn test_full_flow_succeeds_at_every_step() {
        let mut exchange = Exchange::new();
        for message in full_flow() {
            exchange.add_message(message).unwrap();
        }
        assert!(exchange.is_closed());
        assert_eq!(exchange.messages().len(), 5);
    }

    #[test]
    fn test_order_after_bare_rfq_is_rejected() {
        let mut exchange = Exchange::new();
        let flow = full_flow();
        exchange.add_message(flow[0].clone()).unwrap();

        let err = exchange.add_message(flow[2].clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidNextMessage { .. }));
        // Failed insert must not have mutated anything.
        assert_eq!(exchange.messages().len(), 1);
    }

    #[test]
    fn test_close_directly_after_rfq_or_quote() {
        let flow = full_flow();

        let mut declined = Exchange::new();
        declined.add_message(flow[0].clone()).unwrap();
        declined.add_message(flow[4].clone()).unwrap();
        assert!(declined.is_closed());

        let mut cancelled = Exchange::new();
        cancelled.add_message(flow[0].clone()).unwrap();
        cancelled.add_message(flow[1].clone()).unwrap();
        cancelled.add_message(flow[4].clone()).unwrap();
        assert!(cancelled.is_closed());
    }

    #[test]
    fn test_closed_exchange_rejects_everything() {
        let mut exchange = Exchange::new();
        for message in full_flow() {
            exchange.add_message(message).unwrap();
        }

        for message in full_flow() {
            let mut message = message;
            // Align ids so only the terminal state can reject.
            message.metadata.exchange_id = exchange.exchange_id().unwrap().clone();
            let err = exchange.add_message(message).unwrap_err();
            assert!(matches!(err, Error::InvalidNextMessage { .. }));
        }
    }

    #[test]
    fn test_exchange_id_mismatch() {
        let mut exchange = Exchange::new();
        let flow = full_flow();
        exchange.add_message(flow[0].clone()).unwrap();

        let mut stray = flow[1].clone();
        stray.metadata.exchange_id = TypeId::generate("rfq").unwrap();
        let err = exchange.add_message(stray).unwrap_err();
        assert!(matches!(err, Error::ExchangeIdMismatch { .. }));
        assert_eq!(exchange.messages().len(), 1);
    }

    #[test]
    fn test_multiple_order_statuses_append() {
        let mut exchange = Exchange::new();
        let flow = full_flow();
        for message in &flow[..4] {
            exchange.add_message(message.clone()).unwrap();
        }

        let mut second = flow[3].clone();
        second.metadata.id = TypeId::generate("orderstatus").unwrap();
        exchange.add_message(second).unwrap();

        assert_eq!(exchange.order_statuses().len(), 2);
        assert_eq!(exchange.valid_next(), &[MessageKind::OrderStatus, MessageKind::Close]);
    }

    #[test]
    fn test_latest_message_precedence() {
        let mut exchange = Exchange::new();
        let flow = full_flow();

        assert!(exchange.latest_message().is_none());
        for (message, expected_kind) in flow.iter().zip([
            MessageKind::Rfq,
            MessageKind::Quote,
            MessageKind::Order,
            MessageKind::OrderStatus,
            MessageKind::Close,
        ]) {
            exchange.add_message(message.clone()).unwrap();
            assert_eq!(exchange.latest_message().unwrap().kind(), expected_kind);
        }
    }

    #[test]
    fn test_add_messages_sorts_by_created_at() {
        let flow = full_flow();

        let mut shuffled = flow.clone();
        shuffled.reverse();
        shuffled.swap(1, 3);

        let mut from_batch = Exchange::new();
        from_batch.add_messages(shuffled).unwrap();

        let mut stepwise = Exchange::new();
        for message in flow {
            stepwise.add_message(message).unwrap();
        }

        let batch_ids: Vec<_> = from_batch.messages().iter().map(|m| &m.metadata.id).collect();
        let step_ids: Vec<_> = stepwise.messages().iter().map(|m| &m.metadata.id).collect();
        assert_eq!(batch_ids, step_ids);
    }

    #[test]
    fn test_add_messages_keeps_prefix_on_failure() {
        let flow = full_flow();
        // Drop the quote: rfq inserts, then order is rejected.
        let batch = vec![flow[0].clone(), flow[2].clone()];

        let mut exchange = Exchange::new();
        assert!(exchange.add_messages(batch).is_err());
        assert_eq!(exchange.messages().len(), 1);
        assert_eq!(exchange.latest_message().unwrap().kind(), MessageKind::Rfq);
    }

    #[test]
    fn test_messages_slot_order() {
        let mut exchange = Exchange::new();
        for message in full_flow() {
            exchange.add_message(message).unwrap();
        }

        let kinds: Vec<MessageKind> = exchange.messages().iter().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::Rfq,
                MessageKind::Quote,
                MessageKind::Order,
                MessageKind::Close,
                MessageKind::OrderStatus,
            ]
        );
    }
}
