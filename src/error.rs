//! Typed error taxonomy for the order book engine (spec §7).
//!
//! `Book::apply` is all-or-nothing: on any [`BookError`] the record is
//! rejected and book state is left exactly as it was before the call.

use thiserror::Error;

use crate::mbo::Side;

/// A feed event that is inconsistent with the book's current state.
///
/// The feed promises these never happen; when one does, it is a bug either
/// upstream or in an earlier application of this same crate, and is
/// surfaced for operator inspection rather than silently patched over.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// A record carried an action code this implementation doesn't
    /// recognize. `Action` is a closed enum, so in practice this is raised
    /// at the decode boundary rather than inside `Book::apply` itself — see
    /// `crate::mbo`'s module docs.
    #[error("unknown action code")]
    UnknownAction,
    #[error("modify changed side for order {order_id}")]
    SideMismatch { order_id: u64 },
    #[error("order {order_id} already resting in book")]
    DuplicateAdd { order_id: u64 },
    #[error("order {order_id} is not resting in book")]
    UnknownOrder { order_id: u64 },
    #[error("cancel size {cancel_size} exceeds resting size {resting_size} for order {order_id}")]
    OverCancel {
        order_id: u64,
        cancel_size: u32,
        resting_size: u32,
    },
}

/// Errors raised while applying a single MBO record to a [`crate::book::Book`]
/// or routing it through a [`crate::market::Market`].
#[derive(Debug, Error)]
pub enum BookError {
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("invalid side {side:?}, expected Ask or Bid")]
    InvalidSide { side: Side },
}

impl BookError {
    /// Short, stable name for operator-facing one-line error reports
    /// (spec §7: "Every error prints a single line naming the error kind").
    pub fn kind(&self) -> &'static str {
        match self {
            BookError::Contract(ContractViolation::UnknownAction) => "UnknownAction",
            BookError::Contract(ContractViolation::SideMismatch { .. }) => "SideMismatch",
            BookError::Contract(ContractViolation::DuplicateAdd { .. }) => "DuplicateAdd",
            BookError::Contract(ContractViolation::UnknownOrder { .. }) => "UnknownOrder",
            BookError::Contract(ContractViolation::OverCancel { .. }) => "OverCancel",
            BookError::InvalidSide { .. } => "InvalidSide",
        }
    }
}

/// Errors raised by the stream consumer outside of book application itself.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("transport error while reading from feed: {0}")]
    Transport(#[source] std::io::Error),

    #[error("decode error: malformed bytes from feed: {0}")]
    Decode(#[source] anyhow::Error),

    #[error(transparent)]
    Book(#[from] BookError),
}

impl ConsumerError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConsumerError::Transport(_) => "TransportError",
            ConsumerError::Decode(_) => "DecodeError",
            ConsumerError::Book(e) => e.kind(),
        }
    }
}
