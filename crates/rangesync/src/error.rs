//! Error types for the reconciliation protocol.
//!
//! Every variant is a programmer or protocol violation; none are recoverable.
//! A reconciler that has returned a protocol error must be discarded.

use thiserror::Error;

/// Reconciliation error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Id size outside `[8, 32]` at construction, or an item id whose length
    /// does not match the reconciler's id size.
    #[error("bad id size: {0}")]
    BadIdSize(usize),

    /// Mutation attempted after `seal`, or `seal` called twice.
    #[error("already sealed")]
    AlreadySealed,

    /// `initiate` or `reconcile` called before `seal`.
    #[error("not sealed")]
    NotSealed,

    /// Nonzero frame size limit below the 1024-byte floor.
    #[error("frame size limit too small: {0}")]
    FrameSizeTooSmall(u64),

    /// Initiator called the responder-form `reconcile`, or vice versa.
    #[error("initiator/responder mismatch")]
    InitiatorMismatch,

    /// A responder received an IdListResponse range.
    #[error("unexpected IdListResponse")]
    UnexpectedIdListResponse,

    /// Range mode outside the closed set of four.
    #[error("unexpected mode: {0}")]
    UnexpectedMode(u64),

    /// A varint or byte block ran past the end of the frame.
    #[error("parse ends prematurely")]
    ParseUnderrun,

    /// An id or bound prefix longer than 32 bytes.
    #[error("id too big: {0} bytes (max 32)")]
    IdTooBig(usize),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
