//! # Domain Error Types
//!
//! Errors produced by the pure type layer. Storage and network failures
//! belong to the outer crates; the only things that can go wrong here are
//! malformed data crossing a serialization boundary.

use thiserror::Error;

/// Errors from the pure type layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A mutation kind string from storage or the wire is not recognized.
    ///
    /// ## When This Occurs
    /// - A newer client wrote a kind this build does not know
    /// - A corrupted outbox row
    #[error("Unknown mutation kind: {0}")]
    UnknownMutationKind(String),

    /// A mutation payload does not contain the fields its kind requires.
    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },
}
