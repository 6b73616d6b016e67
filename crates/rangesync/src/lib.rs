//! # rangesync
//!
//! Range-based set reconciliation between two parties holding sets of
//! timestamped identifiers. Both sides learn the symmetric difference of
//! their sets while exchanging a number of bytes proportional to the size
//! of that difference, not the size of the sets.
//!
//! Internal module boundaries:
//! - `error`: shared protocol error and result types
//! - `codec`: varint, delta-timestamp, and bitfield primitives
//! - `model`: items, bounds, fingerprints, range modes
//! - `reconciliation`: the stateful reconciler and frame assembly
//! - `tests`: codec/model/reconciliation coverage
//!
//! # Overview
//!
//! Naive syncing transfers every identifier to find the difference.
//! Range-based reconciliation is more efficient when both sides already
//! have most items in common: the item space is cut into ranges, each
//! summarized by an XOR fingerprint, and only ranges whose fingerprints
//! disagree are subdivided — recursively, until the differing identifiers
//! themselves are exchanged.
//!
//! # Protocol Flow
//!
//! ```text
//! Initiator                               Responder
//!   |                                        |
//!   |  initiate() -- fingerprints ---------> |
//!   |                                        | (compare, split)
//!   | <--------- refined ranges -- reconcile |
//!   |                                        |
//!   | reconcile_with_ids -- id lists ------> |
//!   | <----- id-list responses -- reconcile  |
//!   |   ...continues until both empty...     |
//! ```
//!
//! The initiator accumulates the result: `have` ids (local only, the peer
//! needs them) and `need` ids (remote only, we need them). The responder
//! keeps no result state; it only refines.
//!
//! # Usage Example
//!
//! ```
//! use rangesync::Reconciler;
//!
//! let mut client = Reconciler::new(16)?;
//! client.add_item(1000, &[0x01; 16])?;
//! client.seal()?;
//!
//! let mut server = Reconciler::new(16)?;
//! server.seal()?;
//!
//! let mut have = Vec::new();
//! let mut need = Vec::new();
//! let mut frame = client.initiate(0)?;
//! loop {
//!     let reply = server.reconcile(&frame)?;
//!     frame = client.reconcile_with_ids(&reply, &mut have, &mut need)?;
//!     if reply.is_empty() && frame.is_empty() {
//!         break;
//!     }
//! }
//!
//! assert_eq!(have, vec![vec![0x01; 16]]);
//! assert!(need.is_empty());
//! # Ok::<(), rangesync::Error>(())
//! ```
//!
//! # Performance Characteristics
//!
//! - **Round trips**: O(log N) in the set size for a fixed number of
//!   differences
//! - **Bandwidth**: O(d log N) for d differences
//! - **Best case**: equal sets converge after a single round trip
//! - **Worst case**: disjoint sets degrade to a full id-list exchange
//!
//! The fingerprint is a plain XOR aggregate: adequate for high-entropy,
//! adversary-free identifiers, and no defence at all against adversarially
//! chosen ones.
//!
//! # References
//!
//! - Range-Based Set Reconciliation: <https://logperiodic.com/rbsr.html>

mod codec;
mod error;
mod model;
mod reconciliation;

pub use codec::{
    bitfield_lookup, decode_timestamp, decode_varint, encode_bitfield, encode_timestamp,
    encode_varint,
};
pub use error::{Error, Result};
pub use model::{minimal_bound, Bound, Fingerprint, Item, Mode, MAX_ID_SIZE};
pub use reconciliation::Reconciler;
