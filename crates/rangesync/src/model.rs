//! Protocol data model: items, range bounds, fingerprints, range modes.

use std::cmp::Ordering;

use crate::codec::{decode_timestamp, decode_varint, encode_timestamp, encode_varint, take_bytes};
use crate::error::{Error, Result};

/// Maximum id length in bytes. Ids and bound prefixes are held in buffers of
/// this size regardless of the reconciler's id size.
pub const MAX_ID_SIZE: usize = 32;

/// A timestamped identifier.
///
/// The id is kept zero-padded to [`MAX_ID_SIZE`] bytes so that fingerprint
/// aggregation can XOR whole buffers; [`Item::id`] returns only the real
/// bytes. Items order by timestamp ascending, then id bytes lexically.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    timestamp: u64,
    id: [u8; MAX_ID_SIZE],
    id_len: u8,
}

impl Item {
    /// Create a new item. Fails with [`Error::IdTooBig`] for ids longer than
    /// [`MAX_ID_SIZE`] bytes.
    pub fn new(timestamp: u64, id: &[u8]) -> Result<Self> {
        if id.len() > MAX_ID_SIZE {
            return Err(Error::IdTooBig(id.len()));
        }
        let mut buf = [0u8; MAX_ID_SIZE];
        buf[..id.len()].copy_from_slice(id);
        Ok(Self {
            timestamp,
            id: buf,
            id_len: id.len() as u8,
        })
    }

    /// The item's timestamp.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The item's id bytes, without padding.
    pub fn id(&self) -> &[u8] {
        &self.id[..self.id_len as usize]
    }

    /// The full zero-padded id buffer.
    pub(crate) fn padded_id(&self) -> &[u8; MAX_ID_SIZE] {
        &self.id
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.id() == other.id()
    }
}

impl Eq for Item {}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id().cmp(other.id()))
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A half-open-range delimiter: a timestamp plus a 0–32 byte id prefix.
///
/// A bound covers every item that compares below it, where the prefix stands
/// in for an id; a shorter prefix that leads a longer id compares less than
/// that id. Bounds order among themselves the same way, which is what the
/// output queue relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bound {
    timestamp: u64,
    prefix: Vec<u8>,
}

impl Bound {
    /// Create a bound. Fails with [`Error::IdTooBig`] for prefixes longer
    /// than [`MAX_ID_SIZE`] bytes.
    pub fn new(timestamp: u64, prefix: Vec<u8>) -> Result<Self> {
        if prefix.len() > MAX_ID_SIZE {
            return Err(Error::IdTooBig(prefix.len()));
        }
        Ok(Self { timestamp, prefix })
    }

    /// The bound at timestamp 0 with an empty prefix: below every item.
    pub fn zero() -> Self {
        Self {
            timestamp: 0,
            prefix: Vec::new(),
        }
    }

    /// The infinity bound: above every item.
    pub fn infinity() -> Self {
        Self {
            timestamp: u64::MAX,
            prefix: Vec::new(),
        }
    }

    /// The bound's timestamp.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The bound's id prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Compare this bound against an item under the shared total order.
    pub(crate) fn cmp_item(&self, item: &Item) -> Ordering {
        self.timestamp
            .cmp(&item.timestamp())
            .then_with(|| self.prefix.as_slice().cmp(item.id()))
    }

    /// Encode the bound: delta timestamp, prefix length varint, then the
    /// prefix truncated to `id_size` bytes.
    pub fn encode(&self, last_timestamp_out: &mut u64, id_size: usize) -> Vec<u8> {
        let mut bytes = encode_timestamp(self.timestamp, last_timestamp_out);
        bytes.extend_from_slice(&encode_varint(self.prefix.len() as u64));
        let take = self.prefix.len().min(id_size);
        bytes.extend_from_slice(&self.prefix[..take]);
        bytes
    }

    /// Decode a bound from the front of `buf`, advancing it.
    pub fn decode(buf: &mut &[u8], last_timestamp_in: &mut u64) -> Result<Self> {
        let timestamp = decode_timestamp(buf, last_timestamp_in)?;
        let len = decode_varint(buf)?;
        if len > MAX_ID_SIZE as u64 {
            return Err(Error::IdTooBig(len as usize));
        }
        let prefix = take_bytes(buf, len as usize)?.to_vec();
        Ok(Self { timestamp, prefix })
    }
}

/// The shortest bound lying strictly between two adjacent items.
///
/// With differing timestamps the prefix is empty; with equal timestamps the
/// prefix is the shared leading bytes of the two ids plus one. Both ids must
/// carry at least `id_size` bytes.
pub fn minimal_bound(prev: &Item, curr: &Item, id_size: usize) -> Bound {
    if curr.timestamp() != prev.timestamp() {
        return Bound {
            timestamp: curr.timestamp(),
            prefix: Vec::new(),
        };
    }

    let curr_id = curr.id();
    let shared = curr_id
        .iter()
        .zip(prev.id())
        .take(id_size)
        .take_while(|(a, b)| a == b)
        .count();

    Bound {
        timestamp: curr.timestamp(),
        prefix: curr_id[..(shared + 1).min(id_size)].to_vec(),
    }
}

/// The XOR aggregate of a range of items.
///
/// Folding an item in XORs its zero-padded 32-byte id buffer into the
/// accumulator. The empty range is all zeros; aggregation is associative,
/// commutative, and self-inverse. Only the first `id_size` bytes travel on
/// the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fingerprint([u8; MAX_ID_SIZE]);

impl Fingerprint {
    /// Fold an item into the aggregate.
    pub fn xor_in(&mut self, item: &Item) {
        for (acc, byte) in self.0.iter_mut().zip(item.padded_id()) {
            *acc ^= byte;
        }
    }

    /// Combine with another aggregate; the result covers the union of two
    /// disjoint ranges.
    pub fn xor_with(&mut self, other: &Fingerprint) {
        for (acc, byte) in self.0.iter_mut().zip(&other.0) {
            *acc ^= byte;
        }
    }

    /// The full 32-byte aggregate.
    pub fn as_bytes(&self) -> &[u8; MAX_ID_SIZE] {
        &self.0
    }

    /// The wire form: the first `id_size` bytes.
    pub fn truncated(&self, id_size: usize) -> &[u8] {
        &self.0[..id_size]
    }
}

/// Range mode: the closed set of payload kinds a frame tuple can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Mode {
    /// Nothing to say about this range.
    Skip = 0,
    /// Body is an `id_size`-byte fingerprint.
    Fingerprint = 1,
    /// Body is a count followed by that many ids.
    IdList = 2,
    /// Body is a count of ids, the ids, then a bitfield over the peer's
    /// items in the range. Only ever sent responder-to-initiator.
    IdListResponse = 3,
}

impl Mode {
    /// Parse a mode varint. Fails with [`Error::UnexpectedMode`] outside
    /// the closed set.
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0 => Ok(Self::Skip),
            1 => Ok(Self::Fingerprint),
            2 => Ok(Self::IdList),
            3 => Ok(Self::IdListResponse),
            other => Err(Error::UnexpectedMode(other)),
        }
    }
}
