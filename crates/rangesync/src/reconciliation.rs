//! Stateful range reconciliation: item store, range engine, protocol driver.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use crate::codec::{bitfield_lookup, decode_varint, encode_bitfield, encode_varint, take_bytes};
use crate::error::{Error, Result};
use crate::model::{minimal_bound, Bound, Fingerprint, Item, Mode, MAX_ID_SIZE};

/// Number of sub-ranges a mismatched range is split into.
const BUCKETS: usize = 16;

/// A queued range refinement awaiting inclusion in an outgoing frame.
#[derive(Debug)]
struct RangeOutput {
    start: Bound,
    end: Bound,
    payload: Vec<u8>,
}

/// One side of a range-based set reconciliation dialog.
///
/// Callers push items with [`add_item`](Reconciler::add_item), freeze the
/// set with [`seal`](Reconciler::seal), then exchange frames: the initiator
/// starts with [`initiate`](Reconciler::initiate) and thereafter calls
/// [`reconcile_with_ids`](Reconciler::reconcile_with_ids) on each reply,
/// while the responder answers every incoming frame with
/// [`reconcile`](Reconciler::reconcile). The dialog has converged when both
/// sides produce an empty frame.
///
/// Every operation runs to completion synchronously and performs no I/O;
/// moving frames between peers is the caller's business.
#[derive(Debug)]
pub struct Reconciler {
    id_size: usize,
    items: Vec<Item>,
    sealed: bool,
    is_initiator: bool,
    frame_size_limit: u64,
    pending_outputs: VecDeque<RangeOutput>,
}

impl Reconciler {
    /// Create a reconciler for ids of exactly `id_size` bytes,
    /// `8 <= id_size <= 32`.
    pub fn new(id_size: usize) -> Result<Self> {
        if !(8..=MAX_ID_SIZE).contains(&id_size) {
            return Err(Error::BadIdSize(id_size));
        }
        Ok(Self {
            id_size,
            items: Vec::new(),
            sealed: false,
            is_initiator: false,
            frame_size_limit: 0,
            pending_outputs: VecDeque::new(),
        })
    }

    /// The id size fixed at construction.
    pub fn id_size(&self) -> usize {
        self.id_size
    }

    /// Number of items in the store.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an item. Legal only before sealing; the id must be exactly
    /// `id_size` bytes.
    pub fn add_item(&mut self, timestamp: u64, id: &[u8]) -> Result<()> {
        if self.sealed {
            return Err(Error::AlreadySealed);
        }
        if id.len() != self.id_size {
            return Err(Error::BadIdSize(id.len()));
        }
        self.items.push(Item::new(timestamp, id)?);
        Ok(())
    }

    /// Sort the store and freeze it. Items are typically pushed in roughly
    /// descending timestamp order, so reversing first hands the adaptive
    /// sort near-sorted input.
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed {
            return Err(Error::AlreadySealed);
        }
        self.items.reverse();
        self.items.sort();
        self.sealed = true;
        Ok(())
    }

    /// Open the dialog and return the first frame. `frame_size_limit` of
    /// zero means unbounded; nonzero values below 1024 are rejected.
    pub fn initiate(&mut self, frame_size_limit: u64) -> Result<Vec<u8>> {
        if !self.sealed {
            return Err(Error::NotSealed);
        }
        if frame_size_limit != 0 && frame_size_limit < 1024 {
            return Err(Error::FrameSizeTooSmall(frame_size_limit));
        }
        debug_assert!(!self.is_initiator, "initiate called twice");
        self.is_initiator = true;
        self.frame_size_limit = frame_size_limit;

        Self::split_range(
            &self.items,
            self.id_size,
            Bound::zero(),
            Bound::infinity(),
            &mut self.pending_outputs,
        );

        Ok(self.build_output())
    }

    /// Responder form: consume an incoming frame and return the reply.
    pub fn reconcile(&mut self, query: &[u8]) -> Result<Vec<u8>> {
        if self.is_initiator {
            return Err(Error::InitiatorMismatch);
        }
        let mut have_ids = Vec::new();
        let mut need_ids = Vec::new();
        self.reconcile_aux(query, &mut have_ids, &mut need_ids)?;
        Ok(self.build_output())
    }

    /// Initiator form: consume an incoming frame, appending ids present
    /// only locally to `have_ids` and ids present only remotely to
    /// `need_ids`, and return the next outgoing frame. An empty return from
    /// both sides means convergence.
    pub fn reconcile_with_ids(
        &mut self,
        query: &[u8],
        have_ids: &mut Vec<Vec<u8>>,
        need_ids: &mut Vec<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        if !self.is_initiator {
            return Err(Error::InitiatorMismatch);
        }
        self.reconcile_aux(query, have_ids, need_ids)?;
        Ok(self.build_output())
    }

    /// Walk the incoming frame range by range, generating refinements.
    fn reconcile_aux(
        &mut self,
        mut query: &[u8],
        have_ids: &mut Vec<Vec<u8>>,
        need_ids: &mut Vec<Vec<u8>>,
    ) -> Result<()> {
        if !self.sealed {
            return Err(Error::NotSealed);
        }

        let mut prev_bound = Bound::zero();
        let mut prev_index = 0usize;
        let mut last_timestamp_in = 0u64;
        let mut outputs: VecDeque<RangeOutput> = VecDeque::new();

        while !query.is_empty() {
            let curr_bound = Bound::decode(&mut query, &mut last_timestamp_in)?;
            let mode = Mode::from_u64(decode_varint(&mut query)?)?;

            // The range covered by this tuple: from where the previous
            // tuple left off, up to the first item above the bound.
            let lower = prev_index;
            let upper = lower
                + self.items[lower..]
                    .partition_point(|item| curr_bound.cmp_item(item) != Ordering::Less);

            match mode {
                Mode::Skip => {}

                Mode::Fingerprint => {
                    let theirs = take_bytes(&mut query, self.id_size)?;
                    let mut ours = Fingerprint::default();
                    for item in &self.items[lower..upper] {
                        ours.xor_in(item);
                    }

                    if ours.truncated(self.id_size) != theirs {
                        Self::split_range(
                            &self.items[lower..upper],
                            self.id_size,
                            prev_bound.clone(),
                            curr_bound.clone(),
                            &mut outputs,
                        );
                    }
                }

                Mode::IdList => {
                    let num_ids = decode_varint(&mut query)?;

                    struct TheirElem {
                        offset: u64,
                        on_both_sides: bool,
                    }

                    let mut their_elems: HashMap<Vec<u8>, TheirElem> = HashMap::new();
                    for offset in 0..num_ids {
                        let id = take_bytes(&mut query, self.id_size)?.to_vec();
                        their_elems.entry(id).or_insert(TheirElem {
                            offset,
                            on_both_sides: false,
                        });
                    }

                    let mut response_have_ids: Vec<&[u8]> = Vec::new();
                    let mut response_need_indices: Vec<u64> = Vec::new();

                    for item in &self.items[lower..upper] {
                        match their_elems.get_mut(item.id()) {
                            None => {
                                // Ours only.
                                if self.is_initiator {
                                    have_ids.push(item.id().to_vec());
                                } else {
                                    response_have_ids.push(item.id());
                                }
                            }
                            Some(elem) => elem.on_both_sides = true,
                        }
                    }

                    for (id, elem) in &their_elems {
                        if !elem.on_both_sides {
                            // Theirs only.
                            if self.is_initiator {
                                need_ids.push(id.clone());
                            } else {
                                response_need_indices.push(elem.offset);
                            }
                        }
                    }

                    if !self.is_initiator {
                        let mut payload = encode_varint(Mode::IdListResponse as u64);
                        payload.extend_from_slice(&encode_varint(response_have_ids.len() as u64));
                        for id in &response_have_ids {
                            payload.extend_from_slice(id);
                        }
                        let bitfield = encode_bitfield(&response_need_indices);
                        payload.extend_from_slice(&encode_varint(bitfield.len() as u64));
                        payload.extend_from_slice(&bitfield);

                        outputs.push_back(RangeOutput {
                            start: prev_bound.clone(),
                            end: curr_bound.clone(),
                            payload,
                        });
                    }
                }

                Mode::IdListResponse => {
                    if !self.is_initiator {
                        return Err(Error::UnexpectedIdListResponse);
                    }

                    let num_ids = decode_varint(&mut query)?;
                    for _ in 0..num_ids {
                        need_ids.push(take_bytes(&mut query, self.id_size)?.to_vec());
                    }

                    let bitfield_len = decode_varint(&mut query)?;
                    let bitfield = take_bytes(&mut query, bitfield_len as usize)?;

                    for (offset, item) in self.items[lower..upper].iter().enumerate() {
                        if bitfield_lookup(bitfield, offset as u64) {
                            have_ids.push(item.id().to_vec());
                        }
                    }
                }
            }

            prev_index = upper;
            prev_bound = curr_bound;
        }

        // New refinements go ahead of anything already queued, preserving
        // their own left-to-right order.
        while let Some(output) = outputs.pop_back() {
            self.pending_outputs.push_front(output);
        }

        Ok(())
    }

    /// Split a range of items into refinement outputs.
    ///
    /// Small ranges become a single IdList covering the whole range; larger
    /// ones become [`BUCKETS`] fingerprinted sub-ranges delimited by minimal
    /// bounds, with the last sub-range stretched to the incoming upper
    /// bound.
    fn split_range(
        items: &[Item],
        id_size: usize,
        lower_bound: Bound,
        upper_bound: Bound,
        outputs: &mut VecDeque<RangeOutput>,
    ) {
        let num_elems = items.len();

        if num_elems < BUCKETS * 2 {
            let mut payload = encode_varint(Mode::IdList as u64);
            payload.extend_from_slice(&encode_varint(num_elems as u64));
            for item in items {
                payload.extend_from_slice(item.id());
            }

            outputs.push_back(RangeOutput {
                start: lower_bound,
                end: upper_bound,
                payload,
            });
            return;
        }

        let items_per_bucket = num_elems / BUCKETS;
        let buckets_with_extra = num_elems % BUCKETS;
        let mut curr = 0usize;
        let mut prev_bound = lower_bound;

        for bucket in 0..BUCKETS {
            let bucket_len = items_per_bucket + usize::from(bucket < buckets_with_extra);

            let mut fingerprint = Fingerprint::default();
            for item in &items[curr..curr + bucket_len] {
                fingerprint.xor_in(item);
            }
            curr += bucket_len;

            let mut payload = encode_varint(Mode::Fingerprint as u64);
            payload.extend_from_slice(fingerprint.truncated(id_size));

            let end = if curr == num_elems {
                upper_bound.clone()
            } else {
                minimal_bound(&items[curr - 1], &items[curr], id_size)
            };

            outputs.push_back(RangeOutput {
                start: prev_bound,
                end: end.clone(),
                payload,
            });
            prev_bound = end;
        }
    }

    /// Assemble the next outgoing frame from the pending-output queue.
    ///
    /// Outputs are consumed in FIFO order. A Skip tuple is interposed
    /// whenever the cursor has to jump forward to an output's start bound.
    /// An output whose start lies below the cursor would describe a range
    /// already covered, so assembly stops there; with a frame size limit in
    /// force, assembly also stops before the frame would overflow, leaving
    /// the remainder queued for the next frame.
    fn build_output(&mut self) -> Vec<u8> {
        let mut output = Vec::new();
        let mut curr_bound = Bound::zero();
        let mut last_timestamp_out = 0u64;

        while let Some(p) = self.pending_outputs.front() {
            if p.start < curr_bound {
                break;
            }

            let mut tuple = Vec::new();
            if curr_bound != p.start {
                tuple.extend_from_slice(&p.start.encode(&mut last_timestamp_out, self.id_size));
                tuple.extend_from_slice(&encode_varint(Mode::Skip as u64));
            }
            tuple.extend_from_slice(&p.end.encode(&mut last_timestamp_out, self.id_size));
            tuple.extend_from_slice(&p.payload);

            if self.frame_size_limit != 0
                && (output.len() + tuple.len()) as u64 > self.frame_size_limit
            {
                break;
            }
            output.extend_from_slice(&tuple);

            if let Some(done) = self.pending_outputs.pop_front() {
                curr_bound = done.end;
            }
        }

        output
    }
}
