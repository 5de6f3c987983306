// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection IDs issued by the peer.
//!
//! Without multipath a single stash holds every peer ID. With multipath
//! each path id owns its own stash. Paths refer to the entry they use by
//! sequence number, and an entry is only dropped once no path refers to it
//! and the peer has acknowledged its retirement.

use alloc::{collections::BTreeMap, vec::Vec};
use quicctx_core::{connection::PeerId, stateless_reset, transport};
use smallvec::SmallVec;

#[cfg(test)]
mod tests;

/// The amount of peer IDs a stash can hold without dynamic memory allocation
const NR_STATIC_STASHED_IDS: usize = 4;

//= https://www.rfc-editor.org/rfc/rfc9000#section-5.1.2
//# An endpoint SHOULD allow for sending and tracking a
//# number of RETIRE_CONNECTION_ID frames of at least twice the value of
//# the active_connection_id_limit transport parameter.
const RETIRED_ID_FACTOR: u64 = 2;

/// Bounds the total size of a stash, including entries waiting for a
/// retirement acknowledgement
const TOTAL_ID_FACTOR: u64 = 4;

/// The retirement progress of a peer ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retirement {
    Active,
    /// A RETIRE_CONNECTION_ID frame was queued
    RetirePending,
    /// The peer acknowledged the RETIRE_CONNECTION_ID frame
    RetireAcked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    //= https://www.rfc-editor.org/rfc/rfc9000#section-5.1.1
    //# Each connection ID has an associated sequence number to assist in
    //# detecting when NEW_CONNECTION_ID or RETIRE_CONNECTION_ID frames refer
    //# to the same value.
    pub sequence: u64,
    pub id: PeerId,
    pub secret: stateless_reset::Secret,
    /// The number of paths currently sending with this ID
    pub refs: u32,
    pub retirement: Retirement,
    /// Set once the peer asked for the ID to be retired
    pub needs_removal: bool,
}

impl Entry {
    fn new(sequence: u64, id: PeerId, secret: stateless_reset::Secret) -> Self {
        Self {
            sequence,
            id,
            secret,
            refs: 0,
            retirement: Retirement::Active,
            needs_removal: false,
        }
    }

    /// An empty ID can be shared by every path, any other ID is handed out
    /// once
    #[inline]
    fn is_available(&self) -> bool {
        self.id.is_empty()
            || (self.refs == 0 && !self.needs_removal && self.retirement == Retirement::Active)
    }

    #[inline]
    fn is_retired(&self, retire_before: u64) -> bool {
        self.sequence < retire_before || self.needs_removal || self.retirement != Retirement::Active
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The same ID was already stashed with the same sequence and secret
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum StashError {
    /// The connection ID was already received with a different sequence number or secret
    IdReused,
    /// The sequence number was already used for a different connection ID
    SequenceReused,
    /// The stateless reset secret was already used for a different connection ID
    SecretReused,
    /// The peer issued more connection IDs than allowed
    LimitExceeded,
    /// The peer uses zero-length connection IDs
    EmptyIdInUse,
}

impl StashError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::IdReused => "connection ID reused with different sequence or secret",
            Self::SequenceReused => "sequence number reused for a different connection ID",
            Self::SecretReused => "stateless reset secret reused",
            Self::LimitExceeded => "too many connection IDs",
            Self::EmptyIdInUse => "new connection ID while using zero-length IDs",
        }
    }
}

impl From<StashError> for transport::Error {
    fn from(error: StashError) -> Self {
        let code = match error {
            //= https://www.rfc-editor.org/rfc/rfc9000#section-5.1.1
            //# After processing a NEW_CONNECTION_ID frame and
            //# adding and retiring active connection IDs, if the number of active
            //# connection IDs exceeds the value advertised in its
            //# active_connection_id_limit transport parameter, an endpoint MUST
            //# close the connection with an error of type CONNECTION_ID_LIMIT_ERROR.
            StashError::LimitExceeded => transport::Error::CONNECTION_ID_LIMIT_ERROR,
            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
            //# An endpoint that is sending packets with a zero-length Destination
            //# Connection ID MUST treat receipt of a NEW_CONNECTION_ID frame as a
            //# connection error of type PROTOCOL_VIOLATION.
            _ => transport::Error::PROTOCOL_VIOLATION,
        };
        code.with_reason(error.message())
    }
}

/// What the owner of a path must do after releasing its peer ID
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Released {
    /// A RETIRE_CONNECTION_ID frame must be queued for this sequence number
    pub retire: Option<u64>,
    pub removed: bool,
}

/// The peer IDs of one path id
#[derive(Clone, Debug)]
pub struct Stash {
    path_id: u64,
    retire_before: u64,
    entries: SmallVec<[Entry; NR_STATIC_STASHED_IDS]>,
    /// Set once a path was created with an ID of this stash
    pub(crate) in_use: bool,
}

impl Stash {
    pub fn new(path_id: u64) -> Self {
        Self {
            path_id,
            retire_before: 0,
            entries: SmallVec::new(),
            in_use: false,
        }
    }

    #[inline]
    pub fn path_id(&self) -> u64 {
        self.path_id
    }

    #[inline]
    pub fn retire_before(&self) -> u64 {
        self.retire_before
    }

    /// Raises the retire prior to value. Lower values are ignored.
    pub fn raise_retire_before(&mut self, value: u64) -> bool {
        if value > self.retire_before {
            self.retire_before = value;
            true
        } else {
            false
        }
    }

    /// Adds the ID used during the handshake, referenced by the first path
    pub(crate) fn insert_initial(&mut self, id: PeerId, secret: stateless_reset::Secret) {
        let mut entry = Entry::new(0, id, secret);
        entry.refs = 1;
        self.entries.push(entry);
    }

    /// Stashes a new ID issued by the peer.
    ///
    /// `limit` is the `active_connection_id_limit` advertised to the peer.
    pub fn add(
        &mut self,
        sequence: u64,
        id: PeerId,
        secret: stateless_reset::Secret,
        limit: u64,
    ) -> Result<AddOutcome, StashError> {
        let mut active = 0u64;

        for entry in &self.entries {
            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
            //# If an endpoint receives a NEW_CONNECTION_ID frame that repeats a
            //# previously issued connection ID with a different Stateless Reset
            //# Token field value or a different Sequence Number field value, or if a
            //# sequence number is used for different connection IDs, the endpoint
            //# MAY treat that receipt as a connection error of type
            //# PROTOCOL_VIOLATION.
            if entry.id == id {
                return if entry.sequence == sequence && entry.secret == secret {
                    Ok(AddOutcome::Duplicate)
                } else {
                    Err(StashError::IdReused)
                };
            }
            if entry.sequence == sequence {
                return Err(StashError::SequenceReused);
            }
            if entry.secret == secret {
                return Err(StashError::SecretReused);
            }
            if !entry.is_retired(self.retire_before) {
                active += 1;
            }
        }

        if active >= RETIRED_ID_FACTOR * limit
            || self.entries.len() as u64 >= TOTAL_ID_FACTOR * limit
        {
            return Err(StashError::LimitExceeded);
        }

        self.entries.push(Entry::new(sequence, id, secret));
        Ok(AddOutcome::Added)
    }

    /// Returns the first entry a new path could use
    pub fn obtain(&self) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.is_available())
    }

    #[inline]
    pub fn get(&self, sequence: u64) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.sequence == sequence)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, sequence: u64) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.sequence == sequence)
    }

    /// Records that one more path sends with the entry
    pub(crate) fn reference(&mut self, sequence: u64) -> Option<&Entry> {
        let entry = self.get_mut(sequence)?;
        entry.refs += 1;
        Some(entry)
    }

    /// Records that a path stopped sending with the entry.
    ///
    /// When the last reference goes away the entry is retired, and it is
    /// removed once the retirement was acknowledged. `deleting` removes it
    /// immediately, without retiring.
    pub(crate) fn release(&mut self, sequence: u64, deleting: bool) -> Released {
        let mut released = Released::default();
        let Some(entry) = self.get_mut(sequence) else {
            return released;
        };

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return released;
        }

        // released IDs are never handed out again
        entry.needs_removal = true;

        if !deleting && entry.retirement == Retirement::Active {
            entry.retirement = Retirement::RetirePending;
            released.retire = Some(sequence);
        }

        if deleting || entry.retirement == Retirement::RetireAcked {
            self.remove(sequence);
            released.removed = true;
        }

        released
    }

    /// Marks every entry with a sequence number below `threshold` for
    /// removal.
    ///
    /// Returns the sequence numbers that need a RETIRE_CONNECTION_ID frame.
    /// Entries still referenced by a path are only marked. The caller must
    /// move those paths to a new ID, which releases the old one.
    pub(crate) fn remove_not_before(&mut self, threshold: u64) -> Vec<u64> {
        let mut retire = Vec::new();

        for entry in self.entries.iter_mut() {
            entry.needs_removal |= entry.sequence < threshold;
            if entry.needs_removal && entry.refs == 0 && entry.retirement == Retirement::Active {
                entry.retirement = Retirement::RetirePending;
                retire.push(entry.sequence);
            }
        }

        self.entries.retain(|entry| {
            !(entry.needs_removal && entry.refs == 0 && entry.retirement == Retirement::RetireAcked)
        });

        retire
    }

    /// Called when the peer acknowledged the retirement of `sequence`.
    ///
    /// Returns true if the entry was removed.
    pub(crate) fn on_retire_acked(&mut self, sequence: u64) -> bool {
        let Some(entry) = self.get_mut(sequence) else {
            return false;
        };
        entry.retirement = Retirement::RetireAcked;
        if entry.refs == 0 {
            self.remove(sequence);
            true
        } else {
            false
        }
    }

    /// Returns the sequence numbers referenced by a path that must be removed
    pub(crate) fn referenced_for_removal(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.needs_removal && entry.refs > 0)
            .map(|entry| entry.sequence)
    }

    fn remove(&mut self, sequence: u64) {
        self.entries.retain(|entry| entry.sequence != sequence);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The stashes of a connection, keyed by path id
#[derive(Clone, Debug, Default)]
pub struct Stashes {
    stashes: BTreeMap<u64, Stash>,
}

impl Stashes {
    #[inline]
    pub fn get(&self, path_id: u64) -> Option<&Stash> {
        self.stashes.get(&path_id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, path_id: u64) -> Option<&mut Stash> {
        self.stashes.get_mut(&path_id)
    }

    pub(crate) fn get_or_create(&mut self, path_id: u64) -> &mut Stash {
        self.stashes
            .entry(path_id)
            .or_insert_with(|| Stash::new(path_id))
    }

    pub(crate) fn remove(&mut self, path_id: u64) -> Option<Stash> {
        self.stashes.remove(&path_id)
    }

    /// Returns the first entry of the stash of `path_id` a new path could use
    #[inline]
    pub fn obtain(&self, path_id: u64) -> Option<&Entry> {
        self.get(path_id)?.obtain()
    }

    /// Returns the path id of the first stash not yet used by a path.
    ///
    /// Path id 0 always belongs to the first path and is never returned.
    pub fn first_idle(&self) -> Option<u64> {
        self.stashes
            .values()
            .find(|stash| !stash.in_use && stash.path_id != 0)
            .map(|stash| stash.path_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stash> {
        self.stashes.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stashes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stashes.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.stashes.clear();
    }
}
