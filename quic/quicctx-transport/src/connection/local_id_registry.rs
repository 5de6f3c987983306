// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection IDs issued to the peer.
//!
//! Each path id has its own list. Non-empty IDs are registered in the
//! context [`IdTables`] so incoming packets can be routed back to the
//! connection.

use crate::{
    connection::InternalConnectionId,
    error::Error,
    id_tables::{IdTables, Route},
};
use alloc::collections::BTreeMap;
use core::time::Duration;
use quicctx_core::{
    connection::{id::MAX_LEN, LocalId},
    random,
    time::Timestamp,
};
use smallvec::SmallVec;

#[cfg(test)]
mod tests;

/// The amount of local IDs a list can hold without dynamic memory allocation
const NR_STATIC_LOCAL_IDS: usize = 4;

/// The number of random IDs tried before giving up on finding a unique one
pub const MAX_CREATE_ATTEMPTS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub sequence: u64,
    pub id: LocalId,
    pub created_at: Timestamp,
}

/// The local IDs of one path id
#[derive(Clone, Debug)]
pub struct List {
    path_id: u64,
    next_sequence: u64,
    /// IDs below this sequence number are expired and must be retired by the peer
    retire_before: u64,
    expired: u64,
    oldest_created: Timestamp,
    pub(crate) is_demoted: bool,
    entries: SmallVec<[Entry; NR_STATIC_LOCAL_IDS]>,
}

impl List {
    fn new(path_id: u64) -> Self {
        Self {
            path_id,
            next_sequence: 0,
            retire_before: 0,
            expired: 0,
            oldest_created: Timestamp::ZERO,
            is_demoted: false,
            entries: SmallVec::new(),
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

    /// The number of IDs that outlived the TTL and were not yet retired
    #[inline]
    pub fn expired(&self) -> u64 {
        self.expired
    }

    #[inline]
    pub fn is_demoted(&self) -> bool {
        self.is_demoted
    }

    pub fn get(&self, sequence: u64) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.sequence == sequence)
    }

    pub fn find(&self, id: &LocalId) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == *id)
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

    /// Marks IDs older than `ttl` as expired.
    ///
    /// The list is only scanned once the oldest ID could have expired.
    /// Returns the time the list must be checked again, which is `now`
    /// when IDs were just marked.
    pub fn check_ttl(&mut self, now: Timestamp, ttl: Duration) -> Timestamp {
        if now.saturating_duration_since(self.oldest_created) < ttl {
            return self.oldest_created + ttl;
        }

        self.oldest_created = now;
        self.expired = 0;
        for entry in &self.entries {
            if now.saturating_duration_since(entry.created_at) >= ttl {
                self.expired += 1;
                self.retire_before = self.retire_before.max(entry.sequence + 1);
            } else {
                self.oldest_created = self.oldest_created.min(entry.created_at);
            }
        }

        now
    }
}

#[derive(Debug)]
pub struct Registry {
    connection: InternalConnectionId,
    id_len: usize,
    lists: BTreeMap<u64, List>,
    /// One more than the largest path id a list was created for
    next_path_id: u64,
}

impl Registry {
    pub fn new(connection: InternalConnectionId, id_len: usize) -> Self {
        Self {
            connection,
            id_len: id_len.min(MAX_LEN),
            lists: BTreeMap::new(),
            next_path_id: 0,
        }
    }

    #[inline]
    pub fn id_len(&self) -> usize {
        self.id_len
    }

    #[inline]
    pub fn next_path_id(&self) -> u64 {
        self.next_path_id
    }

    #[inline]
    pub fn list(&self, path_id: u64) -> Option<&List> {
        self.lists.get(&path_id)
    }

    #[inline]
    pub(crate) fn list_mut(&mut self, path_id: u64) -> Option<&mut List> {
        self.lists.get_mut(&path_id)
    }

    pub fn lists(&self) -> impl Iterator<Item = &List> {
        self.lists.values()
    }

    /// Issues a new local ID for `path_id`.
    ///
    /// A `suggested` ID is tried first. Otherwise random IDs are drawn until
    /// one is not registered by any connection.
    pub fn create(
        &mut self,
        path_id: u64,
        suggested: Option<LocalId>,
        now: Timestamp,
        random: &mut dyn random::Generator,
        id_tables: &mut IdTables,
    ) -> Result<Entry, Error> {
        let id = if self.id_len == 0 {
            // zero-length IDs route by address and are never registered
            LocalId::EMPTY
        } else {
            self.unique_id(suggested, random, id_tables)?
        };

        if !id.is_empty() {
            let route = Route {
                connection: self.connection,
                path_id,
            };
            id_tables
                .register_local_id(id, route)
                .map_err(|_| Error::ConnectionIdCollision)?;
        }

        self.next_path_id = self.next_path_id.max(path_id.saturating_add(1));
        let list = self
            .lists
            .entry(path_id)
            .or_insert_with(|| List::new(path_id));

        let entry = Entry {
            sequence: list.next_sequence,
            id,
            created_at: now,
        };
        list.next_sequence += 1;
        if list.entries.is_empty() {
            list.oldest_created = now;
        }
        list.entries.push(entry);

        Ok(entry)
    }

    fn unique_id(
        &self,
        suggested: Option<LocalId>,
        random: &mut dyn random::Generator,
        id_tables: &IdTables,
    ) -> Result<LocalId, Error> {
        let mut candidate = suggested.filter(|id| id.len() == self.id_len);

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = match candidate.take() {
                Some(id) => id,
                None => {
                    let mut bytes = [0; MAX_LEN];
                    random.public_random_fill(&mut bytes[..self.id_len]);
                    LocalId::try_from_bytes(&bytes[..self.id_len])
                        .ok_or(Error::InvalidArgument)?
                }
            };

            if id_tables.lookup_local_id(&id).is_none() {
                return Ok(id);
            }
        }

        Err(Error::ConnectionIdCollision)
    }

    /// Removes the ID `sequence` of `path_id`, returning it
    pub fn delete(&mut self, path_id: u64, sequence: u64, id_tables: &mut IdTables) -> Option<Entry> {
        let list = self.lists.get_mut(&path_id)?;
        let index = list.entries.iter().position(|entry| entry.sequence == sequence)?;
        let entry = list.entries.remove(index);

        if !entry.id.is_empty() {
            id_tables.unregister_local_id(&entry.id, self.connection);
        }
        if entry.sequence < list.retire_before && list.expired > 0 {
            list.expired -= 1;
        }

        Some(entry)
    }

    /// Removes the list of `path_id` and every ID it holds
    pub fn delete_list(&mut self, path_id: u64, id_tables: &mut IdTables) -> Option<List> {
        let list = self.lists.remove(&path_id)?;
        for entry in &list.entries {
            if !entry.id.is_empty() {
                id_tables.unregister_local_id(&entry.id, self.connection);
            }
        }
        Some(list)
    }

    pub fn delete_all(&mut self, id_tables: &mut IdTables) {
        let path_ids: SmallVec<[u64; NR_STATIC_LOCAL_IDS]> = self.lists.keys().copied().collect();
        for path_id in path_ids {
            self.delete_list(path_id, id_tables);
        }
    }

    pub fn find(&self, path_id: u64, id: &LocalId) -> Option<&Entry> {
        self.lists.get(&path_id)?.find(id)
    }

    /// Finds the path id and entry of `id` in any list
    pub fn find_any(&self, id: &LocalId) -> Option<(u64, &Entry)> {
        self.lists
            .values()
            .find_map(|list| list.find(id).map(|entry| (list.path_id, entry)))
    }

    /// Checks every list against `ttl`, returning the earliest time a list
    /// must be checked again
    pub fn check_ttl(&mut self, now: Timestamp, ttl: Duration) -> Option<Timestamp> {
        self.lists
            .values_mut()
            .map(|list| list.check_ttl(now, ttl))
            .min()
    }
}
