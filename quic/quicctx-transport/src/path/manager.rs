// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::Path;
use crate::connection::peer_id_stash::Stashes;
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};
use quicctx_core::{
    inet::{self, SocketAddr},
    time::Timestamp,
};


/// The paths of a connection.
///
/// Index 0 is the default path. Indices shift when paths are deleted, so
/// references held across calls use the path unique id instead.
#[derive(Debug, Default)]
pub struct Manager {
    /// Path array, compacted on deletion
    paths: Vec<Path>,
    /// One more than the largest unique id handed out
    next_unique_id: u64,
}

/// The outcome of an address lookup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressLookup {
    /// The path whose tuple matches both addresses
    pub index: Option<usize>,
    /// A path matching the peer address whose local address is not known yet
    pub partial: Option<usize>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Path> {
        self.paths.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Path> {
        self.paths.iter_mut()
    }

    /// Returns the index of the path with the given unique id
    pub fn index_of(&self, unique_id: u64) -> Option<usize> {
        self.paths
            .iter()
            .position(|path| path.unique_id() == unique_id)
    }

    pub fn by_unique_id(&self, unique_id: u64) -> Option<&Path> {
        self.paths.iter().find(|path| path.unique_id() == unique_id)
    }

    #[inline]
    pub fn next_unique_id(&self) -> u64 {
        self.next_unique_id
    }

    /// Picks the unique id of a new path.
    ///
    /// A requested id is used as is. Otherwise ids are sequential without
    /// multipath, and follow the first stash no path uses with multipath.
    pub(crate) fn allocate_unique_id(
        &mut self,
        requested: Option<u64>,
        is_multipath: bool,
        stashes: &Stashes,
    ) -> Option<u64> {
        let unique_id = match requested {
            Some(unique_id) => unique_id,
            None if is_multipath => stashes.first_idle()?,
            None => self.next_unique_id,
        };
        self.next_unique_id = self.next_unique_id.max(unique_id.saturating_add(1));
        Some(unique_id)
    }

    /// Appends a path, returning its index
    pub(crate) fn push(&mut self, path: Path) -> usize {
        self.next_unique_id = self.next_unique_id.max(path.unique_id().saturating_add(1));
        self.paths.push(path);
        self.paths.len() - 1
    }

    /// Removes the path at `index`, shifting the later paths down
    pub(crate) fn remove(&mut self, index: usize) -> Path {
        self.paths.remove(index)
    }

    #[inline]
    pub(crate) fn swap(&mut self, a: usize, b: usize) {
        self.paths.swap(a, b);
    }

    pub(crate) fn clear(&mut self) -> Vec<Path> {
        core::mem::take(&mut self.paths)
    }

    /// Returns true if every path is demoted
    pub fn all_demoted(&self) -> bool {
        self.paths.iter().all(Path::is_demoted)
    }

    /// Returns the earliest demotion deadline still ahead of `now`
    pub fn next_demotion_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        self.paths
            .iter()
            .filter_map(Path::demotion_deadline)
            .filter(|deadline| now < *deadline)
            .min()
    }

    /// Finds the path whose current tuple matches a pair of addresses.
    ///
    /// The peer address is compared as a pattern: an unspecified IP or a
    /// zero port matches any value. A missing address only matches a tuple
    /// where that address is missing too.
    pub fn lookup_by_address(
        &self,
        local_addr: Option<&SocketAddr>,
        peer_addr: Option<&SocketAddr>,
    ) -> AddressLookup {
        let mut lookup = AddressLookup::default();

        if local_addr.is_none() && peer_addr.is_none() {
            return lookup;
        }

        for (index, path) in self.paths.iter().enumerate() {
            let tuple = path.tuple();
            let peer_matches = match (peer_addr, tuple.peer_addr.as_ref()) {
                (Some(pattern), Some(addr)) => inet::partial_eq(pattern, addr),
                (None, None) => true,
                _ => false,
            };
            if !peer_matches {
                continue;
            }

            match tuple.local_addr.as_ref() {
                None => {
                    lookup.partial.get_or_insert(index);
                }
                Some(addr) => {
                    if local_addr.is_some_and(|local| inet::addr_eq(local, addr)) {
                        lookup.index = Some(index);
                        break;
                    }
                }
            }
        }

        lookup
    }

    /// Finds a path by address, falling back to a partial match when the
    /// local address is not known
    pub fn find_by_address(
        &self,
        local_addr: Option<&SocketAddr>,
        peer_addr: Option<&SocketAddr>,
    ) -> Option<usize> {
        let lookup = self.lookup_by_address(local_addr, peer_addr);
        let local_unknown = local_addr.map_or(true, inet::is_unspecified);
        match lookup.index {
            Some(index) => Some(index),
            None if local_unknown => lookup.partial,
            None => None,
        }
    }
}

impl Index<usize> for Manager {
    type Output = Path;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.paths[index]
    }
}

impl IndexMut<usize> for Manager {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.paths[index]
    }
}
