// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Maps wire-visible identifiers to connections.
//!
//! Four independent tables are kept:
//!
//! * local connection ID to connection and path id
//! * peer address to connection and path, used when local IDs are empty
//! * initial connection ID and client address to a server connection
//! * stateless reset secret and peer address to a connection
//!
//! All tables hash with SipHash-1-3 keyed by a per-context random seed, so
//! an off-path attacker cannot predict bucket placement.

use crate::connection::InternalConnectionId;
use core::hash::BuildHasher;
use hashbrown::hash_map::{Entry, HashMap};
use quicctx_core::{
    connection::{InitialId, LocalId},
    inet::{IpAddr, SocketAddr},
    stateless_reset,
};
use siphasher::{
    sip::SipHasher13,
    sip128::{self, Hasher128},
};

#[cfg(test)]
mod tests;

/// Builds SipHash-1-3 hashers keyed by the context hash seed
#[derive(Clone, Copy, Debug)]
pub struct SeededState {
    k0: u64,
    k1: u64,
}

impl SeededState {
    pub fn new(seed: [u8; 16]) -> Self {
        let mut k0 = [0; 8];
        let mut k1 = [0; 8];
        k0.copy_from_slice(&seed[..8]);
        k1.copy_from_slice(&seed[8..]);
        Self {
            k0: u64::from_le_bytes(k0),
            k1: u64::from_le_bytes(k1),
        }
    }
}

impl BuildHasher for SeededState {
    type Hasher = SipHasher13;

    #[inline]
    fn build_hasher(&self) -> SipHasher13 {
        SipHasher13::new_with_keys(self.k0, self.k1)
    }
}

/// The part of a socket address that identifies a network path.
///
/// IPv6 flow labels and scope ids are not part of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressKey {
    ip: IpAddr,
    port: u16,
}

impl From<&SocketAddr> for AddressKey {
    #[inline]
    fn from(addr: &SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl From<SocketAddr> for AddressKey {
    #[inline]
    fn from(addr: SocketAddr) -> Self {
        (&addr).into()
    }
}

/// The owner of a local ID or address registration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub connection: InternalConnectionId,
    /// The unique id of the path the registration belongs to
    pub path_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum RegistrationError {
    /// The local connection ID is registered by another owner
    LocalIdInUse,
    /// The peer address is registered by another owner
    AddressInUse,
    /// The initial connection ID and address are registered by another connection
    InitialIdInUse,
    /// The reset secret and address are registered by another connection
    SecretInUse,
}

type Table<K, V> = HashMap<K, V, SeededState>;

#[derive(Debug)]
pub struct IdTables {
    by_local_id: Table<LocalId, Route>,
    by_address: Table<AddressKey, Route>,
    by_initial_id: Table<(InitialId, AddressKey), InternalConnectionId>,
    by_secret: Table<(stateless_reset::Secret, AddressKey), InternalConnectionId>,
}

fn try_insert<K, V>(table: &mut Table<K, V>, key: K, value: V) -> Result<(), ()>
where
    K: Eq + core::hash::Hash,
{
    match table.entry(key) {
        Entry::Occupied(_) => Err(()),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

fn remove_owned<K, V, F>(table: &mut Table<K, V>, key: K, is_owner: F) -> Option<V>
where
    K: Eq + core::hash::Hash,
    F: FnOnce(&V) -> bool,
{
    match table.entry(key) {
        Entry::Occupied(entry) if is_owner(entry.get()) => Some(entry.remove()),
        _ => None,
    }
}

impl IdTables {
    /// Creates the tables, sized for `capacity` entries each
    pub fn new(seed: [u8; 16], capacity: usize) -> Self {
        let state = SeededState::new(seed);
        Self {
            by_local_id: HashMap::with_capacity_and_hasher(capacity, state),
            by_address: HashMap::with_capacity_and_hasher(capacity, state),
            by_initial_id: HashMap::with_capacity_and_hasher(capacity, state),
            by_secret: HashMap::with_capacity_and_hasher(capacity, state),
        }
    }

    pub fn register_local_id(&mut self, id: LocalId, route: Route) -> Result<(), RegistrationError> {
        try_insert(&mut self.by_local_id, id, route).map_err(|_| RegistrationError::LocalIdInUse)
    }

    /// Removes a local ID registration. Does nothing if `connection` does not own it.
    pub fn unregister_local_id(
        &mut self,
        id: &LocalId,
        connection: InternalConnectionId,
    ) -> Option<Route> {
        remove_owned(&mut self.by_local_id, *id, |route| route.connection == connection)
    }

    #[inline]
    pub fn lookup_local_id(&self, id: &LocalId) -> Option<Route> {
        self.by_local_id.get(id).copied()
    }

    pub fn register_address(
        &mut self,
        addr: &SocketAddr,
        route: Route,
    ) -> Result<(), RegistrationError> {
        try_insert(&mut self.by_address, addr.into(), route)
            .map_err(|_| RegistrationError::AddressInUse)
    }

    /// Removes an address registration owned by the given path
    pub fn unregister_address(&mut self, addr: &SocketAddr, owner: Route) -> Option<Route> {
        remove_owned(&mut self.by_address, addr.into(), |route| *route == owner)
    }

    #[inline]
    pub fn lookup_address(&self, addr: &SocketAddr) -> Option<Route> {
        self.by_address.get(&AddressKey::from(addr)).copied()
    }

    pub fn register_initial_id(
        &mut self,
        id: InitialId,
        addr: &SocketAddr,
        connection: InternalConnectionId,
    ) -> Result<(), RegistrationError> {
        try_insert(&mut self.by_initial_id, (id, addr.into()), connection)
            .map_err(|_| RegistrationError::InitialIdInUse)
    }

    pub fn unregister_initial_id(
        &mut self,
        id: InitialId,
        addr: &SocketAddr,
        connection: InternalConnectionId,
    ) -> Option<InternalConnectionId> {
        remove_owned(&mut self.by_initial_id, (id, addr.into()), |owner| {
            *owner == connection
        })
    }

    #[inline]
    pub fn lookup_initial_id(&self, id: InitialId, addr: &SocketAddr) -> Option<InternalConnectionId> {
        self.by_initial_id.get(&(id, AddressKey::from(addr))).copied()
    }

    pub fn register_secret(
        &mut self,
        secret: stateless_reset::Secret,
        addr: &SocketAddr,
        connection: InternalConnectionId,
    ) -> Result<(), RegistrationError> {
        try_insert(&mut self.by_secret, (secret, addr.into()), connection)
            .map_err(|_| RegistrationError::SecretInUse)
    }

    pub fn unregister_secret(
        &mut self,
        secret: stateless_reset::Secret,
        addr: &SocketAddr,
        connection: InternalConnectionId,
    ) -> Option<InternalConnectionId> {
        remove_owned(&mut self.by_secret, (secret, addr.into()), |owner| {
            *owner == connection
        })
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.3.1
    //# When comparing a datagram to stateless reset token values, endpoints
    //# MUST perform the comparison without leaking information about the
    //# value of the token.
    // The secret is hashed in full before any comparison and the final key
    // comparison uses the constant time `PartialEq` of `Secret`.
    #[inline]
    pub fn lookup_secret(
        &self,
        secret: &stateless_reset::Secret,
        addr: &SocketAddr,
    ) -> Option<InternalConnectionId> {
        self.by_secret.get(&(*secret, AddressKey::from(addr))).copied()
    }

    /// Returns the number of entries in each table, in declaration order
    pub fn len(&self) -> [usize; 4] {
        [
            self.by_local_id.len(),
            self.by_address.len(),
            self.by_initial_id.len(),
            self.by_secret.len(),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == [0; 4]
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.3.2
//# An endpoint could use HMAC [RFC2104] (for example, HMAC(static_key,
//# connection_id)) or the HMAC-based Key Derivation Function (HKDF)
//# [RFC5869] (for example, using the static key as input keying
//# material, with the connection ID as salt) to derive the stateless
//# reset token.
/// Derives the stateless reset token of a local ID from the context reset seed
pub fn stateless_reset_token(
    seed: &[u8; stateless_reset::LEN],
    id: &LocalId,
) -> stateless_reset::Secret {
    use core::hash::Hasher;

    let mut hasher = sip128::SipHasher13::new_with_key(seed);
    hasher.write(id.as_bytes());
    stateless_reset::Secret::new(hasher.finish128().as_bytes())
}
