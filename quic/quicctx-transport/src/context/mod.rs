// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The endpoint-wide owner of connections.
//!
//! A [`Context`] is driven by a single event loop. The loop asks
//! [`Context::next_wake_time`] when to come back, services the connection
//! returned by [`Context::earliest_connection`] and drains queued stateless
//! packets. Connections never hold references to the context: every
//! operation on a connection borrows the shared tables for the duration of
//! one call.

use crate::{
    callback,
    config::{Config, CookieMode},
    connection::{
        Connection, InitialId, InternalConnectionId, InternalConnectionIdGenerator, LocalId,
        Parameters, Shared,
    },
    error::Error,
    id_tables::{IdTables, Route},
    scheduler::{self, Scheduler},
    store, tls,
};
use alloc::{
    boxed::Box,
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};
use bytes::Bytes;
use core::time::Duration;
use quicctx_core::{event, inet::SocketAddr, random, stateless_reset, time::Timestamp};
use smallvec::SmallVec;
use std::path::Path;

mod issued_tickets;
mod registered_tokens;

pub use issued_tickets::{IssuedTicket, IssuedTickets};
pub use registered_tokens::{RegisteredTokens, Registration};

#[cfg(test)]
mod tests;

/// The identifier tables are sized for this many entries per connection
const ID_TABLE_CAPACITY_FACTOR: usize = 4;

/// A packet sent outside of any connection, such as a version negotiation,
/// a stateless reset or a retry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatelessPacket {
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: SocketAddr,
    pub if_index: u32,
    pub bytes: Bytes,
}

/// The state every connection operation may borrow
struct Resources {
    id_tables: IdTables,
    scheduler: Scheduler,
    random: Box<dyn random::Generator>,
    subscriber: Box<dyn event::Subscriber>,
    tls: Box<dyn tls::Provider>,
    reset_seed: [u8; stateless_reset::LEN],
}

impl Resources {
    #[inline]
    fn shared(&mut self, now: Timestamp) -> Shared<'_> {
        Shared {
            id_tables: &mut self.id_tables,
            scheduler: &mut self.scheduler,
            random: &mut *self.random,
            subscriber: &mut *self.subscriber,
            tls: &mut *self.tls,
            reset_seed: &self.reset_seed,
            now,
        }
    }
}

pub struct Context {
    config: Config,
    resources: Resources,
    connections: BTreeMap<InternalConnectionId, Connection>,
    ids: InternalConnectionIdGenerator,
    retry_seed: [u8; 16],
    max_connections: u32,
    tentative_max_connections: u32,
    half_open: u32,
    check_token: bool,
    enforce_client_only: bool,
    default_callback: Option<callback::Handle>,
    stateless_packets: VecDeque<StatelessPacket>,
    issued_tickets: IssuedTickets,
    registered_tokens: RegisteredTokens,
    ticket_store: store::TicketStore,
    token_store: store::TokenStore,
    /// The latest time passed in by the event loop, used when dropping
    latest: Timestamp,
}

impl Context {
    pub fn new(
        mut config: Config,
        tls: Box<dyn tls::Provider>,
        mut random: Box<dyn random::Generator>,
        subscriber: Box<dyn event::Subscriber>,
    ) -> Self {
        config.max_connections = config.max_connections.max(1);
        let max_connections = config.max_connections;

        let reset_seed = config.reset_seed.unwrap_or_else(|| {
            let mut seed = [0; stateless_reset::LEN];
            random.private_random_fill(&mut seed);
            seed
        });
        let mut retry_seed = [0; 16];
        random.private_random_fill(&mut retry_seed);
        let mut hash_seed = [0; 16];
        random.private_random_fill(&mut hash_seed);

        let enforce_client_only = !tls.has_server_credentials();
        let check_token = config.cookie_mode.force_check_token;

        let id_tables = IdTables::new(
            hash_seed,
            max_connections as usize * ID_TABLE_CAPACITY_FACTOR,
        );

        tracing::debug!(max_connections, enforce_client_only, "context created");

        Self {
            config,
            resources: Resources {
                id_tables,
                scheduler: Scheduler::new(),
                random,
                subscriber,
                tls,
                reset_seed,
            },
            connections: BTreeMap::new(),
            ids: InternalConnectionIdGenerator::new(),
            retry_seed,
            max_connections,
            tentative_max_connections: max_connections,
            half_open: 0,
            check_token,
            enforce_client_only,
            default_callback: None,
            stateless_packets: VecDeque::new(),
            issued_tickets: IssuedTickets::default(),
            registered_tokens: RegisteredTokens::default(),
            ticket_store: store::TicketStore::new(),
            token_store: store::TokenStore::new(),
            latest: Timestamp::ZERO,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn id_tables(&self) -> &IdTables {
        &self.resources.id_tables
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.resources.scheduler
    }

    /// Keys the retry tokens handed out by this context
    #[inline]
    pub fn retry_seed(&self) -> &[u8; 16] {
        &self.retry_seed
    }

    #[inline]
    pub fn is_client_only(&self) -> bool {
        self.enforce_client_only
    }

    /// Refuses incoming connections, as an endpoint without server
    /// credentials does
    #[inline]
    pub fn set_client_only(&mut self, enabled: bool) {
        self.enforce_client_only = enabled;
    }

    // Connections

    /// Creates a connection with the context defaults.
    ///
    /// Servers are refused while the context is client only or at its
    /// connection limit. The default callback is attached when the
    /// parameters carry none.
    pub fn create_connection(
        &mut self,
        mut parameters: Parameters,
        now: Timestamp,
    ) -> Result<InternalConnectionId, Error> {
        self.observe(now);
        let is_server = parameters.endpoint_type.is_server();

        if is_server {
            if self.enforce_client_only {
                return Err(Error::ConnectionRefused);
            }
            if self.connections.len() >= self.tentative_max_connections as usize {
                tracing::debug!(
                    limit = self.tentative_max_connections,
                    "server connection refused at the connection limit"
                );
                return Err(Error::ConnectionRefused);
            }
        }

        if parameters.callback.is_none() {
            parameters.callback = self.default_callback.clone();
        }

        let id = self.ids.generate_id();
        let connection = parameters.build(id, &self.config, &mut self.resources.shared(now))?;

        if connection.is_half_open() {
            self.half_open += 1;
            self.update_check_token();
        }

        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Tears a connection down, reporting the close to the application if
    /// it was not disconnected yet
    pub fn delete_connection(&mut self, id: InternalConnectionId, now: Timestamp) -> Result<(), Error> {
        self.observe(now);
        let mut connection = self.connections.remove(&id).ok_or(Error::ConnectionNotFound)?;

        if connection.is_half_open {
            connection.is_half_open = false;
            self.half_open = self.half_open.saturating_sub(1);
            self.update_check_token();
        }

        connection.teardown(&mut self.resources.shared(now));

        if self.tentative_max_connections < self.max_connections
            && self.connections.len() <= self.tentative_max_connections as usize
        {
            self.max_connections = self.tentative_max_connections;
        }
        Ok(())
    }

    /// Deletes every connection, oldest first
    pub fn delete_all_connections(&mut self, now: Timestamp) {
        while let Some(id) = self.connections.keys().next().copied() {
            let _ = self.delete_connection(id, now);
        }
    }

    #[inline]
    pub fn connection(&self, id: InternalConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Runs `f` on a connection with the shared tables lent out.
    ///
    /// A server connection that completed its handshake during the call no
    /// longer counts as half open.
    pub fn with_connection<F, R>(
        &mut self,
        id: InternalConnectionId,
        now: Timestamp,
        f: F,
    ) -> Result<R, Error>
    where
        F: FnOnce(&mut Connection, &mut Shared) -> R,
    {
        self.observe(now);
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(Error::ConnectionNotFound)?;
        let result = f(connection, &mut self.resources.shared(now));

        if connection.is_half_open && connection.state().is_ready_or_false_start() {
            connection.is_half_open = false;
            self.half_open = self.half_open.saturating_sub(1);
            self.update_check_token();
        }

        Ok(result)
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = InternalConnectionId> + '_ {
        self.connections.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// The number of server connections that have not completed their
    /// handshake
    #[inline]
    pub fn half_open(&self) -> u32 {
        self.half_open
    }

    /// The callback attached to connections created without one
    pub fn set_default_callback(&mut self, callback: Option<callback::Handle>) {
        self.default_callback = callback;
    }

    /// Switches a connection to an algorithm of the context registry
    pub fn set_congestion_algorithm(
        &mut self,
        id: InternalConnectionId,
        name: &str,
        option: Option<&str>,
        now: Timestamp,
    ) -> Result<(), Error> {
        let algorithm = self
            .config
            .congestion()
            .get(name)
            .ok_or(Error::InvalidArgument)?;
        let option = option.map(Arc::from);
        self.with_connection(id, now, |connection, shared| {
            connection.set_congestion_algorithm(Some(algorithm), option, shared.now());
        })
    }

    // Routing

    #[inline]
    pub fn lookup_local_id(&self, id: &LocalId) -> Option<Route> {
        self.resources.id_tables.lookup_local_id(id)
    }

    #[inline]
    pub fn lookup_address(&self, addr: &SocketAddr) -> Option<Route> {
        self.resources.id_tables.lookup_address(addr)
    }

    #[inline]
    pub fn lookup_initial_id(
        &self,
        id: InitialId,
        addr: &SocketAddr,
    ) -> Option<InternalConnectionId> {
        self.resources.id_tables.lookup_initial_id(id, addr)
    }

    #[inline]
    pub fn lookup_secret(
        &self,
        secret: &stateless_reset::Secret,
        addr: &SocketAddr,
    ) -> Option<InternalConnectionId> {
        self.resources.id_tables.lookup_secret(secret, addr)
    }

    /// Handles an ICMP destination unreachable report.
    ///
    /// The connection is found by the destination ID of the packet that
    /// could not be delivered, or by the peer address when the ID is empty
    /// or unknown.
    pub fn notify_destination_unreachable_by_id(
        &mut self,
        local_id: Option<&LocalId>,
        local_addr: Option<&SocketAddr>,
        peer_addr: &SocketAddr,
        now: Timestamp,
    ) -> Result<(), Error> {
        let route = local_id
            .and_then(|id| self.lookup_local_id(id))
            .or_else(|| self.lookup_address(peer_addr))
            .ok_or(Error::ConnectionNotFound)?;

        self.with_connection(route.connection, now, |connection, shared| {
            connection.notify_destination_unreachable(local_addr, peer_addr, shared);
        })
    }

    // Wake scheduling

    /// The time the event loop should next call in. A queued stateless
    /// packet needs to go out immediately.
    pub fn next_wake_time(&self, now: Timestamp) -> Timestamp {
        if !self.stateless_packets.is_empty() {
            return now;
        }
        self.resources
            .scheduler
            .earliest_time()
            .unwrap_or(Timestamp::MAX)
    }

    /// The delay until [`Self::next_wake_time`], never longer than `cap`
    pub fn next_wake_delay(&self, now: Timestamp, cap: Duration) -> Duration {
        scheduler::next_wake_delay(now, self.next_wake_time(now), cap)
    }

    /// Runs the timers of every connection due at `now`, returning how many
    /// were serviced.
    ///
    /// Each due connection is serviced once, even if it schedules itself
    /// again at `now`.
    pub fn service_due_connections(&mut self, now: Timestamp) -> usize {
        self.observe(now);
        let due: SmallVec<[InternalConnectionId; 8]> = self
            .resources
            .scheduler
            .iter()
            .take_while(|&(time, _)| time <= now)
            .map(|(_, id)| id)
            .collect();

        for id in &due {
            if let Some(connection) = self.connections.get_mut(id) {
                connection.on_wakeup(&mut self.resources.shared(now));
            } else {
                // never leave a dead id behind
                self.resources.scheduler.remove(*id);
            }
        }
        due.len()
    }

    /// The connection due first, unless it is due after `max_time`
    #[inline]
    pub fn earliest_connection(&self, max_time: Option<Timestamp>) -> Option<InternalConnectionId> {
        self.resources.scheduler.earliest(max_time)
    }

    // Stateless packets

    pub fn queue_stateless_packet(&mut self, packet: StatelessPacket, now: Timestamp) {
        self.resources.subscriber.on_stateless_packet_queued(
            now,
            &event::StatelessPacketQueued {
                len: packet.bytes.len(),
                peer_addr: packet.peer_addr,
            },
        );
        self.stateless_packets.push_back(packet);
    }

    pub fn dequeue_stateless_packet(&mut self) -> Option<StatelessPacket> {
        self.stateless_packets.pop_front()
    }

    // Connection limits and retry tokens

    #[inline]
    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    /// Lowers the connection limit. New servers are refused at the lower
    /// limit right away, and it becomes the limit once enough connections
    /// have closed. Raising the limit is refused.
    pub fn adjust_max_connections(&mut self, max_connections: u32) -> Result<(), Error> {
        if max_connections > self.max_connections {
            return Err(Error::InvalidArgument);
        }
        self.tentative_max_connections = max_connections;
        if self.connections.len() <= max_connections as usize {
            self.max_connections = max_connections;
        }
        Ok(())
    }

    pub fn set_cookie_mode(&mut self, mode: CookieMode) {
        self.config.cookie_mode = mode;
        self.update_check_token();
    }

    #[inline]
    pub fn cookie_mode(&self) -> CookieMode {
        self.config.cookie_mode
    }

    /// Returns true if new server connections must present a retry token
    #[inline]
    pub fn is_token_check_required(&self) -> bool {
        self.check_token
    }

    fn update_check_token(&mut self) {
        let check_token = self.config.cookie_mode.force_check_token
            || self.half_open > self.config.max_half_open_before_retry;
        if check_token != self.check_token {
            tracing::debug!(check_token, half_open = self.half_open, "retry token check changed");
        }
        self.check_token = check_token;
    }

    // Tickets and tokens

    /// Remembers the path conditions of a connection a ticket was issued to
    pub fn remember_issued_ticket(&mut self, ticket_id: u64, rtt: Duration, cwin: u64, addr: &SocketAddr) {
        self.issued_tickets
            .remember(ticket_id, rtt, cwin, addr, self.max_connections as usize);
    }

    #[inline]
    pub fn retrieve_issued_ticket(&self, ticket_id: u64) -> Option<&IssuedTicket> {
        self.issued_tickets.get(ticket_id)
    }

    /// Registers an address validation token, failing if it was already
    /// presented before
    pub fn check_token_reuse(&mut self, token: &[u8], expiry: Timestamp, now: Timestamp) -> Result<(), Error> {
        match self.registered_tokens.register(token, expiry) {
            Some(Registration::Fresh) => Ok(()),
            Some(Registration::Reused { count }) => {
                self.resources.subscriber.on_token_reuse_detected(
                    now,
                    &event::TokenReuseDetected { expiry, count },
                );
                Err(Error::TokenReused)
            }
            None => Err(Error::InvalidArgument),
        }
    }

    /// Forgets registered tokens that expire before `expiry_max`
    pub fn clear_registered_tokens(&mut self, expiry_max: Timestamp) {
        self.registered_tokens.clear(expiry_max);
    }

    #[inline]
    pub fn ticket_store(&self) -> &store::TicketStore {
        &self.ticket_store
    }

    #[inline]
    pub fn ticket_store_mut(&mut self) -> &mut store::TicketStore {
        &mut self.ticket_store
    }

    #[inline]
    pub fn token_store(&self) -> &store::TokenStore {
        &self.token_store
    }

    #[inline]
    pub fn token_store_mut(&mut self) -> &mut store::TokenStore {
        &mut self.token_store
    }

    pub fn load_tickets(&mut self, path: impl AsRef<Path>, now: Timestamp) -> Result<usize, store::Error> {
        self.ticket_store.load(path, now)
    }

    pub fn save_tickets(&self, path: impl AsRef<Path>) -> Result<(), store::Error> {
        self.ticket_store.save(path)
    }

    pub fn load_tokens(&mut self, path: impl AsRef<Path>, now: Timestamp) -> Result<usize, store::Error> {
        self.token_store.load(path, now)
    }

    pub fn save_tokens(&self, path: impl AsRef<Path>) -> Result<(), store::Error> {
        self.token_store.save(path)
    }

    #[inline]
    fn observe(&mut self, now: Timestamp) {
        self.latest = self.latest.max(now);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let now = self.latest;
        self.delete_all_connections(now);
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("connections", &self.connections.len())
            .field("max_connections", &self.max_connections)
            .field("half_open", &self.half_open)
            .field("check_token", &self.check_token)
            .field("stateless_packets", &self.stateless_packets.len())
            .finish()
    }
}
