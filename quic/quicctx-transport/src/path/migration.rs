// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Path creation, validation, migration and deletion.
//!
//! Paths are addressed by index while an operation runs and by unique id
//! across calls, since deleting a path compacts the array.

use super::{quality, Path, Tuple};
use crate::{
    callback::Event,
    config::MAX_PATHS,
    connection::{
        local_id_registry,
        misc_frames::FrameKind,
        peer_id_stash::{AddOutcome, StashError},
        Connection, LocalId, PeerId, Shared, State,
    },
    error::Error,
    id_tables::Route,
};
use quicctx_core::{
    event::{self, ConnectionIdSource},
    inet::{Family, SocketAddr},
    packet::PacketNumberSpace,
    stateless_reset,
    time::Timestamp,
    transport,
};
use smallvec::SmallVec;


//= https://www.rfc-editor.org/rfc/rfc9000#section-19.17
//# Endpoints can use PATH_CHALLENGE frames (type=0x1a) to check
//# reachability to the peer and for path validation during connection
//# migration.
pub const PATH_CHALLENGE_FRAME_TYPE: u64 = 0x1a;

pub const NEW_CONNECTION_ID_FRAME_TYPE: u64 = 0x18;

/// The addresses of a path, as reported to the application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathAddresses {
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
    pub if_index: u32,
}

impl Connection {
    /// Creates a path and returns its index
    pub(crate) fn create_path(
        &mut self,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
        if_index: u32,
        requested_id: Option<u64>,
        shared: &mut Shared,
    ) -> Result<usize, Error> {
        if self.paths.len() >= MAX_PATHS {
            return Err(Error::PathLimitExceeded);
        }

        let unique_id = self
            .paths
            .allocate_unique_id(requested_id, self.is_multipath_enabled, &self.peer_ids)
            .ok_or(Error::PathIdBlocked)?;

        let now = shared.now;
        let thresholds = quality::Thresholds::new(
            self.settings.rtt_update_delta,
            self.settings.pacing_rate_update_delta,
        );
        let mut path = Path::new(unique_id, local_addr, peer_addr, if_index, thresholds, now);
        if let Some(algorithm) = &self.congestion_algorithm {
            algorithm.init(
                &mut path.recovery,
                self.settings.congestion_option.as_deref(),
                now,
            );
        }
        let index = self.paths.push(path);

        let peer_addr =
            peer_addr.unwrap_or_else(|| Family::of_optional(local_addr.as_ref()).unspecified());
        shared.subscriber.on_path_created(
            &self.meta(now),
            &event::PathCreated {
                unique_id,
                peer_addr,
            },
        );

        self.set_path_challenge(index, shared);
        Ok(index)
    }

    /// Routes the peer address of a path to this connection.
    ///
    /// Only needed when local IDs are empty, since packets then carry
    /// nothing else to find the connection with.
    pub(crate) fn register_path(&mut self, index: usize, shared: &mut Shared) {
        if self.local_ids.id_len() != 0 {
            return;
        }
        let path = &self.paths[index];
        let Some(peer_addr) = path.peer_addr() else {
            return;
        };
        if path.registered_addr.is_some() {
            return;
        }

        let route = self.route(path.unique_id());
        match shared.id_tables.register_address(&peer_addr, route) {
            Ok(()) => self.paths[index].registered_addr = Some(peer_addr),
            Err(error) => {
                tracing::debug!(
                    connection = %self.id,
                    unique_id = route.path_id,
                    %peer_addr,
                    ?error,
                    "peer address already routed to another path"
                );
            }
        }
    }

    /// Removes the path at `index`, compacting the path array
    pub(crate) fn delete_path(&mut self, index: usize, shared: &mut Shared) {
        let now = shared.now;
        let unique_id = self.paths[index].unique_id();

        {
            let path = &mut self.paths[index];
            path.packets.reset();
            path.acks.reset(now);
        }
        self.streams.clear_path_affinity(unique_id);

        if self.settings.path_callbacks {
            let event = Event::PathDeleted(self.path_event(index));
            if self.notify(event).is_err() {
                self.connection_error(
                    transport::Error::INTERNAL_ERROR.with_reason("path deleted callback failed"),
                    shared,
                );
            }
        }

        for space in self.packet_spaces.iter_mut() {
            space.clear_send_path(unique_id);
        }

        if self.is_multipath_enabled {
            self.local_ids.delete_list(unique_id, shared.id_tables);
        }

        let mut path = self.paths.remove(index);
        if let Some(addr) = path.registered_addr.take() {
            shared
                .id_tables
                .unregister_address(&addr, self.route(unique_id));
        }
        if let Some(algorithm) = &self.congestion_algorithm {
            algorithm.delete(&mut path.recovery);
        }

        shared
            .subscriber
            .on_path_deleted(&self.meta(now), &event::PathDeleted { unique_id });
    }

    /// Drops the references the tuples of a path hold on peer IDs.
    ///
    /// IDs left without a reference are retired, unless the connection is
    /// being deleted, in which case they are removed outright.
    pub(crate) fn release_peer_ids(&mut self, index: usize, deleting: bool, shared: &mut Shared) {
        let stash_id = self.id_space(self.paths[index].unique_id());
        let sequences: SmallVec<[u64; 2]> = self.paths[index]
            .tuples
            .iter_mut()
            .filter_map(|tuple| tuple.peer_id.take())
            .collect();

        for sequence in sequences {
            self.release_peer_id(stash_id, sequence, deleting, shared);
        }
    }

    fn release_peer_id(&mut self, stash_id: u64, sequence: u64, deleting: bool, shared: &mut Shared) {
        let Some(stash) = self.peer_ids.get_mut(stash_id) else {
            return;
        };
        if let Some(sequence) = stash.release(sequence, deleting).retire {
            self.queue_retire_connection_id(stash_id, sequence, shared);
        }
    }

    fn queue_retire_connection_id(&mut self, stash_id: u64, sequence: u64, shared: &mut Shared) {
        let path_id = self.is_multipath_enabled.then_some(stash_id);
        self.queue_frame(
            FrameKind::RetireConnectionId { path_id, sequence },
            PacketNumberSpace::ApplicationData,
            shared,
        );
        shared.subscriber.on_connection_id_retired(
            &self.meta(shared.now),
            &event::ConnectionIdRetired {
                source: ConnectionIdSource::Peer,
                path_id: stash_id,
                sequence,
            },
        );
    }

    /// Demotes failed and idle paths, then deletes the demoted paths whose
    /// grace period ended.
    ///
    /// The surviving paths keep their relative order. Returns the next time
    /// a demoted path must be deleted, and wakes the connection by then.
    pub fn delete_abandoned_paths(&mut self, shared: &mut Shared) -> Option<Timestamp> {
        let now = shared.now;
        let idle_timeout = self.idle_timeout();

        // without multipath the default path is only replaced by migration
        let start = if self.is_multipath_enabled && self.paths.len() > 1 {
            0
        } else {
            1
        };
        let mut good = start;
        let mut current = start;

        while current < self.paths.len() {
            let path = &self.paths[current];
            if !path.is_demoted() {
                let challenge = &path.tuple().challenge;
                let is_idle = current > 0
                    && challenge.verified
                    && idle_timeout.is_some_and(|timeout| {
                        now.saturating_duration_since(path.latest_sent_time) >= timeout
                    });
                if challenge.failed || is_idle {
                    self.demote_path(current, 0, shared);
                }
            }

            let is_expired = self.paths[current]
                .demotion_deadline()
                .is_some_and(|deadline| now >= deadline);
            if !is_expired {
                if current > good {
                    self.paths.swap(current, good);
                }
                good += 1;
            }
            current += 1;
        }

        let keep = good.max(1);
        let is_deleting = self.paths.len() > keep;
        while self.paths.len() > keep {
            let index = self.paths.len() - 1;
            self.release_peer_ids(index, false, shared);
            self.delete_path(index, shared);
        }
        if is_deleting {
            self.test_and_signal_new_path_allowed();
        }

        let is_demotion_in_progress = self.paths.iter().skip(start).any(Path::is_demoted);
        self.path_demotion_needed = is_deleting || is_demotion_in_progress;

        if self.is_multipath_enabled && self.paths.len() > 1 && self.paths[0].is_demoted() {
            let found = self.paths.iter().position(|path| !path.is_demoted());
            if let Some(index) = found {
                self.paths.swap(0, index);
            }
        }

        if is_demotion_in_progress && self.is_multipath_enabled {
            self.promote_backup_path(shared);
        }

        let next = self.paths.next_demotion_deadline(now);
        if let Some(next) = next {
            self.wake_no_later_than(next, shared.scheduler);
        }
        next
    }

    /// Makes a backup path available when no other usable path is left
    fn promote_backup_path(&mut self, shared: &mut Shared) {
        let has_available = self
            .paths
            .iter()
            .any(|path| !path.is_demoted() && !path.is_backup);
        if has_available {
            return;
        }
        let Some(index) = self
            .paths
            .iter()
            .position(|path| !path.is_demoted() && path.is_backup)
        else {
            return;
        };

        let path = &mut self.paths[index];
        path.is_backup = false;
        let unique_id = path.unique_id();
        self.queue_frame(
            FrameKind::PathStatus {
                path_id: unique_id,
                available: true,
            },
            PacketNumberSpace::ApplicationData,
            shared,
        );
        shared
            .subscriber
            .on_path_promoted(&self.meta(shared.now), &event::PathPromoted { unique_id });
    }

    /// Starts the grace period of a path.
    ///
    /// With multipath the peer is told the path is abandoned, and the
    /// default path is swapped with another one first. The default path
    /// itself is never abandoned.
    ///
    /// When no other path holds a peer connection ID the default path stays
    /// demoted and keeps carrying traffic; the refusal is only reported
    /// through `on_path_demotion_refused`.
    pub fn demote_path(&mut self, index: usize, reason: u64, shared: &mut Shared) {
        let now = shared.now;
        let is_multipath = self.is_multipath_enabled;

        let path = &mut self.paths[index];
        let deadline = path.demotion_deadline_from(now, is_multipath);
        if !path.demote(deadline) {
            return;
        }
        let unique_id = path.unique_id();
        self.path_demotion_needed = true;
        self.wake_no_later_than(deadline, shared.scheduler);
        shared.subscriber.on_path_demoted(
            &self.meta(now),
            &event::PathDemoted {
                unique_id,
                reason,
                deadline,
            },
        );

        if !is_multipath {
            return;
        }

        let mut index = index;
        if index == 0 {
            let candidate = (1..self.paths.len())
                .filter(|&i| self.paths[i].tuple().peer_id.is_some())
                .min_by_key(|&i| self.paths[i].is_demoted());
            if let Some(candidate) = candidate {
                self.paths.swap(0, candidate);
                index = candidate;
            }
        }

        if index == 0 {
            tracing::warn!(
                connection = %self.id,
                unique_id,
                "refused to demote the only path with a peer connection id"
            );
            shared.subscriber.on_path_demotion_refused(
                &self.meta(now),
                &event::PathDemotionRefused { unique_id },
            );
            return;
        }

        let path = &mut self.paths[index];
        if path.abandon_sent {
            return;
        }
        path.abandon_sent = true;
        for tuple in path.tuples.iter_mut() {
            tuple.peer_id = None;
        }
        self.peer_ids.remove(unique_id);
        self.queue_frame(
            FrameKind::PathAbandon {
                path_id: unique_id,
                reason,
            },
            PacketNumberSpace::ApplicationData,
            shared,
        );
    }

    /// Requires the current tuple of a path to be validated again
    pub(crate) fn set_path_challenge(&mut self, index: usize, shared: &mut Shared) {
        let constant = self.settings.constant_challenges;
        let challenge = &mut self.paths[index].tuple_mut().challenge;
        if challenge.required && !challenge.verified {
            return;
        }

        let was_verified = challenge.verified;
        challenge.required = true;
        challenge.reset(shared.now, constant, &mut *shared.random);
        challenge.verified = false;

        if was_verified && self.settings.path_callbacks {
            let event = Event::PathSuspended(self.path_event(index));
            if self.notify(event).is_err() {
                self.connection_error(
                    transport::Error::INTERNAL_ERROR
                        .with_frame_type(PATH_CHALLENGE_FRAME_TYPE)
                        .with_reason("path suspended callback failed"),
                    shared,
                );
            }
        }
    }

    /// Returns the index of the path whose current tuple matches the
    /// addresses, see [`Manager::find_by_address`](super::Manager::find_by_address)
    #[inline]
    pub fn find_path_by_address(
        &self,
        local_addr: Option<&SocketAddr>,
        peer_addr: Option<&SocketAddr>,
    ) -> Option<usize> {
        self.paths.find_by_address(local_addr, peer_addr)
    }

    /// Handles an ICMP destination unreachable report for a pair of addresses.
    ///
    /// The matching path is demoted, unless every path is already demoted.
    /// In that case a ready connection validates the path again instead,
    /// since the report could be forged.
    pub fn notify_destination_unreachable(
        &mut self,
        local_addr: Option<&SocketAddr>,
        peer_addr: &SocketAddr,
        shared: &mut Shared,
    ) {
        let Some(index) = self.find_path_by_address(local_addr, Some(peer_addr)) else {
            return;
        };

        if self.paths.all_demoted() {
            if self.state == State::Ready {
                self.set_path_challenge(index, shared);
            }
            return;
        }

        tracing::debug!(
            connection = %self.id,
            unique_id = self.paths[index].unique_id(),
            %peer_addr,
            "demoting unreachable path"
        );
        self.demote_path(index, 0, shared);
    }

    /// Binds an unused peer ID to a tuple of a path
    fn assign_peer_id(&mut self, index: usize, tuple_index: usize) -> Result<(), Error> {
        let stash_id = self.id_space(self.paths[index].unique_id());
        let blocked = if self.is_multipath_enabled {
            Error::PathConnectionIdBlocked
        } else {
            Error::ConnectionIdNotAvailable
        };

        let stash = self.peer_ids.get_mut(stash_id).ok_or(blocked)?;
        let sequence = stash.obtain().map(|entry| entry.sequence).ok_or(blocked)?;
        stash.reference(sequence);
        stash.in_use = true;
        self.paths[index].tuples[tuple_index].peer_id = Some(sequence);
        Ok(())
    }

    /// Checks that the stash `stash_id` can provide an ID to a new tuple
    fn check_peer_id_available(&self, stash_id: Option<u64>) -> Result<(), Error> {
        if stash_id.and_then(|id| self.peer_ids.obtain(id)).is_some() {
            return Ok(());
        }
        if !self.is_multipath_enabled {
            return Err(Error::ConnectionIdNotAvailable);
        }
        if self.paths.next_unique_id() > self.max_path_id_remote {
            Err(Error::PathIdBlocked)
        } else {
            Err(Error::PathConnectionIdBlocked)
        }
    }

    /// Checks whether a new path could be opened now
    pub fn check_new_path_allowed(&self, to_preferred_address: bool) -> Result<(), Error> {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# disable_active_migration (0x0c):  The disable active migration
        //#    transport parameter is included if the endpoint does not support
        //#    active connection migration (Section 9) on the address being used
        //#    during the handshake.
        if (self.remote_parameters.migration_disabled && !to_preferred_address)
            || self.local_parameters.migration_disabled
        {
            return Err(Error::MigrationDisabled);
        }
        if self.state < State::ClientAlmostReady {
            return Err(Error::PathNotReady);
        }
        if self.paths.len() >= MAX_PATHS {
            return Err(Error::PathLimitExceeded);
        }

        let stash_id = if self.is_multipath_enabled {
            self.peer_ids.first_idle()
        } else {
            Some(0)
        };
        self.check_peer_id_available(stash_id)
    }

    /// Asks for an [`Event::NextPathAllowed`] once a new path can be opened.
    ///
    /// Returns true if a path can already be opened, in which case no event
    /// follows. Permanent refusals are returned as errors.
    pub fn subscribe_new_path_allowed(&mut self) -> Result<bool, Error> {
        self.is_path_allowed_notified = false;
        match self.check_new_path_allowed(false) {
            Ok(()) => {
                self.is_path_allowed_subscribed = false;
                Ok(true)
            }
            Err(error) if error.is_transient() => {
                self.is_path_allowed_subscribed = true;
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    pub(crate) fn test_and_signal_new_path_allowed(&mut self) {
        if !self.is_path_allowed_subscribed || self.is_path_allowed_notified {
            return;
        }
        if self.check_new_path_allowed(false).is_ok() {
            self.is_path_allowed_notified = true;
            // the subscription is fulfilled either way
            let _ = self.notify(Event::NextPathAllowed);
        }
    }

    /// Completes a partial address pair from the existing paths
    fn resolve_tuple(
        &self,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
        if_index: u32,
    ) -> Result<(Option<SocketAddr>, SocketAddr, u32), Error> {
        match (local_addr, peer_addr) {
            (None, None) => Err(Error::UnexpectedAddress),
            (Some(local_addr), None) => {
                let family = Family::of(&local_addr);
                self.paths
                    .iter()
                    .map(Path::tuple)
                    .find_map(|tuple| {
                        tuple
                            .peer_addr
                            .filter(|addr| Family::of(addr) == family)
                            .map(|addr| (Some(local_addr), addr, tuple.if_index))
                    })
                    .ok_or(Error::UnexpectedAddress)
            }
            (None, Some(peer_addr)) => {
                let family = Family::of(&peer_addr);
                let resolved = self
                    .paths
                    .iter()
                    .map(Path::tuple)
                    .find_map(|tuple| {
                        tuple
                            .local_addr
                            .filter(|addr| Family::of(addr) == family)
                            .map(|addr| (Some(addr), peer_addr, tuple.if_index))
                    })
                    .unwrap_or((None, peer_addr, if_index));
                Ok(resolved)
            }
            (Some(local_addr), Some(peer_addr)) => {
                if Family::of(&local_addr) != Family::of(&peer_addr) {
                    return Err(Error::AddressFamilyMismatch);
                }
                Ok((Some(local_addr), peer_addr, if_index))
            }
        }
    }

    /// Adds a tuple to an existing path and starts validating it
    fn probe_new_tuple(
        &mut self,
        index: usize,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
        if_index: u32,
        to_preferred_address: bool,
        shared: &mut Shared,
    ) -> Result<u64, Error> {
        let (local_addr, peer_addr, if_index) =
            self.resolve_tuple(local_addr, peer_addr, if_index)?;
        let unique_id = self.paths[index].unique_id();
        self.check_peer_id_available(Some(self.id_space(unique_id)))?;

        let mut tuple = Tuple::new(local_addr, Some(peer_addr), if_index);
        tuple.challenge.reset(
            shared.now,
            self.settings.constant_challenges,
            &mut *shared.random,
        );
        tuple.challenge.required = true;
        tuple.to_preferred_address = to_preferred_address;
        self.paths[index].push_tuple(tuple);

        let tuple_index = self.paths[index].tuples.len() - 1;
        if let Err(error) = self.assign_peer_id(index, tuple_index) {
            self.paths[index].tuples.pop();
            return Err(error);
        }

        self.reinsert(shared.scheduler, shared.now);
        Ok(unique_id)
    }

    /// Starts validating a new address pair.
    ///
    /// With multipath this opens a new path. Otherwise, or when migrating
    /// to the preferred address of the server, the pair is added to the
    /// default path. Returns the unique id of the path that was probed.
    pub fn probe_new_path(
        &mut self,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
        if_index: u32,
        to_preferred_address: bool,
        shared: &mut Shared,
    ) -> Result<u64, Error> {
        if !self.is_multipath_enabled || to_preferred_address {
            return self.probe_new_tuple(
                0,
                local_addr,
                peer_addr,
                if_index,
                to_preferred_address,
                shared,
            );
        }

        self.check_new_path_allowed(to_preferred_address)?;
        let (local_addr, peer_addr, if_index) =
            self.resolve_tuple(local_addr, peer_addr, if_index)?;

        let index = self.create_path(local_addr, Some(peer_addr), if_index, None, shared)?;
        if let Err(error) = self.assign_peer_id(index, 0) {
            self.delete_path(index, shared);
            return Err(error);
        }

        self.paths[index].is_published = true;
        self.register_path(index, shared);
        self.set_path_challenge(index, shared);
        self.paths[index].is_nat_challenge = false;
        self.reinsert(shared.scheduler, shared.now);

        Ok(self.paths[index].unique_id())
    }

    /// Asks the peer to stop using a path.
    ///
    /// A path id that has local IDs but no path yet has its IDs retired.
    pub fn abandon_path(&mut self, unique_id: u64, reason: u64, shared: &mut Shared) -> Result<(), Error> {
        if !self.is_multipath_enabled {
            return Err(Error::MultipathNotEnabled);
        }
        if unique_id > self.max_path_id_remote || unique_id > self.max_path_id_local {
            return Err(Error::PathIdOutOfRange);
        }

        let Some(index) = self.paths.index_of(unique_id) else {
            self.demote_local_id_list(unique_id, reason, shared);
            return Ok(());
        };

        let path = &self.paths[index];
        if path.is_demoted() {
            return Ok(());
        }
        let has_other = self
            .paths
            .iter()
            .any(|other| other.unique_id() != unique_id && !other.is_demoted());
        if !has_other {
            return Err(Error::LastPath);
        }

        self.demote_path(index, reason, shared);
        Ok(())
    }

    /// Abandons a path id no path uses yet
    fn demote_local_id_list(&mut self, path_id: u64, reason: u64, shared: &mut Shared) {
        let Some(list) = self.local_ids.list_mut(path_id) else {
            return;
        };
        if list.is_demoted {
            return;
        }
        list.is_demoted = true;

        self.peer_ids.remove(path_id);
        self.queue_frame(
            FrameKind::PathAbandon { path_id, reason },
            PacketNumberSpace::ApplicationData,
            shared,
        );
    }

    pub fn set_app_path_ctx(&mut self, unique_id: u64, app_path_ctx: u64) -> Result<(), Error> {
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        self.paths[index].app_path_ctx = app_path_ctx;
        Ok(())
    }

    /// Sends a stream on one path only, or on any path with `None`
    pub fn set_stream_path_affinity(
        &mut self,
        stream_id: quicctx_core::stream::StreamId,
        unique_id: Option<u64>,
    ) -> Result<(), Error> {
        if let Some(unique_id) = unique_id {
            self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        }
        self.streams.set_path_affinity(stream_id, unique_id)
    }

    /// Marks a path as a backup or as available, and tells the peer
    pub fn set_path_status(
        &mut self,
        unique_id: u64,
        is_available: bool,
        shared: &mut Shared,
    ) -> Result<(), Error> {
        if !self.is_multipath_enabled {
            return Err(Error::MultipathNotEnabled);
        }
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        self.paths[index].is_backup = !is_available;
        self.queue_frame(
            FrameKind::PathStatus {
                path_id: unique_id,
                available: is_available,
            },
            PacketNumberSpace::ApplicationData,
            shared,
        );
        Ok(())
    }

    pub fn path_addresses(&self, unique_id: u64) -> Result<PathAddresses, Error> {
        let path = self.paths.by_unique_id(unique_id).ok_or(Error::PathNotFound)?;
        let tuple = path.tuple();
        Ok(PathAddresses {
            local_addr: tuple.local_addr,
            peer_addr: tuple.peer_addr,
            if_index: tuple.if_index,
        })
    }

    pub fn reset_path_mtu(&mut self, unique_id: u64) -> Result<(), Error> {
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        self.paths[index].reset_mtu();
        Ok(())
    }

    /// Moves a path to a fresh peer ID
    pub fn refresh_path_connection_id(&mut self, unique_id: u64, shared: &mut Shared) -> Result<(), Error> {
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        self.renew_connection_id(index, shared)
    }

    /// Replaces the peer ID of the current tuple of a path
    pub(crate) fn renew_connection_id(&mut self, index: usize, shared: &mut Shared) -> Result<(), Error> {
        let stash_id = self.id_space(self.paths[index].unique_id());
        let current = self.paths[index].tuple().peer_id;
        let stash = self
            .peer_ids
            .get(stash_id)
            .ok_or(Error::ConnectionIdNotAvailable)?;

        let is_current_valid = current.is_some_and(|sequence| sequence >= stash.retire_before());
        if (self.remote_parameters.migration_disabled && is_current_valid)
            || self.local_parameters.migration_disabled
        {
            return Err(Error::MigrationDisabled);
        }

        let next = stash
            .obtain()
            .map(|entry| entry.sequence)
            .ok_or(Error::ConnectionIdNotAvailable)?;
        if Some(next) == current {
            return Err(Error::ConnectionIdNotAvailable);
        }

        if let Some(sequence) = self.paths[index].tuple_mut().peer_id.take() {
            self.release_peer_id(stash_id, sequence, false, shared);
        }
        if let Some(stash) = self.peer_ids.get_mut(stash_id) {
            stash.reference(next);
        }
        self.paths[index].tuple_mut().peer_id = Some(next);

        if index == 0 {
            self.register_reset_secret(shared);
        }
        Ok(())
    }

    /// Handles a NEW_CONNECTION_ID frame.
    ///
    /// Protocol violations close the connection and are returned.
    pub fn on_new_connection_id(
        &mut self,
        path_id: u64,
        sequence: u64,
        retire_prior_to: u64,
        id: PeerId,
        secret: stateless_reset::Secret,
        shared: &mut Shared,
    ) -> Result<AddOutcome, Error> {
        self.stash_peer_id(path_id, sequence, retire_prior_to, id, secret, shared)
            .map_err(|error| {
                self.connection_error(error, shared);
                Error::Transport(error)
            })
    }

    fn stash_peer_id(
        &mut self,
        path_id: u64,
        sequence: u64,
        retire_prior_to: u64,
        id: PeerId,
        secret: stateless_reset::Secret,
        shared: &mut Shared,
    ) -> Result<AddOutcome, transport::Error> {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
        //# Receiving a value in the Retire Prior To field that is greater than
        //# that in the Sequence Number field MUST be treated as a connection
        //# error of type FRAME_ENCODING_ERROR.
        if retire_prior_to > sequence {
            return Err(transport::Error::FRAME_ENCODING_ERROR
                .with_frame_type(NEW_CONNECTION_ID_FRAME_TYPE)
                .with_reason("retire prior to exceeds the sequence number"));
        }

        if self.is_multipath_enabled && path_id > self.max_path_id_local {
            return Err(transport::Error::PROTOCOL_VIOLATION
                .with_frame_type(NEW_CONNECTION_ID_FRAME_TYPE)
                .with_reason("path id exceeds the advertised maximum"));
        }

        let stash_id = self.id_space(path_id);

        // abandoned path ids never get their stash back
        if self
            .local_ids
            .list(stash_id)
            .is_some_and(local_id_registry::List::is_demoted)
        {
            return Ok(AddOutcome::Duplicate);
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.15
        //# An endpoint that is sending packets with a zero-length Destination
        //# Connection ID MUST treat receipt of a NEW_CONNECTION_ID frame as a
        //# connection error of type PROTOCOL_VIOLATION.
        if self.is_peer_id_empty() {
            return Err(StashError::EmptyIdInUse.into());
        }

        let limit = self.local_parameters.active_connection_id_limit;
        let stash = self.peer_ids.get_or_create(stash_id);
        let is_raised = stash.raise_retire_before(retire_prior_to);
        let outcome = stash
            .add(sequence, id, secret, limit)
            .map_err(|error| transport::Error::from(error).with_frame_type(NEW_CONNECTION_ID_FRAME_TYPE))?;

        if is_raised {
            self.remove_peer_ids_before(stash_id, retire_prior_to, shared)?;
        }
        if outcome == AddOutcome::Added {
            self.test_and_signal_new_path_allowed();
        }
        Ok(outcome)
    }

    /// Returns true if the default path sends with a zero-length peer ID
    fn is_peer_id_empty(&self) -> bool {
        self.paths
            .get(0)
            .and_then(|path| path.tuple().peer_id)
            .and_then(|sequence| self.peer_ids.get(0)?.get(sequence))
            .is_some_and(|entry| entry.id.is_empty())
    }

    /// Retires every peer ID of a stash below `threshold`, moving the paths
    /// using them to fresh IDs.
    ///
    /// A secondary path that cannot be moved is demoted. The default path
    /// failing to move is a protocol violation.
    pub(crate) fn remove_peer_ids_before(
        &mut self,
        stash_id: u64,
        threshold: u64,
        shared: &mut Shared,
    ) -> Result<(), transport::Error> {
        let Some(stash) = self.peer_ids.get_mut(stash_id) else {
            return Ok(());
        };
        stash.raise_retire_before(threshold);
        for sequence in stash.remove_not_before(threshold) {
            self.queue_retire_connection_id(stash_id, sequence, shared);
        }

        let affected: SmallVec<[u64; MAX_PATHS]> = self
            .paths
            .iter()
            .filter(|path| !path.is_demoted() && self.id_space(path.unique_id()) == stash_id)
            .filter(|path| {
                path.tuple().peer_id.is_some_and(|sequence| {
                    sequence < threshold
                        && self
                            .peer_ids
                            .get(stash_id)
                            .and_then(|stash| stash.get(sequence))
                            .is_some_and(|entry| !entry.id.is_empty())
                })
            })
            .map(Path::unique_id)
            .collect();

        for unique_id in affected {
            let Some(index) = self.paths.index_of(unique_id) else {
                continue;
            };
            if let Err(error) = self.renew_connection_id(index, shared) {
                tracing::debug!(
                    connection = %self.id,
                    unique_id,
                    ?error,
                    "could not replace a retired peer connection id"
                );
                if index == 0 {
                    return Err(transport::Error::PROTOCOL_VIOLATION
                        .with_reason("no connection id left for the default path"));
                }
                self.demote_path(index, 0, shared);
            }
        }

        Ok(())
    }

    /// Handles the acknowledgement of a RETIRE_CONNECTION_ID frame
    pub fn on_retire_connection_id_acked(&mut self, path_id: u64, sequence: u64) -> bool {
        let stash_id = self.id_space(path_id);
        self.peer_ids
            .get_mut(stash_id)
            .is_some_and(|stash| stash.on_retire_acked(sequence))
    }

    /// Deletes a local ID after the peer retired it
    pub fn retire_local_id(&mut self, path_id: u64, sequence: u64, shared: &mut Shared) -> Result<(), Error> {
        self.local_ids
            .delete(path_id, sequence, shared.id_tables)
            .ok_or(Error::InvalidArgument)?;

        let is_multipath = self.is_multipath_enabled;
        for path in self.paths.iter_mut() {
            let list_id = if is_multipath { path.unique_id() } else { 0 };
            if list_id != path_id {
                continue;
            }
            for tuple in path.tuples.iter_mut() {
                if tuple.local_id == Some(sequence) {
                    tuple.local_id = None;
                    path.was_local_id_retired = true;
                }
            }
        }

        shared.subscriber.on_connection_id_retired(
            &self.meta(shared.now),
            &event::ConnectionIdRetired {
                source: ConnectionIdSource::Local,
                path_id,
                sequence,
            },
        );
        Ok(())
    }

    #[inline]
    pub fn find_local_id(&self, path_id: u64, id: &LocalId) -> Option<&local_id_registry::Entry> {
        self.local_ids.find(path_id, id)
    }

    /// Marks local IDs that outlived their TTL and schedules the next check
    pub fn check_local_id_ttl(&mut self, shared: &mut Shared) {
        let Some(ttl) = self.settings.local_id_ttl else {
            return;
        };
        if let Some(next) = self.local_ids.check_ttl(shared.now, ttl) {
            self.wake_no_later_than(next, shared.scheduler);
        }
    }

    /// The route of a path in the identifier tables
    #[inline]
    pub(crate) fn route(&self, unique_id: u64) -> Route {
        Route {
            connection: self.id,
            path_id: unique_id,
        }
    }
}
