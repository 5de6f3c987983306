// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! This module contains the Path implementation
mod challenge;
mod manager;
mod migration;
pub mod quality;

pub use challenge::*;
pub use manager::*;
pub use migration::{PathAddresses, NEW_CONNECTION_ID_FRAME_TYPE, PATH_CHALLENGE_FRAME_TYPE};

use crate::{
    config::MAX_PACKET_SIZE,
    connection::packet_space::{AckContext, PacketContext},
};
use alloc::boxed::Box;
use core::{any::Any, time::Duration};
use quicctx_core::{
    inet::{Family, SocketAddr},
    time::Timestamp,
};
use smallvec::SmallVec;

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.2
//# When no previous RTT is available, the initial RTT
//# SHOULD be set to 333 milliseconds.
// A lower value is used, matching the retransmit timer of the first flight.
pub const INITIAL_RTT: Duration = Duration::from_millis(250);

pub const INITIAL_RETRANSMIT_TIMER: Duration = Duration::from_millis(250);

/// The floor of the demotion timer when multipath is not negotiated
pub const INITIAL_MAX_RETRANSMIT_TIMER: Duration = Duration::from_secs(1);

//= https://www.rfc-editor.org/rfc/rfc9002#section-7.2
//# Endpoints SHOULD use an initial congestion
//# window of ten times the maximum datagram size (max_datagram_size),
//# while limiting the window to the larger of 14,720 bytes or twice the
//# maximum datagram size.
pub const INITIAL_CWIN: u64 = 10 * MAX_PACKET_SIZE;

pub const INITIAL_MTU_IPV4: u64 = 1252;
pub const INITIAL_MTU_IPV6: u64 = 1232;

/// IP and UDP header bytes for each address family
pub const MTU_OVERHEAD_IPV4: u64 = 28;
pub const MTU_OVERHEAD_IPV6: u64 = 48;

/// A demoted path is kept for this many retransmit timers
pub const DEMOTION_TIMER_FACTOR: u32 = 3;

/// Returns the MTU used on a new path towards `peer_addr`
#[inline]
pub fn initial_mtu(peer_addr: Option<&SocketAddr>) -> u64 {
    match Family::of_optional(peer_addr) {
        Family::V4 => INITIAL_MTU_IPV4,
        Family::V6 => INITIAL_MTU_IPV6,
    }
}

/// Returns the IP and UDP overhead for the family of `addr`
#[inline]
pub fn mtu_overhead(addr: Option<&SocketAddr>) -> u64 {
    match Family::of_optional(addr) {
        Family::V4 => MTU_OVERHEAD_IPV4,
        Family::V6 => MTU_OVERHEAD_IPV6,
    }
}

/// Round trip, congestion and pacing state of a path
#[derive(Debug)]
pub struct Recovery {
    pub smoothed_rtt: Duration,
    pub rtt_variant: Duration,
    pub rtt_min: Duration,
    pub retransmit_timer: Duration,
    pub congestion_window: u64,
    pub bytes_in_transit: u64,
    /// Bytes per second
    pub pacing_rate: u64,
    /// Bytes per second, as measured from acknowledgements
    pub receive_rate_estimate: u64,
    /// State owned by the congestion algorithm of the connection
    pub congestion_state: Option<Box<dyn Any>>,
}

impl Default for Recovery {
    fn default() -> Self {
        Self {
            smoothed_rtt: INITIAL_RTT,
            rtt_variant: Duration::ZERO,
            rtt_min: Duration::ZERO,
            retransmit_timer: INITIAL_RETRANSMIT_TIMER,
            congestion_window: INITIAL_CWIN,
            bytes_in_transit: 0,
            pacing_rate: initial_pacing_rate(),
            receive_rate_estimate: 0,
            congestion_state: None,
        }
    }
}

/// Sends one initial window per initial RTT
#[inline]
fn initial_pacing_rate() -> u64 {
    INITIAL_CWIN * 1_000_000 / INITIAL_RTT.as_micros() as u64
}

/// One local and peer address pair of a path.
///
/// A path holds several tuples while a NAT rebinding or a migration is
/// being validated. The first one is the tuple in use.
#[derive(Clone, Debug)]
pub struct Tuple {
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
    pub if_index: u32,
    pub challenge: Challenge,
    /// Sequence number of the local ID the peer sends to
    pub local_id: Option<u64>,
    /// Sequence number of the peer ID this tuple sends with
    pub peer_id: Option<u64>,
    pub to_preferred_address: bool,
}

impl Tuple {
    pub fn new(local_addr: Option<SocketAddr>, peer_addr: Option<SocketAddr>, if_index: u32) -> Self {
        Self {
            local_addr,
            peer_addr,
            if_index,
            challenge: Challenge::default(),
            local_id: None,
            peer_id: None,
            to_preferred_address: false,
        }
    }
}

#[derive(Debug)]
pub struct Path {
    unique_id: u64,
    pub(crate) tuples: SmallVec<[Tuple; 1]>,
    pub recovery: Recovery,
    /// Maximum transmission unit of the path
    pub mtu: u64,
    pub quality: quality::Thresholds,
    /// The application data space used once multipath is negotiated. It is
    /// kept on every path since the first path exists before negotiation.
    pub packets: PacketContext,
    pub acks: AckContext,
    pub latest_sent_time: Timestamp,
    /// Set while the path waits out its grace period before deletion
    pub(crate) demotion: Option<Timestamp>,
    pub(crate) is_backup: bool,
    pub(crate) is_published: bool,
    pub(crate) abandon_sent: bool,
    pub(crate) is_nat_challenge: bool,
    pub(crate) was_local_id_retired: bool,
    pub(crate) app_path_ctx: u64,
    /// The peer address routed to this path when local IDs are empty
    pub(crate) registered_addr: Option<SocketAddr>,
}

impl Path {
    pub fn new(
        unique_id: u64,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
        if_index: u32,
        quality: quality::Thresholds,
        now: Timestamp,
    ) -> Self {
        let recovery = Recovery::default();
        let mut quality = quality;
        quality.refresh(&recovery);

        let mut tuples = SmallVec::new();
        tuples.push(Tuple::new(local_addr, peer_addr, if_index));

        Self {
            unique_id,
            tuples,
            recovery,
            mtu: initial_mtu(peer_addr.as_ref()),
            quality,
            packets: PacketContext::new(0, now),
            acks: AckContext::new(now),
            latest_sent_time: now,
            demotion: None,
            is_backup: false,
            is_published: false,
            abandon_sent: false,
            is_nat_challenge: false,
            was_local_id_retired: false,
            app_path_ctx: 0,
            registered_addr: None,
        }
    }

    #[inline]
    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    /// Returns the tuple in use
    #[inline]
    pub fn tuple(&self) -> &Tuple {
        &self.tuples[0]
    }

    #[inline]
    pub(crate) fn tuple_mut(&mut self) -> &mut Tuple {
        &mut self.tuples[0]
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter()
    }

    pub(crate) fn push_tuple(&mut self, tuple: Tuple) -> &mut Tuple {
        self.tuples.push(tuple);
        let last = self.tuples.len() - 1;
        &mut self.tuples[last]
    }

    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.tuple().local_addr
    }

    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.tuple().peer_addr
    }

    #[inline]
    pub fn is_verified(&self) -> bool {
        self.tuple().challenge.verified
    }

    #[inline]
    pub fn is_demoted(&self) -> bool {
        self.demotion.is_some()
    }

    /// The time after which a demoted path is deleted
    #[inline]
    pub fn demotion_deadline(&self) -> Option<Timestamp> {
        self.demotion
    }

    #[inline]
    pub fn is_backup(&self) -> bool {
        self.is_backup
    }

    #[inline]
    pub fn is_published(&self) -> bool {
        self.is_published
    }

    #[inline]
    pub fn abandon_sent(&self) -> bool {
        self.abandon_sent
    }

    #[inline]
    pub fn is_nat_challenge(&self) -> bool {
        self.is_nat_challenge
    }

    #[inline]
    pub fn was_local_id_retired(&self) -> bool {
        self.was_local_id_retired
    }

    #[inline]
    pub fn app_path_ctx(&self) -> u64 {
        self.app_path_ctx
    }

    /// Restores the MTU of a new path
    pub fn reset_mtu(&mut self) {
        self.mtu = initial_mtu(self.peer_addr().as_ref());
    }

    /// Marks the path demoted, to be deleted once `deadline` passes.
    ///
    /// Returns false if the path was already demoted.
    pub(crate) fn demote(&mut self, deadline: Timestamp) -> bool {
        if self.is_demoted() {
            return false;
        }
        self.demotion = Some(deadline);
        true
    }

    /// The time a demotion started now would end
    pub(crate) fn demotion_deadline_from(&self, now: Timestamp, is_multipath: bool) -> Timestamp {
        let mut timer = self.recovery.retransmit_timer;
        if !is_multipath {
            timer = timer.max(INITIAL_MAX_RETRANSMIT_TIMER);
        }
        now + timer * DEMOTION_TIMER_FACTOR
    }
}
