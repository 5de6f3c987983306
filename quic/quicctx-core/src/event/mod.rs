// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Structured events published by the connection-context engine.
//!
//! Events never drive logic. A [`Subscriber`] observes them, and every
//! callback defaults to a no-op so implementations only override what they
//! care about.

use crate::{connection, endpoint, inet::SocketAddr, time::Timestamp};

#[cfg(feature = "event-tracing")]
pub mod tracing;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

cfg_if::cfg_if! {
    if #[cfg(feature = "event-tracing")] {
        /// The subscriber installed when the application does not provide one
        pub type DefaultSubscriber = tracing::Subscriber;
    } else {
        /// The subscriber installed when the application does not provide one
        pub type DefaultSubscriber = ();
    }
}

/// Identifies the connection an event belongs to
#[derive(Clone, Copy, Debug)]
pub struct ConnectionMeta {
    pub endpoint_type: endpoint::Type,
    /// Internal identifier, stable for the life of the connection
    pub id: u64,
    pub timestamp: Timestamp,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectionCreated {
    pub initial_id: connection::InitialId,
    pub peer_addr: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectionStateChanged {
    pub previous: &'static str,
    pub current: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectionClosed {
    pub error: connection::Error,
}

#[derive(Clone, Copy, Debug)]
pub struct PathCreated {
    pub unique_id: u64,
    pub peer_addr: SocketAddr,
}

#[derive(Clone, Copy, Debug)]
pub struct PathDemoted {
    pub unique_id: u64,
    pub reason: u64,
    pub deadline: Timestamp,
}

/// A demotion was refused because it would leave the connection without a default path
#[derive(Clone, Copy, Debug)]
pub struct PathDemotionRefused {
    pub unique_id: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct PathDeleted {
    pub unique_id: u64,
}

/// A backup path became available because no other path was
#[derive(Clone, Copy, Debug)]
pub struct PathPromoted {
    pub unique_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionIdSource {
    Local,
    Peer,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectionIdRetired {
    pub source: ConnectionIdSource,
    pub path_id: u64,
    pub sequence: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct TokenReuseDetected {
    pub expiry: Timestamp,
    pub count: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct StatelessPacketQueued {
    pub len: usize,
    pub peer_addr: SocketAddr,
}

/// Observes events published by the engine
pub trait Subscriber: 'static {
    #[inline]
    fn on_connection_created(&mut self, meta: &ConnectionMeta, event: &ConnectionCreated) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_connection_state_changed(
        &mut self,
        meta: &ConnectionMeta,
        event: &ConnectionStateChanged,
    ) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_connection_closed(&mut self, meta: &ConnectionMeta, event: &ConnectionClosed) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_path_created(&mut self, meta: &ConnectionMeta, event: &PathCreated) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_path_demoted(&mut self, meta: &ConnectionMeta, event: &PathDemoted) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_path_demotion_refused(&mut self, meta: &ConnectionMeta, event: &PathDemotionRefused) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_path_deleted(&mut self, meta: &ConnectionMeta, event: &PathDeleted) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_path_promoted(&mut self, meta: &ConnectionMeta, event: &PathPromoted) {
        let _ = meta;
        let _ = event;
    }

    #[inline]
    fn on_connection_id_retired(&mut self, meta: &ConnectionMeta, event: &ConnectionIdRetired) {
        let _ = meta;
        let _ = event;
    }

    /// Called for events that are not tied to a connection
    #[inline]
    fn on_token_reuse_detected(&mut self, timestamp: Timestamp, event: &TokenReuseDetected) {
        let _ = timestamp;
        let _ = event;
    }

    #[inline]
    fn on_stateless_packet_queued(&mut self, timestamp: Timestamp, event: &StatelessPacketQueued) {
        let _ = timestamp;
        let _ = event;
    }
}

impl Subscriber for () {}

impl<A, B> Subscriber for (A, B)
where
    A: Subscriber,
    B: Subscriber,
{
    #[inline]
    fn on_connection_created(&mut self, meta: &ConnectionMeta, event: &ConnectionCreated) {
        self.0.on_connection_created(meta, event);
        self.1.on_connection_created(meta, event);
    }

    #[inline]
    fn on_connection_state_changed(
        &mut self,
        meta: &ConnectionMeta,
        event: &ConnectionStateChanged,
    ) {
        self.0.on_connection_state_changed(meta, event);
        self.1.on_connection_state_changed(meta, event);
    }

    #[inline]
    fn on_connection_closed(&mut self, meta: &ConnectionMeta, event: &ConnectionClosed) {
        self.0.on_connection_closed(meta, event);
        self.1.on_connection_closed(meta, event);
    }

    #[inline]
    fn on_path_created(&mut self, meta: &ConnectionMeta, event: &PathCreated) {
        self.0.on_path_created(meta, event);
        self.1.on_path_created(meta, event);
    }

    #[inline]
    fn on_path_demoted(&mut self, meta: &ConnectionMeta, event: &PathDemoted) {
        self.0.on_path_demoted(meta, event);
        self.1.on_path_demoted(meta, event);
    }

    #[inline]
    fn on_path_demotion_refused(&mut self, meta: &ConnectionMeta, event: &PathDemotionRefused) {
        self.0.on_path_demotion_refused(meta, event);
        self.1.on_path_demotion_refused(meta, event);
    }

    #[inline]
    fn on_path_deleted(&mut self, meta: &ConnectionMeta, event: &PathDeleted) {
        self.0.on_path_deleted(meta, event);
        self.1.on_path_deleted(meta, event);
    }

    #[inline]
    fn on_path_promoted(&mut self, meta: &ConnectionMeta, event: &PathPromoted) {
        self.0.on_path_promoted(meta, event);
        self.1.on_path_promoted(meta, event);
    }

    #[inline]
    fn on_connection_id_retired(&mut self, meta: &ConnectionMeta, event: &ConnectionIdRetired) {
        self.0.on_connection_id_retired(meta, event);
        self.1.on_connection_id_retired(meta, event);
    }

    #[inline]
    fn on_token_reuse_detected(&mut self, timestamp: Timestamp, event: &TokenReuseDetected) {
        self.0.on_token_reuse_detected(timestamp, event);
        self.1.on_token_reuse_detected(timestamp, event);
    }

    #[inline]
    fn on_stateless_packet_queued(&mut self, timestamp: Timestamp, event: &StatelessPacketQueued) {
        self.0.on_stateless_packet_queued(timestamp, event);
        self.1.on_stateless_packet_queued(timestamp, event);
    }
}
