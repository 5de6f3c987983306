// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;

/// Forwards every event to `tracing` at DEBUG level.
///
/// Connection events are emitted under a per-role span so client and server
/// contexts in the same process can be told apart.
#[derive(Clone, Debug)]
pub struct Subscriber {
    client: ::tracing::Span,
    server: ::tracing::Span,
    endpoint: ::tracing::Span,
}

impl Default for Subscriber {
    fn default() -> Self {
        let root = ::tracing::span!(target: "quicctx", ::tracing::Level::DEBUG, "quicctx");
        let client = ::tracing::span!(parent: root.id(), ::tracing::Level::DEBUG, "client");
        let server = ::tracing::span!(parent: root.id(), ::tracing::Level::DEBUG, "server");
        Self {
            client,
            server,
            endpoint: root,
        }
    }
}

impl Subscriber {
    #[inline]
    fn parent(&self, meta: &ConnectionMeta) -> Option<::tracing::Id> {
        match meta.endpoint_type {
            endpoint::Type::Client => self.client.id(),
            endpoint::Type::Server => self.server.id(),
        }
    }
}

impl super::Subscriber for Subscriber {
    #[inline]
    fn on_connection_created(&mut self, meta: &ConnectionMeta, event: &ConnectionCreated) {
        let ConnectionCreated {
            initial_id,
            peer_addr,
        } = event;
        ::tracing::event!(target: "connection_created", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, initial_id = ?initial_id, peer_addr = %peer_addr);
    }

    #[inline]
    fn on_connection_state_changed(
        &mut self,
        meta: &ConnectionMeta,
        event: &ConnectionStateChanged,
    ) {
        let ConnectionStateChanged { previous, current } = event;
        ::tracing::event!(target: "connection_state_changed", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, previous, current);
    }

    #[inline]
    fn on_connection_closed(&mut self, meta: &ConnectionMeta, event: &ConnectionClosed) {
        let ConnectionClosed { error } = event;
        ::tracing::event!(target: "connection_closed", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, error = %error);
    }

    #[inline]
    fn on_path_created(&mut self, meta: &ConnectionMeta, event: &PathCreated) {
        let PathCreated {
            unique_id,
            peer_addr,
        } = event;
        ::tracing::event!(target: "path_created", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, unique_id, peer_addr = %peer_addr);
    }

    #[inline]
    fn on_path_demoted(&mut self, meta: &ConnectionMeta, event: &PathDemoted) {
        let PathDemoted {
            unique_id,
            reason,
            deadline,
        } = event;
        ::tracing::event!(target: "path_demoted", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, unique_id, reason, deadline = ?deadline);
    }

    #[inline]
    fn on_path_demotion_refused(&mut self, meta: &ConnectionMeta, event: &PathDemotionRefused) {
        let PathDemotionRefused { unique_id } = event;
        ::tracing::warn!(target: "path_demotion_refused", parent: self.parent(meta), conn = meta.id, unique_id, "refusing to demote the default path");
    }

    #[inline]
    fn on_path_deleted(&mut self, meta: &ConnectionMeta, event: &PathDeleted) {
        let PathDeleted { unique_id } = event;
        ::tracing::event!(target: "path_deleted", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, unique_id);
    }

    #[inline]
    fn on_path_promoted(&mut self, meta: &ConnectionMeta, event: &PathPromoted) {
        let PathPromoted { unique_id } = event;
        ::tracing::event!(target: "path_promoted", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, unique_id);
    }

    #[inline]
    fn on_connection_id_retired(&mut self, meta: &ConnectionMeta, event: &ConnectionIdRetired) {
        let ConnectionIdRetired {
            source,
            path_id,
            sequence,
        } = event;
        ::tracing::event!(target: "connection_id_retired", parent: self.parent(meta), ::tracing::Level::DEBUG, conn = meta.id, source = ?source, path_id, sequence);
    }

    #[inline]
    fn on_token_reuse_detected(&mut self, timestamp: Timestamp, event: &TokenReuseDetected) {
        let TokenReuseDetected { expiry, count } = event;
        ::tracing::event!(target: "token_reuse_detected", parent: self.endpoint.id(), ::tracing::Level::DEBUG, timestamp = ?timestamp, expiry = ?expiry, count);
    }

    #[inline]
    fn on_stateless_packet_queued(&mut self, timestamp: Timestamp, event: &StatelessPacketQueued) {
        let StatelessPacketQueued { len, peer_addr } = event;
        ::tracing::event!(target: "stateless_packet_queued", parent: self.endpoint.id(), ::tracing::Level::DEBUG, timestamp = ?timestamp, len, peer_addr = %peer_addr);
    }
}
