// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Builds fully initialized connections.
//!
//! A connection is only handed out once every step succeeded. A failing
//! step tears down whatever was already set up, so nothing registered by a
//! half-built connection stays behind in the context.

use super::{
    local_id_registry,
    misc_frames,
    packet_space::{AckContext, PacketContext},
    peer_id_stash, CloseReasons, Connection, InitialId, InternalConnectionId, LocalId, PeerId,
    Settings, Shared, State,
};
use crate::{
    callback,
    config::{Config, SpinBitPolicy, TransportParameters},
    error::Error,
    id_tables, path, stream,
};
use alloc::string::String;
use quicctx_core::{
    connection::id,
    endpoint, event,
    inet::{Family, SocketAddr},
    packet::PacketNumberSpace,
    random, stateless_reset, transport, version,
};

/// Initial packet numbers are drawn below this bound
const RANDOM_INITIAL_RANGE: u64 = 1 << 16;

/// A `Basic` spin bit policy disables spinning when a random byte falls
/// below this value, about one connection in sixteen
const SPIN_DISABLE_THRESHOLD: u8 = 17;

/// Everything needed to create a connection
pub struct Parameters {
    pub endpoint_type: endpoint::Type,
    /// The destination ID of the first Initial packet. Clients draw a
    /// random one when it is left unset.
    pub initial_id: Option<InitialId>,
    /// The source ID of the peer, known to servers from the first packet
    pub remote_id: Option<PeerId>,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
    pub if_index: u32,
    pub server_name: Option<String>,
    pub alpn: Option<String>,
    /// The version a client prefers, or the version a server received
    pub preferred_version: Option<u32>,
    /// Tried first as the local ID of the default path
    pub suggested_local_id: Option<LocalId>,
    pub callback: Option<callback::Handle>,
}

impl Parameters {
    pub fn client(peer_addr: SocketAddr) -> Self {
        Self {
            endpoint_type: endpoint::Type::Client,
            initial_id: None,
            remote_id: None,
            local_addr: None,
            peer_addr: Some(peer_addr),
            if_index: 0,
            server_name: None,
            alpn: None,
            preferred_version: None,
            suggested_local_id: None,
            callback: None,
        }
    }

    /// A server connection answering the first Initial packet of a client
    pub fn server(initial_id: InitialId, remote_id: PeerId, received_version: u32) -> Self {
        Self {
            endpoint_type: endpoint::Type::Server,
            initial_id: Some(initial_id),
            remote_id: Some(remote_id),
            local_addr: None,
            peer_addr: None,
            if_index: 0,
            server_name: None,
            alpn: None,
            preferred_version: Some(received_version),
            suggested_local_id: None,
            callback: None,
        }
    }

    pub fn with_initial_id(mut self, initial_id: InitialId) -> Self {
        self.initial_id = Some(initial_id);
        self
    }

    pub fn with_local_addr(mut self, local_addr: SocketAddr) -> Self {
        self.local_addr = Some(local_addr);
        self
    }

    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    pub fn with_if_index(mut self, if_index: u32) -> Self {
        self.if_index = if_index;
        self
    }

    pub fn with_server_name(mut self, server_name: &str) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_alpn(mut self, alpn: &str) -> Self {
        self.alpn = Some(alpn.into());
        self
    }

    pub fn with_preferred_version(mut self, version: u32) -> Self {
        self.preferred_version = Some(version);
        self
    }

    pub fn with_suggested_local_id(mut self, id: LocalId) -> Self {
        self.suggested_local_id = Some(id);
        self
    }

    pub fn with_callback(mut self, callback: callback::Handle) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Creates the connection `id` with the defaults of `config`
    pub(crate) fn build(
        self,
        id: InternalConnectionId,
        config: &Config,
        shared: &mut Shared,
    ) -> Result<Connection, Error> {
        let now = shared.now;
        let endpoint_type = self.endpoint_type;

        let initial_id = match (self.initial_id, endpoint_type) {
            (Some(initial_id), _) => initial_id,
            (None, endpoint::Type::Client) => random_initial_id(&mut *shared.random)?,
            (None, endpoint::Type::Server) => return Err(Error::InvalidArgument),
        };

        let selection = match endpoint_type {
            endpoint::Type::Client => version::select_for_client(self.preferred_version),
            endpoint::Type::Server => {
                version::select_for_server(self.preferred_version.unwrap_or(version::V1))
            }
        };

        let settings = Settings::from(config);
        let state = match endpoint_type {
            endpoint::Type::Client => State::ClientInit,
            endpoint::Type::Server => State::ServerInit,
        };

        let mut connection = Connection {
            id,
            endpoint_type,
            state,
            start_time: now,
            initial_id,
            version_index: selection.index,
            proposed_version: selection.proposed,
            desired_version: None,
            rejected_version: None,
            is_version_negotiation_armed: false,
            server_name: self.server_name,
            alpn: self.alpn,
            local_parameters: config.transport_parameters,
            remote_parameters: TransportParameters::peer_defaults(),
            streams: stream::Registry::new(endpoint_type, settings.stream_priority),
            settings,
            congestion_algorithm: config.congestion_algorithm.clone(),
            is_multipath_enabled: false,
            max_path_id_local: 0,
            max_path_id_remote: 0,
            paths: path::Manager::new(),
            local_ids: local_id_registry::Registry::new(id, config.local_id_len),
            peer_ids: peer_id_stash::Stashes::default(),
            crypto_streams: stream::CryptoStreams::default(),
            packet_spaces: PacketNumberSpace::ALL.map(|_| PacketContext::new(0, now)),
            ack_spaces: PacketNumberSpace::ALL.map(|_| AckContext::new(now)),
            misc_frames: misc_frames::Queue::default(),
            datagram_frames: misc_frames::Queue::default(),
            wake_time: now,
            app_wake_time: None,
            keep_alive: None,
            callback: self.callback,
            tls: None,
            initial_registration: None,
            secret_registration: None,
            is_half_open: endpoint_type.is_server(),
            path_demotion_needed: false,
            is_path_allowed_subscribed: false,
            is_path_allowed_notified: false,
            is_quality_update_requested: false,
            close_reasons: CloseReasons::default(),
            offending_frame_type: None,
            local_error_reason: "",
            crypto_epoch_sequence: 0,
        };

        let setup = Setup {
            local_addr: self.local_addr,
            peer_addr: self.peer_addr,
            if_index: self.if_index,
            remote_id: self.remote_id,
            suggested_local_id: self.suggested_local_id,
        };

        match setup.apply(&mut connection, config, shared) {
            Ok(()) => {
                tracing::debug!(
                    connection = %id,
                    ?endpoint_type,
                    version = connection.proposed_version,
                    "connection created"
                );
                Ok(connection)
            }
            Err(error) => {
                tracing::debug!(connection = %id, ?error, "connection creation failed");
                // never visible to the application, so nothing is reported
                connection.callback = None;
                connection.state = State::Disconnected;
                connection.teardown(shared);
                Err(error)
            }
        }
    }
}

/// The fallible steps of creating a connection
struct Setup {
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    if_index: u32,
    remote_id: Option<PeerId>,
    suggested_local_id: Option<LocalId>,
}

impl Setup {
    fn apply(self, connection: &mut Connection, config: &Config, shared: &mut Shared) -> Result<(), Error> {
        let now = shared.now;
        let is_server = connection.endpoint_type.is_server();

        connection.local_ids.create(
            0,
            self.suggested_local_id,
            now,
            &mut *shared.random,
            shared.id_tables,
        )?;

        let index = connection.create_path(
            self.local_addr,
            self.peer_addr,
            self.if_index,
            Some(0),
            shared,
        )?;

        let remote_id = self
            .remote_id
            .unwrap_or_else(|| PeerId::from(connection.initial_id));
        let mut secret = [0; stateless_reset::LEN];
        shared.random.private_random_fill(&mut secret);
        let stash = connection.peer_ids.get_or_create(0);
        stash.insert_initial(remote_id, secret.into());
        stash.in_use = true;

        {
            let tuple = connection.paths[index].tuple_mut();
            tuple.peer_id = Some(0);
            tuple.local_id = Some(0);
            // the handshake validates the first path
            tuple.challenge.required = false;
            tuple.challenge.verified = true;
        }
        connection.register_path(index, shared);

        let mut parameters = config.transport_parameters;
        if let Some(preferred_address) = parameters.preferred_address.as_mut() {
            if is_server {
                let entry = connection.local_ids.create(
                    0,
                    None,
                    now,
                    &mut *shared.random,
                    shared.id_tables,
                )?;
                preferred_address.connection_id = entry.id;
                preferred_address.stateless_reset_token =
                    id_tables::stateless_reset_token(shared.reset_seed, &entry.id);
            }
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-9
        //# If the peer sent the disable_active_migration transport parameter,
        //# an endpoint also MUST NOT send packets (including probing packets;
        //# see Section 9.1) from a different local address to the address the
        //# peer used during the handshake
        if is_server && config.local_id_len == 0 {
            parameters.migration_disabled = true;
        }
        parameters.enable_bdp_frame = config.bdp_frame;
        connection.set_transport_parameters(parameters);

        connection.settings.spin_bit_policy = match config.spin_bit_policy {
            SpinBitPolicy::Basic => {
                let mut byte = [0];
                shared.random.public_random_fill(&mut byte);
                if byte[0] < SPIN_DISABLE_THRESHOLD {
                    SpinBitPolicy::Null
                } else {
                    SpinBitPolicy::Basic
                }
            }
            SpinBitPolicy::On => SpinBitPolicy::Basic,
            policy => policy,
        };

        if config.random_initial {
            let sequence = random::public_u64(&mut *shared.random) % RANDOM_INITIAL_RANGE;
            connection.packet_spaces[PacketNumberSpace::Initial.as_index()] =
                PacketContext::new(sequence, now);
        }

        let remote_parameters = connection.remote_parameters;
        connection.streams.set_remote_limits(&remote_parameters);

        if let Some(interval) = config.keep_alive_interval {
            connection.enable_keep_alive(interval);
        }

        connection.tls = Some(connection.new_tls_session(shared)?);

        if let (true, Some(peer_addr)) = (is_server && config.local_id_len > 0, self.peer_addr) {
            shared
                .id_tables
                .register_initial_id(connection.initial_id, &peer_addr, connection.id)
                .map_err(|_| Error::ConnectionIdCollision)?;
            connection.initial_registration = Some(peer_addr);
        }
        connection.register_reset_secret(shared);

        let peer_addr = self
            .peer_addr
            .unwrap_or_else(|| Family::of_optional(self.local_addr.as_ref()).unspecified());
        shared.subscriber.on_connection_created(
            &connection.meta(now),
            &event::ConnectionCreated {
                initial_id: connection.initial_id,
                peer_addr,
            },
        );

        connection.reinsert(shared.scheduler, now);
        Ok(())
    }
}

/// Draws the destination ID of a client's first Initial packet
fn random_initial_id(random: &mut dyn random::Generator) -> Result<InitialId, Error> {
    let mut bytes = [0; id::DEFAULT_INITIAL_LEN];
    random.public_random_fill(&mut bytes);
    InitialId::try_from_bytes(&bytes).ok_or(Error::Transport(transport::Error::INTERNAL_ERROR))
}
