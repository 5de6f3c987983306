// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains the implementation of the `Connection`

use super::{
    local_id_registry,
    misc_frames::{self, Frame, FrameKind},
    packet_space::{AckContext, PacketContext},
    peer_id_stash, InitialId, InternalConnectionId, State,
};
use crate::{
    callback::{self, Event, PathEvent},
    config::{
        Config, LossBitPolicy, Padding, PmtudPolicy, SpinBitPolicy, TransportParameters,
    },
    congestion,
    error::Error,
    id_tables::IdTables,
    path,
    scheduler::Scheduler,
    stream, tls,
};
use alloc::{boxed::Box, string::String, sync::Arc};
use bytes::Bytes;
use core::{fmt, time::Duration};
use quicctx_core::{
    connection, endpoint,
    event,
    inet::SocketAddr,
    packet::PacketNumberSpace,
    random, stateless_reset,
    stream::StreamId,
    time::Timestamp,
    transport, version,
};

/// The endpoint-wide state an operation on a connection may touch.
///
/// The context lends these out for the duration of one call, which keeps
/// connections free of references back to their owner.
pub struct Shared<'a> {
    pub(crate) id_tables: &'a mut IdTables,
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) random: &'a mut dyn random::Generator,
    pub(crate) subscriber: &'a mut dyn event::Subscriber,
    pub(crate) tls: &'a mut dyn tls::Provider,
    /// Keys the stateless reset tokens handed out with local IDs
    pub(crate) reset_seed: &'a [u8; stateless_reset::LEN],
    pub(crate) now: Timestamp,
}

impl Shared<'_> {
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.now
    }
}

/// Per-connection copies of the context defaults
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub padding: Padding,
    pub spin_bit_policy: SpinBitPolicy,
    pub loss_bit_policy: LossBitPolicy,
    pub pmtud_policy: PmtudPolicy,
    pub address_discovery_mode: u8,
    pub local_id_ttl: Option<Duration>,
    pub rtt_update_delta: Duration,
    pub pacing_rate_update_delta: u64,
    pub crypto_epoch_length: u64,
    pub stream_priority: u8,
    pub datagram_priority: u8,
    pub handshake_timeout: Duration,
    pub preemptive_repeat: bool,
    pub path_callbacks: bool,
    pub bdp_frame: bool,
    pub cwin_min: u64,
    pub cwin_max: u64,
    pub mtu_max: u64,
    pub constant_challenges: bool,
    pub congestion_option: Option<Arc<str>>,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            padding: config.padding,
            spin_bit_policy: config.spin_bit_policy,
            loss_bit_policy: config.loss_bit_policy,
            pmtud_policy: config.pmtud_policy,
            address_discovery_mode: config.address_discovery_mode,
            local_id_ttl: config.local_id_ttl,
            rtt_update_delta: config.rtt_update_delta,
            pacing_rate_update_delta: config.pacing_rate_update_delta,
            crypto_epoch_length: config.crypto_epoch_length,
            stream_priority: config.stream_priority,
            datagram_priority: config.datagram_priority,
            handshake_timeout: config.handshake_timeout,
            preemptive_repeat: config.preemptive_repeat,
            path_callbacks: config.path_callbacks,
            bdp_frame: config.bdp_frame,
            cwin_min: config.cwin_min,
            cwin_max: config.cwin_max,
            mtu_max: config.mtu_max,
            constant_challenges: config.constant_challenges,
            congestion_option: config.congestion_option.clone(),
        }
    }
}

/// The error codes a connection was closed with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CloseReasons {
    pub local: Option<u64>,
    pub remote: Option<u64>,
    pub local_application: Option<u64>,
    pub remote_application: Option<u64>,
}

impl CloseReasons {
    /// The reason reported to the application once the connection closed
    pub fn to_error(&self) -> connection::Error {
        if let Some(code) = self.local_application.or(self.remote_application) {
            return connection::Error::Application(code);
        }
        match self.local.or(self.remote) {
            Some(code) => transport::Error::new(code).into(),
            None => connection::Error::Closed,
        }
    }
}

/// One QUIC connection of the context
pub struct Connection {
    pub(crate) id: InternalConnectionId,
    pub(crate) endpoint_type: endpoint::Type,
    pub(crate) state: State,
    pub(crate) start_time: Timestamp,
    pub(crate) initial_id: InitialId,
    /// Index into [`version::SUPPORTED`]
    pub(crate) version_index: usize,
    /// The version placed in the long headers
    pub(crate) proposed_version: u32,
    pub(crate) desired_version: Option<u32>,
    pub(crate) rejected_version: Option<u32>,
    pub(crate) is_version_negotiation_armed: bool,
    pub(crate) server_name: Option<String>,
    pub(crate) alpn: Option<String>,

    pub(crate) local_parameters: TransportParameters,
    pub(crate) remote_parameters: TransportParameters,
    pub(crate) settings: Settings,
    pub(crate) congestion_algorithm: Option<Arc<dyn congestion::Algorithm>>,
    pub(crate) is_multipath_enabled: bool,
    pub(crate) max_path_id_local: u64,
    pub(crate) max_path_id_remote: u64,

    pub(crate) paths: path::Manager,
    pub(crate) local_ids: local_id_registry::Registry,
    pub(crate) peer_ids: peer_id_stash::Stashes,
    pub(crate) streams: stream::Registry,
    pub(crate) crypto_streams: stream::CryptoStreams,
    pub(crate) packet_spaces: [PacketContext; PacketNumberSpace::COUNT],
    pub(crate) ack_spaces: [AckContext; PacketNumberSpace::COUNT],
    pub(crate) misc_frames: misc_frames::Queue,
    pub(crate) datagram_frames: misc_frames::Queue,

    pub(crate) wake_time: Timestamp,
    pub(crate) app_wake_time: Option<Timestamp>,
    pub(crate) keep_alive: Option<Duration>,

    pub(crate) callback: Option<callback::Handle>,
    pub(crate) tls: Option<Box<dyn tls::Session>>,

    /// The address the initial ID is routed with, set on servers
    pub(crate) initial_registration: Option<SocketAddr>,
    pub(crate) secret_registration: Option<(stateless_reset::Secret, SocketAddr)>,

    pub(crate) is_half_open: bool,
    pub(crate) path_demotion_needed: bool,
    pub(crate) is_path_allowed_subscribed: bool,
    pub(crate) is_path_allowed_notified: bool,
    pub(crate) is_quality_update_requested: bool,

    pub(crate) close_reasons: CloseReasons,
    pub(crate) offending_frame_type: Option<u64>,
    pub(crate) local_error_reason: &'static str,
    /// The first application packet number sent with the current keys
    pub(crate) crypto_epoch_sequence: u64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint_type", &self.endpoint_type)
            .field("state", &self.state)
            .field("initial_id", &self.initial_id)
            .field("version", &self.version())
            .field("paths", &self.paths.len())
            .field("wake_time", &self.wake_time)
            .finish_non_exhaustive()
    }
}

impl Connection {
    #[inline]
    pub fn id(&self) -> InternalConnectionId {
        self.id
    }

    #[inline]
    pub fn endpoint_type(&self) -> endpoint::Type {
        self.endpoint_type
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    #[inline]
    pub fn initial_id(&self) -> InitialId {
        self.initial_id
    }

    /// The negotiated version
    #[inline]
    pub fn version(&self) -> u32 {
        version::SUPPORTED[self.version_index]
    }

    #[inline]
    pub fn proposed_version(&self) -> u32 {
        self.proposed_version
    }

    #[inline]
    pub fn desired_version(&self) -> Option<u32> {
        self.desired_version
    }

    #[inline]
    pub fn rejected_version(&self) -> Option<u32> {
        self.rejected_version
    }

    #[inline]
    pub fn is_version_negotiation_armed(&self) -> bool {
        self.is_version_negotiation_armed
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn alpn(&self) -> Option<&str> {
        self.alpn.as_deref()
    }

    #[inline]
    pub fn local_parameters(&self) -> &TransportParameters {
        &self.local_parameters
    }

    #[inline]
    pub fn remote_parameters(&self) -> &TransportParameters {
        &self.remote_parameters
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn congestion_algorithm(&self) -> Option<&'static str> {
        self.congestion_algorithm.as_ref().map(|algorithm| algorithm.name())
    }

    #[inline]
    pub fn is_multipath_enabled(&self) -> bool {
        self.is_multipath_enabled
    }

    #[inline]
    pub fn paths(&self) -> &path::Manager {
        &self.paths
    }

    #[inline]
    pub fn local_ids(&self) -> &local_id_registry::Registry {
        &self.local_ids
    }

    #[inline]
    pub fn peer_ids(&self) -> &peer_id_stash::Stashes {
        &self.peer_ids
    }

    #[inline]
    pub fn streams(&self) -> &stream::Registry {
        &self.streams
    }

    #[inline]
    pub fn crypto_streams(&self) -> &stream::CryptoStreams {
        &self.crypto_streams
    }

    #[inline]
    pub fn packet_space(&self, space: PacketNumberSpace) -> &PacketContext {
        &self.packet_spaces[space.as_index()]
    }

    #[inline]
    pub fn ack_space(&self, space: PacketNumberSpace) -> &AckContext {
        &self.ack_spaces[space.as_index()]
    }

    #[inline]
    pub fn misc_frames(&self) -> &misc_frames::Queue {
        &self.misc_frames
    }

    #[inline]
    pub fn datagram_frames(&self) -> &misc_frames::Queue {
        &self.datagram_frames
    }

    #[inline]
    pub fn wake_time(&self) -> Timestamp {
        self.wake_time
    }

    #[inline]
    pub fn app_wake_time(&self) -> Option<Timestamp> {
        self.app_wake_time
    }

    #[inline]
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        self.keep_alive
    }

    #[inline]
    pub fn is_half_open(&self) -> bool {
        self.is_half_open
    }

    #[inline]
    pub fn is_path_demotion_needed(&self) -> bool {
        self.path_demotion_needed
    }

    /// Readable after the close callback
    #[inline]
    pub fn close_reasons(&self) -> CloseReasons {
        self.close_reasons
    }

    #[inline]
    pub fn offending_frame_type(&self) -> Option<u64> {
        self.offending_frame_type
    }

    #[inline]
    pub fn local_error_reason(&self) -> &'static str {
        self.local_error_reason
    }

    #[inline]
    pub fn crypto_epoch_sequence(&self) -> u64 {
        self.crypto_epoch_sequence
    }

    /// The smaller of the two advertised idle timeouts, ignoring disabled ones
    pub fn idle_timeout(&self) -> Option<Duration> {
        [
            self.local_parameters.max_idle_timeout,
            self.remote_parameters.max_idle_timeout,
        ]
        .into_iter()
        .filter(|timeout| !timeout.is_zero())
        .min()
    }

    /// The stash and local ID list used by a path
    #[inline]
    pub(crate) fn id_space(&self, unique_id: u64) -> u64 {
        if self.is_multipath_enabled {
            unique_id
        } else {
            0
        }
    }

    #[inline]
    pub(crate) fn meta(&self, now: Timestamp) -> event::ConnectionMeta {
        event::ConnectionMeta {
            endpoint_type: self.endpoint_type,
            id: self.id.into(),
            timestamp: now,
        }
    }

    /// Calls the application callback, if one is set
    pub(crate) fn notify(&mut self, event: Event) -> Result<(), callback::Error> {
        let Some(callback) = &self.callback else {
            return Ok(());
        };
        let mut callback = callback.try_borrow_mut().map_err(|_| callback::Error)?;
        callback.on_event(self.id, event)
    }

    pub(crate) fn path_event(&self, index: usize) -> PathEvent {
        let path = &self.paths[index];
        PathEvent {
            unique_id: path.unique_id(),
            app_path_ctx: path.app_path_ctx,
        }
    }

    #[inline]
    pub(crate) fn reinsert(&mut self, scheduler: &mut Scheduler, time: Timestamp) {
        self.wake_time = time;
        scheduler.reinsert(self.id, time);
    }

    /// Moves the wake time earlier, never later
    pub(crate) fn wake_no_later_than(&mut self, time: Timestamp, scheduler: &mut Scheduler) {
        if time < self.wake_time {
            self.reinsert(scheduler, time);
        }
    }

    /// Runs the timers of a connection the scheduler found due.
    ///
    /// The wake time is rebuilt from the timers still pending, so a
    /// connection with nothing left to do leaves the schedule.
    pub fn on_wakeup(&mut self, shared: &mut Shared) {
        if self.state >= State::Disconnected {
            return;
        }
        let now = shared.now;
        self.wake_time = Timestamp::MAX;
        shared.scheduler.remove(self.id);

        if self.path_demotion_needed {
            self.delete_abandoned_paths(shared);
        }
        self.check_local_id_ttl(shared);
        if let Some(time) = self.app_wake_time.filter(|&time| time > now) {
            self.wake_no_later_than(time, shared.scheduler);
        }
    }

    /// Queues a control frame and wakes the connection to send it
    pub(crate) fn queue_frame(&mut self, kind: FrameKind, space: PacketNumberSpace, shared: &mut Shared) {
        self.misc_frames.push(Frame {
            kind,
            space,
            is_pure_ack: false,
        });
        self.reinsert(shared.scheduler, shared.now);
    }

    /// Queues a frame encoded by the application
    pub fn queue_misc_frame(
        &mut self,
        bytes: Bytes,
        is_pure_ack: bool,
        space: PacketNumberSpace,
        shared: &mut Shared,
    ) {
        self.misc_frames.push(Frame {
            kind: FrameKind::Raw(bytes),
            space,
            is_pure_ack,
        });
        self.reinsert(shared.scheduler, shared.now);
    }

    pub fn queue_datagram_frame(&mut self, bytes: Bytes, shared: &mut Shared) {
        self.datagram_frames.push(Frame {
            kind: FrameKind::Raw(bytes),
            space: PacketNumberSpace::ApplicationData,
            is_pure_ack: false,
        });
        self.reinsert(shared.scheduler, shared.now);
    }

    /// Drops the queued frames of the handshake spaces
    pub fn purge_misc_frames_after_ready(&mut self) {
        self.misc_frames.purge_after_ready();
    }

    pub fn set_state(&mut self, state: State, shared: &mut Shared) {
        if self.state == state {
            return;
        }
        let previous = core::mem::replace(&mut self.state, state);
        shared.subscriber.on_connection_state_changed(
            &self.meta(shared.now),
            &event::ConnectionStateChanged {
                previous: previous.as_str(),
                current: state.as_str(),
            },
        );

        // reaching the almost ready states may unblock new paths
        self.test_and_signal_new_path_allowed();
    }

    /// Records a connection error and moves to the matching closing state.
    ///
    /// Errors in the local error class are reported as `INTERNAL_ERROR`.
    /// A connection already closing keeps its first error, and only records
    /// the frame type when none is known yet. A disconnected connection is
    /// left alone: it may already be gone from the scheduler.
    pub fn connection_error(&mut self, error: transport::Error, shared: &mut Shared) {
        if self.state >= State::Disconnected {
            return;
        }

        let code = transport::Error::for_peer(error.code).code;

        let state = match self.state {
            State::Ready | State::ClientReadyStart | State::ServerFalseStart => State::Disconnecting,
            state if state < State::ServerFalseStart => State::HandshakeFailure,
            _ => {
                if self.offending_frame_type.is_none() {
                    self.offending_frame_type = error.frame_type;
                }
                self.reinsert(shared.scheduler, shared.now);
                return;
            }
        };
        self.close_reasons.local = Some(code);
        self.local_error_reason = error.reason;
        self.offending_frame_type = error.frame_type;
        self.set_state(state, shared);

        tracing::debug!(
            connection = %self.id,
            code,
            frame_type = ?error.frame_type,
            reason = error.reason,
            "connection error"
        );
        self.reinsert(shared.scheduler, shared.now);
    }

    /// Closes the connection with an application error code
    pub fn close(&mut self, application_error: u64, shared: &mut Shared) {
        if self.state >= State::Disconnecting {
            return;
        }
        self.close_reasons.local_application = Some(application_error);
        let state = if self.state.is_handshaking() {
            State::HandshakeFailure
        } else {
            State::Disconnecting
        };
        self.set_state(state, shared);
        self.reinsert(shared.scheduler, shared.now);
    }

    /// Records the error codes of a CONNECTION_CLOSE frame from the peer
    pub fn on_peer_close(
        &mut self,
        transport_error: Option<u64>,
        application_error: Option<u64>,
        shared: &mut Shared,
    ) {
        self.close_reasons.remote = transport_error;
        self.close_reasons.remote_application = application_error;
        if self.state < State::ClosingReceived {
            self.set_state(State::ClosingReceived, shared);
        }
        self.reinsert(shared.scheduler, shared.now);
    }

    /// Moves the connection to `Disconnected` and tells the application
    pub fn disconnect(&mut self, shared: &mut Shared) {
        if self.state == State::Disconnected {
            return;
        }
        self.set_state(State::Disconnected, shared);

        // the connection is gone whatever the application answers
        let _ = self.notify(Event::Close);

        shared.subscriber.on_connection_closed(
            &self.meta(shared.now),
            &event::ConnectionClosed {
                error: self.close_reasons.to_error(),
            },
        );
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#section-6.1
    //# An endpoint MUST NOT initiate a subsequent key update unless it has
    //# received an acknowledgment for a packet that was sent protected with
    //# keys from the current key phase.
    pub fn start_key_rotation(&mut self) -> Result<(), Error> {
        let space = &self.packet_spaces[PacketNumberSpace::ApplicationData.as_index()];
        let is_epoch_acked = space
            .highest_acknowledged
            .is_some_and(|acked| acked >= self.crypto_epoch_sequence);
        if self.state != State::Ready || !is_epoch_acked {
            return Err(Error::KeyRotationNotReady);
        }

        let send_sequence = space.send_sequence;
        let session = self.tls.as_mut().ok_or(Error::KeyRotationNotReady)?;
        session.rotate_keys()?;
        self.crypto_epoch_sequence = send_sequence;
        Ok(())
    }

    /// Restarts the handshake after a retry or a version negotiation.
    ///
    /// The application space keeps its packet numbers so 0-RTT packets can
    /// be sent again.
    pub fn reset(&mut self, shared: &mut Shared) -> Result<(), Error> {
        for space in [PacketNumberSpace::Initial, PacketNumberSpace::Handshake] {
            self.packet_spaces[space.as_index()].reset();
            self.ack_spaces[space.as_index()].reset(shared.now);
        }
        self.crypto_streams.clear();

        self.tls = None;
        self.tls = Some(self.new_tls_session(shared)?);
        Ok(())
    }

    pub(crate) fn new_tls_session(&self, shared: &mut Shared) -> Result<Box<dyn tls::Session>, Error> {
        let info = tls::SessionInfo {
            endpoint_type: self.endpoint_type,
            server_name: self.server_name.as_deref(),
            alpn: self.alpn.as_deref(),
            now: shared.now,
        };
        let mut session = shared.tls.new_session(&info)?;
        session.setup_initial_keys(&self.initial_id, self.version())?;
        Ok(session)
    }

    /// Releases everything the connection holds in the context.
    ///
    /// Paths are deleted last to first, and every registration in the
    /// identifier tables is removed. The connection leaves the scheduler
    /// last, after every callback has run.
    pub(crate) fn teardown(&mut self, shared: &mut Shared) {
        if self.state < State::Disconnected {
            self.disconnect(shared);
        }

        for (packets, acks) in self.packet_spaces.iter_mut().zip(self.ack_spaces.iter_mut()) {
            packets.reset();
            acks.reset(shared.now);
        }
        self.misc_frames.clear();
        self.datagram_frames.clear();
        self.crypto_streams.clear();
        self.streams.clear();
        self.tls = None;

        while !self.paths.is_empty() {
            let index = self.paths.len() - 1;
            self.release_peer_ids(index, true, shared);
            self.delete_path(index, shared);
        }

        self.local_ids.delete_all(shared.id_tables);
        self.peer_ids.clear();

        if let Some(addr) = self.initial_registration.take() {
            shared
                .id_tables
                .unregister_initial_id(self.initial_id, &addr, self.id);
        }
        self.unregister_reset_secret(shared.id_tables);
        shared.scheduler.remove(self.id);
    }

    /// Routes stateless resets carrying the secret of the default path's
    /// peer ID to this connection
    pub(crate) fn register_reset_secret(&mut self, shared: &mut Shared) {
        let Some(path) = self.paths.get(0) else {
            return;
        };
        let Some(peer_addr) = path.peer_addr() else {
            return;
        };
        let stash_id = self.id_space(path.unique_id());
        let Some(secret) = path
            .tuple()
            .peer_id
            .and_then(|sequence| self.peer_ids.get(stash_id)?.get(sequence))
            .map(|entry| entry.secret)
        else {
            return;
        };

        self.unregister_reset_secret(shared.id_tables);
        match shared.id_tables.register_secret(secret, &peer_addr, self.id) {
            Ok(()) => self.secret_registration = Some((secret, peer_addr)),
            Err(error) => {
                tracing::debug!(connection = %self.id, ?error, "reset secret already registered");
            }
        }
    }

    fn unregister_reset_secret(&mut self, id_tables: &mut IdTables) {
        if let Some((secret, addr)) = self.secret_registration.take() {
            id_tables.unregister_secret(secret, &addr, self.id);
        }
    }

    pub fn set_callback(&mut self, callback: Option<callback::Handle>) {
        self.callback = callback;
    }

    pub fn set_app_wake_time(&mut self, time: Timestamp, shared: &mut Shared) {
        self.app_wake_time = Some(time);
        if time != Timestamp::ZERO {
            self.wake_no_later_than(time, shared.scheduler);
        }
    }

    /// Replaces the local transport parameters
    pub fn set_transport_parameters(&mut self, parameters: TransportParameters) {
        self.local_parameters = parameters;
        if self.settings.mtu_max > 0 && self.local_parameters.max_packet_size == 0 {
            let overhead =
                path::mtu_overhead(self.paths.get(0).and_then(path::Path::peer_addr).as_ref());
            self.local_parameters.max_packet_size = self.settings.mtu_max.saturating_sub(overhead);
        }
        self.streams.set_local_limits(&self.local_parameters);
    }

    /// Applies the transport parameters received from the peer
    pub fn set_remote_parameters(&mut self, parameters: TransportParameters) {
        self.remote_parameters = parameters;
        self.streams.set_remote_limits(&self.remote_parameters);

        self.is_multipath_enabled =
            self.local_parameters.is_multipath_enabled && parameters.is_multipath_enabled;
        if self.is_multipath_enabled {
            self.max_path_id_local = self.local_parameters.initial_max_path_id;
            self.max_path_id_remote = parameters.initial_max_path_id;
        }
        self.test_and_signal_new_path_allowed();
    }

    /// Raises the path id limit the peer advertised with MAX_PATH_ID
    pub fn on_max_path_id(&mut self, max_path_id: u64) {
        if max_path_id > self.max_path_id_remote {
            self.max_path_id_remote = max_path_id;
            self.test_and_signal_new_path_allowed();
        }
    }

    /// Swaps the congestion algorithm of every path
    pub fn set_congestion_algorithm(
        &mut self,
        algorithm: Option<Arc<dyn congestion::Algorithm>>,
        option: Option<Arc<str>>,
        now: Timestamp,
    ) {
        if let Some(previous) = &self.congestion_algorithm {
            for path in self.paths.iter_mut() {
                previous.delete(&mut path.recovery);
            }
        }

        self.congestion_algorithm = algorithm;
        self.settings.congestion_option = option;

        if let Some(algorithm) = &self.congestion_algorithm {
            let option = self.settings.congestion_option.as_deref();
            for path in self.paths.iter_mut() {
                algorithm.init(&mut path.recovery, option, now);
            }
        }
    }

    /// Arms keep-alive. A zero interval uses half of the idle timeout,
    /// which is never shorter than 3 retransmit timers of the default path.
    pub fn enable_keep_alive(&mut self, interval: Duration) {
        let interval = if interval.is_zero() {
            let idle_timeout = self.idle_timeout().unwrap_or_default();
            let floor = self
                .paths
                .get(0)
                .map_or(Duration::ZERO, |path| path.recovery.retransmit_timer * 3);
            idle_timeout.max(floor) / 2
        } else {
            interval
        };
        self.keep_alive = Some(interval);
    }

    pub fn disable_keep_alive(&mut self) {
        self.keep_alive = None;
    }

    /// Sets the spin bit policy. `On` is only accepted as a context default.
    pub fn set_spin_bit_policy(&mut self, policy: SpinBitPolicy) -> Result<(), Error> {
        if policy == SpinBitPolicy::On {
            return Err(Error::InvalidArgument);
        }
        self.settings.spin_bit_policy = policy;
        Ok(())
    }

    pub fn set_loss_bit_policy(&mut self, policy: LossBitPolicy) {
        self.settings.loss_bit_policy = policy;
        self.local_parameters.enable_loss_bit = policy.as_u8();
    }

    pub fn set_padding(&mut self, padding: Padding) {
        self.settings.padding = padding;
    }

    pub fn set_pmtud_policy(&mut self, policy: PmtudPolicy) {
        self.settings.pmtud_policy = policy;
    }

    pub fn set_path_callbacks(&mut self, enabled: bool) {
        self.settings.path_callbacks = enabled;
    }

    pub fn set_preemptive_repeat(&mut self, enabled: bool) {
        self.settings.preemptive_repeat = enabled;
    }

    /// Arms version negotiation towards `version`
    pub fn set_desired_version(&mut self, version: u32) {
        self.desired_version = Some(version);
        self.is_version_negotiation_armed = true;
    }

    /// Arms version negotiation after the peer rejected `version`
    pub fn set_rejected_version(&mut self, version: u32) {
        self.rejected_version = Some(version);
        self.is_version_negotiation_armed = true;
    }

    /// Opens a stream, with flow control windows from both sets of
    /// transport parameters
    pub fn create_stream(&mut self, id: StreamId) -> Result<&stream::Stream, Error> {
        self.streams
            .create(id, &self.local_parameters, &self.remote_parameters)
    }

    pub fn set_stream_priority(&mut self, id: StreamId, priority: u8) -> Result<(), Error> {
        self.streams.reorder_output_stream(id, priority)
    }
}
