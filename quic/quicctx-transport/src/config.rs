// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Context-wide defaults copied into every new connection

use crate::congestion;
use alloc::sync::Arc;
use core::time::Duration;
use quicctx_core::{
    connection::{self, LocalId},
    inet::{SocketAddrV4, SocketAddrV6},
    stateless_reset,
};


/// The maximum number of paths a connection maintains at once
pub const MAX_PATHS: usize = 8;

/// The smallest stateless reset a peer could mistake for a short header packet
pub const RESET_PACKET_MIN_SIZE: u32 = 23 + stateless_reset::LEN as u32;

/// The largest UDP payload sent before path MTU discovery
pub const PRACTICAL_MAX_MTU: u64 = 1440;

/// The largest datagram size used to derive congestion window clamps
pub const MAX_PACKET_SIZE: u64 = 1536;

/// The smallest congestion window a path may fall back to
pub const CWIN_MINIMUM: u64 = 2 * MAX_PACKET_SIZE;

/// Key rotation interval, in packets, used when none is configured
pub const DEFAULT_CRYPTO_EPOCH_LENGTH: u64 = 1 << 22;

/// The number of half-open server connections tolerated before tokens are required
pub const DEFAULT_HALF_OPEN_RETRY_THRESHOLD: u32 = 64;

pub const DEFAULT_PRIORITY: u8 = 9;

/// Handshake duration limit, also used as the default idle timeout
pub const HANDSHAKE_MAX: Duration = Duration::from_secs(30);

pub const ACK_DELAY_MAX: Duration = Duration::from_millis(10);
pub const ACK_DELAY_MAX_DEFAULT: Duration = Duration::from_millis(25);
pub const ACK_DELAY_MIN: Duration = Duration::from_millis(1);

/// An error returned when a configuration value is out of range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationError(&'static str);

impl core::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ValidationError {}

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# preferred_address (0x0d):  The server's preferred address is used to
//#    effect a change in server address at the end of the handshake
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreferredAddress {
    pub ipv4: Option<SocketAddrV4>,
    pub ipv6: Option<SocketAddrV6>,
    /// Filled in with a fresh path-0 local ID when a connection is created
    pub connection_id: LocalId,
    pub stateless_reset_token: stateless_reset::Secret,
}

/// The transport parameters advertised by one endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportParameters {
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
    pub initial_max_data: u64,
    /// Number of bidirectional streams the peer may open
    pub initial_max_streams_bidi: u64,
    /// Number of unidirectional streams the peer may open
    pub initial_max_streams_uni: u64,
    pub max_idle_timeout: Duration,
    /// Zero lets the context derive a value from its MTU limit
    pub max_packet_size: u64,
    pub max_datagram_frame_size: u64,
    pub ack_delay_exponent: u8,
    pub active_connection_id_limit: u64,
    pub max_ack_delay: Duration,
    pub min_ack_delay: Duration,
    pub migration_disabled: bool,
    pub enable_loss_bit: u8,
    pub enable_time_stamp: bool,
    pub enable_bdp_frame: bool,
    pub is_multipath_enabled: bool,
    pub initial_max_path_id: u64,
    pub address_discovery_mode: u8,
    pub preferred_address: Option<PreferredAddress>,
}

impl Default for TransportParameters {
    fn default() -> Self {
        Self {
            initial_max_stream_data_bidi_local: 0x20_0000,
            initial_max_stream_data_bidi_remote: 65635,
            initial_max_stream_data_uni: 65535,
            initial_max_data: 0x10_0000,
            initial_max_streams_bidi: 512,
            initial_max_streams_uni: 512,
            max_idle_timeout: HANDSHAKE_MAX,
            max_packet_size: PRACTICAL_MAX_MTU,
            max_datagram_frame_size: 0,
            ack_delay_exponent: 3,
            active_connection_id_limit: MAX_PATHS as u64,
            max_ack_delay: ACK_DELAY_MAX,
            min_ack_delay: ACK_DELAY_MIN,
            migration_disabled: false,
            enable_loss_bit: 2,
            enable_time_stamp: false,
            enable_bdp_frame: false,
            is_multipath_enabled: false,
            initial_max_path_id: 0,
            address_discovery_mode: 0,
            preferred_address: None,
        }
    }
}

impl TransportParameters {
    /// The values assumed for a peer before its parameters are received
    pub fn peer_defaults() -> Self {
        Self {
            initial_max_stream_data_bidi_local: 0,
            initial_max_stream_data_bidi_remote: 0,
            initial_max_stream_data_uni: 0,
            initial_max_data: 0,
            initial_max_streams_bidi: 0,
            initial_max_streams_uni: 0,
            active_connection_id_limit: 2,
            ..Self::default()
        }
    }
}

/// Controls whether the latency spin bit is used
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpinBitPolicy {
    /// Spin, except on a random share of connections
    Basic,
    /// Send random values
    Random,
    /// Never spin
    Null,
    /// Always spin. Only valid as a context default.
    On,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossBitPolicy {
    None,
    Receive,
    SendReceive,
}

impl LossBitPolicy {
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Receive => 1,
            Self::SendReceive => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PmtudPolicy {
    #[default]
    Basic,
    Delayed,
    Required,
    Disabled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Padding {
    /// Pads packets to a multiple of this size, 0 disables
    pub multiple: u32,
    pub min_size: u32,
}

/// Retry token behavior for servers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CookieMode {
    /// Require a token on every new connection
    pub force_check_token: bool,
    /// Hand out NEW_TOKEN tokens
    pub provide_token: bool,
}

impl CookieMode {
    /// Decodes the bit flags used by command line tools: 1 forces token
    /// checks and 2 provides tokens
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        Self {
            force_check_token: bits & 1 != 0,
            provide_token: bits & 2 != 0,
        }
    }
}

/// Context-wide defaults
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) max_connections: u32,
    pub(crate) local_id_len: usize,
    pub(crate) local_id_ttl: Option<Duration>,
    pub(crate) transport_parameters: TransportParameters,
    pub(crate) padding: Padding,
    pub(crate) spin_bit_policy: SpinBitPolicy,
    pub(crate) loss_bit_policy: LossBitPolicy,
    pub(crate) address_discovery_mode: u8,
    pub(crate) pmtud_policy: PmtudPolicy,
    pub(crate) congestion: congestion::Registry,
    pub(crate) congestion_algorithm: Option<Arc<dyn congestion::Algorithm>>,
    pub(crate) congestion_option: Option<Arc<str>>,
    pub(crate) max_half_open_before_retry: u32,
    pub(crate) cookie_mode: CookieMode,
    pub(crate) cwin_min: u64,
    pub(crate) cwin_max: u64,
    pub(crate) rtt_update_delta: Duration,
    pub(crate) pacing_rate_update_delta: u64,
    pub(crate) crypto_epoch_length: u64,
    pub(crate) stream_priority: u8,
    pub(crate) datagram_priority: u8,
    pub(crate) handshake_timeout: Duration,
    pub(crate) keep_alive_interval: Option<Duration>,
    pub(crate) preemptive_repeat: bool,
    pub(crate) path_callbacks: bool,
    pub(crate) bdp_frame: bool,
    pub(crate) mtu_max: u64,
    pub(crate) random_initial: bool,
    pub(crate) constant_challenges: bool,
    pub(crate) reset_seed: Option<[u8; stateless_reset::LEN]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_connections: 1,
            local_id_len: 8,
            local_id_ttl: None,
            transport_parameters: TransportParameters::default(),
            padding: Padding {
                multiple: 0,
                min_size: RESET_PACKET_MIN_SIZE,
            },
            spin_bit_policy: SpinBitPolicy::Basic,
            loss_bit_policy: LossBitPolicy::None,
            address_discovery_mode: 0,
            pmtud_policy: PmtudPolicy::Basic,
            congestion: congestion::Registry::default(),
            congestion_algorithm: None,
            congestion_option: None,
            max_half_open_before_retry: DEFAULT_HALF_OPEN_RETRY_THRESHOLD,
            cookie_mode: CookieMode::default(),
            cwin_min: CWIN_MINIMUM,
            cwin_max: u64::MAX,
            rtt_update_delta: Duration::ZERO,
            pacing_rate_update_delta: 0,
            crypto_epoch_length: DEFAULT_CRYPTO_EPOCH_LENGTH,
            stream_priority: DEFAULT_PRIORITY,
            datagram_priority: DEFAULT_PRIORITY,
            handshake_timeout: HANDSHAKE_MAX,
            keep_alive_interval: None,
            preemptive_repeat: false,
            path_callbacks: false,
            bdp_frame: false,
            mtu_max: 0,
            random_initial: true,
            constant_challenges: false,
            reset_seed: None,
        }
    }
}

macro_rules! getter {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&self) -> $ty {
            self.$name.clone()
        }
    };
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of connections the context accepts. Zero is raised to one.
    pub fn with_max_connections(mut self, value: u32) -> Result<Self, ValidationError> {
        self.max_connections = value.max(1);
        Ok(self)
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-5.1
    //# A zero-length connection ID can be used when a connection ID is not
    //# needed to route to the correct endpoint.
    pub fn with_local_id_len(mut self, value: usize) -> Result<Self, ValidationError> {
        if value > connection::id::MAX_LEN {
            return Err(ValidationError("local connection ID length exceeds 20 bytes"));
        }
        self.local_id_len = value;
        Ok(self)
    }

    pub fn with_local_id_ttl(mut self, value: Duration) -> Result<Self, ValidationError> {
        if value.is_zero() {
            return Err(ValidationError("local connection ID ttl must be non-zero"));
        }
        self.local_id_ttl = Some(value);
        Ok(self)
    }

    pub fn with_transport_parameters(
        mut self,
        value: TransportParameters,
    ) -> Result<Self, ValidationError> {
        //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
        //# The value of the
        //# active_connection_id_limit parameter MUST be at least 2.
        if value.active_connection_id_limit < 2 {
            return Err(ValidationError(
                "active_connection_id_limit must be at least 2",
            ));
        }
        self.transport_parameters = value;
        Ok(self)
    }

    pub fn with_idle_timeout(mut self, value: Duration) -> Result<Self, ValidationError> {
        self.transport_parameters.max_idle_timeout = value;
        Ok(self)
    }

    pub fn with_padding(mut self, multiple: u32, min_size: u32) -> Result<Self, ValidationError> {
        self.padding = Padding { multiple, min_size };
        Ok(self)
    }

    pub fn with_spin_bit_policy(mut self, value: SpinBitPolicy) -> Result<Self, ValidationError> {
        self.spin_bit_policy = value;
        Ok(self)
    }

    /// Sets the loss bit policy, which is also advertised in the transport parameters
    pub fn with_loss_bit_policy(mut self, value: LossBitPolicy) -> Result<Self, ValidationError> {
        self.loss_bit_policy = value;
        self.transport_parameters.enable_loss_bit = value.as_u8();
        Ok(self)
    }

    /// Enables multipath, advertising an initial maximum path id of 2
    pub fn with_multipath(mut self, enabled: bool) -> Result<Self, ValidationError> {
        if enabled {
            self.transport_parameters.is_multipath_enabled = true;
            self.transport_parameters.initial_max_path_id = 2;
        }
        Ok(self)
    }

    /// Modes 1 to 3 are valid, any other value disables address discovery
    pub fn with_address_discovery_mode(mut self, value: u8) -> Result<Self, ValidationError> {
        let mode = if (1..=3).contains(&value) { value } else { 0 };
        self.address_discovery_mode = mode;
        self.transport_parameters.address_discovery_mode = mode;
        Ok(self)
    }

    pub fn with_pmtud_policy(mut self, value: PmtudPolicy) -> Result<Self, ValidationError> {
        self.pmtud_policy = value;
        Ok(self)
    }

    /// Installs the list of congestion algorithms the application supports
    pub fn with_congestion_registry(
        mut self,
        value: congestion::Registry,
    ) -> Result<Self, ValidationError> {
        self.congestion = value;
        Ok(self)
    }

    /// Selects the default algorithm by name from the installed registry
    pub fn with_congestion_algorithm(
        mut self,
        name: &str,
        option: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let algorithm = self
            .congestion
            .get(name)
            .ok_or(ValidationError("unknown congestion algorithm"))?;
        self.congestion_algorithm = Some(algorithm);
        self.congestion_option = option.map(Arc::from);
        Ok(self)
    }

    pub fn with_max_half_open_before_retry(mut self, value: u32) -> Result<Self, ValidationError> {
        self.max_half_open_before_retry = value;
        Ok(self)
    }

    pub fn with_cookie_mode(mut self, value: CookieMode) -> Result<Self, ValidationError> {
        self.cookie_mode = value;
        Ok(self)
    }

    /// Values of zero or below one packet leave the window unbounded
    pub fn with_cwin_max(mut self, value: u64) -> Result<Self, ValidationError> {
        self.cwin_max = if value < MAX_PACKET_SIZE {
            u64::MAX
        } else {
            value
        };
        Ok(self)
    }

    /// Values outside of `[one packet, cwin_max]` restore the default
    pub fn with_cwin_min(mut self, value: u64) -> Result<Self, ValidationError> {
        self.cwin_min = if value > self.cwin_max || value < MAX_PACKET_SIZE {
            CWIN_MINIMUM
        } else {
            value
        };
        Ok(self)
    }

    /// Sets how far RTT and pacing rate move before the application is told
    pub fn with_quality_update_deltas(
        mut self,
        rtt: Duration,
        pacing_rate: u64,
    ) -> Result<Self, ValidationError> {
        self.rtt_update_delta = rtt;
        self.pacing_rate_update_delta = pacing_rate;
        Ok(self)
    }

    /// Zero restores the default epoch length
    pub fn with_crypto_epoch_length(mut self, value: u64) -> Result<Self, ValidationError> {
        self.crypto_epoch_length = if value == 0 {
            DEFAULT_CRYPTO_EPOCH_LENGTH
        } else {
            value
        };
        Ok(self)
    }

    pub fn with_stream_priority(mut self, value: u8) -> Result<Self, ValidationError> {
        self.stream_priority = value;
        Ok(self)
    }

    pub fn with_datagram_priority(mut self, value: u8) -> Result<Self, ValidationError> {
        self.datagram_priority = value;
        Ok(self)
    }

    pub fn with_handshake_timeout(mut self, value: Duration) -> Result<Self, ValidationError> {
        self.handshake_timeout = value;
        Ok(self)
    }

    /// Arms keep-alive on new connections. Zero derives the interval from
    /// the idle timeout.
    pub fn with_keep_alive_interval(mut self, value: Duration) -> Result<Self, ValidationError> {
        self.keep_alive_interval = Some(value);
        Ok(self)
    }

    pub fn with_preemptive_repeat(mut self, enabled: bool) -> Result<Self, ValidationError> {
        self.preemptive_repeat = enabled;
        Ok(self)
    }

    /// Enables path events on the application callback
    pub fn with_path_callbacks(mut self, enabled: bool) -> Result<Self, ValidationError> {
        self.path_callbacks = enabled;
        Ok(self)
    }

    pub fn with_bdp_frame(mut self, enabled: bool) -> Result<Self, ValidationError> {
        self.bdp_frame = enabled;
        Ok(self)
    }

    /// Sets the MTU from which a zero `max_packet_size` is derived
    pub fn with_mtu_max(mut self, value: u64) -> Result<Self, ValidationError> {
        if value != 0 && value < 1200 {
            return Err(ValidationError("mtu_max must be 0 or at least 1200"));
        }
        self.mtu_max = value;
        Ok(self)
    }

    /// Randomizes initial packet numbers
    pub fn with_random_initial(mut self, enabled: bool) -> Result<Self, ValidationError> {
        self.random_initial = enabled;
        Ok(self)
    }

    /// Uses predictable path challenges, for reproducible tests
    pub fn with_constant_challenges(mut self, enabled: bool) -> Result<Self, ValidationError> {
        self.constant_challenges = enabled;
        Ok(self)
    }

    pub fn with_reset_seed(
        mut self,
        value: [u8; stateless_reset::LEN],
    ) -> Result<Self, ValidationError> {
        self.reset_seed = Some(value);
        Ok(self)
    }

    getter!(max_connections, u32);
    getter!(local_id_len, usize);
    getter!(local_id_ttl, Option<Duration>);
    getter!(transport_parameters, TransportParameters);
    getter!(padding, Padding);
    getter!(spin_bit_policy, SpinBitPolicy);
    getter!(loss_bit_policy, LossBitPolicy);
    getter!(pmtud_policy, PmtudPolicy);
    getter!(max_half_open_before_retry, u32);
    getter!(cookie_mode, CookieMode);
    getter!(cwin_min, u64);
    getter!(cwin_max, u64);
    getter!(crypto_epoch_length, u64);
    getter!(stream_priority, u8);
    getter!(datagram_priority, u8);
    getter!(handshake_timeout, Duration);
    getter!(keep_alive_interval, Option<Duration>);
    getter!(path_callbacks, bool);

    #[inline]
    pub fn congestion(&self) -> &congestion::Registry {
        &self.congestion
    }

    #[inline]
    pub fn congestion_algorithm(&self) -> Option<&Arc<dyn congestion::Algorithm>> {
        self.congestion_algorithm.as_ref()
    }
}
