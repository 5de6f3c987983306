// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// The protocol state of a connection.
///
/// Variants are declared in handshake progression order, so comparisons
/// such as `state < State::ClientAlmostReady` express "not yet almost ready".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    ClientInit,
    ClientInitSent,
    ClientRenegotiate,
    ClientRetryReceived,
    ClientInitResent,
    ServerInit,
    ServerHandshake,
    ClientHandshakeStart,
    ServerFalseStart,
    ServerAlmostReady,
    ClientAlmostReady,
    ClientFalseStart,
    ClientReadyStart,
    Ready,
    HandshakeFailure,
    HandshakeFailureResend,
    Disconnecting,
    ClosingReceived,
    Closing,
    Draining,
    Disconnected,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientInit => "client_init",
            Self::ClientInitSent => "client_init_sent",
            Self::ClientRenegotiate => "client_renegotiate",
            Self::ClientRetryReceived => "client_retry_received",
            Self::ClientInitResent => "client_init_resent",
            Self::ServerInit => "server_init",
            Self::ServerHandshake => "server_handshake",
            Self::ClientHandshakeStart => "client_handshake_start",
            Self::ServerFalseStart => "server_false_start",
            Self::ServerAlmostReady => "server_almost_ready",
            Self::ClientAlmostReady => "client_almost_ready",
            Self::ClientFalseStart => "client_false_start",
            Self::ClientReadyStart => "client_ready_start",
            Self::Ready => "ready",
            Self::HandshakeFailure => "handshake_failure",
            Self::HandshakeFailureResend => "handshake_failure_resend",
            Self::Disconnecting => "disconnecting",
            Self::ClosingReceived => "closing_received",
            Self::Closing => "closing",
            Self::Draining => "draining",
            Self::Disconnected => "disconnected",
        }
    }

    /// Returns true if application data may flow, possibly before the
    /// handshake is confirmed
    #[inline]
    pub fn is_ready_or_false_start(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::ClientReadyStart | Self::ServerFalseStart | Self::ClientFalseStart
        )
    }

    #[inline]
    pub fn is_handshake_failure(self) -> bool {
        matches!(self, Self::HandshakeFailure | Self::HandshakeFailureResend)
    }

    /// Returns true if the handshake has not completed and has not failed
    #[inline]
    pub fn is_handshaking(self) -> bool {
        self < Self::Ready && !self.is_ready_or_false_start()
    }

    #[inline]
    pub fn is_closing(self) -> bool {
        self >= Self::Disconnecting
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
