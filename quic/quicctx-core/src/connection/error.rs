// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::transport;

/// Errors that a connection can encounter.
#[derive(PartialEq, Eq, Debug, Copy, Clone, displaydoc::Display)]
#[non_exhaustive]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// The connection was closed without an error
    Closed,

    /// The connection was closed on the transport level with code {0:#x}
    Transport(u64),

    /// The connection was closed on the application level with code {0:#x}
    Application(u64),

    /// The handshake did not complete
    HandshakeFailed,

    /// The connection was closed because the connection's idle timer expired
    IdleTimerExpired,

    /// The peer signalled a stateless reset
    StatelessReset,

    /// The connection was closed due to an unspecified reason
    Unspecified,
}

impl Error {
    /// Returns true if the error was a crypto (TLS alert) error
    #[inline]
    pub fn is_handshake_error(&self) -> bool {
        match self {
            Self::HandshakeFailed => true,
            Self::Transport(code) => transport::Error::new(*code).is_crypto_error(),
            _ => false,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(error: transport::Error) -> Self {
        match error.code {
            0 => Self::Closed,
            code => Self::Transport(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_transport_test() {
        assert_eq!(Error::from(transport::Error::NO_ERROR), Error::Closed);
        assert_eq!(
            Error::from(transport::Error::PROTOCOL_VIOLATION),
            Error::Transport(0xa)
        );
        assert!(Error::Transport(0x128).is_handshake_error());
        assert!(!Error::Transport(0xa).is_handshake_error());
    }

    #[test]
    fn display_test() {
        insta::assert_snapshot!(Error::Transport(0xa).to_string(), @"The connection was closed on the transport level with code 0xa");
    }
}
