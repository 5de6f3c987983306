// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quicctx_core::{connection, transport};

/// Errors returned by engine operations that were refused locally.
///
/// Peer-induced failures are reported as [`transport::Error`] and funnelled
/// through [`Connection::connection_error`](crate::connection::Connection::connection_error).
#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[non_exhaustive]
pub enum Error {
    /// Migration was disabled by one of the endpoints
    MigrationDisabled,
    /// The connection is not ready to open a new path
    PathNotReady,
    /// The connection already uses the maximum number of paths
    PathLimitExceeded,
    /// The peer has not yet allowed another path id
    PathIdBlocked,
    /// No spare connection ID is available for a new path
    PathConnectionIdBlocked,
    /// No new connection ID is available
    ConnectionIdNotAvailable,
    /// The local and peer addresses have different families
    AddressFamilyMismatch,
    /// Neither address could be resolved for the new path
    UnexpectedAddress,
    /// No path with the given id exists
    PathNotFound,
    /// The operation requires multipath to be negotiated
    MultipathNotEnabled,
    /// The path id exceeds the negotiated maximum
    PathIdOutOfRange,
    /// The last remaining path cannot be abandoned
    LastPath,
    /// A key rotation cannot start until the current epoch is acknowledged
    KeyRotationNotReady,
    /// No unique local connection ID could be generated
    ConnectionIdCollision,
    /// The connection cannot be created in the current configuration
    ConnectionRefused,
    /// The requested value is out of range
    InvalidArgument,
    /// The connection does not exist
    ConnectionNotFound,
    /// The address validation token was already presented
    TokenReused,
    /// The TLS provider failed: {0}
    Tls(crate::tls::Error),
    /// The connection failed: {0}
    Transport(transport::Error),
}

impl Error {
    /// Returns true if the refusal may clear up later, such as when the peer
    /// provides more connection IDs or raises its path id limit.
    ///
    /// Callers can subscribe for a notification instead of retrying.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PathNotReady
                | Self::PathIdBlocked
                | Self::PathConnectionIdBlocked
                | Self::PathLimitExceeded
                | Self::ConnectionIdNotAvailable
        )
    }
}

impl From<transport::Error> for Error {
    #[inline]
    fn from(error: transport::Error) -> Self {
        Self::Transport(error)
    }
}

impl From<crate::tls::Error> for Error {
    #[inline]
    fn from(error: crate::tls::Error) -> Self {
        Self::Tls(error)
    }
}

impl From<Error> for connection::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Transport(error) => error.into(),
            Error::Tls(_) => connection::Error::HandshakeFailed,
            _ => connection::Error::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_test() {
        assert!(Error::PathIdBlocked.is_transient());
        assert!(Error::PathConnectionIdBlocked.is_transient());
        assert!(!Error::MigrationDisabled.is_transient());
        assert!(Error::PathNotReady.is_transient());
        assert!(!Error::LastPath.is_transient());
        assert!(!Error::AddressFamilyMismatch.is_transient());
    }

    #[test]
    fn display_test() {
        insta::assert_snapshot!(Error::PathIdBlocked.to_string(), @"The peer has not yet allowed another path id");
        let error = Error::from(transport::Error::PROTOCOL_VIOLATION.with_reason("sequence reused"));
        insta::assert_snapshot!(error.to_string(), @"The connection failed: sequence reused");
    }
}
