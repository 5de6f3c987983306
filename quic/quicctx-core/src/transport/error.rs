// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use core::fmt;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20
//# QUIC error codes are 62-bit unsigned integers.

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub struct TransportError {
    pub code: u64,
    pub frame_type: Option<u64>,
    pub reason: &'static str,
}

/// Codes at or above this value are local error codes and are never sent to the peer
pub const LOCAL_ERROR_CLASS: u64 = 0x400;

impl TransportError {
    /// Creates a new `TransportError`
    pub const fn new(code: u64) -> Self {
        Self {
            code,
            reason: "",
            frame_type: None,
        }
    }

    /// Creates an error for a TLS alert
    pub const fn crypto(alert: u8) -> Self {
        Self::new(0x100 | alert as u64)
    }

    /// Maps local error codes to `INTERNAL_ERROR` so they can be reported to the peer
    pub const fn for_peer(code: u64) -> Self {
        if code >= LOCAL_ERROR_CLASS {
            Self::INTERNAL_ERROR
        } else {
            Self::new(code)
        }
    }

    /// Updates the `TransportError` with the specified `frame_type`
    pub const fn with_frame_type(mut self, frame_type: u64) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    /// Updates the `TransportError` with the specified `reason`
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }

    /// Returns true if the code is in the TLS alert range
    pub const fn is_crypto_error(&self) -> bool {
        self.code & 0xff00 == 0x100
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.reason.is_empty() {
            self.reason.fmt(f)
        } else if let Some(description) = self.description() {
            description.fmt(f)
        } else {
            write!(f, "TransportError({:#x})", self.code)
        }
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("TransportError");

        d.field("code", &self.code);

        if let Some(description) = self.description() {
            d.field("description", &description);
        }

        if !self.reason.is_empty() {
            d.field("reason", &self.reason);
        }

        if let Some(frame_type) = self.frame_type {
            d.field("frame_type", &frame_type);
        }

        d.finish()
    }
}

/// Internal convenience macro for defining standard error codes
macro_rules! impl_errors {
    ($($(#[doc = $doc:expr])* $name:ident = $code:literal),* $(,)?) => {
        impl TransportError {
            $(
                $(#[doc = $doc])*
                pub const $name: Self = Self::new($code);
            )*

            pub fn description(&self) -> Option<&'static str> {
                match self.code {
                    $(
                        $code => Some(stringify!($name)),
                    )*
                    0x100..=0x1ff => Some("CRYPTO_ERROR"),
                    _ => None
                }
            }
        }

        #[test]
        fn description_test() {
            $(
                assert_eq!(&TransportError::$name.to_string(), stringify!($name));
            )*
            assert_eq!(&TransportError::crypto(0x28).to_string(), "CRYPTO_ERROR");
        }
    };
}

impl_errors! {
    /// An endpoint uses this with CONNECTION_CLOSE to signal that the connection
    /// is being closed abruptly in the absence of any error
    NO_ERROR = 0x0,
    /// The endpoint encountered an internal error and cannot continue with the connection
    INTERNAL_ERROR = 0x1,
    /// The server refused to accept a new connection
    CONNECTION_REFUSED = 0x2,
    /// An endpoint received more data than it permitted in its advertised data limits
    FLOW_CONTROL_ERROR = 0x3,
    /// An endpoint received a frame for a stream identifier that exceeded its
    /// advertised stream limit for the corresponding stream type
    STREAM_LIMIT_ERROR = 0x4,
    /// An endpoint received a frame for a stream that was not in a state that permitted that frame
    STREAM_STATE_ERROR = 0x5,
    /// An endpoint received a STREAM frame containing data that exceeded the previously
    /// established final size
    FINAL_SIZE_ERROR = 0x6,
    /// An endpoint received a frame that was badly formatted
    FRAME_ENCODING_ERROR = 0x7,
    /// An endpoint received transport parameters that were badly formatted
    TRANSPORT_PARAMETER_ERROR = 0x8,
    /// The number of connection IDs provided by the peer exceeds the advertised
    /// active_connection_id_limit
    CONNECTION_ID_LIMIT_ERROR = 0x9,
    /// An endpoint detected an error with protocol compliance that was not covered
    /// by more specific error codes
    PROTOCOL_VIOLATION = 0xa,
    /// A server received a client Initial that contained an invalid Token field
    INVALID_TOKEN = 0xb,
    /// The application or application protocol caused the connection to be closed
    APPLICATION_ERROR = 0xc,
    /// An endpoint has received more data in CRYPTO frames than it can buffer
    CRYPTO_BUFFER_EXCEEDED = 0xd,
    /// An endpoint detected errors in performing key updates
    KEY_UPDATE_ERROR = 0xe,
    /// An endpoint has reached the confidentiality or integrity limit for the AEAD algorithm
    AEAD_LIMIT_REACHED = 0xf,
    /// No viable network path exists
    NO_VIABLE_PATH = 0x10,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_codes_map_to_internal_test() {
        assert_eq!(TransportError::for_peer(0xa), TransportError::PROTOCOL_VIOLATION);
        assert_eq!(TransportError::for_peer(0x401), TransportError::INTERNAL_ERROR);
        assert!(TransportError::crypto(0x28).is_crypto_error());
        assert!(!TransportError::PROTOCOL_VIOLATION.is_crypto_error());
    }

    #[test]
    fn reason_display_test() {
        let error = TransportError::PROTOCOL_VIOLATION.with_reason("stash overflow");
        insta::assert_snapshot!(error.to_string(), @"stash overflow");
        insta::assert_debug_snapshot!(error.with_frame_type(0x18), @r###"
        TransportError {
            code: 10,
            description: "PROTOCOL_VIOLATION",
            reason: "stash overflow",
            frame_type: 24,
        }
        "###);
    }
}
