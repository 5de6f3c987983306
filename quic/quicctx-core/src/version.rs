// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The table of supported QUIC versions

pub const V1: u32 = 0x0000_0001;
pub const V2: u32 = 0x6b33_43cf;
pub const DRAFT_29: u32 = 0xff00_001d;

/// Versions in order of preference
pub const SUPPORTED: &[u32] = &[V1, V2, DRAFT_29];

/// Index of the version used when the application asks for an unknown one
pub const INTEROP_INDEX: usize = 0;

/// Returns the position of `version` in [`SUPPORTED`]
#[inline]
pub fn index_of(version: u32) -> Option<usize> {
    SUPPORTED.iter().position(|v| *v == version)
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-15
//# Versions that follow the pattern 0x?a?a?a?a are reserved for use in
//# forcing version negotiation to be exercised
#[inline]
pub const fn is_grease(version: u32) -> bool {
    version & 0x0f0f_0f0f == 0x0a0a_0a0a
}

/// The outcome of picking a version for a new connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Index into [`SUPPORTED`]
    pub index: usize,
    /// The version placed on the wire
    pub proposed: u32,
}

/// Picks the version a client proposes.
///
/// No preference selects the most preferred version. A greased preference is
/// proposed verbatim so the peer exercises version negotiation, and any other
/// unknown preference falls back to the interop version.
pub fn select_for_client(preferred: Option<u32>) -> Selection {
    match preferred {
        None => Selection {
            index: 0,
            proposed: SUPPORTED[0],
        },
        Some(version) => match index_of(version) {
            Some(index) => Selection {
                index,
                proposed: version,
            },
            None if is_grease(version) => Selection {
                index: INTEROP_INDEX,
                proposed: version,
            },
            None => Selection {
                index: INTEROP_INDEX,
                proposed: SUPPORTED[INTEROP_INDEX],
            },
        },
    }
}

/// Picks the version a server answers with, falling back to the first entry
pub fn select_for_server(received: u32) -> Selection {
    match index_of(received) {
        Some(index) => Selection {
            index,
            proposed: received,
        },
        None => Selection {
            index: 0,
            proposed: SUPPORTED[0],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_selection_test() {
        assert_eq!(select_for_client(None).proposed, V1);
        assert_eq!(
            select_for_client(Some(V2)),
            Selection {
                index: 1,
                proposed: V2
            }
        );
        assert_eq!(select_for_client(Some(0x1a2a_3a4a)).proposed, 0x1a2a_3a4a);
        assert_eq!(select_for_client(Some(0x1234_5678)).proposed, V1);
    }

    #[test]
    fn server_selection_test() {
        assert_eq!(select_for_server(DRAFT_29).index, 2);
        assert_eq!(select_for_server(0x1234_5678).proposed, V1);
    }

    #[test]
    fn grease_pattern_test() {
        bolero::check!().with_type::<u32>().cloned().for_each(|v| {
            let greased = (v & 0xf0f0_f0f0) | 0x0a0a_0a0a;
            assert!(is_grease(greased));
        });
        assert!(!is_grease(V1));
    }
}
