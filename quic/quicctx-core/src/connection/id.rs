// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the QUIC connection ID

use core::convert::TryFrom;

#[cfg(any(test, feature = "generator"))]
use bolero_generator::*;

//= https://www.rfc-editor.org/rfc/rfc9000#section-5.1
//# Each connection possesses a set of connection identifiers, or
//# connection IDs, each of which can identify the connection.
//# Connection IDs are independently selected by endpoints; each endpoint
//# selects the connection IDs that its peer uses.

/// The maximum size of a connection ID.
pub const MAX_LEN: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// The connection ID does not meet the length requirements
    InvalidLength,
}

macro_rules! id {
    ($type:ident, $min_len:expr) => {
        /// Uniquely identifies a QUIC connection between 2 peers
        #[derive(Copy, Clone)]
        #[cfg_attr(any(feature = "generator", test), derive(TypeGenerator))]
        pub struct $type {
            bytes: [u8; MAX_LEN],
            #[cfg_attr(any(feature = "generator", test), generator(Self::GENERATOR))]
            len: u8,
        }

        // Bytes past `len` are not part of the ID.
        impl PartialEq for $type {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                self.as_bytes() == other.as_bytes()
            }
        }

        impl Eq for $type {}

        impl core::hash::Hash for $type {
            #[inline]
            fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
                self.as_bytes().hash(state);
            }
        }

        impl PartialOrd for $type {
            #[inline]
            fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $type {
            #[inline]
            fn cmp(&self, other: &Self) -> core::cmp::Ordering {
                self.as_bytes().cmp(other.as_bytes())
            }
        }

        impl core::fmt::Debug for $type {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}(", stringify!($type))?;
                for byte in self.as_bytes() {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, ")")
            }
        }

        impl $type {
            /// The minimum length for this connection ID type
            pub const MIN_LEN: usize = $min_len;

            /// A zero-length connection ID
            pub const EMPTY: Self = Self {
                bytes: [0; MAX_LEN],
                len: 0,
            };

            #[cfg(any(feature = "generator", test))]
            const GENERATOR: core::ops::RangeInclusive<u8> = $min_len..=(MAX_LEN as u8);

            /// Creates a connection ID from a byte slice.
            ///
            /// Returns `None` when the slice exceeds [`MAX_LEN`].
            #[inline]
            pub fn try_from_bytes(bytes: &[u8]) -> Option<$type> {
                Self::try_from(bytes).ok()
            }

            /// Returns the Connection ID in byte form
            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                self.as_ref()
            }

            /// Returns the length of the connection id
            #[inline]
            pub const fn len(&self) -> usize {
                self.len as usize
            }

            /// Returns true if this connection ID is zero-length
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.len == 0
            }

            /// A connection ID to use for testing
            #[cfg(any(test, feature = "testing"))]
            pub const TEST_ID: Self = Self::test_id();

            // Builds a max length test ID whose first and last bytes
            // spell the first six letters of the type name.
            #[cfg(any(test, feature = "testing"))]
            const fn test_id() -> Self {
                let type_bytes = stringify!($type).as_bytes();
                let mut result = [0u8; MAX_LEN];
                let mut i = 0;
                while i < 6 && i < type_bytes.len() {
                    result[i] = type_bytes[i];
                    result[MAX_LEN - 6 + i] = type_bytes[i];
                    i += 1;
                }
                Self {
                    bytes: result,
                    len: MAX_LEN as u8,
                }
            }
        }

        impl Default for $type {
            #[inline]
            fn default() -> Self {
                Self::EMPTY
            }
        }

        impl From<[u8; MAX_LEN]> for $type {
            #[inline]
            fn from(bytes: [u8; MAX_LEN]) -> Self {
                Self {
                    bytes,
                    len: MAX_LEN as u8,
                }
            }
        }

        impl TryFrom<&[u8]> for $type {
            type Error = Error;

            #[inline]
            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let len = slice.len();
                if !($type::MIN_LEN..=MAX_LEN).contains(&len) {
                    return Err(Error::InvalidLength);
                }
                let mut bytes = [0; MAX_LEN];
                bytes[..len].copy_from_slice(slice);
                Ok(Self {
                    bytes,
                    len: len as u8,
                })
            }
        }

        impl AsRef<[u8]> for $type {
            #[inline]
            fn as_ref(&self) -> &[u8] {
                &self.bytes[0..self.len as usize]
            }
        }
    };
}

// Connection IDs that are generated locally and used to route packets from the peer to the local
// endpoint. A context configured with a zero local ID length routes by address only.
id!(LocalId, 0);

// Connection IDs used to route packets to the peer. The peer may choose to use zero-length
// connection IDs.
id!(PeerId, 0);

//= https://www.rfc-editor.org/rfc/rfc9000#section-7.2
//# When an Initial packet is sent by a client that has not previously
//# received an Initial or Retry packet from the server, the client
//# populates the Destination Connection ID field with an unpredictable
//# value.
id!(InitialId, 0);

/// The length of the initial ID a client picks when the application does not
/// provide one
pub const DEFAULT_INITIAL_LEN: usize = 8;

impl From<InitialId> for LocalId {
    #[inline]
    fn from(id: InitialId) -> Self {
        Self {
            bytes: id.bytes,
            len: id.len,
        }
    }
}

impl From<InitialId> for PeerId {
    #[inline]
    fn from(id: InitialId) -> Self {
        Self {
            bytes: id.bytes,
            len: id.len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_bounds_test() {
        bolero::check!().with_type::<LocalId>().for_each(|id| {
            assert!(id.len() <= MAX_LEN);
            assert_eq!(LocalId::try_from_bytes(id.as_bytes()), Some(*id));
        });

        assert!(PeerId::try_from_bytes(&[]).unwrap().is_empty());
        assert_eq!(
            LocalId::try_from(&[0u8; MAX_LEN + 1][..]),
            Err(Error::InvalidLength)
        );
    }

    #[test]
    fn trailing_bytes_test() {
        use core::hash::BuildHasher;

        let mut bytes = [0u8; MAX_LEN];
        bytes[..4].copy_from_slice(&[1, 2, 3, 4]);
        let mut padded = LocalId::from(bytes);
        padded.len = 4;
        let trimmed = LocalId::try_from_bytes(&[1, 2, 3, 4]).unwrap();
        bytes[MAX_LEN - 1] = 0xff;
        let mut dirty = LocalId::from(bytes);
        dirty.len = 4;

        assert_eq!(dirty, trimmed);
        assert_eq!(dirty, padded);
        assert_eq!(dirty.cmp(&trimmed), core::cmp::Ordering::Equal);

        let hasher = std::collections::hash_map::RandomState::new();
        assert_eq!(hasher.hash_one(dirty), hasher.hash_one(trimmed));
    }

    #[test]
    fn debug_test() {
        let id = LocalId::try_from_bytes(&[0xaa, 0x01]).unwrap();
        insta::assert_snapshot!(format!("{id:?}"), @"LocalId(aa01)");
        insta::assert_snapshot!(format!("{:?}", PeerId::EMPTY), @"PeerId()");
    }

    #[test]
    fn initial_conversion_test() {
        let initial = InitialId::try_from_bytes(b"initial1").unwrap();
        assert_eq!(LocalId::from(initial).as_bytes(), b"initial1");
        assert_eq!(PeerId::from(initial).as_bytes(), b"initial1");
    }
}
