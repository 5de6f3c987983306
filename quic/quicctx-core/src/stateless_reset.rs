// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the stateless reset secret

use core::hash::{Hash, Hasher};
use subtle::ConstantTimeEq;

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.3
//# Stateless Reset {
//#   Fixed Bits (2) = 1,
//#   Unpredictable Bits (38..),
//#   Stateless Reset Token (128),
//# }

pub const LEN: usize = 128 / 8;

/// The stateless reset token that the peer associates with a connection ID
#[derive(Copy, Clone, Debug, PartialOrd, Ord, Default)]
#[cfg_attr(any(feature = "generator", test), derive(bolero_generator::TypeGenerator))]
pub struct Secret([u8; LEN]);

impl Secret {
    /// A zeroed out stateless reset secret
    pub const ZEROED: Self = Self([0; LEN]);

    #[inline]
    pub const fn new(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; LEN] {
        &self.0
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-10.3.1
//# When comparing a datagram to stateless reset token values, endpoints
//# MUST perform the comparison without leaking information about the
//# value of the token.
impl PartialEq for Secret {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Secret {}

impl Hash for Secret {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl From<[u8; LEN]> for Secret {
    #[inline]
    fn from(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Secret {
    type Error = core::array::TryFromSliceError;

    #[inline]
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes = bytes.try_into()?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Secret {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::Secret;

    pub const TEST_SECRET_1: Secret = Secret(11111111123456578987654321u128.to_be_bytes());
    pub const TEST_SECRET_2: Secret = Secret(222222222123456578987654321u128.to_be_bytes());
    pub const TEST_SECRET_3: Secret = Secret(333333333123456578987654321u128.to_be_bytes());
    pub const TEST_SECRET_4: Secret = Secret(444444444123456578987654321u128.to_be_bytes());
}
