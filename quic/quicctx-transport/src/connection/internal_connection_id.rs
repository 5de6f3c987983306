// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// A connection ID which is stable and internally identifies a connection
/// over the whole lifetime of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternalConnectionId(u64);

impl From<InternalConnectionId> for u64 {
    #[inline]
    fn from(id: InternalConnectionId) -> Self {
        id.0
    }
}

impl From<u64> for InternalConnectionId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InternalConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates IDs of type [`InternalConnectionId`].
///
/// Ids increase monotonically, which gives connections a creation order.
#[derive(Debug, Default)]
pub struct InternalConnectionIdGenerator {
    next: u64,
}

impl InternalConnectionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the next [`InternalConnectionId`]
    pub fn generate_id(&mut self) -> InternalConnectionId {
        let id = self.next;
        self.next += 1;
        InternalConnectionId(id)
    }
}
