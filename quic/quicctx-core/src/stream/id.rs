// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::endpoint;

//= https://www.rfc-editor.org/rfc/rfc9000#section-2.1
//# The least significant bit (0x01) of the stream ID identifies the
//# initiator of the stream.  Client-initiated streams have even-numbered
//# stream IDs (with the bit set to 0), and server-initiated streams have
//# odd-numbered stream IDs (with the bit set to 1).
//#
//# The second least significant bit (0x02) of the stream ID distinguishes
//# between bidirectional streams (with the bit set to 0) and
//# unidirectional streams (with the bit set to 1).

/// The direction of a stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    Bidirectional,
    Unidirectional,
}

/// The ID of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(any(feature = "generator", test), derive(bolero_generator::TypeGenerator))]
pub struct StreamId(u64);

impl StreamId {
    /// The number of stream types, used to size per-type tables
    pub const TYPE_COUNT: usize = 4;

    #[inline]
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the first stream id for the given initiator and direction
    #[inline]
    pub fn initial(initiator: endpoint::Type, stream_type: StreamType) -> Self {
        Self::from_rank(1, initiator, stream_type)
    }

    /// Builds the stream id of the `rank`-th stream (starting at 1) of the
    /// given initiator and direction. Rank 0 yields the id just before the
    /// first stream, which is used to express "no stream allowed".
    #[inline]
    pub fn from_rank(rank: u64, initiator: endpoint::Type, stream_type: StreamType) -> Self {
        let type_bits = Self::type_bits(initiator, stream_type);
        Self((rank << 2).wrapping_sub(4) | type_bits)
    }

    /// Returns the 1-based rank of this stream within its type
    #[inline]
    pub const fn rank(self) -> u64 {
        (self.0 >> 2) + 1
    }

    /// Returns the index of this stream's type, in `0..TYPE_COUNT`
    #[inline]
    pub const fn type_index(self) -> usize {
        (self.0 & 3) as usize
    }

    /// Returns the endpoint which opened the stream
    #[inline]
    pub fn initiator(self) -> endpoint::Type {
        if self.0 & 1 == 0 {
            endpoint::Type::Client
        } else {
            endpoint::Type::Server
        }
    }

    #[inline]
    pub fn stream_type(self) -> StreamType {
        if self.0 & 2 == 0 {
            StreamType::Bidirectional
        } else {
            StreamType::Unidirectional
        }
    }

    #[inline]
    pub fn is_bidirectional(self) -> bool {
        self.stream_type() == StreamType::Bidirectional
    }

    /// Returns true if the stream was opened by the given local endpoint
    #[inline]
    pub fn is_local(self, local: endpoint::Type) -> bool {
        self.initiator() == local
    }

    /// Returns the next stream of the same type
    #[inline]
    pub fn next_of_type(self) -> Option<Self> {
        self.0.checked_add(4).map(Self)
    }

    #[inline]
    fn type_bits(initiator: endpoint::Type, stream_type: StreamType) -> u64 {
        let initiator = match initiator {
            endpoint::Type::Client => 0,
            endpoint::Type::Server => 1,
        };
        let direction = match stream_type {
            StreamType::Bidirectional => 0,
            StreamType::Unidirectional => 2,
        };
        initiator | direction
    }
}

impl From<StreamId> for u64 {
    #[inline]
    fn from(id: StreamId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bits_test() {
        let id = StreamId::initial(endpoint::Type::Server, StreamType::Unidirectional);
        assert_eq!(id.as_u64(), 3);
        assert_eq!(id.initiator(), endpoint::Type::Server);
        assert_eq!(id.stream_type(), StreamType::Unidirectional);
        assert_eq!(id.rank(), 1);
        assert_eq!(id.next_of_type(), Some(StreamId::from_u64(7)));
    }

    #[test]
    fn rank_round_trip_test() {
        bolero::check!()
            .with_type::<StreamId>()
            .cloned()
            .for_each(|id| {
                let id = StreamId::from_u64(id.as_u64() >> 2);
                let rebuilt = StreamId::from_rank(id.rank(), id.initiator(), id.stream_type());
                assert_eq!(rebuilt, id);
            });
    }
}
