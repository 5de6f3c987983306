// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// The key epochs of a connection, each with its own crypto stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Epoch {
    Initial,
    ZeroRtt,
    Handshake,
    OneRtt,
}

impl Epoch {
    pub const COUNT: usize = 4;

    pub const ALL: [Self; Self::COUNT] = [Self::Initial, Self::ZeroRtt, Self::Handshake, Self::OneRtt];

    #[inline]
    pub const fn as_index(self) -> usize {
        match self {
            Self::Initial => 0,
            Self::ZeroRtt => 1,
            Self::Handshake => 2,
            Self::OneRtt => 3,
        }
    }
}
