// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# Packet numbers are divided into three spaces in QUIC:
//#
//# Initial space:  All Initial packets (Section 17.2.2) are in this space.
//#
//# Handshake space:  All Handshake packets (Section 17.2.4) are in this
//#    space.
//#
//# Application data space:  All 0-RTT (Section 17.2.3) and 1-RTT
//#    (Section 17.3.1) packets are in this space.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketNumberSpace {
    Initial,
    Handshake,
    ApplicationData,
}

impl PacketNumberSpace {
    pub const COUNT: usize = 3;

    pub const ALL: [Self; Self::COUNT] = [Self::Initial, Self::Handshake, Self::ApplicationData];

    #[inline]
    pub const fn as_index(self) -> usize {
        match self {
            Self::Initial => 0,
            Self::Handshake => 1,
            Self::ApplicationData => 2,
        }
    }

    #[inline]
    pub fn is_application_data(self) -> bool {
        self == Self::ApplicationData
    }
}
