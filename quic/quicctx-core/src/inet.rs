// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Address helpers used to match network paths

pub use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// The maximum number of address bytes kept alongside resumption state
pub const MAX_STORED_IP_LEN: usize = 16;

/// Address family of a socket address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    #[inline]
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::V4,
            SocketAddr::V6(_) => Self::V6,
        }
    }

    /// Returns the family of an optional address, treating a missing address as IPv4
    #[inline]
    pub fn of_optional(addr: Option<&SocketAddr>) -> Self {
        addr.map_or(Self::V4, Self::of)
    }

    /// Returns the unspecified address with port 0 for this family
    #[inline]
    pub fn unspecified(self) -> SocketAddr {
        match self {
            Self::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            Self::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        }
    }
}

/// Compares two addresses on family, IP and port only.
///
/// IPv6 flow information and scope identifiers are ignored, as they do
/// not change the network path.
#[inline]
pub fn addr_eq(a: &SocketAddr, b: &SocketAddr) -> bool {
    a.ip() == b.ip() && a.port() == b.port()
}

/// Compares two optional addresses, where two missing addresses are equal
#[inline]
pub fn optional_addr_eq(a: Option<&SocketAddr>, b: Option<&SocketAddr>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => addr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Returns true if the address is the unspecified address of its family
#[inline]
pub fn is_unspecified(addr: &SocketAddr) -> bool {
    addr.ip().is_unspecified()
}

/// Compares `addr` against a pattern whose unspecified IP or zero port acts
/// as a wildcard. Families must always agree.
#[inline]
pub fn partial_eq(pattern: &SocketAddr, addr: &SocketAddr) -> bool {
    if Family::of(pattern) != Family::of(addr) {
        return false;
    }
    let ip_matches = is_unspecified(pattern) || pattern.ip() == addr.ip();
    let port_matches = pattern.port() == 0 || pattern.port() == addr.port();
    ip_matches && port_matches
}

/// Returns the raw IP bytes of an address, as stored with resumption tickets
#[inline]
pub fn ip_bytes(addr: &SocketAddr) -> ([u8; MAX_STORED_IP_LEN], usize) {
    let mut bytes = [0; MAX_STORED_IP_LEN];
    match addr.ip() {
        IpAddr::V4(ip) => {
            bytes[..4].copy_from_slice(&ip.octets());
            (bytes, 4)
        }
        IpAddr::V6(ip) => {
            bytes.copy_from_slice(&ip.octets());
            (bytes, 16)
        }
    }
}
