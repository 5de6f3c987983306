// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Remembers the path conditions of connections a server issued session
//! tickets to, so a resumed connection can start from them.

use alloc::collections::BTreeMap;
use core::time::Duration;
use hashbrown::HashMap;
use quicctx_core::inet::{self, SocketAddr, MAX_STORED_IP_LEN};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IssuedTicket {
    pub rtt: Duration,
    pub cwin: u64,
    ip: [u8; MAX_STORED_IP_LEN],
    ip_len: u8,
    /// Position in the recency order, higher is more recent
    generation: u64,
}

impl IssuedTicket {
    /// The client IP the ticket was issued to
    #[inline]
    pub fn ip(&self) -> &[u8] {
        &self.ip[..self.ip_len as usize]
    }
}

/// Issued tickets bounded by the connection limit, evicting the least
/// recently issued first
#[derive(Debug, Default)]
pub struct IssuedTickets {
    tickets: HashMap<u64, IssuedTicket>,
    order: BTreeMap<u64, u64>,
    next_generation: u64,
}

impl IssuedTickets {
    pub fn remember(
        &mut self,
        ticket_id: u64,
        rtt: Duration,
        cwin: u64,
        addr: &SocketAddr,
        max_len: usize,
    ) {
        let (ip, ip_len) = inet::ip_bytes(addr);

        if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
            ticket.rtt = rtt;
            ticket.cwin = cwin;
            ticket.ip = ip;
            ticket.ip_len = ip_len as u8;
            return;
        }

        while self.tickets.len() > max_len {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.tickets.remove(&oldest);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.order.insert(generation, ticket_id);
        self.tickets.insert(
            ticket_id,
            IssuedTicket {
                rtt,
                cwin,
                ip,
                ip_len: ip_len as u8,
                generation,
            },
        );
    }

    pub fn get(&self, ticket_id: u64) -> Option<&IssuedTicket> {
        self.tickets.get(&ticket_id)
    }

    pub fn remove(&mut self, ticket_id: u64) -> Option<IssuedTicket> {
        let ticket = self.tickets.remove(&ticket_id)?;
        self.order.remove(&ticket.generation);
        Some(ticket)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicctx_core::inet::{Ipv4Addr, Ipv6Addr};

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::new(Ipv4Addr::new(192, 0, 2, last).into(), 443)
    }

    #[test]
    fn evicts_least_recent_test() {
        let mut tickets = IssuedTickets::default();
        for id in 0..4 {
            tickets.remember(id, Duration::from_millis(10), 1000, &addr(id as u8), 2);
        }

        // eviction only starts once the limit is exceeded
        assert_eq!(tickets.len(), 3);
        assert!(tickets.get(0).is_none());
        assert_eq!(tickets.get(3).unwrap().ip(), &[192, 0, 2, 3]);
    }

    #[test]
    fn update_in_place_test() {
        let mut tickets = IssuedTickets::default();
        tickets.remember(7, Duration::from_millis(10), 1000, &addr(1), 2);
        tickets.remember(8, Duration::from_millis(10), 1000, &addr(2), 2);

        // an update keeps the recency position of the ticket
        let v6 = SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 443);
        tickets.remember(7, Duration::from_millis(30), 5000, &v6, 2);
        let ticket = tickets.get(7).unwrap();
        assert_eq!(ticket.rtt, Duration::from_millis(30));
        assert_eq!(ticket.cwin, 5000);
        assert_eq!(ticket.ip().len(), 16);

        tickets.remember(9, Duration::from_millis(10), 1000, &addr(3), 2);
        tickets.remember(10, Duration::from_millis(10), 1000, &addr(4), 2);
        assert!(tickets.get(7).is_none());
        assert!(tickets.get(8).is_some());
    }

    #[test]
    fn remove_test() {
        let mut tickets = IssuedTickets::default();
        tickets.remember(1, Duration::ZERO, 0, &addr(1), 4);
        assert!(tickets.remove(1).is_some());
        assert!(tickets.remove(1).is_none());
        assert!(tickets.is_empty());
    }
}
