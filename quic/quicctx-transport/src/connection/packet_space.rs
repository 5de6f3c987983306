// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet number and acknowledgement state of a packet number space.
//!
//! Packet framing and loss detection are not part of the engine. These
//! contexts only hold what the engine must reset, rewind or repoint when
//! connections and paths come and go.

use alloc::collections::VecDeque;
use quicctx_core::time::Timestamp;

/// A packet waiting for an acknowledgement or queued for retransmission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentPacket {
    pub sequence: u64,
    /// The unique id of the path the packet was sent on, cleared when that
    /// path is deleted
    pub path_id: Option<u64>,
    pub len: usize,
    pub sent_at: Timestamp,
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-13.4.1
//# Each packet number space maintains separate acknowledgment state and
//# separate ECN counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EcnCounts {
    pub ect0: u64,
    pub ect1: u64,
    pub ce: u64,
}

#[derive(Clone, Debug)]
pub struct PacketContext {
    /// The packet number of the next packet sent
    pub send_sequence: u64,
    pub highest_acknowledged: Option<u64>,
    pub highest_acknowledged_time: Timestamp,
    pub latest_time_acknowledged: Timestamp,
    in_flight: VecDeque<SentPacket>,
    retransmitted: VecDeque<SentPacket>,
    /// ECN counts reported by the peer
    pub ecn: EcnCounts,
}

impl PacketContext {
    pub fn new(send_sequence: u64, now: Timestamp) -> Self {
        Self {
            send_sequence,
            highest_acknowledged: None,
            highest_acknowledged_time: now,
            latest_time_acknowledged: now,
            in_flight: VecDeque::new(),
            retransmitted: VecDeque::new(),
            ecn: EcnCounts::default(),
        }
    }

    /// Records a packet and returns the packet number it was assigned
    pub fn on_packet_sent(&mut self, path_id: Option<u64>, len: usize, now: Timestamp) -> u64 {
        let sequence = self.send_sequence;
        self.send_sequence += 1;
        self.in_flight.push_back(SentPacket {
            sequence,
            path_id,
            len,
            sent_at: now,
        });
        sequence
    }

    pub fn on_packet_acked(&mut self, sequence: u64, now: Timestamp) -> Option<SentPacket> {
        let index = self
            .in_flight
            .iter()
            .position(|packet| packet.sequence == sequence)?;
        let packet = self.in_flight.remove(index)?;

        if self.highest_acknowledged.map_or(true, |highest| sequence > highest) {
            self.highest_acknowledged = Some(sequence);
            self.highest_acknowledged_time = now;
        }
        self.latest_time_acknowledged = now;

        Some(packet)
    }

    /// Moves a lost packet to the retransmitted list
    pub fn on_packet_lost(&mut self, sequence: u64) -> bool {
        let Some(index) = self
            .in_flight
            .iter()
            .position(|packet| packet.sequence == sequence)
        else {
            return false;
        };

        if let Some(packet) = self.in_flight.remove(index) {
            self.retransmitted.push_back(packet);
        }
        true
    }

    /// Detaches every packet from a path that is going away
    pub fn clear_send_path(&mut self, path_id: u64) {
        for packet in self.in_flight.iter_mut().chain(self.retransmitted.iter_mut()) {
            if packet.path_id == Some(path_id) {
                packet.path_id = None;
            }
        }
    }

    /// Drops all queued packets and ECN counts. Packet numbers keep
    /// increasing.
    pub fn reset(&mut self) {
        self.in_flight.clear();
        self.retransmitted.clear();
        self.ecn = EcnCounts::default();
    }

    #[inline]
    pub fn is_acknowledged(&self, sequence: u64) -> bool {
        self.highest_acknowledged
            .is_some_and(|highest| highest >= sequence)
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &SentPacket> {
        self.in_flight.iter()
    }

    pub fn retransmitted(&self) -> impl Iterator<Item = &SentPacket> {
        self.retransmitted.iter()
    }
}

/// Tracks packets received from the peer
#[derive(Clone, Debug)]
pub struct AckContext {
    pub largest_received: Option<u64>,
    pub largest_received_time: Option<Timestamp>,
    pub highest_ack_sent: u64,
    pub highest_ack_sent_time: Timestamp,
    pub ack_needed: bool,
}

impl AckContext {
    pub fn new(now: Timestamp) -> Self {
        Self {
            largest_received: None,
            largest_received_time: None,
            highest_ack_sent: 0,
            highest_ack_sent_time: now,
            ack_needed: false,
        }
    }

    pub fn on_packet_received(&mut self, sequence: u64, now: Timestamp) {
        if self.largest_received.map_or(true, |largest| sequence > largest) {
            self.largest_received = Some(sequence);
            self.largest_received_time = Some(now);
        }
        self.ack_needed = true;
    }

    pub fn reset(&mut self, now: Timestamp) {
        *self = Self::new(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_and_loss_test() {
        let now = Timestamp::from_micros(10);
        let mut context = PacketContext::new(7, now);
        assert_eq!(context.on_packet_sent(Some(1), 1200, now), 7);
        assert_eq!(context.on_packet_sent(Some(2), 1200, now), 8);
        assert_eq!(context.on_packet_sent(Some(1), 1200, now), 9);

        assert!(!context.is_acknowledged(7));
        assert!(context.on_packet_acked(8, now).is_some());
        assert!(context.is_acknowledged(7));
        assert!(!context.is_acknowledged(9));

        assert!(context.on_packet_lost(7));
        assert!(!context.on_packet_lost(7));

        context.clear_send_path(1);
        assert!(context
            .in_flight()
            .chain(context.retransmitted())
            .all(|packet| packet.path_id.is_none()));

        context.reset();
        assert_eq!(context.in_flight().count(), 0);
        assert_eq!(context.retransmitted().count(), 0);
        assert_eq!(context.send_sequence, 10);
    }
}
