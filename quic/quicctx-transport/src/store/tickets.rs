// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{check_len, decode_string, entries, read, Error};
use alloc::collections::BTreeMap;
use bytes::Bytes;
use quicctx_core::time::Timestamp;
use s2n_codec::{Encoder, EncoderValue};
use std::path::Path;

const TAG: &[u8; 4] = b"QCTT";

/// Identifies the server a session ticket resumes
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TicketKey {
    pub server_name: String,
    pub alpn: String,
    pub version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub valid_until: Timestamp,
    pub ticket: Bytes,
}

impl Ticket {
    #[inline]
    pub fn is_valid(&self, now: Timestamp) -> bool {
        now < self.valid_until
    }
}

/// Session tickets received by a client, one per server
#[derive(Clone, Debug, Default)]
pub struct TicketStore {
    tickets: BTreeMap<TicketKey, Ticket>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a ticket, replacing the previous one for the same server
    pub fn insert(&mut self, key: TicketKey, ticket: Ticket) -> Result<(), Error> {
        check_len(key.server_name.as_bytes())?;
        check_len(key.alpn.as_bytes())?;
        check_len(&ticket.ticket)?;
        self.tickets.insert(key, ticket);
        Ok(())
    }

    /// Returns the ticket of a server if it is still valid at `now`
    pub fn get(&self, key: &TicketKey, now: Timestamp) -> Option<&Ticket> {
        self.tickets.get(key).filter(|ticket| ticket.is_valid(now))
    }

    pub fn remove(&mut self, key: &TicketKey) -> Option<Ticket> {
        self.tickets.remove(key)
    }

    pub fn remove_expired(&mut self, now: Timestamp) {
        self.tickets.retain(|_, ticket| ticket.is_valid(now));
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut bytes = TAG.to_vec();
        for (key, ticket) in &self.tickets {
            bytes.extend_from_slice(&Entry { key, ticket }.encode_to_vec());
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Adds the tickets of a store file that are still valid at `now`.
    ///
    /// Returns the number of tickets added. A missing file adds nothing. A
    /// malformed file is rejected as a whole.
    pub fn load(&mut self, path: impl AsRef<Path>, now: Timestamp) -> Result<usize, Error> {
        let Some(bytes) = read(path.as_ref())? else {
            return Ok(0);
        };

        let mut buffer = entries(&bytes, TAG)?;
        let mut loaded = Vec::new();
        while !buffer.is_empty() {
            let (server_name, remaining) = decode_string(buffer)?;
            let (alpn, remaining) = decode_string(remaining)?;
            let (version, remaining) = remaining.decode::<u32>()?;
            let (valid_until, remaining) = remaining.decode::<u64>()?;
            let (ticket, remaining) = remaining.decode_slice_with_len_prefix::<u16>()?;
            buffer = remaining;

            let key = TicketKey {
                server_name,
                alpn,
                version,
            };
            let ticket = Ticket {
                valid_until: Timestamp::from_micros(valid_until),
                ticket: Bytes::copy_from_slice(ticket.into_less_safe_slice()),
            };
            if ticket.is_valid(now) {
                loaded.push((key, ticket));
            }
        }

        let count = loaded.len();
        self.tickets.extend(loaded);
        Ok(count)
    }
}

struct Entry<'a> {
    key: &'a TicketKey,
    ticket: &'a Ticket,
}

impl EncoderValue for Entry<'_> {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode_with_len_prefix::<u16, _>(&self.key.server_name.as_bytes());
        buffer.encode_with_len_prefix::<u16, _>(&self.key.alpn.as_bytes());
        buffer.encode(&self.key.version);
        buffer.encode(&self.ticket.valid_until.as_micros());
        buffer.encode_with_len_prefix::<u16, _>(&&self.ticket.ticket[..]);
    }
}
