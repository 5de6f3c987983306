// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{check_len, decode_string, entries, read, Error};
use alloc::collections::BTreeMap;
use bytes::Bytes;
use quicctx_core::{
    inet::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Timestamp,
};
use s2n_codec::{DecoderError, Encoder, EncoderValue};
use std::path::Path;

const TAG: &[u8; 4] = b"QCTN";

/// Identifies the server address a NEW_TOKEN token validates
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenKey {
    pub server_name: String,
    pub ip: IpAddr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub valid_until: Timestamp,
    pub token: Bytes,
}

impl Token {
    #[inline]
    pub fn is_valid(&self, now: Timestamp) -> bool {
        now < self.valid_until
    }
}

/// Address validation tokens received by a client
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    tokens: BTreeMap<TokenKey, Token>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TokenKey, token: Token) -> Result<(), Error> {
        check_len(key.server_name.as_bytes())?;
        check_len(&token.token)?;
        self.tokens.insert(key, token);
        Ok(())
    }

    pub fn get(&self, key: &TokenKey, now: Timestamp) -> Option<&Token> {
        self.tokens.get(key).filter(|token| token.is_valid(now))
    }

    /// Removes the token so it is presented only once
    pub fn take(&mut self, key: &TokenKey, now: Timestamp) -> Option<Token> {
        self.tokens.remove(key).filter(|token| token.is_valid(now))
    }

    pub fn remove_expired(&mut self, now: Timestamp) {
        self.tokens.retain(|_, token| token.is_valid(now));
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut bytes = TAG.to_vec();
        for (key, token) in &self.tokens {
            bytes.extend_from_slice(&Entry { key, token }.encode_to_vec());
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Adds the tokens of a store file that are still valid at `now`
    pub fn load(&mut self, path: impl AsRef<Path>, now: Timestamp) -> Result<usize, Error> {
        let Some(bytes) = read(path.as_ref())? else {
            return Ok(0);
        };

        let mut buffer = entries(&bytes, TAG)?;
        let mut loaded = Vec::new();
        while !buffer.is_empty() {
            let (server_name, remaining) = decode_string(buffer)?;
            let (ip, remaining) = remaining.decode_slice_with_len_prefix::<u8>()?;
            let (valid_until, remaining) = remaining.decode::<u64>()?;
            let (token, remaining) = remaining.decode_slice_with_len_prefix::<u16>()?;
            buffer = remaining;

            let octets = ip.into_less_safe_slice();
            let ip = if let Ok(octets) = <[u8; 4]>::try_from(octets) {
                IpAddr::V4(Ipv4Addr::from(octets))
            } else if let Ok(octets) = <[u8; 16]>::try_from(octets) {
                IpAddr::V6(Ipv6Addr::from(octets))
            } else {
                return Err(DecoderError::InvariantViolation("invalid address length").into());
            };
            let key = TokenKey { server_name, ip };
            let token = Token {
                valid_until: Timestamp::from_micros(valid_until),
                token: Bytes::copy_from_slice(token.into_less_safe_slice()),
            };
            if token.is_valid(now) {
                loaded.push((key, token));
            }
        }

        let count = loaded.len();
        self.tokens.extend(loaded);
        Ok(count)
    }
}

struct Entry<'a> {
    key: &'a TokenKey,
    token: &'a Token,
}

impl EncoderValue for Entry<'_> {
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode_with_len_prefix::<u16, _>(&self.key.server_name.as_bytes());
        match self.key.ip {
            IpAddr::V4(ip) => buffer.encode_with_len_prefix::<u8, _>(&&ip.octets()[..]),
            IpAddr::V6(ip) => buffer.encode_with_len_prefix::<u8, _>(&&ip.octets()[..]),
        }
        buffer.encode(&self.token.valid_until.as_micros());
        buffer.encode_with_len_prefix::<u16, _>(&&self.token.token[..]);
    }
}
