// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Detects address validation tokens presented more than once.

use alloc::collections::BTreeMap;
use quicctx_core::time::Timestamp;

/// Only this many trailing bytes of a token are compared
const TOKEN_SUFFIX_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    Fresh,
    /// The token was already registered, and has now been seen `count` times
    Reused { count: u32 },
}

/// Tokens seen by a server, ordered by expiry so expired ones can be
/// dropped in one sweep
#[derive(Debug, Default)]
pub struct RegisteredTokens {
    tokens: BTreeMap<(Timestamp, u64), u32>,
}

impl RegisteredTokens {
    /// Returns `None` if the token is too short to be registered
    pub fn register(&mut self, token: &[u8], expiry: Timestamp) -> Option<Registration> {
        let suffix = token.len().checked_sub(TOKEN_SUFFIX_LEN)?;
        let mut key = [0; TOKEN_SUFFIX_LEN];
        key.copy_from_slice(&token[suffix..]);
        let key = (expiry, u64::from_be_bytes(key));

        let count = self.tokens.entry(key).or_insert(0);
        *count += 1;
        Some(if *count == 1 {
            Registration::Fresh
        } else {
            Registration::Reused { count: *count }
        })
    }

    /// Forgets every token that expires before `expiry_max`
    pub fn clear(&mut self, expiry_max: Timestamp) {
        self.tokens = self.tokens.split_off(&(expiry_max, 0));
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_micros(secs * 1_000_000)
    }

    #[test]
    fn reuse_test() {
        let mut tokens = RegisteredTokens::default();
        let token = b"0123456789abcdef";

        assert_eq!(tokens.register(token, at(10)), Some(Registration::Fresh));
        assert_eq!(
            tokens.register(token, at(10)),
            Some(Registration::Reused { count: 2 })
        );
        // the same bytes with another expiry are a different token
        assert_eq!(tokens.register(token, at(11)), Some(Registration::Fresh));
        // only the trailing bytes are compared
        assert_eq!(
            tokens.register(b"xxxxxxxx89abcdef", at(10)),
            Some(Registration::Reused { count: 3 })
        );
    }

    #[test]
    fn short_token_test() {
        let mut tokens = RegisteredTokens::default();
        assert_eq!(tokens.register(b"1234567", at(1)), None);
        assert!(tokens.is_empty());
    }

    #[test]
    fn clear_test() {
        let mut tokens = RegisteredTokens::default();
        for secs in 1..=4 {
            tokens.register(&[secs as u8; 8], at(secs));
        }

        tokens.clear(at(3));
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.register(&[2; 8], at(2)), Some(Registration::Fresh));
        assert_eq!(
            tokens.register(&[3; 8], at(3)),
            Some(Registration::Reused { count: 2 })
        );
    }
}
