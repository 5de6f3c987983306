// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use quicctx_core::{random, time::Timestamp};

/// The number of PATH_CHALLENGE frames sent before a tuple is given up
pub const CHALLENGE_REPEAT_MAX: usize = 3;

/// Multiplied with the current time to derive predictable challenges
const CONSTANT_CHALLENGE_BASE: u64 = 0xdead_beef;

/// Path validation state of a tuple
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Challenge {
    values: [u64; CHALLENGE_REPEAT_MAX],
    /// When the current round of values was drawn
    issued_at: Timestamp,
    /// When the last PATH_CHALLENGE frame was sent
    sent_at: Timestamp,
    repeat_count: u8,
    pub required: bool,
    pub verified: bool,
    pub failed: bool,
}

impl Challenge {
    /// Draws a new round of challenge values
    pub fn reset(&mut self, now: Timestamp, constant: bool, random: &mut dyn random::Generator) {
        for (i, value) in self.values.iter_mut().enumerate() {
            *value = if constant {
                now.as_micros()
                    .wrapping_mul(CONSTANT_CHALLENGE_BASE + i as u64)
            } else {
                random::public_u64(random)
            };
        }
        self.issued_at = now;
        self.sent_at = now;
        self.repeat_count = 0;
    }

    #[inline]
    pub fn values(&self) -> &[u64; CHALLENGE_REPEAT_MAX] {
        &self.values
    }

    #[inline]
    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    #[inline]
    pub fn repeat_count(&self) -> u8 {
        self.repeat_count
    }

    /// Returns the value to put in the next PATH_CHALLENGE frame, or `None`
    /// once every value was sent
    pub fn on_transmit(&mut self, now: Timestamp) -> Option<u64> {
        let value = *self.values.get(self.repeat_count as usize)?;
        self.repeat_count += 1;
        self.sent_at = now;
        Some(value)
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-8.2.2
    //# A PATH_RESPONSE frame received on any network path validates the path
    //# on which the PATH_CHALLENGE was sent.
    pub fn on_response(&mut self, value: u64) -> bool {
        if !self.required || !self.values.contains(&value) {
            return false;
        }
        self.verified = true;
        self.failed = false;
        true
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-8.2.4
    //# Endpoints SHOULD abandon path validation based on a timer.
    /// Marks the challenge failed when every value was sent and the last one
    /// went unanswered for `timeout`
    pub fn on_timeout(&mut self, now: Timestamp, timeout: Duration) {
        if self.required
            && !self.verified
            && self.repeat_count as usize >= CHALLENGE_REPEAT_MAX
            && now.saturating_duration_since(self.sent_at) >= timeout
        {
            self.failed = true;
        }
    }
}
