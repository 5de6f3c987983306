// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Path quality reporting.
//!
//! The application subscribes with an RTT delta and a pacing rate delta.
//! Each path remembers a band around the values last reported, and a
//! `PathQualityChanged` event is raised once a value leaves its band.

use super::Recovery;
use crate::{
    callback::{self, Event, PathEvent},
    connection::Connection,
    error::Error,
};
use core::time::Duration;
use quicctx_core::{packet::PacketNumberSpace, transport};

/// Reporting bands of a path. A zero delta disables the matching band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Thresholds {
    rtt_delta: Duration,
    rate_delta: u64,
    rtt_low: Duration,
    rtt_high: Duration,
    pacing_low: u64,
    pacing_high: u64,
    receive_low: u64,
    receive_high: u64,
}

impl Thresholds {
    pub fn new(rtt_delta: Duration, rate_delta: u64) -> Self {
        Self {
            rtt_delta,
            rate_delta,
            ..Default::default()
        }
    }

    #[inline]
    pub fn rtt_delta(&self) -> Duration {
        self.rtt_delta
    }

    #[inline]
    pub fn rate_delta(&self) -> u64 {
        self.rate_delta
    }

    /// Centers the bands on the current values
    pub fn refresh(&mut self, recovery: &Recovery) {
        if !self.rtt_delta.is_zero() {
            self.rtt_low = recovery.smoothed_rtt.saturating_sub(self.rtt_delta);
            self.rtt_high = recovery.smoothed_rtt.saturating_add(self.rtt_delta);
        }

        if self.rate_delta > 0 {
            self.pacing_low = recovery.pacing_rate.saturating_sub(self.rate_delta);
            self.pacing_high = recovery.pacing_rate.saturating_add(self.rate_delta);
            self.receive_low = recovery
                .receive_rate_estimate
                .saturating_sub(self.rate_delta);
            self.receive_high = recovery
                .receive_rate_estimate
                .saturating_add(self.rate_delta);
        }
    }

    /// Changes the deltas and recenters the bands
    pub fn subscribe(&mut self, rtt_delta: Duration, rate_delta: u64, recovery: &Recovery) {
        self.rtt_delta = rtt_delta;
        self.rate_delta = rate_delta;
        self.refresh(recovery);
    }

    /// Returns true if a value left its band
    pub fn is_update(&self, recovery: &Recovery) -> bool {
        let rtt = recovery.smoothed_rtt;
        let rtt_moved = !self.rtt_delta.is_zero() && (rtt < self.rtt_low || rtt > self.rtt_high);

        let pacing = recovery.pacing_rate;
        let receive = recovery.receive_rate_estimate;
        let rate_moved = self.rate_delta > 0
            && (pacing < self.pacing_low
                || pacing > self.pacing_high
                || receive < self.receive_low
                || receive > self.receive_high);

        rtt_moved || rate_moved
    }
}

/// A snapshot of the metrics of a path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quality {
    pub congestion_window: u64,
    pub smoothed_rtt: Duration,
    pub rtt_min: Duration,
    pub rtt_variant: Duration,
    pub pacing_rate: u64,
    pub receive_rate_estimate: u64,
    pub bytes_in_transit: u64,
    /// The number of packets sent in the application space
    pub sent: u64,
}

impl Connection {
    /// Returns the metrics of a path, recentering its reporting bands
    pub fn path_quality(&mut self, unique_id: u64) -> Result<Quality, Error> {
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        Ok(self.quality_at(index))
    }

    pub fn default_path_quality(&mut self) -> Result<Quality, Error> {
        if self.paths.is_empty() {
            return Err(Error::PathNotFound);
        }
        Ok(self.quality_at(0))
    }

    fn quality_at(&mut self, index: usize) -> Quality {
        let is_multipath = self.is_multipath_enabled;
        let application_sequence =
            self.packet_spaces[PacketNumberSpace::ApplicationData.as_index()].send_sequence;
        let path = &mut self.paths[index];
        path.quality.refresh(&path.recovery);

        let recovery = &path.recovery;
        Quality {
            congestion_window: recovery.congestion_window,
            smoothed_rtt: recovery.smoothed_rtt,
            rtt_min: recovery.rtt_min,
            rtt_variant: recovery.rtt_variant,
            pacing_rate: recovery.pacing_rate,
            receive_rate_estimate: recovery.receive_rate_estimate,
            bytes_in_transit: recovery.bytes_in_transit,
            sent: if is_multipath {
                path.packets.send_sequence
            } else {
                application_sequence
            },
        }
    }

    /// Sets the reporting deltas of one path
    pub fn subscribe_to_path_quality(
        &mut self,
        unique_id: u64,
        rtt_delta: Duration,
        rate_delta: u64,
    ) -> Result<(), Error> {
        self.is_quality_update_requested = true;
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        let path = &mut self.paths[index];
        path.quality.subscribe(rtt_delta, rate_delta, &path.recovery);
        Ok(())
    }

    /// Sets the reporting deltas of every current and future path
    pub fn subscribe_to_quality(&mut self, rtt_delta: Duration, rate_delta: u64) {
        self.settings.rtt_update_delta = rtt_delta;
        self.settings.pacing_rate_update_delta = rate_delta;
        self.is_quality_update_requested = true;

        for path in self.paths.iter_mut() {
            path.quality.subscribe(rtt_delta, rate_delta, &path.recovery);
        }
    }

    /// Notifies the application if the metrics of a path left their band
    pub fn issue_path_quality_update(&mut self, unique_id: u64) -> Result<bool, Error> {
        let index = self.paths.index_of(unique_id).ok_or(Error::PathNotFound)?;
        let path = &mut self.paths[index];
        if !path.quality.is_update(&path.recovery) {
            return Ok(false);
        }
        path.quality.refresh(&path.recovery);

        let event = Event::PathQualityChanged(PathEvent {
            unique_id,
            app_path_ctx: path.app_path_ctx,
        });
        self.notify(event).map_err(|callback::Error| {
            Error::Transport(
                transport::Error::INTERNAL_ERROR.with_reason("path quality callback failed"),
            )
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_test() {
        let mut recovery = Recovery::default();
        let mut thresholds = Thresholds::new(Duration::from_millis(10), 1_000);
        thresholds.refresh(&recovery);
        assert!(!thresholds.is_update(&recovery));

        recovery.smoothed_rtt += Duration::from_millis(10);
        assert!(!thresholds.is_update(&recovery));
        recovery.smoothed_rtt += Duration::from_millis(1);
        assert!(thresholds.is_update(&recovery));

        thresholds.refresh(&recovery);
        assert!(!thresholds.is_update(&recovery));

        recovery.receive_rate_estimate = 1_001;
        assert!(thresholds.is_update(&recovery));
    }

    #[test]
    fn disabled_band_test() {
        let mut recovery = Recovery::default();
        let mut thresholds = Thresholds::default();
        thresholds.refresh(&recovery);

        recovery.smoothed_rtt = Duration::from_secs(10);
        recovery.pacing_rate = 1;
        assert!(!thresholds.is_update(&recovery));
    }

    #[test]
    fn low_band_saturates_test() {
        let mut recovery = Recovery {
            smoothed_rtt: Duration::from_millis(5),
            ..Default::default()
        };
        let mut thresholds = Thresholds::new(Duration::from_millis(10), 0);
        thresholds.refresh(&recovery);

        recovery.smoothed_rtt = Duration::ZERO;
        assert!(!thresholds.is_update(&recovery));
    }
}
