// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::{cell::RefCell, rc::Rc};

/// Records a line per event so tests can snapshot what the engine published.
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to the context.
#[derive(Clone, Debug, Default)]
pub struct Subscriber {
    output: Rc<RefCell<Vec<String>>>,
}

impl Subscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded line in publication order
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Returns the number of recorded lines starting with `name`
    pub fn count(&self, name: &str) -> usize {
        self.output
            .borrow()
            .iter()
            .filter(|line| line.split(' ').next() == Some(name))
            .count()
    }

    pub fn clear(&self) {
        self.output.borrow_mut().clear();
    }

    fn push(&self, line: String) {
        self.output.borrow_mut().push(line);
    }
}

impl super::Subscriber for Subscriber {
    fn on_connection_created(&mut self, meta: &ConnectionMeta, event: &ConnectionCreated) {
        self.push(format!(
            "connection_created conn={} initial_id={:?}",
            meta.id, event.initial_id
        ));
    }

    fn on_connection_state_changed(
        &mut self,
        meta: &ConnectionMeta,
        event: &ConnectionStateChanged,
    ) {
        self.push(format!(
            "connection_state_changed conn={} {} -> {}",
            meta.id, event.previous, event.current
        ));
    }

    fn on_connection_closed(&mut self, meta: &ConnectionMeta, event: &ConnectionClosed) {
        self.push(format!(
            "connection_closed conn={} error={:?}",
            meta.id, event.error
        ));
    }

    fn on_path_created(&mut self, meta: &ConnectionMeta, event: &PathCreated) {
        self.push(format!(
            "path_created conn={} unique_id={}",
            meta.id, event.unique_id
        ));
    }

    fn on_path_demoted(&mut self, meta: &ConnectionMeta, event: &PathDemoted) {
        self.push(format!(
            "path_demoted conn={} unique_id={} reason={:#x}",
            meta.id, event.unique_id, event.reason
        ));
    }

    fn on_path_demotion_refused(&mut self, meta: &ConnectionMeta, event: &PathDemotionRefused) {
        self.push(format!(
            "path_demotion_refused conn={} unique_id={}",
            meta.id, event.unique_id
        ));
    }

    fn on_path_deleted(&mut self, meta: &ConnectionMeta, event: &PathDeleted) {
        self.push(format!(
            "path_deleted conn={} unique_id={}",
            meta.id, event.unique_id
        ));
    }

    fn on_path_promoted(&mut self, meta: &ConnectionMeta, event: &PathPromoted) {
        self.push(format!(
            "path_promoted conn={} unique_id={}",
            meta.id, event.unique_id
        ));
    }

    fn on_connection_id_retired(&mut self, meta: &ConnectionMeta, event: &ConnectionIdRetired) {
        self.push(format!(
            "connection_id_retired conn={} source={:?} path_id={} sequence={}",
            meta.id, event.source, event.path_id, event.sequence
        ));
    }

    fn on_token_reuse_detected(&mut self, _timestamp: Timestamp, event: &TokenReuseDetected) {
        self.push(format!("token_reuse_detected count={}", event.count));
    }

    fn on_stateless_packet_queued(&mut self, _timestamp: Timestamp, event: &StatelessPacketQueued) {
        self.push(format!("stateless_packet_queued len={}", event.len));
    }
}
