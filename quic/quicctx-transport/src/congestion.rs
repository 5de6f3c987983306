// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The pluggable congestion control interface.
//!
//! The engine never ships an algorithm of its own. Applications install the
//! algorithms they support in a [`Registry`] and select a default by name.

use crate::path::Recovery;
use alloc::{sync::Arc, vec::Vec};
use core::fmt;
use quicctx_core::time::Timestamp;

/// A congestion control algorithm, invoked once per path
pub trait Algorithm: fmt::Debug + 'static {
    /// The name used to select the algorithm, such as `"cubic"`
    fn name(&self) -> &'static str;

    /// Sets up the algorithm state on a path
    fn init(&self, recovery: &mut Recovery, option: Option<&str>, now: Timestamp);

    /// Releases the algorithm state of a path
    fn delete(&self, recovery: &mut Recovery);
}

/// The list of algorithms an application makes available
#[derive(Clone, Default)]
pub struct Registry {
    algorithms: Vec<Arc<dyn Algorithm>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.algorithms.iter().map(|alg| alg.name()))
            .finish()
    }
}

impl Registry {
    pub fn new(algorithms: Vec<Arc<dyn Algorithm>>) -> Self {
        Self { algorithms }
    }

    pub fn with(mut self, algorithm: Arc<dyn Algorithm>) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Looks an algorithm up by name. `reno` is accepted as an alias of `newreno`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Algorithm>> {
        let name = if name == "reno" { "newreno" } else { name };
        self.algorithms
            .iter()
            .find(|alg| alg.name() == name)
            .cloned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.algorithms.iter().map(|alg| alg.name())
    }
}
