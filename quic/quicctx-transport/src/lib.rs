// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The connection-context engine of a QUIC endpoint.
//!
//! A [`Context`] owns every connection of an endpoint together with the
//! tables used to route datagrams to them and the schedule that tells the
//! event loop which connection to service next.

#![deny(unused_must_use)]
extern crate alloc;

mod error;

pub mod callback;
pub mod config;
pub mod congestion;
pub mod connection;
pub mod context;
pub mod id_tables;
pub mod path;
pub mod scheduler;
pub mod store;
pub mod stream;
pub mod tls;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::Context;
pub use error::Error;
