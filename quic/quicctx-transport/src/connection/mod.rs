// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! This module contains the implementation of QUIC connections and their lifecycle

mod builder;
mod connection_impl;
mod internal_connection_id;
pub mod local_id_registry;
pub mod misc_frames;
pub mod packet_space;
pub mod peer_id_stash;
mod state;

#[cfg(test)]
mod tests;

pub use builder::Parameters;
pub use connection_impl::{CloseReasons, Connection, Settings, Shared};
pub use internal_connection_id::{InternalConnectionId, InternalConnectionIdGenerator};
pub use state::State;

/// re-export core
pub use quicctx_core::connection::{id, Error, InitialId, LocalId, PeerId};
