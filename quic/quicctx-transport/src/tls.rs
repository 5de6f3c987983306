// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The interface to the TLS handshake engine.
//!
//! A connection owns one [`Session`] for its lifetime. Dropping the session
//! frees the TLS context.

use alloc::boxed::Box;
use quicctx_core::{connection::InitialId, endpoint, time::Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// the TLS session could not be created
    SessionCreation,
    /// the initial traffic keys could not be derived
    InitialKeys,
    /// the application keys could not be rotated
    KeyUpdate,
}

/// The parameters used to open a session
#[derive(Clone, Copy, Debug)]
pub struct SessionInfo<'a> {
    pub endpoint_type: endpoint::Type,
    pub server_name: Option<&'a str>,
    pub alpn: Option<&'a str>,
    pub now: Timestamp,
}

/// Creates TLS sessions for new connections
pub trait Provider: 'static {
    /// Returns true if certificates and keys were configured, which allows
    /// the context to accept connections
    fn has_server_credentials(&self) -> bool;

    fn new_session(&mut self, info: &SessionInfo) -> Result<Box<dyn Session>, Error>;
}

/// The TLS state of a single connection
pub trait Session: 'static {
    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
    //# Initial packets apply the packet protection process, but use a
    //# secret derived from the Destination Connection ID field from the
    //# client's first Initial packet.
    fn setup_initial_keys(&mut self, initial_id: &InitialId, version: u32) -> Result<(), Error>;

    /// Installs the next generation of application keys
    fn rotate_keys(&mut self) -> Result<(), Error>;
}
