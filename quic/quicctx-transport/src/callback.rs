// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The application callback.
//!
//! A single multiplexed callback receives every application-visible event.
//! Returning an error from it is fatal for the connection, which is then
//! closed with `INTERNAL_ERROR`.

use crate::connection::InternalConnectionId;
use alloc::rc::Rc;
use core::cell::RefCell;

/// An error returned by the application from a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub struct Error;

/// Path status reported in path events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathEvent {
    pub unique_id: u64,
    /// The application context attached with `set_app_path_ctx`
    pub app_path_ctx: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A path finished validation and can carry traffic
    PathAvailable(PathEvent),
    /// A verified path must be validated again before it is used
    PathSuspended(PathEvent),
    /// A path was removed from the connection
    PathDeleted(PathEvent),
    /// The RTT or pacing rate of a path moved outside of its thresholds
    PathQualityChanged(PathEvent),
    /// A new path can now be opened, after a transient refusal
    NextPathAllowed,
    /// The connection closed
    Close,
}

/// Receives events for the connections it is attached to
pub trait Callback: 'static {
    fn on_event(&mut self, connection: InternalConnectionId, event: Event) -> Result<(), Error>;
}

/// A callback shared between the context default and its connections
pub type Handle = Rc<RefCell<dyn Callback>>;

impl<F> Callback for F
where
    F: FnMut(InternalConnectionId, Event) -> Result<(), Error> + 'static,
{
    #[inline]
    fn on_event(&mut self, connection: InternalConnectionId, event: Event) -> Result<(), Error> {
        (self)(connection, event)
    }
}
