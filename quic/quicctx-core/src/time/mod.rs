// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Time as seen by the engine. The event loop reads its clock once per
//! iteration and passes the value down, so nothing below queries a clock.

mod timestamp;

pub use core::time::Duration;
pub use timestamp::*;
