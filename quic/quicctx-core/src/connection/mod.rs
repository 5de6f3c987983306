// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod error;
pub mod id;

pub use error::Error;
pub use id::{InitialId, LocalId, PeerId};
