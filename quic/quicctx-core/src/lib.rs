// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod connection;
pub mod crypto;
pub mod endpoint;
pub mod event;
pub mod inet;
pub mod packet;
pub mod random;
pub mod stateless_reset;
pub mod stream;
pub mod time;
pub mod transport;
pub mod version;
