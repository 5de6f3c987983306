// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use alloc::collections::VecDeque;
use bytes::Bytes;
use quicctx_core::packet::PacketNumberSpace;

/// The content of a queued frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// A frame already encoded by the application
    Raw(Bytes),
    //= https://www.rfc-editor.org/rfc/rfc9000#section-19.16
    //# An endpoint sends a RETIRE_CONNECTION_ID frame (type=0x19) to
    //# indicate that it will no longer use a connection ID that was issued
    //# by its peer.
    RetireConnectionId {
        /// Set when multipath was negotiated
        path_id: Option<u64>,
        sequence: u64,
    },
    PathAbandon {
        path_id: u64,
        reason: u64,
    },
    PathStatus {
        path_id: u64,
        available: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub space: PacketNumberSpace,
    /// The frame does not make the packet ack-eliciting
    pub is_pure_ack: bool,
}

/// A FIFO of frames waiting for the next packet
#[derive(Clone, Debug, Default)]
pub struct Queue {
    frames: VecDeque<Frame>,
}

impl Queue {
    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Drops every frame that cannot be sent once the handshake spaces
    /// are discarded
    pub fn purge_after_ready(&mut self) {
        self.frames
            .retain(|frame| frame.space == PacketNumberSpace::ApplicationData);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
