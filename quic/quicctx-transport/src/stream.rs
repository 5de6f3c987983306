// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The streams of a connection.
//!
//! Streams are kept in stream id order. Streams with data to send are also
//! kept in an output queue ordered by `(priority, id)`, so a lower priority
//! value is served first.

use crate::{config::TransportParameters, error::Error};
use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use bytes::Bytes;
use quicctx_core::{
    crypto::Epoch,
    endpoint,
    stream::{StreamId, StreamType},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stream {
    pub id: StreamId,
    pub priority: u8,
    /// The amount of data the peer may send on the stream
    pub maxdata_local: u64,
    /// The amount of data the local endpoint may send on the stream
    pub maxdata_remote: u64,
    /// The unique id of the path the stream prefers to send on
    pub affinity_path_id: Option<u64>,
    is_output: bool,
}

impl Stream {
    #[inline]
    pub fn is_output(&self) -> bool {
        self.is_output
    }
}

/// Stream counts allowed in each direction, expressed as stream ranks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    /// Bidirectional streams the peer may open
    pub bidi_local: u64,
    /// Unidirectional streams the peer may open
    pub uni_local: u64,
    /// Bidirectional streams the local endpoint may open
    pub bidi_remote: u64,
    /// Unidirectional streams the local endpoint may open
    pub uni_remote: u64,
}

#[derive(Debug)]
pub struct Registry {
    local_type: endpoint::Type,
    default_priority: u8,
    streams: BTreeMap<StreamId, Stream>,
    output: BTreeSet<(u8, StreamId)>,
    next_stream_id: [StreamId; StreamId::TYPE_COUNT],
    limits: Limits,
}

impl Registry {
    pub fn new(local_type: endpoint::Type, default_priority: u8) -> Self {
        Self {
            local_type,
            default_priority,
            streams: BTreeMap::new(),
            output: BTreeSet::new(),
            next_stream_id: [0, 1, 2, 3].map(StreamId::from_u64),
            limits: Limits::default(),
        }
    }

    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Sets the number of streams the peer may open
    pub fn set_local_limits(&mut self, parameters: &TransportParameters) {
        self.limits.bidi_local = parameters.initial_max_streams_bidi;
        self.limits.uni_local = parameters.initial_max_streams_uni;
    }

    /// Sets the number of streams the local endpoint may open, queueing
    /// local streams that a raised limit unblocks
    pub fn set_remote_limits(&mut self, parameters: &TransportParameters) {
        let Limits {
            bidi_remote,
            uni_remote,
            ..
        } = self.limits;
        self.limits.bidi_remote = parameters.initial_max_streams_bidi;
        self.limits.uni_remote = parameters.initial_max_streams_uni;
        self.add_output_streams(bidi_remote, self.limits.bidi_remote, StreamType::Bidirectional);
        self.add_output_streams(uni_remote, self.limits.uni_remote, StreamType::Unidirectional);
    }

    /// Returns the next stream id of each type, indexed by the two low bits
    #[inline]
    pub fn next_stream_id(&self, stream_type: usize) -> Option<StreamId> {
        self.next_stream_id.get(stream_type).copied()
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
    //# initial_max_stream_data_bidi_local (0x05):  This parameter is an
    //#    integer value specifying the initial flow control limit for
    //#    locally initiated bidirectional streams.
    /// Creates a stream, deriving its flow control windows from the local
    /// and remote transport parameters
    pub fn create(
        &mut self,
        id: StreamId,
        local: &TransportParameters,
        remote: &TransportParameters,
    ) -> Result<&Stream, Error> {
        if self.streams.contains_key(&id) {
            return Err(Error::InvalidArgument);
        }

        let is_local = id.is_local(self.local_type);
        let (maxdata_local, maxdata_remote, is_output) = match (is_local, id.stream_type()) {
            (true, StreamType::Bidirectional) => (
                local.initial_max_stream_data_bidi_local,
                remote.initial_max_stream_data_bidi_remote,
                id.rank() <= self.limits.bidi_remote,
            ),
            (true, StreamType::Unidirectional) => (
                0,
                remote.initial_max_stream_data_uni,
                id.rank() <= self.limits.uni_remote,
            ),
            (false, StreamType::Bidirectional) => (
                local.initial_max_stream_data_bidi_remote,
                remote.initial_max_stream_data_bidi_local,
                true,
            ),
            (false, StreamType::Unidirectional) => (local.initial_max_stream_data_uni, 0, false),
        };

        let stream = Stream {
            id,
            priority: self.default_priority,
            maxdata_local,
            maxdata_remote,
            affinity_path_id: None,
            is_output: false,
        };
        self.streams.insert(id, stream);
        if is_output {
            self.insert_output(id);
        }

        let type_index = id.type_index();
        if id >= self.next_stream_id[type_index] {
            if let Some(next) = id.next_of_type() {
                self.next_stream_id[type_index] = next;
            }
        }

        self.streams.get(&id).ok_or(Error::InvalidArgument)
    }

    /// Queues the local streams of `stream_type` whose rank is in
    /// `(old_limit, new_limit]`
    pub fn add_output_streams(&mut self, old_limit: u64, new_limit: u64, stream_type: StreamType) {
        if new_limit <= old_limit {
            return;
        }
        let unblocked: Vec<StreamId> = self
            .streams
            .keys()
            .filter(|id| {
                id.is_local(self.local_type)
                    && id.stream_type() == stream_type
                    && id.rank() > old_limit
                    && id.rank() <= new_limit
            })
            .copied()
            .collect();
        for id in unblocked {
            self.insert_output(id);
        }
    }

    fn insert_output(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(&id) {
            if !stream.is_output {
                stream.is_output = true;
                self.output.insert((stream.priority, id));
            }
        }
    }

    fn remove_output(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(&id) {
            if stream.is_output {
                stream.is_output = false;
                self.output.remove(&(stream.priority, id));
            }
        }
    }

    /// Changes the priority of a stream, moving it in the output queue
    pub fn reorder_output_stream(&mut self, id: StreamId, priority: u8) -> Result<(), Error> {
        let stream = self.streams.get_mut(&id).ok_or(Error::InvalidArgument)?;
        if stream.is_output {
            self.output.remove(&(stream.priority, id));
            self.output.insert((priority, id));
        }
        stream.priority = priority;
        Ok(())
    }

    pub fn set_path_affinity(&mut self, id: StreamId, path_id: Option<u64>) -> Result<(), Error> {
        let stream = self.streams.get_mut(&id).ok_or(Error::InvalidArgument)?;
        stream.affinity_path_id = path_id;
        Ok(())
    }

    /// Removes the affinity of every stream to a deleted path
    pub fn clear_path_affinity(&mut self, path_id: u64) {
        for stream in self.streams.values_mut() {
            if stream.affinity_path_id == Some(path_id) {
                stream.affinity_path_id = None;
            }
        }
    }

    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        self.remove_output(id);
        self.streams.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Iterates over streams in stream id order
    pub fn iter(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    /// Iterates over the output queue in `(priority, id)` order
    pub fn output(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.output.iter().map(|(_, id)| *id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn clear(&mut self) {
        self.output.clear();
        self.streams.clear();
    }
}

/// The handshake data of one key epoch
#[derive(Clone, Debug, Default)]
pub struct CryptoStream {
    pub sent_offset: u64,
    pub consumed_offset: u64,
    pub fin_offset: u64,
    pending: VecDeque<Bytes>,
}

impl CryptoStream {
    pub fn push(&mut self, data: Bytes) {
        self.pending.push_back(data);
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.iter().map(|chunk| chunk.len()).sum()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One crypto stream per key epoch
#[derive(Clone, Debug, Default)]
pub struct CryptoStreams {
    streams: [CryptoStream; Epoch::COUNT],
}

impl CryptoStreams {
    #[inline]
    pub fn get(&self, epoch: Epoch) -> &CryptoStream {
        &self.streams[epoch.as_index()]
    }

    #[inline]
    pub fn get_mut(&mut self, epoch: Epoch) -> &mut CryptoStream {
        &mut self.streams[epoch.as_index()]
    }

    /// Returns true if no epoch holds data or offsets
    pub fn is_fresh(&self) -> bool {
        self.streams.iter().all(|stream| {
            stream.pending.is_empty() && stream.sent_offset == 0 && stream.consumed_offset == 0
        })
    }

    pub fn clear(&mut self) {
        for stream in &mut self.streams {
            stream.clear();
        }
    }
}
