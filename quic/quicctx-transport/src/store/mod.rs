// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Client-side persistence of session tickets and address validation tokens.
//!
//! Both stores are kept in memory and written to a file with `save`. A store
//! file is a 4-byte tag followed by length-prefixed entries in network byte
//! order. Entries that expired before a `load` are skipped.

use s2n_codec::{DecoderBuffer, DecoderError};
use std::{io, path::Path};

mod tickets;
mod tokens;

#[cfg(test)]
mod tests;

pub use tickets::{Ticket, TicketKey, TicketStore};
pub use tokens::{Token, TokenKey, TokenStore};

#[derive(Debug, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// the store file could not be accessed: {0}
    Io(io::Error),
    /// the store file is malformed: {0:?}
    Format(DecoderError),
    /// the store file was written for another kind of store
    UnexpectedTag,
    /// a field is longer than the store format allows
    FieldTooLong,
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<DecoderError> for Error {
    #[inline]
    fn from(error: DecoderError) -> Self {
        Self::Format(error)
    }
}

/// Reads a store file, returning `None` if it was not created yet
fn read(path: &Path) -> Result<Option<Vec<u8>>, Error> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Splits the entries from a store file after checking its tag
fn entries<'a>(bytes: &'a [u8], tag: &[u8; 4]) -> Result<DecoderBuffer<'a>, Error> {
    let buffer = DecoderBuffer::new(bytes);
    let (found, buffer) = buffer.decode_slice(tag.len())?;
    if found.into_less_safe_slice() != tag {
        return Err(Error::UnexpectedTag);
    }
    Ok(buffer)
}

/// Decodes a UTF-8 string with a 16-bit length prefix
fn decode_string(buffer: DecoderBuffer) -> Result<(String, DecoderBuffer), Error> {
    let (value, buffer) = buffer.decode_slice_with_len_prefix::<u16>()?;
    let value = core::str::from_utf8(value.into_less_safe_slice())
        .map_err(|_| DecoderError::InvariantViolation("string is not valid UTF-8"))?;
    Ok((value.into(), buffer))
}

/// Checks that a field fits in a 16-bit length prefix
fn check_len(value: &[u8]) -> Result<(), Error> {
    u16::try_from(value.len())
        .map(|_| ())
        .map_err(|_| Error::FieldTooLong)
}
