//! State persistence.
//!
//! Two formats: a host-side parameter snapshot (bincode of ids and values)
//! that works with any plugin, and the plugin's own opaque state blob read
//! and written through in-memory CLAP streams.

use std::ffi::c_void;

use clap_sys::stream::{clap_istream, clap_ostream};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::params::ParameterSync;

/// Parameter values keyed by id, in the plugin's parameter order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub ids: Vec<u32>,
    pub values: Vec<f64>,
}

impl ParameterSnapshot {
    /// Capture the most recent values, including plugin-side changes.
    pub fn capture(sync: &ParameterSync) -> Self {
        Self {
            ids: sync.infos().iter().map(|info| info.id).collect(),
            values: sync.snapshot(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StateError> {
        Ok(bincode::deserialize(data)?)
    }

    /// Queue every value for the next render; nothing changes on mismatch.
    pub fn apply(&self, sync: &ParameterSync) -> Result<(), StateError> {
        if self.ids.len() != self.values.len() {
            return Err(StateError::Mismatch(format!(
                "{} ids but {} values",
                self.ids.len(),
                self.values.len()
            )));
        }
        if self.ids.len() != sync.len() {
            return Err(StateError::Mismatch(format!(
                "expected {} parameters, found {}",
                sync.len(),
                self.ids.len()
            )));
        }
        if let Some((info, id)) = sync
            .infos()
            .iter()
            .zip(&self.ids)
            .find(|(info, id)| info.id != **id)
        {
            return Err(StateError::Mismatch(format!(
                "parameter {} has id {}, blob has {id}",
                info.name, info.id
            )));
        }
        sync.restore(&self.values);
        Ok(())
    }
}

/// Growable in-memory `clap_ostream`.
pub(crate) struct OutputStream {
    buffer: Vec<u8>,
    raw: clap_ostream,
}

impl OutputStream {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::new(),
            raw: clap_ostream {
                ctx: std::ptr::null_mut(),
                write: Some(output_stream_write),
            },
        }
    }

    /// Valid while `self` is neither moved nor dropped.
    pub(crate) fn as_raw(&mut self) -> *const clap_ostream {
        self.raw.ctx = &mut self.buffer as *mut Vec<u8> as *mut c_void;
        &self.raw
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

unsafe extern "C" fn output_stream_write(
    stream: *const clap_ostream,
    buffer: *const c_void,
    size: u64,
) -> i64 {
    if stream.is_null() || (*stream).ctx.is_null() || (buffer.is_null() && size > 0) {
        return -1;
    }
    let out = &mut *((*stream).ctx as *mut Vec<u8>);
    if size > 0 {
        out.extend_from_slice(std::slice::from_raw_parts(buffer as *const u8, size as usize));
    }
    size as i64
}

struct ReadCursor<'a> {
    data: &'a [u8],
    position: usize,
}

/// Read-only `clap_istream` over a byte slice.
pub(crate) struct InputStream<'a> {
    cursor: ReadCursor<'a>,
    raw: clap_istream,
}

impl<'a> InputStream<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: ReadCursor { data, position: 0 },
            raw: clap_istream {
                ctx: std::ptr::null_mut(),
                read: Some(input_stream_read),
            },
        }
    }

    /// Valid while `self` is neither moved nor dropped.
    pub(crate) fn as_raw(&mut self) -> *const clap_istream {
        self.raw.ctx = &mut self.cursor as *mut ReadCursor<'a> as *mut c_void;
        &self.raw
    }
}

unsafe extern "C" fn input_stream_read(
    stream: *const clap_istream,
    buffer: *mut c_void,
    size: u64,
) -> i64 {
    if stream.is_null() || (*stream).ctx.is_null() || (buffer.is_null() && size > 0) {
        return -1;
    }
    let cursor = &mut *((*stream).ctx as *mut ReadCursor<'_>);
    let remaining = cursor.data.len() - cursor.position;
    let count = (size as usize).min(remaining);
    if count > 0 {
        let src = &cursor.data[cursor.position..cursor.position + count];
        std::ptr::copy_nonoverlapping(src.as_ptr(), buffer as *mut u8, count);
        cursor.position += count;
    }
    count as i64
}
