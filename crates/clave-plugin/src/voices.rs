//! Voice bookkeeping for instrument plugins.
//!
//! Every note-on opens a voice with a host-assigned note id. Voices close when
//! released by note-off/choke or when the plugin reports `NOTE_END`; each
//! closed voice yields exactly one [`NoteEnd`] on a lock-free queue.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};

/// End-of-note notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEnd {
    pub note_id: i32,
    pub channel: i16,
    pub key: i16,
}

/// Receiving side of the end-of-note queue.
///
/// The queue is bounded; when full the oldest notification is overwritten.
#[derive(Clone)]
pub struct NoteEndEvents {
    queue: Arc<ArrayQueue<NoteEnd>>,
}

impl NoteEndEvents {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
        }
    }

    pub fn pop(&self) -> Option<NoteEnd> {
        self.queue.pop()
    }

    pub fn drain(&self) -> Vec<NoteEnd> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn notify(&self, end: NoteEnd) {
        self.queue.force_push(end);
    }
}

impl std::fmt::Debug for NoteEndEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteEndEvents")
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    note_id: i32,
    channel: i16,
    key: i16,
    held: bool,
}

impl Voice {
    fn end(&self) -> NoteEnd {
        NoteEnd {
            note_id: self.note_id,
            channel: self.channel,
            key: self.key,
        }
    }
}

pub(crate) struct VoiceTracker {
    voices: Vec<Voice>,
    max_voices: usize,
    next_id: i32,
    ends: NoteEndEvents,
}

impl VoiceTracker {
    pub(crate) fn new(max_voices: usize, ends: NoteEndEvents) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices,
            next_id: 0,
            ends,
        }
    }

    /// Open a voice, returning its note id and any voice evicted to make room.
    pub(crate) fn note_on(&mut self, channel: i16, key: i16) -> (i32, Option<NoteEnd>) {
        let evicted = if self.voices.len() >= self.max_voices {
            let oldest = self.voices.remove(0);
            self.ends.notify(oldest.end());
            Some(oldest.end())
        } else {
            None
        };

        let note_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1) & i32::MAX;
        self.voices.push(Voice {
            note_id,
            channel,
            key,
            held: true,
        });
        (note_id, evicted)
    }

    /// Release the oldest held voice on `channel`/`key`.
    pub(crate) fn note_off(&mut self, channel: i16, key: i16) -> Option<i32> {
        let voice = self
            .voices
            .iter_mut()
            .find(|v| v.held && v.channel == channel && v.key == key)?;
        voice.held = false;
        Some(voice.note_id)
    }

    /// Release every voice on `channel`/`key`; returns how many were held.
    pub(crate) fn choke(&mut self, channel: i16, key: i16) -> usize {
        let mut released = 0;
        for voice in &mut self.voices {
            if voice.channel == channel && voice.key == key && voice.held {
                voice.held = false;
                released += 1;
            }
        }
        released
    }

    /// The plugin reported a voice finished.
    pub(crate) fn on_note_end(&mut self, note_id: i32, channel: i16, key: i16) {
        let position = if note_id >= 0 {
            self.voices.iter().position(|v| v.note_id == note_id)
        } else {
            self.voices
                .iter()
                .position(|v| v.channel == channel && v.key == key)
        };
        if let Some(index) = position {
            let voice = self.voices.remove(index);
            self.ends.notify(voice.end());
        }
    }

    /// Drop released voices after a render, notifying for each.
    pub(crate) fn collect_released(&mut self) {
        let ends = &self.ends;
        self.voices.retain(|voice| {
            if !voice.held {
                ends.notify(voice.end());
            }
            voice.held
        });
    }

    /// Forget every voice without notifying.
    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.voices.len()
    }

    pub(crate) fn held(&self) -> usize {
        self.voices.iter().filter(|v| v.held).count()
    }
}
