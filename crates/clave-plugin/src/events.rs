//! Event plumbing between the host and the plugin's `process` call.
//!
//! Input events live in a preallocated [`EventQueue`] kept sorted by frame
//! offset. Output events pushed by the plugin land in [`OutputEvents`]. Neither
//! allocates on the render path once constructed.

use std::ffi::c_void;
use std::ops::Range;
use std::ptr;

use clap_sys::events::{
    clap_event_header, clap_event_note, clap_event_param_value, clap_input_events,
    clap_output_events, CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_NOTE_CHOKE, CLAP_EVENT_NOTE_END,
    CLAP_EVENT_NOTE_OFF, CLAP_EVENT_NOTE_ON, CLAP_EVENT_PARAM_VALUE,
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoteKind {
    On,
    Off,
    Choke,
}

impl NoteKind {
    fn event_type(self) -> u16 {
        match self {
            NoteKind::On => CLAP_EVENT_NOTE_ON,
            NoteKind::Off => CLAP_EVENT_NOTE_OFF,
            NoteKind::Choke => CLAP_EVENT_NOTE_CHOKE,
        }
    }
}

/// An input event in its CLAP wire layout.
#[derive(Clone, Copy)]
pub(crate) enum ClapEvent {
    Note(clap_event_note),
    Param(clap_event_param_value),
}

// Safety: the only pointer inside is the parameter cookie, which is always
// null for host-generated events.
unsafe impl Send for ClapEvent {}

fn header<T>(type_: u16, time: u32) -> clap_event_header {
    clap_event_header {
        size: std::mem::size_of::<T>() as u32,
        time,
        space_id: CLAP_CORE_EVENT_SPACE_ID,
        type_,
        flags: 0,
    }
}

impl ClapEvent {
    pub(crate) fn note(
        kind: NoteKind,
        time: u32,
        note_id: i32,
        channel: i16,
        key: i16,
        velocity: f64,
    ) -> Self {
        ClapEvent::Note(clap_event_note {
            header: header::<clap_event_note>(kind.event_type(), time),
            note_id,
            port_index: 0,
            channel,
            key,
            velocity,
        })
    }

    pub(crate) fn param_value(time: u32, param_id: u32, value: f64) -> Self {
        ClapEvent::Param(clap_event_param_value {
            header: header::<clap_event_param_value>(CLAP_EVENT_PARAM_VALUE, time),
            param_id,
            cookie: ptr::null_mut(),
            note_id: -1,
            port_index: -1,
            channel: -1,
            key: -1,
            value,
        })
    }

    pub(crate) fn header(&self) -> &clap_event_header {
        match self {
            ClapEvent::Note(event) => &event.header,
            ClapEvent::Param(event) => &event.header,
        }
    }

    fn header_mut(&mut self) -> &mut clap_event_header {
        match self {
            ClapEvent::Note(event) => &mut event.header,
            ClapEvent::Param(event) => &mut event.header,
        }
    }

    pub(crate) fn time(&self) -> u32 {
        self.header().time
    }
}

impl std::fmt::Debug for ClapEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClapEvent::Note(e) => f
                .debug_struct("Note")
                .field("type", &e.header.type_)
                .field("time", &e.header.time)
                .field("note_id", &e.note_id)
                .field("key", &e.key)
                .field("velocity", &e.velocity)
                .finish(),
            ClapEvent::Param(e) => f
                .debug_struct("Param")
                .field("time", &e.header.time)
                .field("param_id", &e.param_id)
                .field("value", &e.value)
                .finish(),
        }
    }
}

/// Bounded, time-sorted queue of pending input events.
pub(crate) struct EventQueue {
    events: Vec<ClapEvent>,
    capacity: usize,
    /// Slots kept free for parameter changes injected at block start.
    reserved: usize,
    /// Parameter changes currently at the front.
    head: usize,
    overflow_reported: bool,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize, reserved: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity + reserved),
            capacity,
            reserved,
            head: 0,
            overflow_reported: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Free slots for `push`.
    pub(crate) fn remaining(&self) -> usize {
        self.capacity - (self.events.len() - self.head)
    }

    /// Insert keeping frame order; equal offsets keep arrival order.
    ///
    /// Returns `false` when the queue is full and the event was dropped.
    pub(crate) fn push(&mut self, event: ClapEvent) -> bool {
        if self.events.len() - self.head >= self.capacity {
            if !self.overflow_reported {
                warn!(capacity = self.capacity, "event queue full, dropping events");
                self.overflow_reported = true;
            }
            return false;
        }
        let time = event.time();
        let at = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(at.max(self.head), event);
        true
    }

    /// Parameter change delivered ahead of every queued event.
    pub(crate) fn inject_param(&mut self, param_id: u32, value: f64) -> bool {
        if self.head >= self.reserved {
            return false;
        }
        self.events
            .insert(self.head, ClapEvent::param_value(0, param_id, value));
        self.head += 1;
        true
    }

    /// Pull offsets past the end of the block onto its last frame.
    pub(crate) fn clamp_times(&mut self, frames: usize) {
        if frames == 0 {
            return;
        }
        let last = (frames - 1) as u32;
        for event in &mut self.events {
            let header = event.header_mut();
            header.time = header.time.min(last);
        }
    }

    pub(crate) fn as_slice(&self) -> &[ClapEvent] {
        &self.events
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.head = 0;
        self.overflow_reported = false;
    }
}

// ── Input list ──

/// Runs `f` with a `clap_input_events` view over `events`.
pub(crate) fn with_input_events<R>(
    events: &[ClapEvent],
    f: impl FnOnce(&clap_input_events) -> R,
) -> R {
    let slice = events;
    let list = clap_input_events {
        ctx: &slice as *const &[ClapEvent] as *mut c_void,
        size: Some(input_events_size),
        get: Some(input_events_get),
    };
    f(&list)
}

unsafe fn input_slice<'a>(list: *const clap_input_events) -> &'a [ClapEvent] {
    *((*list).ctx as *const &[ClapEvent])
}

unsafe extern "C" fn input_events_size(list: *const clap_input_events) -> u32 {
    if list.is_null() {
        return 0;
    }
    input_slice(list).len() as u32
}

unsafe extern "C" fn input_events_get(
    list: *const clap_input_events,
    index: u32,
) -> *const clap_event_header {
    if list.is_null() {
        return ptr::null();
    }
    match input_slice(list).get(index as usize) {
        Some(event) => event.header(),
        None => ptr::null(),
    }
}

// ── Output list ──

/// Event the plugin reported back during `process`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum OutputEvent {
    NoteEnd { note_id: i32, channel: i16, key: i16 },
    ParamValue { param_id: u32, value: f64 },
}

pub(crate) struct OutputEvents {
    events: Vec<OutputEvent>,
    capacity: usize,
}

impl OutputEvents {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn as_slice(&self) -> &[OutputEvent] {
        &self.events
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }

    fn accept(&mut self, header: &clap_event_header) -> bool {
        if header.space_id != CLAP_CORE_EVENT_SPACE_ID {
            // Not ours to interpret.
            return true;
        }
        let event = match header.type_ {
            CLAP_EVENT_NOTE_END if header.size as usize >= std::mem::size_of::<clap_event_note>() => {
                let e = unsafe { &*(header as *const clap_event_header as *const clap_event_note) };
                OutputEvent::NoteEnd {
                    note_id: e.note_id,
                    channel: e.channel,
                    key: e.key,
                }
            }
            CLAP_EVENT_PARAM_VALUE
                if header.size as usize >= std::mem::size_of::<clap_event_param_value>() =>
            {
                let e = unsafe {
                    &*(header as *const clap_event_header as *const clap_event_param_value)
                };
                OutputEvent::ParamValue {
                    param_id: e.param_id,
                    value: e.value,
                }
            }
            _ => return true,
        };
        if self.events.len() >= self.capacity {
            return false;
        }
        self.events.push(event);
        true
    }
}

/// Runs `f` with a `clap_output_events` that appends into `sink`.
pub(crate) fn with_output_events<R>(
    sink: &mut OutputEvents,
    f: impl FnOnce(&clap_output_events) -> R,
) -> R {
    let list = clap_output_events {
        ctx: sink as *mut OutputEvents as *mut c_void,
        try_push: Some(output_events_try_push),
    };
    f(&list)
}

unsafe extern "C" fn output_events_try_push(
    list: *const clap_output_events,
    event: *const clap_event_header,
) -> bool {
    if list.is_null() || event.is_null() || (*list).ctx.is_null() {
        return false;
    }
    let sink = &mut *((*list).ctx as *mut OutputEvents);
    sink.accept(&*event)
}

// ── Segmentation ──

/// One contiguous slice of a render block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub start: usize,
    pub len: usize,
    /// Indices into the sorted event slice.
    pub events: Range<usize>,
}

/// Splits a block at `max_frames` and, optionally, at every event offset.
///
/// Event offsets must already be clamped below `frames`.
pub(crate) struct Segments<'a> {
    events: &'a [ClapEvent],
    frames: usize,
    max_frames: usize,
    split_at_events: bool,
    pos: usize,
    next_event: usize,
}

impl<'a> Segments<'a> {
    pub(crate) fn new(
        events: &'a [ClapEvent],
        frames: usize,
        max_frames: usize,
        split_at_events: bool,
    ) -> Self {
        Self {
            events,
            frames,
            max_frames: max_frames.max(1),
            split_at_events,
            pos: 0,
            next_event: 0,
        }
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.pos >= self.frames {
            return None;
        }
        let start = self.pos;
        let mut end = self.frames.min(start + self.max_frames);

        let pending = &self.events[self.next_event..];
        if self.split_at_events {
            if let Some(event) = pending.iter().find(|e| e.time() as usize > start) {
                end = end.min(event.time() as usize);
            }
        }

        let taken = pending.partition_point(|e| (e.time() as usize) < end);
        let events = self.next_event..self.next_event + taken;
        self.next_event += taken;
        self.pos = end;

        Some(Segment {
            start,
            len: end - start,
            events,
        })
    }
}

/// Copies `events` into `scratch` with offsets relative to `start`.
pub(crate) fn rebase_into(events: &[ClapEvent], start: usize, scratch: &mut Vec<ClapEvent>) {
    scratch.clear();
    for event in events {
        let mut event = *event;
        let header = event.header_mut();
        header.time = header.time.saturating_sub(start as u32);
        scratch.push(event);
    }
}
