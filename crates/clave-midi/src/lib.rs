//! MIDI event types for the clave CLAP host.
//!
//! Host-side code hands raw channel-voice messages (status byte plus up to two
//! data bytes) to the plugin wrapper. This crate parses them into typed,
//! `Copy` events that carry a sample-accurate frame offset, so the render path
//! never has to touch the wire format.
//!
//! # Example
//!
//! ```
//! use clave_midi::{MessageKind, MidiEvent};
//!
//! let event = MidiEvent::from_bytes(&[0x90, 60, 100]).unwrap();
//! assert_eq!(event.kind(), MessageKind::NoteOn);
//! assert_eq!(event.note(), Some(60));
//! ```

pub mod error;
pub use error::{Error, Result};

mod event;
pub use event::{MessageKind, MidiEvent, MidiEventBuilder, MidiEventVec, RawMidiEvent};

mod utils;
pub use utils::{is_channel_voice_status, unit_to_velocity, velocity_to_unit};

// Re-export essential upstream types (users shouldn't need to import midi-msg directly)
pub use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};
