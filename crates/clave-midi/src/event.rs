//! RT-safe MIDI event types with sample-accurate timing.

use midi_msg::{Channel, ChannelVoiceMsg, MidiMsg};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::utils::is_channel_voice_status;

const MIDI_STACK_CAPACITY: usize = 64;

pub type MidiEventVec = SmallVec<[MidiEvent; MIDI_STACK_CAPACITY]>;

/// Coarse classification used by the plugin bridge to decide what to forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Note-on with non-zero velocity.
    NoteOn,
    /// Note-off, or note-on with zero velocity.
    NoteOff,
    ControlChange,
    ProgramChange,
    PitchBend,
    /// Aftertouch and anything else on a channel.
    Other,
}

/// RT-safe MIDI event with sample-accurate frame offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RawMidiEvent", try_from = "RawMidiEvent")]
pub struct MidiEvent {
    /// Offset within the current render quantum (0 = first sample).
    pub frame_offset: usize,
    pub channel: Channel,
    pub msg: ChannelVoiceMsg,
}

impl MidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, channel: Channel, msg: ChannelVoiceMsg) -> Self {
        Self {
            frame_offset,
            channel,
            msg,
        }
    }

    #[inline]
    pub fn note_on_builder(note: u8, velocity: u8) -> MidiEventBuilder {
        MidiEventBuilder {
            frame_offset: 0,
            channel: 0,
            msg: ChannelVoiceMsg::NoteOn { note, velocity },
        }
    }

    #[inline]
    pub fn note_off_builder(note: u8) -> MidiEventBuilder {
        MidiEventBuilder {
            frame_offset: 0,
            channel: 0,
            msg: ChannelVoiceMsg::NoteOff { note, velocity: 0 },
        }
    }

    #[inline]
    pub fn cc_builder(control: u8, value: u8) -> MidiEventBuilder {
        MidiEventBuilder {
            frame_offset: 0,
            channel: 0,
            msg: ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { control, value },
            },
        }
    }

    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOn { note, velocity },
        }
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOff { note, velocity },
        }
    }

    #[inline]
    pub fn control_change(frame_offset: usize, channel: u8, cc: u8, value: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { control: cc, value },
            },
        }
    }

    #[inline]
    pub fn program_change(frame_offset: usize, channel: u8, program: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ProgramChange { program },
        }
    }

    #[inline]
    pub fn pitch_bend(frame_offset: usize, channel: u8, bend: u16) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::PitchBend { bend },
        }
    }

    #[inline]
    pub fn channel_num(&self) -> u8 {
        self.channel as u8
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        self.kind() == MessageKind::NoteOn
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        self.kind() == MessageKind::NoteOff
    }

    pub fn kind(&self) -> MessageKind {
        match self.msg {
            ChannelVoiceMsg::NoteOn { velocity: 0, .. } => MessageKind::NoteOff,
            ChannelVoiceMsg::HighResNoteOn { velocity: 0, .. } => MessageKind::NoteOff,
            ChannelVoiceMsg::NoteOn { .. } | ChannelVoiceMsg::HighResNoteOn { .. } => {
                MessageKind::NoteOn
            }
            ChannelVoiceMsg::NoteOff { .. } | ChannelVoiceMsg::HighResNoteOff { .. } => {
                MessageKind::NoteOff
            }
            ChannelVoiceMsg::ControlChange { .. } => MessageKind::ControlChange,
            ChannelVoiceMsg::ProgramChange { .. } => MessageKind::ProgramChange,
            ChannelVoiceMsg::PitchBend { .. } => MessageKind::PitchBend,
            _ => MessageKind::Other,
        }
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { note, .. }
            | ChannelVoiceMsg::NoteOff { note, .. }
            | ChannelVoiceMsg::HighResNoteOn { note, .. }
            | ChannelVoiceMsg::HighResNoteOff { note, .. }
            | ChannelVoiceMsg::PolyPressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { velocity, .. }
            | ChannelVoiceMsg::NoteOff { velocity, .. } => Some(velocity),
            ChannelVoiceMsg::HighResNoteOn { velocity, .. }
            | ChannelVoiceMsg::HighResNoteOff { velocity, .. } => {
                // High-res velocity is 14-bit, return upper 7 bits
                Some((velocity >> 7) as u8)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn to_midi_msg(&self) -> MidiMsg {
        MidiMsg::ChannelVoice {
            channel: self.channel,
            msg: self.msg,
        }
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_midi_msg().to_midi()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_offset(bytes, 0)
    }

    pub fn from_bytes_with_offset(bytes: &[u8], frame_offset: usize) -> Result<Self> {
        let status = *bytes.first().ok_or(Error::Empty)?;
        if !is_channel_voice_status(status) {
            return Err(Error::NotChannelVoice { status });
        }

        let (msg, _len) = MidiMsg::from_midi(bytes)?;
        match msg {
            MidiMsg::ChannelVoice { channel, msg } => Ok(Self {
                frame_offset,
                channel,
                msg,
            }),
            _ => Err(Error::NotChannelVoice { status }),
        }
    }
}

/// Raw 3-byte MIDI event for unparsed storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMidiEvent {
    pub frame_offset: usize,
    pub data: [u8; 3],
    /// Valid bytes in `data` (1-3).
    pub len: u8,
}

impl RawMidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, data: [u8; 3], len: u8) -> Self {
        Self {
            frame_offset,
            data,
            len,
        }
    }

    /// Copies at most three bytes out of `bytes`.
    pub fn from_slice(frame_offset: usize, bytes: &[u8]) -> Self {
        let mut data = [0u8; 3];
        let len = bytes.len().min(3);
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            frame_offset,
            data,
            len: len as u8,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(3)]
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0F
    }

    pub fn to_midi_event(&self) -> Result<MidiEvent> {
        MidiEvent::from_bytes_with_offset(self.as_bytes(), self.frame_offset)
    }
}

impl From<MidiEvent> for RawMidiEvent {
    fn from(event: MidiEvent) -> Self {
        Self::from_slice(event.frame_offset, &event.to_bytes())
    }
}

impl TryFrom<RawMidiEvent> for MidiEvent {
    type Error = Error;

    fn try_from(raw: RawMidiEvent) -> Result<Self> {
        raw.to_midi_event()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MidiEventBuilder {
    frame_offset: usize,
    channel: u8,
    msg: ChannelVoiceMsg,
}

impl MidiEventBuilder {
    #[inline]
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    #[inline]
    pub fn offset(mut self, frame_offset: usize) -> Self {
        self.frame_offset = frame_offset;
        self
    }

    #[inline]
    pub fn build(self) -> MidiEvent {
        MidiEvent {
            frame_offset: self.frame_offset,
            channel: Channel::from_u8(self.channel),
            msg: self.msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Construction ──

    #[test]
    fn test_note_on() {
        let event = MidiEvent::note_on(100, 0, 60, 100);
        assert!(event.is_note_on());
        assert!(!event.is_note_off());
        assert_eq!(event.note(), Some(60));
        assert_eq!(event.velocity(), Some(100));
        assert_eq!(event.channel_num(), 0);
        assert_eq!(event.frame_offset, 100);
    }

    #[test]
    fn test_note_off() {
        let event = MidiEvent::note_off(50, 3, 64, 0);
        assert!(event.is_note_off());
        assert!(!event.is_note_on());
        assert_eq!(event.note(), Some(64));
        assert_eq!(event.channel_num(), 3);
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        let event = MidiEvent::note_on(0, 0, 60, 0);
        assert!(event.is_note_off());
        assert!(!event.is_note_on());
        assert_eq!(event.kind(), MessageKind::NoteOff);
    }

    #[test]
    fn test_builder_with_channel_and_offset() {
        let event = MidiEvent::note_on_builder(64, 80)
            .channel(5)
            .offset(480)
            .build();
        assert_eq!(event.note(), Some(64));
        assert_eq!(event.velocity(), Some(80));
        assert_eq!(event.channel_num(), 5);
        assert_eq!(event.frame_offset, 480);
    }

    // ── Parsing raw bytes ──

    #[test]
    fn test_from_bytes_classifies_messages() {
        let cases: [(&[u8], MessageKind); 5] = [
            (&[0x90, 60, 100], MessageKind::NoteOn),
            (&[0x80, 60, 0], MessageKind::NoteOff),
            (&[0x91, 60, 0], MessageKind::NoteOff),
            (&[0xB0, 7, 100], MessageKind::ControlChange),
            (&[0xC0, 5], MessageKind::ProgramChange),
        ];

        for (bytes, expected) in cases {
            let event = MidiEvent::from_bytes(bytes).unwrap();
            assert_eq!(event.kind(), expected, "bytes {bytes:02x?}");
        }
    }

    #[test]
    fn test_from_bytes_keeps_channel() {
        let event = MidiEvent::from_bytes(&[0x93, 64, 90]).unwrap();
        assert_eq!(event.channel_num(), 3);
        assert_eq!(event.note(), Some(64));
    }

    #[test]
    fn test_from_bytes_rejects_non_channel_messages() {
        assert_eq!(MidiEvent::from_bytes(&[]), Err(Error::Empty));
        assert_eq!(
            MidiEvent::from_bytes(&[0xF8]),
            Err(Error::NotChannelVoice { status: 0xF8 })
        );
        assert!(
            MidiEvent::from_bytes(&[0x40, 0, 0]).is_err(),
            "data byte without status must be rejected"
        );
    }

    #[test]
    fn test_raw_midi_event() {
        let event = MidiEvent::note_on(100, 0, 60, 100);
        let raw: RawMidiEvent = event.into();
        assert_eq!(raw.frame_offset, 100);
        assert_eq!(raw.status(), 0x90);
        assert_eq!(raw.channel(), 0);
        assert_eq!(raw.as_bytes(), &[0x90, 60, 100]);

        let back = raw.to_midi_event().unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_serde_uses_raw_bytes() {
        let event = MidiEvent::note_on(12, 2, 67, 99);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"data\""), "serialized as raw bytes: {json}");

        let decoded: MidiEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
