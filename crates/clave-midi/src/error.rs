//! Error types for MIDI parsing

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Empty MIDI message")]
    Empty,

    #[error("Not a channel voice message (status {status:#04x})")]
    NotChannelVoice { status: u8 },

    #[error("MIDI parse error: {0}")]
    Parse(String),
}

impl From<midi_msg::ParseError> for Error {
    fn from(err: midi_msg::ParseError) -> Self {
        Error::Parse(format!("{err:?}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Empty.to_string(), "Empty MIDI message");

        let err = Error::NotChannelVoice { status: 0xF8 };
        assert!(err.to_string().contains("0xf8"), "got: {err}");

        let err = Error::Parse("unexpected end".into());
        assert!(err.to_string().contains("unexpected end"));
    }
}
