//! Centralized error type for the clave umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Plugin: {0}")]
    Plugin(#[from] clave_plugin::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] clave_midi::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<clave_plugin::LoadError> for Error {
    fn from(err: clave_plugin::LoadError) -> Self {
        Error::Plugin(err.into())
    }
}

impl From<clave_plugin::ParameterError> for Error {
    fn from(err: clave_plugin::ParameterError) -> Self {
        Error::Plugin(err.into())
    }
}

impl From<clave_plugin::PresetError> for Error {
    fn from(err: clave_plugin::PresetError) -> Self {
        Error::Plugin(err.into())
    }
}

impl From<clave_plugin::StateError> for Error {
    fn from(err: clave_plugin::StateError) -> Self {
        Error::Plugin(err.into())
    }
}

impl From<clave_plugin::MidiError> for Error {
    fn from(err: clave_plugin::MidiError) -> Self {
        Error::Plugin(err.into())
    }
}

impl From<clave_plugin::ConfigError> for Error {
    fn from(err: clave_plugin::ConfigError) -> Self {
        Error::Plugin(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
