//! Error types for CLAP plugin hosting

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    Entry,
    Factory,
    Instantiation,
    Initialization,
    Activation,
    Processing,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Entry => write!(f, "initializing entry"),
            LoadStage::Factory => write!(f, "getting factory"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Initialization => write!(f, "initializing plugin"),
            LoadStage::Activation => write!(f, "activating"),
            LoadStage::Processing => write!(f, "starting processing"),
        }
    }
}

/// Every variant leaves the host fully unloaded.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Plugin library could not be opened: {path}\n  Reason: {reason}")]
    LibraryNotFound { path: PathBuf, reason: String },

    #[error("Not a CLAP binary: {path}\n  Reason: {reason}")]
    InvalidBinary { path: PathBuf, reason: String },

    #[error("Incompatible CLAP version {major}.{minor}.{revision}: {path}")]
    IncompatibleVersion {
        path: PathBuf,
        major: u32,
        minor: u32,
        revision: u32,
    },

    #[error("CLAP entry init failed: {path}")]
    EntryInitFailed { path: PathBuf },

    #[error("No plugin factory: {path}")]
    NoFactory { path: PathBuf },

    #[error("Plugin factory exposes no plugins: {path}")]
    NoPlugins { path: PathBuf },

    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    Failed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },
}

impl LoadError {
    pub fn stage(&self) -> LoadStage {
        match self {
            LoadError::LibraryNotFound { .. } | LoadError::InvalidBinary { .. } => {
                LoadStage::Opening
            }
            LoadError::IncompatibleVersion { .. } | LoadError::EntryInitFailed { .. } => {
                LoadStage::Entry
            }
            LoadError::NoFactory { .. } | LoadError::NoPlugins { .. } => LoadStage::Factory,
            LoadError::Failed { stage, .. } => *stage,
        }
    }

    pub(crate) fn failed(
        path: &std::path::Path,
        stage: LoadStage,
        reason: impl Into<String>,
    ) -> Self {
        LoadError::Failed {
            path: path.to_path_buf(),
            stage,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("No plugin loaded")]
    NotLoaded,

    #[error("Parameter index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Unknown parameter name: {0}")]
    UnknownName(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresetError {
    #[error("No plugin loaded")]
    NotLoaded,

    #[error("Plugin does not support loading presets")]
    Unavailable,

    #[error("Preset index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("No preset named {0}")]
    NotFound(String),

    #[error("Plugin rejected preset {name}")]
    Rejected { name: String },
}

/// Internal to preset discovery; logged and never surfaced from `load`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    #[error("No preset discovery provider could be initialized ({tried} tried)")]
    NoProvider { tried: u32 },

    #[error("Preset discovery factory is incomplete: missing {0}")]
    IncompleteFactory(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MidiError {
    #[error("No plugin loaded")]
    NotLoaded,

    #[error("Plugin is not an instrument")]
    NotInstrument,

    #[error("Unsupported MIDI message (status {status:#04x})")]
    Unsupported { status: u8 },

    #[error("Event queue full, MIDI message dropped")]
    QueueFull,

    #[error(transparent)]
    Parse(#[from] clave_midi::Error),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("No plugin loaded")]
    NotLoaded,

    #[error("Plugin does not implement state persistence")]
    Unsupported,

    #[error("Failed to save plugin state: {0}")]
    SaveFailed(String),

    #[error("Failed to restore plugin state: {0}")]
    RestoreFailed(String),

    #[error("Parameter state does not match the loaded plugin: {0}")]
    Mismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid block size: min {min}, max {max}")]
    BlockSize { min: u32, max: u32 },

    #[error("Invalid sample rate: {0}")]
    SampleRate(f64),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("Host string {0} contains a NUL byte")]
    NulInHostString(&'static str),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Parameter: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Preset: {0}")]
    Preset(#[from] PresetError),

    #[error("MIDI: {0}")]
    Midi(#[from] MidiError),

    #[error("State: {0}")]
    State(#[from] StateError),

    #[error("Config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_stage_display() {
        assert_eq!(LoadStage::Opening.to_string(), "opening library");
        assert_eq!(LoadStage::Entry.to_string(), "initializing entry");
        assert_eq!(LoadStage::Factory.to_string(), "getting factory");
        assert_eq!(LoadStage::Instantiation.to_string(), "creating instance");
        assert_eq!(LoadStage::Initialization.to_string(), "initializing plugin");
        assert_eq!(LoadStage::Activation.to_string(), "activating");
        assert_eq!(LoadStage::Processing.to_string(), "starting processing");
    }

    #[test]
    fn test_load_error_stage() {
        let path = PathBuf::from("/plugins/Missing.clap");
        let err = LoadError::LibraryNotFound {
            path: path.clone(),
            reason: "no such file".into(),
        };
        assert_eq!(err.stage(), LoadStage::Opening);
        assert!(err.to_string().contains("Missing.clap"));
        assert!(err.to_string().contains("no such file"));

        let err = LoadError::EntryInitFailed { path: path.clone() };
        assert_eq!(err.stage(), LoadStage::Entry);

        let err = LoadError::NoFactory { path: path.clone() };
        assert_eq!(err.stage(), LoadStage::Factory);

        let err = LoadError::failed(&path, LoadStage::Activation, "activate returned false");
        assert_eq!(err.stage(), LoadStage::Activation);
        assert!(err.to_string().contains("activating"), "got: {err}");
    }

    #[test]
    fn test_parameter_and_preset_errors() {
        let err = ParameterError::IndexOutOfRange { index: 9, count: 2 };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains("count 2"));

        let err = PresetError::NotFound("Warm Pad".into());
        assert!(err.to_string().contains("Warm Pad"));

        let err: Error = PresetError::Unavailable.into();
        assert!(err.to_string().starts_with("Preset:"), "got: {err}");
    }

    #[test]
    fn test_midi_error_display() {
        let err = MidiError::Unsupported { status: 0xE0 };
        assert!(err.to_string().contains("0xe0"), "got: {err}");

        let err: MidiError = clave_midi::Error::Empty.into();
        assert_eq!(err.to_string(), "Empty MIDI message");
    }
}
