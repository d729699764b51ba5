//! In-process CLAP plugin hosting for clave
//!
//! Loads a CLAP binary at runtime, drives the plugin through its lifecycle and
//! bridges mono audio, parameter changes and note events between a host audio
//! engine and the plugin.
//!
//! ## Pieces
//!
//! - **Loader**: opens the binary, checks the ABI version, creates one instance
//! - **Lifecycle**: init → activate → start processing, unwound in reverse on
//!   any failure or on `close`
//! - **Bridge**: per-render event queue, block splitting, port marshaling
//! - **Parameters**: double-buffered values shared with a control thread
//! - **Presets**: declare/crawl discovery through the preset-discovery factory
//!
//! ## Usage
//!
//! ```ignore
//! use clave_plugin::{HostConfig, PluginHost};
//!
//! let mut host = PluginHost::with_config(HostConfig::default().sample_rate(48000.0))?;
//! host.load("/usr/lib/clap/Synth.clap")?;
//!
//! let params = host.parameter_handle(); // Send + Sync, survives reloads
//! params.set_by_name("Cutoff", 800.0)?;
//!
//! host.note_on(60, 100)?;
//! host.render(&input, &mut output);
//! ```

pub mod error;
pub use error::{
    ConfigError, DiscoveryError, Error, LoadError, LoadStage, MidiError, ParameterError,
    PresetError, Result, StateError,
};

mod config;
pub use config::{Downmix, HostConfig};

mod metadata;
pub use metadata::{is_instrument_features, AudioIO, PluginMetadata};

mod lifecycle;
pub use lifecycle::LifecycleState;

mod library;
pub use library::ClapLibrary;

mod params;
pub use params::{ParameterFlags, ParameterHandle, ParameterInfo, ParameterSync};

mod presets;
pub use presets::{
    DiscoveryEvent, DiscoveryLocation, LocationKind, PresetCatalog, PresetFileType, PresetInfo,
};

mod state;
pub use state::ParameterSnapshot;

mod voices;
pub use voices::{NoteEnd, NoteEndEvents};

mod instance;
pub use instance::ProcessStatus;

mod bridge;
pub use bridge::MAX_CHANNELS;

mod wrapper;
pub use wrapper::{MidiDisposition, PluginHost};

mod events;
mod ffi;
mod host;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clave_midi::MidiEvent;

pub mod prelude {
    pub use crate::{
        Downmix, HostConfig, LifecycleState, MidiDisposition, ParameterHandle, PluginHost,
        PluginMetadata, PresetInfo,
    };
}
