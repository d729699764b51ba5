//! # clave - CLAP plugin hosting
//!
//! Umbrella crate over the clave workspace:
//! - **clave-plugin** - loads a CLAP binary, drives its lifecycle, bridges
//!   audio, parameters, notes and presets
//! - **clave-midi** - typed MIDI channel-voice events
//!
//! ## Quick Start
//!
//! ```ignore
//! use clave::prelude::*;
//!
//! let mut host = PluginHost::with_config(HostConfig::default().sample_rate(44100.0))?;
//! host.load("/usr/lib/clap/Reverb.clap")?;
//!
//! let params = host.parameter_handle();
//! std::thread::spawn(move || params.set_by_name("Mix", 0.3));
//!
//! host.render(&input, &mut output);
//! ```
//!
//! ## Feature Flags
//!
//! - `testing` - an in-process fake CLAP plugin (`clave::plugin::testing`)

/// Re-export of clave-plugin for direct access
pub use clave_plugin as plugin;

/// Re-export of clave-midi for direct access
pub use clave_midi as midi;

pub use clave_plugin::{
    AudioIO,
    ClapLibrary,
    ConfigError,
    DiscoveryLocation,
    Downmix,
    HostConfig,
    LifecycleState,
    LoadError,
    LoadStage,
    MidiDisposition,
    MidiError,
    NoteEnd,
    NoteEndEvents,

    // Parameters
    ParameterError,
    ParameterFlags,
    ParameterHandle,
    ParameterInfo,
    ParameterSnapshot,

    // Host
    PluginHost,
    PluginMetadata,

    // Presets
    LocationKind,
    PresetCatalog,
    PresetError,
    PresetInfo,

    StateError,
};

pub use clave_midi::{MessageKind, MidiEvent, RawMidiEvent};

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        Downmix, HostConfig, LifecycleState, MidiDisposition, MidiEvent, ParameterHandle,
        PluginHost, PluginMetadata, PresetInfo,
    };
}
