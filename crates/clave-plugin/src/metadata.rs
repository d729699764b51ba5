//! Plugin metadata
//!
//! Built from a CLAP descriptor and completed with port information once the
//! plugin is instantiated.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Audio I/O configuration of the main ports
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioIO {
    /// Channels of the main input port (0 = no audio input)
    pub inputs: usize,
    /// Channels of the main output port
    pub outputs: usize,
}

impl AudioIO {
    /// Stereo in, stereo out
    pub fn stereo() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Reverse-DNS plugin ID from the descriptor
    pub id: String,

    /// Human-readable name
    pub name: String,

    pub vendor: String,

    pub version: String,

    #[serde(default)]
    pub description: String,

    /// Descriptor feature tags, in declaration order
    #[serde(default)]
    pub features: SmallVec<[String; 4]>,

    pub audio_io: AudioIO,

    /// Does this plugin receive note events?
    pub receives_midi: bool,

    /// Declares an instrument or synthesizer feature
    #[serde(default)]
    pub is_instrument: bool,
}

impl PluginMetadata {
    /// Create new metadata with required fields
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vendor: String::new(),
            version: "1.0.0".to_string(),
            description: String::new(),
            features: SmallVec::new(),
            audio_io: AudioIO::stereo(),
            receives_midi: false,
            is_instrument: false,
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the feature tags and reclassifies the plugin.
    pub fn features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self.is_instrument = is_instrument_features(self.features.as_slice());
        if self.is_instrument {
            self.receives_midi = true;
        }
        self
    }

    pub fn audio_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_io = AudioIO { inputs, outputs };
        self
    }

    pub fn midi(mut self, receives_midi: bool) -> Self {
        self.receives_midi = receives_midi;
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// True when any tag is `instrument` or `synthesizer`. Gates MIDI operations.
pub fn is_instrument_features<S: AsRef<str>>(features: &[S]) -> bool {
    features
        .iter()
        .any(|f| matches!(f.as_ref(), "instrument" | "synthesizer"))
}
