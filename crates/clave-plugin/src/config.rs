//! Host configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_sample_rate() -> f64 {
    44100.0
}

fn default_min_frames() -> u32 {
    1
}

fn default_max_frames() -> u32 {
    8192
}

fn default_split_at_events() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1024
}

fn default_max_voices() -> usize {
    128
}

fn default_host_name() -> String {
    "Clave".to_string()
}

fn default_host_vendor() -> String {
    "Clave Project".to_string()
}

fn default_host_url() -> String {
    String::new()
}

fn default_host_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// How a multi-channel plugin output is folded into the mono host stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Downmix {
    /// First channel only.
    #[default]
    Left,
    /// Sum of all channels.
    Sum,
    /// Mean of all channels.
    Average,
}

impl Downmix {
    /// Folds `frames` samples of `channels` into `dst`.
    pub(crate) fn fold(self, channels: &[Vec<f32>], frames: usize, dst: &mut [f32]) {
        let Some(first) = channels.first() else {
            dst[..frames].fill(0.0);
            return;
        };

        dst[..frames].copy_from_slice(&first[..frames]);
        if self == Downmix::Left || channels.len() == 1 {
            return;
        }

        for channel in &channels[1..] {
            for (out, sample) in dst[..frames].iter_mut().zip(&channel[..frames]) {
                *out += *sample;
            }
        }

        if self == Downmix::Average {
            let scale = 1.0 / channels.len() as f32;
            for out in &mut dst[..frames] {
                *out *= scale;
            }
        }
    }
}

/// Configuration for a [`PluginHost`](crate::PluginHost).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Smallest block the plugin is promised at activation.
    #[serde(default = "default_min_frames")]
    pub min_frames: u32,

    /// Largest block handed to `process`; longer renders are chunked.
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,

    #[serde(default)]
    pub downmix: Downmix,

    /// Split each render at event timestamps so block-start-only plugins
    /// still observe events at their sample offset.
    #[serde(default = "default_split_at_events")]
    pub split_at_events: bool,

    /// Pending control events per render quantum.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Tracked voices for instrument plugins.
    #[serde(default = "default_max_voices")]
    pub max_voices: usize,

    #[serde(default = "default_host_name")]
    pub host_name: String,

    #[serde(default = "default_host_vendor")]
    pub host_vendor: String,

    #[serde(default = "default_host_url")]
    pub host_url: String,

    #[serde(default = "default_host_version")]
    pub host_version: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            min_frames: default_min_frames(),
            max_frames: default_max_frames(),
            downmix: Downmix::default(),
            split_at_events: default_split_at_events(),
            event_capacity: default_event_capacity(),
            max_voices: default_max_voices(),
            host_name: default_host_name(),
            host_vendor: default_host_vendor(),
            host_url: default_host_url(),
            host_version: default_host_version(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn block_size(mut self, min_frames: u32, max_frames: u32) -> Self {
        self.min_frames = min_frames;
        self.max_frames = max_frames;
        self
    }

    pub fn downmix(mut self, downmix: Downmix) -> Self {
        self.downmix = downmix;
        self
    }

    pub fn split_at_events(mut self, split: bool) -> Self {
        self.split_at_events = split;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn max_voices(mut self, voices: usize) -> Self {
        self.max_voices = voices;
        self
    }

    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if self.min_frames == 0 || self.max_frames < self.min_frames {
            return Err(ConfigError::BlockSize {
                min: self.min_frames,
                max: self.max_frames,
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("event_capacity"));
        }
        if self.max_voices == 0 {
            return Err(ConfigError::ZeroCapacity("max_voices"));
        }

        let strings = [
            ("host_name", &self.host_name),
            ("host_vendor", &self.host_vendor),
            ("host_url", &self.host_url),
            ("host_version", &self.host_version),
        ];
        for (field, value) in strings {
            if value.contains('\0') {
                return Err(ConfigError::NulInHostString(field));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HostConfig::default();
        assert_eq!(config.min_frames, 1);
        assert_eq!(config.max_frames, 8192);
        assert_eq!(config.downmix, Downmix::Left);
        assert!(config.split_at_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = HostConfig::new().block_size(0, 64);
        assert_eq!(
            config.validate(),
            Err(ConfigError::BlockSize { min: 0, max: 64 })
        );

        let config = HostConfig::new().block_size(128, 64);
        assert!(config.validate().is_err());

        let config = HostConfig::new().sample_rate(0.0);
        assert_eq!(config.validate(), Err(ConfigError::SampleRate(0.0)));

        let config = HostConfig::new().event_capacity(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCapacity("event_capacity"))
        );

        let config = HostConfig::new().host_name("bad\0name");
        assert_eq!(
            config.validate(),
            Err(ConfigError::NulInHostString("host_name"))
        );
    }

    #[test]
    fn test_config_serde_fills_defaults() {
        let json = r#"{"sample_rate":48000.0,"downmix":"Sum"}"#;
        let config: HostConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.downmix, Downmix::Sum);
        assert_eq!(config.max_frames, 8192, "missing fields use defaults");
        assert_eq!(config.host_name, "Clave");
    }

    // ── Downmix ──

    #[test]
    fn test_downmix_policies() {
        let channels = vec![vec![1.0, 0.5], vec![0.5, -0.5]];
        let mut out = [0.0f32; 2];

        Downmix::Left.fold(&channels, 2, &mut out);
        assert_eq!(out, [1.0, 0.5]);

        Downmix::Sum.fold(&channels, 2, &mut out);
        assert_eq!(out, [1.5, 0.0]);

        Downmix::Average.fold(&channels, 2, &mut out);
        assert_eq!(out, [0.75, 0.0]);
    }

    #[test]
    fn test_downmix_without_channels_is_silence() {
        let mut out = [1.0f32; 4];
        Downmix::Sum.fold(&[], 3, &mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0], "only the requested frames are written");
    }
}
