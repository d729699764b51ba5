//! The host-facing plugin wrapper.
//!
//! [`PluginHost`] owns at most one load session: the opened binary, the
//! `clap_host` handed to the plugin, the running instance and everything
//! derived from it at load time (metadata, parameter buffers, preset catalog,
//! render bridge). Dropping the session tears it down in reverse order.

use std::path::Path;
use std::sync::Arc;

use clap_sys::entry::clap_plugin_entry;
use clave_midi::{velocity_to_unit, MessageKind, MidiEvent};
use tracing::{debug, info, warn};

use crate::bridge::{copy_through, AudioBridge, PortLayout};
use crate::config::HostConfig;
use crate::error::{ConfigError, LoadError, LoadStage, MidiError, ParameterError, PresetError, StateError};
use crate::host::ClapHost;
use crate::instance::PluginInstance;
use crate::library::ClapLibrary;
use crate::lifecycle::LifecycleState;
use crate::metadata::{AudioIO, PluginMetadata};
use crate::params::{ParameterHandle, ParameterInfo, ParameterSync};
use crate::presets::{PresetCatalog, PresetInfo};
use crate::state::ParameterSnapshot;
use crate::voices::NoteEndEvents;

/// What happened to a MIDI message handed to [`PluginHost::send_midi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiDisposition {
    /// Queued for the next render as a native note event.
    Forwarded,
    /// Accepted but not translated (control and program changes).
    NotForwarded,
}

/// Everything tied to one loaded plugin. Fields drop in declaration order.
struct Session {
    bridge: AudioBridge,
    presets: PresetCatalog,
    params: Arc<ParameterSync>,
    metadata: PluginMetadata,
    instance: PluginInstance,
    host: ClapHost,
    library: ClapLibrary,
}

impl Session {
    fn start(
        library: ClapLibrary,
        config: &HostConfig,
        note_ends: &NoteEndEvents,
    ) -> Result<Self, LoadError> {
        let path = library.path().to_path_buf();
        let host = ClapHost::new(config)
            .map_err(|err| LoadError::failed(&path, LoadStage::Instantiation, err.to_string()))?;

        let mut metadata = library
            .descriptor(0)
            .ok_or_else(|| LoadError::NoPlugins { path: path.clone() })?;
        let plugin_count = library.plugin_count();
        if plugin_count > 1 {
            debug!(plugins = plugin_count, id = %metadata.id, "binary exposes several plugins, using the first");
        }

        let mut instance = PluginInstance::create(&library, &host, &metadata.id)?;
        instance.discover_extensions();

        let infos = instance.parameter_infos();
        let values = infos
            .iter()
            .map(|info| instance.parameter_value(info.id).unwrap_or(info.default_value))
            .collect();
        let params = Arc::new(ParameterSync::new(infos, values));

        let layout = PortLayout::resolve(
            instance.main_port_channels(true),
            instance.main_port_channels(false),
            metadata.is_instrument,
        );
        metadata.audio_io = AudioIO {
            inputs: layout.inputs,
            outputs: layout.outputs,
        };
        metadata.receives_midi = metadata.is_instrument || instance.note_input_count() > 0;

        let presets = discover_presets(&library, &metadata.id, config);
        if !presets.is_empty() && !instance.has_preset_load() {
            warn!(presets = presets.len(), "plugin lists presets but cannot load them");
        }

        instance.mark_initialized();
        instance.activate(config.sample_rate, config.min_frames, config.max_frames)?;
        instance.start_processing()?;

        let bridge = AudioBridge::new(
            config,
            layout,
            metadata.is_instrument,
            params.len(),
            note_ends.clone(),
        );

        Ok(Self {
            bridge,
            presets,
            params,
            metadata,
            instance,
            host,
            library,
        })
    }

    /// Pull current values from the plugin into the parameter buffers.
    fn refresh_parameters(&self) {
        for info in self.params.infos() {
            if let Some(value) = self.instance.parameter_value(info.id) {
                self.params.publish_from_plugin(info.id, value);
            }
        }
    }
}

fn discover_presets(library: &ClapLibrary, plugin_id: &str, config: &HostConfig) -> PresetCatalog {
    match PresetCatalog::discover(library, plugin_id, config) {
        Ok(catalog) => catalog,
        Err(err) => {
            debug!(error = %err, "preset discovery disabled");
            PresetCatalog::default()
        }
    }
}

/// Hosts one CLAP plugin at a time.
///
/// Load/close and the other `&mut self` calls belong to the control thread;
/// [`render`](Self::render) belongs to the audio thread. A
/// [`ParameterHandle`] from [`parameter_handle`](Self::parameter_handle) may
/// be used from any thread while rendering.
///
/// ```ignore
/// let mut host = PluginHost::new();
/// host.load("/usr/lib/clap/Gain.clap")?;
/// host.set_parameter_by_name("Gain", 0.5)?;
/// host.render(&input, &mut output);
/// ```
pub struct PluginHost {
    config: HostConfig,
    params: ParameterHandle,
    note_ends: NoteEndEvents,
    bypassed: bool,
    session: Option<Session>,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginHost {
    pub fn new() -> Self {
        Self::build(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: HostConfig) -> Self {
        let note_ends = NoteEndEvents::new(config.max_voices.max(1) * 2);
        Self {
            config,
            params: ParameterHandle::new(),
            note_ends,
            bypassed: false,
            session: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ── Lifecycle ──

    /// Load the plugin binary at `path`, closing any loaded plugin first.
    ///
    /// On success the plugin is Processing; on error nothing stays loaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        self.close();
        let library = ClapLibrary::open(path)?;
        self.start(library)
    }

    /// Like [`load`](Self::load) for an entry linked into this executable.
    pub fn load_static(
        &mut self,
        entry: &'static clap_plugin_entry,
        path: impl AsRef<Path>,
    ) -> Result<(), LoadError> {
        self.close();
        let library = ClapLibrary::from_static(entry, path)?;
        self.start(library)
    }

    fn start(&mut self, library: ClapLibrary) -> Result<(), LoadError> {
        let session = match Session::start(library, &self.config, &self.note_ends) {
            Ok(session) => session,
            Err(err) => {
                warn!(stage = %err.stage(), error = %err, "plugin load failed");
                return Err(err);
            }
        };

        self.params.attach(Arc::clone(&session.params));
        info!(
            plugin = %session.metadata.name,
            id = %session.metadata.id,
            path = %session.library.path().display(),
            parameters = session.params.len(),
            presets = session.presets.len(),
            instrument = session.metadata.is_instrument,
            "plugin loaded"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Tear down the loaded plugin. Does nothing when unloaded.
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.params.detach();
        let name = session.metadata.name.clone();
        drop(session);
        // Ends from the old session no longer match any voice.
        while self.note_ends.pop().is_some() {}
        info!(plugin = %name, "plugin closed");
    }

    pub fn state(&self) -> LifecycleState {
        self.session
            .as_ref()
            .map_or(LifecycleState::Unloaded, |s| s.instance.state())
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn metadata(&self) -> Option<&PluginMetadata> {
        self.session.as_ref().map(|s| &s.metadata)
    }

    pub fn is_instrument(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.metadata.is_instrument)
    }

    /// Service requests the plugin made through the host since the last call.
    ///
    /// Call periodically from the control thread.
    pub fn on_main_thread(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let requests = session.host.requests();
        if requests.take_callback() {
            session.instance.on_main_thread();
        }
        if requests.take_rescan_params() {
            session.refresh_parameters();
        }
        // Parameter flushes ride along with the next render.
        requests.take_flush_params();
        requests.take_process();

        if session.host.requests().take_restart() {
            self.restart();
        }
    }

    /// Deactivate and reactivate with the current configuration.
    fn restart(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        debug!(plugin = %session.metadata.name, "plugin requested restart");
        session.instance.deactivate();
        session.bridge.reset();
        let config = &self.config;
        let restarted = session
            .instance
            .activate(config.sample_rate, config.min_frames, config.max_frames)
            .and_then(|()| session.instance.start_processing());
        if let Err(err) = restarted {
            warn!(error = %err, "plugin restart failed, closing");
            self.close();
        }
    }

    // ── Rendering ──

    /// Render `min(input.len(), output.len())` mono frames; any remaining
    /// output is zeroed.
    ///
    /// Passes input through when nothing is loaded or the host is bypassed.
    /// Notes sent while bypassed are dropped at the end of the call.
    pub fn render(&mut self, input: &[f32], output: &mut [f32]) {
        match self.session.as_mut() {
            Some(session) if !self.bypassed => {
                let Session {
                    bridge,
                    instance,
                    params,
                    ..
                } = session;
                bridge.render(instance, params, input, output);
            }
            Some(session) => session.bridge.pass_through(input, output),
            None => copy_through(input, output),
        }
    }

    /// Single-sample convenience over [`render`](Self::render).
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let mut output = [0.0];
        self.render(&[input], &mut output);
        output[0]
    }

    pub fn set_bypass(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    // ── Parameters ──

    pub fn parameter_handle(&self) -> ParameterHandle {
        self.params.clone()
    }

    pub fn parameter_count(&self) -> usize {
        self.params.count()
    }

    pub fn parameter_info(&self, index: usize) -> Result<ParameterInfo, ParameterError> {
        self.params.info(index)
    }

    pub fn parameter_name(&self, index: usize) -> Result<String, ParameterError> {
        self.params.info(index).map(|info| info.name)
    }

    /// Queue `value` for the next render. Returns the value after clamping.
    pub fn set_parameter(&self, index: usize, value: f64) -> Result<f64, ParameterError> {
        self.params.set(index, value)
    }

    pub fn get_parameter(&self, index: usize) -> Result<f64, ParameterError> {
        self.params.get(index)
    }

    pub fn set_parameter_by_name(&self, name: &str, value: f64) -> Result<f64, ParameterError> {
        self.params.set_by_name(name, value)
    }

    pub fn get_parameter_by_name(&self, name: &str) -> Result<f64, ParameterError> {
        self.params.get_by_name(name)
    }

    /// Re-read every value from the plugin.
    pub fn refresh_parameters(&self) -> Result<(), ParameterError> {
        let session = self.session.as_ref().ok_or(ParameterError::NotLoaded)?;
        session.refresh_parameters();
        Ok(())
    }

    // ── MIDI ──

    fn instrument(&mut self) -> Result<&mut Session, MidiError> {
        let session = self.session.as_mut().ok_or(MidiError::NotLoaded)?;
        if !session.metadata.is_instrument {
            return Err(MidiError::NotInstrument);
        }
        if !session.instance.state().is_processing() {
            return Err(MidiError::NotLoaded);
        }
        Ok(session)
    }

    /// Parse and queue a raw channel-voice message.
    pub fn send_midi(&mut self, bytes: &[u8]) -> Result<MidiDisposition, MidiError> {
        let event = MidiEvent::from_bytes(bytes)?;
        self.send_midi_event(&event)
    }

    pub fn send_midi_event(&mut self, event: &MidiEvent) -> Result<MidiDisposition, MidiError> {
        let session = self.instrument()?;
        let channel = event.channel_num() as i16;
        let time = u32::try_from(event.frame_offset).unwrap_or(u32::MAX);
        let unsupported = || MidiError::Unsupported {
            status: event.to_bytes().first().copied().unwrap_or(0),
        };

        let queued = match event.kind() {
            MessageKind::NoteOn => {
                let key = event.note().ok_or_else(unsupported)? as i16;
                let velocity = velocity_to_unit(event.velocity().unwrap_or(0));
                session.bridge.note_on(channel, key, velocity, time)
            }
            MessageKind::NoteOff => {
                let key = event.note().ok_or_else(unsupported)? as i16;
                let velocity = velocity_to_unit(event.velocity().unwrap_or(0));
                session.bridge.note_off(channel, key, velocity, time)
            }
            MessageKind::ControlChange | MessageKind::ProgramChange => {
                debug!(kind = ?event.kind(), channel, "MIDI message not forwarded");
                return Ok(MidiDisposition::NotForwarded);
            }
            MessageKind::PitchBend | MessageKind::Other => return Err(unsupported()),
        };

        if queued {
            Ok(MidiDisposition::Forwarded)
        } else {
            Err(MidiError::QueueFull)
        }
    }

    /// Note-on on channel 0. Velocity 0 is a note-off.
    pub fn note_on(&mut self, key: u8, velocity: u8) -> Result<(), MidiError> {
        if velocity == 0 {
            return self.note_off(key);
        }
        let session = self.instrument()?;
        if session
            .bridge
            .note_on(0, key as i16, velocity_to_unit(velocity), 0)
        {
            Ok(())
        } else {
            Err(MidiError::QueueFull)
        }
    }

    pub fn note_off(&mut self, key: u8) -> Result<(), MidiError> {
        let session = self.instrument()?;
        if session.bridge.note_off(0, key as i16, 0.0, 0) {
            Ok(())
        } else {
            Err(MidiError::QueueFull)
        }
    }

    /// Silence `key` immediately, skipping any release.
    pub fn choke(&mut self, key: u8) -> Result<(), MidiError> {
        let session = self.instrument()?;
        if session.bridge.choke(0, key as i16, 0) {
            Ok(())
        } else {
            Err(MidiError::QueueFull)
        }
    }

    /// End-of-note notifications; the queue outlives reloads.
    pub fn note_ends(&self) -> NoteEndEvents {
        self.note_ends.clone()
    }

    /// Voices still sounding or awaiting their end notification.
    pub fn voice_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.bridge.voice_count())
    }

    /// Voices whose key is still down.
    pub fn held_voice_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.bridge.held_voice_count())
    }

    // ── Presets ──

    pub fn preset_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.presets.len())
    }

    pub fn preset_name(&self, index: usize) -> Option<&str> {
        self.session
            .as_ref()?
            .presets
            .get(index)
            .map(|preset| preset.name.as_str())
    }

    pub fn presets(&self) -> Option<&PresetCatalog> {
        self.session.as_ref().map(|s| &s.presets)
    }

    pub fn load_preset(&mut self, index: usize) -> Result<(), PresetError> {
        let session = self.session.as_ref().ok_or(PresetError::NotLoaded)?;
        let preset = session
            .presets
            .get(index)
            .ok_or(PresetError::IndexOutOfRange {
                index,
                count: session.presets.len(),
            })?
            .clone();
        self.apply_preset(&preset)
    }

    /// Load the first preset called `name`.
    pub fn load_preset_by_name(&mut self, name: &str) -> Result<(), PresetError> {
        let session = self.session.as_ref().ok_or(PresetError::NotLoaded)?;
        let (_, preset) = session
            .presets
            .find(name)
            .ok_or_else(|| PresetError::NotFound(name.to_string()))?;
        let preset = preset.clone();
        self.apply_preset(&preset)
    }

    fn apply_preset(&mut self, preset: &PresetInfo) -> Result<(), PresetError> {
        let session = self.session.as_ref().ok_or(PresetError::NotLoaded)?;
        let accepted = session.instance.load_preset(
            preset.kind.to_raw(),
            preset.location.as_deref(),
            preset.load_key.as_deref(),
        )?;
        if !accepted {
            return Err(PresetError::Rejected {
                name: preset.name.clone(),
            });
        }
        debug!(preset = %preset.name, "preset loaded");
        session.refresh_parameters();
        Ok(())
    }

    /// Run preset discovery again. Returns the new preset count.
    pub fn rescan_presets(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        session.presets = discover_presets(&session.library, &session.metadata.id, &self.config);
        session.presets.len()
    }

    // ── State ──

    /// Serialize every parameter value, including plugin-side changes.
    pub fn save_parameters(&self) -> Result<Vec<u8>, StateError> {
        let session = self.session.as_ref().ok_or(StateError::NotLoaded)?;
        ParameterSnapshot::capture(&session.params).to_bytes()
    }

    /// Queue every value from `data`; nothing changes if it does not match.
    pub fn load_parameters(&self, data: &[u8]) -> Result<(), StateError> {
        let session = self.session.as_ref().ok_or(StateError::NotLoaded)?;
        ParameterSnapshot::from_bytes(data)?.apply(&session.params)
    }

    /// The plugin's own state blob.
    pub fn save_plugin_state(&self) -> Result<Vec<u8>, StateError> {
        let session = self.session.as_ref().ok_or(StateError::NotLoaded)?;
        session.instance.save_state()
    }

    pub fn load_plugin_state(&self, data: &[u8]) -> Result<(), StateError> {
        let session = self.session.as_ref().ok_or(StateError::NotLoaded)?;
        session.instance.load_state(data)?;
        session.refresh_parameters();
        Ok(())
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("state", &self.state())
            .field("plugin", &self.metadata().map(|m| m.id.as_str()))
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::LocationKind;
    use crate::testing;

    fn loaded(opts: &str) -> PluginHost {
        testing::reset();
        let mut host = PluginHost::new();
        host.load_static(testing::entry(), opts).unwrap();
        host
    }

    fn render(host: &mut PluginHost, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        host.render(input, &mut output);
        output
    }

    // ── Lifecycle ──

    #[test]
    fn test_load_effect() {
        let host = loaded("fake:effect");
        assert_eq!(host.state(), LifecycleState::Processing);
        assert!(!host.is_instrument());

        let metadata = host.metadata().unwrap();
        assert_eq!(metadata.id, testing::EFFECT_ID);
        assert_eq!(metadata.name, "Fake Gain");
        assert_eq!(metadata.audio_io, AudioIO::stereo());
        assert!(!metadata.receives_midi);
        assert_eq!(testing::stats().starts, 1);
    }

    #[test]
    fn test_load_picks_first_descriptor() {
        let host = loaded("fake:multi");
        assert_eq!(host.metadata().unwrap().id, testing::EFFECT_ID);
    }

    #[test]
    fn test_activation_failure_unwinds() {
        testing::reset();
        let mut host = PluginHost::new();
        let err = host
            .load_static(testing::entry(), "fake:effect;fail=activate")
            .unwrap_err();

        assert_eq!(err.stage(), LoadStage::Activation);
        assert_eq!(host.state(), LifecycleState::Unloaded);
        assert!(!host.parameter_handle().is_attached());
        let stats = testing::stats();
        assert_eq!(stats.destroyed, 1, "instance destroyed");
        assert_eq!(stats.entry_deinits, 1, "entry deinitialized");
    }

    #[test]
    fn test_start_failure_unwinds() {
        testing::reset();
        let mut host = PluginHost::new();
        let err = host
            .load_static(testing::entry(), "fake:effect;fail=start")
            .unwrap_err();

        assert_eq!(err.stage(), LoadStage::Processing);
        assert_eq!(host.state(), LifecycleState::Unloaded);
        let stats = testing::stats();
        assert_eq!(stats.activations, 1);
        assert_eq!(stats.deactivations, 1, "activation rolled back");
    }

    #[test]
    fn test_reload_closes_previous() {
        let mut host = loaded("fake:effect");
        host.load_static(testing::entry(), "fake:synth").unwrap();

        assert_eq!(host.state(), LifecycleState::Processing);
        assert!(host.is_instrument());
        let stats = testing::stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.entry_deinits, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut host = loaded("fake:effect");
        host.close();
        host.close();

        assert_eq!(host.state(), LifecycleState::Unloaded);
        assert!(host.metadata().is_none());
        let stats = testing::stats();
        assert_eq!(stats.stops, 1);
        assert_eq!(stats.deactivations, 1);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.entry_deinits, 1);
    }

    #[test]
    fn test_invalid_config() {
        let err = PluginHost::with_config(HostConfig::default().block_size(0, 0)).unwrap_err();
        assert!(matches!(err, ConfigError::BlockSize { .. }), "got {err:?}");
    }

    #[test]
    fn test_missing_binary() {
        let mut host = PluginHost::new();
        let err = host.load("/nonexistent/Missing.clap").unwrap_err();
        assert_eq!(err.stage(), LoadStage::Opening);
        assert_eq!(host.state(), LifecycleState::Unloaded);
    }

    // ── Rendering ──

    #[test]
    fn test_unloaded_and_bypassed_pass_through() {
        let mut host = PluginHost::new();
        assert_eq!(render(&mut host, &[0.1, 0.2]), vec![0.1, 0.2]);

        let mut host = loaded("fake:effect");
        assert_eq!(render(&mut host, &[1.0]), vec![0.5]);
        host.set_bypass(true);
        assert!(host.is_bypassed());
        assert_eq!(render(&mut host, &[1.0]), vec![1.0], "bypass passes input");
    }

    #[test]
    fn test_notes_sent_while_bypassed_are_dropped() {
        let mut host = loaded("fake:synth");
        let ends = host.note_ends();
        host.set_bypass(true);

        for i in 0..2000 {
            host.note_on(60, 100).unwrap_or_else(|err| panic!("note_on {i}: {err}"));
            host.note_off(60).unwrap_or_else(|err| panic!("note_off {i}: {err}"));
            assert_eq!(render(&mut host, &[0.25; 8]), vec![0.25; 8]);
        }
        assert_eq!(host.voice_count(), 0, "released voices retired while bypassed");
        ends.drain();

        host.set_bypass(false);
        render(&mut host, &[0.0; 64]);
        assert!(ends.is_empty(), "no backlog delivered after bypass");
        assert_eq!(testing::stats().events_received, 0, "plugin never saw the notes");
    }

    #[test]
    fn test_short_input_zeroes_output_tail() {
        let mut host = PluginHost::new();
        let mut output = [9.0; 4];
        host.render(&[0.1, 0.2], &mut output);
        assert_eq!(output, [0.1, 0.2, 0.0, 0.0]);

        let mut host = loaded("fake:effect");
        let mut output = [9.0; 4];
        host.render(&[1.0, 1.0], &mut output);
        assert_eq!(output, [0.5, 0.5, 0.0, 0.0]);

        host.set_bypass(true);
        let mut output = [9.0; 3];
        host.render(&[1.0], &mut output);
        assert_eq!(output, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_huge_frame_offset_lands_on_last_frame() {
        let mut host = loaded("fake:synth");
        let offset = u32::MAX as usize + 2;
        let event = MidiEvent::note_on_builder(60, 100).offset(offset).build();
        assert_eq!(host.send_midi_event(&event).unwrap(), MidiDisposition::Forwarded);

        let out = render(&mut host, &[0.0; 8]);
        assert_eq!(out[6], 0.0, "note not yet sounding");
        assert!(out[7] > 0.0, "note starts on the last frame");
    }

    #[test]
    fn test_process_sample() {
        let mut host = loaded("fake:effect");
        assert_eq!(host.process_sample(0.5), 0.25);
    }

    // ── Parameters ──

    #[test]
    fn test_parameter_round_trip_across_threads() {
        let mut host = loaded("fake:effect");
        let handle = host.parameter_handle();

        std::thread::spawn(move || handle.set(0, 0.8).unwrap())
            .join()
            .unwrap();
        render(&mut host, &[0.0; 4]);
        assert_eq!(host.get_parameter(0).unwrap(), 0.8);
        assert_eq!(host.process_sample(1.0), 0.8, "plugin applied the new volume");
    }

    #[test]
    fn test_parameter_out_of_range() {
        let host = loaded("fake:effect");
        let err = host.set_parameter(5, 1.0).unwrap_err();
        assert_eq!(err, ParameterError::IndexOutOfRange { index: 5, count: 2 });
        assert_eq!(host.get_parameter(0).unwrap(), 0.5, "nothing changed");
        assert_eq!(
            host.set_parameter_by_name("Resonance", 1.0).unwrap_err(),
            ParameterError::UnknownName("Resonance".into())
        );
    }

    #[test]
    fn test_parameter_names() {
        let host = loaded("fake:effect");
        assert_eq!(host.parameter_count(), 2);
        assert_eq!(host.parameter_name(1).unwrap(), "Cutoff");
        assert_eq!(host.set_parameter_by_name("Cutoff", 50000.0).unwrap(), 20000.0);
        assert_eq!(host.get_parameter_by_name("Cutoff").unwrap(), 20000.0);
    }

    #[test]
    fn test_handle_detaches_on_close() {
        let mut host = loaded("fake:effect");
        let handle = host.parameter_handle();
        host.close();
        assert_eq!(handle.get(0).unwrap_err(), ParameterError::NotLoaded);

        host.load_static(testing::entry(), "fake:effect").unwrap();
        assert_eq!(handle.get(0).unwrap(), 0.5, "same handle sees the new plugin");
    }

    // ── MIDI ──

    #[test]
    fn test_midi_requires_instrument() {
        let mut host = loaded("fake:effect");
        assert_eq!(host.note_on(60, 100).unwrap_err().to_string(), "Plugin is not an instrument");

        let mut host = PluginHost::new();
        assert!(matches!(host.note_on(60, 100), Err(MidiError::NotLoaded)));
    }

    #[test]
    fn test_note_lifecycle() {
        let mut host = loaded("fake:synth");
        let ends = host.note_ends();

        host.note_on(60, 100).unwrap();
        for _ in 0..3 {
            render(&mut host, &[0.0; 16]);
        }
        assert_eq!(host.held_voice_count(), 1, "voice held across renders");
        assert!(render(&mut host, &[0.0; 4])[0] > 0.0);

        host.note_off(60).unwrap();
        render(&mut host, &[0.0; 16]);
        assert_eq!(host.voice_count(), 0);
        assert_eq!(ends.len(), 1, "exactly one end-of-note notification");
        assert_eq!(ends.pop().unwrap().key, 60);
    }

    #[test]
    fn test_send_midi_dispositions() {
        let mut host = loaded("fake:synth");
        assert_eq!(host.send_midi(&[0x90, 64, 90]).unwrap(), MidiDisposition::Forwarded);
        assert_eq!(host.send_midi(&[0xB0, 7, 100]).unwrap(), MidiDisposition::NotForwarded);
        assert_eq!(host.send_midi(&[0xC0, 3]).unwrap(), MidiDisposition::NotForwarded);
        assert!(matches!(
            host.send_midi(&[0xE0, 0, 64]),
            Err(MidiError::Unsupported { status: 0xE0 })
        ));
        assert!(matches!(host.send_midi(&[]), Err(MidiError::Parse(_))));

        render(&mut host, &[0.0; 8]);
        assert_eq!(host.held_voice_count(), 1);

        // Note-on with velocity 0 releases.
        host.send_midi(&[0x90, 64, 0]).unwrap();
        render(&mut host, &[0.0; 8]);
        assert_eq!(host.voice_count(), 0);
    }

    #[test]
    fn test_choke() {
        let mut host = loaded("fake:synth");
        host.note_on(48, 80).unwrap();
        render(&mut host, &[0.0; 8]);
        host.choke(48).unwrap();
        render(&mut host, &[0.0; 8]);
        assert_eq!(host.voice_count(), 0);
        assert_eq!(render(&mut host, &[0.0; 2]), vec![0.0, 0.0], "choked voice is silent");
    }

    // ── Presets ──

    #[test]
    fn test_load_preset_updates_parameters() {
        let mut host = loaded("fake:synth;presets=3");
        assert_eq!(host.preset_count(), 3);
        assert_eq!(host.preset_name(2), Some("Preset 2"));

        host.load_preset_by_name("Preset 2").unwrap();
        let stats = testing::stats();
        let loaded = &stats.loaded_presets[0];
        assert_eq!(loaded.kind, LocationKind::Plugin.to_raw());
        assert_eq!(loaded.load_key.as_deref(), Some("k2"));
        assert!((host.get_parameter(0).unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(host.state(), LifecycleState::Processing);
    }

    #[test]
    fn test_preset_errors() {
        let mut host = loaded("fake:synth;presets=1");
        assert_eq!(
            host.load_preset(4).unwrap_err(),
            PresetError::IndexOutOfRange { index: 4, count: 1 }
        );
        assert_eq!(
            host.load_preset_by_name("Missing").unwrap_err(),
            PresetError::NotFound("Missing".into())
        );

        let mut host = loaded("fake:synth;providers=0");
        assert_eq!(host.preset_count(), 0);
        assert!(host.load_preset(0).is_err());
        assert_eq!(host.state(), LifecycleState::Processing, "lifecycle untouched");
    }

    #[test]
    fn test_rescan_presets() {
        let mut host = loaded("fake:synth;presets=2");
        assert_eq!(host.rescan_presets(), 2);
        assert_eq!(testing::stats().providers_destroyed, 2);
    }

    #[test]
    fn test_main_thread_callback() {
        let mut host = loaded("fake:synth;presets=1");
        host.load_preset(0).unwrap();
        host.on_main_thread();
        host.on_main_thread();
        assert_eq!(testing::stats().main_thread_calls, 1, "one request, one callback");
    }

    // ── State ──

    #[test]
    fn test_parameter_state_survives_reload() {
        let mut host = loaded("fake:effect");
        host.set_parameter(0, 0.9).unwrap();
        let saved = host.save_parameters().unwrap();

        host.load_static(testing::entry(), "fake:effect").unwrap();
        host.load_parameters(&saved).unwrap();
        assert_eq!(host.get_parameter(0).unwrap(), 0.9);
        assert_eq!(host.process_sample(1.0), 0.9);
    }

    #[test]
    fn test_plugin_state_round_trip() {
        let mut host = loaded("fake:effect");
        host.set_parameter(0, 0.25).unwrap();
        render(&mut host, &[0.0]);
        let blob = host.save_plugin_state().unwrap();
        assert_eq!(blob.len(), 16);

        host.load_static(testing::entry(), "fake:effect").unwrap();
        host.load_plugin_state(&blob).unwrap();
        assert_eq!(host.get_parameter(0).unwrap(), 0.25);
    }

    #[test]
    fn test_state_without_extension() {
        let host = loaded("fake:effect;no_state");
        assert!(matches!(host.save_plugin_state(), Err(StateError::Unsupported)));

        let host = PluginHost::new();
        assert!(matches!(host.save_parameters(), Err(StateError::NotLoaded)));
    }
}
