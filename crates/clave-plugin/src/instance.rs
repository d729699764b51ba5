//! One live CLAP plugin object.
//!
//! [`PluginInstance`] wraps the raw `clap_plugin` pointer, tracks where it is
//! on the lifecycle ladder and caches the extension tables probed at load.
//! Dropping it walks the ladder back down and destroys the plugin.

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;

use clap_sys::ext::audio_ports::{
    clap_audio_port_info, clap_plugin_audio_ports, CLAP_AUDIO_PORT_IS_MAIN, CLAP_EXT_AUDIO_PORTS,
};
use clap_sys::ext::note_ports::{clap_plugin_note_ports, CLAP_EXT_NOTE_PORTS};
use clap_sys::ext::params::{clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS};
use clap_sys::ext::preset_load::{
    clap_plugin_preset_load, CLAP_EXT_PRESET_LOAD, CLAP_EXT_PRESET_LOAD_COMPAT,
};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::plugin::clap_plugin;
use clap_sys::process::{
    clap_process, clap_process_status, CLAP_PROCESS_CONTINUE, CLAP_PROCESS_CONTINUE_IF_NOT_QUIET,
    CLAP_PROCESS_ERROR, CLAP_PROCESS_SLEEP, CLAP_PROCESS_TAIL,
};
use tracing::{debug, warn};

use crate::error::{LoadError, LoadStage, PresetError, StateError};
use crate::ffi;
use crate::host::ClapHost;
use crate::library::ClapLibrary;
use crate::lifecycle::LifecycleState;
use crate::params::{ParameterFlags, ParameterInfo};
use crate::state::{InputStream, OutputStream};

/// Status reported by `clap_plugin.process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Error,
    Continue,
    ContinueIfNotQuiet,
    Tail,
    Sleep,
}

impl ProcessStatus {
    fn from_raw(status: clap_process_status) -> Self {
        match status {
            CLAP_PROCESS_CONTINUE => ProcessStatus::Continue,
            CLAP_PROCESS_CONTINUE_IF_NOT_QUIET => ProcessStatus::ContinueIfNotQuiet,
            CLAP_PROCESS_TAIL => ProcessStatus::Tail,
            CLAP_PROCESS_SLEEP => ProcessStatus::Sleep,
            CLAP_PROCESS_ERROR => ProcessStatus::Error,
            // Unknown codes are treated as failures.
            _ => ProcessStatus::Error,
        }
    }
}

struct Extensions {
    params: *const clap_plugin_params,
    audio_ports: *const clap_plugin_audio_ports,
    note_ports: *const clap_plugin_note_ports,
    state: *const clap_plugin_state,
    preset_load: *const clap_plugin_preset_load,
}

impl Extensions {
    fn none() -> Self {
        Self {
            params: ptr::null(),
            audio_ports: ptr::null(),
            note_ports: ptr::null(),
            state: ptr::null(),
            preset_load: ptr::null(),
        }
    }
}

pub(crate) struct PluginInstance {
    plugin: *const clap_plugin,
    state: LifecycleState,
    path: PathBuf,
    ext: Extensions,
}

// Safety: CLAP plugins are driven from one thread at a time; `PluginHost`
// takes `&mut self` for every call that reaches the plugin.
unsafe impl Send for PluginInstance {}

impl PluginInstance {
    /// Create and `init` the plugin with `plugin_id`.
    pub(crate) fn create(
        library: &ClapLibrary,
        host: &ClapHost,
        plugin_id: &str,
    ) -> Result<Self, LoadError> {
        let path = library.path();
        let id = CString::new(plugin_id).map_err(|_| {
            LoadError::failed(path, LoadStage::Instantiation, "plugin id contains a NUL byte")
        })?;

        let plugin = unsafe { library.create_plugin(host.as_raw(), &id) };
        if plugin.is_null() {
            return Err(LoadError::failed(
                path,
                LoadStage::Instantiation,
                format!("factory could not create {plugin_id}"),
            ));
        }

        // Owned from here on; an early return destroys it.
        let mut instance = Self {
            plugin,
            state: LifecycleState::Unloaded,
            path: path.to_path_buf(),
            ext: Extensions::none(),
        };

        let init = instance.raw().init.ok_or_else(|| {
            LoadError::failed(path, LoadStage::Initialization, "plugin has no init function")
        })?;
        if !unsafe { init(plugin) } {
            return Err(LoadError::failed(
                path,
                LoadStage::Initialization,
                "init returned false",
            ));
        }

        instance.state = LifecycleState::Loaded;
        debug!(plugin = plugin_id, "plugin instance created");
        Ok(instance)
    }

    fn raw(&self) -> &clap_plugin {
        unsafe { &*self.plugin }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn extension<T>(&self, id: &CStr) -> *const T {
        match self.raw().get_extension {
            Some(get_extension) => unsafe { get_extension(self.plugin, id.as_ptr()) as *const T },
            None => ptr::null(),
        }
    }

    /// Probe the optional extensions this host uses.
    pub(crate) fn discover_extensions(&mut self) {
        let mut preset_load = self.extension::<clap_plugin_preset_load>(CLAP_EXT_PRESET_LOAD);
        if preset_load.is_null() {
            preset_load = self.extension(CLAP_EXT_PRESET_LOAD_COMPAT);
        }

        self.ext = Extensions {
            params: self.extension(CLAP_EXT_PARAMS),
            audio_ports: self.extension(CLAP_EXT_AUDIO_PORTS),
            note_ports: self.extension(CLAP_EXT_NOTE_PORTS),
            state: self.extension(CLAP_EXT_STATE),
            preset_load,
        };

        debug!(
            params = !self.ext.params.is_null(),
            audio_ports = !self.ext.audio_ports.is_null(),
            note_ports = !self.ext.note_ports.is_null(),
            state = !self.ext.state.is_null(),
            preset_load = !self.ext.preset_load.is_null(),
            "probed plugin extensions"
        );
    }

    pub(crate) fn mark_initialized(&mut self) {
        debug_assert!(self.state.can_transition_to(LifecycleState::Initialized));
        self.state = LifecycleState::Initialized;
    }

    // ── Lifecycle ──

    pub(crate) fn activate(
        &mut self,
        sample_rate: f64,
        min_frames: u32,
        max_frames: u32,
    ) -> Result<(), LoadError> {
        if self.state != LifecycleState::Initialized {
            return Err(LoadError::failed(
                &self.path,
                LoadStage::Activation,
                format!("cannot activate a plugin that is {}", self.state),
            ));
        }
        let activate = self.raw().activate.ok_or_else(|| {
            LoadError::failed(&self.path, LoadStage::Activation, "no activate function")
        })?;
        if !unsafe { activate(self.plugin, sample_rate, min_frames, max_frames) } {
            return Err(LoadError::failed(
                &self.path,
                LoadStage::Activation,
                "activate returned false",
            ));
        }
        self.state = LifecycleState::Activated;
        Ok(())
    }

    pub(crate) fn start_processing(&mut self) -> Result<(), LoadError> {
        if self.state != LifecycleState::Activated {
            return Err(LoadError::failed(
                &self.path,
                LoadStage::Processing,
                format!("cannot start processing a plugin that is {}", self.state),
            ));
        }
        let start = self.raw().start_processing.ok_or_else(|| {
            LoadError::failed(&self.path, LoadStage::Processing, "no start_processing function")
        })?;
        if !unsafe { start(self.plugin) } {
            return Err(LoadError::failed(
                &self.path,
                LoadStage::Processing,
                "start_processing returned false",
            ));
        }
        self.state = LifecycleState::Processing;
        Ok(())
    }

    pub(crate) fn stop_processing(&mut self) {
        if self.state != LifecycleState::Processing {
            return;
        }
        if let Some(stop) = self.raw().stop_processing {
            unsafe { stop(self.plugin) };
        }
        self.state = LifecycleState::Activated;
    }

    pub(crate) fn deactivate(&mut self) {
        self.stop_processing();
        if self.state != LifecycleState::Activated {
            return;
        }
        if let Some(deactivate) = self.raw().deactivate {
            unsafe { deactivate(self.plugin) };
        }
        self.state = LifecycleState::Initialized;
    }

    pub(crate) fn process(&mut self, process: &clap_process) -> ProcessStatus {
        if self.state != LifecycleState::Processing {
            return ProcessStatus::Error;
        }
        match self.raw().process {
            Some(process_fn) => ProcessStatus::from_raw(unsafe { process_fn(self.plugin, process) }),
            None => ProcessStatus::Error,
        }
    }

    pub(crate) fn on_main_thread(&self) {
        if let Some(callback) = self.raw().on_main_thread {
            unsafe { callback(self.plugin) };
        }
    }

    // ── Parameters ──

    pub(crate) fn parameter_count(&self) -> u32 {
        if self.ext.params.is_null() {
            return 0;
        }
        let params = unsafe { &*self.ext.params };
        match params.count {
            Some(count) => unsafe { count(self.plugin) },
            None => 0,
        }
    }

    pub(crate) fn parameter_info(&self, index: u32) -> Option<ParameterInfo> {
        if self.ext.params.is_null() {
            return None;
        }
        let params = unsafe { &*self.ext.params };
        let get_info = params.get_info?;

        let mut info: clap_param_info = unsafe { std::mem::zeroed() };
        if !unsafe { get_info(self.plugin, index, &mut info) } {
            return None;
        }

        Some(ParameterInfo {
            id: info.id,
            name: ffi::fixed_string(&info.name),
            module: ffi::fixed_string(&info.module),
            min_value: info.min_value,
            max_value: info.max_value,
            default_value: info.default_value,
            flags: ParameterFlags::from_clap(info.flags),
        })
    }

    pub(crate) fn parameter_infos(&self) -> Vec<ParameterInfo> {
        let count = self.parameter_count();
        let mut infos = Vec::with_capacity(count as usize);
        for index in 0..count {
            match self.parameter_info(index) {
                Some(info) => infos.push(info),
                None => warn!(index, "plugin refused parameter info, skipping"),
            }
        }
        infos
    }

    pub(crate) fn parameter_value(&self, id: u32) -> Option<f64> {
        if self.ext.params.is_null() {
            return None;
        }
        let params = unsafe { &*self.ext.params };
        let get_value = params.get_value?;
        let mut value = 0.0;
        if unsafe { get_value(self.plugin, id, &mut value) } {
            Some(value)
        } else {
            None
        }
    }

    // ── Ports ──

    /// Channel count of the main audio port, `None` without the extension.
    pub(crate) fn main_port_channels(&self, is_input: bool) -> Option<usize> {
        if self.ext.audio_ports.is_null() {
            return None;
        }
        let ports = unsafe { &*self.ext.audio_ports };
        let (count, get) = (ports.count?, ports.get?);

        let port_count = unsafe { count(self.plugin, is_input) };
        let mut first = None;
        for index in 0..port_count {
            let mut info: clap_audio_port_info = unsafe { std::mem::zeroed() };
            if !unsafe { get(self.plugin, index, is_input, &mut info) } {
                continue;
            }
            if info.flags & CLAP_AUDIO_PORT_IS_MAIN != 0 {
                return Some(info.channel_count as usize);
            }
            first.get_or_insert(info.channel_count as usize);
        }
        Some(first.unwrap_or(0))
    }

    pub(crate) fn note_input_count(&self) -> u32 {
        if self.ext.note_ports.is_null() {
            return 0;
        }
        let ports = unsafe { &*self.ext.note_ports };
        match ports.count {
            Some(count) => unsafe { count(self.plugin, true) },
            None => 0,
        }
    }

    // ── State ──

    pub(crate) fn save_state(&self) -> Result<Vec<u8>, StateError> {
        if self.ext.state.is_null() {
            return Err(StateError::Unsupported);
        }
        let state = unsafe { &*self.ext.state };
        let save = state.save.ok_or(StateError::Unsupported)?;

        let mut stream = OutputStream::new();
        if !unsafe { save(self.plugin, stream.as_raw()) } {
            return Err(StateError::SaveFailed("plugin returned false".into()));
        }
        Ok(stream.into_bytes())
    }

    pub(crate) fn load_state(&self, data: &[u8]) -> Result<(), StateError> {
        if self.ext.state.is_null() {
            return Err(StateError::Unsupported);
        }
        let state = unsafe { &*self.ext.state };
        let load = state.load.ok_or(StateError::Unsupported)?;

        let mut stream = InputStream::new(data);
        if !unsafe { load(self.plugin, stream.as_raw()) } {
            return Err(StateError::RestoreFailed("plugin returned false".into()));
        }
        Ok(())
    }

    // ── Presets ──

    pub(crate) fn has_preset_load(&self) -> bool {
        !self.ext.preset_load.is_null()
    }

    /// Returns whether the plugin accepted the preset.
    pub(crate) fn load_preset(
        &self,
        kind: u32,
        location: Option<&str>,
        load_key: Option<&str>,
    ) -> Result<bool, PresetError> {
        if self.ext.preset_load.is_null() {
            return Err(PresetError::Unavailable);
        }
        let preset_load = unsafe { &*self.ext.preset_load };
        let from_location = preset_load.from_location.ok_or(PresetError::Unavailable)?;

        let to_c = |value: Option<&str>| value.and_then(|v| CString::new(v).ok());
        let location = to_c(location);
        let load_key = to_c(load_key);
        let as_ptr = |value: &Option<CString>| value.as_ref().map_or(ptr::null(), |v| v.as_ptr());

        Ok(unsafe { from_location(self.plugin, kind, as_ptr(&location), as_ptr(&load_key)) })
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.deactivate();
        if let Some(destroy) = self.raw().destroy {
            unsafe { destroy(self.plugin) };
        }
        self.state = LifecycleState::Unloaded;
        debug!(path = %self.path.display(), "plugin instance destroyed");
    }
}
