//! An in-process fake CLAP plugin.
//!
//! [`entry`] is a real `clap_plugin_entry` whose behavior is selected by the
//! path handed to `init`, e.g. `fake:synth;presets=3;fail=activate`:
//!
//! | key            | effect                                                  |
//! |----------------|---------------------------------------------------------|
//! | `effect`       | one stereo gain effect                                  |
//! | `synth`        | one instrument with a note port                         |
//! | `multi`        | effect then synth                                       |
//! | `none`         | factory with no plugins                                 |
//! | `fail=STAGE`   | `entry`, `factory`, `create`, `init`, `activate`, `start` |
//! | `error=process`| every `process` call returns an error                   |
//! | `presets=N`    | N presets in a plugin-internal location                 |
//! | `providers=N`  | preset providers offered (default 1, max 2)             |
//! | `bad_provider` | the first provider fails `init`                         |
//! | `dir=PATH`     | a file location crawled for `.clvp` presets             |
//! | `foreign=1`    | odd-numbered presets target another plugin              |
//! | `dup=1`        | a duplicate of `Preset 0` is appended                   |
//! | `automate=1`   | `process` reports Cutoff changes                        |
//! | `no_state`     | no state extension                                      |
//!
//! Counters are kept per thread; call [`reset`] at the start of each test.

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

use clap_sys::audio_buffer::clap_audio_buffer;
use clap_sys::entry::clap_plugin_entry;
use clap_sys::events::{
    clap_event_header, clap_event_note, clap_event_param_value, clap_input_events,
    clap_output_events, CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_NOTE_CHOKE, CLAP_EVENT_NOTE_END,
    CLAP_EVENT_NOTE_OFF, CLAP_EVENT_NOTE_ON, CLAP_EVENT_PARAM_VALUE,
};
use clap_sys::ext::audio_ports::{
    clap_audio_port_info, clap_plugin_audio_ports, CLAP_AUDIO_PORT_IS_MAIN, CLAP_EXT_AUDIO_PORTS,
};
use clap_sys::ext::log::{clap_host_log, CLAP_EXT_LOG, CLAP_LOG_INFO};
use clap_sys::ext::note_ports::{
    clap_note_port_info, clap_plugin_note_ports, CLAP_EXT_NOTE_PORTS, CLAP_NOTE_DIALECT_CLAP,
};
use clap_sys::ext::params::{
    clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS, CLAP_PARAM_IS_AUTOMATABLE,
};
use clap_sys::ext::preset_load::{clap_plugin_preset_load, CLAP_EXT_PRESET_LOAD};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::factory::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
use clap_sys::factory::preset_discovery::{
    clap_preset_discovery_factory, clap_preset_discovery_filetype, clap_preset_discovery_indexer,
    clap_preset_discovery_location, clap_preset_discovery_metadata_receiver,
    clap_preset_discovery_provider, clap_preset_discovery_provider_descriptor,
    CLAP_PRESET_DISCOVERY_IS_FACTORY_CONTENT,
    CLAP_PRESET_DISCOVERY_LOCATION_FILE, CLAP_PRESET_DISCOVERY_LOCATION_PLUGIN,
};
use clap_sys::host::clap_host;
use clap_sys::id::CLAP_INVALID_ID;
use clap_sys::plugin::{clap_plugin, clap_plugin_descriptor};
use clap_sys::plugin_features::{
    CLAP_PLUGIN_FEATURE_AUDIO_EFFECT, CLAP_PLUGIN_FEATURE_INSTRUMENT, CLAP_PLUGIN_FEATURE_STEREO,
    CLAP_PLUGIN_FEATURE_SYNTHESIZER,
};
use clap_sys::process::{clap_process, clap_process_status, CLAP_PROCESS_CONTINUE, CLAP_PROCESS_ERROR};
use clap_sys::stream::{clap_istream, clap_ostream};
use clap_sys::universal_plugin_id::clap_universal_plugin_id;
use clap_sys::version::{clap_version, CLAP_VERSION};

use crate::presets::is_discovery_factory;

pub const EFFECT_ID: &str = "org.clave.fake.effect";
pub const SYNTH_ID: &str = "org.clave.fake.synth";
pub const PROVIDER_ID: &str = "org.clave.fake.presets";
pub const VOLUME_ID: u32 = 10;
pub const CUTOFF_ID: u32 = 20;
/// Value reported for Cutoff when `automate=1`.
pub const AUTOMATED_CUTOFF: f64 = 1234.0;

/// A preset-load call the fake plugin received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPreset {
    pub kind: u32,
    pub location: Option<String>,
    pub load_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeStats {
    pub entry_inits: u32,
    pub entry_deinits: u32,
    pub created: u32,
    pub destroyed: u32,
    pub activations: u32,
    pub deactivations: u32,
    pub starts: u32,
    pub stops: u32,
    pub last_sample_rate: f64,
    /// `frames_count` of every `process` call.
    pub block_sizes: Vec<u32>,
    pub events_received: u32,
    pub providers_destroyed: u32,
    pub main_thread_calls: u32,
    pub loaded_presets: Vec<LoadedPreset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Kind {
    #[default]
    Effect,
    Synth,
    Multi,
    Empty,
}

#[derive(Debug, Clone)]
struct FakeConfig {
    kind: Kind,
    fail: Option<String>,
    process_error: bool,
    presets: u32,
    providers: u32,
    bad_provider: bool,
    dir: Option<String>,
    foreign: bool,
    dup: bool,
    automate: bool,
    no_state: bool,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            kind: Kind::Effect,
            fail: None,
            process_error: false,
            presets: 0,
            providers: 1,
            bad_provider: false,
            dir: None,
            foreign: false,
            dup: false,
            automate: false,
            no_state: false,
        }
    }
}

impl FakeConfig {
    fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("fake:")?;
        let mut parts = rest.split(';');
        let mut config = FakeConfig {
            kind: match parts.next()? {
                "effect" => Kind::Effect,
                "synth" => Kind::Synth,
                "multi" => Kind::Multi,
                "none" => Kind::Empty,
                _ => return None,
            },
            ..Default::default()
        };
        for part in parts {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key {
                "fail" => config.fail = Some(value.to_string()),
                "error" => config.process_error = value == "process",
                "presets" => config.presets = value.parse().unwrap_or(0),
                "providers" => config.providers = value.parse::<u32>().unwrap_or(1).min(2),
                "bad_provider" => config.bad_provider = true,
                "dir" => config.dir = Some(value.to_string()),
                "foreign" => config.foreign = value == "1",
                "dup" => config.dup = value == "1",
                "automate" => config.automate = value == "1",
                "no_state" => config.no_state = true,
                _ => {}
            }
        }
        Some(config)
    }

    fn fails(&self, stage: &str) -> bool {
        self.fail.as_deref() == Some(stage)
    }

    fn descriptors(&self) -> &'static [&'static Descriptor] {
        match self.kind {
            Kind::Effect => &EFFECT_ONLY,
            Kind::Synth => &SYNTH_ONLY,
            Kind::Multi => &MULTI,
            Kind::Empty => &[],
        }
    }

    /// Plugin the bundled presets are declared for.
    fn primary_id(&self) -> &'static str {
        match self.kind {
            Kind::Synth => SYNTH_ID,
            _ => EFFECT_ID,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<FakeConfig> = RefCell::new(FakeConfig::default());
    static STATS: RefCell<FakeStats> = RefCell::new(FakeStats::default());
}

/// Clear counters and configuration for this thread.
pub fn reset() {
    CONFIG.with(|c| *c.borrow_mut() = FakeConfig::default());
    STATS.with(|s| *s.borrow_mut() = FakeStats::default());
}

pub fn stats() -> FakeStats {
    STATS.with(|s| s.borrow().clone())
}

fn with_stats(f: impl FnOnce(&mut FakeStats)) {
    STATS.with(|s| f(&mut s.borrow_mut()));
}

fn config() -> FakeConfig {
    CONFIG.with(|c| c.borrow().clone())
}

pub fn entry() -> &'static clap_plugin_entry {
    &ENTRY
}

/// An entry declaring CLAP 0.0.0.
pub fn incompatible_entry() -> &'static clap_plugin_entry {
    &INCOMPATIBLE_ENTRY
}

// ── Entry and factory ──

static ENTRY: clap_plugin_entry = clap_plugin_entry {
    clap_version: CLAP_VERSION,
    init: Some(entry_init),
    deinit: Some(entry_deinit),
    get_factory: Some(entry_get_factory),
};

static INCOMPATIBLE_ENTRY: clap_plugin_entry = clap_plugin_entry {
    clap_version: clap_version {
        major: 0,
        minor: 0,
        revision: 0,
    },
    init: Some(entry_init),
    deinit: Some(entry_deinit),
    get_factory: Some(entry_get_factory),
};

unsafe extern "C" fn entry_init(path: *const c_char) -> bool {
    with_stats(|s| s.entry_inits += 1);
    if path.is_null() {
        return false;
    }
    let path = CStr::from_ptr(path).to_string_lossy();
    let Some(parsed) = FakeConfig::parse(&path) else {
        return false;
    };
    if parsed.fails("entry") {
        return false;
    }
    CONFIG.with(|c| *c.borrow_mut() = parsed);
    true
}

unsafe extern "C" fn entry_deinit() {
    with_stats(|s| s.entry_deinits += 1);
}

unsafe extern "C" fn entry_get_factory(factory_id: *const c_char) -> *const c_void {
    if factory_id.is_null() {
        return ptr::null();
    }
    let id = CStr::from_ptr(factory_id);
    if id == CLAP_PLUGIN_FACTORY_ID {
        if config().fails("factory") {
            return ptr::null();
        }
        &PLUGIN_FACTORY as *const clap_plugin_factory as *const c_void
    } else if is_discovery_factory(id) {
        &DISCOVERY_FACTORY as *const clap_preset_discovery_factory as *const c_void
    } else {
        ptr::null()
    }
}

struct Descriptor(clap_plugin_descriptor);
// Safety: only points at static C strings.
unsafe impl Sync for Descriptor {}

struct FeatureList([*const c_char; 4]);
unsafe impl Sync for FeatureList {}

static EFFECT_FEATURES: FeatureList = FeatureList([
    CLAP_PLUGIN_FEATURE_AUDIO_EFFECT.as_ptr(),
    CLAP_PLUGIN_FEATURE_STEREO.as_ptr(),
    ptr::null(),
    ptr::null(),
]);

static SYNTH_FEATURES: FeatureList = FeatureList([
    CLAP_PLUGIN_FEATURE_INSTRUMENT.as_ptr(),
    CLAP_PLUGIN_FEATURE_SYNTHESIZER.as_ptr(),
    CLAP_PLUGIN_FEATURE_STEREO.as_ptr(),
    ptr::null(),
]);

static EFFECT_DESCRIPTOR: Descriptor = Descriptor(clap_plugin_descriptor {
    clap_version: CLAP_VERSION,
    id: c"org.clave.fake.effect".as_ptr(),
    name: c"Fake Gain".as_ptr(),
    vendor: c"Clave".as_ptr(),
    url: c"".as_ptr(),
    manual_url: c"".as_ptr(),
    support_url: c"".as_ptr(),
    version: c"1.0.0".as_ptr(),
    description: c"Stereo gain".as_ptr(),
    features: EFFECT_FEATURES.0.as_ptr(),
});

static SYNTH_DESCRIPTOR: Descriptor = Descriptor(clap_plugin_descriptor {
    clap_version: CLAP_VERSION,
    id: c"org.clave.fake.synth".as_ptr(),
    name: c"Fake Synth".as_ptr(),
    vendor: c"Clave".as_ptr(),
    url: c"".as_ptr(),
    manual_url: c"".as_ptr(),
    support_url: c"".as_ptr(),
    version: c"1.0.0".as_ptr(),
    description: c"Constant-level voices".as_ptr(),
    features: SYNTH_FEATURES.0.as_ptr(),
});

static EFFECT_ONLY: [&Descriptor; 1] = [&EFFECT_DESCRIPTOR];
static SYNTH_ONLY: [&Descriptor; 1] = [&SYNTH_DESCRIPTOR];
static MULTI: [&Descriptor; 2] = [&EFFECT_DESCRIPTOR, &SYNTH_DESCRIPTOR];

static PLUGIN_FACTORY: clap_plugin_factory = clap_plugin_factory {
    get_plugin_count: Some(factory_count),
    get_plugin_descriptor: Some(factory_descriptor),
    create_plugin: Some(factory_create),
};

unsafe extern "C" fn factory_count(_factory: *const clap_plugin_factory) -> u32 {
    config().descriptors().len() as u32
}

unsafe extern "C" fn factory_descriptor(
    _factory: *const clap_plugin_factory,
    index: u32,
) -> *const clap_plugin_descriptor {
    match config().descriptors().get(index as usize) {
        Some(descriptor) => &descriptor.0,
        None => ptr::null(),
    }
}

unsafe extern "C" fn factory_create(
    _factory: *const clap_plugin_factory,
    host: *const clap_host,
    plugin_id: *const c_char,
) -> *const clap_plugin {
    let config = config();
    if config.fails("create") || plugin_id.is_null() {
        return ptr::null();
    }
    let id = CStr::from_ptr(plugin_id);
    let Some(descriptor) = config
        .descriptors()
        .iter()
        .find(|d| CStr::from_ptr(d.0.id) == id)
    else {
        return ptr::null();
    };
    let is_synth = ptr::eq(*descriptor, &SYNTH_DESCRIPTOR);

    let plugin = Box::into_raw(Box::new(FakePlugin {
        raw: clap_plugin {
            desc: &descriptor.0,
            plugin_data: ptr::null_mut(),
            init: Some(plugin_init),
            destroy: Some(plugin_destroy),
            activate: Some(plugin_activate),
            deactivate: Some(plugin_deactivate),
            start_processing: Some(plugin_start_processing),
            stop_processing: Some(plugin_stop_processing),
            reset: Some(plugin_reset),
            process: Some(plugin_process),
            get_extension: Some(plugin_get_extension),
            on_main_thread: Some(plugin_on_main_thread),
        },
        host,
        is_synth,
        config,
        volume: 0.5,
        cutoff: 1000.0,
        voices: Vec::new(),
    }));
    (*plugin).raw.plugin_data = plugin as *mut c_void;
    with_stats(|s| s.created += 1);
    &(*plugin).raw
}

// ── Plugin ──

struct FakePlugin {
    raw: clap_plugin,
    host: *const clap_host,
    is_synth: bool,
    config: FakeConfig,
    volume: f64,
    cutoff: f64,
    /// (note_id, channel, key)
    voices: Vec<(i32, i16, i16)>,
}

impl FakePlugin {
    fn set_param(&mut self, id: u32, value: f64) {
        match id {
            VOLUME_ID => self.volume = value,
            CUTOFF_ID => self.cutoff = value,
            _ => {}
        }
    }

    fn end_notes(&mut self, note: &clap_event_note, choke: bool) -> Vec<(i32, i16, i16)> {
        let matches = |&(id, channel, key): &(i32, i16, i16)| {
            if note.note_id >= 0 {
                id == note.note_id
            } else {
                channel == note.channel && key == note.key
            }
        };
        if choke {
            let (ended, kept) = self.voices.iter().partition(|v| matches(v));
            self.voices = kept;
            ended
        } else {
            match self.voices.iter().position(matches) {
                Some(index) => vec![self.voices.remove(index)],
                None => Vec::new(),
            }
        }
    }

    unsafe fn request_callback(&self) {
        if self.host.is_null() {
            return;
        }
        if let Some(request) = (*self.host).request_callback {
            request(self.host);
        }
    }
}

unsafe fn fake<'a>(plugin: *const clap_plugin) -> &'a mut FakePlugin {
    &mut *((*plugin).plugin_data as *mut FakePlugin)
}

unsafe extern "C" fn plugin_init(plugin: *const clap_plugin) -> bool {
    let fake = fake(plugin);
    if fake.config.fails("init") {
        return false;
    }
    if !fake.host.is_null() {
        if let Some(get_extension) = (*fake.host).get_extension {
            let log = get_extension(fake.host, CLAP_EXT_LOG.as_ptr()) as *const clap_host_log;
            if let Some(log_fn) = log.as_ref().and_then(|log| log.log) {
                log_fn(fake.host, CLAP_LOG_INFO, c"fake plugin initialized".as_ptr());
            }
        }
    }
    true
}

unsafe extern "C" fn plugin_destroy(plugin: *const clap_plugin) {
    let fake = (*plugin).plugin_data as *mut FakePlugin;
    drop(Box::from_raw(fake));
    with_stats(|s| s.destroyed += 1);
}

unsafe extern "C" fn plugin_activate(
    plugin: *const clap_plugin,
    sample_rate: f64,
    _min_frames: u32,
    _max_frames: u32,
) -> bool {
    if fake(plugin).config.fails("activate") {
        return false;
    }
    with_stats(|s| {
        s.activations += 1;
        s.last_sample_rate = sample_rate;
    });
    true
}

unsafe extern "C" fn plugin_deactivate(_plugin: *const clap_plugin) {
    with_stats(|s| s.deactivations += 1);
}

unsafe extern "C" fn plugin_start_processing(plugin: *const clap_plugin) -> bool {
    if fake(plugin).config.fails("start") {
        return false;
    }
    with_stats(|s| s.starts += 1);
    true
}

unsafe extern "C" fn plugin_stop_processing(_plugin: *const clap_plugin) {
    with_stats(|s| s.stops += 1);
}

unsafe extern "C" fn plugin_reset(plugin: *const clap_plugin) {
    fake(plugin).voices.clear();
}

unsafe extern "C" fn plugin_on_main_thread(_plugin: *const clap_plugin) {
    with_stats(|s| s.main_thread_calls += 1);
}

unsafe fn push_note_end(out: *const clap_output_events, time: u32, voice: (i32, i16, i16)) {
    let Some(try_push) = out.as_ref().and_then(|out| out.try_push) else {
        return;
    };
    let event = clap_event_note {
        header: clap_event_header {
            size: std::mem::size_of::<clap_event_note>() as u32,
            time,
            space_id: CLAP_CORE_EVENT_SPACE_ID,
            type_: CLAP_EVENT_NOTE_END,
            flags: 0,
        },
        note_id: voice.0,
        port_index: 0,
        channel: voice.1,
        key: voice.2,
        velocity: 0.0,
    };
    try_push(out, &event.header);
}

unsafe fn push_param(out: *const clap_output_events, param_id: u32, value: f64) {
    let Some(try_push) = out.as_ref().and_then(|out| out.try_push) else {
        return;
    };
    let event = clap_event_param_value {
        header: clap_event_header {
            size: std::mem::size_of::<clap_event_param_value>() as u32,
            time: 0,
            space_id: CLAP_CORE_EVENT_SPACE_ID,
            type_: CLAP_EVENT_PARAM_VALUE,
            flags: 0,
        },
        param_id,
        cookie: ptr::null_mut(),
        note_id: -1,
        port_index: -1,
        channel: -1,
        key: -1,
        value,
    };
    try_push(out, &event.header);
}

unsafe fn handle_events(fake: &mut FakePlugin, events: *const clap_input_events, out: *const clap_output_events) {
    let Some(list) = events.as_ref() else {
        return;
    };
    let (Some(size), Some(get)) = (list.size, list.get) else {
        return;
    };
    for index in 0..size(list) {
        let Some(header) = get(list, index).as_ref() else {
            continue;
        };
        with_stats(|s| s.events_received += 1);
        match header.type_ {
            CLAP_EVENT_NOTE_ON => {
                let note = &*(header as *const clap_event_header as *const clap_event_note);
                fake.voices.push((note.note_id, note.channel, note.key));
            }
            CLAP_EVENT_NOTE_OFF | CLAP_EVENT_NOTE_CHOKE => {
                let note = &*(header as *const clap_event_header as *const clap_event_note);
                let choke = header.type_ == CLAP_EVENT_NOTE_CHOKE;
                for voice in fake.end_notes(note, choke) {
                    push_note_end(out, header.time, voice);
                }
            }
            CLAP_EVENT_PARAM_VALUE => {
                let param =
                    &*(header as *const clap_event_header as *const clap_event_param_value);
                fake.set_param(param.param_id, param.value);
            }
            _ => {}
        }
    }
}

unsafe fn channel<'a>(buffer: &clap_audio_buffer, index: u32, frames: usize) -> Option<&'a mut [f32]> {
    if buffer.data32.is_null() || index >= buffer.channel_count {
        return None;
    }
    let data = *buffer.data32.add(index as usize);
    if data.is_null() {
        return None;
    }
    Some(std::slice::from_raw_parts_mut(data, frames))
}

unsafe extern "C" fn plugin_process(
    plugin: *const clap_plugin,
    process: *const clap_process,
) -> clap_process_status {
    let fake = fake(plugin);
    let process = &*process;
    let frames = process.frames_count as usize;
    with_stats(|s| s.block_sizes.push(process.frames_count));
    if fake.config.process_error {
        return CLAP_PROCESS_ERROR;
    }

    handle_events(fake, process.in_events, process.out_events);

    let Some(output) = process.audio_outputs.as_ref() else {
        return CLAP_PROCESS_CONTINUE;
    };
    let volume = fake.volume as f32;

    if fake.is_synth {
        let level = fake.voices.len() as f32 * volume * 0.1;
        for index in 0..output.channel_count {
            if let Some(out) = channel(output, index, frames) {
                out.fill(level);
            }
        }
    } else {
        let input = process
            .audio_inputs
            .as_ref()
            .filter(|_| process.audio_inputs_count > 0)
            .and_then(|input| channel(input, 0, frames));
        for index in 0..output.channel_count {
            let gain = if index == 1 { volume * 0.5 } else { volume };
            if let Some(out) = channel(output, index, frames) {
                match &input {
                    Some(input) => {
                        for (o, i) in out.iter_mut().zip(input.iter()) {
                            *o = *i * gain;
                        }
                    }
                    None => out.fill(0.0),
                }
            }
        }
    }

    if fake.config.automate {
        fake.cutoff = AUTOMATED_CUTOFF;
        push_param(process.out_events, CUTOFF_ID, AUTOMATED_CUTOFF);
    }
    CLAP_PROCESS_CONTINUE
}

unsafe extern "C" fn plugin_get_extension(
    plugin: *const clap_plugin,
    id: *const c_char,
) -> *const c_void {
    if id.is_null() {
        return ptr::null();
    }
    let fake = fake(plugin);
    let id = CStr::from_ptr(id);
    if id == CLAP_EXT_PARAMS {
        &PARAMS as *const clap_plugin_params as *const c_void
    } else if id == CLAP_EXT_AUDIO_PORTS {
        &AUDIO_PORTS as *const clap_plugin_audio_ports as *const c_void
    } else if id == CLAP_EXT_NOTE_PORTS && fake.is_synth {
        &NOTE_PORTS as *const clap_plugin_note_ports as *const c_void
    } else if id == CLAP_EXT_STATE && !fake.config.no_state {
        &STATE as *const clap_plugin_state as *const c_void
    } else if id == CLAP_EXT_PRESET_LOAD {
        &PRESET_LOAD as *const clap_plugin_preset_load as *const c_void
    } else {
        ptr::null()
    }
}

// ── Extensions ──

fn write_c_str(dst: &mut [c_char], value: &str) {
    let len = value.len().min(dst.len().saturating_sub(1));
    for (d, b) in dst.iter_mut().zip(value.bytes().take(len)) {
        *d = b as c_char;
    }
    if let Some(end) = dst.get_mut(len) {
        *end = 0;
    }
}

static PARAMS: clap_plugin_params = clap_plugin_params {
    count: Some(params_count),
    get_info: Some(params_get_info),
    get_value: Some(params_get_value),
    value_to_text: None,
    text_to_value: None,
    flush: Some(params_flush),
};

unsafe extern "C" fn params_count(_plugin: *const clap_plugin) -> u32 {
    2
}

unsafe extern "C" fn params_get_info(
    _plugin: *const clap_plugin,
    index: u32,
    info: *mut clap_param_info,
) -> bool {
    let Some(info) = info.as_mut() else {
        return false;
    };
    let (id, name, min, max, default) = match index {
        0 => (VOLUME_ID, "Volume", 0.0, 1.0, 0.5),
        1 => (CUTOFF_ID, "Cutoff", 20.0, 20000.0, 1000.0),
        _ => return false,
    };
    info.id = id;
    info.flags = CLAP_PARAM_IS_AUTOMATABLE;
    info.cookie = ptr::null_mut();
    write_c_str(&mut info.name, name);
    write_c_str(&mut info.module, "");
    info.min_value = min;
    info.max_value = max;
    info.default_value = default;
    true
}

unsafe extern "C" fn params_get_value(plugin: *const clap_plugin, id: u32, value: *mut f64) -> bool {
    let fake = fake(plugin);
    let current = match id {
        VOLUME_ID => fake.volume,
        CUTOFF_ID => fake.cutoff,
        _ => return false,
    };
    *value = current;
    true
}

unsafe extern "C" fn params_flush(
    plugin: *const clap_plugin,
    in_events: *const clap_input_events,
    out_events: *const clap_output_events,
) {
    handle_events(fake(plugin), in_events, out_events);
}

static AUDIO_PORTS: clap_plugin_audio_ports = clap_plugin_audio_ports {
    count: Some(audio_ports_count),
    get: Some(audio_ports_get),
};

unsafe extern "C" fn audio_ports_count(plugin: *const clap_plugin, is_input: bool) -> u32 {
    if is_input && fake(plugin).is_synth {
        0
    } else {
        1
    }
}

unsafe extern "C" fn audio_ports_get(
    plugin: *const clap_plugin,
    index: u32,
    is_input: bool,
    info: *mut clap_audio_port_info,
) -> bool {
    if index >= audio_ports_count(plugin, is_input) {
        return false;
    }
    let Some(info) = info.as_mut() else {
        return false;
    };
    info.id = 0;
    write_c_str(&mut info.name, "Main");
    info.flags = CLAP_AUDIO_PORT_IS_MAIN;
    info.channel_count = 2;
    info.port_type = ptr::null();
    info.in_place_pair = CLAP_INVALID_ID;
    true
}

static NOTE_PORTS: clap_plugin_note_ports = clap_plugin_note_ports {
    count: Some(note_ports_count),
    get: Some(note_ports_get),
};

unsafe extern "C" fn note_ports_count(_plugin: *const clap_plugin, is_input: bool) -> u32 {
    is_input as u32
}

unsafe extern "C" fn note_ports_get(
    _plugin: *const clap_plugin,
    index: u32,
    is_input: bool,
    info: *mut clap_note_port_info,
) -> bool {
    if !is_input || index > 0 {
        return false;
    }
    let Some(info) = info.as_mut() else {
        return false;
    };
    info.id = 0;
    info.supported_dialects = CLAP_NOTE_DIALECT_CLAP;
    info.preferred_dialect = CLAP_NOTE_DIALECT_CLAP;
    write_c_str(&mut info.name, "Notes");
    true
}

static STATE: clap_plugin_state = clap_plugin_state {
    save: Some(state_save),
    load: Some(state_load),
};

unsafe extern "C" fn state_save(plugin: *const clap_plugin, stream: *const clap_ostream) -> bool {
    let fake = fake(plugin);
    let Some(write) = stream.as_ref().and_then(|s| s.write) else {
        return false;
    };
    let mut bytes = fake.volume.to_le_bytes().to_vec();
    bytes.extend_from_slice(&fake.cutoff.to_le_bytes());
    write(stream, bytes.as_ptr() as *const c_void, bytes.len() as u64) == bytes.len() as i64
}

unsafe extern "C" fn state_load(plugin: *const clap_plugin, stream: *const clap_istream) -> bool {
    let fake = fake(plugin);
    let Some(read) = stream.as_ref().and_then(|s| s.read) else {
        return false;
    };
    let mut buf = [0u8; 16];
    let mut filled = 0;
    while filled < buf.len() {
        let n = read(
            stream,
            buf[filled..].as_mut_ptr() as *mut c_void,
            (buf.len() - filled) as u64,
        );
        if n <= 0 {
            break;
        }
        filled += n as usize;
    }
    if filled != buf.len() {
        return false;
    }
    let mut half = [0u8; 8];
    half.copy_from_slice(&buf[..8]);
    fake.volume = f64::from_le_bytes(half);
    half.copy_from_slice(&buf[8..]);
    fake.cutoff = f64::from_le_bytes(half);
    true
}

static PRESET_LOAD: clap_plugin_preset_load = clap_plugin_preset_load {
    from_location: Some(preset_from_location),
};

unsafe extern "C" fn preset_from_location(
    plugin: *const clap_plugin,
    location_kind: u32,
    location: *const c_char,
    load_key: *const c_char,
) -> bool {
    let fake = fake(plugin);
    let opt = |p: *const c_char| (!p.is_null()).then(|| CStr::from_ptr(p).to_string_lossy().into_owned());
    let loaded = LoadedPreset {
        kind: location_kind,
        location: opt(location),
        load_key: opt(load_key),
    };
    let key = loaded.load_key.clone();
    with_stats(|s| s.loaded_presets.push(loaded));

    if key.as_deref() == Some("reject") {
        return false;
    }
    // Preset `k{i}` sets the volume to (i + 1) / 10.
    if let Some(index) = key.as_deref().and_then(|k| k.strip_prefix('k')?.parse::<u32>().ok()) {
        fake.volume = ((index + 1) as f64 / 10.0).min(1.0);
    }
    fake.request_callback();
    true
}

// ── Preset discovery ──

struct ProviderDescriptor(clap_preset_discovery_provider_descriptor);
unsafe impl Sync for ProviderDescriptor {}

static PROVIDER_DESCRIPTORS: [ProviderDescriptor; 2] = [
    ProviderDescriptor(clap_preset_discovery_provider_descriptor {
        clap_version: CLAP_VERSION,
        id: c"org.clave.fake.presets".as_ptr(),
        name: c"Fake Presets".as_ptr(),
        vendor: c"Clave".as_ptr(),
    }),
    ProviderDescriptor(clap_preset_discovery_provider_descriptor {
        clap_version: CLAP_VERSION,
        id: c"org.clave.fake.presets.alt".as_ptr(),
        name: c"Fake Presets (alt)".as_ptr(),
        vendor: c"Clave".as_ptr(),
    }),
];

static DISCOVERY_FACTORY: clap_preset_discovery_factory = clap_preset_discovery_factory {
    count: Some(discovery_count),
    get_descriptor: Some(discovery_descriptor),
    create: Some(discovery_create),
};

unsafe extern "C" fn discovery_count(_factory: *const clap_preset_discovery_factory) -> u32 {
    config().providers
}

unsafe extern "C" fn discovery_descriptor(
    _factory: *const clap_preset_discovery_factory,
    index: u32,
) -> *const clap_preset_discovery_provider_descriptor {
    if index >= config().providers {
        return ptr::null();
    }
    match PROVIDER_DESCRIPTORS.get(index as usize) {
        Some(descriptor) => &descriptor.0,
        None => ptr::null(),
    }
}

struct FakeProvider {
    raw: clap_preset_discovery_provider,
    indexer: *const clap_preset_discovery_indexer,
    index: usize,
    config: FakeConfig,
}

unsafe extern "C" fn discovery_create(
    _factory: *const clap_preset_discovery_factory,
    indexer: *const clap_preset_discovery_indexer,
    provider_id: *const c_char,
) -> *const clap_preset_discovery_provider {
    if provider_id.is_null() {
        return ptr::null();
    }
    let id = CStr::from_ptr(provider_id);
    let Some(index) = PROVIDER_DESCRIPTORS
        .iter()
        .position(|d| CStr::from_ptr(d.0.id) == id)
    else {
        return ptr::null();
    };

    let provider = Box::into_raw(Box::new(FakeProvider {
        raw: clap_preset_discovery_provider {
            desc: &PROVIDER_DESCRIPTORS[index].0,
            provider_data: ptr::null_mut(),
            init: Some(provider_init),
            destroy: Some(provider_destroy),
            get_metadata: Some(provider_get_metadata),
            get_extension: Some(provider_get_extension),
        },
        indexer,
        index,
        config: config(),
    }));
    (*provider).raw.provider_data = provider as *mut c_void;
    &(*provider).raw
}

unsafe fn provider<'a>(provider: *const clap_preset_discovery_provider) -> &'a FakeProvider {
    &*((*provider).provider_data as *const FakeProvider)
}

unsafe extern "C" fn provider_init(raw: *const clap_preset_discovery_provider) -> bool {
    let provider = provider(raw);
    if provider.config.bad_provider && provider.index == 0 {
        return false;
    }
    let Some(indexer) = provider.indexer.as_ref() else {
        return false;
    };

    if let Some(declare_location) = indexer.declare_location {
        let location = clap_preset_discovery_location {
            flags: CLAP_PRESET_DISCOVERY_IS_FACTORY_CONTENT,
            name: c"Factory".as_ptr(),
            kind: CLAP_PRESET_DISCOVERY_LOCATION_PLUGIN,
            location: ptr::null(),
        };
        declare_location(indexer, &location);

        if let Some(dir) = provider.config.dir.as_deref() {
            if let (Some(declare_filetype), Ok(path)) = (indexer.declare_filetype, CString::new(dir)) {
                let filetype = clap_preset_discovery_filetype {
                    name: c"Clave preset".as_ptr(),
                    description: c"".as_ptr(),
                    file_extension: c".clvp".as_ptr(),
                };
                declare_filetype(indexer, &filetype);

                let location = clap_preset_discovery_location {
                    flags: 0,
                    name: c"User".as_ptr(),
                    kind: CLAP_PRESET_DISCOVERY_LOCATION_FILE,
                    location: path.as_ptr(),
                };
                declare_location(indexer, &location);
            }
        }
    }
    true
}

unsafe extern "C" fn provider_destroy(raw: *const clap_preset_discovery_provider) {
    drop(Box::from_raw((*raw).provider_data as *mut FakeProvider));
    with_stats(|s| s.providers_destroyed += 1);
}

unsafe extern "C" fn provider_get_metadata(
    raw: *const clap_preset_discovery_provider,
    location_kind: u32,
    location: *const c_char,
    receiver: *const clap_preset_discovery_metadata_receiver,
) -> bool {
    let provider = provider(raw);
    let Some(rx) = receiver.as_ref() else {
        return false;
    };
    let (Some(begin_preset), Some(add_plugin_id)) = (rx.begin_preset, rx.add_plugin_id) else {
        return false;
    };

    let own_id = CString::new(provider.config.primary_id()).unwrap_or_default();
    let declare_for = |id: &CStr| {
        let universal = clap_universal_plugin_id {
            abi: c"clap".as_ptr(),
            id: id.as_ptr(),
        };
        add_plugin_id(receiver, &universal);
    };

    match location_kind {
        CLAP_PRESET_DISCOVERY_LOCATION_PLUGIN => {
            for index in 0..provider.config.presets {
                let (Ok(name), Ok(key)) = (
                    CString::new(format!("Preset {index}")),
                    CString::new(format!("k{index}")),
                ) else {
                    continue;
                };
                if !begin_preset(receiver, name.as_ptr(), key.as_ptr()) {
                    return true;
                }
                if provider.config.foreign && index % 2 == 1 {
                    declare_for(c"com.example.other");
                } else {
                    declare_for(&own_id);
                }
                if let Some(set_flags) = rx.set_flags {
                    set_flags(receiver, CLAP_PRESET_DISCOVERY_IS_FACTORY_CONTENT);
                }
                if let Some(add_creator) = rx.add_creator {
                    add_creator(receiver, c"Clave".as_ptr());
                }
            }
            if provider.config.dup && provider.config.presets > 0 {
                begin_preset(receiver, c"Preset 0".as_ptr(), c"dup".as_ptr());
                declare_for(&own_id);
            }
            true
        }
        CLAP_PRESET_DISCOVERY_LOCATION_FILE => {
            if location.is_null() {
                return false;
            }
            let path = CStr::from_ptr(location).to_string_lossy();
            if path.contains("broken") {
                if let Some(on_error) = rx.on_error {
                    on_error(receiver, 5, c"unreadable preset".as_ptr());
                }
                return false;
            }
            // Named after the file.
            begin_preset(receiver, ptr::null(), ptr::null());
            declare_for(&own_id);
            if let Some(set_timestamps) = rx.set_timestamps {
                set_timestamps(receiver, 0, 0);
            }
            true
        }
        _ => false,
    }
}

unsafe extern "C" fn provider_get_extension(
    _provider: *const clap_preset_discovery_provider,
    _extension_id: *const c_char,
) -> *const c_void {
    ptr::null()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = FakeConfig::parse("fake:synth;presets=3;fail=init;dir=/tmp/x;dup=1").unwrap();
        assert_eq!(config.kind, Kind::Synth);
        assert_eq!(config.presets, 3);
        assert!(config.fails("init"));
        assert_eq!(config.dir.as_deref(), Some("/tmp/x"));
        assert!(config.dup);
        assert_eq!(config.providers, 1, "one provider unless asked");

        assert!(FakeConfig::parse("/usr/lib/clap/Real.clap").is_none());
        assert!(FakeConfig::parse("fake:other").is_none());
    }

    #[test]
    fn test_write_c_str_truncates() {
        let mut buf = [1 as c_char; 4];
        write_c_str(&mut buf, "Volume");
        assert_eq!(buf, [b'V' as c_char, b'o' as c_char, b'l' as c_char, 0]);
    }
}
