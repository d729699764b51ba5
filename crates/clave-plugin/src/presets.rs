//! Preset discovery.
//!
//! Discovery runs in two phases against the binary's preset-discovery
//! factory. While a provider initializes it declares locations and file
//! types through our indexer. Each location is then crawled with
//! `get_metadata`; the receiver callbacks are turned into
//! [`DiscoveryEvent`]s and folded into a flat [`PresetCatalog`].

use std::ffi::{c_char, c_void, CString};
use std::path::Path;
use std::ptr;

use clap_sys::factory::preset_discovery::{
    clap_preset_discovery_factory, clap_preset_discovery_filetype, clap_preset_discovery_indexer,
    clap_preset_discovery_location, clap_preset_discovery_metadata_receiver,
    clap_preset_discovery_provider, clap_preset_discovery_soundpack,
    CLAP_PRESET_DISCOVERY_FACTORY_ID, CLAP_PRESET_DISCOVERY_FACTORY_ID_COMPAT,
    CLAP_PRESET_DISCOVERY_LOCATION_FILE, CLAP_PRESET_DISCOVERY_LOCATION_PLUGIN,
};
use clap_sys::timestamp::clap_timestamp;
use clap_sys::universal_plugin_id::clap_universal_plugin_id;
use clap_sys::version::CLAP_VERSION;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::HostConfig;
use crate::error::DiscoveryError;
use crate::ffi;
use crate::library::ClapLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationKind {
    /// A file or directory on disk.
    File,
    /// Presets stored inside the plugin binary.
    Plugin,
}

impl LocationKind {
    fn from_raw(kind: u32) -> Option<Self> {
        match kind {
            CLAP_PRESET_DISCOVERY_LOCATION_FILE => Some(LocationKind::File),
            CLAP_PRESET_DISCOVERY_LOCATION_PLUGIN => Some(LocationKind::Plugin),
            _ => None,
        }
    }

    pub(crate) fn to_raw(self) -> u32 {
        match self {
            LocationKind::File => CLAP_PRESET_DISCOVERY_LOCATION_FILE,
            LocationKind::Plugin => CLAP_PRESET_DISCOVERY_LOCATION_PLUGIN,
        }
    }
}

/// A location a provider declared during `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryLocation {
    pub name: String,
    pub kind: LocationKind,
    /// Path for file locations, `None` for plugin-internal ones.
    pub location: Option<String>,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetFileType {
    pub name: String,
    pub description: String,
    /// Without the leading dot; empty matches every file.
    pub extension: String,
}

/// One discovered preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: String,
    pub kind: LocationKind,
    pub location: Option<String>,
    pub load_key: Option<String>,
}

/// Metadata-receiver callbacks, as seen by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    BeginPreset {
        name: Option<String>,
        load_key: Option<String>,
    },
    PluginId {
        abi: String,
        id: String,
    },
    /// Descriptive metadata the catalog does not keep.
    Described,
    Error {
        code: i32,
        message: String,
    },
}

struct Pending {
    preset: PresetInfo,
    declared_ids: bool,
    matched: bool,
}

/// Folds the event stream of one `get_metadata` call into presets.
pub(crate) struct PresetReducer<'a> {
    plugin_id: &'a str,
    kind: LocationKind,
    location: Option<String>,
    current: Option<Pending>,
    presets: Vec<PresetInfo>,
}

impl<'a> PresetReducer<'a> {
    pub(crate) fn new(plugin_id: &'a str, kind: LocationKind, location: Option<String>) -> Self {
        Self {
            plugin_id,
            kind,
            location,
            current: None,
            presets: Vec::new(),
        }
    }

    fn fallback_name(&self) -> String {
        self.location
            .as_deref()
            .and_then(|location| Path::new(location).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    }

    fn finish_current(&mut self) {
        if let Some(pending) = self.current.take() {
            if !pending.declared_ids || pending.matched {
                self.presets.push(pending.preset);
            } else {
                debug!(preset = %pending.preset.name, "preset targets another plugin, skipping");
            }
        }
    }

    pub(crate) fn apply(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::BeginPreset { name, load_key } => {
                self.finish_current();
                let name = name.unwrap_or_else(|| self.fallback_name());
                self.current = Some(Pending {
                    preset: PresetInfo {
                        name,
                        kind: self.kind,
                        location: self.location.clone(),
                        load_key,
                    },
                    declared_ids: false,
                    matched: false,
                });
            }
            DiscoveryEvent::PluginId { abi, id } => {
                if let Some(pending) = self.current.as_mut() {
                    pending.declared_ids = true;
                    if abi == "clap" && id == self.plugin_id {
                        pending.matched = true;
                    }
                }
            }
            DiscoveryEvent::Described => {}
            DiscoveryEvent::Error { code, message } => {
                debug!(
                    code,
                    location = ?self.location,
                    "preset provider reported an error: {message}"
                );
            }
        }
    }

    pub(crate) fn finish(mut self) -> Vec<PresetInfo> {
        self.finish_current();
        self.presets
    }
}

// ── Catalog ──

/// The presets found for one loaded plugin, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetCatalog {
    presets: Vec<PresetInfo>,
    locations: Vec<DiscoveryLocation>,
    filetypes: Vec<PresetFileType>,
    provider: Option<String>,
}

impl PresetCatalog {
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PresetInfo> {
        self.presets.get(index)
    }

    /// First preset named `name`.
    pub fn find(&self, name: &str) -> Option<(usize, &PresetInfo)> {
        self.presets
            .iter()
            .enumerate()
            .find(|(_, preset)| preset.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresetInfo> {
        self.presets.iter()
    }

    pub fn locations(&self) -> &[DiscoveryLocation] {
        &self.locations
    }

    pub fn filetypes(&self) -> &[PresetFileType] {
        &self.filetypes
    }

    /// Id of the provider that produced the catalog.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Run discovery against `library` for the plugin `plugin_id`.
    ///
    /// A binary without a preset-discovery factory yields an empty catalog.
    pub fn discover(
        library: &ClapLibrary,
        plugin_id: &str,
        config: &HostConfig,
    ) -> Result<Self, DiscoveryError> {
        let mut factory = library.get_factory(CLAP_PRESET_DISCOVERY_FACTORY_ID);
        if factory.is_null() {
            factory = library.get_factory(CLAP_PRESET_DISCOVERY_FACTORY_ID_COMPAT);
        }
        if factory.is_null() {
            debug!("no preset discovery factory");
            return Ok(Self::default());
        }
        let factory = factory as *const clap_preset_discovery_factory;
        unsafe { discover_with(factory, plugin_id, config) }
    }
}

unsafe fn discover_with(
    factory: *const clap_preset_discovery_factory,
    plugin_id: &str,
    config: &HostConfig,
) -> Result<PresetCatalog, DiscoveryError> {
    let table = &*factory;
    let count = table.count.ok_or(DiscoveryError::IncompleteFactory("count"))?;
    let get_descriptor = table
        .get_descriptor
        .ok_or(DiscoveryError::IncompleteFactory("get_descriptor"))?;
    let create = table.create.ok_or(DiscoveryError::IncompleteFactory("create"))?;

    let provider_count = count(factory);
    let mut indexer = Indexer::new(config);

    for index in 0..provider_count {
        let descriptor = get_descriptor(factory, index);
        if descriptor.is_null() || (*descriptor).id.is_null() {
            continue;
        }
        let provider_id = ffi::string((*descriptor).id);

        indexer.reset();
        let provider = create(factory, indexer.as_raw(), (*descriptor).id);
        if provider.is_null() {
            debug!(provider = %provider_id, "preset provider could not be created");
            continue;
        }
        let provider = ProviderGuard(provider);

        let initialized = match (*provider.0).init {
            Some(init) => init(provider.0),
            None => false,
        };
        if !initialized {
            debug!(provider = %provider_id, "preset provider init failed");
            continue;
        }

        let state = indexer.take_state();
        let presets = crawl(&provider, plugin_id, &state);
        info!(
            provider = %provider_id,
            locations = state.locations.len(),
            presets = presets.len(),
            "preset discovery finished"
        );
        return Ok(PresetCatalog {
            presets,
            locations: state.locations.into_vec(),
            filetypes: state.filetypes.into_vec(),
            provider: Some(provider_id),
        });
    }

    Err(DiscoveryError::NoProvider {
        tried: provider_count,
    })
}

struct ProviderGuard(*const clap_preset_discovery_provider);

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(destroy) = (*self.0).destroy {
                destroy(self.0);
            }
        }
    }
}

fn crawl(provider: &ProviderGuard, plugin_id: &str, state: &IndexerState) -> Vec<PresetInfo> {
    let extensions: SmallVec<[&str; 4]> = state
        .filetypes
        .iter()
        .map(|filetype| filetype.extension.as_str())
        .collect();

    let mut presets = Vec::new();
    for location in &state.locations {
        match (location.kind, location.location.as_deref()) {
            (LocationKind::Plugin, _) => {
                presets.extend(metadata_for(provider, plugin_id, LocationKind::Plugin, None));
            }
            (LocationKind::File, Some(path)) => {
                for file in preset_files(Path::new(path), &extensions) {
                    presets.extend(metadata_for(
                        provider,
                        plugin_id,
                        LocationKind::File,
                        Some(file),
                    ));
                }
            }
            (LocationKind::File, None) => {
                warn!(name = %location.name, "file location without a path, skipping");
            }
        }
    }
    presets
}

/// Files under `root` matching `extensions`, sorted. A file root is returned as is.
fn preset_files(root: &Path, extensions: &[&str]) -> Vec<String> {
    if !root.is_dir() {
        return vec![root.to_string_lossy().into_owned()];
    }

    let matches = |path: &Path| {
        extensions.is_empty()
            || extensions.iter().any(|ext| ext.is_empty())
            || path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
    };

    let mut files: Vec<String> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && matches(entry.path()))
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}

fn metadata_for(
    provider: &ProviderGuard,
    plugin_id: &str,
    kind: LocationKind,
    location: Option<String>,
) -> Vec<PresetInfo> {
    let c_location = match location.as_deref().map(CString::new) {
        Some(Ok(c)) => Some(c),
        Some(Err(_)) => return Vec::new(),
        None => None,
    };
    let location_ptr = c_location.as_ref().map_or(ptr::null(), |c| c.as_ptr());

    let Some(get_metadata) = (unsafe { (*provider.0).get_metadata }) else {
        return Vec::new();
    };

    let mut reducer = PresetReducer::new(plugin_id, kind, location);
    let receiver = clap_preset_discovery_metadata_receiver {
        receiver_data: &mut reducer as *mut PresetReducer<'_> as *mut c_void,
        on_error: Some(receiver_on_error),
        begin_preset: Some(receiver_begin_preset),
        add_plugin_id: Some(receiver_add_plugin_id),
        set_soundpack_id: Some(receiver_described_str),
        set_flags: Some(receiver_set_flags),
        add_creator: Some(receiver_described_str),
        set_description: Some(receiver_described_str),
        set_timestamps: Some(receiver_set_timestamps),
        add_feature: Some(receiver_described_str),
        add_extra_info: Some(receiver_add_extra_info),
    };

    let ok = unsafe { get_metadata(provider.0, kind.to_raw(), location_ptr, &receiver) };
    if !ok {
        debug!(location = ?reducer.location, "get_metadata returned false");
    }
    reducer.finish()
}

// ── Metadata receiver callbacks ──

unsafe fn reducer<'a>(
    receiver: *const clap_preset_discovery_metadata_receiver,
) -> Option<&'a mut PresetReducer<'a>> {
    if receiver.is_null() || (*receiver).receiver_data.is_null() {
        return None;
    }
    Some(&mut *((*receiver).receiver_data as *mut PresetReducer<'a>))
}

unsafe extern "C" fn receiver_on_error(
    receiver: *const clap_preset_discovery_metadata_receiver,
    os_error: i32,
    error_message: *const c_char,
) {
    if let Some(reducer) = reducer(receiver) {
        reducer.apply(DiscoveryEvent::Error {
            code: os_error,
            message: ffi::string(error_message),
        });
    }
}

unsafe extern "C" fn receiver_begin_preset(
    receiver: *const clap_preset_discovery_metadata_receiver,
    name: *const c_char,
    load_key: *const c_char,
) -> bool {
    match reducer(receiver) {
        Some(reducer) => {
            reducer.apply(DiscoveryEvent::BeginPreset {
                name: ffi::opt_string(name),
                load_key: ffi::opt_string(load_key),
            });
            true
        }
        None => false,
    }
}

unsafe extern "C" fn receiver_add_plugin_id(
    receiver: *const clap_preset_discovery_metadata_receiver,
    plugin_id: *const clap_universal_plugin_id,
) {
    if plugin_id.is_null() {
        return;
    }
    if let Some(reducer) = reducer(receiver) {
        reducer.apply(DiscoveryEvent::PluginId {
            abi: ffi::string((*plugin_id).abi),
            id: ffi::string((*plugin_id).id),
        });
    }
}

unsafe extern "C" fn receiver_described_str(
    receiver: *const clap_preset_discovery_metadata_receiver,
    _value: *const c_char,
) {
    if let Some(reducer) = reducer(receiver) {
        reducer.apply(DiscoveryEvent::Described);
    }
}

unsafe extern "C" fn receiver_set_flags(
    receiver: *const clap_preset_discovery_metadata_receiver,
    _flags: u32,
) {
    if let Some(reducer) = reducer(receiver) {
        reducer.apply(DiscoveryEvent::Described);
    }
}

unsafe extern "C" fn receiver_set_timestamps(
    receiver: *const clap_preset_discovery_metadata_receiver,
    _creation_time: clap_timestamp,
    _modification_time: clap_timestamp,
) {
    if let Some(reducer) = reducer(receiver) {
        reducer.apply(DiscoveryEvent::Described);
    }
}

unsafe extern "C" fn receiver_add_extra_info(
    receiver: *const clap_preset_discovery_metadata_receiver,
    _key: *const c_char,
    _value: *const c_char,
) {
    if let Some(reducer) = reducer(receiver) {
        reducer.apply(DiscoveryEvent::Described);
    }
}

// ── Indexer ──

#[derive(Default)]
struct IndexerState {
    locations: SmallVec<[DiscoveryLocation; 4]>,
    filetypes: SmallVec<[PresetFileType; 4]>,
}

/// The `clap_preset_discovery_indexer` handed to providers.
///
/// Boxed so `indexer_data` and the strings stay put while a provider holds
/// the pointer.
struct Indexer {
    raw: clap_preset_discovery_indexer,
    state: IndexerState,
    _strings: [CString; 4],
}

impl Indexer {
    fn new(config: &HostConfig) -> Box<Self> {
        let to_c = |value: &str| CString::new(value).unwrap_or_default();
        let strings = [
            to_c(&config.host_name),
            to_c(&config.host_vendor),
            to_c(&config.host_url),
            to_c(&config.host_version),
        ];

        let mut indexer = Box::new(Self {
            raw: clap_preset_discovery_indexer {
                clap_version: CLAP_VERSION,
                name: strings[0].as_ptr(),
                vendor: strings[1].as_ptr(),
                url: strings[2].as_ptr(),
                version: strings[3].as_ptr(),
                indexer_data: ptr::null_mut(),
                declare_filetype: Some(indexer_declare_filetype),
                declare_location: Some(indexer_declare_location),
                declare_soundpack: Some(indexer_declare_soundpack),
                get_extension: Some(indexer_get_extension),
            },
            state: IndexerState::default(),
            _strings: strings,
        });
        indexer.raw.indexer_data = &mut indexer.state as *mut IndexerState as *mut c_void;
        indexer
    }

    fn as_raw(&self) -> *const clap_preset_discovery_indexer {
        &self.raw
    }

    /// Forget declarations from a provider that failed to initialize.
    fn reset(&mut self) {
        self.state.locations.clear();
        self.state.filetypes.clear();
    }

    fn take_state(&mut self) -> IndexerState {
        std::mem::take(&mut self.state)
    }
}

unsafe fn indexer_state<'a>(
    indexer: *const clap_preset_discovery_indexer,
) -> Option<&'a mut IndexerState> {
    if indexer.is_null() || (*indexer).indexer_data.is_null() {
        return None;
    }
    Some(&mut *((*indexer).indexer_data as *mut IndexerState))
}

unsafe extern "C" fn indexer_declare_filetype(
    indexer: *const clap_preset_discovery_indexer,
    filetype: *const clap_preset_discovery_filetype,
) -> bool {
    let Some(state) = indexer_state(indexer) else {
        return false;
    };
    if filetype.is_null() {
        return false;
    }
    let filetype = &*filetype;
    let extension = ffi::string(filetype.file_extension);
    debug!(extension = %extension, "preset filetype declared");
    state.filetypes.push(PresetFileType {
        name: ffi::string(filetype.name),
        description: ffi::string(filetype.description),
        extension: extension.trim_start_matches('.').to_string(),
    });
    true
}

unsafe extern "C" fn indexer_declare_location(
    indexer: *const clap_preset_discovery_indexer,
    location: *const clap_preset_discovery_location,
) -> bool {
    let Some(state) = indexer_state(indexer) else {
        return false;
    };
    if location.is_null() {
        return false;
    }
    let location = &*location;
    let Some(kind) = LocationKind::from_raw(location.kind) else {
        warn!(kind = location.kind, "unknown preset location kind");
        return false;
    };
    let path = ffi::opt_string(location.location);
    if kind == LocationKind::File && path.is_none() {
        return false;
    }

    let declared = DiscoveryLocation {
        name: ffi::string(location.name),
        kind,
        location: if kind == LocationKind::Plugin { None } else { path },
        flags: location.flags,
    };
    debug!(name = %declared.name, kind = ?declared.kind, "preset location declared");
    state.locations.push(declared);
    true
}

unsafe extern "C" fn indexer_declare_soundpack(
    _indexer: *const clap_preset_discovery_indexer,
    _soundpack: *const clap_preset_discovery_soundpack,
) -> bool {
    // Soundpacks are not cataloged.
    true
}

unsafe extern "C" fn indexer_get_extension(
    _indexer: *const clap_preset_discovery_indexer,
    _extension_id: *const c_char,
) -> *const c_void {
    ptr::null()
}

/// `true` when `id` names a known preset-discovery factory.
#[cfg(any(test, feature = "testing"))]
pub(crate) fn is_discovery_factory(id: &std::ffi::CStr) -> bool {
    id == CLAP_PRESET_DISCOVERY_FACTORY_ID || id == CLAP_PRESET_DISCOVERY_FACTORY_ID_COMPAT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn begin(name: &str, key: &str) -> DiscoveryEvent {
        DiscoveryEvent::BeginPreset {
            name: Some(name.into()),
            load_key: Some(key.into()),
        }
    }

    fn plugin_id(id: &str) -> DiscoveryEvent {
        DiscoveryEvent::PluginId {
            abi: "clap".into(),
            id: id.into(),
        }
    }

    // ── Reducer ──

    #[test]
    fn test_reducer_keeps_order_and_duplicates() {
        let mut reducer = PresetReducer::new("com.example.synth", LocationKind::Plugin, None);
        reducer.apply(begin("Init", "a"));
        reducer.apply(DiscoveryEvent::Described);
        reducer.apply(begin("Pad", "b"));
        reducer.apply(begin("Init", "c"));

        let presets = reducer.finish();
        let names: Vec<&str> = presets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Init", "Pad", "Init"]);
        assert_eq!(presets[2].load_key.as_deref(), Some("c"));
        assert_eq!(presets[0].kind, LocationKind::Plugin);
    }

    #[test]
    fn test_reducer_filters_foreign_plugin_ids() {
        let mut reducer = PresetReducer::new("com.example.synth", LocationKind::Plugin, None);
        reducer.apply(begin("Mine", "1"));
        reducer.apply(plugin_id("com.example.synth"));
        reducer.apply(begin("Theirs", "2"));
        reducer.apply(plugin_id("com.example.other"));
        reducer.apply(begin("Shared", "3"));
        reducer.apply(plugin_id("com.example.other"));
        reducer.apply(plugin_id("com.example.synth"));

        let names: Vec<String> = reducer.finish().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Mine", "Shared"]);
    }

    #[test]
    fn test_reducer_name_falls_back_to_file_stem() {
        let mut reducer = PresetReducer::new(
            "com.example.synth",
            LocationKind::File,
            Some("/presets/Warm Pad.clvp".into()),
        );
        reducer.apply(DiscoveryEvent::BeginPreset {
            name: None,
            load_key: None,
        });
        reducer.apply(DiscoveryEvent::Error {
            code: 2,
            message: "ignored".into(),
        });

        let presets = reducer.finish();
        assert_eq!(presets[0].name, "Warm Pad");
        assert_eq!(presets[0].location.as_deref(), Some("/presets/Warm Pad.clvp"));
    }

    #[test]
    fn test_plugin_id_before_begin_is_ignored() {
        let mut reducer = PresetReducer::new("x", LocationKind::Plugin, None);
        reducer.apply(plugin_id("other"));
        reducer.apply(begin("Kept", "k"));
        assert_eq!(reducer.finish().len(), 1);
    }

    // ── Catalog lookup ──

    #[test]
    fn test_catalog_find_first_match() {
        let preset = |name: &str, key: &str| PresetInfo {
            name: name.into(),
            kind: LocationKind::Plugin,
            location: None,
            load_key: Some(key.into()),
        };
        let catalog = PresetCatalog {
            presets: vec![preset("A", "1"), preset("B", "2"), preset("A", "3")],
            ..Default::default()
        };

        let (index, found) = catalog.find("A").unwrap();
        assert_eq!(index, 0);
        assert_eq!(found.load_key.as_deref(), Some("1"));
        assert!(catalog.find("C").is_none());
        assert_eq!(catalog.iter().count(), 3);
    }

    // ── Crawling ──

    #[test]
    fn test_preset_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.clvp"), b"").unwrap();
        std::fs::write(dir.path().join("a.clvp"), b"").unwrap();
        std::fs::write(dir.path().join("sub/c.clvp"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = preset_files(dir.path(), &["clvp"]);
        let names: Vec<String> = files
            .iter()
            .map(|f| {
                Path::new(f)
                    .strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.clvp", "b.clvp", "sub/c.clvp"]);

        let all = preset_files(dir.path(), &[]);
        assert_eq!(all.len(), 4, "no declared filetypes matches every file");
    }

    #[test]
    fn test_discover_plugin_location() {
        testing::reset();
        let library = ClapLibrary::from_static(testing::entry(), "fake:synth;presets=3").unwrap();
        let catalog =
            PresetCatalog::discover(&library, testing::SYNTH_ID, &HostConfig::default()).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(0).unwrap().name, "Preset 0");
        assert_eq!(catalog.get(2).unwrap().load_key.as_deref(), Some("k2"));
        assert_eq!(catalog.locations().len(), 1);
        assert_eq!(catalog.provider(), Some(testing::PROVIDER_ID));
        assert_eq!(testing::stats().providers_destroyed, 1, "provider destroyed after crawl");
    }

    #[test]
    fn test_discover_directory_location() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Bright.clvp"), b"").unwrap();
        std::fs::write(dir.path().join("Arp.clvp"), b"").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"").unwrap();

        testing::reset();
        let opts = format!("fake:synth;presets=0;dir={}", dir.path().display());
        let library = ClapLibrary::from_static(testing::entry(), opts).unwrap();
        let catalog =
            PresetCatalog::discover(&library, testing::SYNTH_ID, &HostConfig::default()).unwrap();

        let names: Vec<&str> = catalog.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Arp", "Bright"]);
        assert_eq!(catalog.get(0).unwrap().kind, LocationKind::File);
        assert_eq!(catalog.filetypes()[0].extension, "clvp");
    }

    #[test]
    fn test_discover_skips_failing_provider() {
        testing::reset();
        let library =
            ClapLibrary::from_static(testing::entry(), "fake:synth;presets=2;providers=2;bad_provider")
                .unwrap();
        let catalog =
            PresetCatalog::discover(&library, testing::SYNTH_ID, &HostConfig::default()).unwrap();

        assert_eq!(catalog.len(), 2, "second provider supplies the catalog");
        assert_eq!(
            testing::stats().providers_destroyed,
            2,
            "failed provider destroyed too"
        );
    }

    #[test]
    fn test_discover_without_providers() {
        testing::reset();
        let library = ClapLibrary::from_static(testing::entry(), "fake:synth;providers=0").unwrap();
        let err = PresetCatalog::discover(&library, testing::SYNTH_ID, &HostConfig::default())
            .unwrap_err();
        assert_eq!(err, DiscoveryError::NoProvider { tried: 0 });
    }

    #[test]
    fn test_discover_is_deterministic() {
        testing::reset();
        let library =
            ClapLibrary::from_static(testing::entry(), "fake:synth;presets=4;dup=1").unwrap();
        let config = HostConfig::default();
        let first = PresetCatalog::discover(&library, testing::SYNTH_ID, &config).unwrap();
        let second = PresetCatalog::discover(&library, testing::SYNTH_ID, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_discovery_factory_ids() {
        assert!(is_discovery_factory(CLAP_PRESET_DISCOVERY_FACTORY_ID));
        assert!(is_discovery_factory(CLAP_PRESET_DISCOVERY_FACTORY_ID_COMPAT));
        assert!(!is_discovery_factory(c"clap.plugin-factory"));
    }
}
