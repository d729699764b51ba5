//! CLAP binary loading.
//!
//! A [`ClapLibrary`] owns one opened binary: the `clap_entry` it exports, the
//! entry's initialized state and the plugin factory. Dropping it runs
//! `deinit` and then unmaps the binary.

use std::ffi::{c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;

use clap_sys::entry::clap_plugin_entry;
use clap_sys::factory::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
use clap_sys::host::clap_host;
use clap_sys::plugin::{clap_plugin, clap_plugin_descriptor};
use clap_sys::version::clap_version;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::ffi;
use crate::metadata::PluginMetadata;

pub struct ClapLibrary {
    entry: *const clap_plugin_entry,
    factory: *const clap_plugin_factory,
    path: PathBuf,
    // Dropped after `deinit` has run.
    _library: Option<libloading::Library>,
}

// Safety: the entry and factory are immutable tables; CLAP requires them to be
// usable from any thread once `init` has returned.
unsafe impl Send for ClapLibrary {}

fn version_is_compatible(version: clap_version) -> bool {
    version.major >= 1
}

impl ClapLibrary {
    /// Open a `.clap` binary and initialize its entry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();

        let library = unsafe {
            libloading::Library::new(path).map_err(|e| LoadError::LibraryNotFound {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        // `clap_entry` is a data symbol, not a function.
        let entry = unsafe {
            let symbol = library
                .get::<*const clap_plugin_entry>(b"clap_entry\0")
                .map_err(|e| LoadError::InvalidBinary {
                    path: path.to_path_buf(),
                    reason: format!("no clap_entry symbol: {e}"),
                })?;
            *symbol
        };

        unsafe { Self::from_raw_entry(entry, path, Some(library)) }
    }

    /// Use an entry linked into the current executable.
    ///
    /// `path` is handed to the entry's `init` exactly as a file path would be.
    pub fn from_static(
        entry: &'static clap_plugin_entry,
        path: impl AsRef<Path>,
    ) -> Result<Self, LoadError> {
        unsafe { Self::from_raw_entry(entry, path.as_ref(), None) }
    }

    unsafe fn from_raw_entry(
        entry: *const clap_plugin_entry,
        path: &Path,
        library: Option<libloading::Library>,
    ) -> Result<Self, LoadError> {
        if entry.is_null() {
            return Err(LoadError::InvalidBinary {
                path: path.to_path_buf(),
                reason: "clap_entry is null".to_string(),
            });
        }
        let entry_ref = &*entry;

        let version = entry_ref.clap_version;
        if !version_is_compatible(version) {
            return Err(LoadError::IncompatibleVersion {
                path: path.to_path_buf(),
                major: version.major,
                minor: version.minor,
                revision: version.revision,
            });
        }

        let init = entry_ref.init.ok_or_else(|| LoadError::InvalidBinary {
            path: path.to_path_buf(),
            reason: "entry has no init function".to_string(),
        })?;
        let c_path = CString::new(path.to_string_lossy().as_bytes()).map_err(|_| {
            LoadError::InvalidBinary {
                path: path.to_path_buf(),
                reason: "path contains a NUL byte".to_string(),
            }
        })?;

        if !init(c_path.as_ptr()) {
            // `library` drops here and closes the binary.
            return Err(LoadError::EntryInitFailed {
                path: path.to_path_buf(),
            });
        }

        // From here on `Drop` owns the `deinit` call.
        let mut this = Self {
            entry,
            factory: ptr::null(),
            path: path.to_path_buf(),
            _library: library,
        };

        let factory = this.get_factory(CLAP_PLUGIN_FACTORY_ID) as *const clap_plugin_factory;
        if factory.is_null() {
            return Err(LoadError::NoFactory {
                path: this.path.clone(),
            });
        }
        this.factory = factory;

        let count = this.plugin_count();
        if count == 0 {
            return Err(LoadError::NoPlugins {
                path: this.path.clone(),
            });
        }

        debug!(
            path = %this.path.display(),
            clap_version = %format!("{}.{}.{}", version.major, version.minor, version.revision),
            plugins = count,
            "opened CLAP binary"
        );
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up any factory the binary exposes; null when absent.
    pub(crate) fn get_factory(&self, id: &CStr) -> *const c_void {
        let entry = unsafe { &*self.entry };
        match entry.get_factory {
            Some(get_factory) => unsafe { get_factory(id.as_ptr()) },
            None => ptr::null(),
        }
    }

    pub fn plugin_count(&self) -> u32 {
        if self.factory.is_null() {
            return 0;
        }
        let factory = unsafe { &*self.factory };
        match factory.get_plugin_count {
            Some(count) => unsafe { count(self.factory) },
            None => 0,
        }
    }

    fn raw_descriptor(&self, index: u32) -> Option<&clap_plugin_descriptor> {
        if self.factory.is_null() {
            return None;
        }
        let factory = unsafe { &*self.factory };
        let get_descriptor = factory.get_plugin_descriptor?;
        let descriptor = unsafe { get_descriptor(self.factory, index) };
        if descriptor.is_null() {
            None
        } else {
            Some(unsafe { &*descriptor })
        }
    }

    /// Metadata for the descriptor at `index`.
    pub fn descriptor(&self, index: u32) -> Option<PluginMetadata> {
        let desc = self.raw_descriptor(index)?;
        if desc.id.is_null() {
            warn!(index, "plugin descriptor without an id, skipping");
            return None;
        }

        let metadata = unsafe {
            PluginMetadata::new(ffi::string(desc.id), ffi::string(desc.name))
                .vendor(ffi::string(desc.vendor))
                .version(ffi::string(desc.version))
                .description(ffi::string(desc.description))
                .features(ffi::string_list(desc.features))
        };
        Some(metadata)
    }

    /// Every descriptor in the binary, in factory order.
    pub fn descriptors(&self) -> Vec<PluginMetadata> {
        (0..self.plugin_count())
            .filter_map(|index| self.descriptor(index))
            .collect()
    }

    /// # Safety
    /// `host` must outlive the returned plugin.
    pub(crate) unsafe fn create_plugin(
        &self,
        host: *const clap_host,
        plugin_id: &CStr,
    ) -> *const clap_plugin {
        if self.factory.is_null() {
            return ptr::null();
        }
        let factory = &*self.factory;
        match factory.create_plugin {
            Some(create) => create(self.factory, host, plugin_id.as_ptr()),
            None => ptr::null(),
        }
    }
}

impl Drop for ClapLibrary {
    fn drop(&mut self) {
        let entry = unsafe { &*self.entry };
        if let Some(deinit) = entry.deinit {
            unsafe { deinit() };
        }
        debug!(path = %self.path.display(), "closed CLAP binary");
    }
}

impl std::fmt::Debug for ClapLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClapLibrary")
            .field("path", &self.path)
            .field("plugins", &self.plugin_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    // ── Opening ──

    #[test]
    fn test_open_missing_file() {
        let result = ClapLibrary::open("/nonexistent/NoSuchPlugin.clap");
        match result {
            Err(LoadError::LibraryNotFound { path, .. }) => {
                assert!(path.ends_with("NoSuchPlugin.clap"));
            }
            other => panic!("expected LibraryNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_open_non_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("Garbage.clap");
        std::fs::write(&fake, b"not a shared library").unwrap();

        let err = ClapLibrary::open(&fake).unwrap_err();
        assert!(
            matches!(err, LoadError::LibraryNotFound { .. }),
            "garbage must fail at open, got {err:?}"
        );
    }

    // ── Static entries ──

    #[test]
    fn test_static_entry_enumerates_descriptors() {
        testing::reset();
        let library = ClapLibrary::from_static(testing::entry(), "fake:multi").unwrap();

        assert_eq!(library.plugin_count(), 2);
        let descriptors = library.descriptors();
        assert_eq!(descriptors[0].id, testing::EFFECT_ID);
        assert!(!descriptors[0].is_instrument);
        assert_eq!(descriptors[1].id, testing::SYNTH_ID);
        assert!(descriptors[1].is_instrument);
        assert!(descriptors[1].has_feature("synthesizer"));
    }

    #[test]
    fn test_entry_init_failure_does_not_deinit() {
        testing::reset();
        let err = ClapLibrary::from_static(testing::entry(), "fake:effect;fail=entry").unwrap_err();

        assert!(matches!(err, LoadError::EntryInitFailed { .. }), "got {err:?}");
        let stats = testing::stats();
        assert_eq!(stats.entry_inits, 1);
        assert_eq!(stats.entry_deinits, 0, "deinit only pairs with a successful init");
    }

    #[test]
    fn test_missing_factory_deinits_entry() {
        testing::reset();
        let err =
            ClapLibrary::from_static(testing::entry(), "fake:effect;fail=factory").unwrap_err();

        assert!(matches!(err, LoadError::NoFactory { .. }), "got {err:?}");
        assert_eq!(testing::stats().entry_deinits, 1);
    }

    #[test]
    fn test_empty_factory() {
        testing::reset();
        let err = ClapLibrary::from_static(testing::entry(), "fake:none").unwrap_err();

        assert!(matches!(err, LoadError::NoPlugins { .. }), "got {err:?}");
        assert_eq!(testing::stats().entry_deinits, 1);
    }

    #[test]
    fn test_incompatible_version() {
        testing::reset();
        let err =
            ClapLibrary::from_static(testing::incompatible_entry(), "fake:effect").unwrap_err();

        assert!(
            matches!(err, LoadError::IncompatibleVersion { major: 0, .. }),
            "got {err:?}"
        );
        assert_eq!(testing::stats().entry_inits, 0, "init must not be called");
    }

    #[test]
    fn test_drop_deinits_once() {
        testing::reset();
        let library = ClapLibrary::from_static(testing::entry(), "fake:effect").unwrap();
        assert_eq!(testing::stats().entry_deinits, 0);
        drop(library);
        assert_eq!(testing::stats().entry_deinits, 1);
    }
}
