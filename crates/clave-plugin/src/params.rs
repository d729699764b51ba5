//! Parameter synchronization between the control thread and the render path.
//!
//! [`ParameterSync`] keeps two value arrays behind one `parking_lot::Mutex`:
//! the control-facing values the caller reads and writes, and the
//! render-facing values last handed to (or reported by) the plugin. A dirty
//! flag per slot and direction marks a value that the other side has not yet
//! consumed. The lock only ever covers array copies.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use clap_sys::ext::params::{
    CLAP_PARAM_IS_AUTOMATABLE, CLAP_PARAM_IS_BYPASS, CLAP_PARAM_IS_HIDDEN,
    CLAP_PARAM_IS_READONLY, CLAP_PARAM_IS_STEPPED,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ParameterError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterFlags {
    pub stepped: bool,
    pub automatable: bool,
    pub read_only: bool,
    pub is_bypass: bool,
    pub hidden: bool,
}

impl ParameterFlags {
    pub(crate) fn from_clap(flags: u32) -> Self {
        Self {
            stepped: flags & CLAP_PARAM_IS_STEPPED != 0,
            automatable: flags & CLAP_PARAM_IS_AUTOMATABLE != 0,
            read_only: flags & CLAP_PARAM_IS_READONLY != 0,
            is_bypass: flags & CLAP_PARAM_IS_BYPASS != 0,
            hidden: flags & CLAP_PARAM_IS_HIDDEN != 0,
        }
    }
}

/// Parameter metadata, cached once per load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub id: u32,
    pub name: String,
    /// Slash-separated group path, empty at the top level.
    pub module: String,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
    pub flags: ParameterFlags,
}

impl ParameterInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            module: String::new(),
            min_value: 0.0,
            max_value: 1.0,
            default_value: 0.0,
            flags: ParameterFlags::default(),
        }
    }

    pub fn range(mut self, min: f64, max: f64, default: f64) -> Self {
        self.min_value = min;
        self.max_value = max;
        self.default_value = default;
        self
    }

    /// Clamp into `[min_value, max_value]`; NaN maps to the minimum.
    pub fn clamp(&self, value: f64) -> f64 {
        if self.min_value > self.max_value {
            return value;
        }
        value.max(self.min_value).min(self.max_value)
    }
}

struct Slots {
    control: Vec<f64>,
    render: Vec<f64>,
    to_render: Vec<bool>,
    to_control: Vec<bool>,
}

impl Slots {
    fn drain_to_control(&mut self) {
        for index in 0..self.control.len() {
            if self.to_control[index] {
                self.control[index] = self.render[index];
                self.to_control[index] = false;
            }
        }
    }
}

/// Double-buffered parameter values for one loaded plugin.
pub struct ParameterSync {
    infos: Vec<ParameterInfo>,
    slots: Mutex<Slots>,
}

impl ParameterSync {
    /// `initial` holds the plugin's current values in `infos` order.
    pub(crate) fn new(infos: Vec<ParameterInfo>, initial: Vec<f64>) -> Self {
        debug_assert_eq!(infos.len(), initial.len());
        let count = infos.len();
        Self {
            infos,
            slots: Mutex::new(Slots {
                control: initial.clone(),
                render: initial,
                to_render: vec![false; count],
                to_control: vec![false; count],
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn infos(&self) -> &[ParameterInfo] {
        &self.infos
    }

    pub fn info(&self, index: usize) -> Result<&ParameterInfo, ParameterError> {
        self.infos.get(index).ok_or(ParameterError::IndexOutOfRange {
            index,
            count: self.infos.len(),
        })
    }

    /// First parameter whose name matches exactly.
    pub fn index_of(&self, name: &str) -> Result<usize, ParameterError> {
        self.infos
            .iter()
            .position(|info| info.name == name)
            .ok_or_else(|| ParameterError::UnknownName(name.to_string()))
    }

    /// Write a control value and mark it for the next render.
    ///
    /// Returns the value actually stored after clamping.
    pub fn set(&self, index: usize, value: f64) -> Result<f64, ParameterError> {
        let value = self.info(index)?.clamp(value);
        let mut slots = self.slots.lock();
        slots.control[index] = value;
        slots.to_render[index] = true;
        // A fresh control write supersedes an unconsumed plugin report.
        slots.to_control[index] = false;
        Ok(value)
    }

    pub fn get(&self, index: usize) -> Result<f64, ParameterError> {
        self.info(index)?;
        let mut slots = self.slots.lock();
        if slots.to_control[index] {
            slots.control[index] = slots.render[index];
            slots.to_control[index] = false;
        }
        Ok(slots.control[index])
    }

    pub fn has_pending_writes(&self) -> bool {
        self.slots.lock().to_render.iter().any(|&dirty| dirty)
    }

    /// Render side: move pending control writes into the render array.
    pub(crate) fn drain_to_render(&self, mut emit: impl FnMut(u32, f64)) {
        let mut slots = self.slots.lock();
        for index in 0..self.infos.len() {
            if slots.to_render[index] {
                let value = slots.control[index];
                slots.render[index] = value;
                slots.to_render[index] = false;
                emit(self.infos[index].id, value);
            }
        }
    }

    /// A value change that originated in the plugin.
    pub(crate) fn publish_from_plugin(&self, param_id: u32, value: f64) {
        let Some(index) = self.infos.iter().position(|info| info.id == param_id) else {
            return;
        };
        let mut slots = self.slots.lock();
        slots.render[index] = value;
        slots.to_control[index] = true;
    }

    /// Current control values, after folding in every plugin-side change.
    pub fn snapshot(&self) -> Vec<f64> {
        let mut slots = self.slots.lock();
        slots.drain_to_control();
        slots.control.clone()
    }

    /// Queue every value as a pending write.
    pub(crate) fn restore(&self, values: &[f64]) {
        let mut slots = self.slots.lock();
        for (index, (info, &value)) in self.infos.iter().zip(values).enumerate() {
            slots.control[index] = info.clamp(value);
            slots.to_render[index] = true;
            slots.to_control[index] = false;
        }
    }
}

impl std::fmt::Debug for ParameterSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSync")
            .field("count", &self.infos.len())
            .finish()
    }
}

/// Cloneable, thread-safe access to the loaded plugin's parameters.
///
/// A handle stays valid across `close` and `load`; while nothing is loaded
/// every call returns [`ParameterError::NotLoaded`].
#[derive(Clone, Default)]
pub struct ParameterHandle {
    slot: Arc<ArcSwapOption<ParameterSync>>,
}

impl ParameterHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, sync: Arc<ParameterSync>) {
        self.slot.store(Some(sync));
    }

    pub(crate) fn detach(&self) {
        self.slot.store(None);
    }

    fn with<R>(
        &self,
        f: impl FnOnce(&ParameterSync) -> Result<R, ParameterError>,
    ) -> Result<R, ParameterError> {
        let guard = self.slot.load();
        match &*guard {
            Some(sync) => f(sync),
            None => Err(ParameterError::NotLoaded),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Zero when nothing is loaded.
    pub fn count(&self) -> usize {
        self.with(|sync| Ok(sync.len())).unwrap_or(0)
    }

    pub fn info(&self, index: usize) -> Result<ParameterInfo, ParameterError> {
        self.with(|sync| sync.info(index).cloned())
    }

    pub fn set(&self, index: usize, value: f64) -> Result<f64, ParameterError> {
        self.with(|sync| sync.set(index, value))
    }

    pub fn get(&self, index: usize) -> Result<f64, ParameterError> {
        self.with(|sync| sync.get(index))
    }

    pub fn set_by_name(&self, name: &str, value: f64) -> Result<f64, ParameterError> {
        self.with(|sync| sync.set(sync.index_of(name)?, value))
    }

    pub fn get_by_name(&self, name: &str) -> Result<f64, ParameterError> {
        self.with(|sync| sync.get(sync.index_of(name)?))
    }
}

impl std::fmt::Debug for ParameterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterHandle")
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync() -> ParameterSync {
        ParameterSync::new(
            vec![
                ParameterInfo::new(10, "Volume").range(0.0, 1.0, 0.5),
                ParameterInfo::new(20, "Cutoff").range(20.0, 20000.0, 1000.0),
                ParameterInfo::new(30, "Volume").range(0.0, 2.0, 1.0),
            ],
            vec![0.5, 1000.0, 1.0],
        )
    }

    fn drained(sync: &ParameterSync) -> Vec<(u32, f64)> {
        let mut out = Vec::new();
        sync.drain_to_render(|id, value| out.push((id, value)));
        out
    }

    // ── Control writes ──

    #[test]
    fn test_set_then_drain() {
        let sync = sync();
        sync.set(1, 440.0).unwrap();
        assert!(sync.has_pending_writes());

        assert_eq!(drained(&sync), vec![(20, 440.0)]);
        assert!(drained(&sync).is_empty(), "each write is consumed once");
        assert_eq!(sync.get(1).unwrap(), 440.0);
    }

    #[test]
    fn test_last_write_wins_before_render() {
        let sync = sync();
        sync.set(0, 0.1).unwrap();
        sync.set(0, 0.9).unwrap();
        assert_eq!(drained(&sync), vec![(10, 0.9)], "one pending write per slot");
    }

    #[test]
    fn test_set_clamps() {
        let sync = sync();
        assert_eq!(sync.set(0, 3.0).unwrap(), 1.0);
        assert_eq!(sync.set(1, -5.0).unwrap(), 20.0);
        assert_eq!(sync.get(0).unwrap(), 1.0);
    }

    #[test]
    fn test_out_of_range_leaves_state_unchanged() {
        let sync = sync();
        let err = sync.set(3, 0.2).unwrap_err();
        assert_eq!(err, ParameterError::IndexOutOfRange { index: 3, count: 3 });
        assert!(!sync.has_pending_writes());
        assert_eq!(sync.snapshot(), vec![0.5, 1000.0, 1.0]);
        assert!(sync.get(99).is_err());
    }

    #[test]
    fn test_name_lookup_first_match() {
        let sync = sync();
        assert_eq!(sync.index_of("Volume").unwrap(), 0, "duplicates resolve to the first");
        assert_eq!(
            sync.index_of("volume").unwrap_err(),
            ParameterError::UnknownName("volume".into())
        );
    }

    // ── Plugin-originated changes ──

    #[test]
    fn test_plugin_change_reaches_control() {
        let sync = sync();
        sync.publish_from_plugin(20, 880.0);
        sync.publish_from_plugin(999, 1.0);
        assert_eq!(sync.get(1).unwrap(), 880.0);
        assert!(drained(&sync).is_empty(), "plugin changes are not echoed back");
    }

    #[test]
    fn test_control_write_supersedes_plugin_change() {
        let sync = sync();
        sync.publish_from_plugin(20, 880.0);
        sync.set(1, 220.0).unwrap();
        assert_eq!(sync.get(1).unwrap(), 220.0);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let sync = sync();
        sync.publish_from_plugin(10, 0.25);
        let snapshot = sync.snapshot();
        assert_eq!(snapshot, vec![0.25, 1000.0, 1.0]);

        sync.restore(&[0.75, 5000.0, 0.5]);
        assert_eq!(
            drained(&sync),
            vec![(10, 0.75), (20, 5000.0), (30, 0.5)],
            "restore queues every value"
        );
    }

    // ── Handle ──

    #[test]
    fn test_handle_detached() {
        let handle = ParameterHandle::new();
        assert!(!handle.is_attached());
        assert_eq!(handle.count(), 0);
        assert_eq!(handle.set(0, 1.0), Err(ParameterError::NotLoaded));
        assert_eq!(handle.get_by_name("Volume"), Err(ParameterError::NotLoaded));
    }

    #[test]
    fn test_handle_follows_attach() {
        let handle = ParameterHandle::new();
        let clone = handle.clone();
        handle.attach(Arc::new(sync()));

        assert_eq!(clone.count(), 3);
        clone.set_by_name("Cutoff", 300.0).unwrap();
        assert_eq!(handle.get(1).unwrap(), 300.0);
        assert_eq!(handle.info(2).unwrap().id, 30);

        handle.detach();
        assert_eq!(clone.get(1), Err(ParameterError::NotLoaded));
    }

    #[test]
    fn test_handle_across_threads() {
        let handle = ParameterHandle::new();
        handle.attach(Arc::new(sync()));

        let writer = handle.clone();
        std::thread::spawn(move || {
            for i in 0..100 {
                writer.set(0, i as f64 / 100.0).unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(handle.get(0).unwrap(), 0.99);
    }

    #[test]
    fn test_flags_from_clap() {
        let flags = ParameterFlags::from_clap(CLAP_PARAM_IS_STEPPED | CLAP_PARAM_IS_HIDDEN);
        assert!(flags.stepped);
        assert!(flags.hidden);
        assert!(!flags.automatable);
    }
}
