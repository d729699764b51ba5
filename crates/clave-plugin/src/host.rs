//! The `clap_host` handed to plugins.
//!
//! Plugins call back into the host from arbitrary threads, so requests are
//! recorded as atomic flags and serviced later from the control thread.

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use clap_sys::ext::log::{
    clap_host_log, clap_log_severity, CLAP_EXT_LOG, CLAP_LOG_DEBUG, CLAP_LOG_ERROR,
    CLAP_LOG_FATAL, CLAP_LOG_HOST_MISBEHAVING, CLAP_LOG_INFO, CLAP_LOG_PLUGIN_MISBEHAVING,
    CLAP_LOG_WARNING,
};
use clap_sys::ext::params::{clap_host_params, CLAP_EXT_PARAMS};
use clap_sys::host::clap_host;
use clap_sys::version::CLAP_VERSION;
use tracing::{debug, error, info, trace, warn};

use crate::config::HostConfig;
use crate::error::ConfigError;

/// Requests a plugin made through the host interface.
#[derive(Debug, Default)]
pub struct HostRequests {
    restart: AtomicBool,
    process: AtomicBool,
    callback: AtomicBool,
    rescan_params: AtomicBool,
    flush_params: AtomicBool,
}

impl HostRequests {
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::AcqRel)
    }

    pub fn take_process(&self) -> bool {
        self.process.swap(false, Ordering::AcqRel)
    }

    pub fn take_callback(&self) -> bool {
        self.callback.swap(false, Ordering::AcqRel)
    }

    pub fn take_rescan_params(&self) -> bool {
        self.rescan_params.swap(false, Ordering::AcqRel)
    }

    pub fn take_flush_params(&self) -> bool {
        self.flush_params.swap(false, Ordering::AcqRel)
    }
}

pub(crate) struct ClapHost {
    raw: Box<clap_host>,
    requests: Box<HostRequests>,
    _strings: [CString; 4],
}

// Safety: the raw struct only points at data owned by `self`; the request
// flags are atomics.
unsafe impl Send for ClapHost {}

static HOST_LOG: clap_host_log = clap_host_log {
    log: Some(host_log),
};

static HOST_PARAMS: clap_host_params = clap_host_params {
    rescan: Some(host_params_rescan),
    clear: Some(host_params_clear),
    request_flush: Some(host_params_request_flush),
};

impl ClapHost {
    pub(crate) fn new(config: &HostConfig) -> Result<Self, ConfigError> {
        let to_c = |field: &'static str, value: &str| {
            CString::new(value).map_err(|_| ConfigError::NulInHostString(field))
        };
        let strings = [
            to_c("host_name", &config.host_name)?,
            to_c("host_vendor", &config.host_vendor)?,
            to_c("host_url", &config.host_url)?,
            to_c("host_version", &config.host_version)?,
        ];

        let requests = Box::<HostRequests>::default();
        let raw = Box::new(clap_host {
            clap_version: CLAP_VERSION,
            host_data: &*requests as *const HostRequests as *mut c_void,
            name: strings[0].as_ptr(),
            vendor: strings[1].as_ptr(),
            url: strings[2].as_ptr(),
            version: strings[3].as_ptr(),
            get_extension: Some(host_get_extension),
            request_restart: Some(host_request_restart),
            request_process: Some(host_request_process),
            request_callback: Some(host_request_callback),
        });

        Ok(Self {
            raw,
            requests,
            _strings: strings,
        })
    }

    pub(crate) fn as_raw(&self) -> *const clap_host {
        &*self.raw
    }

    pub(crate) fn requests(&self) -> &HostRequests {
        &self.requests
    }
}

unsafe fn requests<'a>(host: *const clap_host) -> Option<&'a HostRequests> {
    if host.is_null() || (*host).host_data.is_null() {
        return None;
    }
    Some(&*((*host).host_data as *const HostRequests))
}

unsafe extern "C" fn host_get_extension(
    _host: *const clap_host,
    extension_id: *const c_char,
) -> *const c_void {
    if extension_id.is_null() {
        return ptr::null();
    }
    let id = CStr::from_ptr(extension_id);
    if id == CLAP_EXT_LOG {
        &HOST_LOG as *const clap_host_log as *const c_void
    } else if id == CLAP_EXT_PARAMS {
        &HOST_PARAMS as *const clap_host_params as *const c_void
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn host_request_restart(host: *const clap_host) {
    if let Some(requests) = requests(host) {
        requests.restart.store(true, Ordering::Release);
    }
}

unsafe extern "C" fn host_request_process(host: *const clap_host) {
    if let Some(requests) = requests(host) {
        requests.process.store(true, Ordering::Release);
    }
}

unsafe extern "C" fn host_request_callback(host: *const clap_host) {
    if let Some(requests) = requests(host) {
        requests.callback.store(true, Ordering::Release);
    }
}

unsafe extern "C" fn host_log(
    _host: *const clap_host,
    severity: clap_log_severity,
    msg: *const c_char,
) {
    if msg.is_null() {
        return;
    }
    let msg = CStr::from_ptr(msg).to_string_lossy();
    match severity {
        CLAP_LOG_DEBUG => debug!(target: "clap_plugin", "{msg}"),
        CLAP_LOG_INFO => info!(target: "clap_plugin", "{msg}"),
        CLAP_LOG_WARNING => warn!(target: "clap_plugin", "{msg}"),
        CLAP_LOG_ERROR | CLAP_LOG_FATAL => error!(target: "clap_plugin", "{msg}"),
        CLAP_LOG_HOST_MISBEHAVING => error!(target: "clap_plugin", "host misbehaving: {msg}"),
        CLAP_LOG_PLUGIN_MISBEHAVING => warn!(target: "clap_plugin", "plugin misbehaving: {msg}"),
        _ => trace!(target: "clap_plugin", severity, "{msg}"),
    }
}

unsafe extern "C" fn host_params_rescan(host: *const clap_host, _flags: u32) {
    if let Some(requests) = requests(host) {
        requests.rescan_params.store(true, Ordering::Release);
    }
}

unsafe extern "C" fn host_params_clear(_host: *const clap_host, _param_id: u32, _flags: u32) {}

unsafe extern "C" fn host_params_request_flush(host: *const clap_host) {
    if let Some(requests) = requests(host) {
        requests.flush_params.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_identity_strings() {
        let config = HostConfig::default().host_name("Test Host");
        let host = ClapHost::new(&config).unwrap();
        let raw = unsafe { &*host.as_raw() };

        let name = unsafe { CStr::from_ptr(raw.name) };
        assert_eq!(name.to_str().unwrap(), "Test Host");
        assert_eq!(raw.clap_version.major, CLAP_VERSION.major);
    }

    #[test]
    fn test_requests_are_recorded_and_taken_once() {
        let host = ClapHost::new(&HostConfig::default()).unwrap();
        let raw = host.as_raw();

        unsafe {
            host_request_restart(raw);
            host_request_callback(raw);
        }

        assert!(host.requests().take_restart());
        assert!(!host.requests().take_restart(), "flags clear on take");
        assert!(host.requests().take_callback());
        assert!(!host.requests().take_process());
    }

    #[test]
    fn test_host_extensions() {
        let host = ClapHost::new(&HostConfig::default()).unwrap();
        let raw = host.as_raw();

        let log = unsafe { host_get_extension(raw, CLAP_EXT_LOG.as_ptr()) };
        assert!(!log.is_null(), "log extension is always offered");

        let params = unsafe { host_get_extension(raw, CLAP_EXT_PARAMS.as_ptr()) };
        assert!(!params.is_null());
        let params = unsafe { &*(params as *const clap_host_params) };
        unsafe { params.rescan.unwrap()(raw, 0) };
        assert!(host.requests().take_rescan_params());

        let unknown = unsafe { host_get_extension(raw, c"clap.unknown".as_ptr()) };
        assert!(unknown.is_null());
    }

    #[test]
    fn test_log_accepts_all_severities() {
        let host = ClapHost::new(&HostConfig::default()).unwrap();
        for severity in -1..=7 {
            unsafe { host_log(host.as_raw(), severity, c"message".as_ptr()) };
        }
        unsafe { host_log(host.as_raw(), CLAP_LOG_INFO, ptr::null()) };
    }
}
