//! Small helpers for reading C data handed over by plugins.

use std::ffi::{c_char, CStr};

/// Lossy UTF-8 copy of a NUL-terminated string; null becomes `None`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn opt_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// # Safety
/// Same as [`opt_string`].
pub(crate) unsafe fn string(ptr: *const c_char) -> String {
    opt_string(ptr).unwrap_or_default()
}

/// Reads a fixed-size `char` buffer that may be missing its terminator.
pub(crate) fn fixed_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Collects a NULL-terminated array of C strings.
///
/// # Safety
/// `list` must be null or a NULL-terminated array of valid C strings.
pub(crate) unsafe fn string_list(list: *const *const c_char) -> Vec<String> {
    let mut out = Vec::new();
    if list.is_null() {
        return out;
    }
    let mut cursor = list;
    while !(*cursor).is_null() {
        out.push(string(*cursor));
        cursor = cursor.add(1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_opt_string() {
        assert_eq!(unsafe { opt_string(ptr::null()) }, None);
        assert_eq!(
            unsafe { opt_string(c"Warm Pad".as_ptr()) }.as_deref(),
            Some("Warm Pad")
        );
    }

    #[test]
    fn test_fixed_string_stops_at_nul_or_end() {
        let chars = |bytes: &[u8]| bytes.iter().map(|&b| b as c_char).collect::<Vec<_>>();

        assert_eq!(fixed_string(&chars(b"Gain\0x\0\0")), "Gain");
        assert_eq!(
            fixed_string(&chars(b"abc")),
            "abc",
            "unterminated buffers are read to the end"
        );
    }

    #[test]
    fn test_string_list() {
        let list = [c"instrument".as_ptr(), c"stereo".as_ptr(), ptr::null()];
        let features = unsafe { string_list(list.as_ptr()) };
        assert_eq!(features, vec!["instrument", "stereo"]);
        assert!(unsafe { string_list(ptr::null()) }.is_empty());
    }
}
