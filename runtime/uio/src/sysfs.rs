//! Region size discovery through sysfs
//!
//! Every UIO map is described under `/sys/class/uio/uioN/maps/mapM/`. The
//! `size` attribute holds the byte length of the map (taken from the `reg`
//! property of the device tree node) as `0xXXXXXXXX`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::{Result, UioError};

/// Default sysfs class directory for UIO devices
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/uio";

/// Maximum number of hex digits in a size descriptor (one 32-bit value)
const MAX_HEX_DIGITS: usize = 8;

/// Build the path of the size descriptor for `map_index` of `device_name`
///
/// ```
/// use uio_runtime::map_size_path;
///
/// let path = map_size_path("/sys/class/uio", "uio0", 0);
/// assert_eq!(path.to_str(), Some("/sys/class/uio/uio0/maps/map0/size"));
/// ```
pub fn map_size_path(sysfs_root: impl AsRef<Path>, device_name: &str, map_index: usize) -> PathBuf {
    sysfs_root
        .as_ref()
        .join(device_name)
        .join("maps")
        .join(format!("map{map_index}"))
        .join("size")
}

/// Read and parse the region size descriptor at `path`
///
/// The descriptor is opened, read once and released before returning.
///
/// # Errors
/// Returns [`UioError::Io`] if the descriptor cannot be read or does not
/// hold a single `0x`-prefixed 32-bit hex value.
pub fn resolve_region_size(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();

    let text = fs::read_to_string(path).map_err(|e| UioError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let size = parse_region_size(&text).map_err(|reason| UioError::Io {
        path: path.to_path_buf(),
        reason,
    })?;

    debug!("{}: {:#x} bytes", path.display(), size);
    Ok(size as usize)
}

/// Parse the contents of a size descriptor
///
/// Accepts `0x` (or `0X`) followed by one to eight hex digits. Trailing
/// whitespace is ignored since sysfs terminates attributes with a newline.
pub fn parse_region_size(text: &str) -> core::result::Result<u32, String> {
    let value = text.trim_end_matches(|c: char| c.is_ascii_whitespace());

    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("expected 0x-prefixed hex value, found {value:?}"))?;

    if digits.is_empty() || digits.len() > MAX_HEX_DIGITS {
        return Err(format!("expected 1 to {MAX_HEX_DIGITS} hex digits, found {value:?}"));
    }

    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("invalid hex digits in {value:?}"));
    }

    u32::from_str_radix(digits, 16).map_err(|e| format!("{value:?}: {e}"))
}
