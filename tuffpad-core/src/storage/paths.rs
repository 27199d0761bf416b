//! On-flash layout: fixed paths and per-slot profile file names.

use core::fmt::Write as _;

use heapless::String;

pub const CONFIG_DIR: &str = "/config";
pub const PROFILES_DIR: &str = "/config/profiles";
pub const DEVICE_PATH: &str = "/config/device.bin";
pub const TMP_SUFFIX: &str = ".tmp";
pub const PROFILE_SUFFIX: &str = ".bin";

/// Longest path the layout produces, with headroom.
pub const PATH_CAPACITY: usize = 40;

/// Owned path buffer.
pub type PathBuf = String<PATH_CAPACITY>;

/// Returned when a path does not fit in [`PathBuf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTooLong;

/// `dir/name`.
pub fn join(dir: &str, name: &str) -> Result<PathBuf, PathTooLong> {
    let mut path = PathBuf::new();
    write!(path, "{}/{}", dir, name).map_err(|_| PathTooLong)?;
    Ok(path)
}

/// `/config/profiles/<slot>.bin`
pub fn profile_path(slot: u8) -> Result<PathBuf, PathTooLong> {
    let mut path = PathBuf::new();
    write!(path, "{}/{}{}", PROFILES_DIR, slot, PROFILE_SUFFIX).map_err(|_| PathTooLong)?;
    Ok(path)
}

/// `<path>.tmp`
pub fn temp_path(path: &str) -> Result<PathBuf, PathTooLong> {
    let mut tmp = PathBuf::new();
    tmp.push_str(path).map_err(|_| PathTooLong)?;
    tmp.push_str(TMP_SUFFIX).map_err(|_| PathTooLong)?;
    Ok(tmp)
}

/// Directory part of an absolute path; `/` for top-level entries.
#[must_use]
pub fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

/// Last component of a path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

#[inline]
#[must_use]
pub fn is_temp(name: &str) -> bool {
    name.ends_with(TMP_SUFFIX)
}

/// Parse a directory entry named `<decimal>.bin` into its slot.
///
/// Temp files and anything out of the 0..=255 range yield `None`.
#[must_use]
pub fn parse_profile_name(name: &str) -> Option<u8> {
    let digits = name.strip_suffix(PROFILE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
