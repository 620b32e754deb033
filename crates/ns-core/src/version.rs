//! Version compatibility checks for configuration files.

use crate::{Error, Result};

/// Placeholder version used by builds without release metadata.
pub const UNKNOWN_VERSION: &str = "X.X.X";

fn split_version(version: &str) -> Result<[u32; 3]> {
    let parts: Vec<&str> = version.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidVersion(version.to_string()));
    }
    let mut out = [0u32; 3];
    for (i, part) in parts.iter().enumerate() {
        // "1.2.3f" marks a fixed release; the tag does not take part in ordering
        let part = if i == 2 { part.strip_suffix('f').unwrap_or(part) } else { part };
        out[i] = part.parse::<u32>().map_err(|_| Error::InvalidVersion(version.to_string()))?;
    }
    Ok(out)
}

/// Returns true when `current >= min_version` (major.minor.micro).
pub fn is_newer_or_equal_version(current: &str, min_version: &str) -> Result<bool> {
    let min = split_version(min_version)?;
    if current == UNKNOWN_VERSION {
        log::warn!("Can't check version requirement {min_version}. Assuming OK.");
        return Ok(true);
    }
    let cur = split_version(current)?;
    Ok(cur >= min)
}

/// Check `min_version` against this crate's version.
pub fn check_min_version(min_version: &str) -> Result<bool> {
    is_newer_or_equal_version(crate::VERSION, min_version)
}
