//! On-disk API key storage.
//!
//! The key lives in a single-line file under the per-user configuration
//! directory. Being a bearer credential, the file is created owner-readable
//! only and its parent directory owner-accessible only.

use std::fs;
use std::path::{Path, PathBuf};

use xmit_types::{Result, XmitError};

use crate::platform;

/// `<user-config>/xmit/key`, if the platform config directory is known.
pub fn key_path() -> Option<PathBuf> {
    platform::config_dir().map(|dir| dir.join("xmit").join("key"))
}

/// Read the stored key, trimmed. `None` when absent or empty.
pub fn load() -> Option<String> {
    let path = key_path()?;
    load_from(&path)
}

fn load_from(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let key = raw.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Store a key at the standard location.
pub fn store(key: &str) -> Result<()> {
    let path = key_path().ok_or_else(|| {
        XmitError::Config("cannot determine the user configuration directory".into())
    })?;
    store_at(&path, key)
}

fn store_at(path: &Path, key: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| XmitError::Config(format!("invalid key path '{}'", path.display())))?;
    fs::create_dir_all(parent)?;

    #[cfg(unix)]
    {
        use std::io::Write as _;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
        // The key is a bearer credential; never let it exist world-readable.
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(key.as_bytes())?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    fs::write(path, key)?;

    Ok(())
}
