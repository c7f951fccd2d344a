//! Snapshot retrieval: fetch the manifest, then rebuild the tree on disk.

use std::fs;
use std::io::Write as _;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, error, info};
use xmit_protocol::tree::decode_manifest;
use xmit_protocol::Node;
use xmit_transfer::{discover, Downloader};
use xmit_types::{Hash, Result, XmitError};

use crate::config::Config;

use super::check_response;

#[derive(Debug, Default)]
pub struct DownloadStats {
    pub files_written: u64,
    pub files_skipped: u64,
    pub bytes_written: u64,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
}

/// Retrieve the latest (or `id`-selected) snapshot of `domain` into
/// `destination`.
pub fn run(
    config: &Config,
    domain: &str,
    id: Option<&str>,
    destination: &Path,
) -> Result<DownloadStats> {
    let discovery = discover(&config.base_url)?;
    debug!("using service URL {}", discovery.url);
    let key = config.require_key(discovery.api_key_management_url.as_deref())?;

    let downloader = Downloader::new(&discovery.url, config.download_parallelism)?;

    let manifest_resp = downloader.download_manifest(key, domain, id)?;
    check_response(&manifest_resp.notes())?;
    let bundle = manifest_resp
        .bundle
        .as_ref()
        .ok_or_else(|| XmitError::Decode("response carried no manifest".into()))?;
    let root = decode_manifest(bundle).map_err(|e| XmitError::Decode(e.to_string()))?;

    let counters = Counters::default();
    fetch_tree(&downloader, key, domain, &root, destination, &counters)?;

    let stats = DownloadStats {
        files_written: counters.written.load(Ordering::Relaxed),
        files_skipped: counters.skipped.load(Ordering::Relaxed),
        bytes_written: counters.bytes.load(Ordering::Relaxed),
    };
    info!(
        "downloaded {domain} into {}: {} file(s) written, {} up to date",
        destination.display(),
        stats.files_written,
        stats.files_skipped
    );
    Ok(stats)
}

/// Recursively materialize `node` at `dest`. Directory levels fan out into
/// scoped threads; the engine's fetch semaphore bounds how many of them are
/// on the network at once.
fn fetch_tree(
    downloader: &Downloader,
    key: &str,
    domain: &str,
    node: &Node,
    dest: &Path,
    counters: &Counters,
) -> Result<()> {
    match node.hash {
        Some(hash) => fetch_file(downloader, key, domain, hash, dest, counters),
        None => {
            fs::create_dir_all(dest)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(dest, fs::Permissions::from_mode(0o755))?;
            }

            let errors: Mutex<Vec<XmitError>> = Mutex::new(Vec::new());
            std::thread::scope(|s| {
                for (name, child) in &node.children {
                    if let Err(e) = safe_child_name(name) {
                        errors.lock().unwrap().push(e);
                        continue;
                    }
                    let child_path = dest.join(name);
                    let errors = &errors;
                    s.spawn(move || {
                        if let Err(e) =
                            fetch_tree(downloader, key, domain, child, &child_path, counters)
                        {
                            errors.lock().unwrap().push(e);
                        }
                    });
                }
            });

            let errors = errors.into_inner().unwrap();
            if errors.is_empty() {
                Ok(())
            } else {
                for e in &errors {
                    error!("download failed: {e}");
                }
                Err(XmitError::Other(format!(
                    "{} subtree(s) failed to download",
                    errors.len()
                )))
            }
        }
    }
}

fn fetch_file(
    downloader: &Downloader,
    key: &str,
    domain: &str,
    hash: Hash,
    dest: &Path,
    counters: &Counters,
) -> Result<()> {
    // Idempotent local cache: bytes that already hash right are left alone.
    if let Ok(existing) = fs::read(dest) {
        if Hash::compute(&existing) == hash {
            debug!("{} is up to date", dest.display());
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
    }

    info!("downloading {}", dest.display());
    let response = downloader.download_parts(key, domain, &[hash])?;
    check_response(&response.notes())?;
    let parts = response.parts();
    let part = parts
        .first()
        .ok_or_else(|| XmitError::Other(format!("no part returned for {hash}")))?;

    write_atomic(dest, part)?;
    counters.written.fetch_add(1, Ordering::Relaxed);
    counters.bytes.fetch_add(part.len() as u64, Ordering::Relaxed);
    Ok(())
}

/// Write a file via a temporary sibling and rename, so a crash or a
/// concurrent reader never observes a half-written body.
fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| XmitError::Other(format!("no parent directory for '{}'", dest.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(dest).map_err(|e| XmitError::Io(e.error))?;
    Ok(())
}

/// A manifest child name must stay strictly inside its directory: exactly
/// one normal path component, no separators, not `.`/`..`, not absolute.
fn safe_child_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(XmitError::PathTraversal {
            name: name.to_string(),
        }),
    }
}
