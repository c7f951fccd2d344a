//! Directory ingestion into a manifest tree and content map.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use xmit_protocol::Node;
use xmit_types::{Hash, Result, XmitError};

/// Symlink cycles are caught by bounding nesting depth rather than tracking
/// visited inodes.
const MAX_DEPTH: usize = 128;

/// The result of ingesting a directory: the manifest tree plus every file
/// body keyed by its hash. Lives for one upload invocation.
#[derive(Debug)]
pub struct Ingestion {
    pub root: Node,
    pub contents: HashMap<Hash, Vec<u8>>,
}

impl Ingestion {
    /// Number of distinct file bodies.
    pub fn part_count(&self) -> usize {
        self.contents.len()
    }

    /// Total bytes across distinct file bodies.
    pub fn total_bytes(&self) -> u64 {
        self.contents.values().map(|b| b.len() as u64).sum()
    }
}

/// Walk `directory` into a manifest tree, reading every file fully into
/// memory. The target is small-to-medium static sites, not arbitrary
/// archives.
pub fn ingest(directory: &Path) -> Result<Ingestion> {
    let mut contents = HashMap::new();
    let root = traverse(directory, &mut contents, 0)?;
    Ok(Ingestion { root, contents })
}

fn traverse(dir: &Path, contents: &mut HashMap<Hash, Vec<u8>>, depth: usize) -> Result<Node> {
    if depth > MAX_DEPTH {
        return Err(XmitError::Other(format!(
            "directory nesting exceeds {MAX_DEPTH} levels at '{}' (symlink cycle?)",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir).map_err(|e| XmitError::Ingest {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut children = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| XmitError::Ingest {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| XmitError::Other(format!("non-UTF-8 entry name {raw:?} in '{}'", dir.display())))?;
        let path = entry.path();

        // Resolves symlinks, so a link to a directory is walked and a link
        // to a file is read; a broken link fails the ingestion.
        let meta = fs::metadata(&path).map_err(|e| XmitError::Ingest {
            path: path.clone(),
            source: e,
        })?;

        if meta.is_dir() {
            if name == ".git" {
                debug!("skipping {}", path.display());
                continue;
            }
            let child = traverse(&path, contents, depth + 1)?;
            children.insert(name, child);
        } else if meta.is_file() {
            let bytes = fs::read(&path).map_err(|e| XmitError::Ingest {
                path: path.clone(),
                source: e,
            })?;
            let hash = Hash::compute(&bytes);
            contents.insert(hash, bytes);
            children.insert(name, Node::file(hash));
        } else {
            warn!("skipping {} (not a regular file or directory)", path.display());
        }
    }
    Ok(Node::dir(children))
}
