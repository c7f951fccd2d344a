//! The upload state machine: discover, ingest, suggest, fill in the gaps,
//! finalize.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, error, info};
use xmit_protocol::tree::encode_manifest;
use xmit_transfer::{discover, Uploader};
use xmit_types::{Hash, Result, XmitError};

use crate::chunk;
use crate::config::Config;
use crate::ingest;

use super::check_response;

#[derive(Debug, Default)]
pub struct UploadStats {
    pub files: usize,
    pub total_bytes: u64,
    pub parts_uploaded: usize,
    pub chunks_uploaded: usize,
}

/// Publish `directory` to `domain`.
pub fn run(config: &Config, domain: &str, directory: &Path) -> Result<UploadStats> {
    let discovery = discover(&config.base_url)?;
    debug!("using service URL {}", discovery.url);
    let key = config.require_key(discovery.api_key_management_url.as_deref())?;

    let uploader = Uploader::new(&discovery.url, config.upload_parallelism)?;

    info!("bundling {}", directory.display());
    let ingestion = ingest::ingest(directory)?;
    let mut stats = UploadStats {
        files: ingestion.part_count(),
        total_bytes: ingestion.total_bytes(),
        ..UploadStats::default()
    };
    let mut contents = ingestion.contents;

    let manifest = encode_manifest(&ingestion.root).map_err(|e| XmitError::Encode(e.to_string()))?;
    let id = Hash::compute(&manifest);
    info!(
        "bundled {} part(s), {} bytes, bundle ID {id}",
        stats.files, stats.total_bytes
    );

    // The server answers with what it is missing; anything it already has —
    // from any prior upload by anyone — is never transmitted again.
    let suggest = uploader.suggest(key, domain, id)?;
    check_response(&suggest.notes())?;

    let mut taken = HashSet::new();
    let mut to_upload = Vec::new();
    collect_missing(suggest.missing(), &mut contents, &mut taken, &mut to_upload)?;

    if !suggest.present() {
        let manifest_resp = uploader.upload_manifest(key, domain, manifest)?;
        check_response(&manifest_resp.notes())?;
        collect_missing(
            manifest_resp.missing(),
            &mut contents,
            &mut taken,
            &mut to_upload,
        )?;
    } else {
        debug!("manifest already known to the server");
    }

    if !to_upload.is_empty() {
        stats.parts_uploaded = to_upload.len();
        chunk::sort_largest_first(&mut to_upload);
        let chunks = chunk::pack(to_upload, chunk::MAX_CHUNK_BYTES);
        stats.chunks_uploaded = chunks.len();
        info!(
            "uploading {} missing part(s) in {} chunk(s)",
            stats.parts_uploaded, stats.chunks_uploaded
        );

        let results = uploader.upload_chunks(key, domain, chunks);
        let mut failed = 0usize;
        for result in &results {
            match &result.response {
                Ok(response) => {
                    if let Err(e) = check_response(&response.notes()) {
                        error!("chunk {}: {e}", result.index + 1);
                        failed += 1;
                    }
                }
                Err(e) => {
                    error!("chunk {}: {e}", result.index + 1);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(XmitError::Other(format!(
                "{failed} of {} chunk upload(s) failed",
                results.len()
            )));
        }
    } else {
        info!("server already has every part");
    }

    let finalize = uploader.finalize(key, domain, id)?;
    check_response(&finalize.notes())?;
    info!("published {domain}");
    Ok(stats)
}

/// Move the bodies for `missing` out of the content map. Hashes already
/// collected (a server may repeat one across phases) are skipped; a hash this
/// bundle never produced is an error.
fn collect_missing(
    missing: &[Hash],
    contents: &mut HashMap<Hash, Vec<u8>>,
    taken: &mut HashSet<Hash>,
    to_upload: &mut Vec<Vec<u8>>,
) -> Result<()> {
    for hash in missing {
        if taken.contains(hash) {
            continue;
        }
        match contents.remove(hash) {
            Some(bytes) => {
                taken.insert(*hash);
                to_upload.push(bytes);
            }
            None => {
                return Err(XmitError::Other(format!(
                    "server requested a part this bundle does not contain: {hash}"
                )))
            }
        }
    }
    Ok(())
}
