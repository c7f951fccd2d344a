//! Upload and download engines over the pinned client pool.

use std::io::Cursor;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use minicbor::bytes::ByteVec;
use tracing::{debug, info};
use xmit_protocol::wire::{
    endpoint, FinalizeRequest, FinalizeResponse, ManifestDownloadRequest,
    ManifestDownloadResponse, ManifestUploadRequest, ManifestUploadResponse,
    PartsDownloadRequest, PartsDownloadResponse, PartsUploadRequest, PartsUploadResponse,
    SuggestRequest, SuggestResponse, TeamsRequest, TeamsResponse,
};
use xmit_protocol::CONTENT_TYPE;
use xmit_types::{Hash, Result, XmitError};

use crate::codec;
use crate::progress::ProgressReader;
use crate::resolve::ClientPool;
use crate::semaphore::{Semaphore, SlotReader, SlotRelease};

/// Outcome of one chunk's upload. The result vector is index-aligned with the
/// submitted chunk list; one failing chunk never cancels the others.
#[derive(Debug)]
pub struct ChunkUploadResult {
    pub index: usize,
    pub response: Result<PartsUploadResponse>,
}

fn check_status(
    result: std::result::Result<ureq::Response, ureq::Error>,
    endpoint: &str,
) -> Result<ureq::Response> {
    match result {
        Ok(resp) if resp.status() == 200 => Ok(resp),
        Ok(resp) => Err(XmitError::Status {
            status: resp.status(),
            endpoint: endpoint.to_string(),
        }),
        Err(ureq::Error::Status(status, _)) => Err(XmitError::Status {
            status,
            endpoint: endpoint.to_string(),
        }),
        Err(e) => Err(XmitError::Transport(format!("posting to {endpoint}: {e}"))),
    }
}

/// POST a precomputed payload with a round-robin client and decode the reply.
fn post_record<T: for<'b> minicbor::Decode<'b, ()>>(
    pool: &ClientPool,
    base_url: &str,
    endpoint: &str,
    payload: &[u8],
) -> Result<T> {
    let (_, agent) = pool.pick();
    let url = format!("{base_url}{endpoint}");
    let result = agent
        .post(&url)
        .set("Content-Type", CONTENT_TYPE)
        .send_bytes(payload);
    let response = check_status(result, endpoint)?;
    codec::decode_payload(response.into_reader())
}

/// Drives the upload side of the protocol: suggest, manifest upload, parallel
/// chunk upload, finalize, and team listing.
pub struct Uploader {
    pool: ClientPool,
    base_url: String,
    send_slots: Arc<Semaphore>,
}

impl Uploader {
    /// Resolve the service and prepare for up to `concurrency` chunk bodies
    /// in flight.
    pub fn new(base_url: &str, concurrency: usize) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let pool = ClientPool::resolve(&base_url)?;
        Ok(Self {
            pool,
            base_url,
            send_slots: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    pub fn suggest(&self, key: &str, domain: &str, id: Hash) -> Result<SuggestResponse> {
        let payload = codec::encode_payload(&SuggestRequest {
            key: key.to_string(),
            team: None,
            domain: Some(domain.to_string()),
            id,
        })?;
        debug!("suggesting bundle {id} ({} bytes)", payload.len());
        post_record(&self.pool, &self.base_url, endpoint::SUGGEST, &payload)
    }

    pub fn upload_manifest(
        &self,
        key: &str,
        domain: &str,
        manifest: Vec<u8>,
    ) -> Result<ManifestUploadResponse> {
        let payload = codec::encode_payload(&ManifestUploadRequest {
            key: key.to_string(),
            team: None,
            domain: Some(domain.to_string()),
            bundle: ByteVec::from(manifest),
        })?;
        let (client_idx, agent) = self.pool.pick();
        info!(
            "uploading manifest ({} bytes compressed) via address #{}",
            payload.len(),
            client_idx + 1
        );
        let url = format!("{}{}", self.base_url, endpoint::BUNDLE);
        let body = ProgressReader::new(Cursor::new(&payload[..]), "manifest", payload.len() as u64);
        let result = agent
            .post(&url)
            .set("Content-Type", CONTENT_TYPE)
            .set("Content-Length", &payload.len().to_string())
            .send(body);
        let response = check_status(result, endpoint::BUNDLE)?;
        codec::decode_payload(response.into_reader())
    }

    /// Upload chunks in parallel, starting them strictly in index order.
    ///
    /// One worker is spawned per chunk, gated on a start signal from its
    /// predecessor. A worker passes the signal on only after it has acquired
    /// a send slot (or failed to encode), so at most `concurrency` bodies
    /// transmit at once while chunks still enter the send phase in order.
    /// Completion order is unconstrained.
    pub fn upload_chunks(
        &self,
        key: &str,
        domain: &str,
        chunks: Vec<Vec<Vec<u8>>>,
    ) -> Vec<ChunkUploadResult> {
        let count = chunks.len();
        if count == 0 {
            return Vec::new();
        }

        let (txs, rxs): (Vec<_>, Vec<_>) = (0..count).map(|_| mpsc::channel::<()>()).unzip();
        let mut txs = txs.into_iter();
        let first = txs.next().expect("count > 0");
        // Worker i hands txs[i + 1] to its successor; the last has none.
        let mut successors: Vec<Option<Sender<()>>> = txs.map(Some).collect();
        successors.push(None);

        std::thread::scope(|s| {
            let handles: Vec<_> = chunks
                .into_iter()
                .zip(rxs)
                .zip(successors)
                .enumerate()
                .map(|(index, ((parts, start), next))| {
                    s.spawn(move || {
                        // Wait for our turn to enter the send phase.
                        let _ = start.recv();
                        self.upload_chunk(key, domain, index, count, parts, next)
                    })
                })
                .collect();

            let _ = first.send(());

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| ChunkUploadResult {
                    index,
                    response: handle.join().unwrap_or_else(|_| {
                        Err(XmitError::Other("chunk upload worker panicked".into()))
                    }),
                })
                .collect()
        })
    }

    fn upload_chunk(
        &self,
        key: &str,
        domain: &str,
        index: usize,
        count: usize,
        parts: Vec<Vec<u8>>,
        mut next: Option<Sender<()>>,
    ) -> Result<PartsUploadResponse> {
        fn start_next(next: &mut Option<Sender<()>>) {
            if let Some(tx) = next.take() {
                let _ = tx.send(());
            }
        }

        let part_count = parts.len();
        let request = PartsUploadRequest {
            key: key.to_string(),
            team: None,
            domain: Some(domain.to_string()),
            id: None,
            parts: parts.into_iter().map(ByteVec::from).collect(),
        };
        let payload = match codec::encode_payload(&request) {
            Ok(payload) => payload,
            Err(e) => {
                // The pipeline must keep moving even when we cannot encode.
                start_next(&mut next);
                return Err(e);
            }
        };
        // Raw part bytes are no longer needed; keep in-flight memory at
        // roughly one chunk per send slot.
        drop(request);

        self.send_slots.acquire();
        let slot = Arc::new(SlotRelease::new(Arc::clone(&self.send_slots)));
        start_next(&mut next);

        let (client_idx, agent) = self.pool.pick();
        info!(
            "uploading chunk {}/{count} ({part_count} part(s), {} bytes compressed) via address #{}",
            index + 1,
            payload.len(),
            client_idx + 1
        );

        let label = format!("chunk {}/{count}", index + 1);
        let body = SlotReader::new(
            ProgressReader::new(Cursor::new(&payload[..]), label, payload.len() as u64),
            Arc::clone(&slot),
        );
        let url = format!("{}{}", self.base_url, endpoint::MISSING);
        let result = agent
            .post(&url)
            .set("Content-Type", CONTENT_TYPE)
            .set("Content-Length", &payload.len().to_string())
            .send(body);
        // The reader frees the slot at EOF; this covers request-construction
        // and transport failures where the body was never drained.
        slot.release();

        let response = check_status(result, endpoint::MISSING)?;
        debug!("chunk {}/{count} sent, awaiting server", index + 1);
        let decoded = codec::decode_payload(response.into_reader())?;
        info!("chunk {}/{count} done", index + 1);
        Ok(decoded)
    }

    pub fn finalize(&self, key: &str, domain: &str, id: Hash) -> Result<FinalizeResponse> {
        let payload = codec::encode_payload(&FinalizeRequest {
            key: key.to_string(),
            team: None,
            domain: Some(domain.to_string()),
            id,
        })?;
        info!("finalizing bundle {id}");
        post_record(&self.pool, &self.base_url, endpoint::FINALIZE, &payload)
    }

    pub fn list_teams(&self, key: &str) -> Result<TeamsResponse> {
        let payload = codec::encode_payload(&TeamsRequest {
            key: key.to_string(),
            team: None,
            domain: None,
        })?;
        post_record(&self.pool, &self.base_url, endpoint::TEAMS, &payload)
    }
}

/// Drives the download side: manifest fetch plus semaphore-bounded part
/// fetches.
pub struct Downloader {
    pool: ClientPool,
    base_url: String,
    fetch_slots: Semaphore,
}

impl Downloader {
    pub fn new(base_url: &str, concurrency: usize) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let pool = ClientPool::resolve(&base_url)?;
        Ok(Self {
            pool,
            base_url,
            fetch_slots: Semaphore::new(concurrency.max(1)),
        })
    }

    pub fn download_manifest(
        &self,
        key: &str,
        domain: &str,
        id: Option<&str>,
    ) -> Result<ManifestDownloadResponse> {
        let payload = codec::encode_payload(&ManifestDownloadRequest {
            key: key.to_string(),
            team: None,
            domain: Some(domain.to_string()),
            id: id.map(str::to_string),
        })?;
        debug!("fetching manifest for {domain}");
        post_record(&self.pool, &self.base_url, endpoint::DL_BUNDLE, &payload)
    }

    /// Fetch part bodies by hash. Holds a fetch slot for the duration of the
    /// request so at most `concurrency` fetches run at once.
    pub fn download_parts(
        &self,
        key: &str,
        domain: &str,
        hashes: &[Hash],
    ) -> Result<PartsDownloadResponse> {
        let _slot = self.fetch_slots.acquire_guard();
        let payload = codec::encode_payload(&PartsDownloadRequest {
            key: key.to_string(),
            team: None,
            domain: Some(domain.to_string()),
            hashes: hashes.to_vec(),
        })?;
        post_record(&self.pool, &self.base_url, endpoint::DL_PARTS, &payload)
    }
}
