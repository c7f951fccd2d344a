//! End-to-end command tests against an in-process mock of the publication
//! service, covering the full suggest/bundle/missing/finalize machine and
//! the download path.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};

use minicbor::bytes::ByteVec;
use xmit_core::commands::{download, upload};
use xmit_core::Config;
use xmit_protocol::tree::{decode_manifest, encode_manifest};
use xmit_protocol::wire::{
    FinalizeRequest, FinalizeResponse, ManifestDownloadRequest, ManifestDownloadResponse,
    ManifestUploadRequest, ManifestUploadResponse, PartsDownloadRequest, PartsDownloadResponse,
    PartsUploadRequest, PartsUploadResponse, SuggestRequest, SuggestResponse,
};
use xmit_protocol::Node;
use xmit_transfer::codec;
use xmit_types::Hash;

const KEY: &str = "test-key";

// ---------------------------------------------------------------------------
// Mock service
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ServiceState {
    manifests: HashMap<Hash, Vec<u8>>,
    parts: HashMap<Hash, Vec<u8>>,
    published: Option<Hash>,
    calls: Vec<String>,
    part_fetches: usize,
}

impl ServiceState {
    fn seed_tree(&mut self, root: &Node, contents: &HashMap<Hash, Vec<u8>>) {
        let bytes = encode_manifest(root).unwrap();
        let id = Hash::compute(&bytes);
        self.manifests.insert(id, bytes);
        for (hash, body) in contents {
            self.parts.insert(*hash, body.clone());
        }
        self.published = Some(id);
    }

    fn missing_for(&self, manifest: &[u8]) -> Vec<Hash> {
        let root = decode_manifest(manifest).unwrap();
        let mut out = Vec::new();
        collect_leaves(&root, &mut out);
        out.retain(|h| !self.parts.contains_key(h));
        out.sort_by_key(|h| *h.as_bytes());
        out.dedup();
        out
    }
}

fn collect_leaves(node: &Node, out: &mut Vec<Hash>) {
    if let Some(hash) = node.hash {
        out.push(hash);
    }
    for child in node.children.values() {
        collect_leaves(child, out);
    }
}

struct MockService {
    url: String,
    state: Arc<Mutex<ServiceState>>,
}

impl MockService {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let state = Arc::new(Mutex::new(ServiceState::default()));

        let service_url = url.clone();
        let handler_state = Arc::clone(&state);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let state = Arc::clone(&handler_state);
                let service_url = service_url.clone();
                std::thread::spawn(move || serve_connection(stream, state, service_url));
            }
        });

        MockService { url, state }
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn config(&self) -> Config {
        Config {
            base_url: self.url.clone(),
            key: Some(KEY.to_string()),
            upload_parallelism: 2,
            download_parallelism: 2,
        }
    }
}

fn serve_connection(stream: TcpStream, state: Arc<Mutex<ServiceState>>, service_url: String) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() || request_line.is_empty() {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(v) = line
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(str::trim)
        {
            content_length = v.parse().unwrap();
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();

    let (content_type, reply) = route(&path, &body, &state, &service_url);
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.len()
    )
    .unwrap();
    stream.write_all(&reply).unwrap();
    stream.flush().unwrap();
}

fn route(
    path: &str,
    body: &[u8],
    state: &Mutex<ServiceState>,
    service_url: &str,
) -> (&'static str, Vec<u8>) {
    match path {
        "/.well-known/web-publication-protocol" => (
            "application/json",
            format!(
                r#"{{"protocols":["xmit/0"],"url":"{service_url}","apiKeyManagementUrl":"{service_url}/admin"}}"#
            )
            .into_bytes(),
        ),
        "/api/0/suggest" => {
            let req: SuggestRequest = codec::decode_payload(body).unwrap();
            assert_eq!(req.key, KEY);
            let mut st = state.lock().unwrap();
            st.calls.push("suggest".into());
            let (present, missing) = match st.manifests.get(&req.id) {
                Some(manifest) => {
                    let manifest = manifest.clone();
                    (true, st.missing_for(&manifest))
                }
                None => (false, Vec::new()),
            };
            let resp = SuggestResponse {
                success: true,
                errors: None,
                warnings: None,
                messages: None,
                present: Some(present),
                missing: Some(missing),
            };
            ("application/cbor+zstd", codec::encode_payload(&resp).unwrap())
        }
        "/api/0/bundle" => {
            let req: ManifestUploadRequest = codec::decode_payload(body).unwrap();
            assert_eq!(req.key, KEY);
            let mut st = state.lock().unwrap();
            st.calls.push("bundle".into());
            let bytes = req.bundle.to_vec();
            let id = Hash::compute(&bytes);
            let missing = st.missing_for(&bytes);
            st.manifests.insert(id, bytes);
            let resp = ManifestUploadResponse {
                success: true,
                errors: None,
                warnings: None,
                messages: None,
                id: Some(id),
                missing: Some(missing),
            };
            ("application/cbor+zstd", codec::encode_payload(&resp).unwrap())
        }
        "/api/0/missing" => {
            let req: PartsUploadRequest = codec::decode_payload(body).unwrap();
            assert_eq!(req.key, KEY);
            let mut st = state.lock().unwrap();
            st.calls.push("missing".into());
            for part in &req.parts {
                st.parts.insert(Hash::compute(part), part.to_vec());
            }
            let resp = PartsUploadResponse {
                success: true,
                errors: None,
                warnings: None,
                messages: None,
            };
            ("application/cbor+zstd", codec::encode_payload(&resp).unwrap())
        }
        "/api/0/finalize" => {
            let req: FinalizeRequest = codec::decode_payload(body).unwrap();
            let mut st = state.lock().unwrap();
            st.calls.push("finalize".into());
            let complete = match st.manifests.get(&req.id) {
                Some(manifest) => {
                    let manifest = manifest.clone();
                    st.missing_for(&manifest).is_empty()
                }
                None => false,
            };
            let resp = if complete {
                st.published = Some(req.id);
                FinalizeResponse {
                    success: true,
                    errors: None,
                    warnings: None,
                    messages: Some(vec!["snapshot published".into()]),
                }
            } else {
                FinalizeResponse {
                    success: false,
                    errors: Some(vec!["bundle incomplete".into()]),
                    warnings: None,
                    messages: None,
                }
            };
            ("application/cbor+zstd", codec::encode_payload(&resp).unwrap())
        }
        "/api/0/dl/bundle" => {
            let req: ManifestDownloadRequest = codec::decode_payload(body).unwrap();
            assert_eq!(req.key, KEY);
            let mut st = state.lock().unwrap();
            st.calls.push("dl/bundle".into());
            let bundle = match &req.id {
                Some(id) => Hash::from_hex(id).ok().and_then(|h| st.manifests.get(&h)),
                None => st.published.and_then(|id| st.manifests.get(&id)),
            }
            .cloned();
            let resp = match bundle {
                Some(bytes) => ManifestDownloadResponse {
                    success: true,
                    errors: None,
                    warnings: None,
                    messages: None,
                    bundle: Some(ByteVec::from(bytes)),
                },
                None => ManifestDownloadResponse {
                    success: false,
                    errors: Some(vec!["no such snapshot".into()]),
                    warnings: None,
                    messages: None,
                    bundle: None,
                },
            };
            ("application/cbor+zstd", codec::encode_payload(&resp).unwrap())
        }
        "/api/0/dl/parts" => {
            let req: PartsDownloadRequest = codec::decode_payload(body).unwrap();
            let mut st = state.lock().unwrap();
            st.calls.push("dl/parts".into());
            st.part_fetches += 1;
            let parts: Option<Vec<ByteVec>> = req
                .hashes
                .iter()
                .map(|h| st.parts.get(h).cloned().map(ByteVec::from))
                .collect();
            let resp = match parts {
                Some(parts) => PartsDownloadResponse {
                    success: true,
                    errors: None,
                    warnings: None,
                    messages: None,
                    parts: Some(parts),
                },
                None => PartsDownloadResponse {
                    success: false,
                    errors: Some(vec!["unknown part".into()]),
                    warnings: None,
                    messages: None,
                    parts: None,
                },
            };
            ("application/cbor+zstd", codec::encode_payload(&resp).unwrap())
        }
        other => panic!("unexpected request path {other}"),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write(dir: &Path, rel: &str, contents: &[u8]) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[test]
fn publishes_a_fresh_bundle() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();
    write(site.path(), "index.html", b"<html>hello</html>");
    write(site.path(), "assets/app.js", b"console.log(1)");
    write(site.path(), "assets/copy.js", b"console.log(1)");

    let stats = upload::run(&service.config(), "example.com", site.path()).unwrap();

    // Two distinct bodies across three files.
    assert_eq!(stats.files, 2);
    assert_eq!(stats.parts_uploaded, 2);
    assert_eq!(stats.chunks_uploaded, 1);

    let calls = service.calls();
    assert_eq!(calls, vec!["suggest", "bundle", "missing", "finalize"]);

    let st = service.state.lock().unwrap();
    let published = st.published.expect("finalize must publish");
    let root = decode_manifest(&st.manifests[&published]).unwrap();
    assert_eq!(
        root.children["index.html"].hash,
        Some(Hash::compute(b"<html>hello</html>"))
    );
    assert_eq!(
        st.parts[&Hash::compute(b"console.log(1)")],
        b"console.log(1)"
    );
}

#[test]
fn publishes_a_single_byte_file() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();
    write(site.path(), "a", b"X");

    let stats = upload::run(&service.config(), "example.com", site.path()).unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.parts_uploaded, 1);
    assert_eq!(service.calls(), vec!["suggest", "bundle", "missing", "finalize"]);

    let st = service.state.lock().unwrap();
    let hash = Hash::compute(b"X");
    let root = decode_manifest(&st.manifests[&st.published.unwrap()]).unwrap();
    assert_eq!(root.children["a"].hash, Some(hash));
    assert_eq!(st.parts[&hash], b"X");
}

#[test]
fn second_publish_of_identical_tree_transfers_nothing() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();
    write(site.path(), "index.html", b"stable content");

    upload::run(&service.config(), "example.com", site.path()).unwrap();
    service.clear_calls();

    let stats = upload::run(&service.config(), "example.com", site.path()).unwrap();
    assert_eq!(stats.parts_uploaded, 0);
    assert_eq!(service.calls(), vec!["suggest", "finalize"]);
}

#[test]
fn empty_directory_publishes_without_uploads() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();

    // The canonical empty manifest is already known to the service.
    service
        .state
        .lock()
        .unwrap()
        .seed_tree(&Node::default(), &HashMap::new());

    let stats = upload::run(&service.config(), "example.com", site.path()).unwrap();
    assert_eq!(stats.files, 0);
    assert_eq!(stats.parts_uploaded, 0);
    assert_eq!(service.calls(), vec!["suggest", "finalize"]);
}

#[test]
fn changed_file_uploads_only_the_delta() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();
    write(site.path(), "index.html", b"v1");
    write(site.path(), "big.bin", &vec![7u8; 4096]);

    upload::run(&service.config(), "example.com", site.path()).unwrap();
    service.clear_calls();

    write(site.path(), "index.html", b"v2");
    let stats = upload::run(&service.config(), "example.com", site.path()).unwrap();

    // Only the changed body travels; big.bin is deduplicated away.
    assert_eq!(stats.parts_uploaded, 1);
    assert_eq!(service.calls(), vec!["suggest", "bundle", "missing", "finalize"]);
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[test]
fn download_round_trip_then_idempotent_rerun() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();
    write(site.path(), "index.html", b"<html>round trip</html>");
    write(site.path(), "assets/app.js", b"let x = 1;");
    write(site.path(), "assets/deep/data.bin", &[0u8, 1, 2, 3, 255]);

    upload::run(&service.config(), "example.com", site.path()).unwrap();

    let dest = tempfile::tempdir().unwrap();
    let stats = download::run(&service.config(), "example.com", None, dest.path()).unwrap();
    assert_eq!(stats.files_written, 3);
    assert_eq!(stats.files_skipped, 0);

    for rel in ["index.html", "assets/app.js", "assets/deep/data.bin"] {
        assert_eq!(
            std::fs::read(dest.path().join(rel)).unwrap(),
            std::fs::read(site.path().join(rel)).unwrap(),
            "mismatch for {rel}"
        );
    }

    // A second run finds every file already correct and fetches no parts.
    let fetches_before = service.state.lock().unwrap().part_fetches;
    let stats = download::run(&service.config(), "example.com", None, dest.path()).unwrap();
    assert_eq!(stats.files_written, 0);
    assert_eq!(stats.files_skipped, 3);
    assert_eq!(service.state.lock().unwrap().part_fetches, fetches_before);
}

#[test]
fn download_by_explicit_snapshot_id() {
    let service = MockService::start();
    let site = tempfile::tempdir().unwrap();
    write(site.path(), "only.txt", b"pinned");

    upload::run(&service.config(), "example.com", site.path()).unwrap();
    let id = service.state.lock().unwrap().published.unwrap().to_hex();

    let dest = tempfile::tempdir().unwrap();
    download::run(&service.config(), "example.com", Some(&id), dest.path()).unwrap();
    assert_eq!(std::fs::read(dest.path().join("only.txt")).unwrap(), b"pinned");
}

#[test]
fn hostile_manifest_fails_without_escaping_destination() {
    let service = MockService::start();

    // A manifest whose child name climbs out of the destination.
    let body = b"malicious".to_vec();
    let hash = Hash::compute(&body);
    let mut root = Node::default();
    root.children
        .insert("../evil".to_string(), Node::file(hash));
    let contents = HashMap::from([(hash, body)]);
    service.state.lock().unwrap().seed_tree(&root, &contents);

    let parent = tempfile::tempdir().unwrap();
    let dest = parent.path().join("dest");
    let err = download::run(&service.config(), "example.com", None, &dest).unwrap_err();
    assert!(err.to_string().contains("failed"), "got: {err}");
    assert!(
        !parent.path().join("evil").exists(),
        "traversal escaped the destination"
    );
}

#[test]
fn missing_snapshot_is_a_server_error() {
    let service = MockService::start();
    let dest = tempfile::tempdir().unwrap();
    let err = download::run(&service.config(), "example.com", None, dest.path()).unwrap_err();
    assert!(err.to_string().contains("no such snapshot"), "got: {err}");
}
