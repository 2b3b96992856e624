#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hana3d_pipeline::asset::{AssetDescriptor, AssetKind};
use hana3d_pipeline::config::{CacheConfig, CacheLocation, PipelineConfig};
use hana3d_pipeline::downloads::{DownloadError, Transfer, Transport};
use hana3d_pipeline::host::HeadlessHost;
use hana3d_pipeline::Orchestrator;

/// In-memory transport whose bodies are fed chunk by chunk from the test.
/// Dropping the sender ends the body.
#[derive(Default)]
pub struct GatedTransport {
    gates: Mutex<HashMap<String, (Option<u64>, Receiver<Vec<u8>>)>>,
    fetches: AtomicUsize,
}

impl GatedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `url` once; returns the chunk feed
    pub fn gate(&self, url: &str, content_length: Option<u64>) -> Sender<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        self.gates
            .lock()
            .unwrap()
            .insert(url.to_string(), (content_length, rx));
        tx
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Transport for GatedTransport {
    fn fetch(&self, url: &str) -> Result<Transfer, DownloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (content_length, rx) = self
            .gates
            .lock()
            .unwrap()
            .remove(url)
            .ok_or(DownloadError::Status(404))?;
        Ok(Transfer {
            content_length,
            body: Box::new(GatedBody {
                rx,
                pending: Vec::new(),
                pos: 0,
            }),
        })
    }
}

struct GatedBody {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for GatedBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pos == self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub fn asset(view_id: &str, kind: AssetKind) -> AssetDescriptor {
    serde_json::from_value(serde_json::json!({
        "view_id": view_id,
        "id": format!("id-{}", view_id),
        "name": view_id.to_uppercase(),
        "asset_type": kind,
        "download_url": format!("http://x/{}.blend", view_id),
        "created": 100,
        "bbox_min": [0.0, 0.0, 0.0],
        "bbox_max": [0.3, 0.3, 0.3],
    }))
    .unwrap()
}

pub fn config(cache_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        cache: CacheConfig {
            global_dir: cache_dir.to_path_buf(),
            project_dir: None,
            location: CacheLocation::Global,
        },
        ..PipelineConfig::default()
    }
}

pub fn orchestrator(
    cache_dir: &Path,
    transport: Arc<GatedTransport>,
) -> Orchestrator<HeadlessHost> {
    Orchestrator::new(config(cache_dir), HeadlessHost::new(), transport)
}

pub fn final_path(orchestrator: &Orchestrator<HeadlessHost>, asset: &AssetDescriptor) -> PathBuf {
    orchestrator.layout().download_paths(&asset.cache_entry())[0].clone()
}

/// Poll `cond` until it holds, panicking after a few seconds
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Run download and append ticks until `cond` holds
pub fn tick_until(
    orchestrator: &mut Orchestrator<HeadlessHost>,
    what: &str,
    mut cond: impl FnMut(&Orchestrator<HeadlessHost>) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        orchestrator.download_tick();
        orchestrator.append_tick();
        if cond(orchestrator) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}
