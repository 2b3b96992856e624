//! One worker thread per in-flight asset download.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use super::{DownloadError, ThreadCom, Transfer, Transport};
use crate::asset::{AssetDescriptor, PlacementArgs};

/// Handle to a download worker, owned by the registry.
pub struct Downloader {
    asset: AssetDescriptor,
    tcom: Arc<ThreadCom>,
    stop: CancellationToken,
    marked_remove: bool,
    finished: bool,
    handle: JoinHandle<()>,
}

impl Downloader {
    /// Start downloading `asset` into `destinations` (primary first).
    pub fn spawn(
        asset: AssetDescriptor,
        passargs: PlacementArgs,
        destinations: Vec<PathBuf>,
        transport: Arc<dyn Transport>,
        chunk_size: usize,
    ) -> Result<Self, DownloadError> {
        let tcom = Arc::new(ThreadCom::new(passargs));
        let stop = CancellationToken::new();

        let job = DownloadJob {
            asset: asset.clone(),
            destinations,
            tcom: tcom.clone(),
            stop: stop.clone(),
            transport,
            chunk_size: chunk_size.max(1),
        };

        let handle = thread::Builder::new()
            .name(format!("download-{}", asset.view_id))
            .spawn(move || job.run())
            .map_err(|e| DownloadError::Spawn(e.to_string()))?;

        info!("Starting download of asset '{}'", asset.name);

        Ok(Self {
            asset,
            tcom,
            stop,
            marked_remove: false,
            finished: false,
            handle,
        })
    }

    pub fn view_id(&self) -> &str {
        &self.asset.view_id
    }

    pub fn asset(&self) -> &AssetDescriptor {
        &self.asset
    }

    pub fn thread_com(&self) -> &Arc<ThreadCom> {
        &self.tcom
    }

    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Request a cooperative stop; the worker exits at the next chunk boundary
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn mark_remove(&mut self) {
        self.marked_remove = true;
    }

    pub fn marked_remove(&self) -> bool {
        self.marked_remove
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("view_id", &self.asset.view_id)
            .field("progress", &self.tcom.progress())
            .field("alive", &self.is_alive())
            .field("stopped", &self.is_stopped())
            .field("marked_remove", &self.marked_remove)
            .field("finished", &self.finished)
            .finish()
    }
}

enum Outcome {
    AlreadyPresent,
    Stopped,
    Completed,
}

/// Everything the worker thread owns
struct DownloadJob {
    asset: AssetDescriptor,
    destinations: Vec<PathBuf>,
    tcom: Arc<ThreadCom>,
    stop: CancellationToken,
    transport: Arc<dyn Transport>,
    chunk_size: usize,
}

impl DownloadJob {
    fn run(self) {
        match self.transfer() {
            Ok(Outcome::AlreadyPresent) => {
                self.tcom.complete();
                info!(
                    "Asset '{}' already present, not downloading",
                    self.asset.name
                );
            }
            Ok(Outcome::Stopped) => info!("Download of '{}' stopped", self.asset.name),
            Ok(Outcome::Completed) => info!("Download complete: {}", self.asset.name),
            Err(e) => {
                error!("Download of '{}' failed: {}", self.asset.name, e);
                self.tcom.fail(e.user_message());
            }
        }
    }

    fn transfer(&self) -> Result<Outcome, DownloadError> {
        let force = self.tcom.passargs().force;
        if hana3d_cache::check_existing(&self.destinations, self.asset.created)? && !force {
            return Ok(Outcome::AlreadyPresent);
        }

        let target = self
            .destinations
            .first()
            .ok_or_else(|| DownloadError::NoDestination(self.asset.name.clone()))?;

        if self.stop.is_cancelled() {
            return Ok(Outcome::Stopped);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = hana3d_cache::temp_path(target);
        let streamed = self.stream_to(&tmp);
        match streamed {
            Ok(true) => {
                if let Err(e) = fs::rename(&tmp, target) {
                    discard(&tmp);
                    return Err(e.into());
                }
                hana3d_cache::mirror_primary(&self.destinations)?;
                self.tcom.complete();
                Ok(Outcome::Completed)
            }
            Ok(false) => {
                discard(&tmp);
                Ok(Outcome::Stopped)
            }
            Err(e) => {
                discard(&tmp);
                Err(e)
            }
        }
    }

    /// Stream the body into `tmp`. Returns false when stopped midway.
    fn stream_to(&self, tmp: &Path) -> Result<bool, DownloadError> {
        let Transfer {
            content_length,
            mut body,
        } = self.transport.fetch(&self.asset.download_url)?;

        if let Some(size) = content_length {
            self.tcom.set_file_size(size);
        }

        let mut file = BufWriter::new(File::create(tmp)?);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut downloaded = 0u64;

        loop {
            if self.stop.is_cancelled() {
                return Ok(false);
            }

            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DownloadError::Transfer(e.to_string())),
            };

            file.write_all(&buffer[..read])?;
            downloaded += read as u64;
            self.tcom.record_downloaded(downloaded);
        }

        if self.stop.is_cancelled() {
            return Ok(false);
        }

        file.flush()?;
        debug!(
            "Received {} bytes for '{}'",
            downloaded, self.asset.view_id
        );
        Ok(true)
    }
}

fn discard(tmp: &Path) {
    match fs::remove_file(tmp) {
        Ok(()) => debug!("Removed partial download {:?}", tmp),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove partial download {:?}: {}", tmp, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetKind;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    struct StaticTransport {
        body: Vec<u8>,
        content_length: Option<u64>,
    }

    impl Transport for StaticTransport {
        fn fetch(&self, _url: &str) -> Result<Transfer, DownloadError> {
            Ok(Transfer {
                content_length: self.content_length,
                body: Box::new(Cursor::new(self.body.clone())),
            })
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn fetch(&self, _url: &str) -> Result<Transfer, DownloadError> {
            Err(DownloadError::Status(404))
        }
    }

    fn asset() -> AssetDescriptor {
        AssetDescriptor {
            view_id: "v1".into(),
            id: "a1".into(),
            name: "Chair".into(),
            asset_type: AssetKind::Model,
            download_url: "http://x/chair.blend".into(),
            created: None,
            bbox_min: [0.0; 3],
            bbox_max: [1.0; 3],
            tags: vec![],
            libraries: vec![],
            metadata: Default::default(),
        }
    }

    fn wait_until_done(downloader: &Downloader) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while downloader.is_alive() {
            assert!(Instant::now() < deadline, "download thread hung");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_download_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("models/chair_v1/chair.blend");
        let transport = Arc::new(StaticTransport {
            body: b"blend-data".to_vec(),
            content_length: Some(10),
        });

        let downloader = Downloader::spawn(
            asset(),
            PlacementArgs::default(),
            vec![target.clone()],
            transport,
            3,
        )
        .unwrap();
        wait_until_done(&downloader);

        let tcom = downloader.thread_com();
        assert!(!tcom.has_error());
        assert_eq!(tcom.progress(), 100);
        assert_eq!(tcom.downloaded(), 10);
        assert_eq!(fs::read(&target).unwrap(), b"blend-data");
        assert!(!hana3d_cache::temp_path(&target).exists());
    }

    #[test]
    fn test_download_mirrors_to_project_copy() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("g/chair.blend");
        let project = dir.path().join("p/chair.blend");
        let transport = Arc::new(StaticTransport {
            body: b"data".to_vec(),
            content_length: None,
        });

        let downloader = Downloader::spawn(
            asset(),
            PlacementArgs {
                force: true,
                ..PlacementArgs::default()
            },
            vec![global.clone(), project.clone()],
            transport,
            64,
        )
        .unwrap();
        wait_until_done(&downloader);

        assert_eq!(fs::read(&project).unwrap(), b"data");
    }

    #[test]
    fn test_existing_file_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("chair.blend");
        fs::write(&target, "cached").unwrap();

        let downloader = Downloader::spawn(
            asset(),
            PlacementArgs::default(),
            vec![target.clone()],
            Arc::new(FailingTransport),
            64,
        )
        .unwrap();
        wait_until_done(&downloader);

        assert!(!downloader.thread_com().has_error());
        assert_eq!(downloader.thread_com().progress(), 100);
        assert_eq!(fs::read_to_string(&target).unwrap(), "cached");
    }

    #[test]
    fn test_transport_error_goes_to_thread_com() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("chair.blend");

        let downloader = Downloader::spawn(
            asset(),
            PlacementArgs::default(),
            vec![target.clone()],
            Arc::new(FailingTransport),
            64,
        )
        .unwrap();
        wait_until_done(&downloader);

        let tcom = downloader.thread_com();
        assert!(tcom.has_error());
        assert_eq!(tcom.report(), "Asset file not found on the server.");
        assert!(!target.exists());
        assert!(!hana3d_cache::temp_path(&target).exists());
    }

    #[test]
    fn test_flags_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = Downloader::spawn(
            asset(),
            PlacementArgs::default(),
            vec![dir.path().join("chair.blend")],
            Arc::new(FailingTransport),
            64,
        )
        .unwrap();

        downloader.stop();
        assert!(downloader.is_stopped());
        assert!(!downloader.marked_remove());
        assert!(!downloader.finished());

        downloader.finish();
        assert!(downloader.finished());
        assert!(!downloader.marked_remove());
        downloader.mark_remove();
        assert!(downloader.marked_remove());
        wait_until_done(&downloader);
    }
}
