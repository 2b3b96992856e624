//! Owns every piece of pipeline state and exposes the tick entry points.
//!
//! All methods run on the host's main thread. Download workers only touch
//! their `ThreadCom`; everything else is reconciled here.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hana3d_cache::CacheLayout;
use log::{debug, error, info, warn};

use crate::append::{self, AppendQueue, AppendTask};
use crate::asset::{AssetDescriptor, GridPlacer, Placement, PlacementArgs};
use crate::config::PipelineConfig;
use crate::downloads::{DownloadRegistry, Downloader, Transport};
use crate::host::{PropertyPath, PropertyValue, ReportLevel, SceneHost};
use crate::process::{ProcessKind, ProcessMonitor, ThumbnailJob, ThumbnailRequest};
use crate::Error;

/// What [`Orchestrator::start_download`] did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StartOutcome {
    /// Placements were added to the running download of the same asset
    Coalesced,
    /// A download of the same asset is running and cannot take more placements
    Ignored,
    /// The file is on disk and the asset is in the scene; appended directly
    Queued,
    /// A new download thread was started
    Spawned,
    /// A cancelled download of the same asset is still winding down; the
    /// request starts once its thread exits
    Deferred,
}

pub struct Orchestrator<H: SceneHost> {
    config: PipelineConfig,
    layout: CacheLayout,
    host: H,
    transport: Arc<dyn Transport>,
    downloads: DownloadRegistry,
    appends: AppendQueue,
    /// Requests waiting for a stopped worker of the same asset to exit
    deferred: Vec<(AssetDescriptor, PlacementArgs)>,
    processes: ProcessMonitor,
}

impl<H: SceneHost> Orchestrator<H> {
    pub fn new(config: PipelineConfig, host: H, transport: Arc<dyn Transport>) -> Self {
        let processes = ProcessMonitor::new(
            Duration::from_millis(config.polling.processes_active_ms),
            Duration::from_millis(config.polling.processes_idle_ms),
        );
        Self {
            layout: config.cache_layout(),
            config,
            host,
            transport,
            downloads: DownloadRegistry::new(),
            appends: AppendQueue::new(),
            deferred: Vec::new(),
            processes,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn downloads(&self) -> &DownloadRegistry {
        &self.downloads
    }

    pub fn appends(&self) -> &AppendQueue {
        &self.appends
    }

    pub fn processes(&self) -> &ProcessMonitor {
        &self.processes
    }

    /// Nothing downloading, queued or rendering
    pub fn is_idle(&self) -> bool {
        self.downloads.is_empty()
            && self.deferred.is_empty()
            && self.appends.is_empty()
            && self.processes.is_empty()
    }

    /// The open document moved; project copies follow it
    pub fn set_project_dir(&mut self, project_dir: Option<PathBuf>) {
        self.layout.set_project_dir(project_dir);
    }

    fn download_paths(&self, asset: &AssetDescriptor) -> Vec<PathBuf> {
        self.layout.download_paths(&asset.cache_entry())
    }

    // ===== Downloads =====

    /// Request `asset` with the given placements.
    ///
    /// Never blocks on the network: either coalesces into a running
    /// download, queues an append for a file already in use, or starts a
    /// download thread.
    pub fn start_download(
        &mut self,
        asset: AssetDescriptor,
        mut args: PlacementArgs,
    ) -> Result<StartOutcome, Error> {
        let view_id = asset.view_id.clone();

        if let Some(running) = self.downloads.alive(&view_id) {
            if running.is_stopped() {
                debug!("Download of '{}' is stopping, deferring request", asset.name);
                self.defer(asset, args);
                return Ok(StartOutcome::Deferred);
            }
            if asset.asset_type.supports_multiple_placements() {
                debug!(
                    "Asset '{}' is already downloading, adding {} placement(s)",
                    asset.name,
                    args.placements.len()
                );
                running.thread_com().add_placements(args.placements);
                return Ok(StartOutcome::Coalesced);
            }
            warn!("Asset '{}' is already being downloaded", asset.name);
            return Ok(StartOutcome::Ignored);
        }

        // A finished thread the download tick has not seen yet still holds
        // placements or an error; neither may get lost.
        if let Some(previous) = self.downloads.remove(&view_id) {
            let unseen =
                !previous.finished() && !previous.marked_remove() && !previous.is_stopped();
            let tcom = previous.thread_com();
            if unseen && tcom.has_error() {
                self.host.report(ReportLevel::Error, &tcom.report());
            } else if unseen {
                let mut placements = tcom.passargs().placements;
                placements.append(&mut args.placements);
                args.placements = placements;
            }
        }

        let paths = self.download_paths(&asset);
        let exists = hana3d_cache::check_existing(&paths, asset.created)?;
        let in_scene = self.host.asset_usage(&view_id).is_some();

        if exists && in_scene && !args.force {
            info!("Asset '{}' already available, appending", asset.name);
            self.appends.push(AppendTask::new(asset, args));
            return Ok(StartOutcome::Queued);
        }

        self.spawn_download(asset, args, paths)?;
        Ok(StartOutcome::Spawned)
    }

    fn spawn_download(
        &mut self,
        asset: AssetDescriptor,
        args: PlacementArgs,
        paths: Vec<PathBuf>,
    ) -> Result<(), Error> {
        let downloader = Downloader::spawn(
            asset,
            args,
            paths,
            self.transport.clone(),
            self.config.polling.chunk_size,
        )?;
        self.downloads.insert(downloader);
        Ok(())
    }

    /// Stop the download of `view_id` and drop its queued appends.
    /// Returns false when there was nothing to cancel.
    ///
    /// A worker still streaming stays registered until its thread exits, so
    /// no second worker for the asset can start writing next to it.
    pub fn cancel_download(&mut self, view_id: &str) -> bool {
        let mut stopped = false;
        if let Some(downloader) = self.downloads.get(view_id) {
            if !downloader.is_stopped() {
                downloader.stop();
                stopped = true;
                info!("Cancellation requested for asset '{}'", downloader.asset().name);
            }
            if !downloader.is_alive() {
                self.downloads.remove(view_id);
            }
        }

        let before = self.deferred.len();
        self.deferred.retain(|(asset, _)| asset.view_id != view_id);
        let dropped = before - self.deferred.len();

        let evicted = self.appends.evict(view_id);
        if evicted > 0 {
            debug!("Evicted {} queued append(s) for {}", evicted, view_id);
        }
        stopped || dropped > 0 || evicted > 0
    }

    /// Hold a request until the stopped worker of the same asset is gone
    fn defer(&mut self, asset: AssetDescriptor, mut args: PlacementArgs) {
        match self
            .deferred
            .iter_mut()
            .find(|(waiting, _)| waiting.view_id == asset.view_id)
        {
            Some((_, waiting)) => {
                waiting.placements.append(&mut args.placements);
                waiting.force |= args.force;
                waiting.redownload |= args.redownload;
            }
            None => self.deferred.push((asset, args)),
        }
    }

    /// Start deferred requests whose stopped worker has exited
    fn resume_deferred(&mut self) {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|(asset, _)| {
                !self
                    .downloads
                    .alive(&asset.view_id)
                    .is_some_and(Downloader::is_stopped)
            });
        self.deferred = waiting;

        for (asset, args) in ready {
            let name = asset.name.clone();
            let restarted = if args.redownload {
                self.restart_redownload(asset, args)
            } else {
                self.start_download(asset, args).map(|_| ())
            };
            if let Err(e) = restarted {
                error!("Deferred download of '{}' failed to start: {}", name, e);
                self.host.report(
                    ReportLevel::Error,
                    &format!("Could not download {}: {}", name, e.user_message()),
                );
            }
        }
    }

    fn restart_redownload(
        &mut self,
        asset: AssetDescriptor,
        args: PlacementArgs,
    ) -> Result<(), Error> {
        if self.downloads.alive(&asset.view_id).is_some() {
            return Ok(());
        }
        self.downloads.remove(&asset.view_id);
        let paths = self.download_paths(&asset);
        self.spawn_download(asset, args, paths)
    }

    /// Download the first `batch_size` results laid out on a grid.
    /// Refused while any download is registered. Returns how many started.
    pub fn batch_download(
        &mut self,
        results: &[AssetDescriptor],
        batch_size: usize,
        placer: &mut GridPlacer,
    ) -> Result<usize, Error> {
        if !self.downloads.is_empty() {
            self.host
                .report(ReportLevel::Warning, "Wait until all downloads complete");
            return Ok(0);
        }

        let mut started = 0;
        for asset in results.iter().take(batch_size) {
            let placement = Placement::at(placer.next_location());
            self.start_download(asset.clone(), PlacementArgs::single(placement))?;
            started += 1;
        }
        info!("Batch download started for {} asset(s)", started);
        Ok(started)
    }

    /// Reconcile download threads with the scene. Returns the next delay.
    pub fn download_tick(&mut self) -> Duration {
        let polling = &self.config.polling;
        if self.downloads.is_empty() && self.deferred.is_empty() {
            return Duration::from_millis(polling.downloads_idle_ms);
        }

        let mut completed = Vec::new();
        for downloader in self.downloads.iter_mut() {
            if downloader.finished() || downloader.marked_remove() {
                continue;
            }

            let view_id = downloader.view_id().to_string();
            let tcom = downloader.thread_com().clone();

            if downloader.is_alive() {
                if downloader.is_stopped() {
                    continue;
                }
                if !self.host.update_search_progress(&view_id, tcom.progress()) {
                    debug!("No search result to mirror progress of {}", view_id);
                }
                continue;
            }

            if downloader.is_stopped() {
                downloader.mark_remove();
                continue;
            }

            if tcom.has_error() {
                self.host.report(ReportLevel::Error, &tcom.report());
                downloader.mark_remove();
                continue;
            }

            if downloader.asset().asset_type.requires_object_mode() && self.host.is_edit_mode() {
                continue;
            }

            tcom.complete();
            self.host.update_search_progress(&view_id, tcom.progress());

            let args = tcom.passargs();
            if args.redownload {
                // Nothing to append: the library only needs its file back
                downloader.mark_remove();
            } else {
                downloader.finish();
            }
            completed.push((downloader.asset().clone(), args));
        }

        self.downloads.sweep_removed();
        self.resume_deferred();

        for (asset, args) in completed {
            if args.redownload {
                self.relink_library(&asset);
            } else {
                self.appends.push(AppendTask::new(asset, args));
            }
        }

        Duration::from_millis(self.config.polling.downloads_active_ms)
    }

    fn relink_library(&mut self, asset: &AssetDescriptor) {
        let paths = self.download_paths(asset);
        let Some(file) = paths.last() else {
            return;
        };
        match self.host.relink_library(&asset.view_id, file) {
            Ok(()) => info!("Relinked library of '{}' to {:?}", asset.name, file),
            Err(e) => self.host.report(
                ReportLevel::Error,
                &format!("Could not reload library of {}: {}", asset.name, e),
            ),
        }
    }

    // ===== Appends =====

    /// Execute at most one queued append. Returns the next delay.
    pub fn append_tick(&mut self) -> Duration {
        let polling = &self.config.polling;
        if self.appends.is_empty() {
            return Duration::from_millis(polling.append_idle_ms);
        }
        if self.downloads.any_alive() {
            return Duration::from_millis(polling.append_wait_ms);
        }
        let next = Duration::from_millis(polling.append_next_ms);

        let Some(task) = self.appends.pop() else {
            return next;
        };

        match append::append_asset(&mut self.host, &self.layout, &self.config.import, &task) {
            Ok(imported) => debug!("Appended '{}' as {:?}", task.asset.name, imported),
            Err(e) => {
                error!("Append of '{}' failed: {}", task.asset.name, e);
                hana3d_cache::remove_files(&self.download_paths(&task.asset));
                self.host.report(
                    ReportLevel::Error,
                    &format!(
                        "Error when appending {} to scene: {}",
                        task.asset.name,
                        e.user_message()
                    ),
                );
            }
        }
        self.downloads.remove_finished(&task.asset.view_id);

        next
    }

    // ===== Background processes =====

    pub fn process_tick(&mut self) -> Duration {
        self.processes.tick(&mut self.host)
    }

    /// Start rendering a thumbnail in a background renderer.
    ///
    /// Returns the image path the renderer will write. On failure the busy
    /// flag is cleared again and the error is reported.
    pub fn generate_thumbnail(&mut self, request: ThumbnailRequest) -> Result<PathBuf, Error> {
        let busy = request.busy_property();
        let status = request.status_property();

        self.set_property(&busy, PropertyValue::Bool(true));
        self.set_property(&status, PropertyValue::Text("starting blender instance".into()));

        match self.launch_thumbnail(request, busy.clone(), status.clone()) {
            Ok(thumbnail) => Ok(thumbnail),
            Err(e) => {
                self.set_property(&busy, PropertyValue::Bool(false));
                self.set_property(&status, PropertyValue::Text(String::new()));
                self.host.report(
                    ReportLevel::Error,
                    &format!("Error in thumbnailer: {}", e.user_message()),
                );
                Err(e)
            }
        }
    }

    fn launch_thumbnail(
        &mut self,
        request: ThumbnailRequest,
        busy: PropertyPath,
        status: PropertyPath,
    ) -> Result<PathBuf, Error> {
        let job = ThumbnailJob::prepare(request, &self.config.renderer)?;
        if let Err(e) = self.start_renderer(&job, busy, status) {
            if let Err(cleanup) = fs::remove_dir_all(job.temp_dir()) {
                warn!("Failed to remove {:?}: {}", job.temp_dir(), cleanup);
            }
            return Err(e);
        }

        let request = job.request();
        if !request.save_only {
            self.set_property(
                &request.thumbnail_property(),
                PropertyValue::Text(job.relative_thumbnail()),
            );
        }
        Ok(job.thumbnail().to_path_buf())
    }

    fn start_renderer(
        &mut self,
        job: &ThumbnailJob,
        busy: PropertyPath,
        status: PropertyPath,
    ) -> Result<(), Error> {
        self.host.save_document_copy(job.scene_file())?;
        let child = job.spawn()?;
        self.processes.add_process(
            job.request().target(),
            child,
            busy,
            status,
            ProcessKind::Thumbnailer,
            &mut self.host,
        )?;
        Ok(())
    }

    /// Kill the background process working on `id`.
    /// Returns false when none was running.
    pub fn kill_process(&mut self, id: &PropertyPath) -> bool {
        self.processes.kill(id, &mut self.host)
    }

    fn set_property(&mut self, path: &PropertyPath, value: PropertyValue) {
        if let Err(e) = self.host.set_property(path, value) {
            warn!("Failed to update {}: {}", path, e);
        }
    }

    // ===== Lifecycle =====

    /// A different document was opened.
    ///
    /// Drops work meant for the previous document, then recovers linked
    /// libraries whose files went missing. Returns how many libraries were
    /// sent for download again.
    pub fn on_document_load(&mut self) -> Result<usize, Error> {
        self.downloads.stop_all();
        self.deferred.clear();
        self.appends.clear();

        let mut redownloads = 0;
        for library in self.host.broken_libraries() {
            let asset = library.asset;
            let paths = self.download_paths(&asset);

            if hana3d_cache::check_existing(&paths, asset.created)? {
                match self.host.reload_library(&asset.view_id) {
                    Ok(()) => {
                        info!("Reloaded library of '{}'", asset.name);
                        continue;
                    }
                    Err(e) => warn!("Reload of '{}' failed: {}", asset.name, e),
                }
            }

            info!("Downloading missing library of '{}'", asset.name);
            if self.downloads.alive(&asset.view_id).is_some() {
                // Stopped above; its thread has not exited yet
                self.defer(asset, PlacementArgs::redownload());
            } else {
                self.spawn_download(asset, PlacementArgs::redownload(), paths)?;
            }
            redownloads += 1;
        }
        Ok(redownloads)
    }

    /// The document is being saved: drop linked libraries nothing uses any
    /// more. Returns how many were removed.
    pub fn on_document_save(&mut self) -> usize {
        let mut removed = 0;
        for file in self.host.unused_libraries() {
            match self.host.remove_library(&file) {
                Ok(()) => {
                    info!("Removed unused library {:?}", file);
                    removed += 1;
                }
                Err(e) => warn!("Could not remove unused library {:?}: {}", file, e),
            }
        }
        removed
    }

    /// Stop all downloads, drop queued appends and kill renderers
    pub fn shutdown(&mut self) {
        info!("Shutting down asset pipeline");
        self.downloads.stop_all();
        self.deferred.clear();
        self.appends.clear();
        self.processes.kill_all(&mut self.host);
    }
}
