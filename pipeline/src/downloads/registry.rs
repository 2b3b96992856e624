use std::collections::HashMap;

use log::{debug, warn};

use super::Downloader;

/// Active downloads keyed by asset view id.
///
/// Holds at most one downloader per asset; callers check [`alive`] before
/// spawning a replacement.
///
/// [`alive`]: DownloadRegistry::alive
#[derive(Debug, Default)]
pub struct DownloadRegistry {
    downloads: HashMap<String, Downloader>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.downloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }

    pub fn get(&self, view_id: &str) -> Option<&Downloader> {
        self.downloads.get(view_id)
    }

    /// The downloader for `view_id` if its thread is still running
    pub fn alive(&self, view_id: &str) -> Option<&Downloader> {
        self.downloads.get(view_id).filter(|d| d.is_alive())
    }

    pub fn any_alive(&self) -> bool {
        self.downloads.values().any(Downloader::is_alive)
    }

    /// Register a downloader, returning the dead one it replaces
    pub fn insert(&mut self, downloader: Downloader) -> Option<Downloader> {
        let view_id = downloader.view_id().to_string();
        let previous = self.downloads.insert(view_id.clone(), downloader);
        if let Some(old) = previous.as_ref().filter(|d| d.is_alive()) {
            warn!("Replacing a running download of '{}'", view_id);
            old.stop();
        }
        previous
    }

    pub fn remove(&mut self, view_id: &str) -> Option<Downloader> {
        self.downloads.remove(view_id)
    }

    /// Forget a download whose completion was already handled.
    /// A newer download for the same asset is left alone.
    pub fn remove_finished(&mut self, view_id: &str) -> bool {
        if self.downloads.get(view_id).is_some_and(Downloader::finished) {
            self.downloads.remove(view_id);
            return true;
        }
        false
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Downloader> {
        self.downloads.values_mut()
    }

    /// Drop every downloader marked for removal. Returns how many went.
    pub fn sweep_removed(&mut self) -> usize {
        let before = self.downloads.len();
        self.downloads.retain(|view_id, d| {
            if d.marked_remove() {
                debug!("Removing download of '{}' from registry", view_id);
                false
            } else {
                true
            }
        });
        before - self.downloads.len()
    }

    /// Stop every download. Workers whose thread already exited are
    /// forgotten; running ones stay until the download tick sees them exit.
    pub fn stop_all(&mut self) {
        for downloader in self.downloads.values() {
            downloader.stop();
        }
        self.downloads.retain(|_, d| d.is_alive());
    }
}
