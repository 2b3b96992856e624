//! Deterministic placement of asset files inside the cache roots.

use std::path::{Path, PathBuf};

/// Which cache roots receive a copy of each downloaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadLocation {
    /// Only the shared global directory.
    #[default]
    Global,
    /// Only the project directory (falls back to global when there is no project).
    Project,
    /// Global first, project copy second.
    Both,
}

/// Identity of one asset revision as far as the cache is concerned.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry<'a> {
    /// Per-kind subdirectory, e.g. "models".
    pub kind_dir: &'a str,
    /// Display name, slugified into the folder name.
    pub name: &'a str,
    /// Globally unique revision identifier.
    pub view_id: &'a str,
    /// Remote URL; its last path segment becomes the file name.
    pub download_url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    global_dir: PathBuf,
    project_dir: Option<PathBuf>,
    location: DownloadLocation,
}

impl CacheLayout {
    pub fn new(
        global_dir: PathBuf,
        project_dir: Option<PathBuf>,
        location: DownloadLocation,
    ) -> Self {
        Self {
            global_dir,
            project_dir,
            location,
        }
    }

    pub fn global_dir(&self) -> &Path {
        &self.global_dir
    }

    pub fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    /// Point the project copy at a different directory (e.g. after the
    /// document was saved somewhere else).
    pub fn set_project_dir(&mut self, project_dir: Option<PathBuf>) {
        self.project_dir = project_dir;
    }

    /// Cache roots in priority order: the download target first.
    fn roots(&self) -> Vec<&Path> {
        match (self.location, self.project_dir.as_deref()) {
            (DownloadLocation::Global, _) | (_, None) => vec![self.global_dir.as_path()],
            (DownloadLocation::Project, Some(project)) => vec![project],
            (DownloadLocation::Both, Some(project)) => vec![self.global_dir.as_path(), project],
        }
    }

    /// All paths the asset file lives at, download target first.
    ///
    /// Layout: `<root>/<kind_dir>/<slug(name)>_<view_id>/<file name>`
    pub fn download_paths(&self, entry: &CacheEntry<'_>) -> Vec<PathBuf> {
        let file_name = file_name_from_url(entry.download_url)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.blend", entry.view_id));
        let folder = format!("{}_{}", slugify(entry.name), entry.view_id);

        self.roots()
            .into_iter()
            .map(|root| root.join(entry.kind_dir).join(&folder).join(&file_name))
            .collect()
    }
}

/// Last path segment of a URL, ignoring query string and fragment.
fn file_name_from_url(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    // A bare host has no file segment
    let (_, path) = without_scheme.split_once('/')?;
    path.rsplit('/').next().filter(|segment| !segment.is_empty())
}

/// Lowercase, filesystem-safe version of a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "asset".to_string()
    } else {
        slug.to_string()
    }
}
