//! The host application's scene graph, seen from the pipeline.
//!
//! Everything here runs on the host's main thread. Download workers and
//! renderer subprocesses never touch a `SceneHost`; the orchestrator's ticks
//! call into it after reconciling worker state.

use std::path::{Path, PathBuf};

use crate::asset::{AssetDescriptor, Placement};

mod headless;

pub use headless::{HeadlessHost, HostCall, LinkedLibrary};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Severity of a message shown in the host's report area
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// How an asset is already present in the open document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneUsage {
    /// Its collection is linked from the library file and still has users
    Linked,
    /// Its data was appended into the document
    Appended,
}

/// Result of placing model data in the scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedObject {
    /// Name of the top-level object of the placed hierarchy
    pub name: String,
    /// The top-level object is an empty instancing a linked collection
    pub is_empty: bool,
}

/// Host datablock an import produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedAsset {
    Object(String),
    Material(String),
    Scene(String),
}

/// A library whose backing file disappeared from disk
#[derive(Debug, Clone, PartialEq)]
pub struct BrokenLibrary {
    pub asset: AssetDescriptor,
}

/// Address of a property on a host object, e.g.
/// `bpy.data.objects['Chair'].hana3d.is_generating_thumbnail`
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub struct PropertyPath(pub String);

impl PropertyPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
}

/// Synchronous scene-mutation interface of the host application.
pub trait SceneHost {
    /// The host is in a mode where object data cannot be added
    fn is_edit_mode(&self) -> bool;

    /// Mirror download progress into the visible search results.
    /// Returns false when no such mirror exists.
    fn update_search_progress(&mut self, view_id: &str, progress: u8) -> bool;

    fn report(&mut self, level: ReportLevel, message: &str);

    fn asset_usage(&self, view_id: &str) -> Option<SceneUsage>;

    fn link_collection(
        &mut self,
        file: &Path,
        name: &str,
        placement: &Placement,
    ) -> Result<PlacedObject, HostError>;

    fn append_objects(
        &mut self,
        file: &Path,
        name: &str,
        placement: &Placement,
    ) -> Result<PlacedObject, HostError>;

    fn set_empty_display_size(&mut self, object: &str, size: f64) -> Result<(), HostError>;

    /// Name of a material already in the document with this view id
    fn find_material(&self, view_id: &str) -> Option<String>;

    fn append_material(&mut self, file: &Path) -> Result<String, HostError>;

    fn assign_material(
        &mut self,
        target_object: &str,
        slot: usize,
        material: &str,
    ) -> Result<(), HostError>;

    /// Append the scene from `file` and name it `name`
    fn append_scene(&mut self, file: &Path, name: &str) -> Result<String, HostError>;

    fn activate_scene(&mut self, scene: &str) -> Result<(), HostError>;

    /// Store the descriptor on the library datablock of `file`
    fn tag_library(&mut self, file: &Path, asset: &AssetDescriptor) -> Result<(), HostError>;

    fn broken_libraries(&self) -> Vec<BrokenLibrary>;

    fn reload_library(&mut self, view_id: &str) -> Result<(), HostError>;

    /// Point the library of `view_id` at `file` and reload it
    fn relink_library(&mut self, view_id: &str, file: &Path) -> Result<(), HostError>;

    /// Files of linked libraries no object instances any more
    fn unused_libraries(&self) -> Vec<PathBuf>;

    /// Unlink the library of `file` together with the collections it provides
    fn remove_library(&mut self, file: &Path) -> Result<(), HostError>;

    /// Remember the asset in the document's used-assets map
    fn mark_asset_used(&mut self, asset: &AssetDescriptor);

    /// Copy descriptor metadata onto the imported datablock
    fn apply_asset_metadata(
        &mut self,
        target: &ImportedAsset,
        asset: &AssetDescriptor,
    ) -> Result<(), HostError>;

    fn push_undo(&mut self, message: &str);

    /// Save a copy of the open document to `path`
    fn save_document_copy(&mut self, path: &Path) -> Result<(), HostError>;

    fn set_property(&mut self, path: &PropertyPath, value: PropertyValue)
        -> Result<(), HostError>;
}
