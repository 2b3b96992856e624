//! Deferred scene mutation: the append queue and per-kind importers.

mod error;
mod importer;
mod queue;

use log::info;

pub use error::AppendError;
pub use importer::{importer_for, AssetImporter, MaterialImporter, ModelImporter, SceneImporter};
pub use queue::{AppendQueue, AppendTask};

use crate::config::ImportConfig;
use crate::host::{ImportedAsset, SceneHost};
use hana3d_cache::CacheLayout;

/// Place a downloaded asset into the open document.
///
/// Imports from the last download location, records the asset as used,
/// copies its metadata onto the imported datablock and pushes one undo step.
pub fn append_asset(
    host: &mut dyn SceneHost,
    layout: &CacheLayout,
    config: &ImportConfig,
    task: &AppendTask,
) -> Result<ImportedAsset, AppendError> {
    let asset = &task.asset;
    info!("Appending asset '{}'", asset.name);

    let paths = layout.download_paths(&asset.cache_entry());
    let file = paths
        .last()
        .filter(|path| path.is_file())
        .ok_or_else(|| AppendError::FileNotFound {
            asset: asset.name.clone(),
        })?;

    let imported = importer_for(asset.asset_type).import(host, asset, file, &task.args, config)?;

    host.mark_asset_used(asset);
    host.apply_asset_metadata(&imported, asset)?;
    host.push_undo(&format!("add {} to scene", asset.name));

    Ok(imported)
}
