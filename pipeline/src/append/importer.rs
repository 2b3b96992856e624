use std::path::Path;

use log::debug;

use super::AppendError;
use crate::asset::{AssetDescriptor, AssetKind, Placement, PlacementArgs};
use crate::config::{AppendMethod, ImportConfig, SceneMerge};
use crate::host::{ImportedAsset, SceneHost, SceneUsage};

/// Places one kind of asset into the open document
pub trait AssetImporter {
    fn import(
        &self,
        host: &mut dyn SceneHost,
        asset: &AssetDescriptor,
        file: &Path,
        args: &PlacementArgs,
        config: &ImportConfig,
    ) -> Result<ImportedAsset, AppendError>;
}

pub fn importer_for(kind: AssetKind) -> &'static dyn AssetImporter {
    match kind {
        AssetKind::Model => &ModelImporter,
        AssetKind::Material => &MaterialImporter,
        AssetKind::Scene => &SceneImporter,
    }
}

pub struct ModelImporter;

impl AssetImporter for ModelImporter {
    fn import(
        &self,
        host: &mut dyn SceneHost,
        asset: &AssetDescriptor,
        file: &Path,
        args: &PlacementArgs,
        config: &ImportConfig,
    ) -> Result<ImportedAsset, AppendError> {
        // An asset already linked into the document stays linked
        let link = host.asset_usage(&asset.view_id) == Some(SceneUsage::Linked)
            || config.append_method == AppendMethod::LinkCollection;

        let default_placement = [Placement::default()];
        let placements = if args.placements.is_empty() {
            &default_placement[..]
        } else {
            &args.placements[..]
        };

        let mut top = None;
        for placement in placements {
            let mut placement = placement.clone();
            if placement.parent.is_none() {
                placement.parent = args.cast_parent.clone();
            }

            let placed = if link {
                host.link_collection(file, &asset.name, &placement)?
            } else {
                host.append_objects(file, &asset.name, &placement)?
            };

            if placed.is_empty && link {
                host.set_empty_display_size(&placed.name, asset.empty_display_size())?;
            }
            debug!("Placed '{}' as '{}'", asset.name, placed.name);
            top = Some(placed.name);
        }

        if link {
            host.tag_library(file, asset)?;
        }

        // Always set: `placements` is never empty
        let name = top.unwrap_or_default();
        Ok(ImportedAsset::Object(name))
    }
}

pub struct MaterialImporter;

impl AssetImporter for MaterialImporter {
    fn import(
        &self,
        host: &mut dyn SceneHost,
        asset: &AssetDescriptor,
        file: &Path,
        args: &PlacementArgs,
        _config: &ImportConfig,
    ) -> Result<ImportedAsset, AppendError> {
        let material = match host.find_material(&asset.view_id) {
            Some(existing) => existing,
            None => host.append_material(file)?,
        };

        for placement in &args.placements {
            let target = placement
                .target_object
                .as_deref()
                .ok_or_else(|| AppendError::MissingTarget {
                    asset: asset.name.clone(),
                })?;
            host.assign_material(target, placement.material_slot, &material)?;
        }

        Ok(ImportedAsset::Material(material))
    }
}

pub struct SceneImporter;

impl AssetImporter for SceneImporter {
    fn import(
        &self,
        host: &mut dyn SceneHost,
        asset: &AssetDescriptor,
        file: &Path,
        _args: &PlacementArgs,
        config: &ImportConfig,
    ) -> Result<ImportedAsset, AppendError> {
        let scene = host.append_scene(file, &asset.name)?;
        if config.scene_merge == SceneMerge::Add {
            host.activate_scene(&scene)?;
        }
        Ok(ImportedAsset::Scene(scene))
    }
}
