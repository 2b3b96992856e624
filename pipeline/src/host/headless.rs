//! A host without a scene graph: records and logs every mutation.
//!
//! Drives the pipeline from the command line and stands in for the real host
//! in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use super::{
    BrokenLibrary, HostError, ImportedAsset, PlacedObject, PropertyPath, PropertyValue,
    ReportLevel, SceneHost, SceneUsage,
};
use crate::asset::{AssetDescriptor, Placement};

/// A scene mutation performed through [`HeadlessHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    LinkCollection {
        file: PathBuf,
        name: String,
        location: [f64; 3],
        parent: Option<String>,
    },
    AppendObjects {
        file: PathBuf,
        name: String,
        location: [f64; 3],
        parent: Option<String>,
    },
    SetEmptyDisplaySize {
        object: String,
        size: f64,
    },
    AppendMaterial {
        file: PathBuf,
    },
    AssignMaterial {
        target: String,
        slot: usize,
        material: String,
    },
    AppendScene {
        file: PathBuf,
        name: String,
    },
    ActivateScene(String),
    TagLibrary {
        file: PathBuf,
        view_id: String,
    },
    ReloadLibrary(String),
    RelinkLibrary {
        view_id: String,
        file: PathBuf,
    },
    RemoveLibrary(PathBuf),
    MarkAssetUsed(String),
    ApplyMetadata(ImportedAsset),
    PushUndo(String),
    SaveDocumentCopy(PathBuf),
    SetProperty(PropertyPath, PropertyValue),
}

/// A library file linked into the headless scene
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedLibrary {
    pub view_id: Option<String>,
    /// Objects instancing one of its collections
    pub users: usize,
}

#[derive(Debug, Default)]
pub struct HeadlessHost {
    /// Pretend the user is editing a mesh
    pub edit_mode: bool,
    /// Every imported-data call, in order
    pub calls: Vec<HostCall>,
    pub reports: Vec<(ReportLevel, String)>,
    /// Visible search results; only view ids present here get progress
    pub search_progress: HashMap<String, u8>,
    pub usage: HashMap<String, SceneUsage>,
    /// view id -> material name
    pub materials: HashMap<String, String>,
    pub broken: Vec<BrokenLibrary>,
    pub libraries: HashMap<PathBuf, LinkedLibrary>,
    pub properties: HashMap<PropertyPath, PropertyValue>,
    /// Make link/append/material/scene imports fail
    pub fail_imports: bool,
    /// Make library reloads fail
    pub fail_reload: bool,
    created: usize,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations matching `pred`
    pub fn calls_where(&self, pred: impl Fn(&HostCall) -> bool) -> Vec<&HostCall> {
        self.calls.iter().filter(|call| pred(call)).collect()
    }

    pub fn property(&self, path: &str) -> Option<&PropertyValue> {
        self.properties.get(&PropertyPath::new(path))
    }

    fn record(&mut self, call: HostCall) {
        debug!("Host call: {:?}", call);
        self.calls.push(call);
    }

    fn check_import(&self, what: &str) -> Result<(), HostError> {
        if self.fail_imports {
            return Err(HostError::new(format!("cannot import {}", what)));
        }
        Ok(())
    }

    fn next_name(&mut self, base: &str) -> String {
        self.created += 1;
        format!("{}.{:03}", base, self.created)
    }
}

impl SceneHost for HeadlessHost {
    fn is_edit_mode(&self) -> bool {
        self.edit_mode
    }

    fn update_search_progress(&mut self, view_id: &str, progress: u8) -> bool {
        match self.search_progress.get_mut(view_id) {
            Some(slot) => {
                *slot = progress;
                true
            }
            None => false,
        }
    }

    fn report(&mut self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Info => info!("{}", message),
            ReportLevel::Warning => warn!("{}", message),
            ReportLevel::Error => error!("{}", message),
        }
        self.reports.push((level, message.to_string()));
    }

    fn asset_usage(&self, view_id: &str) -> Option<SceneUsage> {
        self.usage.get(view_id).copied()
    }

    fn link_collection(
        &mut self,
        file: &Path,
        name: &str,
        placement: &Placement,
    ) -> Result<PlacedObject, HostError> {
        self.check_import(name)?;
        self.libraries.entry(file.to_path_buf()).or_default().users += 1;
        self.record(HostCall::LinkCollection {
            file: file.to_path_buf(),
            name: name.to_string(),
            location: placement.location,
            parent: placement.parent.clone(),
        });
        Ok(PlacedObject {
            name: self.next_name(name),
            is_empty: true,
        })
    }

    fn append_objects(
        &mut self,
        file: &Path,
        name: &str,
        placement: &Placement,
    ) -> Result<PlacedObject, HostError> {
        self.check_import(name)?;
        self.record(HostCall::AppendObjects {
            file: file.to_path_buf(),
            name: name.to_string(),
            location: placement.location,
            parent: placement.parent.clone(),
        });
        Ok(PlacedObject {
            name: self.next_name(name),
            is_empty: false,
        })
    }

    fn set_empty_display_size(&mut self, object: &str, size: f64) -> Result<(), HostError> {
        self.record(HostCall::SetEmptyDisplaySize {
            object: object.to_string(),
            size,
        });
        Ok(())
    }

    fn find_material(&self, view_id: &str) -> Option<String> {
        self.materials.get(view_id).cloned()
    }

    fn append_material(&mut self, file: &Path) -> Result<String, HostError> {
        self.check_import("material")?;
        self.record(HostCall::AppendMaterial {
            file: file.to_path_buf(),
        });
        Ok(self.next_name("Material"))
    }

    fn assign_material(
        &mut self,
        target_object: &str,
        slot: usize,
        material: &str,
    ) -> Result<(), HostError> {
        self.record(HostCall::AssignMaterial {
            target: target_object.to_string(),
            slot,
            material: material.to_string(),
        });
        Ok(())
    }

    fn append_scene(&mut self, file: &Path, name: &str) -> Result<String, HostError> {
        self.check_import(name)?;
        self.record(HostCall::AppendScene {
            file: file.to_path_buf(),
            name: name.to_string(),
        });
        Ok(name.to_string())
    }

    fn activate_scene(&mut self, scene: &str) -> Result<(), HostError> {
        self.record(HostCall::ActivateScene(scene.to_string()));
        Ok(())
    }

    fn tag_library(&mut self, file: &Path, asset: &AssetDescriptor) -> Result<(), HostError> {
        self.usage.insert(asset.view_id.clone(), SceneUsage::Linked);
        self.libraries.entry(file.to_path_buf()).or_default().view_id =
            Some(asset.view_id.clone());
        self.record(HostCall::TagLibrary {
            file: file.to_path_buf(),
            view_id: asset.view_id.clone(),
        });
        Ok(())
    }

    fn broken_libraries(&self) -> Vec<BrokenLibrary> {
        self.broken.clone()
    }

    fn reload_library(&mut self, view_id: &str) -> Result<(), HostError> {
        if self.fail_reload {
            return Err(HostError::new(format!("cannot reload library {}", view_id)));
        }
        self.broken.retain(|lib| lib.asset.view_id != view_id);
        self.record(HostCall::ReloadLibrary(view_id.to_string()));
        Ok(())
    }

    fn relink_library(&mut self, view_id: &str, file: &Path) -> Result<(), HostError> {
        self.broken.retain(|lib| lib.asset.view_id != view_id);
        self.record(HostCall::RelinkLibrary {
            view_id: view_id.to_string(),
            file: file.to_path_buf(),
        });
        Ok(())
    }

    fn unused_libraries(&self) -> Vec<PathBuf> {
        let mut unused: Vec<PathBuf> = self
            .libraries
            .iter()
            .filter(|(_, library)| library.users == 0)
            .map(|(file, _)| file.clone())
            .collect();
        unused.sort();
        unused
    }

    fn remove_library(&mut self, file: &Path) -> Result<(), HostError> {
        let library = self
            .libraries
            .remove(file)
            .ok_or_else(|| HostError::new(format!("no library {:?}", file)))?;
        if let Some(view_id) = library.view_id {
            if self.usage.get(&view_id) == Some(&SceneUsage::Linked) {
                self.usage.remove(&view_id);
            }
        }
        self.record(HostCall::RemoveLibrary(file.to_path_buf()));
        Ok(())
    }

    fn mark_asset_used(&mut self, asset: &AssetDescriptor) {
        self.usage
            .entry(asset.view_id.clone())
            .or_insert(SceneUsage::Appended);
        self.record(HostCall::MarkAssetUsed(asset.view_id.clone()));
    }

    fn apply_asset_metadata(
        &mut self,
        target: &ImportedAsset,
        _asset: &AssetDescriptor,
    ) -> Result<(), HostError> {
        self.record(HostCall::ApplyMetadata(target.clone()));
        Ok(())
    }

    fn push_undo(&mut self, message: &str) {
        self.record(HostCall::PushUndo(message.to_string()));
    }

    fn save_document_copy(&mut self, path: &Path) -> Result<(), HostError> {
        self.record(HostCall::SaveDocumentCopy(path.to_path_buf()));
        Ok(())
    }

    fn set_property(&mut self, path: &PropertyPath, value: PropertyValue) -> Result<(), HostError> {
        self.properties.insert(path.clone(), value.clone());
        self.record(HostCall::SetProperty(path.clone(), value));
        Ok(())
    }
}
