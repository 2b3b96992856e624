use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use hana3d_cache::{CacheLayout, DownloadLocation};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config file {path:?} is not a JSON object: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to encode config file {path:?}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid JSON in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize config value '{key}': {source}")]
    Serialize {
        key: &'static str,
        source: serde_json::Error,
    },
}

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Cache Configuration =====

/// Which cache roots receive downloaded files
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CacheLocation {
    #[default]
    Global,
    Project,
    Both,
}

impl From<CacheLocation> for DownloadLocation {
    fn from(location: CacheLocation) -> Self {
        match location {
            CacheLocation::Global => DownloadLocation::Global,
            CacheLocation::Project => DownloadLocation::Project,
            CacheLocation::Both => DownloadLocation::Both,
        }
    }
}

/// Where downloaded asset files live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Shared cache used by every project
    pub global_dir: PathBuf,
    /// Directory next to the current document, when it has been saved
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
    #[serde(default)]
    pub location: CacheLocation,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            global_dir: home.join("hana3d_data"),
            project_dir: None,
            location: CacheLocation::Global,
        }
    }
}

impl ConfigKey<CacheConfig> {
    pub const CACHE: Self = Self::new("cacheConfig");
}

// ===== Import Configuration =====

/// How model assets are brought into the document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AppendMethod {
    /// Link the asset's collection and instance it
    #[default]
    LinkCollection,
    /// Copy the objects into the document
    AppendObjects,
}

/// What happens to the active scene when a scene asset is appended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SceneMerge {
    /// Switch every window to the appended scene
    #[default]
    Add,
    /// Keep the current scene active
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    #[serde(default)]
    pub append_method: AppendMethod,
    #[serde(default)]
    pub scene_merge: SceneMerge,
}

impl ConfigKey<ImportConfig> {
    pub const IMPORT: Self = Self::new("importConfig");
}

// ===== Polling Configuration =====

/// Tick intervals returned to the scheduler, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingConfig {
    /// Download sweep while downloads are registered
    pub downloads_active_ms: u64,
    /// Download sweep with an empty registry
    pub downloads_idle_ms: u64,
    /// Append drain with an empty queue
    pub append_idle_ms: u64,
    /// Append drain while a download thread is still running
    pub append_wait_ms: u64,
    /// Append drain right after executing a task
    pub append_next_ms: u64,
    /// Process monitor while processes are tracked
    pub processes_active_ms: u64,
    /// Process monitor with nothing tracked
    pub processes_idle_ms: u64,
    /// Bytes read from the network per chunk
    pub chunk_size: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            downloads_active_ms: 100,
            downloads_idle_ms: 1000,
            append_idle_ms: 500,
            append_wait_ms: 100,
            append_next_ms: 10,
            processes_active_ms: 300,
            processes_idle_ms: 1000,
            chunk_size: 4096,
        }
    }
}

impl ConfigKey<PollingConfig> {
    pub const POLLING: Self = Self::new("pollingConfig");
}

// ===== Renderer Configuration =====

/// How thumbnail renderer subprocesses are launched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    /// Host application binary, run in background mode
    pub binary: PathBuf,
    pub model_template: PathBuf,
    pub model_script: PathBuf,
    pub material_template: PathBuf,
    pub material_script: PathBuf,
    #[serde(default)]
    pub use_gpu: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("blender"),
            model_template: PathBuf::from("thumbnailer.blend"),
            model_script: PathBuf::from("autothumb_model_bg.py"),
            material_template: PathBuf::from("material_thumbnailer_cycles.blend"),
            material_script: PathBuf::from("autothumb_material_bg.py"),
            use_gpu: false,
        }
    }
}

impl ConfigKey<RendererConfig> {
    pub const RENDERER: Self = Self::new("rendererConfig");
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Config store persisted as a single JSON object on disk
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    /// Open the store, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            debug!("Config file {:?} not found, starting with defaults", path);
            HashMap::new()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, data: &HashMap<String, serde_json::Value>) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let raw = serde_json::to_string_pretty(data).map_err(|source| ConfigError::Encode {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, raw).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl ConfigStore for JsonFileStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.get(key.key_name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let val = serde_json::to_value(value).map_err(|source| ConfigError::Serialize {
            key: key.key_name(),
            source,
        })?;
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.key_name().to_string(), val);
        self.save(&data)
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.remove(key.key_name());
        self.save(&data)
    }
}

/// Read a JSON document such as an asset descriptor or thumbnail request
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

// ===== Assembled Configuration =====

/// Everything the pipeline reads from preferences
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub import: ImportConfig,
    pub polling: PollingConfig,
    pub renderer: RendererConfig,
}

impl PipelineConfig {
    /// Assemble the config from a store, using defaults for missing sections
    pub fn load(store: &impl ConfigStore) -> Self {
        let config = Self {
            cache: store.get(&ConfigKey::CACHE).unwrap_or_default(),
            import: store.get(&ConfigKey::IMPORT).unwrap_or_default(),
            polling: store.get(&ConfigKey::POLLING).unwrap_or_default(),
            renderer: store.get(&ConfigKey::RENDERER).unwrap_or_default(),
        };
        info!("Asset cache: {:?}", config.cache.global_dir);
        config
    }

    pub fn cache_layout(&self) -> CacheLayout {
        CacheLayout::new(
            self.cache.global_dir.clone(),
            self.cache.project_dir.clone(),
            self.cache.location.into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    // Simple in-memory mock store for testing
    struct MockConfigStore {
        data: RefCell<HashMap<String, serde_json::Value>>,
    }

    impl MockConfigStore {
        fn new() -> Self {
            Self {
                data: RefCell::new(HashMap::new()),
            }
        }
    }

    impl ConfigStore for MockConfigStore {
        fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
            self.data
                .borrow()
                .get(key.key_name())
                .and_then(|v| serde_json::from_value(v.clone()).ok())
        }

        fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
            let val = serde_json::to_value(value).map_err(|source| ConfigError::Serialize {
                key: key.key_name(),
                source,
            })?;
            self.data
                .borrow_mut()
                .insert(key.key_name().to_string(), val);
            Ok(())
        }

        fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
            self.data.borrow_mut().remove(key.key_name());
            Ok(())
        }
    }

    #[test]
    fn test_cache_config_store() {
        let test_cases = vec![
            (
                "CacheConfig global only",
                CacheConfig {
                    global_dir: PathBuf::from("/data/hana3d"),
                    project_dir: None,
                    location: CacheLocation::Global,
                },
            ),
            (
                "CacheConfig with project copy",
                CacheConfig {
                    global_dir: PathBuf::from("/data/hana3d"),
                    project_dir: Some(PathBuf::from("/projects/house/assets")),
                    location: CacheLocation::Both,
                },
            ),
        ];

        for (description, config) in test_cases {
            let store = MockConfigStore::new();
            test_config_lifecycle(&store, &ConfigKey::CACHE, config, description);
        }
    }

    #[test]
    fn test_import_and_polling_config_store() {
        let store = MockConfigStore::new();
        test_config_lifecycle(
            &store,
            &ConfigKey::IMPORT,
            ImportConfig {
                append_method: AppendMethod::AppendObjects,
                scene_merge: SceneMerge::Merge,
            },
            "ImportConfig appending objects",
        );
        test_config_lifecycle(
            &store,
            &ConfigKey::POLLING,
            PollingConfig {
                chunk_size: 65536,
                ..PollingConfig::default()
            },
            "PollingConfig with large chunks",
        );
        test_config_lifecycle(
            &store,
            &ConfigKey::RENDERER,
            RendererConfig {
                use_gpu: true,
                ..RendererConfig::default()
            },
            "RendererConfig on GPU",
        );
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let store = MockConfigStore::new();
        store.data.borrow_mut().insert(
            ConfigKey::POLLING.key_name().to_string(),
            serde_json::json!({ "chunkSize": 1024 }),
        );

        let config = PipelineConfig::load(&store);
        assert_eq!(config.polling.chunk_size, 1024);
        assert_eq!(config.polling.downloads_active_ms, 100);
        assert_eq!(config.import, ImportConfig::default());
        assert_eq!(config.renderer, RendererConfig::default());
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs/hana3d.json");

        let store = JsonFileStore::open(&path).unwrap();
        store
            .set(
                &ConfigKey::IMPORT,
                ImportConfig {
                    append_method: AppendMethod::AppendObjects,
                    scene_merge: SceneMerge::Add,
                },
            )
            .unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        let import = reopened.get(&ConfigKey::IMPORT).unwrap();
        assert_eq!(import.append_method, AppendMethod::AppendObjects);

        reopened.delete(&ConfigKey::IMPORT).unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(reopened.get(&ConfigKey::IMPORT).is_none());
    }

    #[test]
    fn test_read_json_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            read_json_file::<ImportConfig>(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            read_json_file::<ImportConfig>(&broken),
            Err(ConfigError::Invalid { .. })
        ));
    }

    // Helper function to check if a string is in camelCase format
    fn is_camel_case(s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() => chars.all(|c| c.is_alphanumeric()),
            _ => false,
        }
    }

    // Helper function to verify camelCase format dynamically
    fn verify_camel_case<T>(store: &MockConfigStore, key: &ConfigKey<T>) {
        assert!(
            is_camel_case(key.key_name()),
            "Config key '{}' should be camelCase",
            key.key_name()
        );

        let stored_json = store.data.borrow().get(key.key_name()).cloned();
        if let Some(obj) = stored_json.as_ref().and_then(|v| v.as_object()) {
            for field_key in obj.keys() {
                assert!(
                    is_camel_case(field_key),
                    "Field '{}' in {} should be camelCase",
                    field_key,
                    key.key_name()
                );
            }
        }
    }

    // Helper function to test the full lifecycle of a config
    fn test_config_lifecycle<T>(
        store: &MockConfigStore,
        key: &ConfigKey<T>,
        test_config: T,
        description: &str,
    ) where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug + Clone,
    {
        let result: Option<T> = store.get(key);
        assert!(
            result.is_none(),
            "{}: Get should return None before set",
            description
        );

        store
            .set(key, test_config.clone())
            .unwrap_or_else(|e| panic!("{}: Set should succeed: {}", description, e));

        let retrieved_config: Option<T> = store.get(key);
        assert_eq!(
            retrieved_config,
            Some(test_config),
            "{}: Retrieved config should match",
            description
        );

        verify_camel_case(store, key);

        store
            .delete(key)
            .unwrap_or_else(|e| panic!("{}: Delete should succeed: {}", description, e));

        let result: Option<T> = store.get(key);
        assert!(
            result.is_none(),
            "{}: Get should return None after delete",
            description
        );
    }
}
