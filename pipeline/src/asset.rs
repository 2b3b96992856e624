//! Asset descriptors and the placement arguments that travel with them.

use serde::{Deserialize, Deserializer, Serialize};

/// Kind of library asset, which decides how it is imported
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetKind {
    Model,
    Scene,
    Material,
}

impl AssetKind {
    /// Several placements of the same asset can share one download
    pub fn supports_multiple_placements(self) -> bool {
        matches!(self, AssetKind::Model | AssetKind::Material)
    }

    /// Importing needs the host out of edit mode
    pub fn requires_object_mode(self) -> bool {
        matches!(self, AssetKind::Model | AssetKind::Material)
    }

    /// Cache subdirectory for this kind
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Model => "models",
            AssetKind::Scene => "scenes",
            AssetKind::Material => "materials",
        }
    }
}

/// Snapshot of a search result: everything needed to fetch and place an asset.
///
/// Cloned before it is handed to a download thread so the worker never
/// shares state with host-side objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Unique identifier of this asset revision
    pub view_id: String,
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub asset_type: AssetKind,
    pub download_url: String,
    /// Server-side creation time, seconds since the epoch
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created: Option<f64>,
    #[serde(default)]
    pub bbox_min: [f64; 3],
    #[serde(default)]
    pub bbox_max: [f64; 3],
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<serde_json::Value>,
    /// Everything else the search API returned
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AssetDescriptor {
    pub fn cache_entry(&self) -> hana3d_cache::CacheEntry<'_> {
        hana3d_cache::CacheEntry {
            kind_dir: self.asset_type.dir_name(),
            name: &self.name,
            view_id: &self.view_id,
            download_url: &self.download_url,
        }
    }

    /// Display size for the empty that instances a linked model
    pub fn empty_display_size(&self) -> f64 {
        let extent: f64 = self
            .bbox_max
            .iter()
            .zip(self.bbox_min.iter())
            .map(|(max, min)| max - min)
            .sum();
        (extent / 3.0).min(1.0)
    }
}

/// The API sends `created` either as a number or a numeric string
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Number(f64),
        Text(String),
    }

    match Option::<Timestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Timestamp::Number(n)) => Ok(Some(n)),
        Some(Timestamp::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Where and onto what one instance of the asset is placed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub location: [f64; 3],
    pub rotation: [f64; 3],
    /// Object receiving a material asset
    #[serde(default)]
    pub target_object: Option<String>,
    #[serde(default)]
    pub material_slot: usize,
    /// Parent for the placed hierarchy (replace keeps the old parent)
    #[serde(default)]
    pub parent: Option<String>,
}

impl Placement {
    pub fn at(location: [f64; 3]) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }
}

/// Pass-through arguments a download carries to its append step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementArgs {
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub cast_parent: Option<String>,
    /// Recovering a lost library: relink it instead of appending
    #[serde(default)]
    pub redownload: bool,
    /// Download even if a local copy exists
    #[serde(default)]
    pub force: bool,
}

impl PlacementArgs {
    pub fn single(placement: Placement) -> Self {
        Self {
            placements: vec![placement],
            ..Self::default()
        }
    }

    pub fn redownload() -> Self {
        Self {
            redownload: true,
            ..Self::default()
        }
    }
}

/// Lays batch-downloaded assets out on a square spiral around the origin.
#[derive(Debug, Clone)]
pub struct GridPlacer {
    grid_distance: f64,
    object_count: usize,
}

impl GridPlacer {
    pub fn new(grid_distance: f64) -> Self {
        Self {
            grid_distance,
            object_count: 0,
        }
    }

    /// Number of positions handed out so far
    pub fn object_count(&self) -> usize {
        self.object_count
    }

    pub fn reset(&mut self) {
        self.object_count = 0;
    }

    /// Next free grid position
    pub fn next_location(&mut self) -> [f64; 3] {
        let (x, y) = spiral_cell(self.object_count);
        self.object_count += 1;
        [
            self.grid_distance * x as f64,
            self.grid_distance * y as f64,
            0.0,
        ]
    }
}

/// Integer coordinates of the n-th cell of a square spiral
fn spiral_cell(n: usize) -> (i64, i64) {
    let (mut x, mut y) = (0i64, 0i64);
    let (mut dx, mut dy) = (0i64, -1i64);
    for _ in 0..n {
        if x == y || (x < 0 && x == -y) || (x > 0 && x == 1 - y) {
            (dx, dy) = (-dy, dx);
        }
        x += dx;
        y += dy;
    }
    (x, y)
}
