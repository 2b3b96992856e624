//! Thumbnail renderer jobs: data file, output path and command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::ProcessError;
use crate::config::RendererConfig;
use crate::host::PropertyPath;

const DATA_FILE: &str = "data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThumbnailKind {
    Model,
    Material,
}

impl ThumbnailKind {
    fn extension(self) -> &'static str {
        match self {
            ThumbnailKind::Model => "jpg",
            ThumbnailKind::Material => "png",
        }
    }

    fn collection(self) -> &'static str {
        match self {
            ThumbnailKind::Model => "objects",
            ThumbnailKind::Material => "materials",
        }
    }

    fn scene_file_name(self) -> &'static str {
        match self {
            ThumbnailKind::Model => "thumbnailer_hana3d.blend",
            ThumbnailKind::Material => "material_thumbnailer_cycles.blend",
        }
    }
}

/// Render settings stored on the asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThumbnailSettings {
    pub angle: String,
    pub snap_to: String,
    pub background_lightness: f64,
    pub resolution: u32,
    pub samples: u32,
    pub denoising: bool,
    /// Preview mesh for materials
    pub generator_type: String,
    pub scale: f64,
    pub background: bool,
    pub adaptive_subdivision: bool,
    pub texture_size_meters: f64,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            angle: "DEFAULT".into(),
            snap_to: "GROUND".into(),
            background_lightness: 0.9,
            resolution: 512,
            samples: 100,
            denoising: true,
            generator_type: "BALL".into(),
            scale: 1.0,
            background: false,
            adaptive_subdivision: false,
            texture_size_meters: 1.0,
        }
    }
}

/// What to render and where the thumbnail goes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailRequest {
    pub kind: ThumbnailKind,
    /// Name of the main object or of the material
    pub asset_name: String,
    /// Objects of the model hierarchy
    #[serde(default)]
    pub object_names: Vec<String>,
    /// Directory of the open document; thumbnails are saved next to it
    pub output_dir: PathBuf,
    #[serde(default)]
    pub settings: ThumbnailSettings,
    /// Only save the render scene, do not render
    #[serde(default)]
    pub save_only: bool,
    #[serde(default)]
    pub blend_filepath: String,
}

impl ThumbnailRequest {
    /// The host object the job reports on
    pub fn target(&self) -> PropertyPath {
        PropertyPath::new(format!(
            "bpy.data.{}['{}']",
            self.kind.collection(),
            self.asset_name
        ))
    }

    pub fn busy_property(&self) -> PropertyPath {
        PropertyPath::new(format!("{}.hana3d.is_generating_thumbnail", self.target()))
    }

    pub fn status_property(&self) -> PropertyPath {
        PropertyPath::new(format!("{}.hana3d.thumbnail_generating_state", self.target()))
    }

    pub fn thumbnail_property(&self) -> PropertyPath {
        PropertyPath::new(format!("{}.hana3d.thumbnail", self.target()))
    }
}

/// `<dir>/<name>.<ext>`, or the first free `<dir>/<name>_NNNN.<ext>`
pub fn unique_thumbnail_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{}.{}", name, ext));
    if !first.exists() {
        return first;
    }
    (0u32..)
        .map(|i| dir.join(format!("{}_{:04}.{}", name, i, ext)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// A prepared renderer invocation.
///
/// Owns a scratch directory holding the data file and the scene copy the
/// renderer opens.
#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    request: ThumbnailRequest,
    temp_dir: PathBuf,
    data_file: PathBuf,
    scene_file: PathBuf,
    thumbnail: PathBuf,
    template: PathBuf,
    script: PathBuf,
    binary: PathBuf,
}

impl ThumbnailJob {
    /// Create the scratch directory and write the data file
    pub fn prepare(
        request: ThumbnailRequest,
        renderer: &RendererConfig,
    ) -> Result<Self, ProcessError> {
        let temp_dir = std::env::temp_dir().join(format!("hana3d_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir)?;

        let (template, script) = match request.kind {
            ThumbnailKind::Model => (&renderer.model_template, &renderer.model_script),
            ThumbnailKind::Material => (&renderer.material_template, &renderer.material_script),
        };

        let thumbnail = unique_thumbnail_path(
            &request.output_dir,
            &request.asset_name,
            request.kind.extension(),
        );

        let job = Self {
            data_file: temp_dir.join(DATA_FILE),
            scene_file: temp_dir.join(request.kind.scene_file_name()),
            thumbnail,
            template: template.clone(),
            script: script.clone(),
            binary: renderer.binary.clone(),
            temp_dir,
            request,
        };

        let data = job.render_data(renderer.use_gpu);
        fs::write(&job.data_file, serde_json::to_vec_pretty(&data)?)?;
        debug!("Wrote render data to {:?}", job.data_file);

        Ok(job)
    }

    fn render_data(&self, use_gpu: bool) -> serde_json::Value {
        let settings = &self.request.settings;
        let mut data = serde_json::json!({
            "type": self.request.kind,
            "thumbnail_background_lightness": settings.background_lightness,
            "thumbnail_resolution": settings.resolution,
            "thumbnail_samples": settings.samples,
            "thumbnail_denoising": settings.denoising,
            "thumbnail_use_gpu": use_gpu,
            "save_only": self.request.save_only,
            "blend_filepath": self.request.blend_filepath,
        });
        let extra = match self.request.kind {
            ThumbnailKind::Model => serde_json::json!({
                "models": self.request.object_names,
                "thumbnail_angle": settings.angle,
                "thumbnail_snap_to": settings.snap_to,
            }),
            ThumbnailKind::Material => serde_json::json!({
                "material": self.request.asset_name,
                "thumbnail_type": settings.generator_type,
                "thumbnail_scale": settings.scale,
                "thumbnail_background": settings.background,
                "adaptive_subdivision": settings.adaptive_subdivision,
                "texture_size_meters": settings.texture_size_meters,
            }),
        };
        if let (Some(data), serde_json::Value::Object(extra)) = (data.as_object_mut(), extra) {
            data.extend(extra);
        }
        data
    }

    pub fn request(&self) -> &ThumbnailRequest {
        &self.request
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    /// Where the host must save its document copy before spawning
    pub fn scene_file(&self) -> &Path {
        &self.scene_file
    }

    /// Image the renderer will produce
    pub fn thumbnail(&self) -> &Path {
        &self.thumbnail
    }

    /// Thumbnail path relative to the document, as stored on the asset
    pub fn relative_thumbnail(&self) -> String {
        let file_name = self
            .thumbnail
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("//{}", file_name)
    }

    /// `<binary> --background -noaudio <template> --python <script> --
    /// <data file> <scene file> <output> <temp dir>`; the output is passed
    /// without extension.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--background")
            .arg("-noaudio")
            .arg(&self.template)
            .arg("--python")
            .arg(&self.script)
            .arg("--")
            .arg(&self.data_file)
            .arg(&self.scene_file)
            .arg(self.thumbnail.with_extension(""))
            .arg(&self.temp_dir);
        command
    }

    pub fn spawn(&self) -> Result<Child, ProcessError> {
        let child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.binary.clone(),
                source,
            })?;
        info!(
            "Started thumbnailer for '{}' (pid {})",
            self.request.asset_name,
            child.id()
        );
        Ok(child)
    }
}
