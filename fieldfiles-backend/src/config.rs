//! Settings loaded from defaults, an optional TOML file and the environment
//!

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, ConfigError, Environment, File};
use fieldfiles_shared::{AttachmentError, ImageStyle, ORIGINAL_STYLE};
use serde::Deserialize;

use crate::blobstore::{LocalStorage, S3Config, S3Storage, Storages};
use crate::processor::ResizeOptions;

pub const DEFAULT_MAX_WIDTH: u32 = 2560;
pub const DEFAULT_MAX_HEIGHT: u32 = 1700;

pub fn storage_root_default() -> String {
    shellexpand::tilde("~/.cache/fieldfiles").to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    pub root: PathBuf,
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Backend new uploads go to
    pub default: String,
    pub local: LocalConfig,
    pub s3: Option<S3Config>,
}

/// How uploaded images get normalised and which styles exist.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Target format for uploaded images
    pub format: String,
    /// Extensions stored exactly as uploaded
    pub ignore_formats: Vec<String>,
    pub max_width: u32,
    pub max_height: u32,
    /// Base URL of the service that resolves pending styles
    pub api_url: String,
    #[serde(default = "default_styles")]
    pub styles: BTreeMap<String, ImageStyle>,
}

fn default_styles() -> BTreeMap<String, ImageStyle> {
    BTreeMap::from([
        ("thumbnail".to_string(), ImageStyle::new(150, 150, "webp")),
        ("medium".to_string(), ImageStyle::new(640, 480, "webp")),
        ("large".to_string(), ImageStyle::new(1280, 960, "webp")),
    ])
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            format: "webp".to_string(),
            ignore_formats: vec!["gif".to_string(), "svg".to_string()],
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            api_url: "http://localhost:8080".to_string(),
            styles: default_styles(),
        }
    }
}

impl UploadConfig {
    /// Whether images with this extension skip conversion.
    pub fn ignores(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.ignore_formats
            .iter()
            .any(|ignored| ignored.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    pub fn style(&self, name: &str) -> Option<&ImageStyle> {
        self.styles.get(name)
    }

    /// Derived styles, the original excluded.
    pub fn derived_styles(&self) -> impl Iterator<Item = (&String, &ImageStyle)> {
        self.styles
            .iter()
            .filter(|(name, _)| name.as_str() != ORIGINAL_STYLE)
    }

    /// URL handed out for a style that hasn't been generated yet.
    pub fn placeholder_url(&self, style: &str, name: &str) -> String {
        format!(
            "{}/api/v1/image/{style}/{name}",
            self.api_url.trim_end_matches('/')
        )
    }

    pub fn is_placeholder(&self, url: &str, style: &str, name: &str) -> bool {
        url == self.placeholder_url(style, name)
    }

    /// Bounds and format applied to every converted upload. An explicit
    /// `original` style wins over the max dimensions.
    pub fn original_options(&self) -> ResizeOptions {
        let mut options = match self.styles.get(ORIGINAL_STYLE) {
            Some(style) => ResizeOptions::from(style),
            None => ResizeOptions {
                width: self.max_width,
                height: self.max_height,
                format: None,
            },
        };
        if options.format.is_none() && !self.format.trim().is_empty() {
            options.format = Some(self.format.trim().to_lowercase());
        }
        options
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub images: UploadConfig,
}

impl AppConfig {
    /// Defaults, then `path` (or `./fieldfiles.toml` when present), then
    /// `FIELDFILES__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = UploadConfig::default();
        let builder = Config::builder()
            .set_default("storage.default", "local")?
            .set_default("storage.local.root", storage_root_default())?
            .set_default("storage.local.public_url", "http://localhost:8080/uploads")?
            .set_default("images.format", defaults.format)?
            .set_default("images.ignore_formats", defaults.ignore_formats)?
            .set_default("images.max_width", i64::from(defaults.max_width))?
            .set_default("images.max_height", i64::from(defaults.max_height))?
            .set_default("images.api_url", defaults.api_url)?;

        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("fieldfiles").required(false)),
        };

        builder
            // eg FIELDFILES__STORAGE__DEFAULT=s3
            .add_source(
                Environment::with_prefix("FIELDFILES")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("images.ignore_formats")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Builds every configured storage backend.
    pub fn storages(&self) -> Result<Storages, AttachmentError> {
        let local = LocalStorage::new(&self.storage.local.root, &self.storage.local.public_url);
        let mut storages = Storages::new(Arc::new(local));
        if let Some(s3) = &self.storage.s3 {
            let s3 = S3Storage::new(s3).map_err(|err| {
                AttachmentError::Configuration(format!("s3 storage: {err}"))
            })?;
            storages = storages.with(Arc::new(s3));
        }
        storages.with_default(&self.storage.default)
    }
}
