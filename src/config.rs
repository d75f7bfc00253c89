//! Blog configuration.
//!
//! Handles loading and validating `config.toml` from the blog root. All
//! fields are optional in the file; defaults are filled once at load time so
//! the rest of the pipeline never falls back ad hoc.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! title = "My Blog"
//! author = ""
//! base_url = ""
//!
//! posts_path = "posts"          # Source tree layout
//! pages_path = "pages"
//! partials_path = "partials"
//! statics_path = "statics"
//! post_template = "templates/post.html"
//! tag_template = "templates/tag.html"
//! output_path = "dist"
//!
//! slug_template = "{{ year }}/{{ month }}/{{ day }}/{{ title_slug }}"
//! parallelism = 4               # Worker pool size, minimum 1
//! post_sort_key = "posted"      # posted | capture-date | index
//! post_sort_ascending = false   # Invert the sort key's default direction
//!
//! [images]
//! large = 2048                  # Variant widths in pixels
//! medium = 1024
//! small = 512
//!
//! [deploy]
//! container = ""                # Remote container identifier
//! distribution = ""             # CDN distribution id; empty = no invalidation
//! fan_out = 8                   # Concurrent uploads
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{SortKey, Variant};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Blog configuration loaded from `config.toml`.
///
/// User config files need only specify the values they want to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlogConfig {
    /// Site title, available to every template.
    pub title: String,
    pub author: String,
    pub base_url: String,

    /// Source-tree locations, relative to the blog root.
    pub posts_path: String,
    pub pages_path: String,
    pub partials_path: String,
    pub statics_path: String,
    /// Template rendered once per post.
    pub post_template: String,
    /// Template rendered once per tag.
    pub tag_template: String,
    /// Output tree, relative to the blog root.
    pub output_path: String,

    /// Template for the canonical post path. Placeholders: `year`, `month`,
    /// `day` (zero-padded) and `title_slug`.
    pub slug_template: String,

    /// Worker pool size for the per-post build phase. Clamped to at least 1.
    pub parallelism: usize,

    pub post_sort_key: SortKey,
    /// Inverts the sort key's default direction (dates default newest-first,
    /// `index` defaults to enumeration order).
    pub post_sort_ascending: bool,

    pub images: ImagesConfig,
    pub deploy: DeployConfig,
}

/// Image variant widths in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub large: u32,
    pub medium: u32,
    pub small: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            large: 2048,
            medium: 1024,
            small: 512,
        }
    }
}

impl ImagesConfig {
    pub fn width(&self, variant: Variant) -> u32 {
        match variant {
            Variant::Large => self.large,
            Variant::Medium => self.medium,
            Variant::Small => self.small,
        }
    }
}

/// Remote publication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Remote container identifier for the sync engine.
    pub container: String,
    /// CDN distribution id; empty disables invalidation.
    pub distribution: String,
    /// Concurrent upload fan-out.
    pub fan_out: usize,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            container: String::new(),
            distribution: String::new(),
            fan_out: 8,
        }
    }
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            title: "My Blog".to_string(),
            author: String::new(),
            base_url: String::new(),
            posts_path: "posts".to_string(),
            pages_path: "pages".to_string(),
            partials_path: "partials".to_string(),
            statics_path: "statics".to_string(),
            post_template: "templates/post.html".to_string(),
            tag_template: "templates/tag.html".to_string(),
            output_path: "dist".to_string(),
            slug_template: "{{ year }}/{{ month }}/{{ day }}/{{ title_slug }}".to_string(),
            parallelism: 4,
            post_sort_key: SortKey::default(),
            post_sort_ascending: false,
            images: ImagesConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

/// Name of the config file within the blog root.
pub const CONFIG_FILENAME: &str = "config.toml";

impl BlogConfig {
    /// Load from a specific file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from the blog root, or stock defaults if the file
    /// doesn't exist. A present-but-invalid file is an error, not a default.
    pub fn load_from_root(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILENAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, width) in [
            ("images.large", self.images.large),
            ("images.medium", self.images.medium),
            ("images.small", self.images.small),
        ] {
            if width == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.slug_template.trim().is_empty() {
            return Err(ConfigError::Validation(
                "slug_template must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker pool size with the minimum of 1 applied.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }

    /// Upload fan-out with the minimum of 1 applied.
    pub fn effective_fan_out(&self) -> usize {
        self.deploy.fan_out.max(1)
    }

    pub fn posts_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.posts_path)
    }

    pub fn pages_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.pages_path)
    }

    pub fn partials_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.partials_path)
    }

    pub fn statics_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.statics_path)
    }

    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.output_path)
    }
}
