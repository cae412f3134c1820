//! # Batching Configuration
//!
//! Tunables for the merge pass and the proxy pools. Every field has a
//! default, so a config file only needs to name what it overrides.
//!
//! ```toml
//! use_layer_mask = true
//! prewarm_proxies = 8
//!
//! [default_materials]
//! standard = 1
//! anti_aliased = 2
//! text = 3
//! ```

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::render::types::MaterialId;

/// Fallback materials for handles that carry no material of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultMaterials {
    /// Plain UI mesh material
    pub standard: MaterialId,
    /// Material used when anti-aliasing is requested
    pub anti_aliased: MaterialId,
    /// Material used for text elements
    pub text: MaterialId,
}

impl Default for DefaultMaterials {
    fn default() -> Self {
        Self {
            standard: MaterialId(0),
            anti_aliased: MaterialId(1),
            text: MaterialId(2),
        }
    }
}

impl DefaultMaterials {
    /// Resolve the fallback for a (anti-aliasing, text) combination; text wins
    pub fn resolve(&self, anti_aliasing: bool, is_text: bool) -> MaterialId {
        if is_text {
            self.text
        } else if anti_aliasing {
            self.anti_aliased
        } else {
            self.standard
        }
    }
}

/// Merge pass and pooling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Materials substituted when a handle has none
    pub default_materials: DefaultMaterials,

    /// Require identical camera layer masks for two handles to share a batch
    pub use_layer_mask: bool,

    /// Minimum effective alpha for a handle to be drawn
    pub visibility_epsilon: f32,

    /// Reserve hint for descriptor and bounding-box lists
    pub descriptor_capacity: usize,

    /// Proxies created up front
    pub prewarm_proxies: usize,

    /// Merged-buffer containers created up front
    pub prewarm_mesh_containers: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            default_materials: DefaultMaterials::default(),
            use_layer_mask: false,
            visibility_epsilon: 1e-4,
            descriptor_capacity: 32,
            prewarm_proxies: 0,
            prewarm_mesh_containers: 0,
        }
    }
}

impl Config for BatchingConfig {}

impl BatchingConfig {
    /// Check that loaded values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.visibility_epsilon.is_finite() || self.visibility_epsilon < 0.0 {
            return Err(ConfigError::Invalid {
                field: "visibility_epsilon",
                reason: format!(
                    "must be a finite non-negative number, got {}",
                    self.visibility_epsilon
                ),
            });
        }
        Ok(())
    }

    /// Load from a `.toml` or `.ron` file and validate
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
