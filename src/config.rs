use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// What happens to a node's coordinates when it is reparented: `Keep`
/// preserves the local values (the object may jump on screen), `Adapt`
/// recomputes them so the world position and rotation are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReparentCoordinates {
    #[default]
    Keep,
    Adapt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "SceneConfig::default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub reparent_coordinates: ReparentCoordinates,
    #[serde(default = "SceneConfig::default_curve_resolution")]
    pub curve_resolution: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            history_limit: Self::default_history_limit(),
            reparent_coordinates: ReparentCoordinates::default(),
            curve_resolution: Self::default_curve_resolution(),
        }
    }
}

impl SceneConfig {
    fn default_history_limit() -> usize {
        32
    }

    fn default_curve_resolution() -> u32 {
        16
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Reading scene config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Parsing scene config {}", path.display()))
    }
}
