use quarry_core::WorldId;
use quarry_server::PipelineConfig;
use quarry_world::MineConfig;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/quarry.toml";
const DEFAULT_WORLD: &str = "mines";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// World the driver's commands operate on.
    pub world: String,
    pub pipeline: PipelineConfig,
    pub mines: MineConfig,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            world: DEFAULT_WORLD.to_string(),
            pipeline: PipelineConfig::default(),
            mines: MineConfig::default(),
        }
    }
}

impl QuarryConfig {
    pub fn world_id(&self) -> WorldId {
        let name = self.world.trim();
        if name.is_empty() {
            WorldId::new(DEFAULT_WORLD)
        } else {
            WorldId::new(name)
        }
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<QuarryConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    QuarryConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else {
                    warn!("Config not found at {}. Using defaults", path.display());
                }
                QuarryConfig::default()
            }
        }
    }

    #[cfg(test)]
    pub fn save_to_path(&self, path: &Path) -> anyhow::Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }
}
