use super::schema::LocusConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Overrides the search path when set.
pub const CONFIG_ENV: &str = "LOCUS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from, in order:
    /// 1. the file named by `$LOCUS_CONFIG`
    /// 2. ./locus.yaml
    /// 3. ~/.locus/config.yaml
    /// 4. built-in defaults
    pub async fn load_default() -> Result<LocusConfig, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path)).await;
        }

        let local_config = PathBuf::from("./locus.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".locus").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        debug!("No config file found, using defaults");
        Ok(LocusConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<LocusConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: LocusConfig = serde_yaml::from_str(&content)?;
        validate(&config)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

fn unit(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("{} is outside [0, 1]", value),
        })
    }
}

/// Range checks serde cannot express.
pub fn validate(config: &LocusConfig) -> Result<(), ConfigError> {
    let w = &config.scoring.weights;
    for (key, value) in [
        ("scoring.weights.performance", w.performance),
        ("scoring.weights.stability", w.stability),
        ("scoring.weights.compatibility", w.compatibility),
        ("scoring.weights.uniqueness", w.uniqueness),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Invalid {
                key,
                reason: format!("{} is not a non-negative weight", value),
            });
        }
    }
    if w.performance + w.stability + w.compatibility + w.uniqueness <= 0.0 {
        return Err(ConfigError::Invalid {
            key: "scoring.weights",
            reason: "weights sum to zero".into(),
        });
    }

    unit("scoring.quality_floor", config.scoring.quality_floor)?;
    unit("fingerprint.min_similarity", config.fingerprint.min_similarity)?;
    unit("hidden_parent.high_confidence", config.hidden_parent.high_confidence)?;
    unit("fallback.min_confidence", config.fallback.min_confidence)?;

    if config.fallback.default_time_budget_ms == 0 {
        return Err(ConfigError::Invalid {
            key: "fallback.default_time_budget_ms",
            reason: "must be positive".into(),
        });
    }
    if config.selection.dedupe_tolerance_px < 0 {
        return Err(ConfigError::Invalid {
            key: "selection.dedupe_tolerance_px",
            reason: "must not be negative".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(validate(&LocusConfig::default()).is_ok());
    }

    #[test]
    fn test_out_of_range_values() {
        let mut config = LocusConfig::default();
        config.fingerprint.min_similarity = 1.5;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Invalid {
                key: "fingerprint.min_similarity",
                ..
            })
        ));

        let mut config = LocusConfig::default();
        config.fallback.default_time_budget_ms = 0;
        assert!(validate(&config).is_err());

        let mut config = LocusConfig::default();
        config.scoring.weights.stability = 3.0;
        assert!(validate(&config).is_ok());
        config.scoring.weights.uniqueness = -1.0;
        assert!(validate(&config).is_err());

        let mut config = LocusConfig::default();
        config.scoring.weights.performance = 0.0;
        config.scoring.weights.stability = 0.0;
        config.scoring.weights.compatibility = 0.0;
        config.scoring.weights.uniqueness = 0.0;
        assert!(validate(&config).is_err());
    }
}
