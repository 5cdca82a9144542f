use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use crate::query::DEFAULT_TOP_N;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub dashboard: DashboardConfig,
    pub formatting: FormattingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Override for the history database location; the default lives under
    /// the home directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DashboardConfig {
    pub top_n: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FormattingConfig {
    pub number_comma: bool,
    pub number_human: bool,
    pub locale: String,
    pub decimal_places: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig { path: None },
            dashboard: DashboardConfig {
                top_n: DEFAULT_TOP_N,
            },
            formatting: FormattingConfig {
                number_comma: false,
                number_human: false,
                locale: "en".to_string(),
                decimal_places: 2,
            },
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".spintrace.toml"))
    }

    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Some(config))
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("✅ Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }
}

/// The history database location: the config override if set, otherwise the
/// default under the home directory.
pub fn history_db_path(config: &Config) -> Result<PathBuf> {
    match &config.store.path {
        Some(path) => Ok(path.clone()),
        None => crate::store::default_db_path(),
    }
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("📝 Created default configuration file at:");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        None => {
            println!("No configuration found.  Run `spintrace config init` to create one.");
        }
    }
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "store-path" => {
            config.store.path = Some(PathBuf::from(value));
        }
        "top-n" => {
            let n: usize = value.parse().context("top-n must be a positive integer")?;
            if n == 0 {
                anyhow::bail!("top-n must be a positive integer");
            }
            config.dashboard.top_n = n;
        }
        "number-comma" => {
            config.formatting.number_comma =
                value.parse().context("number-comma must be true or false")?;
        }
        "number-human" => {
            config.formatting.number_human =
                value.parse().context("number-human must be true or false")?;
        }
        "locale" => {
            config.formatting.locale = value.to_string();
        }
        "decimal-places" => {
            config.formatting.decimal_places =
                value.parse().context("decimal-places must be a number")?;
        }
        _ => {
            anyhow::bail!(
                "Unknown configuration key: {key} (expected store-path, top-n, number-comma, number-human, locale, or decimal-places)"
            );
        }
    }

    config.save(false)
}
