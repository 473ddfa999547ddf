//! # Settings Module
//!
//! ## Purpose
//! Central place for the numeric defaults, policies and file locations used by the
//! group contribution workflow, so the CLI and the examples never hardcode them.
//!
//! ## Architecture
//! - **GCSettings**: serializable configuration (aqueous conditions, regression options,
//!   input and output files, logging)
//! - **SettingsManager**: loads `gc_settings.json` if present, otherwise defaults;
//!   validates updates and persists them
//! - **Global Access**: `with_settings` / `with_settings_mut` over a `OnceLock<Mutex<_>>`
//!
//! ## Configuration Format
//! ```json
//! {
//!   "aqueous": {"pH": 7.0, "pMg": 14.0, "ionic_strength": 0.1, "temperature": 298.15},
//!   "model": {"eps": 1e-10, "nullspace_tolerance": 0.001, "max_chain_length": 3,
//!             "override_gc_with_measurements": true},
//!   "groups_file": null,
//!   "training_file": "gc_training.txt",
//!   "compounds_file": "gc_compounds.txt",
//!   "tables_file": "gc_tables.json",
//!   "log_file": null,
//!   "verbosity": 1
//! }
//! ```
//!
//! ## Usage
//! ```rust, ignore
//! use GibbsGC::settings::{with_settings, with_settings_mut};
//! let pH = with_settings(|manager| manager.get_config().aqueous.pH);
//! with_settings_mut(|manager| manager.set_training_file("my_training.txt"))?;
//! ```
use crate::GroupContribution::group_contribution::GCOptions;
use crate::Thermodynamics::pseudoisomer::AqueousParams;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

pub const SETTINGS_FILE: &str = "gc_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GCSettings {
    pub aqueous: AqueousParams,
    pub model: GCOptions,
    /// JSON group library; `None` means the built-in library
    #[serde(default)]
    pub groups_file: Option<String>,
    pub training_file: String,
    pub compounds_file: String,
    pub tables_file: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
}

fn default_verbosity() -> u8 {
    1
}

impl Default for GCSettings {
    fn default() -> Self {
        Self {
            aqueous: AqueousParams::default(),
            model: GCOptions::default(),
            groups_file: None,
            training_file: "gc_training.txt".to_string(),
            compounds_file: "gc_compounds.txt".to_string(),
            tables_file: "gc_tables.json".to_string(),
            log_file: None,
            verbosity: default_verbosity(),
        }
    }
}

/// Loads, validates and persists `GCSettings`.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config: GCSettings,
    config_file: String,
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsManager {
    /// Reads `gc_settings.json` from the working directory, defaults if absent or invalid.
    pub fn new() -> Self {
        Self::with_config_file(SETTINGS_FILE)
    }

    pub fn with_config_file(config_file: &str) -> Self {
        let config = Self::load_config(config_file).unwrap_or_default();
        Self {
            config,
            config_file: config_file.to_string(),
        }
    }

    fn load_config(config_file: &str) -> Result<GCSettings, Box<dyn std::error::Error>> {
        if Path::new(config_file).exists() {
            let content = fs::read_to_string(config_file)?;
            let config: GCSettings = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(GCSettings::default())
        }
    }

    /// Writes the configuration back. Does nothing under `cfg(test)`.
    pub fn save_config(&self) -> Result<(), Box<dyn std::error::Error>> {
        #[cfg(test)]
        {
            return Ok(());
        }

        #[cfg(not(test))]
        {
            let content = serde_json::to_string_pretty(&self.config)?;
            fs::write(&self.config_file, content)?;
            Ok(())
        }
    }

    pub fn get_config(&self) -> &GCSettings {
        &self.config
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    fn existing(path: &str) -> Result<(), Box<dyn std::error::Error>> {
        if !Path::new(path).exists() {
            return Err(format!("File does not exist: {}", path).into());
        }
        Ok(())
    }

    pub fn set_groups_file(&mut self, path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(path) = path {
            Self::existing(path)?;
        }
        self.config.groups_file = path.map(|p| p.to_string());
        self.save_config()
    }

    pub fn set_training_file(&mut self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        Self::existing(path)?;
        self.config.training_file = path.to_string();
        self.save_config()
    }

    pub fn set_compounds_file(&mut self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        Self::existing(path)?;
        self.config.compounds_file = path.to_string();
        self.save_config()
    }

    /// the tables file is an output, it need not exist yet
    pub fn set_tables_file(&mut self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        if path.trim().is_empty() {
            return Err("Tables file name is empty".into());
        }
        self.config.tables_file = path.to_string();
        self.save_config()
    }

    pub fn set_aqueous(&mut self, params: AqueousParams) -> Result<(), Box<dyn std::error::Error>> {
        if !(0.0..=14.0).contains(&params.pH) {
            return Err(format!("pH out of range: {}", params.pH).into());
        }
        if params.ionic_strength < 0.0 {
            return Err(format!("negative ionic strength: {}", params.ionic_strength).into());
        }
        if params.temperature <= 0.0 {
            return Err(format!("temperature must be positive: {}", params.temperature).into());
        }
        self.config.aqueous = params;
        self.save_config()
    }

    pub fn set_model_options(&mut self, options: GCOptions) -> Result<(), Box<dyn std::error::Error>> {
        if options.eps <= 0.0 || options.nullspace_tolerance <= 0.0 {
            return Err("tolerances must be positive".into());
        }
        if options.max_chain_length == 0 {
            return Err("phosphate chains must be at least one unit long".into());
        }
        self.config.model = options;
        self.save_config()
    }

    pub fn set_override_with_measurements(&mut self, value: bool) -> Result<(), Box<dyn std::error::Error>> {
        self.config.model.override_gc_with_measurements = value;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.config = GCSettings::default();
        self.save_config()
    }

    /// (display name, value) pairs for menus
    pub fn display_entries(&self) -> Vec<(&'static str, String)> {
        let c = &self.config;
        vec![
            ("pH", c.aqueous.pH.to_string()),
            ("pMg", c.aqueous.pMg.to_string()),
            ("Ionic strength [M]", c.aqueous.ionic_strength.to_string()),
            ("Temperature [K]", c.aqueous.temperature.to_string()),
            ("Regression eps", c.model.eps.to_string()),
            ("Nullspace tolerance", c.model.nullspace_tolerance.to_string()),
            ("Max phosphate chain", c.model.max_chain_length.to_string()),
            (
                "Override estimates with measurements",
                c.model.override_gc_with_measurements.to_string(),
            ),
            (
                "Groups file",
                c.groups_file.clone().unwrap_or_else(|| "built-in".to_string()),
            ),
            ("Training file", c.training_file.clone()),
            ("Compounds file", c.compounds_file.clone()),
            ("Tables file", c.tables_file.clone()),
        ]
    }

    pub fn to_table_string(&self) -> String {
        let mut table = Table::new();
        table.add_row(row!["Setting", "Value"]);
        for (name, value) in self.display_entries() {
            table.add_row(row![name, value]);
        }
        table.to_string()
    }
}

static GLOBAL_SETTINGS: OnceLock<Mutex<SettingsManager>> = OnceLock::new();

/// Exclusive access to the global manager; a poisoned lock is recovered.
pub fn get_settings_manager() -> MutexGuard<'static, SettingsManager> {
    let mutex = GLOBAL_SETTINGS.get_or_init(|| Mutex::new(SettingsManager::new()));
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn with_settings<F, R>(f: F) -> R
where
    F: FnOnce(&SettingsManager) -> R,
{
    let manager = get_settings_manager();
    f(&manager)
}

pub fn with_settings_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut SettingsManager) -> R,
{
    let mut manager = get_settings_manager();
    f(&mut manager)
}
