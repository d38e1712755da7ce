//! Addon configuration.
//!
//! The addon reads an optional `py_init.toml` from its own directory. Every
//! field has a default matching the standard application layout, so the file
//! only needs to exist when something differs.

use anyhow::{Context, Result};
use pyinit_runtime::SymbolScope;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name looked up next to the addon's shared object.
pub const CONFIG_FILE_NAME: &str = "py_init.toml";

/// Complete addon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Managed runtime settings
    pub runtime: RuntimeConfig,
    /// Directory layout relative to the addon
    pub layout: LayoutConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Managed runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Native binding library preloaded before the runtime starts
    /// Default: "librte_runtime_python.so"
    pub native_library: String,
    /// Symbol visibility of the preloaded library
    /// Default: global
    pub symbol_scope: SymbolScope,
    /// Package that extension modules are imported under
    /// Default: "addon.extension"
    pub extension_package: String,
}

/// Directory layout relative to the directory holding the addon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Extensions directory
    /// Default: "../.."
    pub extensions_dir: String,
    /// Application root
    /// Default: "../../../.."
    pub app_root: String,
    /// Subdirectories of the application root added to the search path,
    /// in order, ahead of the root itself
    /// Default: ["lib", "interface"]
    pub search_subdirs: Vec<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            native_library: "librte_runtime_python.so".to_string(),
            symbol_scope: SymbolScope::Global,
            extension_package: "addon.extension".to_string(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            extensions_dir: "../..".to_string(),
            app_root: "../../../..".to_string(),
            search_subdirs: vec!["lib".to_string(), "interface".to_string()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BootstrapConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `py_init.toml` from `dir`, if there is one
    pub fn find_in(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        Self::load(&path).map(Some)
    }

    /// Load `py_init.toml` from `dir`, falling back to defaults
    ///
    /// A missing file is normal. A broken one is reported and ignored: the
    /// addon must still come up with the standard layout.
    pub fn load_or_default(dir: &Path) -> Self {
        match Self::find_in(dir) {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Ignoring configuration: {:#}", e);
                Self::default()
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.runtime.native_library.trim().is_empty() {
            anyhow::bail!("runtime.native_library must not be empty");
        }

        let package = &self.runtime.extension_package;
        let valid_package = !package.is_empty()
            && package.split('.').all(|part| {
                let mut chars = part.chars();
                matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
                    && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
            });
        if !valid_package {
            anyhow::bail!(
                "Invalid runtime.extension_package: {:?}. Must be dot-separated identifiers",
                package
            );
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid logging.level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = BootstrapConfig::default();
        assert_eq!(config.runtime.native_library, "librte_runtime_python.so");
        assert_eq!(config.runtime.symbol_scope, SymbolScope::Global);
        assert_eq!(config.runtime.extension_package, "addon.extension");
        assert_eq!(config.layout.extensions_dir, "../..");
        assert_eq!(config.layout.app_root, "../../../..");
        assert_eq!(config.layout.search_subdirs, vec!["lib", "interface"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = BootstrapConfig::from_toml(
            r#"
[runtime]
symbol_scope = "local"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.runtime.symbol_scope, SymbolScope::Local);
        assert_eq!(config.runtime.native_library, "librte_runtime_python.so");
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_package() {
        for package in ["", "addon..extension", "addon.1ext", "addon-extension"] {
            let mut config = BootstrapConfig::default();
            config.runtime.extension_package = package.to_string();
            assert!(config.validate().is_err(), "accepted {:?}", package);
        }
    }

    #[test]
    fn test_invalid_log_level() {
        let result = BootstrapConfig::from_toml("[logging]\nlevel = \"loud\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            BootstrapConfig::load_or_default(temp_dir.path()),
            BootstrapConfig::default()
        );

        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[runtime]\nextension_package = \"ten_packages.extension\"\n",
        )
        .unwrap();
        let config = BootstrapConfig::load_or_default(temp_dir.path());
        assert_eq!(config.runtime.extension_package, "ten_packages.extension");

        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "not = [valid").unwrap();
        assert_eq!(
            BootstrapConfig::load_or_default(temp_dir.path()),
            BootstrapConfig::default()
        );
    }

    #[test]
    fn test_find_in() {
        let temp_dir = TempDir::new().unwrap();
        assert!(BootstrapConfig::find_in(temp_dir.path()).unwrap().is_none());

        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "[logging]\nlevel = \"warn\"\n").unwrap();
        let config = BootstrapConfig::find_in(temp_dir.path()).unwrap().unwrap();
        assert_eq!(config.logging.level, "warn");

        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(BootstrapConfig::find_in(temp_dir.path()).is_err());
    }
}
