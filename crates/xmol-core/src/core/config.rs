use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Upper bound on the number of slots a container can hold.
pub const MAX_CAPACITY: usize = u32::MAX as usize - 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Requested capacity {requested} exceeds the maximum of {max}")]
    CapacityTooLarge { requested: usize, max: usize },
}

/// Construction-time settings of a [`Container`](super::container::Container).
///
/// ```toml
/// initial_capacity = 1024
/// label = "atoms"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    /// Number of element slots reserved up front.
    pub initial_capacity: usize,
    /// Name attached to the container's log events.
    pub label: Option<String>,
}

impl ContainerConfig {
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::new()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.to_string_lossy())
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Toml {
            path: origin.to_string(),
            source: e,
        })?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.initial_capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                requested: self.initial_capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(self)
    }
}

#[derive(Default)]
pub struct ContainerConfigBuilder {
    initial_capacity: Option<usize>,
    label: Option<String>,
}

impl ContainerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn build(self) -> Result<ContainerConfig, ConfigError> {
        ContainerConfig {
            initial_capacity: self.initial_capacity.unwrap_or(0),
            label: self.label,
        }
        .validate()
    }
}
