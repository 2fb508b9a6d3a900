use serde::Deserialize;

use crate::backend::Backend;

pub const DEFAULT_SOURCE_NAME: &str = "<input>";

/// Settings for one compilation. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub backend: Backend,
    /// File name reported by runtime exceptions.
    pub source_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            source_name: DEFAULT_SOURCE_NAME.to_string(),
        }
    }
}

impl Options {
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }
}
