use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;

/// Tuning knobs for a generator. Every key is optional.
///
/// ```toml
/// parallel_threshold = 512
/// num_threads = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minimum number of flattened records before evaluation goes parallel.
    pub parallel_threshold: usize,
    /// Size of a dedicated rayon pool. `None` uses the global pool.
    pub num_threads: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel_threshold: 256,
            num_threads: None,
        }
    }
}

impl Settings {
    /// Loads from an optional settings file (any format `config` detects by
    /// extension) overlaid with `MATRIX_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let cfg = builder
            .add_source(Environment::with_prefix("MATRIX").try_parsing(true))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}
