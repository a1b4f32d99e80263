// Service configuration
//
// Construction-time settings for the speech core. Loading persisted
// configuration files is a collaborator concern; this module only defines
// the knobs and their defaults.

use once_cell::sync::Lazy;
use std::path::PathBuf;

static DEFAULT_DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxtailor")
});

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding installed model directories (one per model id).
    pub models_dir: PathBuf,
    /// Path of the SQLite catalog database.
    pub catalog_path: PathBuf,
    /// Sample rate every audio stream must carry, in Hz.
    pub sample_rate: u32,
    /// Decode chunk size in samples. Utterance boundaries depend on where
    /// chunks fall, so this must stay constant for deterministic results.
    pub chunk_samples: usize,
    /// Per-word duration used to estimate a segment's end time when the
    /// engine reports no word timings.
    pub seconds_per_word: f64,
    /// Upper bound for downloads whose content length is not declared.
    /// Exceeding it aborts the transfer with a resource-exhausted error.
    pub max_unsized_download_bytes: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models_dir: DEFAULT_DATA_DIR.join("models"),
            catalog_path: DEFAULT_DATA_DIR.join("voxtailor.db"),
            sample_rate: 16_000,
            chunk_samples: 4_000,
            seconds_per_word: 0.5,
            max_unsized_download_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    /// Config rooted at an explicit data directory instead of the platform
    /// default. Used by tests and embedders that manage their own paths.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            models_dir: data_dir.join("models"),
            catalog_path: data_dir.join("voxtailor.db"),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_share_a_root() {
        let config = ServiceConfig::default();
        assert_eq!(config.models_dir.parent(), config.catalog_path.parent());
    }

    #[test]
    fn with_data_dir_overrides_paths_only() {
        let config = ServiceConfig::with_data_dir("/tmp/vt-test");
        assert_eq!(config.models_dir, PathBuf::from("/tmp/vt-test/models"));
        assert_eq!(
            config.catalog_path,
            PathBuf::from("/tmp/vt-test/voxtailor.db")
        );
        assert_eq!(config.chunk_samples, ServiceConfig::default().chunk_samples);
    }
}
