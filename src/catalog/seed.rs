// Built-in catalog seed
// The stock set of downloadable recognition models, registered on first open

use rusqlite::params;

use super::descriptor::CatalogError;
use super::store::CatalogStore;

/// Seed model table: (id, language_code, language_name, variant, archive, size_mb, accuracy)
const SEED_MODELS: &[(&str, &str, &str, &str, &str, u64, f64)] = &[
    ("en-us-small", "en-US", "English (US)", "small", "vosk-model-en-us-0.22.tar.gz", 40, 0.92),
    ("es-small", "es", "Spanish", "small", "vosk-model-es-0.42.tar.gz", 39, 0.90),
    ("fr-small", "fr", "French", "small", "vosk-model-fr-0.22.tar.gz", 41, 0.89),
    ("de-small", "de", "German", "small", "vosk-model-de-0.21.tar.gz", 43, 0.88),
    ("ru-small", "ru", "Russian", "small", "vosk-model-ru-0.42.tar.gz", 45, 0.91),
    ("zh-small", "zh-CN", "Chinese (Mandarin)", "small", "vosk-model-cn-0.22.tar.gz", 42, 0.87),
    ("ja-small", "ja", "Japanese", "small", "vosk-model-ja-0.22.tar.gz", 48, 0.86),
    ("pt-small", "pt-BR", "Portuguese (Brazil)", "small", "vosk-model-pt-0.3.tar.gz", 44, 0.89),
    ("it-small", "it", "Italian", "small", "vosk-model-it-0.22.tar.gz", 40, 0.88),
    ("hi-small", "hi", "Hindi", "small", "vosk-model-hi-0.22.tar.gz", 46, 0.85),
];

const SEED_BASE_URL: &str = "https://alphacephei.com/vosk/models";

impl CatalogStore {
    /// Register the built-in models. Idempotent: ids that already exist are
    /// left untouched. Returns the number of newly inserted descriptors.
    pub fn seed_builtin(&self) -> Result<usize, CatalogError> {
        self.with_connection(|conn| {
            let now = chrono::Utc::now().to_rfc3339();
            let mut inserted = 0;

            for (id, code, name, variant, archive, size_mb, accuracy) in SEED_MODELS {
                let url = format!("{}/{}", SEED_BASE_URL, archive);
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO models (
                        id, language_code, language_name, variant, source_url,
                        expected_size, downloaded, local_path, accuracy_estimate, active,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, 1, ?8, ?8)",
                    params![id, code, name, variant, url, (size_mb * 1024 * 1024) as i64, accuracy, now],
                )?;
                inserted += changed;
            }

            if inserted > 0 {
                log::info!("Seeded catalog with {} built-in models", inserted);
            }
            Ok(inserted)
        })
    }
}
