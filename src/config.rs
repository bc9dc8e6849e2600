use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Connection pool size. Pipeline jobs and search queries share one
    /// pool; per-key upserts need no cross-connection coordination.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Blob storage backend selection. `backend = "local"` keeps blobs under a
/// root directory; `backend = "s3"` talks to an S3-compatible endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_secs: u64,
}

fn default_backend() -> String {
    "local".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_presign_expiry() -> u64 {
    900
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Languages passed to the OCR backend for every document, ordered by
    /// expected corpus skew. Joined as `eng+fra` on the tesseract CLI.
    #[serde(default = "default_ocr_languages")]
    pub ocr_languages: Vec<String>,
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: String,
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: String,
    #[serde(default = "default_pdftotext_path")]
    pub pdftotext_path: String,
    #[serde(default = "default_antiword_path")]
    pub antiword_path: String,
    /// Extracted text shorter than this is treated as a scan and OCR'd.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    /// Characters requested by the cheap PDF sniff pass.
    #[serde(default = "default_sniff_chars")]
    pub pdf_sniff_chars: usize,
    /// Sniff yield above this routes to full direct extraction.
    #[serde(default = "default_sniff_threshold")]
    pub pdf_sniff_threshold: usize,
    #[serde(default = "default_raster_dpi")]
    pub raster_dpi: u32,
    /// Wall-clock budget for one document's full pipeline run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fallback_language")]
    pub fallback_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_languages: default_ocr_languages(),
            tesseract_path: default_tesseract_path(),
            pdftoppm_path: default_pdftoppm_path(),
            pdftotext_path: default_pdftotext_path(),
            antiword_path: default_antiword_path(),
            min_text_chars: default_min_text_chars(),
            pdf_sniff_chars: default_sniff_chars(),
            pdf_sniff_threshold: default_sniff_threshold(),
            raster_dpi: default_raster_dpi(),
            timeout_secs: default_timeout_secs(),
            fallback_language: default_fallback_language(),
        }
    }
}

fn default_ocr_languages() -> Vec<String> {
    vec!["eng".to_string(), "fra".to_string()]
}
fn default_tesseract_path() -> String {
    "tesseract".to_string()
}
fn default_pdftoppm_path() -> String {
    "pdftoppm".to_string()
}
fn default_pdftotext_path() -> String {
    "pdftotext".to_string()
}
fn default_antiword_path() -> String {
    "antiword".to_string()
}
fn default_min_text_chars() -> usize {
    100
}
fn default_sniff_chars() -> usize {
    500
}
fn default_sniff_threshold() -> usize {
    50
}
fn default_raster_dpi() -> u32 {
    300
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_fallback_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Matching documents kept per owner in a merged result entry.
    #[serde(default = "default_max_docs_per_owner")]
    pub max_docs_per_owner: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_docs_per_owner: default_max_docs_per_owner(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_page_size() -> i64 {
    20
}
fn default_max_docs_per_owner() -> usize {
    5
}
fn default_candidate_k() -> i64 {
    200
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.storage.backend.as_str() {
        "local" => {
            if config.storage.root.is_none() {
                anyhow::bail!("storage.root must be set when backend is 'local'");
            }
        }
        "s3" => {
            if config.storage.bucket.is_none() {
                anyhow::bail!("storage.bucket must be set when backend is 's3'");
            }
        }
        other => anyhow::bail!("Unknown storage backend: '{}'. Must be local or s3.", other),
    }

    if config.pipeline.ocr_languages.is_empty() {
        anyhow::bail!("pipeline.ocr_languages must list at least one language");
    }
    if config.pipeline.min_text_chars == 0 {
        anyhow::bail!("pipeline.min_text_chars must be > 0");
    }
    if config.pipeline.pdf_sniff_threshold >= config.pipeline.pdf_sniff_chars {
        anyhow::bail!("pipeline.pdf_sniff_threshold must be below pdf_sniff_chars");
    }
    if config.search.page_size < 1 {
        anyhow::bail!("search.page_size must be >= 1");
    }
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sdx.toml");
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn minimal_local_config_parses_with_defaults() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/sdx.sqlite"

[storage]
backend = "local"
root = "/tmp/blobs"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.max_connections, 5);
        assert_eq!(cfg.pipeline.min_text_chars, 100);
        assert_eq!(cfg.pipeline.pdf_sniff_threshold, 50);
        assert_eq!(cfg.pipeline.ocr_languages, vec!["eng", "fra"]);
        assert_eq!(cfg.search.max_docs_per_owner, 5);
    }

    #[test]
    fn s3_backend_requires_bucket() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/sdx.sqlite"

[storage]
backend = "s3"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_pool_size_rejected() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/sdx.sqlite"
max_connections = 0

[storage]
backend = "local"
root = "/tmp/blobs"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "/tmp/sdx.sqlite"

[storage]
backend = "ftp"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
