//! Runtime settings
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual values. Every section has defaults so a file only
//! needs the keys it changes:
//!
//! ```toml
//! [llm]
//! model = "gpt-4o"
//!
//! [face]
//! endpoint = "https://my-face.cognitiveservices.azure.com"
//!
//! [storage.blob]
//! root = "/var/lib/idverify/blobs"
//!
//! [pipeline]
//! pdf_dpi = 200
//! analyze_document_photo = true
//! ```

use crate::error::{Result, VerifyError};
use idverify_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Language-model connection settings.
///
/// When `azure_endpoint` is set, requests go to the Azure OpenAI deployment
/// named by `model`; otherwise to the OpenAI-compatible `api_base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_base: String,
    pub azure_endpoint: Option<String>,
    pub azure_api_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            azure_endpoint: None,
            azure_api_version: "2024-08-01-preview".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Face service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceSettings {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// How long the service keeps detected face ids
    pub face_id_ttl_secs: u32,
    /// Pixels added around the detected face box when annotating or cropping
    pub buffer: u32,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            face_id_ttl_secs: 120,
            buffer: 10,
        }
    }
}

/// Pipeline behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Per-request scratch directories are created under this root
    pub work_dir: PathBuf,
    /// PDF rasterization resolution
    pub pdf_dpi: u32,
    /// Detect and crop the face printed on the document itself
    pub analyze_document_photo: bool,
    /// Directory with prompt template overrides
    pub prompt_dir: Option<PathBuf>,
    /// Lifetime of signed URLs handed to the UI
    pub sas_ttl_secs: u64,
    /// Largest request body the API accepts; base64 inflates uploads by a third
    pub max_request_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir().join("idverify"),
            pdf_dpi: 300,
            analyze_document_photo: false,
            prompt_dir: None,
            sas_ttl_secs: 3600,
            max_request_bytes: 32 * 1024 * 1024,
        }
    }
}

/// All runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub face: FaceSettings,
    pub storage: StorageConfig,
    pub pipeline: PipelineSettings,
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Settings {
    /// Defaults with environment overrides applied
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    /// Parse settings from a TOML file (no environment overrides)
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| VerifyError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// File settings (if a path is given) with environment overrides on top
    ///
    /// # Errors
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Override values from environment variables that are set
    pub fn apply_env(&mut self) {
        let llm = &mut self.llm;
        if let Some(endpoint) = env_string("AZURE_OPENAI_ENDPOINT") {
            llm.azure_endpoint = Some(endpoint);
        }
        if let Some(key) = env_string("AZURE_OPENAI_API_KEY").or_else(|| env_string("OPENAI_API_KEY")) {
            llm.api_key = key;
        }
        if let Some(model) = env_string("AZURE_OPENAI_MODEL").or_else(|| env_string("LLM_MODEL")) {
            llm.model = model;
        }
        if let Some(version) = env_string("AZURE_OPENAI_API_VERSION") {
            llm.azure_api_version = version;
        }
        if let Some(base) = env_string("OPENAI_API_BASE") {
            llm.api_base = base;
        }
        if let Some(max_tokens) = env_parse("LLM_MAX_TOKENS") {
            llm.max_tokens = max_tokens;
        }
        if let Some(timeout) = env_parse("LLM_TIMEOUT_SECS") {
            llm.timeout_secs = timeout;
        }

        let face = &mut self.face;
        if let Some(endpoint) = env_string("FACE_API_ENDPOINT") {
            face.endpoint = endpoint;
        }
        if let Some(key) = env_string("FACE_API_KEY") {
            face.api_key = key;
        }
        if let Some(timeout) = env_parse("FACE_TIMEOUT_SECS") {
            face.timeout_secs = timeout;
        }

        let storage = &mut self.storage;
        if let Some(root) = env_string("STORAGE_ROOT") {
            storage.blob.root = PathBuf::from(root);
        }
        if let Some(url) = env_string("STORAGE_PUBLIC_URL") {
            storage.blob.public_base_url = url;
        }
        if let Some(container) = env_string("STORAGE_CONTAINER") {
            storage.blob.container = container;
        }
        if let Some(key) = env_string("STORAGE_ACCOUNT_KEY") {
            storage.blob.account_key = key;
        }
        if let Some(root) = env_string("RECORDS_ROOT") {
            storage.records_root = PathBuf::from(root);
        }
        if let Some(partition) = env_string("COSMOS_CATEGORYID_VALUE") {
            storage.partition = partition;
        }

        let pipeline = &mut self.pipeline;
        if let Some(dir) = env_string("WORK_DIR") {
            pipeline.work_dir = PathBuf::from(dir);
        }
        if let Some(dpi) = env_parse("PDF_DPI") {
            pipeline.pdf_dpi = dpi;
        }
        if let Some(analyze) = env_bool("ANALYZE_DOCUMENT_PHOTO") {
            pipeline.analyze_document_photo = analyze;
        }
        if let Some(dir) = env_string("PROMPT_DIR") {
            pipeline.prompt_dir = Some(PathBuf::from(dir));
        }
        if let Some(limit) = env_parse("MAX_REQUEST_BYTES") {
            pipeline.max_request_bytes = limit;
        }
    }

    /// Reject settings no request could succeed with
    ///
    /// # Errors
    /// Returns `VerifyError::Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.pdf_dpi == 0 {
            return Err(VerifyError::Config("pipeline.pdf_dpi must be positive".into()));
        }
        if self.pipeline.max_request_bytes == 0 {
            return Err(VerifyError::Config(
                "pipeline.max_request_bytes must be positive".into(),
            ));
        }
        if self.llm.timeout_secs == 0 || self.face.timeout_secs == 0 {
            return Err(VerifyError::Config("timeouts must be positive".into()));
        }
        if self.storage.partition.is_empty() {
            return Err(VerifyError::Config("storage.partition must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: [&str; 7] = [
        "LLM_MODEL",
        "LLM_MAX_TOKENS",
        "FACE_API_ENDPOINT",
        "PDF_DPI",
        "ANALYZE_DOCUMENT_PHOTO",
        "COSMOS_CATEGORYID_VALUE",
        "MAX_REQUEST_BYTES",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.pipeline.pdf_dpi, 300);
        assert_eq!(settings.face.buffer, 10);
        assert_eq!(settings.face.face_id_ttl_secs, 120);
        assert_eq!(settings.storage.partition, "customers");
        assert_eq!(settings.pipeline.max_request_bytes, 32 * 1024 * 1024);
        assert!(!settings.pipeline.analyze_document_photo);
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("LLM_MODEL", "gpt-4o-mini");
        env::set_var("LLM_MAX_TOKENS", "2048");
        env::set_var("FACE_API_ENDPOINT", "https://face.example.com");
        env::set_var("PDF_DPI", "150");
        env::set_var("ANALYZE_DOCUMENT_PHOTO", "true");
        env::set_var("MAX_REQUEST_BYTES", "1048576");

        let settings = Settings::from_env();
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.llm.max_tokens, 2048);
        assert_eq!(settings.face.endpoint, "https://face.example.com");
        assert_eq!(settings.pipeline.pdf_dpi, 150);
        assert!(settings.pipeline.analyze_document_photo);
        assert_eq!(settings.pipeline.max_request_bytes, 1_048_576);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_file_then_env_override() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[pipeline]\npdf_dpi = 200\n\n[storage]\npartition = \"staff\"\n\n[llm]\nmodel = \"from-file\""
        )
        .unwrap();

        env::set_var("LLM_MODEL", "from-env");
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.pipeline.pdf_dpi, 200);
        assert_eq!(settings.storage.partition, "staff");
        assert_eq!(settings.llm.model, "from-env");
        // untouched sections keep their defaults
        assert_eq!(settings.face.timeout_secs, 30);

        clear_env();
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline\npdf_dpi = ").unwrap();
        let err = Settings::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_zero_dpi_rejected() {
        clear_env();
        env::set_var("PDF_DPI", "0");
        let err = Settings::load(None).unwrap_err();
        assert!(err.to_string().contains("pdf_dpi"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_request_limit_rejected() {
        clear_env();
        env::set_var("MAX_REQUEST_BYTES", "0");
        let err = Settings::load(None).unwrap_err();
        assert!(err.to_string().contains("max_request_bytes"));
        clear_env();
    }
}
