//! Application Configuration
//!
//! Service settings stored in TOML format. Every section has defaults so a
//! missing or partial file still yields a runnable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP boundary settings
    pub server: ServerConfig,
    /// Vision model settings
    pub extraction: ExtractionConfig,
    /// Image enhancement parameters
    pub enhancement: EnhancementSettings,
    /// Scratch storage settings
    pub storage: StorageConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

/// HTTP boundary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
    /// Maximum accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Accepted file extensions for uploads (lowercase, no dot)
    pub allowed_extensions: Vec<String>,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "bmp", "tiff", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "https://localhost:5173".to_string(),
            ],
        }
    }
}

/// Vision model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL of the chat completions API
    pub api_base_url: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Upper bound on a single extraction call
    pub timeout_secs: u64,
    /// Output token ceiling
    pub max_tokens: u32,
    /// Image detail hint
    pub detail: String,
    /// Instruction template file; the builtin rubric is used when unset
    pub prompt_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            max_tokens: 1500,
            detail: "high".to_string(),
            prompt_path: None,
        }
    }
}

/// Image enhancement parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSettings {
    /// Images with either side below this are upscaled
    pub upscale_below: u32,
    /// Minimum side length after upscaling
    pub upscale_target: u32,
    /// Refuse to upscale past this many output pixels
    pub max_output_pixels: u64,
    /// Skip enhancement for images with more pixels than this
    pub max_denoise_pixels: u64,
    /// Denoise filter strength for luminance
    pub denoise_luma: f32,
    /// Denoise filter strength for chrominance
    pub denoise_color: f32,
    /// Side of the square patch compared by the denoiser (odd)
    pub template_window: u32,
    /// Side of the square neighbourhood searched by the denoiser (odd)
    pub search_window: u32,
    /// Histogram clip limit for local contrast equalization
    pub clahe_clip_limit: f32,
    /// Tile grid (tiles per axis) for local contrast equalization
    pub clahe_tiles: u32,
    /// Center weight of the sharpening kernel
    pub sharpen_center: f32,
    /// Weight of each 4-neighbour in the sharpening kernel
    pub sharpen_neighbor: f32,
    /// JPEG quality of the enhanced output
    pub jpeg_quality: u8,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            upscale_below: 1000,
            upscale_target: 1500,
            max_output_pixels: 40_000_000,
            max_denoise_pixels: 8_000_000,
            denoise_luma: 6.0,
            denoise_color: 6.0,
            template_window: 7,
            search_window: 21,
            clahe_clip_limit: 2.5,
            clahe_tiles: 8,
            sharpen_center: 3.0,
            sharpen_neighbor: -0.5,
            jpeg_quality: 95,
        }
    }
}

/// Scratch storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for per-request intermediate images
    pub scratch_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("idscan"),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: Option<String>,
    /// Directory for the rolling log file; defaults to the data dir
    pub directory: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.server.max_upload_bytes, 16 * 1024 * 1024);
        assert!(config.server.allowed_extensions.contains(&"webp".to_string()));

        assert_eq!(config.extraction.model, "gpt-4o");
        assert_eq!(config.extraction.max_tokens, 1500);
        assert_eq!(config.extraction.detail, "high");

        let e = &config.enhancement;
        assert_eq!(e.upscale_below, 1000);
        assert_eq!(e.upscale_target, 1500);
        assert!((e.denoise_luma - 6.0).abs() < f32::EPSILON);
        assert_eq!(e.template_window, 7);
        assert_eq!(e.search_window, 21);
        assert!((e.clahe_clip_limit - 2.5).abs() < f32::EPSILON);
        assert_eq!(e.clahe_tiles, 8);
        assert_eq!(e.jpeg_quality, 95);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.extraction.timeout_secs = 15;
        config.server.bind = "127.0.0.1:8080".to_string();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.extraction.timeout_secs, 15);
        assert_eq!(loaded.server.bind, "127.0.0.1:8080");
        assert_eq!(loaded.enhancement, config.enhancement);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[extraction]\nmodel = \"gpt-4o-mini\"").unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert_eq!(loaded.extraction.model, "gpt-4o-mini");
        assert_eq!(loaded.extraction.api_key_env, "OPENAI_API_KEY");
        assert_eq!(loaded.enhancement.search_window, 21);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
