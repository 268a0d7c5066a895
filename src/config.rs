use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_folder")]
    pub folder: PathBuf,
    #[serde(default)]
    pub s3: Option<S3FolderConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            folder: default_folder(),
            s3: None,
        }
    }
}

fn default_provider() -> String {
    "filesystem".to_string()
}
fn default_folder() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3FolderConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
        }
    }
}

fn default_alert_threshold() -> u64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

impl Config {
    /// Defaults for commands run without a config file.
    pub fn minimal() -> Self {
        Self {
            source: SourceConfig::default(),
            report: ReportConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    match config.source.provider.as_str() {
        "filesystem" => {}
        "s3" => {
            let s3 = config
                .source
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("[source.s3] must be set when provider is 's3'"))?;
            if s3.bucket.is_empty() {
                anyhow::bail!("source.s3.bucket must not be empty");
            }
        }
        other => anyhow::bail!(
            "Unknown source provider: '{}'. Must be filesystem or s3.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.source.provider, "filesystem");
        assert_eq!(config.source.folder, PathBuf::from("./data"));
        assert_eq!(config.report.alert_threshold, 50);
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn s3_provider_requires_section() {
        let err = parse("[source]\nprovider = \"s3\"\n").unwrap_err();
        assert!(err.to_string().contains("[source.s3]"));
    }

    #[test]
    fn s3_section_parses() {
        let config = parse(
            r#"
[source]
provider = "s3"

[source.s3]
bucket = "fcr-exports"
prefix = "daily/"
"#,
        )
        .unwrap();
        let s3 = config.source.s3.unwrap();
        assert_eq!(s3.bucket, "fcr-exports");
        assert_eq!(s3.region, "us-east-1");
    }

    #[test]
    fn zero_ttl_rejected() {
        assert!(parse("[cache]\nttl_secs = 0\n").is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = parse("[source]\nprovider = \"gdrive\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown source provider"));
    }
}
