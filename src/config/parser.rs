use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Snapshots record this hash so a resumed crawl can tell whether it is running
/// under a different configuration than the one that produced the snapshot.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputBackend;
    use crate::ConfigError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
seed = "https://example.com/"
threads = 4
data-limit = 100

[options]
save-links = true
save-content = true

[output]
directory = "./out"

[[content]]
name = "emails"
pattern = '[\w.+-]+@[\w-]+\.[\w.]+'

[[content]]
name = "images"
selector = "img[src]"
attribute = "src"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.seed, "https://example.com/");
        assert_eq!(config.crawler.threads, 4);
        assert_eq!(config.crawler.data_limit, 100);
        assert!(config.options.save_links);
        assert!(!config.options.debug_mode);
        assert_eq!(config.output.backend, OutputBackend::File);
        assert_eq!(config.content.len(), 2);
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse_config(VALID_CONFIG).unwrap();
        assert_eq!(config.crawler.link_cache_limit, 1_000_000);
        assert_eq!(config.crawler.data_cache_limit, 500_000);
        assert_eq!(config.crawler.rate_limit_backoff_secs, 30);
        assert_eq!(config.crawler.request_timeout_secs, 30);
        assert!(config.crawler.user_agent.starts_with("scrape-pool/"));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/crawl.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
seed = "https://example.com/"
threads = 0
data-limit = 100

[output]
directory = "./out"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_sqlite_backend() {
        let config_content = r#"
[crawler]
seed = "https://example.com/"
threads = 2
data-limit = 10

[output]
backend = "sqlite"
database-path = "./crawl.db"

[[content]]
name = "headings"
selector = "h1"
"#;
        let config = parse_config(config_content).unwrap();
        assert_eq!(config.output.backend, OutputBackend::Sqlite);
        assert_eq!(config.output.database_path.as_deref(), Some("./crawl.db"));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
