use crate::config::types::{Config, ContentEntry, CrawlerConfig, OptionsConfig, OutputBackend, OutputConfig};
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Upper bound on the initial pool size
const MAX_THREADS: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_crawler_config(&config.crawler)?;
    validate_options_config(&config.options)?;
    validate_output_config(&config.output)?;
    validate_content_entries(&config.content)?;

    // with nothing to collect the stop condition holds from the start
    if config.content.is_empty() && !config.options.unlimited {
        return Err(ConfigError::Validation(
            "at least one [[content]] entry is required unless unlimited is set".to_string(),
        ));
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    let seed = Url::parse(&config.seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", config.seed, e)))?;

    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use HTTP or HTTPS",
            config.seed
        )));
    }

    if config.threads < 1 || config.threads > MAX_THREADS {
        return Err(ConfigError::Validation(format!(
            "threads must be between 1 and {}, got {}",
            MAX_THREADS, config.threads
        )));
    }

    for (name, value) in [
        ("data-limit", config.data_limit),
        ("link-cache-limit", config.link_cache_limit),
        ("data-cache-limit", config.data_cache_limit),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates option switches that carry extra settings
fn validate_options_config(config: &OptionsConfig) -> ConfigResult<()> {
    if config.restrict_language {
        let language = config.language.as_deref().unwrap_or("").trim();
        if language.is_empty() {
            return Err(ConfigError::Validation(
                "language must be set when restrict-language is enabled".to_string(),
            ));
        }
        if !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Validation(format!(
                "language must be a primary language subtag such as 'en', got '{}'",
                language
            )));
        }
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    match config.backend {
        OutputBackend::File => {
            if config.directory.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "directory is required for the file backend".to_string(),
                ));
            }
        }
        OutputBackend::Sqlite => {
            if config.database_path.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "database-path is required for the sqlite backend".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Validates content type entries
fn validate_content_entries(entries: &[ContentEntry]) -> ConfigResult<()> {
    let mut names = HashSet::new();

    for entry in entries {
        validate_content_name(&entry.name)?;

        if !names.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate content type '{}'",
                entry.name
            )));
        }

        match (&entry.pattern, &entry.selector) {
            (Some(pattern), None) => {
                Regex::new(pattern).map_err(|e| {
                    ConfigError::InvalidPattern(format!("'{}' in '{}': {}", pattern, entry.name, e))
                })?;
            }
            (None, Some(selector)) => {
                Selector::parse(selector).map_err(|e| {
                    ConfigError::InvalidPattern(format!(
                        "selector '{}' in '{}': {:?}",
                        selector, entry.name, e
                    ))
                })?;
            }
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Content type '{}' needs exactly one of pattern or selector",
                    entry.name
                )));
            }
        }

        if entry.attribute.is_some() && entry.selector.is_none() {
            return Err(ConfigError::Validation(format!(
                "Content type '{}' sets attribute without a selector",
                entry.name
            )));
        }
    }

    Ok(())
}

/// Content names become file names, so keep them to a safe alphabet
fn validate_content_name(name: &str) -> ConfigResult<()> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "Content type name cannot be empty".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Content type name must contain only alphanumerics, '-' and '_', got '{}'",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, pattern: Option<&str>, selector: Option<&str>) -> ContentEntry {
        ContentEntry {
            name: name.to_string(),
            pattern: pattern.map(str::to_string),
            selector: selector.map(str::to_string),
            attribute: None,
        }
    }

    fn crawler_config() -> CrawlerConfig {
        CrawlerConfig {
            seed: "https://example.com/".to_string(),
            threads: 4,
            data_limit: 10,
            link_cache_limit: 100,
            data_cache_limit: 50,
            rate_limit_backoff_secs: 30,
            request_timeout_secs: 30,
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn test_validate_crawler_config() {
        assert!(validate_crawler_config(&crawler_config()).is_ok());

        let mut config = crawler_config();
        config.threads = 0;
        assert!(validate_crawler_config(&config).is_err());

        let mut config = crawler_config();
        config.data_limit = 0;
        assert!(validate_crawler_config(&config).is_err());

        let mut config = crawler_config();
        config.seed = "ftp://example.com/".to_string();
        assert!(matches!(
            validate_crawler_config(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_content_entries() {
        assert!(validate_content_entries(&[entry("emails", Some(r"\w+@\w+"), None)]).is_ok());
        assert!(validate_content_entries(&[entry("images", None, Some("img[src]"))]).is_ok());

        // neither or both
        assert!(validate_content_entries(&[entry("x", None, None)]).is_err());
        assert!(validate_content_entries(&[entry("x", Some("a"), Some("a"))]).is_err());

        // bad regex
        assert!(matches!(
            validate_content_entries(&[entry("x", Some("(unclosed"), None)]),
            Err(ConfigError::InvalidPattern(_))
        ));

        // duplicates
        assert!(validate_content_entries(&[
            entry("x", Some("a"), None),
            entry("x", Some("b"), None)
        ])
        .is_err());
    }

    #[test]
    fn test_validate_content_name() {
        assert!(validate_content_name("emails").is_ok());
        assert!(validate_content_name("media_v2").is_ok());

        assert!(validate_content_name("").is_err());
        assert!(validate_content_name("../etc").is_err());
        assert!(validate_content_name("with space").is_err());
    }

    #[test]
    fn test_validate_language_restriction() {
        let mut options = OptionsConfig {
            restrict_language: true,
            ..OptionsConfig::default()
        };
        assert!(validate_options_config(&options).is_err());

        options.language = Some("en".to_string());
        assert!(validate_options_config(&options).is_ok());

        options.language = Some("en-US".to_string());
        assert!(validate_options_config(&options).is_err());
    }

    #[test]
    fn test_content_required_unless_unlimited() {
        let mut config = Config {
            crawler: crawler_config(),
            options: OptionsConfig::default(),
            output: OutputConfig {
                backend: OutputBackend::File,
                directory: Some("./out".to_string()),
                database_path: None,
            },
            content: Vec::new(),
        };
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        config.options.unlimited = true;
        assert!(validate(&config).is_ok());

        config.options.unlimited = false;
        config.content.push(entry("emails", Some(r"\w+@\w+"), None));
        assert!(validate(&config).is_ok());
    }
}
