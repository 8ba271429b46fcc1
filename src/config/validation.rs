use crate::config::types::{ArchiveConfig, Config, CrawlerConfig, ScopeConfig, UserAgentConfig};
use crate::url::compile_url_model;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_archive_config(&config.archive)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_scope_config(&config.scope)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.parallelism < 1 || config.parallelism > 100 {
        return Err(ConfigError::Validation(format!(
            "parallelism must be between 1 and 100, got {}",
            config.parallelism
        )));
    }

    if config.request_timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request and connect timeouts must be at least 1 second".to_string(),
        ));
    }

    if config.max_response_size == Some(0) {
        return Err(ConfigError::Validation(
            "max_response_size must be greater than 0 when set".to_string(),
        ));
    }

    if config.save_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "save_threshold must be >= 1, got {}",
            config.save_threshold
        )));
    }

    Ok(())
}

/// Validates archive configuration
fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    if config.destination.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "destination cannot be empty".to_string(),
        ));
    }

    if config.max_archive_length < 1 {
        return Err(ConfigError::Validation(
            "max_archive_length must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates seeds, domain patterns and URL rules
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "scope must have at least one seed URL".to_string(),
        ));
    }

    for seed in &config.seeds {
        let url = Url::parse(seed).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS",
                seed
            )));
        }
    }

    for pattern in &config.domains {
        validate_domain_pattern(pattern)?;
    }

    for rule in &config.rules {
        compile_url_model(rule).map_err(|e| ConfigError::InvalidRule {
            rule: rule.clone(),
            message: e.to_string(),
        })?;
    }

    Ok(())
}

/// Validates a domain pattern, either `host` or `*.host`
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    let invalid = |reason: &str| {
        Err(ConfigError::InvalidPattern(format!(
            "Domain pattern '{}' {}",
            pattern, reason
        )))
    };

    if host.is_empty() {
        return invalid("has no host");
    }
    if let Some(c) = host
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == '.' || *c == '-'))
    {
        return invalid(&format!("contains invalid character '{}'", c));
    }
    // Every dot-separated label must be non-empty and not hyphen-bounded
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return invalid("needs at least two labels, e.g. 'example.com'");
    }
    if labels
        .iter()
        .any(|label| label.is_empty() || label.starts_with('-') || label.ends_with('-'))
    {
        return invalid("has an empty or hyphen-bounded label");
    }

    Ok(())
}

/// Checks that an email has the `local@domain.tld` shape
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.contains('@') && domain.contains('.')
        }
        None => false,
    };

    if well_formed {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "contact_email is not a valid address: '{}'",
            email
        )))
    }
}
