use crate::config::types::{
    Config, FileSizeLimits, GeneralConfig, IgnoreOptions, RateLimitingConfig,
};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_general_config(&config.general)?;
    validate_rate_limiting(&config.rate_limiting)?;
    validate_ignore_options(&config.ignore_options)?;
    for pattern in &config.crawlers.index_hosts {
        validate_host_pattern(pattern)?;
    }
    validate_file_size_limits(&config.file_size_limits)?;
    Ok(())
}

fn validate_general_config(config: &GeneralConfig) -> Result<(), ConfigError> {
    if config.download_folder.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "download_folder cannot be empty".to_string(),
        ));
    }

    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates rate, concurrency and retry limits
fn validate_rate_limiting(config: &RateLimitingConfig) -> Result<(), ConfigError> {
    if config.rate_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "rate_limit must be >= 1, got {}",
            config.rate_limit
        )));
    }

    if config.max_simultaneous_downloads < 1 {
        return Err(ConfigError::Validation(format!(
            "max_simultaneous_downloads must be >= 1, got {}",
            config.max_simultaneous_downloads
        )));
    }

    if config.max_simultaneous_downloads_per_domain < 1 {
        return Err(ConfigError::Validation(format!(
            "max_simultaneous_downloads_per_domain must be >= 1, got {}",
            config.max_simultaneous_downloads_per_domain
        )));
    }

    if !config.disable_download_attempt_limit && config.download_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "download_attempts must be >= 1, got {}",
            config.download_attempts
        )));
    }

    for (name, value) in [
        ("download_delay", config.download_delay),
        ("jitter", config.jitter),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative number of seconds, got {}",
                name, value
            )));
        }
    }

    if config.connection_timeout < 1 || config.read_timeout < 1 {
        return Err(ConfigError::Validation(
            "connection_timeout and read_timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

fn validate_ignore_options(config: &IgnoreOptions) -> Result<(), ConfigError> {
    for pattern in config.skip_hosts.iter().chain(config.only_hosts.iter()) {
        validate_host_pattern(pattern)?;
    }
    Ok(())
}

/// Validates a host pattern ("example.com" or "*.example.com")
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);

    if base.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "host pattern cannot be empty".to_string(),
        ));
    }

    if base.contains('*') || base.contains('/') || base.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidPattern(format!(
            "'{}' is not a host or *.host pattern",
            pattern
        )));
    }

    Ok(())
}

fn validate_file_size_limits(limits: &FileSizeLimits) -> Result<(), ConfigError> {
    for (kind, min, max) in [
        ("image", limits.minimum_image_size, limits.maximum_image_size),
        ("video", limits.minimum_video_size, limits.maximum_video_size),
        ("other", limits.minimum_other_size, limits.maximum_other_size),
    ] {
        if min > 0 && max > 0 && min > max {
            return Err(ConfigError::Validation(format!(
                "minimum {} size ({}) is larger than maximum ({})",
                kind, min, max
            )));
        }
    }
    Ok(())
}
