//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that every classifier pattern compiles
//! - Check the request timeout leaves room for the render budget
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::render::navigation::SCROLL_PASS_MAX;
use crate::render::session::LAUNCH_TIMEOUT;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("listener.public_origin: '{0}' is not an absolute http(s) origin")]
    InvalidOrigin(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(String),

    #[error("navigation.strategies must contain at least one strategy")]
    NoStrategies,

    #[error(
        "timeouts.request_secs: {request_secs}s is shorter than the {required_secs}s a document render may take \
         (launch, every navigation strategy, settling)"
    )]
    RequestTimeoutTooShort { request_secs: u64, required_secs: u64 },

    #[error("classifier.{field}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        reason: String,
    },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if let Some(origin) = &config.listener.public_origin {
        let valid = url::Url::parse(origin)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.request_secs".into()));
    }
    if config.fetcher.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("fetcher.timeout_secs".into()));
    }

    if config.navigation.strategies.is_empty() {
        errors.push(ValidationError::NoStrategies);
    }
    for (i, strategy) in config.navigation.strategies.iter().enumerate() {
        if strategy.timeout_secs == 0 {
            errors.push(ValidationError::ZeroTimeout(format!(
                "navigation.strategies[{}].timeout_secs",
                i
            )));
        }
    }

    let required_secs = render_budget(config).as_secs_f64().ceil() as u64;
    if config.timeouts.request_secs > 0 && config.timeouts.request_secs < required_secs {
        errors.push(ValidationError::RequestTimeoutTooShort {
            request_secs: config.timeouts.request_secs,
            required_secs,
        });
    }

    let classifier = &config.classifier;
    let pattern_lists: [(&'static str, &Vec<String>); 3] = [
        ("resource_path_patterns", &classifier.resource_path_patterns),
        ("tracking_path_patterns", &classifier.tracking_path_patterns),
        ("api_path_patterns", &classifier.api_path_patterns),
    ];
    for (field, patterns) in pattern_lists {
        for pattern in patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError::InvalidPattern {
                    field,
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Worst case for one document request: a cold launch that hits its
/// bound, every strategy timing out, then settling and the scroll pass.
pub fn render_budget(config: &ProxyConfig) -> Duration {
    let navigation = &config.navigation;
    let strategies: u64 = navigation.strategies.iter().map(|s| s.timeout_secs).sum();
    let mut budget = LAUNCH_TIMEOUT + Duration::from_secs(strategies) + Duration::from_millis(navigation.settle_ms);
    if navigation.scroll {
        budget += SCROLL_PASS_MAX + Duration::from_millis(navigation.post_scroll_settle_ms);
    }
    budget
}
