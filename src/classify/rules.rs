//! Compiled classification data.

use regex::RegexSet;
use std::collections::HashSet;

use crate::config::ClassifierConfig;
use crate::target::TargetUrl;

/// Classifier configuration compiled for matching.
#[derive(Debug, Clone)]
pub struct ClassifierRules {
    static_extensions: HashSet<String>,
    resource_paths: RegexSet,
    tracking_hosts: Vec<String>,
    tracking_urls: RegexSet,
    api_paths: RegexSet,
    navigation_denylist: Vec<String>,
}

impl ClassifierRules {
    /// Compile rules from configuration. Fails on the first bad pattern.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            static_extensions: config
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            resource_paths: RegexSet::new(&config.resource_path_patterns)?,
            tracking_hosts: normalize_hosts(&config.tracking_hosts),
            tracking_urls: RegexSet::new(&config.tracking_path_patterns)?,
            api_paths: RegexSet::new(&config.api_path_patterns)?,
            navigation_denylist: normalize_hosts(&config.navigation_denylist),
        })
    }

    pub fn is_static_extension(&self, ext: &str) -> bool {
        self.static_extensions.contains(ext)
    }

    pub fn matches_resource_path(&self, target: &TargetUrl) -> bool {
        self.resource_paths.is_match(target.path())
    }

    pub fn is_tracking_host(&self, host: &str) -> bool {
        host_matches(&self.tracking_hosts, host)
    }

    pub fn matches_tracking_url(&self, target: &TargetUrl) -> bool {
        self.tracking_urls.is_match(target.as_str())
    }

    pub fn matches_api_path(&self, target: &TargetUrl) -> bool {
        self.api_paths.is_match(target.path())
    }

    /// Whether a request to `host` is aborted while rendering.
    pub fn is_navigation_denied(&self, host: &str) -> bool {
        host_matches(&self.navigation_denylist, host)
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        match Self::from_config(&ClassifierConfig::default()) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Built-in classifier patterns failed to compile");
                Self {
                    static_extensions: HashSet::new(),
                    resource_paths: RegexSet::empty(),
                    tracking_hosts: Vec::new(),
                    tracking_urls: RegexSet::empty(),
                    api_paths: RegexSet::empty(),
                    navigation_denylist: Vec::new(),
                }
            }
        }
    }
}

fn normalize_hosts(hosts: &[String]) -> Vec<String> {
    hosts
        .iter()
        .map(|h| h.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Exact host or any subdomain of it.
fn host_matches(list: &[String], host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    list.iter().any(|entry| {
        host == *entry
            || (host.len() > entry.len()
                && host.ends_with(entry.as_str())
                && host.as_bytes()[host.len() - entry.len() - 1] == b'.')
    })
}
