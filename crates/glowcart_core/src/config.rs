//! Runtime configuration for the storefront core.
//!
//! # Responsibility
//! - Hold backend location, attachment limits, fee rate and screen routes.
//! - Parse partial JSON over documented defaults and validate the result.
//!
//! # Invariants
//! - A validated config always has a parseable `api_base_url`.
//! - Route templates contain the `{serviceId}` placeholder.

use crate::model::draft::ComposeLimits;
use crate::model::pricing::DEFAULT_SERVICE_FEE_PERCENT;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Placeholder replaced by the service id in route templates.
pub const SERVICE_ID_PLACEHOLDER: &str = "{serviceId}";
/// Query parameter the login screen reads its return path from.
pub const LOGIN_RETURN_PARAM: &str = "redirect";

const LOCAL_ORIGIN: &str = "app://glowcart/";
const MAX_FEE_PERCENT: u32 = 100;

/// Core configuration, usually loaded from JSON shipped with the app shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub max_attachments: usize,
    pub max_attachment_bytes: u64,
    pub service_fee_percent: u32,
    pub login_path: String,
    pub compose_path_template: String,
    pub review_path_template: String,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        let limits = ComposeLimits::default();
        Self {
            api_base_url: "http://localhost:8080/api/".to_string(),
            request_timeout_ms: 15_000,
            max_attachments: limits.max_files,
            max_attachment_bytes: limits.max_file_bytes,
            service_fee_percent: DEFAULT_SERVICE_FEE_PERCENT,
            login_path: "/login".to_string(),
            compose_path_template: "/services/{serviceId}/book".to_string(),
            review_path_template: "/services/{serviceId}/book/review".to_string(),
        }
    }
}

impl StorefrontConfig {
    /// Parses JSON, filling missing fields with defaults, then validates.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = Url::parse(self.api_base_url.trim()).map_err(|err| ConfigError::Invalid {
            field: "api_base_url",
            message: err.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api_base_url",
                message: format!("unsupported scheme `{}`", base.scheme()),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_attachments == 0 || self.max_attachment_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attachments",
                message: "attachment limits must be greater than zero".to_string(),
            });
        }
        if self.service_fee_percent > MAX_FEE_PERCENT {
            return Err(ConfigError::Invalid {
                field: "service_fee_percent",
                message: format!("must be at most {MAX_FEE_PERCENT}"),
            });
        }
        if !self.login_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "login_path",
                message: "must start with `/`".to_string(),
            });
        }
        for (field, template) in [
            ("compose_path_template", &self.compose_path_template),
            ("review_path_template", &self.review_path_template),
        ] {
            if !template.starts_with('/') || !template.contains(SERVICE_ID_PLACEHOLDER) {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("must start with `/` and contain `{SERVICE_ID_PLACEHOLDER}`"),
                });
            }
        }
        Ok(())
    }

    pub fn compose_limits(&self) -> ComposeLimits {
        ComposeLimits {
            max_files: self.max_attachments,
            max_file_bytes: self.max_attachment_bytes,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn compose_path(&self, service_id: &str) -> String {
        self.compose_path_template
            .replace(SERVICE_ID_PLACEHOLDER, service_id)
    }

    /// Compose path carrying the explicit return-from-review signal.
    pub fn compose_return_path(&self, service_id: &str) -> String {
        format!("{}?from=review", self.compose_path(service_id))
    }

    pub fn review_path(&self, service_id: &str) -> String {
        self.review_path_template
            .replace(SERVICE_ID_PLACEHOLDER, service_id)
    }

    /// Login path with `return_to` encoded as the return parameter.
    pub fn login_redirect(&self, return_to: &str) -> String {
        let url = Url::parse(LOCAL_ORIGIN).and_then(|origin| origin.join(&self.login_path));
        match url {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair(LOGIN_RETURN_PARAM, return_to);
                match url.query() {
                    Some(query) => format!("{}?{query}", url.path()),
                    None => url.path().to_string(),
                }
            }
            Err(_) => self.login_path.clone(),
        }
    }
}

/// Configuration load/validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "config is not valid JSON: {err}"),
            Self::Invalid { field, message } => write!(f, "config field `{field}` {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}
