//! Remote dataset address construction.
use crate::error::{RegressError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_CREDENTIALS: &str = "guest:guest";
pub const DEFAULT_SERVICE_PATH: &str = "wms/cgi-bin/wms.cgi/opendap";

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_credentials() -> String {
    DEFAULT_CREDENTIALS.to_string()
}

fn default_service_path() -> String {
    DEFAULT_SERVICE_PATH.to_string()
}

/// Fixed protocol conventions used to address a dataset on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Locator {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_credentials")]
    pub credentials: String,
    #[serde(default = "default_service_path")]
    pub service_path: String,
}

impl Default for Locator {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            credentials: default_credentials(),
            service_path: default_service_path(),
        }
    }
}

impl Locator {
    pub fn validate(&self) -> Result<()> {
        if self.scheme.is_empty() {
            return Err(RegressError::invalid("locator scheme must not be empty"));
        }
        if self.service_path.trim_matches('/').is_empty() {
            return Err(RegressError::invalid("locator service_path must not be empty"));
        }
        Ok(())
    }

    /// Builds `<scheme>://<credentials>@<endpoint>/<service path>/<dataset id>/`.
    ///
    /// The dataset id is embedded verbatim, so callers pass it pre-encoded.
    pub fn address(&self, endpoint: &str, dataset_id: &str) -> Result<String> {
        if endpoint.is_empty() || dataset_id.is_empty() {
            return Err(RegressError::invalid(
                "an endpoint and a dataset id are required",
            ));
        }
        self.validate()?;
        let credentials = if self.credentials.is_empty() {
            String::new()
        } else {
            format!("{}@", self.credentials)
        };
        Ok(format!(
            "{}://{}{}/{}/{}/",
            self.scheme,
            credentials,
            endpoint,
            self.service_path.trim_matches('/'),
            dataset_id
        ))
    }
}
