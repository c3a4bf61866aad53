//! Object-storage location configured from the environment.

use anyhow::Context;
use async_trait::async_trait;
use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::accessor::Accessor;
use crate::core::structure::StandardStructure;
use crate::events::{Event, EventData, EventHandler, EventHub, Filter, Reply, Topic};
use crate::hooks::disk_locations::LOCATION_HOOK_PRIORITY;
use crate::hooks::hostname::{is_foreign, local_hostname};

pub const S3_LOCATION_PRIORITY: i64 = 10;

const ENV_KEYS: [&str; 6] = [
    "S3_LOCATION_NAME",
    "S3_BUCKET",
    "S3_MINIO_ENDPOINT_URL",
    "S3_MINIO_API_ENDPOINT_URL",
    "AWS_ACCESS_KEY_ID",
    "AWS_PROFILE",
];

/// Raw S3 variables as found in the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Env {
    pub s3_location_name: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_minio_endpoint_url: Option<String>,
    pub s3_minio_api_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum S3SettingsError {
    #[error("S3_LOCATION_NAME is not set or empty")]
    MissingName,
    #[error("S3_BUCKET is not set or empty")]
    MissingBucket,
    #[error("S3_MINIO_ENDPOINT_URL / S3_MINIO_API_ENDPOINT_URL is not set")]
    MissingEndpoint,
    #[error("No AWS credentials detected (AWS_ACCESS_KEY_ID / AWS_PROFILE not set)")]
    MissingCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub location_name: String,
    pub bucket: String,
    pub endpoint: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Load `KEY=value` lines from `path` into the process environment so the
/// AWS credential chain sees them too. Variables that are already set win.
/// Returns false when the file does not exist.
pub fn load_env_file(path: &Path) -> anyhow::Result<bool> {
    match dotenv::from_path(path) {
        Ok(()) => {
            info!(path = %path.display(), "Loaded environment file");
            Ok(true)
        }
        Err(dotenv::Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No environment file");
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

impl S3Env {
    /// Load the plugin's `.env` file, then read the environment.
    pub fn load(env_file: &Path) -> anyhow::Result<Self> {
        load_env_file(env_file)?;
        Self::from_env()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Figment::from(Env::raw().only(&ENV_KEYS))
            .extract()
            .context("Failed to read S3 settings from environment")
    }

    pub fn resolve(&self) -> Result<S3Settings, S3SettingsError> {
        let location_name = non_empty(&self.s3_location_name).ok_or(S3SettingsError::MissingName)?;
        let bucket = non_empty(&self.s3_bucket).ok_or(S3SettingsError::MissingBucket)?;
        let endpoint = non_empty(&self.s3_minio_endpoint_url)
            .or_else(|| non_empty(&self.s3_minio_api_endpoint_url))
            .ok_or(S3SettingsError::MissingEndpoint)?;

        if non_empty(&self.aws_access_key_id).is_none() && non_empty(&self.aws_profile).is_none() {
            return Err(S3SettingsError::MissingCredentials);
        }

        Ok(S3Settings {
            location_name,
            bucket,
            endpoint,
        })
    }
}

pub struct S3LocationHook {
    settings: S3Settings,
    accessor: Arc<dyn Accessor>,
    hostname: String,
}

impl S3LocationHook {
    pub fn with_accessor(settings: S3Settings, accessor: Arc<dyn Accessor>) -> Self {
        Self {
            settings,
            accessor,
            hostname: local_hostname(),
        }
    }

    pub fn for_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Read settings from `env_file` and the environment and subscribe.
    /// Incomplete settings are logged and leave the hook unregistered.
    pub async fn register(hub: &EventHub, env_file: &Path) -> anyhow::Result<bool> {
        let settings = match S3Env::load(env_file)?.resolve() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(reason = %e, "Skipping S3 location");
                return Ok(false);
            }
        };

        #[cfg(feature = "s3")]
        {
            let accessor =
                crate::core::accessor::S3Accessor::connect(&settings.endpoint, settings.bucket.clone())
                    .await;
            Self::with_accessor(settings, Arc::new(accessor))
                .subscribe(hub)
                .await;
            Ok(true)
        }

        #[cfg(not(feature = "s3"))]
        {
            let _ = hub;
            warn!(
                location = %settings.location_name,
                "S3 support is not compiled in; rebuild with the `s3` feature"
            );
            Ok(false)
        }
    }

    pub async fn subscribe(self, hub: &EventHub) {
        hub.subscribe(
            Filter::topic(Topic::ConfigureLocation),
            LOCATION_HOOK_PRIORITY,
            Arc::new(self),
        )
        .await;
    }
}

#[async_trait]
impl EventHandler for S3LocationHook {
    async fn handle(&self, event: &mut Event) -> anyhow::Result<Option<Reply>> {
        if is_foreign(event, &self.hostname) {
            return Ok(None);
        }
        let EventData::ConfigureLocation { session } = &event.data else {
            return Ok(None);
        };

        let record = session
            .ensure_location(&self.settings.location_name)
            .await
            .with_context(|| format!("Failed to ensure location {}", self.settings.location_name))?;

        session
            .locations()
            .configure(
                record,
                self.accessor.clone(),
                Arc::new(StandardStructure::new()),
                S3_LOCATION_PRIORITY,
            )
            .await;

        info!(
            location = %self.settings.location_name,
            endpoint = %self.settings.endpoint,
            bucket = %self.settings.bucket,
            "Registered S3 location"
        );
        Ok(None)
    }
}
