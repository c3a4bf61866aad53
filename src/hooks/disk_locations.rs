//! Disk-backed locations declared in a YAML template.
//!
//! The template is rendered once at registration with a handful of host
//! variables (`{{ USER_NAME }}`, `{{ HOST_NAME }}`, `{{ HOME }}`,
//! `{{ FTRACK_LOCAL_STORAGE }}`), then parsed as:
//!
//! ```yaml
//! locations:
//!   studio.nas:
//!     priority: 5
//!     prefix:
//!       linux: /mnt/nas/{{ USER_NAME }}
//!       win32: N:\{{ USER_NAME }}
//! ```

use anyhow::Context;
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, info, warn};

use crate::core::accessor::DiskAccessor;
use crate::core::structure::StandardStructure;
use crate::events::{Event, EventData, EventHandler, EventHub, Filter, Reply, Topic};
use crate::hooks::hostname::{is_foreign, local_hostname};

/// Location hooks run before the default priority so the platform's own
/// configuration sees them.
pub const LOCATION_HOOK_PRIORITY: i32 = 10;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid locations template: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Key used for prefixes of the running platform.
pub fn platform_key() -> &'static str {
    if cfg!(target_os = "windows") {
        "win32"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    }
}

/// Variables available to the template.
pub fn template_vars(api_user: Option<&str>) -> HashMap<String, String> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let local_storage = std::env::var("FTRACK_LOCAL_STORAGE")
        .unwrap_or_else(|_| home.join("ftrack_local_storage").to_string_lossy().into_owned());

    let user = match api_user {
        Some(user) if !user.is_empty() => user.to_string(),
        _ => whoami::username(),
    };

    HashMap::from([
        ("USER_NAME".to_string(), user),
        ("HOST_NAME".to_string(), local_hostname()),
        ("HOME".to_string(), home.to_string_lossy().into_owned()),
        ("FTRACK_LOCAL_STORAGE".to_string(), local_storage),
    ])
}

/// Replace `{{ NAME }}` placeholders. Unknown names render empty.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[derive(Debug, Default, Deserialize)]
struct LocationEntry {
    priority: Option<i64>,
    #[serde(default)]
    prefix: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLocationSpec {
    pub name: String,
    pub priority: Option<i64>,
    pub prefixes: BTreeMap<String, String>,
}

impl DiskLocationSpec {
    pub fn prefix_for(&self, platform: &str) -> Option<&str> {
        self.prefixes
            .get(platform)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

fn key_name(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Parse a rendered template, keeping file order.
pub fn parse_locations(rendered: &str) -> Result<Vec<DiskLocationSpec>, ConfigError> {
    let document: serde_yaml::Value = serde_yaml::from_str(rendered)?;
    let Some(locations) = document
        .get("locations")
        .and_then(serde_yaml::Value::as_mapping)
    else {
        return Ok(Vec::new());
    };

    let mut specs = Vec::with_capacity(locations.len());
    for (key, value) in locations {
        let name = key_name(key);
        if name.is_empty() {
            warn!(key = ?key, "Skipping location with an empty name");
            continue;
        }

        let entry: LocationEntry = if value.is_null() {
            LocationEntry::default()
        } else {
            serde_yaml::from_value(value.clone())?
        };

        specs.push(DiskLocationSpec {
            name,
            priority: entry.priority,
            prefixes: entry.prefix,
        });
    }
    Ok(specs)
}

pub fn load_locations(
    path: &Path,
    vars: &HashMap<String, String>,
) -> Result<Vec<DiskLocationSpec>, ConfigError> {
    let template = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let specs = parse_locations(&render_template(&template, vars))?;
    debug!(path = %path.display(), count = specs.len(), "Loaded disk locations");
    Ok(specs)
}

pub struct DiskLocationsHook {
    locations: Vec<DiskLocationSpec>,
    platform: String,
    hostname: String,
}

impl DiskLocationsHook {
    pub fn new(locations: Vec<DiskLocationSpec>) -> Self {
        Self {
            locations,
            platform: platform_key().to_string(),
            hostname: local_hostname(),
        }
    }

    /// Override the platform and host, for configuring another machine's
    /// view of the template.
    pub fn for_host(mut self, platform: impl Into<String>, hostname: impl Into<String>) -> Self {
        self.platform = platform.into();
        self.hostname = hostname.into();
        self
    }

    pub fn locations(&self) -> &[DiskLocationSpec] {
        &self.locations
    }

    /// Load `path` and subscribe to configure-location events. A template
    /// that cannot be loaded is logged and leaves the hook unregistered.
    pub async fn register(hub: &EventHub, path: &Path, api_user: Option<&str>) -> bool {
        let vars = template_vars(api_user);
        match load_locations(path, &vars) {
            Ok(locations) => {
                Self::new(locations).subscribe(hub).await;
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Disk locations not registered");
                false
            }
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
impl EventHandler for DiskLocationsHook {
    async fn handle(&self, event: &mut Event) -> anyhow::Result<Option<Reply>> {
        if is_foreign(event, &self.hostname) {
            return Ok(None);
        }
        let EventData::ConfigureLocation { session } = &event.data else {
            return Ok(None);
        };

        info!(
            hostname = %self.hostname,
            event_hostname = event.source.hostname.as_deref().unwrap_or("not set"),
            "Configuring disk locations"
        );

        let mut counter: i64 = 0;
        for spec in &self.locations {
            let record = session
                .ensure_location(&spec.name)
                .await
                .with_context(|| format!("Failed to ensure location {}", spec.name))?;

            let Some(prefix) = spec.prefix_for(&self.platform) else {
                warn!(
                    location = %spec.name,
                    platform = %self.platform,
                    "No path configured for location on this platform"
                );
                continue;
            };

            let default_priority = counter;
            counter += 1;
            let priority = spec.priority.unwrap_or(default_priority);

            session
                .locations()
                .configure(
                    record,
                    Arc::new(DiskAccessor::new(prefix)),
                    Arc::new(StandardStructure::new()),
                    priority,
                )
                .await;
            info!(location = %spec.name, path = %prefix, priority, "Registered disk location");
        }

        Ok(None)
    }
}
