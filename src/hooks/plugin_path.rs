//! Makes the location hooks visible to processes the platform launches.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::events::{
    DEFAULT_PRIORITY, EVENT_PLUGIN_PATH_VAR, Event, EventHandler, EventHub, Filter, Reply, Topic,
};

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

pub struct PluginPathHook {
    plugin_path: PathBuf,
}

impl PluginPathHook {
    pub fn new(plugin_path: impl Into<PathBuf>) -> Self {
        Self {
            plugin_path: plugin_path.into(),
        }
    }

    pub fn plugin_path(&self) -> &Path {
        &self.plugin_path
    }

    pub async fn register(self, hub: &EventHub) {
        let hook = Arc::new(self);
        hub.subscribe(
            Filter::topic(Topic::ApplicationLaunch),
            DEFAULT_PRIORITY,
            hook.clone(),
        )
        .await;
        hub.subscribe(Filter::topic(Topic::ActionLaunch), DEFAULT_PRIORITY, hook)
            .await;
    }
}

/// Append `entry` to a separator-joined path list.
pub fn append_path(existing: Option<&str>, entry: &str) -> String {
    match existing {
        Some(current) if !current.is_empty() => {
            format!("{}{}{}", current, PATH_SEPARATOR, entry)
        }
        _ => entry.to_string(),
    }
}

#[async_trait]
impl EventHandler for PluginPathHook {
    async fn handle(&self, event: &mut Event) -> anyhow::Result<Option<Reply>> {
        let Some(options) = event.data.launch_options_mut() else {
            return Ok(None);
        };

        let entry = self.plugin_path.to_string_lossy();
        let updated = append_path(
            options.env.get(EVENT_PLUGIN_PATH_VAR).map(String::as_str),
            &entry,
        );
        debug!(path = %updated, "Extended plugin path");
        options.env.insert(EVENT_PLUGIN_PATH_VAR.to_string(), updated);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventData, LaunchOptions};

    #[test]
    fn appends_with_platform_separator() {
        assert_eq!(append_path(None, "/hooks"), "/hooks");
        assert_eq!(append_path(Some(""), "/hooks"), "/hooks");
        assert_eq!(
            append_path(Some("/a"), "/hooks"),
            format!("/a{}/hooks", PATH_SEPARATOR)
        );
    }

    #[tokio::test]
    async fn launch_environment_gets_plugin_path() {
        let hub = EventHub::new();
        PluginPathHook::new("/opt/multisite/hooks").register(&hub).await;

        let mut options = LaunchOptions::default();
        options
            .env
            .insert(EVENT_PLUGIN_PATH_VAR.to_string(), "/existing".to_string());
        let delivery = hub
            .publish(Event::new(EventData::ApplicationLaunch { options }))
            .await;

        let EventData::ApplicationLaunch { options } = delivery.event.data else {
            panic!("expected application launch");
        };
        assert_eq!(
            options.env.get(EVENT_PLUGIN_PATH_VAR).unwrap(),
            &format!("/existing{}/opt/multisite/hooks", PATH_SEPARATOR)
        );
    }
}
