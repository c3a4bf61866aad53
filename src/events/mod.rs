//! Typed in-process event hub.
//!
//! Events carry a structured payload per topic instead of nested maps, and
//! subscriptions match with explicit [`Filter`] predicates instead of
//! subscription strings.
//!
//! ## Architecture
//!
//! - `filter`: subscription predicates
//! - `hub`: subscription table, publish hooks and dispatch
//! - this module: event and reply types

mod filter;
mod hub;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::models::SelectionItem;
use crate::session::Session;

pub use filter::Filter;
pub use hub::{DEFAULT_PRIORITY, Delivery, EventHandler, EventHub, PublishHook};

/// Environment variable listing directories the platform loads hooks from.
pub const EVENT_PLUGIN_PATH_VAR: &str = "FTRACK_EVENT_PLUGIN_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ActionDiscover,
    ActionLaunch,
    ApplicationLaunch,
    ConfigureLocation,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionDiscover => "ftrack.action.discover",
            Self::ActionLaunch => "ftrack.action.launch",
            Self::ApplicationLaunch => "ftrack.connect.application.launch",
            Self::ConfigureLocation => "ftrack.api.session.configure-location",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ftrack.action.discover" => Some(Self::ActionDiscover),
            "ftrack.action.launch" => Some(Self::ActionLaunch),
            "ftrack.connect.application.launch" => Some(Self::ApplicationLaunch),
            "ftrack.api.session.configure-location" => Some(Self::ConfigureLocation),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSource {
    pub user: Option<EventUser>,
    pub hostname: Option<String>,
}

/// Options passed to a process launched in response to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ActionLaunch {
    pub action_identifier: String,
    pub selection: Vec<SelectionItem>,
    /// Values submitted from the action's form; `None` asks for the form.
    pub values: Option<Value>,
    pub options: LaunchOptions,
}

#[derive(Debug, Clone)]
pub enum EventData {
    ActionDiscover { selection: Vec<SelectionItem> },
    ActionLaunch(ActionLaunch),
    ApplicationLaunch { options: LaunchOptions },
    ConfigureLocation { session: Session },
}

impl EventData {
    pub fn topic(&self) -> Topic {
        match self {
            Self::ActionDiscover { .. } => Topic::ActionDiscover,
            Self::ActionLaunch(_) => Topic::ActionLaunch,
            Self::ApplicationLaunch { .. } => Topic::ApplicationLaunch,
            Self::ConfigureLocation { .. } => Topic::ConfigureLocation,
        }
    }

    /// Launch options, for the topics that start a process.
    pub fn launch_options_mut(&mut self) -> Option<&mut LaunchOptions> {
        match self {
            Self::ActionLaunch(launch) => Some(&mut launch.options),
            Self::ApplicationLaunch { options } => Some(options),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub source: EventSource,
    pub data: EventData,
}

impl Event {
    pub fn new(data: EventData) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            source: EventSource::default(),
            data,
        }
    }

    pub fn from_user(mut self, id: impl Into<String>, username: impl Into<String>) -> Self {
        self.source.user = Some(EventUser {
            id: id.into(),
            username: username.into(),
        });
        self
    }

    pub fn topic(&self) -> Topic {
        self.data.topic()
    }

    pub fn username(&self) -> Option<&str> {
        self.source.user.as_ref().map(|u| u.username.as_str())
    }
}

/// An entry in the action menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionItem {
    pub label: String,
    pub description: String,
    #[serde(rename = "actionIdentifier")]
    pub action_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FormItem {
    Label {
        value: String,
    },
    Enumerator {
        label: String,
        name: String,
        value: String,
        data: Vec<EnumOption>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchResponse {
    pub success: bool,
    pub message: String,
    /// Job tracking a launched transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl LaunchResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            job_id: None,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            job_id: None,
        }
    }
}

/// What a handler sends back to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Actions { items: Vec<ActionItem> },
    Interface { items: Vec<FormItem> },
    Launch(LaunchResponse),
}
