//! The "Transfer Components" action.
//!
//! Discovery offers the action for single-entity selections. Launching it
//! without values returns a form to pick the locations and error tolerance;
//! launching with values validates the locations, spawns the transfer and
//! acknowledges immediately. Progress is reported through the job, never
//! through the reply.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::location::Location;
use crate::core::models::SelectionItem;
use crate::core::transfer_engine::{TransferOptions, TransferRequest, TransferSpawner};
use crate::core::validation::{ValidationError, validate_locations};
use crate::events::{
    ActionItem, ActionLaunch, DEFAULT_PRIORITY, EnumOption, Event, EventData, EventHandler,
    EventHub, Filter, FormItem, LaunchResponse, Reply, Topic,
};
use crate::session::Session;

pub const ACTION_IDENTIFIER: &str = "transfer.components";
pub const ACTION_LABEL: &str = "Transfer Components [new]";
pub const ACTION_DESCRIPTION: &str = "Transfer components between locations.";
pub const LAUNCH_ACKNOWLEDGEMENT: &str = "Transferring components...";

/// Platform-managed locations that never take part in transfers.
pub const EXCLUDED_LOCATIONS: [&str; 5] = [
    "ftrack.origin",
    "ftrack.connect",
    "ftrack.server",
    "ftrack.unmanaged",
    "ftrack.review",
];

/// Values submitted from the action form.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferValues {
    pub from_location: String,
    pub to_location: String,
    #[serde(default)]
    pub ignore_component_not_in_location: Option<String>,
    #[serde(default)]
    pub ignore_location_errors: Option<String>,
}

impl TransferValues {
    pub fn options(&self) -> TransferOptions {
        let flag = |value: &Option<String>| value.as_deref() == Some("true");
        TransferOptions {
            ignore_missing: flag(&self.ignore_component_not_in_location),
            ignore_location_errors: flag(&self.ignore_location_errors),
        }
    }
}

fn yes_no() -> Vec<EnumOption> {
    vec![
        EnumOption {
            label: "Yes".into(),
            value: "true".into(),
        },
        EnumOption {
            label: "No".into(),
            value: "false".into(),
        },
    ]
}

pub struct TransferAction {
    session: Session,
    spawner: TransferSpawner,
}

impl TransferAction {
    pub fn new(session: Session, spawner: TransferSpawner) -> Self {
        Self { session, spawner }
    }

    /// Subscribe discovery and launch for the session's user.
    pub async fn register(self, hub: &EventHub) -> Arc<Self> {
        let user = self.session.api_user().to_string();
        let action = Arc::new(self);

        hub.subscribe(
            Filter::topic(Topic::ActionDiscover).and(Filter::SourceUsername(user.clone())),
            DEFAULT_PRIORITY,
            action.clone(),
        )
        .await;
        hub.subscribe(
            Filter::topic(Topic::ActionLaunch)
                .and(Filter::ActionIdentifier(ACTION_IDENTIFIER.to_string()))
                .and(Filter::SourceUsername(user)),
            DEFAULT_PRIORITY,
            action.clone(),
        )
        .await;

        info!(action = ACTION_IDENTIFIER, "Registered action");
        action
    }

    pub fn discover(&self, selection: &[SelectionItem]) -> Option<Reply> {
        if selection.len() != 1 {
            info!(count = selection.len(), "Selection not supported");
            return None;
        }

        Some(Reply::Actions {
            items: vec![ActionItem {
                label: ACTION_LABEL.to_string(),
                description: ACTION_DESCRIPTION.to_string(),
                action_identifier: ACTION_IDENTIFIER.to_string(),
            }],
        })
    }

    /// Locations offered in the form, lowest priority value first.
    pub async fn transfer_locations(&self) -> anyhow::Result<Vec<Location>> {
        let locations = self.session.available_locations().await?;
        Ok(locations
            .into_iter()
            .filter(|l| !EXCLUDED_LOCATIONS.contains(&l.name.as_str()))
            .collect())
    }

    pub async fn interface(&self) -> anyhow::Result<Reply> {
        let locations = self.transfer_locations().await?;
        if locations.len() < 2 {
            warn!(available = locations.len(), "Not enough locations to transfer between");
            return Ok(Reply::Launch(LaunchResponse::failed(
                ValidationError::NotEnoughLocations.to_string(),
            )));
        }

        let options: Vec<EnumOption> = locations
            .iter()
            .map(|l| EnumOption {
                label: l.display_label().to_string(),
                value: l.id.clone(),
            })
            .collect();

        let items = vec![
            FormItem::Label {
                value: "Transfer components between locations".into(),
            },
            FormItem::Enumerator {
                label: "From location".into(),
                name: "from_location".into(),
                value: options[0].value.clone(),
                data: options.clone(),
            },
            FormItem::Enumerator {
                label: "To location".into(),
                name: "to_location".into(),
                value: options[1].value.clone(),
                data: options,
            },
            FormItem::Label {
                value: "---".into(),
            },
            FormItem::Enumerator {
                label: "Ignore missing".into(),
                name: "ignore_component_not_in_location".into(),
                value: "false".into(),
                data: yes_no(),
            },
            FormItem::Enumerator {
                label: "Ignore errors".into(),
                name: "ignore_location_errors".into(),
                value: "false".into(),
                data: yes_no(),
            },
        ];

        Ok(Reply::Interface { items })
    }

    async fn resolve_location(&self, id: &str) -> Result<Location, ValidationError> {
        match self.session.locations().get(id).await {
            Some(location) if location.accessor.is_some() => Ok(location),
            _ => Err(ValidationError::UnknownLocation(id.to_string())),
        }
    }

    async fn validated(&self, values: &TransferValues) -> Result<(Location, Location), ValidationError> {
        validate_locations(&values.from_location, &values.to_location)?;
        let source = self.resolve_location(&values.from_location).await?;
        let target = self.resolve_location(&values.to_location).await?;
        Ok((source, target))
    }

    pub async fn launch(&self, event: &Event, launch: &ActionLaunch) -> anyhow::Result<Reply> {
        let submitted = launch
            .values
            .as_ref()
            .filter(|v| v.as_object().is_some_and(|m| !m.is_empty()));
        let Some(values) = submitted else {
            return self.interface().await;
        };

        let values: TransferValues = match serde_json::from_value(values.clone()) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "Invalid transfer values");
                return Ok(Reply::Launch(LaunchResponse::failed(format!(
                    "Invalid transfer values: {}",
                    e
                ))));
            }
        };

        let (source, target) = match self.validated(&values).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Transfer rejected");
                return Ok(Reply::Launch(LaunchResponse::failed(e.to_string())));
            }
        };

        info!(from = %source, to = %target, "Transferring components");

        let mut request = TransferRequest::new(launch.selection.clone(), source, target);
        request.options = values.options();
        request.user_id = event.source.user.as_ref().map(|u| u.id.clone());
        let handle = self.spawner.spawn(request);

        Ok(Reply::Launch(
            LaunchResponse::ok(LAUNCH_ACKNOWLEDGEMENT).with_job(handle.job_id()),
        ))
    }
}

#[async_trait]
impl EventHandler for TransferAction {
    async fn handle(&self, event: &mut Event) -> anyhow::Result<Option<Reply>> {
        match &event.data {
            EventData::ActionDiscover { selection } => Ok(self.discover(selection)),
            EventData::ActionLaunch(launch) => self.launch(event, launch).await.map(Some),
            _ => Ok(None),
        }
    }
}
