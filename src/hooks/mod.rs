pub mod disk_locations;
pub mod hostname;
pub mod plugin_path;
pub mod s3_location;
pub mod transfer_action;

use tracing::info;

use crate::config::AppConfig;
use crate::core::transfer_engine::TransferSpawner;
use crate::events::EventHub;
use crate::session::Session;

pub use disk_locations::DiskLocationsHook;
pub use plugin_path::PluginPathHook;
pub use s3_location::S3LocationHook;
pub use transfer_action::TransferAction;

/// Which hooks ended up subscribed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registered {
    pub disk_locations: bool,
    pub s3_location: bool,
}

/// Install the hostname stamp and subscribe every hook for `session`.
pub async fn register_all(
    hub: &EventHub,
    session: &Session,
    spawner: TransferSpawner,
    config: &AppConfig,
) -> anyhow::Result<Registered> {
    hub.add_publish_hook(hostname::stamp_hostname(hostname::local_hostname()))
        .await;

    PluginPathHook::new(config.plugin_path.clone())
        .register(hub)
        .await;

    let disk_locations =
        DiskLocationsHook::register(hub, &config.locations_config, Some(session.api_user())).await;
    let s3_location = S3LocationHook::register(hub, &config.env_file).await?;

    TransferAction::new(session.clone(), spawner).register(hub).await;

    info!(disk_locations, s3_location, "Hooks registered");
    Ok(Registered {
        disk_locations,
        s3_location,
    })
}
