use std::sync::Arc;
use tracing::debug;

use crate::events::{Event, EventData, PublishHook};

/// Lowercased name of this machine.
pub fn local_hostname() -> String {
    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string());
    name.to_lowercase()
}

/// Publish hook that stamps the local hostname on configure-location
/// events.
pub fn stamp_hostname(hostname: String) -> PublishHook {
    Arc::new(move |event: &mut Event| {
        if matches!(event.data, EventData::ConfigureLocation { .. }) {
            event.source.hostname = Some(hostname.clone());
        }
    })
}

/// True when the event was stamped by another machine.
pub fn is_foreign(event: &Event, local: &str) -> bool {
    match &event.source.hostname {
        Some(origin) if !origin.eq_ignore_ascii_case(local) => {
            debug!(origin = %origin, local = %local, "Ignoring event from another host");
            true
        }
        _ => false,
    }
}
