//! Desktop notifications via the freedesktop `DBus` interface.
//!
//! Calls `org.freedesktop.Notifications.Notify` on the session bus. Failing
//! to notify never affects the break cycle; errors are logged and dropped,
//! and a bus that stops answering is given up on after [`SEND_TIMEOUT`].

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zbus::{Connection, connection};
use zbus::zvariant::Value;

const NOTIFICATIONS_SERVICE: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";
const NOTIFICATIONS_INTERFACE: &str = "org.freedesktop.Notifications";

const APP_NAME: &str = "towel";

/// Upper bound on connecting to the bus and getting the `Notify` reply.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(3);

/// How long the "break due" bubble stays up. The overlay follows right after.
const REST_DUE_TIMEOUT_MS: i32 = 10_000;
/// Zero asks the server to keep the "break over" bubble until dismissed.
const REST_OVER_TIMEOUT_MS: i32 = 0;

/// A notification ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub icon: &'static str,
    pub summary: String,
    pub body: String,
    pub timeout_ms: i32,
}

impl Notification {
    /// Announce that a break is starting after `worked_seconds` of work.
    pub fn rest_due(worked_seconds: u64) -> Self {
        Self {
            icon: "dialog-warning",
            summary: "Time for a break".to_string(),
            body: format!(
                "You have been looking at the screen for {}.",
                format_worked(worked_seconds)
            ),
            timeout_ms: REST_DUE_TIMEOUT_MS,
        }
    }

    /// Announce that the break is over.
    pub fn rest_over() -> Self {
        Self {
            icon: "dialog-information",
            summary: "Break over".to_string(),
            body: "Rested enough. Back to work!".to_string(),
            timeout_ms: REST_OVER_TIMEOUT_MS,
        }
    }
}

/// Sends desktop notifications, or silently does nothing when disabled.
#[derive(Debug, Clone)]
pub struct Notifier {
    enabled: bool,
    timeout: Duration,
    /// Bus to use instead of the session bus.
    bus_address: Option<String>,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timeout: SEND_TIMEOUT,
            bus_address: None,
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(false)
    }

    #[cfg(test)]
    fn on_bus(address: &str, timeout: Duration) -> Self {
        Self {
            enabled: true,
            timeout,
            bus_address: Some(address.to_string()),
        }
    }

    /// Show `notification`, logging instead of failing.
    ///
    /// Returns within the configured timeout whatever the bus does.
    pub async fn send(&self, notification: &Notification) {
        if !self.enabled {
            debug!("Notifications disabled, skipping: {}", notification.summary);
            return;
        }

        let sent = tokio::time::timeout(
            self.timeout,
            send_notification(self.bus_address.as_deref(), notification),
        )
        .await;
        match sent {
            Ok(Ok(id)) => debug!("Notification {} shown: {}", id, notification.summary),
            Ok(Err(e)) => warn!("Failed to send notification: {:#}", e),
            Err(_) => warn!(
                "Notification server did not answer within {:?}, dropped: {}",
                self.timeout, notification.summary
            ),
        }
    }
}

async fn connect(bus_address: Option<&str>) -> zbus::Result<Connection> {
    match bus_address {
        Some(address) => connection::Builder::address(address)?.build().await,
        None => Connection::session().await,
    }
}

async fn send_notification(bus_address: Option<&str>, notification: &Notification) -> Result<u32> {
    let conn = connect(bus_address)
        .await
        .context("Failed to connect to session DBus")?;

    let proxy = zbus::Proxy::new(
        &conn,
        NOTIFICATIONS_SERVICE,
        NOTIFICATIONS_PATH,
        NOTIFICATIONS_INTERFACE,
    )
    .await
    .context("Failed to create Notifications proxy")?;

    let actions: Vec<&str> = Vec::new();
    let hints: HashMap<&str, Value<'_>> = HashMap::new();
    let id: u32 = proxy
        .call(
            "Notify",
            &(
                APP_NAME,
                0u32,
                notification.icon,
                notification.summary.as_str(),
                notification.body.as_str(),
                actions,
                hints,
                notification.timeout_ms,
            ),
        )
        .await
        .context("Notify call failed")?;

    Ok(id)
}

/// Human-readable work duration: "1 hour 5 minutes", "50 minutes",
/// "45 seconds".
pub fn format_worked(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;

    if hours == 0 && minutes == 0 {
        return plural(seconds, "second");
    }

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    parts.join(" ")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
