//! D-Bus integration: the session bus connection used to reach the
//! desktop notification server

use anyhow::{Context, Result};
use tracing::info;
use zbus::Connection;

pub mod notifications;

use notifications::NotificationService;

/// Connect to the session bus and bind the notification server on it
pub async fn connect_notifications() -> Result<NotificationService> {
    let conn = Connection::session()
        .await
        .context("Failed to connect to D-Bus session bus")?;
    let service = NotificationService::new(&conn)
        .await
        .context("Failed to reach org.freedesktop.Notifications")?;
    info!("Delivering bells to {}", service.server());
    Ok(service)
}
