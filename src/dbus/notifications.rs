//! Desktop notifications via org.freedesktop.Notifications

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use zbus::zvariant::Value;
use zbus::{Connection, proxy};

use crate::bell::{BellEvent, IconImage};
use crate::config::NotificationConfig;

/// Proxy for org.freedesktop.Notifications
#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    /// Show a notification
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    /// Optional features the server implements ("body", "icon-static", ...)
    fn get_capabilities(&self) -> zbus::Result<Vec<String>>;

    /// Server name, vendor, version and protocol version
    fn get_server_information(&self) -> zbus::Result<(String, String, String, String)>;
}

/// Identity reported by the notification server
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

impl ServerInfo {
    /// Servers without "body" only show the summary
    pub fn supports_body(&self) -> bool {
        self.capabilities.iter().any(|c| c == "body")
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.vendor)
    }
}

pub struct NotificationService {
    proxy: NotificationsProxy<'static>,
    server: ServerInfo,
}

impl NotificationService {
    pub async fn new(conn: &Connection) -> Result<Self> {
        let proxy = NotificationsProxy::new(conn).await?;
        let (name, vendor, version, protocol) = proxy.get_server_information().await?;
        let capabilities = proxy.get_capabilities().await.unwrap_or_else(|e| {
            warn!("Failed to get notification server capabilities: {}", e);
            Vec::new()
        });
        debug!(
            "Notification server speaks protocol {}, capabilities {:?}",
            protocol, capabilities
        );
        let server = ServerInfo {
            name,
            vendor,
            version,
            capabilities,
        };
        Ok(Self { proxy, server })
    }

    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// Show a notification for a bell event, pulling its icon pixels
    pub async fn show_bell(&self, event: &BellEvent, config: &NotificationConfig) -> Result<u32> {
        let mut hints = HashMap::new();
        hints.insert("urgency", Value::from(config.urgency.min(2)));
        if let Some(image) = event.image() {
            hints.insert("image-data", image_data(image)?);
        }

        let app_icon = match event.icon_files() {
            Some(files) => {
                debug!(
                    "Using icon file {:?} (mask {:?})",
                    files.pixmap_path(),
                    files.mask_path()
                );
                files.pixmap_path().to_string_lossy().into_owned()
            }
            None => String::new(),
        };

        let (summary, body) = compose(
            bell_summary(event, config),
            bell_body(event),
            self.server.supports_body(),
        );

        let id = self
            .proxy
            .notify(
                &config.app_name,
                0, // replaces_id (0 = new notification)
                &app_icon,
                &summary,
                &body,
                &[],
                hints,
                config.expire_timeout_ms,
            )
            .await?;

        Ok(id)
    }
}

/// `image-data` hint: (width, height, rowstride, has_alpha, bits, channels, RGBA bytes)
fn image_data(image: &IconImage) -> Result<Value<'static>> {
    let mut pixels = vec![0u8; image.byte_len()];
    image.render_all(&mut pixels)?;
    argb_to_rgba(&mut pixels);
    let width = image.width() as i32;
    let height = image.height() as i32;
    Ok(Value::from((width, height, width * 4, true, 8i32, 4i32, pixels)))
}

fn argb_to_rgba(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.rotate_left(1);
    }
}

fn bell_summary(event: &BellEvent, config: &NotificationConfig) -> String {
    if event.name().is_empty() {
        config.summary.clone()
    } else {
        format!("{}: {}", config.summary, event.name())
    }
}

fn bell_body(event: &BellEvent) -> String {
    match (event.window_name(), event.host_name()) {
        ("", "") => String::new(),
        (title, "") => title.to_string(),
        ("", host) => format!("on {}", host),
        (title, host) => format!("{} on {}", title, host),
    }
}

/// Fold the body into the summary when the server cannot show bodies
fn compose(summary: String, body: String, supports_body: bool) -> (String, String) {
    if supports_body || body.is_empty() {
        (summary, body)
    } else {
        (format!("{} ({})", summary, body), String::new())
    }
}
