//! xbell-notify
//!
//! Forwards XKB bell events to desktop notifications, tagged with the title,
//! client host and icon of the window that rang the bell.

mod bell;
mod config;
mod dbus;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bell::session::EX_USAGE;
use bell::{BellEvent, DisplaySession, IconStrategy};
use config::{Config, NotificationConfig};
use dbus::notifications::NotificationService;

const PROGRAM: &str = "xbell-notify";

const USAGE: &str = "\
Usage: xbell-notify [OPTIONS]

Options:
  -d, --display NAME   X display to watch (default: $DISPLAY)
  -s, --send NAME      send a bell named NAME and exit
      --file-icons     hand pixmap icons over as temporary XPM files
  -h, --help           print this help";

/// Resolved bell events waiting for delivery
const EVENT_QUEUE: usize = 16;

/// Command line options
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    display: Option<String>,
    send: Option<String>,
    file_icons: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-d" | "--display" => {
                parsed.display = Some(args.next().ok_or("--display needs a value")?);
            }
            "-s" | "--send" => {
                parsed.send = Some(args.next().ok_or("--send needs a value")?);
            }
            "--file-icons" => parsed.file_icons = true,
            "-h" | "--help" => parsed.help = true,
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(parsed)
}

/// Owns the display session; runs on its own thread since the wait blocks
fn bell_loop(session: DisplaySession, events: mpsc::Sender<BellEvent>) {
    loop {
        match session.next_bell_event() {
            Ok(event) => {
                if events.blocking_send(event).is_err() {
                    debug!("Event receiver closed, stopping bell loop");
                    return;
                }
            }
            Err(e) => {
                error!("Bell event loop stopped: {:#}", e);
                return;
            }
        }
    }
}

async fn deliver(
    notifications: Option<&NotificationService>,
    event: BellEvent,
    config: &NotificationConfig,
) {
    if event.event_only() && !config.include_event_only {
        debug!("Skipping event-only bell {}", event.sequence());
        return;
    }
    debug!(
        "Bell {} at {}: class {}, id {}, reported window {:?}",
        event.sequence(),
        event.time(),
        event.bell_class(),
        event.bell_id(),
        event.window()
    );
    let Some(service) = notifications else {
        return;
    };
    match service.show_bell(&event, config).await {
        Ok(id) => debug!("Notification {} shown for bell {}", id, event.sequence()),
        Err(e) => warn!("Failed to show notification: {:#}", e),
    }
    if event.icon_files().is_some() {
        // The event owns the icon files; dropping it deletes them.
        let retention = config.icon_file_retention();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            drop(event);
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xbell_notify=info,warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}: {}\n\n{}", PROGRAM, message, USAGE);
            std::process::exit(EX_USAGE);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {:#}", e);
        Config::default()
    });
    if args.display.is_some() {
        config.display.name = args.display.clone();
    }
    if args.file_icons {
        config.icons.strategy = IconStrategy::File;
    }

    let session = match DisplaySession::open(
        PROGRAM,
        config.display.name.as_deref(),
        config.icons.icon_options(),
    ) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Some(name) = args.send {
        return session.send_bell_event(&name);
    }

    let (major, minor) = session.xkb_version();
    info!(
        "Starting {} on {} (XKB {}.{:02}, root {:#x}, events {:?})",
        PROGRAM,
        session.display(),
        major,
        minor,
        session.root(),
        session.event_mask()
    );

    // Bells are still logged when no notification server is reachable.
    let notifications = match dbus::connect_notifications().await {
        Ok(service) => Some(service),
        Err(e) => {
            warn!("{:#}, bells will only be logged", e);
            None
        }
    };

    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE);
    std::thread::Builder::new()
        .name("xkb-bell".into())
        .spawn(move || bell_loop(session, tx))
        .context("Failed to spawn bell event thread")?;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    bail!("Lost connection to the X server");
                };
                deliver(notifications.as_ref(), event, &config.notification).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_flags() {
        let parsed = args(&["-d", ":2", "--file-icons"]).unwrap();
        assert_eq!(parsed.display.as_deref(), Some(":2"));
        assert!(parsed.file_icons);
        assert!(parsed.send.is_none());

        let parsed = args(&["--send", "TerminalBell"]).unwrap();
        assert_eq!(parsed.send.as_deref(), Some("TerminalBell"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(args(&["--display"]).is_err());
        assert_eq!(args(&["--bogus"]).unwrap_err(), "unknown argument '--bogus'");
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }
}
