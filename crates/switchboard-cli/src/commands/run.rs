//! Broker run command.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use switchboard_broker::{BrokerBuilder, BrokerHandle, ConnectParams, InProcessRunner};
use switchboard_catalog::Catalog;
use switchboard_config::Config;
use switchboard_core::{Identity, generate_user_id};
use switchboard_events::BrokerEvent;
use tracing::info;

use crate::config_bridge::to_package_layout;
use crate::theme::Theme;

/// Run a broker over the configured package directory until Ctrl+C.
///
/// Packages are resolved through the catalog and launched by an
/// in-process runner with nothing registered, so this command exercises
/// resolution, policy and lifecycle reporting rather than hosting services.
pub(crate) async fn run_broker(config: &Config, start: &[String], user: Option<String>) -> Result<()> {
    println!("{}", "Starting Switchboard broker...".cyan().bold());

    let layout = to_package_layout(&config.catalog);
    println!("  Package directory: {}", layout.package_dir.display().to_string().yellow());
    let catalog = Arc::new(Catalog::new(layout, None));
    catalog.ready().await;
    println!(
        "  Packages found: {}",
        catalog.entries().len().to_string().yellow()
    );
    println!(
        "  Start timeout: {}",
        match config.broker.start_timeout() {
            Some(timeout) => format!("{}ms", timeout.as_millis()).yellow(),
            None => "disabled".red(),
        }
    );

    let broker = BrokerBuilder::new(catalog, Arc::new(InProcessRunner::new()))
        .with_config(&config.broker)
        .spawn();
    let mut events = broker.subscribe();

    let user_id = user.unwrap_or_else(generate_user_id);
    info!(user_id = %user_id, services = start.len(), "Starting requested services");
    for name in start {
        start_service(&broker, name, &user_id).await?;
    }

    println!("\n{}", "Running (Ctrl+C to stop)...".cyan());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", format_event(&event)),
                None => break,
            },
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl+C")?;
                break;
            },
        }
    }

    broker.shutdown().await?;
    while let Some(event) = events.try_recv() {
        println!("{}", format_event(&event));
    }
    println!("{}", "Broker stopped.".yellow());
    Ok(())
}

async fn start_service(broker: &BrokerHandle, name: &str, user_id: &str) -> Result<()> {
    let target = Identity::new(name, user_id);
    let outcome = broker
        .connect(ConnectParams::new(Identity::broker(), target.clone()))
        .await?;
    if outcome.is_success() {
        println!("{}", Theme::success(&format!("Connect to {target} routed")));
    } else {
        println!(
            "{}",
            Theme::error(&format!("Connect to {target} refused: {}", outcome.result))
        );
    }
    Ok(())
}

/// One console line per lifecycle event.
pub(crate) fn format_event(event: &BrokerEvent) -> String {
    match event {
        BrokerEvent::BrokerStarted { version, .. } => {
            Theme::info(&format!("broker {version} started"))
        },
        BrokerEvent::BrokerStopped { .. } => Theme::info("broker stopped"),
        BrokerEvent::ServiceCreated { service, .. } => Theme::info(&format!(
            "created {} (instance {})",
            service.identity, service.id
        )),
        BrokerEvent::ServiceStarted { identity, pid, .. } => {
            let pid = pid.map_or_else(|| "?".to_owned(), |p| p.to_string());
            Theme::success(&format!("started {identity} (pid {pid})"))
        },
        BrokerEvent::ServicePidReceived { identity, pid, .. } => {
            Theme::dimmed(&format!("{identity} has pid {pid}"))
        },
        BrokerEvent::ServiceFailedToStart { identity, .. } => {
            Theme::error(&format!("failed to start {identity}"))
        },
        BrokerEvent::ServiceStopped { identity, .. } => {
            Theme::warning(&format!("stopped {identity}"))
        },
        BrokerEvent::ConnectionRefused {
            source,
            target,
            result,
            ..
        } => Theme::error(&format!("refused {source} -> {target}: {result}")),
    }
}
