#![allow(dead_code, clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod channel;
mod config;
mod hub;
mod logger;
mod messages;
mod mission;
mod mode_control;
mod service;
mod store;

use crate::channel::SocketConnector;
use crate::config::MissionConfig;
use crate::messages::operator::CommandKind;
use crate::mission::MissionCoordinator;
use itertools::Itertools;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = MissionConfig::from_env();
    info!(
        "Operator on {}, services on {} / {} / {}",
        config.operator_endpoint,
        config.flight_endpoint,
        config.guidance_endpoint,
        config.perception_endpoint
    );
    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let connector = Box::new(SocketConnector::new(config.retry_interval));
    let mut mission = MissionCoordinator::new(config, connector, inbox_tx)
        .unwrap_or_else(|e| fatal!("Mission tree is invalid: {e}"));

    mission.on_load();
    let commands = CommandKind::iter().map(<&'static str>::from).join(", ");
    info!("Operator commands: {commands}");
    if let Err(e) = mission.on_activate() {
        fatal!("Mission activation failed: {e}");
    }

    loop {
        tokio::select! {
            Some(event) = inbox.recv() => mission.handle_link_event(event),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    mission.on_deactivate();
    mission.on_unload();
}
