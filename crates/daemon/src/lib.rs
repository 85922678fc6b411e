// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pup: an autonomous WiFi reconnaissance and attack companion.
//!
//! Attaches to a packet-capture engine over its WebSocket event bus,
//! tracks the radio environment, drives an opportunistic attack policy,
//! validates captured WPA handshakes on disk, and renders status to a
//! small e-ink panel.

pub mod attack;
pub mod bus;
pub mod config;
pub mod display;
pub mod mac;
pub mod recovery;
pub mod stats;
pub mod topology;
pub mod ui;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::attack::{spawn_coordinator, AttackCoordinator, Whitelist};
use crate::bus::{spawn_bus_client, spawn_reconciliation, CommandSender, KeepAliveHttp};
use crate::config::DaemonConfig;
use crate::display::{spawn_display_worker, FrameSnapshot, NullDriver};
use crate::recovery::{LinuxPlatform, RecoveryConfig, RecoveryController};
use crate::stats::{spawn_stats_task, CapturedSet, StatsScanner};
use crate::topology::{epoch_ms, TopologyStore};
use crate::ui::font::BuiltinFont;
use crate::ui::render::AsciiFaces;
use crate::ui::{layout, Ui};

/// Main-loop cadence: animation ticks, recovery polls, dirty checks.
const TICK: Duration = Duration::from_millis(100);

/// Minimum spacing between panel refreshes.
const DISPLAY_DEBOUNCE_MS: u64 = 500;

/// Run the daemon until interrupted.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let preset = layout::preset_or_default(&config.display);
    let ui = Arc::new(Ui::new(
        &config.name,
        preset.layout(),
        Box::new(BuiltinFont),
        Box::new(AsciiFaces::new(BuiltinFont)),
        config.invert,
    ));
    let store = Arc::new(TopologyStore::new());
    let http = Arc::new(Mutex::new(KeepAliveHttp::new(
        &config.bus_host,
        config.bus_port,
        &config.bus_username,
        &config.bus_password,
    )));
    let commands = CommandSender::new(Arc::clone(&http));
    let captured: CapturedSet = Arc::new(RwLock::new(HashSet::new()));

    let whitelist = match &config.whitelist {
        Some(path) => Whitelist::load(path).unwrap_or_else(|e| {
            tracing::warn!(file = %path.display(), err = %e, "whitelist unreadable, attacking everything");
            Whitelist::default()
        }),
        None => Whitelist::default(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (rescan_tx, rescan_rx) = mpsc::unbounded_channel();

    let bus_task =
        spawn_bus_client(config.bus_config(), Arc::clone(&store), events_tx, cancel.clone());
    let recon_task =
        spawn_reconciliation(Arc::clone(&http), Arc::clone(&store), cancel.clone());
    let scanner = StatsScanner::new(
        config.captures_dir.clone(),
        config.cracked_dir.clone(),
        config.potfile.clone(),
    );
    let stats_task = spawn_stats_task(
        scanner,
        Arc::clone(&ui),
        Arc::clone(&captured),
        rescan_rx,
        cancel.clone(),
    );
    let coordinator = AttackCoordinator::new(
        commands.clone(),
        Arc::clone(&store),
        Arc::clone(&ui),
        captured,
        rescan_tx,
        whitelist,
        config.enable_policy,
    );
    let coord_task = spawn_coordinator(coordinator, events_rx, cancel.clone());
    let (display, display_task) = spawn_display_worker(NullDriver, cancel.clone());

    let platform = LinuxPlatform {
        capture_service: config.capture_service.clone(),
        engine_host: config.bus_host.clone(),
        engine_port: config.bus_port,
        ..LinuxPlatform::default()
    };
    let mut recovery = RecoveryController::new(
        RecoveryConfig::default(),
        platform,
        commands,
        &config.iface,
        &config.mon_iface,
    );

    let mode = if config.enable_policy { "AUTO" } else { "MANU" };
    ui.update(|state| {
        state.mode = mode.to_owned();
        state.set_status("waking up...");
    })
    .await;

    tracing::info!(
        name = %config.name,
        display = %config.display,
        policy = config.enable_policy,
        "pup is up"
    );

    // Main loop: animation tick, upload watchdog, uptime, recovery poll,
    // dirty debounce into the display worker.
    let started = std::time::Instant::now();
    let main_loop = {
        let ui = Arc::clone(&ui);
        let store = Arc::clone(&store);
        let cancel = cancel.clone();
        async move {
            let mut tick = tokio::time::interval(TICK);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut first_frame = true;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {}
                }
                let now = epoch_ms();
                let uptime = format_uptime(started.elapsed());
                ui.update(move |state| {
                    state.tick_animation(now);
                    state.upload_watchdog(now);
                    if state.uptime != uptime {
                        state.uptime = uptime;
                        state.dirty = true;
                    }
                })
                .await;

                let ap_count = store.snapshot_ap_count().await;
                recovery.poll(ap_count).await;

                if let Some(data) = ui.snapshot_if_dirty(now, DISPLAY_DEBOUNCE_MS).await {
                    if display.offer(FrameSnapshot { data, full: first_frame }) {
                        first_frame = false;
                    } else {
                        // Panel still busy: keep the state dirty so the
                        // next tick retries with a fresh render.
                        ui.update(|state| state.dirty = true).await;
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
        _ = main_loop => {}
    }

    cancel.cancel();
    for task in [bus_task, recon_task, stats_task, coord_task, display_task] {
        let _ = task.await;
    }
    Ok(())
}

fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("UP {:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
