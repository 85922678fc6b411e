// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use crate::bus::BusConfig;

/// Configuration for the pup daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "pupd", about = "Autonomous WiFi handshake hunter")]
pub struct DaemonConfig {
    /// Unit name shown on the display.
    #[arg(long, default_value = "pup", env = "PUP_NAME")]
    pub name: String,

    /// Capture engine host.
    #[arg(long, default_value = "127.0.0.1", env = "PUP_BUS_HOST")]
    pub bus_host: String,

    /// Capture engine API port.
    #[arg(long, default_value_t = 8081, env = "PUP_BUS_PORT")]
    pub bus_port: u16,

    /// WebSocket event stream path.
    #[arg(long, default_value = "/api/events", env = "PUP_BUS_PATH")]
    pub bus_path: String,

    /// API username.
    #[arg(long, default_value = "user", env = "PUP_BUS_USER")]
    pub bus_username: String,

    /// API password.
    #[arg(long, default_value = "pass", env = "PUP_BUS_PASS")]
    pub bus_password: String,

    /// Base reconnect delay in milliseconds (doubles per attempt).
    #[arg(long, default_value_t = 1000, env = "PUP_RECONNECT_DELAY_MS")]
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts before giving up; 0 retries forever.
    #[arg(long, default_value_t = 0, env = "PUP_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,

    /// WebSocket heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 15000, env = "PUP_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Directory the capture engine writes handshakes into.
    #[arg(long, default_value = "/root/handshakes", env = "PUP_CAPTURES_DIR")]
    pub captures_dir: PathBuf,

    /// Directory for cracked `<SSID>.key` files.
    #[arg(long, default_value = "/root/handshakes/cracked", env = "PUP_CRACKED_DIR")]
    pub cracked_dir: PathBuf,

    /// wpa-sec results potfile.
    #[arg(long, default_value = "/root/handshakes/wpa-sec.potfile", env = "PUP_POTFILE")]
    pub potfile: PathBuf,

    /// Display preset (1in54, 2in13, 2in13v1, 2in7, 2in9, 4in2).
    #[arg(long, default_value = "2in13", env = "PUP_DISPLAY")]
    pub display: String,

    /// Invert the display (white on black).
    #[arg(long, env = "PUP_INVERT")]
    pub invert: bool,

    /// File with whitelisted SSIDs/BSSIDs, one per line.
    #[arg(long, env = "PUP_WHITELIST")]
    pub whitelist: Option<PathBuf>,

    /// Enable the attack policy engine; without it the unit only observes.
    #[arg(long, env = "PUP_ENABLE_POLICY")]
    pub enable_policy: bool,

    /// Managed WiFi interface.
    #[arg(long, default_value = "wlan0", env = "PUP_IFACE")]
    pub iface: String,

    /// Monitor-mode interface.
    #[arg(long, default_value = "wlan0mon", env = "PUP_MON_IFACE")]
    pub mon_iface: String,

    /// systemd unit of the capture engine, restarted during recovery.
    #[arg(long, default_value = "bettercap", env = "PUP_CAPTURE_SERVICE")]
    pub capture_service: String,

    /// Verbose logging (equivalent to RUST_LOG=debug).
    #[arg(long, short)]
    pub verbose: bool,
}

impl DaemonConfig {
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            host: self.bus_host.clone(),
            port: self.bus_port,
            path: self.bus_path.clone(),
            username: self.bus_username.clone(),
            password: self.bus_password.clone(),
            auto_reconnect: true,
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_delay_ms: self.reconnect_delay_ms,
            heartbeat_interval_ms: self.heartbeat_ms,
        }
    }
}
