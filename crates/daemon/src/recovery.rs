// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WiFi driver failure detection and recovery.
//!
//! The monitor chipset firmware wedges under sustained channel hopping:
//! the symptom is an extended stretch with zero visible APs. The
//! controller diagnoses via the interface state and the kernel ring
//! buffer, then walks stop -> reload-driver -> (SDIO rebind on fallback)
//! -> start. Attempts are capped and cooled down; the final escalation is
//! a reboot.

use std::time::Duration;

use tokio::time::Instant;

use crate::bus::CommandSink;

const KERNEL_LOG_PATTERNS: &[&str] = &[
    "brcmf_cfg80211_nexmon_set_channel: Set Channel failed",
    "Firmware has halted or crashed",
    "brcmf_run_escan: error (-110)",
    "brcmf_cfg80211_scan: scan error (-110)",
    "brcmf_sdio_hostmail: mailbox indicates firmware halted or crashed",
    "brcmf_proto_bcdc_query_dcmd: brcmf_proto_bcdc_msg failed w/status -110",
    "brcmf_sdio_checkdied: firmware trap in dongle",
];

/// Tunables, sized to the chipset's observed failure cadence.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Zero APs for this long means we are blind.
    pub blind_threshold: Duration,
    /// Minimum spacing between recovery attempts.
    pub cooldown: Duration,
    /// Attempts before escalating to reboot.
    pub max_attempts: u32,
    /// No diagnosis this soon after process start; scanning needs time to
    /// warm up.
    pub startup_grace: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            blind_threshold: Duration::from_secs(120),
            cooldown: Duration::from_secs(120),
            max_attempts: 3,
            startup_grace: Duration::from_secs(180),
        }
    }
}

/// Observed state of the monitor interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfaceState {
    Up,
    Down,
    Missing,
}

/// Why a recovery fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryReason {
    InterfaceDown,
    InterfaceMissing,
    KernelLog(String),
    /// Blind for twice the threshold with no other diagnosis.
    Forced,
}

/// What `check` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    /// Diagnosis positive but the previous attempt was too recent.
    Cooldown,
    Recover(RecoveryReason),
}

/// Platform operations the recovery sequence needs. The Linux
/// implementation shells out; tests substitute a scripted mock.
#[allow(async_fn_in_trait)]
pub trait RecoveryPlatform {
    async fn interface_state(&self, iface: &str) -> IfaceState;
    /// Tail of the kernel ring buffer, most recent last.
    async fn kernel_log_tail(&self) -> Vec<String>;
    async fn stop_monitor(&self, iface: &str) -> anyhow::Result<()>;
    async fn unload_driver(&self) -> anyhow::Result<()>;
    async fn load_driver(&self) -> anyhow::Result<()>;
    /// Power-cycle the SDIO controller by unbinding and rebinding it.
    async fn rebind_sdio(&self) -> anyhow::Result<()>;
    async fn start_monitor(&self, iface: &str) -> anyhow::Result<()>;
    async fn restart_capture_engine(&self) -> anyhow::Result<()>;
    /// One trivial GET against the engine API.
    async fn engine_api_ready(&self) -> bool;
    async fn reboot(&self) -> anyhow::Result<()>;
}

/// Driver recovery state machine, polled from the main loop.
pub struct RecoveryController<P, C> {
    config: RecoveryConfig,
    platform: P,
    commands: C,
    base_iface: String,
    mon_iface: String,

    started_at: Instant,
    last_ap_seen: Instant,
    last_recovery: Option<Instant>,
    attempts: u32,
    pub total_recoveries: u64,
    pub total_failures: u64,
    is_recovering: bool,
}

impl<P: RecoveryPlatform, C: CommandSink> RecoveryController<P, C> {
    pub fn new(
        config: RecoveryConfig,
        platform: P,
        commands: C,
        base_iface: &str,
        mon_iface: &str,
    ) -> Self {
        let started_at = Instant::now();
        // Seeding last_ap_seen past the grace window means the blind timer
        // cannot fire while scanning is still warming up.
        let last_ap_seen = started_at + config.startup_grace;
        Self {
            config,
            platform,
            commands,
            base_iface: base_iface.to_owned(),
            mon_iface: mon_iface.to_owned(),
            started_at,
            last_ap_seen,
            last_recovery: None,
            attempts: 0,
            total_recoveries: 0,
            total_failures: 0,
            is_recovering: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Diagnose. Called once per main-loop iteration with the current AP
    /// count; cheap unless we are actually blind.
    pub async fn check(&mut self, ap_count: usize) -> Decision {
        let now = Instant::now();

        if now.duration_since(self.started_at) < self.config.startup_grace {
            if ap_count > 0 {
                self.last_ap_seen = now;
            }
            return Decision::NoAction;
        }
        if ap_count > 0 {
            self.last_ap_seen = now;
            return Decision::NoAction;
        }
        if self.is_recovering {
            return Decision::NoAction;
        }

        let blind = now.saturating_duration_since(self.last_ap_seen);
        if blind < self.config.blind_threshold {
            return Decision::NoAction;
        }

        let reason = match self.platform.interface_state(&self.mon_iface).await {
            IfaceState::Down => Some(RecoveryReason::InterfaceDown),
            IfaceState::Missing => Some(RecoveryReason::InterfaceMissing),
            IfaceState::Up => {
                let tail = self.platform.kernel_log_tail().await;
                let hit = tail.iter().rev().find_map(|line| {
                    KERNEL_LOG_PATTERNS
                        .iter()
                        .find(|p| line.contains(*p))
                        .map(|p| (*p).to_owned())
                });
                match hit {
                    Some(pattern) => Some(RecoveryReason::KernelLog(pattern)),
                    None if blind >= self.config.blind_threshold * 2 => {
                        Some(RecoveryReason::Forced)
                    }
                    None => None,
                }
            }
        };

        let Some(reason) = reason else {
            return Decision::NoAction;
        };
        if let Some(last) = self.last_recovery {
            if now.duration_since(last) < self.config.cooldown {
                return Decision::Cooldown;
            }
        }
        Decision::Recover(reason)
    }

    /// Walk the full stop/reload/start sequence. On success the attempt
    /// counter clears; at the attempt cap the platform reboot fires.
    pub async fn perform(&mut self, reason: &RecoveryReason) {
        self.is_recovering = true;
        self.last_recovery = Some(Instant::now());
        self.attempts += 1;
        tracing::warn!(?reason, attempt = self.attempts, "wifi recovery starting");

        let result = self.run_sequence().await;
        self.is_recovering = false;

        match result {
            Ok(()) => {
                tracing::info!("wifi recovery succeeded");
                self.attempts = 0;
                self.total_recoveries += 1;
                self.last_ap_seen = Instant::now();
            }
            Err(e) => {
                self.total_failures += 1;
                tracing::error!(err = %e, attempt = self.attempts, "wifi recovery failed");
                if self.attempts >= self.config.max_attempts {
                    tracing::error!("recovery attempts exhausted, rebooting");
                    if let Err(e) = self.platform.reboot().await {
                        tracing::error!(err = %e, "reboot failed");
                    }
                }
            }
        }
    }

    async fn run_sequence(&mut self) -> anyhow::Result<()> {
        // Stop: quiesce the engine, tear down the monitor interface.
        if let Err(e) = self.commands.send_command("wifi.recon off").await {
            tracing::debug!(err = %e, "recon off failed (engine may be dead already)");
        }
        self.platform.stop_monitor(&self.mon_iface).await?;

        // Reload the driver; fall back to an SDIO power-cycle when the
        // interface does not come back.
        self.platform.unload_driver().await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        self.platform.load_driver().await?;
        tokio::time::sleep(Duration::from_secs(5)).await;

        if self.platform.interface_state(&self.base_iface).await == IfaceState::Missing {
            tracing::warn!("interface still missing after reload, rebinding SDIO");
            self.platform.rebind_sdio().await?;
            self.platform.load_driver().await?;
            self.wait_for_interface(Duration::from_secs(20)).await?;
        }

        // Start: monitor mode back up, then a fresh capture engine — the
        // old pcap handle is bound to an interface that no longer exists.
        self.platform.start_monitor(&self.mon_iface).await?;
        self.platform.restart_capture_engine().await?;
        self.wait_for_engine(Duration::from_secs(30)).await?;

        self.commands.send_command(&format!("set wifi.interface {}", self.mon_iface)).await?;
        self.commands.send_command("wifi.clear; wifi.recon on").await?;
        Ok(())
    }

    async fn wait_for_interface(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.platform.interface_state(&self.base_iface).await != IfaceState::Missing {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("interface {} absent after SDIO rebind", self.base_iface);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn wait_for_engine(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.platform.engine_api_ready().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("capture engine API still down");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// One main-loop poll: diagnose and, when warranted, recover.
    pub async fn poll(&mut self, ap_count: usize) {
        match self.check(ap_count).await {
            Decision::NoAction => {}
            Decision::Cooldown => {
                tracing::debug!("recovery needed but cooling down");
            }
            Decision::Recover(reason) => self.perform(&reason).await,
        }
    }
}

// -- Linux platform -----------------------------------------------------------

/// Real platform bindings: sysfs probes and shell commands.
pub struct LinuxPlatform {
    pub driver_module: String,
    pub sdio_driver_path: String,
    pub sdio_device_id: String,
    pub capture_service: String,
    pub engine_host: String,
    pub engine_port: u16,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self {
            driver_module: "brcmfmac".to_owned(),
            sdio_driver_path: "/sys/bus/platform/drivers/mmc-bcm2835".to_owned(),
            sdio_device_id: "3f300000.mmc".to_owned(),
            capture_service: "bettercap".to_owned(),
            engine_host: "127.0.0.1".to_owned(),
            engine_port: 8081,
        }
    }
}

impl LinuxPlatform {
    async fn run(&self, cmd: &str) -> anyhow::Result<()> {
        let status = tokio::process::Command::new("sh").arg("-c").arg(cmd).status().await?;
        if !status.success() {
            anyhow::bail!("{cmd:?} exited with {status}");
        }
        Ok(())
    }
}

impl RecoveryPlatform for LinuxPlatform {
    async fn interface_state(&self, iface: &str) -> IfaceState {
        let dir = format!("/sys/class/net/{iface}");
        if !std::path::Path::new(&dir).exists() {
            return IfaceState::Missing;
        }
        match tokio::fs::read_to_string(format!("{dir}/operstate")).await {
            Ok(state) => match state.trim() {
                "up" | "unknown" => IfaceState::Up,
                _ => IfaceState::Down,
            },
            Err(_) => IfaceState::Down,
        }
    }

    async fn kernel_log_tail(&self) -> Vec<String> {
        let output = tokio::process::Command::new("dmesg").output().await;
        match output {
            Ok(out) => {
                let text = String::from_utf8_lossy(&out.stdout);
                let lines: Vec<String> = text.lines().map(str::to_owned).collect();
                let skip = lines.len().saturating_sub(100);
                lines.into_iter().skip(skip).collect()
            }
            Err(e) => {
                tracing::debug!(err = %e, "dmesg failed");
                Vec::new()
            }
        }
    }

    async fn stop_monitor(&self, iface: &str) -> anyhow::Result<()> {
        self.run(&format!("monstop || (ip link set {iface} down && iw dev {iface} del)")).await
    }

    async fn unload_driver(&self) -> anyhow::Result<()> {
        self.run(&format!("rmmod {}", self.driver_module)).await
    }

    async fn load_driver(&self) -> anyhow::Result<()> {
        self.run(&format!("modprobe {}", self.driver_module)).await
    }

    async fn rebind_sdio(&self) -> anyhow::Result<()> {
        let unbind = format!("{}/unbind", self.sdio_driver_path);
        let bind = format!("{}/bind", self.sdio_driver_path);
        tokio::fs::write(&unbind, &self.sdio_device_id).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        tokio::fs::write(&bind, &self.sdio_device_id).await?;
        Ok(())
    }

    async fn start_monitor(&self, iface: &str) -> anyhow::Result<()> {
        self.run(&format!("monstart {iface} || monstart")).await
    }

    async fn restart_capture_engine(&self) -> anyhow::Result<()> {
        self.run(&format!("systemctl restart {}", self.capture_service)).await
    }

    async fn engine_api_ready(&self) -> bool {
        let addr = format!("{}:{}", self.engine_host, self.engine_port);
        let connect = tokio::net::TcpStream::connect(&addr);
        match tokio::time::timeout(Duration::from_secs(2), connect).await {
            Ok(Ok(mut stream)) => {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let req = "GET /api/session HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
                if stream.write_all(req.as_bytes()).await.is_err() {
                    return false;
                }
                let mut buf = [0u8; 128];
                matches!(stream.read(&mut buf).await, Ok(n) if n > 0)
            }
            _ => false,
        }
    }

    async fn reboot(&self) -> anyhow::Result<()> {
        self.run("reboot").await
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
