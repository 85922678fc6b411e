// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Display worker: a dedicated blocking thread that owns the panel.
//!
//! The main loop hands rendered frames over a one-way bounded channel of
//! depth one. A frame that arrives while the panel is mid-refresh is simply
//! not enqueued — the UI dirty flag stays set and the next tick retries —
//! so a slow e-ink write can never stall the event loop or hold the UI
//! lock. The worker reports nothing back.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A hardware (or fake) panel. Implementations block; that is the point of
/// giving them their own thread.
pub trait DisplayDriver: Send + 'static {
    fn refresh_partial(&mut self, frame: &[u8]) -> anyhow::Result<()>;
    fn refresh_full(&mut self, frame: &[u8]) -> anyhow::Result<()>;
}

/// One rendered frame for the panel.
pub struct FrameSnapshot {
    pub data: Vec<u8>,
    /// Request a full refresh (slow, clears ghosting) instead of partial.
    pub full: bool,
}

/// Sending half handed to the main loop.
#[derive(Clone)]
pub struct DisplayHandle {
    tx: SyncSender<FrameSnapshot>,
}

impl DisplayHandle {
    /// Offer a frame to the worker. Returns `false` when the worker is
    /// still busy with the previous refresh; the caller retries later.
    pub fn offer(&self, snapshot: FrameSnapshot) -> bool {
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Spawn the worker on a blocking thread. Returns the handle the main loop
/// pushes frames through and the join handle for shutdown.
pub fn spawn_display_worker<D: DisplayDriver>(
    driver: D,
    cancel: CancellationToken,
) -> (DisplayHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::sync_channel::<FrameSnapshot>(1);
    let join = tokio::task::spawn_blocking(move || worker_loop(driver, rx, cancel));
    (DisplayHandle { tx }, join)
}

fn worker_loop<D: DisplayDriver>(
    mut driver: D,
    rx: Receiver<FrameSnapshot>,
    cancel: CancellationToken,
) {
    loop {
        // The timeout bounds how long shutdown can go unnoticed.
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(snapshot) => {
                let result = if snapshot.full {
                    driver.refresh_full(&snapshot.data)
                } else {
                    driver.refresh_partial(&snapshot.data)
                };
                if let Err(e) = result {
                    tracing::warn!(err = %e, "display refresh failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    tracing::debug!("display worker stopped");
}

/// Driver that discards frames; used headless and in tests.
#[derive(Debug, Default)]
pub struct NullDriver;

impl DisplayDriver for NullDriver {
    fn refresh_partial(&mut self, _frame: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    fn refresh_full(&mut self, _frame: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
