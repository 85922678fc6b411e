// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus plumbing: RFC 6455 framing, the keep-alive REST client, typed
//! events, and the connection-owning client worker.

pub mod client;
pub mod events;
pub mod frame;
pub mod http;

pub use client::{
    spawn_bus_client, spawn_reconciliation, BusConfig, CommandSender, CommandSink, ConnState,
};
pub use events::BusEvent;
pub use http::KeepAliveHttp;
