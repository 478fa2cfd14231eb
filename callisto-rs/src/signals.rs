//! Turns process signals into an orderly platform shutdown.
//!
//! A cache node has nothing to persist, so "shutdown" simply means: stop accepting
//! requests and let the process exit. This module forks a task which waits for the first
//! of **CTRL+C**, **SIGTERM** (what a container runtime sends) or **SIGHUP** and then
//! calls [Platform::terminate](crate::platform::Platform::terminate), which all server
//! loops observe.
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::platform::Platform;
use crate::spawn;

/// Forks the signal listener for the given platform.
///
/// The [Builder](crate::builder::Builder) calls this unless signal handling was disabled.
pub fn install(platform: Arc<Platform>) {
    spawn!(async move {
        let mut sig_term = signal(SignalKind::terminate()).unwrap();
        let mut sig_hup = signal(SignalKind::hangup()).unwrap();

        let received = tokio::select! {
            _ = tokio::signal::ctrl_c() => "CTRL-C",
            _ = sig_term.recv() => "SIGTERM",
            _ = sig_hup.recv() => "SIGHUP",
        };

        log::info!("Received {}. Shutting down...", received);
        platform.terminate();
    });
}
