//! OS signal handling.
//!
//! # Responsibilities
//! - Install SIGINT and, on unix, SIGTERM handlers
//! - Report which one arrived so the caller can log it
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - On unix, handlers are installed eagerly by `install()`, so a listener can
//!   report ready knowing no signal will be missed
//! - Only the first signal is observed; callers decide what a second one means

use std::io;

/// Termination signals the registry reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installed termination-signal handlers.
#[cfg(unix)]
pub struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Install the handlers. Must be called within a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves with the next signal delivered.
    pub async fn recv(&mut self) -> io::Result<ShutdownSignal> {
        tokio::select! {
            _ = self.interrupt.recv() => Ok(ShutdownSignal::Interrupt),
            _ = self.terminate.recv() => Ok(ShutdownSignal::Terminate),
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> io::Result<ShutdownSignal> {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}
