//! Shutdown signalling
//!
//! One [`Shutdown`] handle is owned by `main`; every long-running loop holds a
//! [`ShutdownListener`] and races its timers against it, so retry sleeps end
//! promptly on Ctrl-C instead of running to completion.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested by code (tests, fatal errors)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Terminate => write!(f, "terminate"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Shutdown coordinator
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<Option<ShutdownSignal>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Request shutdown. Later requests are ignored.
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        let first = self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(signal);
            true
        });
        if first {
            info!("Shutdown requested: {}", signal);
        } else {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side handed to tasks
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    pub fn is_shutdown(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves once shutdown is requested (or the coordinator is dropped).
    pub async fn wait(&mut self) {
        // Err means the sender is gone, which is as final as a signal.
        let _ = self.rx.wait_for(Option::is_some).await;
    }

    /// Sleep for `duration`. Returns `false` if shutdown interrupted the sleep.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }
}

/// Wait for Ctrl-C or SIGTERM and forward it to `shutdown`.
pub async fn wait_for_os_signal(shutdown: &Shutdown) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => shutdown.request_shutdown(ShutdownSignal::Interrupt),
        _ = terminate => shutdown.request_shutdown(ShutdownSignal::Terminate),
    }
}
