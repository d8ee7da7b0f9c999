//! Worker pool bring-up (SPEC_FULL §10.2, §10.3).
//!
//! Grounded on `chopin/src/server.rs`'s thread-per-core pool, each worker
//! binding its own `SO_REUSEPORT` listener rather than sharing one accept
//! queue — the kernel load-balances accepts across the duplicate sockets,
//! so workers never need to coordinate a shared connection table. Graceful
//! shutdown is a `ctrlc`-registered handler flipping a shared `AtomicBool`
//! that every reactor polls once per `POLL_TIMEOUT_MS` tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ReactorError, ReactorResult};
use crate::worker::{self, WorkerConfig};

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind one listener per worker and block until every worker has
    /// exited (either through an unrecoverable error or the shutdown
    /// signal).
    pub fn run(self) -> ReactorResult<()> {
        let shutdown = Arc::new(AtomicBool::new(false));
        install_shutdown_handler(Arc::clone(&shutdown))?;

        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        let mut handles: Vec<JoinHandle<ReactorResult<()>>> = Vec::with_capacity(self.config.workers);

        for worker_idx in 0..self.config.workers {
            let listen_fd = worker::bind_listener(self.config.bind)?;
            let cfg = WorkerConfig {
                listen_fd,
                buffer_size: self.config.buffer_size,
                max_connections: self.config.max_connections,
                static_prefix: self.config.static_prefix.clone(),
                dynamic_prefix: self.config.dynamic_prefix.clone(),
                root: self.config.root.clone(),
                shutdown: Arc::clone(&shutdown),
            };

            let pin_to = if self.config.pin_workers {
                core_ids.get(worker_idx % core_ids.len().max(1)).copied()
            } else {
                None
            };

            let handle = std::thread::Builder::new()
                .name(format!("reactor-{worker_idx}"))
                .spawn(move || {
                    if let Some(core) = pin_to {
                        core_affinity::set_for_current(core);
                    }
                    worker::run(cfg)
                })
                .map_err(|e| ReactorError::Config(format!("failed to spawn worker thread: {e}")))?;

            handles.push(handle);
        }

        info!(workers = self.config.workers, bind = %self.config.bind, "listening");

        let mut first_error = None;
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(worker = idx, error = %e, "worker exited with error");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    warn!(worker = idx, "worker thread panicked");
                    first_error
                        .get_or_insert(ReactorError::WorkerPanic(format!("worker {idx} panicked")));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn install_shutdown_handler(shutdown: Arc<AtomicBool>) -> ReactorResult<()> {
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown.store(true, Ordering::Relaxed);
    })
    .map_err(|e| ReactorError::Config(format!("failed to install signal handler: {e}")))
}
