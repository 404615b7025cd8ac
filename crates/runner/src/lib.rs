//! Process supervisor for long-running drain workers.
//!
//! A [`Runner`] owns one or more worker futures and a set of closers:
//! - Workers share a [`CancellationToken`] that is cancelled on SIGINT/SIGTERM
//!   or when any worker fails
//! - After cancellation, workers get a grace period to finish the batch they hold
//! - Closers run once every worker has stopped
//!
//! ```no_run
//! use drain_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let outcome = Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_shutdown_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedRun = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A worker future factory, handed the shared cancellation token
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedRun + Send>;

/// Cleanup run after every worker has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedRun + Send>;

/// How the supervised workers stopped
#[derive(Debug)]
pub enum RunOutcome {
    /// Every worker returned on its own
    Completed,
    /// A shutdown signal or external cancellation stopped the workers
    Interrupted,
    /// A worker failed or panicked
    Failed(anyhow::Error),
}

impl RunOutcome {
    /// Process exit status for this outcome; interruption is a clean exit
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed | RunOutcome::Interrupted => 0,
            RunOutcome::Failed(_) => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<AppProcess>,
    closers: Vec<Closer>,
    shutdown_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner with a 10 second shutdown grace period and OS signal handling enabled
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            shutdown_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    pub fn with_app_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push(Box::new(|token| Box::pin(process(token))));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// How long workers and then closers may take once shutdown begins
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disable SIGINT/SIGTERM handling, leaving cancellation to the caller's token
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run every worker until they all return, one fails, or shutdown is requested.
    pub async fn run(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut workers = JoinSet::new();

        for process in self.app_processes {
            workers.spawn(process(token.clone()));
        }

        if self.handle_signals {
            spawn_signal_listener(token.clone());
        }

        let mut failure: Option<anyhow::Error> = None;

        loop {
            let joined = tokio::select! {
                joined = workers.join_next() => joined,
                _ = token.cancelled() => break,
            };

            match joined {
                None => break,
                Some(Ok(Ok(()))) => debug!("worker finished"),
                Some(Ok(Err(err))) => {
                    error!(error = format!("{:#}", err), "worker failed");
                    failure = Some(err);
                    token.cancel();
                    break;
                }
                Some(Err(join_err)) => {
                    error!(error = %join_err, "worker panicked");
                    failure = Some(anyhow::anyhow!("worker panicked: {}", join_err));
                    token.cancel();
                    break;
                }
            }
        }

        let interrupted = token.is_cancelled() && failure.is_none();
        if !workers.is_empty() {
            info!(
                timeout = ?self.shutdown_timeout,
                "waiting for workers to finish in-flight work"
            );
            if let Some(err) = drain_workers(&mut workers, self.shutdown_timeout).await {
                failure.get_or_insert(err);
            }
        }

        run_closers(self.closers, self.shutdown_timeout).await;

        match failure {
            Some(err) => RunOutcome::Failed(err),
            None if interrupted => {
                info!("shut down on request");
                RunOutcome::Interrupted
            }
            None => RunOutcome::Completed,
        }
    }
}

fn spawn_signal_listener(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("received interrupt, stopping");
                    ctrl_c_token.cancel();
                }
                Err(err) => error!(error = %err, "unable to listen for interrupt"),
            },
            _ = ctrl_c_token.cancelled() => {}
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(error = %err, "unable to listen for SIGTERM");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, stopping");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

/// Wait for cancelled workers, aborting whatever is still running at the deadline.
async fn drain_workers(
    workers: &mut JoinSet<anyhow::Result<()>>,
    timeout: Duration,
) -> Option<anyhow::Error> {
    let mut failure = None;
    let drained = tokio::time::timeout(timeout, async {
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = format!("{:#}", err), "worker failed during shutdown");
                    failure.get_or_insert(err);
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    error!(error = %join_err, "worker panicked during shutdown");
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(timeout = ?timeout, "workers did not stop in time, aborting");
        workers.shutdown().await;
    }
    failure
}

async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    let mut set = JoinSet::new();
    for closer in closers {
        set.spawn(closer());
    }

    let finished = tokio::time::timeout(timeout, async {
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = format!("{:#}", err), "closer failed"),
                Err(join_err) => error!(error = %join_err, "closer panicked"),
            }
        }
    })
    .await;

    if finished.is_err() {
        error!(timeout = ?timeout, "closers timed out");
        set.shutdown().await;
    }
}
