//! Shared browser process pool.
//!
//! # Responsibilities
//! - Lazily launch at most one browser process
//! - Hand out pages from that process to every headless run
//! - Queue acquisitions that arrive while the process is being launched
//!
//! # Design Decisions
//! - "check creating / enqueue-or-create" happens under one mutex, which is
//!   never held across an await
//! - After a failed launch the retry is handed to the oldest waiter; the rest
//!   stay queued behind it
//! - Closing a page never exits the process; only `terminate` does
//! - `terminate` is final: a launch still in flight exits its process on
//!   arrival and every waiter gets `BrowserError::Closed`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::browser::{BrowserError, BrowserLauncher, BrowserPage, BrowserProcess, LaunchOptions};
use crate::observability::metrics;

/// Message sent to a queued acquisition when a launch settles.
enum Wake {
    /// The process is up.
    Ready,
    /// The launch failed and this waiter now owns the retry.
    Launch,
    /// The pool was terminated.
    Closed,
}

struct PoolState {
    process: Option<Arc<dyn BrowserProcess>>,
    creating: bool,
    terminated: bool,
    waiters: VecDeque<oneshot::Sender<Wake>>,
}

enum Next {
    Page(Arc<dyn BrowserProcess>),
    Wait(oneshot::Receiver<Wake>),
    Launch,
    Closed,
}

/// Lazily launched, shared browser process.
pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    options: LaunchOptions,
    state: Mutex<PoolState>,
}

impl BrowserPool {
    /// Create a pool. Nothing is launched until the first page is requested.
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: LaunchOptions) -> Self {
        Self {
            launcher,
            options,
            state: Mutex::new(PoolState {
                process: None,
                creating: false,
                terminated: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Get a new page from the shared process, launching it if needed.
    pub async fn acquire_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let mut step = self.next_step();
        loop {
            step = match step {
                Next::Page(process) => return process.create_page().await,
                Next::Closed => return Err(BrowserError::Closed),
                Next::Wait(ready) => {
                    let mut waiter = WaitGuard {
                        pool: self,
                        ready: Some(ready),
                    };
                    match waiter.wait().await {
                        Some(Wake::Launch) => Next::Launch,
                        Some(Wake::Closed) => Next::Closed,
                        // A dropped sender also means "try again".
                        Some(Wake::Ready) | None => self.next_step(),
                    }
                }
                Next::Launch => {
                    let guard = LaunchGuard {
                        pool: self,
                        settled: false,
                    };
                    let result = self.launcher.launch(&self.options).await;
                    metrics::record_browser_launch(result.is_ok());
                    match result {
                        Ok(process) => {
                            tracing::info!(flags = ?self.options.flags, "Browser process launched");
                            if let Some(orphan) = guard.settle(Some(process)) {
                                tracing::info!("Pool terminated during launch, exiting new process");
                                orphan.exit().await;
                                return Err(BrowserError::Closed);
                            }
                            self.next_step()
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Browser launch failed");
                            guard.settle(None);
                            return Err(e);
                        }
                    }
                }
            };
        }
    }

    /// Release a page obtained from this pool. The process stays up.
    pub async fn release(&self, page: Box<dyn BrowserPage>) {
        page.close().await;
    }

    /// Exit the shared process and refuse further acquisitions.
    pub async fn terminate(&self) {
        let process = {
            let mut state = self.lock();
            state.terminated = true;
            state.process.take()
        };
        if let Some(process) = process {
            tracing::info!("Terminating shared browser process");
            process.exit().await;
        }
    }

    /// Whether a process is currently running.
    pub fn is_running(&self) -> bool {
        self.lock().process.is_some()
    }

    /// Number of acquisitions waiting for a launch to finish.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    fn next_step(&self) -> Next {
        let mut state = self.lock();
        if state.terminated {
            Next::Closed
        } else if let Some(process) = &state.process {
            Next::Page(Arc::clone(process))
        } else if state.creating {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            Next::Wait(rx)
        } else {
            state.creating = true;
            Next::Launch
        }
    }

    /// Settle the in-flight launch. Returns the process back if the pool was
    /// terminated meanwhile; the caller must exit it.
    fn finish_launch(&self, process: Option<Arc<dyn BrowserProcess>>) -> Option<Arc<dyn BrowserProcess>> {
        let mut state = self.lock();
        if state.terminated {
            state.creating = false;
            for waiter in state.waiters.drain(..) {
                let _ = waiter.send(Wake::Closed);
            }
            return process;
        }

        match process {
            Some(process) => {
                state.creating = false;
                state.process = Some(process);
                for waiter in state.waiters.drain(..) {
                    let _ = waiter.send(Wake::Ready);
                }
            }
            None => {
                while let Some(waiter) = state.waiters.pop_front() {
                    if waiter.send(Wake::Launch).is_ok() {
                        // `creating` stays set; the retry belongs to that waiter.
                        return None;
                    }
                }
                state.creating = false;
            }
        }
        None
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("browser pool mutex poisoned")
    }
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BrowserPool")
            .field("options", &self.options)
            .field("running", &state.process.is_some())
            .field("creating", &state.creating)
            .field("terminated", &state.terminated)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// Clears the `creating` flag and wakes waiters even if the launching future
/// is dropped mid-launch.
struct LaunchGuard<'a> {
    pool: &'a BrowserPool,
    settled: bool,
}

impl LaunchGuard<'_> {
    fn settle(mut self, process: Option<Arc<dyn BrowserProcess>>) -> Option<Arc<dyn BrowserProcess>> {
        self.settled = true;
        self.pool.finish_launch(process)
    }
}

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.finish_launch(None);
        }
    }
}

/// A queued acquisition. If it is dropped after being handed the retry, the
/// retry passes on to the next waiter.
struct WaitGuard<'a> {
    pool: &'a BrowserPool,
    ready: Option<oneshot::Receiver<Wake>>,
}

impl WaitGuard<'_> {
    async fn wait(&mut self) -> Option<Wake> {
        let ready = self.ready.as_mut()?;
        let wake = ready.await.ok();
        self.ready = None;
        wake
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut ready) = self.ready.take() {
            ready.close();
            if let Ok(Wake::Launch) = ready.try_recv() {
                self.pool.finish_launch(None);
            }
        }
    }
}
