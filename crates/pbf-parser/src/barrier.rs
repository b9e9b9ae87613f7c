use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A consumer callback run once at a phase transition.
///
/// The hook runs after every worker has reached the barrier and before any
/// of them continues, so it may block (for example until a consumer has
/// drained the previous phase's destination).
///
/// ```rust
/// use pbf_parser::PhaseHook;
///
/// let async_hook = PhaseHook::new(|| async {
///     // notify a consumer and wait for its acknowledgement
/// });
/// let sync_hook = PhaseHook::blocking(|| println!("ways start now"));
/// # drop((async_hook, sync_hook));
/// ```
pub struct PhaseHook {
    run: Box<dyn FnOnce() -> HookFuture + Send>,
}

impl PhaseHook {
    pub fn new<F, Fut>(hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            run: Box::new(move || Box::pin(hook())),
        }
    }

    /// Wrap a synchronous callback; it runs on the blocking thread pool.
    pub fn blocking<F>(hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || async move {
            match tokio::task::spawn_blocking(hook).await {
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                _ => {}
            }
        })
    }

    fn into_future(self) -> HookFuture {
        (self.run)()
    }
}

impl fmt::Debug for PhaseHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PhaseHook")
    }
}

/// Lifecycle of a [`PhaseBarrier`].
///
/// ```text
///   Waiting ──(last arrival)──▶ Running ──(hook done)──▶ Open
/// ```
///
/// `Open` is terminal; the barrier is single-use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierState {
    Waiting,
    Running,
    Open,
}

const WAITING: u8 = 0;
const RUNNING: u8 = 1;
const OPEN: u8 = 2;

/// One-shot rendezvous of a fixed number of workers with a transition hook.
///
/// The first `participants - 1` callers of [`rendezvous`](Self::rendezvous)
/// wait. The last caller takes the hook, runs it to completion, opens the
/// barrier and releases everyone. Callers arriving after that return
/// immediately.
///
/// Arrivals are counted with an atomic; release goes through a `watch`
/// latch, which a waiter that subscribes late still observes.
pub struct PhaseBarrier {
    phase: &'static str,
    participants: usize,
    arrived: AtomicUsize,
    state: AtomicU8,
    hook: Mutex<Option<PhaseHook>>,
    hook_panicked: AtomicBool,
    open: watch::Sender<bool>,
}

impl PhaseBarrier {
    /// `participants` is clamped to at least 1.
    #[must_use]
    pub fn new(phase: &'static str, participants: usize, hook: Option<PhaseHook>) -> Self {
        let (open, _) = watch::channel(false);
        Self {
            phase,
            participants: participants.max(1),
            arrived: AtomicUsize::new(0),
            state: AtomicU8::new(WAITING),
            hook: Mutex::new(hook),
            hook_panicked: AtomicBool::new(false),
            open,
        }
    }

    #[must_use]
    pub fn phase(&self) -> &'static str {
        self.phase
    }

    #[must_use]
    pub fn state(&self) -> BarrierState {
        match self.state.load(Ordering::Acquire) {
            WAITING => BarrierState::Waiting,
            RUNNING => BarrierState::Running,
            _ => BarrierState::Open,
        }
    }

    /// Whether the hook panicked. The barrier still opens in that case.
    #[must_use]
    pub fn hook_panicked(&self) -> bool {
        self.hook_panicked.load(Ordering::Acquire)
    }

    /// Arrive at the barrier and wait until it is open.
    ///
    /// Each participant must call this at most once; extra calls beyond
    /// `participants` before the barrier opens simply wait for it.
    pub async fn rendezvous(&self) {
        if self.state() == BarrierState::Open {
            return;
        }

        // Subscribe before counting so the release cannot be missed.
        let mut rx = self.open.subscribe();
        let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived == self.participants {
            self.state.store(RUNNING, Ordering::Release);
            let hook = self
                .hook
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(hook) = hook {
                debug!(phase = self.phase, "running phase hook");
                if let Err(e) = tokio::spawn(hook.into_future()).await {
                    warn!(phase = self.phase, error = %e, "phase hook failed");
                    self.hook_panicked.store(true, Ordering::Release);
                }
            }
            self.state.store(OPEN, Ordering::Release);
            self.open.send_replace(true);
            debug!(phase = self.phase, "phase barrier open");
            return;
        }

        let _ = rx.wait_for(|open| *open).await;
    }
}

impl fmt::Debug for PhaseBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseBarrier")
            .field("phase", &self.phase)
            .field("participants", &self.participants)
            .field("arrived", &self.arrived.load(Ordering::Relaxed))
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
