//! Rescan debouncing.
//!
//! Change signals are level-triggered and carry no payload; the debouncer
//! collapses a burst of them into a single rescan once a quiet period
//! elapses with no further signals. The state machine is explicit:
//!
//! ```text
//! Idle --signal--> Pending(deadline) --quiet elapsed--> Firing --done--> Idle
//!                  ^        |
//!                  +-signal-+   (deadline restarts)
//! ```
//!
//! The actor is the sole invoker of rescans, so rescans never run
//! concurrently. Signals arriving while Firing stay queued in the channel
//! and schedule exactly one follow-up round once the rescan completes.
//! Timing is driven by the tokio clock, so tests run under paused time.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::error::Result;

/// Quiet period applied when none is configured.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy)]
enum DebounceState {
    Idle,
    Pending(Instant),
    Firing,
}

/// Runs the debounce loop until the signal channel closes.
///
/// `rescan` is awaited at most once at a time. An error it returns is
/// terminal for the loop; containment of non-fatal rescan failures is the
/// callback's responsibility.
pub async fn run<F, Fut>(
    mut signals: mpsc::UnboundedReceiver<()>,
    quiet: Duration,
    mut rescan: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut state = DebounceState::Idle;
    loop {
        state = match state {
            DebounceState::Idle => match signals.recv().await {
                Some(()) => DebounceState::Pending(Instant::now() + quiet),
                None => return Ok(()),
            },
            DebounceState::Pending(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => DebounceState::Firing,
                    signal = signals.recv() => match signal {
                        Some(()) => DebounceState::Pending(Instant::now() + quiet),
                        None => return Ok(()),
                    },
                }
            }
            DebounceState::Firing => {
                rescan().await?;
                DebounceState::Idle
            }
        };
    }
}
