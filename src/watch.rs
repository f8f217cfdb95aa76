//! Observation window controller.
//!
//! [`run_window`] drives a [`BusSession`] through connect → subscribe →
//! bounded listen → disconnect, accumulating arrival evidence along the
//! way. The deadline timer and the asynchronous message stream are
//! reconciled in a single `tokio::select!` loop, so the evidence has
//! exactly one writer and the wait is cancellable at the deadline -- or,
//! for check runs, at the first arrival.

use std::time::Duration;

use crate::report::ArrivalEvidence;
use crate::session::{BusSession, SessionError};

/// Operating mode for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pass/fail probe: the first arrival settles the verdict, so the
    /// window closes early and only silence triggers an alert.
    Check,
    /// Diagnostic run: always wait out the full window, keep payloads and
    /// timestamps, always send a summary.
    Debug,
}

/// Terminal state of an observation window.
///
/// `Failed` absorbs connect/subscribe errors and mid-window drops that
/// recorded nothing; every other path ends in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Closed,
    Failed,
}

/// Everything one observation window produced, frozen for evaluation.
#[derive(Debug)]
pub struct WindowOutcome {
    pub evidence: ArrivalEvidence,
    /// Transport failures observed during the run, in order.
    pub connection_errors: Vec<String>,
    pub state: WindowState,
}

/// Run one time-boxed observation window over `session`.
///
/// Connection-phase failures skip the listening phase entirely; the
/// session is disconnected unconditionally on every path out. Zero
/// arrivals over a full window is a valid outcome, not an error.
pub async fn run_window<S: BusSession>(
    session: &mut S,
    topics: &[String],
    window: Duration,
    mode: Mode,
) -> WindowOutcome {
    let mut evidence = ArrivalEvidence::default();
    let mut connection_errors = Vec::new();

    tracing::debug!(
        topics = topics.len(),
        window_secs = window.as_secs(),
        "Opening observation window",
    );

    if let Err(e) = establish(session, topics).await {
        tracing::error!(error = %e, "Could not reach the broker");
        connection_errors.push(e.to_string());
        session.disconnect().await;
        return WindowOutcome {
            evidence,
            connection_errors,
            state: WindowState::Failed,
        };
    }

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    let state = loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!("Observation window elapsed");
                break WindowState::Closed;
            }
            arrival = session.next_arrival() => match arrival {
                Ok(arrival) => {
                    tracing::debug!(
                        topic = %arrival.topic,
                        payload = %arrival.payload,
                        "Message received",
                    );
                    evidence.record(&arrival, mode == Mode::Debug);
                    if mode == Mode::Check {
                        // One live device settles the verdict.
                        tracing::debug!("First arrival observed, closing window early");
                        break WindowState::Closed;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Connection lost before the window elapsed");
                    connection_errors.push(e.to_string());
                    // Success stays a pure function of what was already
                    // recorded; the drop only fails the run when nothing was.
                    break if evidence.total() == 0 {
                        WindowState::Failed
                    } else {
                        WindowState::Closed
                    };
                }
            }
        }
    };

    session.disconnect().await;

    WindowOutcome {
        evidence,
        connection_errors,
        state,
    }
}

/// Connect and subscribe, collapsing both phases into one fallible step.
async fn establish<S: BusSession>(session: &mut S, topics: &[String]) -> Result<(), SessionError> {
    session.connect().await?;
    session.subscribe(topics).await?;
    Ok(())
}
