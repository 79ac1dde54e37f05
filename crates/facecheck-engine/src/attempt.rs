//! Attendance attempt state machine.
//!
//! ```text
//! idle ──begin──▶ loading ──succeed──▶ succeeded ─┐
//!                    │                            │ begin (new attempt)
//!                    └────fail────▶ failed ───────┤
//!   ▲                                             │
//!   └──────────────────reset──────────────────────┘
//! ```
//!
//! The store is the one shared copy of attempt state; every subscriber sees
//! the same committed transitions. Each `begin` opens a new generation, and a
//! resolution is committed only if its ticket still names the live generation.

use facecheck_api::CheckinRecord;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// Snapshot of the current attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceAttempt {
    pub status: AttemptStatus,
    /// Human-readable failure message, set only in `Failed`.
    pub error: Option<String>,
    /// Server-confirmed record, set only in `Succeeded`.
    pub result: Option<CheckinRecord>,
    generation: u64,
}

impl AttendanceAttempt {
    fn idle() -> Self {
        Self {
            status: AttemptStatus::Idle,
            error: None,
            result: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.status == AttemptStatus::Loading
    }
}

/// Right to resolve one attempt. Consumed by `succeed`/`fail`.
///
/// Dropping an unresolved ticket abandons its attempt: if it is still the
/// live one and loading, the store returns to `idle` so a new attempt can begin.
#[derive(Debug)]
#[must_use = "dropping an attempt ticket abandons the attempt"]
pub struct AttemptTicket {
    generation: u64,
    state: Arc<watch::Sender<AttendanceAttempt>>,
}

impl AttemptTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for AttemptTicket {
    fn drop(&mut self) {
        let generation = self.generation;
        let abandoned = self.state.send_if_modified(|s| {
            if s.generation != generation || s.status != AttemptStatus::Loading {
                return false;
            }
            s.generation += 1;
            s.status = AttemptStatus::Idle;
            s.error = None;
            s.result = None;
            true
        });
        if abandoned {
            tracing::warn!(attempt = generation, "attempt abandoned before it resolved");
        }
    }
}

/// A resolution arrived for an attempt that is no longer the live one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("attempt {ticket} resolved after being superseded (current attempt {current}); result discarded")]
pub struct StaleAttemptDiscarded {
    pub ticket: u64,
    pub current: u64,
}

/// Shared attendance attempt store. Clones share state.
#[derive(Clone)]
pub struct AttendanceStore {
    state: Arc<watch::Sender<AttendanceAttempt>>,
}

impl Default for AttendanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttendanceStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AttendanceAttempt::idle());
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn snapshot(&self) -> AttendanceAttempt {
        self.state.borrow().clone()
    }

    /// Receive every committed transition.
    pub fn subscribe(&self) -> watch::Receiver<AttendanceAttempt> {
        self.state.subscribe()
    }

    /// Start a new attempt. Returns `None` while another attempt is loading.
    ///
    /// Valid from `idle`, `succeeded` and `failed`; clears any previous error
    /// and result.
    pub fn begin(&self) -> Option<AttemptTicket> {
        let mut ticket = None;
        self.state.send_if_modified(|s| {
            if s.status == AttemptStatus::Loading {
                return false;
            }
            s.generation += 1;
            s.status = AttemptStatus::Loading;
            s.error = None;
            s.result = None;
            ticket = Some(s.generation);
            true
        });
        let generation = ticket?;
        tracing::debug!(attempt = generation, "attempt started");
        Some(AttemptTicket {
            generation,
            state: Arc::clone(&self.state),
        })
    }

    pub fn succeed(
        &self,
        ticket: AttemptTicket,
        record: CheckinRecord,
    ) -> Result<(), StaleAttemptDiscarded> {
        self.commit(ticket, |s| {
            s.status = AttemptStatus::Succeeded;
            s.error = None;
            s.result = Some(record);
        })
    }

    pub fn fail(
        &self,
        ticket: AttemptTicket,
        message: impl Into<String>,
    ) -> Result<(), StaleAttemptDiscarded> {
        let message = message.into();
        self.commit(ticket, |s| {
            s.status = AttemptStatus::Failed;
            s.error = Some(message);
            s.result = None;
        })
    }

    /// Back to `idle`, dropping banners. Any in-flight attempt becomes stale.
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            s.generation += 1;
            s.status = AttemptStatus::Idle;
            s.error = None;
            s.result = None;
        });
    }

    /// Dismiss the error message without leaving the current status.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Wait until no attempt is loading and return that state.
    pub async fn wait_settled(&self) -> AttendanceAttempt {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|s| !s.is_loading()).await.map(|s| s.clone());
        // The sender lives in `self`, so the channel cannot close here.
        settled.unwrap_or_else(|_| self.snapshot())
    }

    fn commit(
        &self,
        ticket: AttemptTicket,
        apply: impl FnOnce(&mut AttendanceAttempt),
    ) -> Result<(), StaleAttemptDiscarded> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|s| {
            if s.generation != ticket.generation || s.status != AttemptStatus::Loading {
                outcome = Err(StaleAttemptDiscarded {
                    ticket: ticket.generation,
                    current: s.generation,
                });
                return false;
            }
            apply(s);
            true
        });
        match &outcome {
            Ok(()) => {
                tracing::debug!(attempt = ticket.generation, "attempt resolved");
            }
            Err(stale) => tracing::warn!(
                attempt = stale.ticket,
                current = stale.current,
                "stale attempt resolution discarded"
            ),
        }
        outcome
    }
}
