use serde::Serialize;
use tokio::task::JoinHandle;

use crate::host::{ElementId, ListenerId, ObserverId};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InjectionPhase {
    Idle,
    Fetching,
    Created,
    Exhausted,
}

impl Default for InjectionPhase {
    fn default() -> Self {
        InjectionPhase::Idle
    }
}

impl InjectionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, InjectionPhase::Created | InjectionPhase::Exhausted)
    }
}

/// Where a retry signal came from. All sources funnel into the same guarded
/// entry point; the trigger only feeds diagnostics.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    Initial,
    DomContentLoaded,
    WindowLoad,
    Fallback,
    Backoff,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptGate {
    /// Eligible; carries the attempt number just consumed.
    Proceed(u32),
    /// A configuration fetch for this placement is still in flight.
    Busy,
    /// This call found the budget spent and moved to `Exhausted`.
    Exhausted,
    /// Already `Created` or `Exhausted`.
    Terminal,
}

/// Resources owned by a placement, detached together on teardown.
#[derive(Default)]
pub struct OwnedResources {
    pub timers: Vec<JoinHandle<()>>,
    pub debounce: Option<JoinHandle<()>>,
    pub observer: Option<ObserverId>,
    pub listeners: Vec<ListenerId>,
}

/// Mutable coordination state for one placement. Only the coordinator
/// mutates it; `created` never goes back to false.
#[derive(Default)]
pub struct InjectionState {
    pub phase: InjectionPhase,
    pub created: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub control: Option<ElementId>,
    pub(crate) resources: OwnedResources,
}

impl InjectionState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The guard every trigger passes through. Busy is checked before the
    /// budget so a trigger arriving during the last fetch cannot tear it down.
    pub fn begin_attempt(&mut self) -> AttemptGate {
        if self.created || self.is_terminal() {
            return AttemptGate::Terminal;
        }
        if self.phase == InjectionPhase::Fetching {
            return AttemptGate::Busy;
        }
        if self.attempts >= self.max_attempts {
            self.phase = InjectionPhase::Exhausted;
            return AttemptGate::Exhausted;
        }
        self.attempts += 1;
        self.phase = InjectionPhase::Fetching;
        AttemptGate::Proceed(self.attempts)
    }

    /// Ends an attempt that produced no control. Returns true when that was
    /// the last attempt the budget allows.
    pub fn fail_attempt(&mut self) -> bool {
        if self.is_terminal() {
            return true;
        }
        if self.attempts >= self.max_attempts {
            self.phase = InjectionPhase::Exhausted;
            true
        } else {
            self.phase = InjectionPhase::Idle;
            false
        }
    }

    pub fn mark_created(&mut self, control: ElementId) {
        self.created = true;
        self.control = Some(control);
        self.phase = InjectionPhase::Created;
    }

    pub(crate) fn take_resources(&mut self) -> OwnedResources {
        std::mem::take(&mut self.resources)
    }
}
