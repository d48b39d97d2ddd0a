//! Batch lifecycle phases.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Where a pair's aggregator is in its cycle.
///
/// ```text
/// Idle → Collecting → Quoting → Filtering → Settling ⇄ Retrying → Distributing → Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BatchPhase {
    /// No orders waiting, no tick in flight.
    #[default]
    Idle,
    /// Orders are waiting for the next tick.
    Collecting,
    Quoting,
    Filtering,
    Settling,
    /// A settlement attempt failed and another is pending.
    Retrying,
    Distributing,
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Collecting => write!(f, "COLLECTING"),
            Self::Quoting => write!(f, "QUOTING"),
            Self::Filtering => write!(f, "FILTERING"),
            Self::Settling => write!(f, "SETTLING"),
            Self::Retrying => write!(f, "RETRYING"),
            Self::Distributing => write!(f, "DISTRIBUTING"),
        }
    }
}

/// Shared, observable phase of one aggregator.
#[derive(Debug, Default)]
pub(crate) struct PhaseCell(Mutex<BatchPhase>);

impl PhaseCell {
    pub(crate) fn get(&self) -> BatchPhase {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, phase: BatchPhase) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// `Idle → Collecting` on submission; any other phase is left alone.
    pub(crate) fn mark_collecting(&self) {
        let mut phase = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == BatchPhase::Idle {
            *phase = BatchPhase::Collecting;
        }
    }
}
