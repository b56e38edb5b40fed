//! Finalizer marker and the per-snapshot decision logic
//!
//! The controller keeps no memory between events: the marker on the resource
//! and its deletion timestamp are the whole state.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::resource::ResourceSnapshot;

/// Finalizer this controller owns unless configured otherwise
pub const DEFAULT_FINALIZER: &str = "example.com/namespace-finalizer";

/// A validated `<domain>/<name>` finalizer identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FinalizerMarker(String);

impl FinalizerMarker {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let valid = match value.split_once('/') {
            Some((domain, name)) => {
                domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !name.is_empty()
                    && !name.contains('/')
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'))
            }
            None => false,
        };

        if valid {
            Ok(Self(value))
        } else {
            Err(Error::InvalidFinalizer(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FinalizerMarker {
    fn default() -> Self {
        Self(DEFAULT_FINALIZER.to_string())
    }
}

impl FromStr for FinalizerMarker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for FinalizerMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a resource stands with respect to this controller's marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// Live resource without the marker
    NeedsMarker,
    /// Live resource guarded by the marker
    AwaitingDeletion,
    /// Deletion requested, cleanup not done yet
    NeedsCleanup,
    /// Deletion requested and the marker is gone; terminal
    Finalized,
}

/// What a worker has to do for a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerAction {
    None,
    AddMarker,
    CleanupAndRemoveMarker,
}

impl FinalizerState {
    pub fn evaluate(resource: &ResourceSnapshot, marker: &FinalizerMarker) -> Self {
        match (
            resource.deletion_requested(),
            resource.has_finalizer(marker.as_str()),
        ) {
            (false, false) => FinalizerState::NeedsMarker,
            (false, true) => FinalizerState::AwaitingDeletion,
            (true, true) => FinalizerState::NeedsCleanup,
            (true, false) => FinalizerState::Finalized,
        }
    }

    pub fn action(&self) -> FinalizerAction {
        match self {
            FinalizerState::NeedsMarker => FinalizerAction::AddMarker,
            FinalizerState::NeedsCleanup => FinalizerAction::CleanupAndRemoveMarker,
            FinalizerState::AwaitingDeletion | FinalizerState::Finalized => FinalizerAction::None,
        }
    }

    /// The orchestrator may physically delete the resource
    pub fn is_deletable(&self) -> bool {
        matches!(self, FinalizerState::Finalized)
    }
}
