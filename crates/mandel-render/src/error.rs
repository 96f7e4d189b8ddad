// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Display;

use thiserror::Error;

/// Failures the frame pipeline cannot recover from. A stale chain is not one
/// of them; see [`crate::Acquire::Stale`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("device lost")]
    DeviceLost,

    #[error("failed to create {what}: {reason}")]
    ResourceCreationFailed { what: &'static str, reason: String },

    #[error("backend call failed: {0}")]
    Backend(String),
}

impl FrameError {
    pub fn creation(what: &'static str, reason: impl Display) -> Self {
        FrameError::ResourceCreationFailed {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn backend(op: &str, reason: impl Display) -> Self {
        FrameError::Backend(format!("{op}: {reason}"))
    }
}

pub type FrameResult<T> = Result<T, FrameError>;
