use serde::Serialize;
use thiserror::Error;

use crate::permissions::Capability;
use crate::session::DeviceKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("device not found: {kind} {device_id}")]
    DeviceNotFound { kind: DeviceKind, device_id: String },
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("no agent participant in the session")]
    NoAgent,
    #[error("message is empty")]
    EmptyMessage,
    #[error("session ended")]
    SessionEnded,
    #[error("control not permitted: {0:?}")]
    NotPermitted(Capability),
    #[error("session error: {0}")]
    Session(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Discriminant recorded in `TrackControlState::last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceNotFound,
    PublishFailed,
    NoAgent,
    EmptyMessage,
    SessionEnded,
    NotPermitted,
    Session,
    Config,
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Self::PublishFailed(_) => ErrorKind::PublishFailed,
            Self::NoAgent => ErrorKind::NoAgent,
            Self::EmptyMessage => ErrorKind::EmptyMessage,
            Self::SessionEnded => ErrorKind::SessionEnded,
            Self::NotPermitted(_) => ErrorKind::NotPermitted,
            Self::Session(_) => ErrorKind::Session,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}
