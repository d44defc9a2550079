//! Contracts consumed from the surrounding application.
//!
//! The core never owns the media connection. It talks to it through
//! [`MediaSession`] and learns about capture hardware through
//! [`DeviceProvider`]; both are held as non-owning `Arc<dyn ..>` handles.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::errors::ControlError;

/// Publishable local track kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Microphone,
    Camera,
    ScreenShare,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Microphone, TrackKind::Camera, TrackKind::ScreenShare];

    /// Capture device kind backing this track, if it has one.
    ///
    /// Screen share has no selectable device.
    pub fn device_kind(self) -> Option<DeviceKind> {
        match self {
            TrackKind::Microphone => Some(DeviceKind::AudioInput),
            TrackKind::Camera => Some(DeviceKind::VideoInput),
            TrackKind::ScreenShare => None,
        }
    }

    /// Track that captures from the given device kind.
    pub fn for_device(kind: DeviceKind) -> TrackKind {
        match kind {
            DeviceKind::AudioInput => TrackKind::Microphone,
            DeviceKind::VideoInput => TrackKind::Camera,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::AudioInput => f.write_str("audioinput"),
            DeviceKind::VideoInput => f.write_str("videoinput"),
        }
    }
}

/// A capture device as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
    pub label: String,
}

/// Publish grants of the local participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishPermissions {
    pub can_publish: bool,
    pub can_publish_data: bool,
    /// Empty means every source is allowed when `can_publish` is set.
    pub can_publish_sources: Vec<TrackKind>,
}

#[derive(Debug, Clone, Default)]
pub struct LocalParticipant {
    pub identity: String,
    /// `None` until the platform has delivered a permission set.
    pub permissions: Option<PublishPermissions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantKind {
    Standard,
    Agent,
    Ingress,
    Egress,
    Sip,
}

#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub identity: String,
    pub name: Option<String>,
    pub kind: ParticipantKind,
}

impl RemoteParticipant {
    pub fn is_agent(&self) -> bool {
        self.kind == ParticipantKind::Agent
    }
}

/// The real-time media session owned by the application.
///
/// Every mutating call is one atomic external operation. The core never
/// issues two mutating calls for the same track kind concurrently.
#[async_trait]
pub trait MediaSession: Send + Sync {
    fn is_active(&self) -> bool;

    fn local_participant(&self) -> LocalParticipant;

    fn remote_participants(&self) -> Vec<RemoteParticipant>;

    /// Publish a track of `kind` captured from `device_id` (platform default
    /// when `None`). Publishing a kind that is already published replaces the
    /// existing track.
    async fn publish_track(&self, kind: TrackKind, device_id: Option<&str>) -> Result<(), ControlError>;

    async fn unpublish_track(&self, kind: TrackKind) -> Result<(), ControlError>;

    /// Resolves once the chat channel accepted the message for submission.
    async fn send_chat_message(&self, text: &str) -> Result<(), ControlError>;

    async fn disconnect(&self) -> Result<(), ControlError>;
}

/// Enumerates capture hardware.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn enumerate(&self, kind: DeviceKind) -> Result<Vec<Device>, ControlError>;

    /// Hot-plug notifications. Returns the receiver on the first call only;
    /// providers without OS notifications return `None`.
    fn device_changes(&self) -> Option<UnboundedReceiver<DeviceKind>> {
        None
    }
}
