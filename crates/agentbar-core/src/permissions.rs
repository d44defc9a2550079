use serde::{Deserialize, Serialize};

use crate::session::{MediaSession, PublishPermissions, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Microphone,
    Camera,
    ScreenShare,
    Chat,
}

impl From<TrackKind> for Capability {
    fn from(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Microphone => Capability::Microphone,
            TrackKind::Camera => Capability::Camera,
            TrackKind::ScreenShare => Capability::ScreenShare,
        }
    }
}

/// Caller intent per control. `None` defers to the platform grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedControls {
    pub leave: Option<bool>,
    pub microphone: Option<bool>,
    pub camera: Option<bool>,
    pub screen_share: Option<bool>,
    pub chat: Option<bool>,
}

impl RequestedControls {
    pub fn get(&self, cap: Capability) -> Option<bool> {
        match cap {
            Capability::Microphone => self.microphone,
            Capability::Camera => self.camera,
            Capability::ScreenShare => self.screen_share,
            Capability::Chat => self.chat,
        }
    }
}

/// Resolution of one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityState {
    pub authorized: bool,
    pub requested: Option<bool>,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisibleControls {
    pub leave: bool,
    pub microphone: bool,
    pub camera: bool,
    pub screen_share: bool,
    pub chat: bool,
}

impl VisibleControls {
    pub fn get(&self, cap: Capability) -> bool {
        match cap {
            Capability::Microphone => self.microphone,
            Capability::Camera => self.camera,
            Capability::ScreenShare => self.screen_share,
            Capability::Chat => self.chat,
        }
    }
}

/// Whether the platform lets the local participant publish `cap`.
///
/// A track source is publishable when publishing is allowed at all and the
/// source allow-list is either empty or names it. Chat rides on data.
pub fn granted_by_platform(permissions: Option<&PublishPermissions>, cap: Capability) -> bool {
    let Some(p) = permissions else {
        return false;
    };
    let source = match cap {
        Capability::Chat => return p.can_publish_data,
        Capability::Microphone => TrackKind::Microphone,
        Capability::Camera => TrackKind::Camera,
        Capability::ScreenShare => TrackKind::ScreenShare,
    };
    p.can_publish && (p.can_publish_sources.is_empty() || p.can_publish_sources.contains(&source))
}

pub fn resolve_capability(
    authorized: bool,
    requested: Option<bool>,
    allow_override_denied: bool,
) -> CapabilityState {
    let visible = match requested {
        Some(true) => authorized || allow_override_denied,
        Some(false) => false,
        None => authorized,
    };
    CapabilityState {
        authorized,
        requested,
        visible,
    }
}

/// Compute which controls to expose for the current session snapshot.
///
/// Pure: reads the local participant's permissions and nothing else.
pub fn compute_visible_capabilities(
    session: &dyn MediaSession,
    requested: &RequestedControls,
    allow_override_denied: bool,
) -> VisibleControls {
    let local = session.local_participant();
    visible_for(local.permissions.as_ref(), requested, allow_override_denied)
}

pub fn visible_for(
    permissions: Option<&PublishPermissions>,
    requested: &RequestedControls,
    allow_override_denied: bool,
) -> VisibleControls {
    let resolve = |cap| {
        resolve_capability(
            granted_by_platform(permissions, cap),
            requested.get(cap),
            allow_override_denied,
        )
        .visible
    };
    VisibleControls {
        leave: requested.leave.unwrap_or(true),
        microphone: resolve(Capability::Microphone),
        camera: resolve(Capability::Camera),
        screen_share: resolve(Capability::ScreenShare),
        chat: resolve(Capability::Chat),
    }
}
