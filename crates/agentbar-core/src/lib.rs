//! Input controls for a voice-agent front end.
//!
//! Device selection, track toggling with pending-state tracking, publish
//! permission gating and chat dispatch, layered over an external media
//! session. UI shells bind to [`ControlSurface`].

pub mod chat;
pub mod config;
pub mod devices;
pub mod errors;
pub mod events;
pub mod logging;
pub mod permissions;
pub mod preferences;
pub mod session;
pub mod surface;
pub mod tracks;

#[cfg(feature = "cpal")]
pub mod cpal_devices;
#[cfg(feature = "livekit")]
pub mod livekit_session;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, ControlConfig};
pub use errors::{ControlError, ErrorKind};
pub use events::{ControlEvent, ControlEventListener, DeviceError};
pub use session::{Device, DeviceKind, DeviceProvider, MediaSession, TrackKind};
pub use surface::{ControlSnapshot, ControlSurface};
pub use tracks::{TrackControlState, TrackStates};
