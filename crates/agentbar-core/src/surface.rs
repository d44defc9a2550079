use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chat::{ChatGate, ChatMessage};
use crate::config::ControlConfig;
use crate::devices::DeviceRegistry;
use crate::errors::ControlError;
use crate::events::{ControlEvent, ControlEventListener, DeviceError, EventEmitter};
use crate::permissions::{Capability, VisibleControls, compute_visible_capabilities};
use crate::preferences::PreferenceStore;
use crate::session::{Device, DeviceKind, DeviceProvider, MediaSession, TrackKind};
use crate::tracks::{TrackController, TrackStates};

/// Read model handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSnapshot {
    pub visible_controls: VisibleControls,
    pub track_states: TrackStates,
    pub session_active: bool,
    pub agent_available: bool,
    pub can_send_chat: bool,
    pub chat_open: bool,
}

/// Input controls of one agent session.
///
/// Composes permission gating, device selection, track toggling and chat
/// into the single object the UI binds to.
pub struct ControlSurface {
    session: Arc<dyn MediaSession>,
    config: ControlConfig,
    emitter: EventEmitter,
    devices: Arc<DeviceRegistry>,
    tracks: TrackController,
    chat: ChatGate,
    last_visible: Mutex<VisibleControls>,
    chat_open: AtomicBool,
    ended: tokio::sync::Mutex<bool>,
}

impl ControlSurface {
    pub fn new(session: Arc<dyn MediaSession>, provider: Arc<dyn DeviceProvider>, config: ControlConfig) -> Self {
        let preferences = match (&config.data_dir, config.save_user_choices) {
            (Some(dir), true) => Some(Arc::new(PreferenceStore::new(dir))),
            _ => None,
        };
        let emitter = EventEmitter::new();
        let devices = Arc::new(DeviceRegistry::new(provider, preferences));
        let tracks = TrackController::new(session.clone(), devices.clone(), emitter.clone());
        let chat = ChatGate::new(session.clone(), emitter.clone());
        let visible = compute_visible_capabilities(
            session.as_ref(),
            &config.requested_controls,
            config.allow_override_denied_permission,
        );

        Self {
            session,
            config,
            emitter,
            devices,
            tracks,
            chat,
            last_visible: Mutex::new(visible),
            chat_open: AtomicBool::new(false),
            ended: tokio::sync::Mutex::new(false),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ControlEventListener>) {
        self.emitter.add_listener(listener);
    }

    /// Register the device-error callback; fires once per failed attempt.
    pub fn on_device_error<F>(&self, callback: F)
    where
        F: Fn(DeviceError) + Send + Sync + 'static,
    {
        self.emitter.on_device_error(callback);
    }

    /// Recomputed from the current session on every call.
    pub fn visible_controls(&self) -> VisibleControls {
        compute_visible_capabilities(
            self.session.as_ref(),
            &self.config.requested_controls,
            self.config.allow_override_denied_permission,
        )
    }

    pub fn track_states(&self) -> TrackStates {
        self.tracks.snapshot()
    }

    pub fn subscribe_tracks(&self) -> watch::Receiver<TrackStates> {
        self.tracks.subscribe()
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        let agent_available = self.chat.is_agent_available();
        let session_active = self.session.is_active();
        ControlSnapshot {
            visible_controls: self.visible_controls(),
            track_states: self.tracks.snapshot(),
            session_active,
            agent_available,
            can_send_chat: session_active && agent_available,
            chat_open: self.chat_open.load(Ordering::SeqCst),
        }
    }

    /// Re-evaluate visibility after a permission update from the platform.
    pub fn handle_permissions_changed(&self) -> VisibleControls {
        let visible = self.visible_controls();
        let changed = {
            let mut last = self.last_visible.lock().unwrap_or_else(|e| e.into_inner());
            let changed = *last != visible;
            *last = visible;
            changed
        };
        if changed {
            tracing::info!("visible controls changed: {visible:?}");
            self.emitter.emit(ControlEvent::VisibleControlsChanged(visible));
        }
        visible
    }

    /// Enabling requires the control to be visible; disabling never does,
    /// so a track stays switchable off after its permission is revoked.
    pub async fn toggle(&self, kind: TrackKind, desired: bool) -> Result<(), ControlError> {
        let cap = Capability::from(kind);
        if desired && !self.visible_controls().get(cap) {
            return Err(ControlError::NotPermitted(cap));
        }
        self.tracks.toggle(kind, desired).await
    }

    pub async fn list_devices(&self, kind: DeviceKind) -> Result<Vec<Device>, ControlError> {
        self.devices.list_devices(kind).await
    }

    pub fn active_device(&self, kind: DeviceKind) -> Option<Device> {
        self.devices.active_device(kind)
    }

    /// Select a capture device; an enabled track moves to it.
    ///
    /// A failed republish is reported through the device-error callback and
    /// `last_error`, not here.
    pub async fn select_device(&self, kind: DeviceKind, device_id: &str) -> Result<Device, ControlError> {
        let device = self.devices.select_device(kind, device_id)?;
        let track = TrackKind::for_device(kind);
        self.emitter.emit(ControlEvent::ActiveDeviceChanged {
            kind: track,
            device: Some(device.clone()),
        });
        if let Err(e) = self.tracks.apply_active_device(track).await {
            tracing::debug!("{track:?} did not move to {}: {e}", device.id);
        }
        Ok(device)
    }

    /// React to a hot-plug notification for `kind`.
    pub async fn handle_device_change(&self, kind: DeviceKind) -> Result<(), ControlError> {
        let before = self.devices.active_device(kind);
        self.devices.refresh(kind).await?;
        let after = self.devices.active_device(kind);
        if before == after {
            return Ok(());
        }

        let track = TrackKind::for_device(kind);
        tracing::info!(
            "active {kind} device changed: {:?} -> {:?}",
            before.as_ref().map(|d| &d.id),
            after.as_ref().map(|d| &d.id)
        );
        self.emitter.emit(ControlEvent::ActiveDeviceChanged {
            kind: track,
            device: after,
        });
        match self.tracks.apply_active_device(track).await {
            Err(ControlError::PublishFailed(_)) | Ok(()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drive `handle_device_change` from a provider notification stream.
    pub fn spawn_device_watcher(self: &Arc<Self>, mut changes: UnboundedReceiver<DeviceKind>) -> JoinHandle<()> {
        let surface = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(kind) = changes.recv().await {
                if let Err(e) = surface.handle_device_change(kind).await {
                    tracing::warn!("{kind} device change not applied: {e}");
                }
            }
            tracing::debug!("device watcher ended");
        })
    }

    pub async fn send_message(&self, text: &str) -> Result<ChatMessage, ControlError> {
        if !self.visible_controls().chat {
            return Err(ControlError::NotPermitted(Capability::Chat));
        }
        self.chat.send(text).await
    }

    /// Record chat text a remote participant sent on the session's chat
    /// channel. Ignored once the session has ended.
    pub async fn handle_incoming_message(&self, identity: &str, text: &str, sent_at: DateTime<Utc>) {
        if *self.ended.lock().await {
            tracing::debug!("chat from {identity} after session end dropped");
            return;
        }
        self.chat.record_incoming(identity, text, sent_at).await;
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.chat.messages().await
    }

    pub fn chat(&self) -> &ChatGate {
        &self.chat
    }

    pub fn set_chat_open(&self, open: bool) {
        if self.chat_open.swap(open, Ordering::SeqCst) != open {
            self.emitter.emit(ControlEvent::ChatOpenChanged(open));
        }
    }

    /// Disconnect the session and fail whatever is still in flight.
    ///
    /// A no-op when the session is not active or was already ended here.
    pub async fn end_session(&self) -> Result<(), ControlError> {
        let mut ended = self.ended.lock().await;
        if *ended || !self.session.is_active() {
            tracing::debug!("end_session: nothing to end");
            return Ok(());
        }

        let result = self.session.disconnect().await;
        if let Err(e) = &result {
            tracing::warn!("error disconnecting session: {e}");
        }
        *ended = true;

        self.tracks.cancel_all();
        self.chat.clear().await;
        self.emitter.emit(ControlEvent::SessionEnded);
        tracing::info!("session ended");
        result
    }
}
