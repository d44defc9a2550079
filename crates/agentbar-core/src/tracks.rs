//! Enable/disable state machine for the local microphone, camera and
//! screen-share tracks.
//!
//! Each kind moves `Disabled -> Enabling -> Enabled` and back, with `pending`
//! set while a request is in flight. Requests are stamped with a per-kind
//! generation; a settlement is committed only when its stamp is still the
//! latest, so a superseded request can never overwrite a newer one. The
//! external publish/unpublish calls for one kind are serialized through a
//! per-kind slot lock that also remembers what is actually published.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;

use crate::devices::DeviceRegistry;
use crate::errors::{ControlError, ErrorKind};
use crate::events::{ControlEvent, DeviceError, EventEmitter};
use crate::session::{MediaSession, TrackKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackControlState {
    pub enabled: bool,
    pub pending: bool,
    pub device_id: Option<String>,
    pub last_error: Option<ErrorKind>,
}

/// Committed snapshot of every publishable track.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackStates {
    pub microphone: TrackControlState,
    pub camera: TrackControlState,
    pub screen_share: TrackControlState,
}

impl TrackStates {
    pub fn get(&self, kind: TrackKind) -> &TrackControlState {
        match kind {
            TrackKind::Microphone => &self.microphone,
            TrackKind::Camera => &self.camera,
            TrackKind::ScreenShare => &self.screen_share,
        }
    }

    fn get_mut(&mut self, kind: TrackKind) -> &mut TrackControlState {
        match kind {
            TrackKind::Microphone => &mut self.microphone,
            TrackKind::Camera => &mut self.camera,
            TrackKind::ScreenShare => &mut self.screen_share,
        }
    }
}

#[derive(Default)]
struct Ledger {
    generation: HashMap<TrackKind, u64>,
    desired: HashMap<TrackKind, bool>,
    ended: bool,
}

impl Ledger {
    fn generation(&self, kind: TrackKind) -> u64 {
        self.generation.get(&kind).copied().unwrap_or(0)
    }

    fn bump(&mut self, kind: TrackKind) -> u64 {
        let generation = self.generation.entry(kind).or_default();
        *generation += 1;
        *generation
    }
}

/// What the session currently has published for one kind.
#[derive(Default)]
struct Slot {
    published: bool,
    device_id: Option<String>,
}

#[derive(Default)]
struct Slots {
    microphone: tokio::sync::Mutex<Slot>,
    camera: tokio::sync::Mutex<Slot>,
    screen_share: tokio::sync::Mutex<Slot>,
}

impl Slots {
    fn get(&self, kind: TrackKind) -> &tokio::sync::Mutex<Slot> {
        match kind {
            TrackKind::Microphone => &self.microphone,
            TrackKind::Camera => &self.camera,
            TrackKind::ScreenShare => &self.screen_share,
        }
    }
}

pub struct TrackController {
    session: Arc<dyn MediaSession>,
    devices: Arc<DeviceRegistry>,
    emitter: EventEmitter,
    states: watch::Sender<TrackStates>,
    ledger: Mutex<Ledger>,
    slots: Slots,
}

impl TrackController {
    pub fn new(session: Arc<dyn MediaSession>, devices: Arc<DeviceRegistry>, emitter: EventEmitter) -> Self {
        let (states, _) = watch::channel(TrackStates::default());
        Self {
            session,
            devices,
            emitter,
            states,
            ledger: Mutex::new(Ledger::default()),
            slots: Slots::default(),
        }
    }

    pub fn snapshot(&self) -> TrackStates {
        self.states.borrow().clone()
    }

    pub fn state(&self, kind: TrackKind) -> TrackControlState {
        self.states.borrow().get(kind).clone()
    }

    /// Receiver that observes every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TrackStates> {
        self.states.subscribe()
    }

    /// Request `kind` to be enabled or disabled.
    ///
    /// `pending` is committed on the first poll, before any external call.
    /// If a newer request for the same kind arrives before this one settles,
    /// this one's outcome is discarded and it resolves `Ok(())`. Publish
    /// failures are recorded in `last_error`, reported to device-error
    /// listeners, and returned; `enabled` then reflects what the session
    /// actually has published.
    pub async fn toggle(&self, kind: TrackKind, desired: bool) -> Result<(), ControlError> {
        let (stamp, desired) = self.begin(kind, Some(desired))?;
        self.run(kind, stamp, desired).await
    }

    /// Bring `kind` in line with the registry's active device.
    ///
    /// A disabled, idle track just records the new device. An enabled track
    /// is republished; `enabled` stays true throughout unless the republish
    /// fails.
    pub async fn apply_active_device(&self, kind: TrackKind) -> Result<(), ControlError> {
        let Some(device_kind) = kind.device_kind() else {
            return Ok(());
        };
        let device_id = self.devices.active_device(device_kind).map(|d| d.id);

        let (idle, recorded) = {
            let ledger = self.lock_ledger();
            if ledger.ended {
                return Err(ControlError::SessionEnded);
            }
            let wants_enabled = ledger.desired.get(&kind).copied().unwrap_or(false);
            let mut idle = false;
            let mut recorded = None;
            self.states.send_if_modified(|s| {
                let st = s.get_mut(kind);
                if st.enabled || st.pending || wants_enabled {
                    return false;
                }
                idle = true;
                if st.device_id == device_id {
                    return false;
                }
                st.device_id = device_id.clone();
                recorded = Some(st.clone());
                true
            });
            (idle, recorded)
        };

        if !idle {
            let (stamp, desired) = self.begin(kind, None)?;
            return self.run(kind, stamp, desired).await;
        }
        if let Some(state) = recorded {
            self.emitter.emit(ControlEvent::TrackStateChanged { kind, state });
        }
        Ok(())
    }

    /// Fail every in-flight request with `SessionEnded` and refuse new ones.
    pub fn cancel_all(&self) {
        let mut cancelled = Vec::new();
        {
            let mut ledger = self.lock_ledger();
            ledger.ended = true;
            for kind in TrackKind::ALL {
                let mut committed = None;
                self.states.send_if_modified(|s| {
                    let st = s.get_mut(kind);
                    if !st.pending {
                        return false;
                    }
                    st.pending = false;
                    st.last_error = Some(ErrorKind::SessionEnded);
                    committed = Some(st.clone());
                    true
                });
                if let Some(state) = committed {
                    ledger.bump(kind);
                    ledger.desired.insert(kind, state.enabled);
                    cancelled.push((kind, state));
                }
            }
        }

        for (kind, state) in cancelled {
            tracing::info!("{kind:?} request cancelled by session teardown");
            self.emitter.emit(ControlEvent::TrackStateChanged { kind, state });
            self.emitter.emit(ControlEvent::DeviceError(DeviceError {
                source: kind,
                error: ControlError::SessionEnded,
            }));
        }
    }

    pub fn is_ended(&self) -> bool {
        self.lock_ledger().ended
    }

    /// Stamp a new request and enter `pending`. `desired: None` re-applies
    /// the last requested state.
    fn begin(&self, kind: TrackKind, desired: Option<bool>) -> Result<(u64, bool), ControlError> {
        let mut entered = None;
        let (stamp, desired) = {
            let mut ledger = self.lock_ledger();
            if ledger.ended {
                return Err(ControlError::SessionEnded);
            }
            let desired = desired
                .or_else(|| ledger.desired.get(&kind).copied())
                .unwrap_or_else(|| self.states.borrow().get(kind).enabled);
            let stamp = ledger.bump(kind);
            ledger.desired.insert(kind, desired);

            self.states.send_if_modified(|s| {
                let st = s.get_mut(kind);
                if st.pending {
                    return false;
                }
                st.pending = true;
                entered = Some(st.clone());
                true
            });
            (stamp, desired)
        };

        if let Some(state) = entered {
            self.emitter.emit(ControlEvent::TrackStateChanged { kind, state });
        }
        tracing::debug!("{kind:?} request #{stamp}: enabled={desired}");
        Ok((stamp, desired))
    }

    async fn run(&self, kind: TrackKind, stamp: u64, desired: bool) -> Result<(), ControlError> {
        let mut slot = self.slots.get(kind).lock().await;

        // Requests queued behind a newer one never reach the session.
        if let Some(outcome) = self.stale_outcome(kind, stamp) {
            return outcome;
        }

        let device_id = match kind.device_kind() {
            Some(device_kind) if desired => self.devices.resolve_active(device_kind).await.map(|d| d.id),
            _ => None,
        };

        let result = if desired {
            if slot.published && slot.device_id == device_id {
                Ok(())
            } else {
                self.session.publish_track(kind, device_id.as_deref()).await
            }
        } else if slot.published {
            self.session.unpublish_track(kind).await
        } else {
            Ok(())
        };

        if result.is_ok() {
            slot.published = desired;
            slot.device_id = if desired { device_id.clone() } else { None };
        }

        self.settle(kind, stamp, desired, device_id, &slot, result)
    }

    fn stale_outcome(&self, kind: TrackKind, stamp: u64) -> Option<Result<(), ControlError>> {
        let ledger = self.lock_ledger();
        if ledger.generation(kind) == stamp {
            None
        } else if ledger.ended {
            Some(Err(ControlError::SessionEnded))
        } else {
            Some(Ok(()))
        }
    }

    fn settle(
        &self,
        kind: TrackKind,
        stamp: u64,
        desired: bool,
        device_id: Option<String>,
        slot: &Slot,
        result: Result<(), ControlError>,
    ) -> Result<(), ControlError> {
        let error = result.err().map(|e| match e {
            ControlError::Session(reason) => ControlError::PublishFailed(reason),
            other => other,
        });

        let state = {
            let mut ledger = self.lock_ledger();
            if ledger.generation(kind) != stamp {
                let ended = ledger.ended;
                drop(ledger);
                if ended {
                    return Err(ControlError::SessionEnded);
                }
                tracing::debug!("{kind:?} request #{stamp} superseded, settlement discarded");
                return Ok(());
            }

            let mut committed = TrackControlState::default();
            self.states.send_modify(|s| {
                let st = s.get_mut(kind);
                st.pending = false;
                match &error {
                    None => {
                        st.enabled = desired;
                        st.last_error = None;
                        if device_id.is_some() {
                            st.device_id = device_id.clone();
                        }
                    }
                    // A failed call leaves whatever the session still publishes.
                    Some(e) => {
                        st.enabled = slot.published;
                        if slot.published {
                            st.device_id = slot.device_id.clone();
                        }
                        st.last_error = Some(e.kind());
                    }
                }
                committed = st.clone();
            });
            ledger.desired.insert(kind, committed.enabled);
            committed
        };

        self.emitter.emit(ControlEvent::TrackStateChanged { kind, state });

        match error {
            None => {
                tracing::info!("{kind:?} enabled: {desired}");
                Ok(())
            }
            Some(error) => {
                tracing::warn!("{kind:?} toggle to {desired} failed: {error}");
                self.emitter.emit(ControlEvent::DeviceError(DeviceError {
                    source: kind,
                    error: error.clone(),
                }));
                Err(error)
            }
        }
    }

    fn lock_ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}
