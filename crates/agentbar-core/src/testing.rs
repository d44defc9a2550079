//! Scriptable collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::errors::ControlError;
use crate::events::{ControlEvent, ControlEventListener};
use crate::session::{
    Device, DeviceKind, DeviceProvider, LocalParticipant, MediaSession, ParticipantKind,
    PublishPermissions, RemoteParticipant, TrackKind,
};

pub fn device(id: &str, kind: DeviceKind) -> Device {
    Device {
        id: id.to_string(),
        kind,
        label: format!("{id} label"),
    }
}

pub fn full_permissions() -> PublishPermissions {
    PublishPermissions {
        can_publish: true,
        can_publish_data: true,
        can_publish_sources: vec![],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Publish(TrackKind, Option<String>),
    Unpublish(TrackKind),
    Chat(String),
    Disconnect,
}

type Outcome = Result<(), String>;

pub struct FakeSession {
    active: AtomicBool,
    local: Mutex<LocalParticipant>,
    remotes: Mutex<Vec<RemoteParticipant>>,
    calls: Mutex<Vec<Call>>,
    held: Mutex<HashMap<TrackKind, VecDeque<oneshot::Receiver<Outcome>>>>,
    failures: Mutex<HashMap<TrackKind, String>>,
    disconnects: AtomicUsize,
}

impl FakeSession {
    /// Active session, every capability granted, no remote participants.
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            local: Mutex::new(LocalParticipant {
                identity: "local".to_string(),
                permissions: Some(full_permissions()),
            }),
            remotes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            held: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn set_permissions(&self, permissions: Option<PublishPermissions>) {
        self.local.lock().unwrap().permissions = permissions;
    }

    pub fn add_remote(&self, identity: &str, kind: ParticipantKind) {
        self.remotes.lock().unwrap().push(RemoteParticipant {
            identity: identity.to_string(),
            name: None,
            kind,
        });
    }

    /// The next mutating call for `kind` waits until the sender resolves it.
    /// Dropping the sender resolves it successfully.
    pub fn hold(&self, kind: TrackKind) -> oneshot::Sender<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().unwrap().entry(kind).or_default().push_back(rx);
        tx
    }

    pub fn fail_next(&self, kind: TrackKind, reason: &str) {
        self.failures.lock().unwrap().insert(kind, reason.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    async fn mutate(&self, kind: TrackKind, call: Call) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push(call);
        let held = self.held.lock().unwrap().get_mut(&kind).and_then(|q| q.pop_front());
        if let Some(rx) = held {
            if let Ok(Err(reason)) = rx.await {
                return Err(ControlError::Session(reason));
            }
            return Ok(());
        }
        match self.failures.lock().unwrap().remove(&kind) {
            Some(reason) => Err(ControlError::Session(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MediaSession for FakeSession {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn local_participant(&self) -> LocalParticipant {
        self.local.lock().unwrap().clone()
    }

    fn remote_participants(&self) -> Vec<RemoteParticipant> {
        self.remotes.lock().unwrap().clone()
    }

    async fn publish_track(&self, kind: TrackKind, device_id: Option<&str>) -> Result<(), ControlError> {
        self.mutate(kind, Call::Publish(kind, device_id.map(str::to_string)))
            .await
    }

    async fn unpublish_track(&self, kind: TrackKind) -> Result<(), ControlError> {
        self.mutate(kind, Call::Unpublish(kind)).await
    }

    async fn send_chat_message(&self, text: &str) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push(Call::Chat(text.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push(Call::Disconnect);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeDevices {
    devices: Mutex<HashMap<DeviceKind, Vec<Device>>>,
    enumerations: AtomicUsize,
    fail: AtomicBool,
    notifier: UnboundedSender<DeviceKind>,
    changes: Mutex<Option<UnboundedReceiver<DeviceKind>>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        let (notifier, changes) = mpsc::unbounded_channel();
        Self {
            devices: Mutex::new(HashMap::new()),
            enumerations: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            notifier,
            changes: Mutex::new(Some(changes)),
        }
    }

    pub fn set(&self, kind: DeviceKind, devices: Vec<Device>) {
        self.devices.lock().unwrap().insert(kind, devices);
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn notify(&self, kind: DeviceKind) {
        let _ = self.notifier.send(kind);
    }
}

#[async_trait]
impl DeviceProvider for FakeDevices {
    async fn enumerate(&self, kind: DeviceKind) -> Result<Vec<Device>, ControlError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(ControlError::Session("enumeration denied".into()));
        }
        Ok(self.devices.lock().unwrap().get(&kind).cloned().unwrap_or_default())
    }

    fn device_changes(&self) -> Option<UnboundedReceiver<DeviceKind>> {
        self.changes.lock().unwrap().take()
    }
}

/// Records every event it sees.
#[derive(Default)]
pub struct EventCapture {
    events: Mutex<Vec<ControlEvent>>,
}

impl EventCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ControlEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ControlEventListener for EventCapture {
    fn on_event(&self, event: ControlEvent) {
        self.events.lock().unwrap().push(event);
    }
}
