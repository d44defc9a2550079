use std::sync::{Arc, RwLock};

use crate::chat::ChatMessage;
use crate::errors::ControlError;
use crate::permissions::VisibleControls;
use crate::session::{Device, TrackKind};
use crate::tracks::TrackControlState;

/// Events emitted by the core to the presentation layer.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    TrackStateChanged { kind: TrackKind, state: TrackControlState },
    DeviceError(DeviceError),
    VisibleControlsChanged(VisibleControls),
    ActiveDeviceChanged { kind: TrackKind, device: Option<Device> },
    ChatMessageSent(ChatMessage),
    ChatMessageReceived(ChatMessage),
    ChatOpenChanged(bool),
    SessionEnded,
}

/// Payload of the device-error callback: one per failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceError {
    pub source: TrackKind,
    pub error: ControlError,
}

/// Implementations must be Send + Sync (called from tokio tasks).
pub trait ControlEventListener: Send + Sync {
    fn on_event(&self, event: ControlEvent);
}

struct DeviceErrorCallback<F>(F);

impl<F> ControlEventListener for DeviceErrorCallback<F>
where
    F: Fn(DeviceError) + Send + Sync,
{
    fn on_event(&self, event: ControlEvent) {
        if let ControlEvent::DeviceError(err) = event {
            (self.0)(err);
        }
    }
}

/// Dispatches events synchronously to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn ControlEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ControlEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Register a closure that only sees device errors.
    pub fn on_device_error<F>(&self, callback: F)
    where
        F: Fn(DeviceError) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(DeviceErrorCallback(callback)));
    }

    pub fn emit(&self, event: ControlEvent) {
        // Clone the list so a listener may register another without deadlocking.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    impl ControlEventListener for CountingListener {
        fn on_event(&self, _event: ControlEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn emitter_dispatches_to_multiple_listeners() {
        let emitter = EventEmitter::new();
        let count1 = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::new(AtomicUsize::new(0));

        emitter.add_listener(Arc::new(CountingListener { count: count1.clone() }));
        emitter.add_listener(Arc::new(CountingListener { count: count2.clone() }));

        emitter.emit(ControlEvent::SessionEnded);

        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_error_callback_filters_other_events() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        emitter.on_device_error(move |e| sink.lock().unwrap().push(e));

        emitter.emit(ControlEvent::ChatOpenChanged(true));
        emitter.emit(ControlEvent::DeviceError(DeviceError {
            source: TrackKind::Camera,
            error: ControlError::PublishFailed("denied".into()),
        }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, TrackKind::Camera);
    }
}
