use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::ControlError;
use crate::preferences::PreferenceStore;
use crate::session::{Device, DeviceKind, DeviceProvider};

/// Identifier browsers and most platforms use for the system default device.
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Enumerates capture devices and tracks the selected one per kind.
///
/// Enumeration is lazy: the first `list_devices` for a kind queries the
/// provider, later calls reuse the result until `refresh`.
pub struct DeviceRegistry {
    provider: Arc<dyn DeviceProvider>,
    preferences: Option<Arc<PreferenceStore>>,
    enumerated: Mutex<HashMap<DeviceKind, Vec<Device>>>,
    selected: Mutex<HashMap<DeviceKind, String>>,
}

impl DeviceRegistry {
    /// `preferences` is only given when user choices should be saved; the
    /// stored choices then seed the initial selection.
    pub fn new(provider: Arc<dyn DeviceProvider>, preferences: Option<Arc<PreferenceStore>>) -> Self {
        let mut selected = HashMap::new();
        if let Some(store) = &preferences {
            for kind in [DeviceKind::AudioInput, DeviceKind::VideoInput] {
                if let Some(id) = store.device(kind) {
                    selected.insert(kind, id);
                }
            }
        }
        Self {
            provider,
            preferences,
            enumerated: Mutex::new(HashMap::new()),
            selected: Mutex::new(selected),
        }
    }

    pub async fn list_devices(&self, kind: DeviceKind) -> Result<Vec<Device>, ControlError> {
        if let Some(devices) = lock(&self.enumerated).get(&kind) {
            return Ok(devices.clone());
        }
        self.refresh(kind).await
    }

    /// Re-query the provider, replacing the cached enumeration.
    pub async fn refresh(&self, kind: DeviceKind) -> Result<Vec<Device>, ControlError> {
        let devices = self.provider.enumerate(kind).await?;
        tracing::debug!("enumerated {} {kind} device(s)", devices.len());
        lock(&self.enumerated).insert(kind, devices.clone());
        Ok(devices)
    }

    /// Select `device_id` from the latest enumeration.
    ///
    /// Selection does not touch the device itself; only enabling a track does.
    pub fn select_device(&self, kind: DeviceKind, device_id: &str) -> Result<Device, ControlError> {
        let device = lock(&self.enumerated)
            .get(&kind)
            .and_then(|devices| devices.iter().find(|d| d.id == device_id).cloned())
            .ok_or_else(|| ControlError::DeviceNotFound {
                kind,
                device_id: device_id.to_string(),
            })?;

        lock(&self.selected).insert(kind, device.id.clone());
        if let Some(store) = &self.preferences {
            store.set_device(kind, Some(device.id.clone()));
        }
        tracing::info!("selected {kind} device {}", device.id);
        Ok(device)
    }

    /// The device a track of this kind should capture from.
    ///
    /// Falls back to the platform default when the selected device is not in
    /// the current enumeration (e.g. it was unplugged).
    pub fn active_device(&self, kind: DeviceKind) -> Option<Device> {
        let enumerated = lock(&self.enumerated);
        let devices = enumerated.get(&kind)?;

        if let Some(id) = lock(&self.selected).get(&kind) {
            if let Some(device) = devices.iter().find(|d| &d.id == id) {
                return Some(device.clone());
            }
            tracing::warn!("selected {kind} device {id} is gone, using default");
        }
        default_device(devices).cloned()
    }

    /// Enumerate lazily, then resolve the active device.
    ///
    /// Enumeration failures degrade to the platform default (`None`).
    pub async fn resolve_active(&self, kind: DeviceKind) -> Option<Device> {
        if let Err(e) = self.list_devices(kind).await {
            tracing::warn!("{kind} enumeration failed: {e}");
            return None;
        }
        self.active_device(kind)
    }
}

fn default_device(devices: &[Device]) -> Option<&Device> {
    devices
        .iter()
        .find(|d| d.id == DEFAULT_DEVICE_ID)
        .or_else(|| devices.first())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevices, device};

    fn registry(devices: &Arc<FakeDevices>) -> DeviceRegistry {
        DeviceRegistry::new(devices.clone(), None)
    }

    #[tokio::test]
    async fn list_is_lazy_and_cached() {
        let devices = Arc::new(FakeDevices::new());
        devices.set(DeviceKind::AudioInput, vec![device("default", DeviceKind::AudioInput)]);
        let reg = registry(&devices);

        reg.list_devices(DeviceKind::AudioInput).await.unwrap();
        reg.list_devices(DeviceKind::AudioInput).await.unwrap();
        assert_eq!(devices.enumerations(), 1);

        reg.refresh(DeviceKind::AudioInput).await.unwrap();
        assert_eq!(devices.enumerations(), 2);
    }

    #[tokio::test]
    async fn select_unknown_device_fails() {
        let devices = Arc::new(FakeDevices::new());
        devices.set(
            DeviceKind::VideoInput,
            vec![device("cam-1", DeviceKind::VideoInput), device("cam-2", DeviceKind::VideoInput)],
        );
        let reg = registry(&devices);
        reg.list_devices(DeviceKind::VideoInput).await.unwrap();
        reg.select_device(DeviceKind::VideoInput, "cam-2").unwrap();

        let err = reg.select_device(DeviceKind::VideoInput, "nonexistent-id").unwrap_err();
        assert!(matches!(err, ControlError::DeviceNotFound { .. }));
        assert_eq!(reg.active_device(DeviceKind::VideoInput).unwrap().id, "cam-2");
    }

    #[tokio::test]
    async fn select_before_enumeration_fails() {
        let devices = Arc::new(FakeDevices::new());
        devices.set(DeviceKind::VideoInput, vec![device("cam-1", DeviceKind::VideoInput)]);
        let reg = registry(&devices);
        assert!(reg.select_device(DeviceKind::VideoInput, "cam-1").is_err());
    }

    #[tokio::test]
    async fn default_is_preferred_then_first() {
        let devices = Arc::new(FakeDevices::new());
        devices.set(
            DeviceKind::AudioInput,
            vec![device("usb", DeviceKind::AudioInput), device("default", DeviceKind::AudioInput)],
        );
        devices.set(
            DeviceKind::VideoInput,
            vec![device("cam-a", DeviceKind::VideoInput), device("cam-b", DeviceKind::VideoInput)],
        );
        let reg = registry(&devices);

        let mic = reg.resolve_active(DeviceKind::AudioInput).await.unwrap();
        assert_eq!(mic.id, "default");
        let cam = reg.resolve_active(DeviceKind::VideoInput).await.unwrap();
        assert_eq!(cam.id, "cam-a");
    }

    #[tokio::test]
    async fn unplugged_selection_falls_back_to_default() {
        let devices = Arc::new(FakeDevices::new());
        devices.set(
            DeviceKind::AudioInput,
            vec![device("default", DeviceKind::AudioInput), device("usb", DeviceKind::AudioInput)],
        );
        let reg = registry(&devices);
        reg.list_devices(DeviceKind::AudioInput).await.unwrap();
        reg.select_device(DeviceKind::AudioInput, "usb").unwrap();
        assert_eq!(reg.active_device(DeviceKind::AudioInput).unwrap().id, "usb");

        devices.set(DeviceKind::AudioInput, vec![device("default", DeviceKind::AudioInput)]);
        reg.refresh(DeviceKind::AudioInput).await.unwrap();
        assert_eq!(reg.active_device(DeviceKind::AudioInput).unwrap().id, "default");
        // the choice survives so a re-plugged device is picked up again
        devices.set(
            DeviceKind::AudioInput,
            vec![device("default", DeviceKind::AudioInput), device("usb", DeviceKind::AudioInput)],
        );
        reg.refresh(DeviceKind::AudioInput).await.unwrap();
        assert_eq!(reg.active_device(DeviceKind::AudioInput).unwrap().id, "usb");
    }

    #[tokio::test]
    async fn saved_choice_seeds_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PreferenceStore::new(dir.path()));
        let devices = Arc::new(FakeDevices::new());
        devices.set(
            DeviceKind::VideoInput,
            vec![device("cam-a", DeviceKind::VideoInput), device("cam-b", DeviceKind::VideoInput)],
        );

        {
            let reg = DeviceRegistry::new(devices.clone(), Some(store.clone()));
            reg.list_devices(DeviceKind::VideoInput).await.unwrap();
            reg.select_device(DeviceKind::VideoInput, "cam-b").unwrap();
        }

        let reloaded = Arc::new(PreferenceStore::new(dir.path()));
        let reg = DeviceRegistry::new(devices.clone(), Some(reloaded));
        let cam = reg.resolve_active(DeviceKind::VideoInput).await.unwrap();
        assert_eq!(cam.id, "cam-b");
    }

    #[tokio::test]
    async fn enumeration_failure_resolves_to_none() {
        let devices = Arc::new(FakeDevices::new());
        devices.fail_next();
        let reg = registry(&devices);
        assert!(reg.resolve_active(DeviceKind::AudioInput).await.is_none());
    }
}
