//! [`DeviceProvider`] over the host audio API.
//!
//! cpal has no camera support and no hot-plug notifications, so video
//! enumeration is empty and changes must be signalled by the host through
//! [`ControlSurface::handle_device_change`](crate::ControlSurface::handle_device_change).

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::errors::ControlError;
use crate::session::{Device, DeviceKind, DeviceProvider};

#[derive(Default)]
pub struct CpalDeviceProvider;

impl CpalDeviceProvider {
    pub fn new() -> Self {
        Self
    }

    /// Audio inputs with the host default first.
    fn audio_inputs() -> Result<Vec<Device>, ControlError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut devices: Vec<Device> = host
            .input_devices()
            .map_err(|e| ControlError::Session(format!("input devices: {e}")))?
            .filter_map(|d| d.name().ok())
            .map(|name| Device {
                id: name.clone(),
                kind: DeviceKind::AudioInput,
                label: name,
            })
            .collect();

        if let Some(default_name) = default_name {
            if let Some(pos) = devices.iter().position(|d| d.id == default_name) {
                let default = devices.remove(pos);
                devices.insert(0, default);
            }
        }
        Ok(devices)
    }
}

#[async_trait]
impl DeviceProvider for CpalDeviceProvider {
    async fn enumerate(&self, kind: DeviceKind) -> Result<Vec<Device>, ControlError> {
        match kind {
            DeviceKind::AudioInput => tokio::task::spawn_blocking(Self::audio_inputs)
                .await
                .map_err(|e| ControlError::Session(format!("enumeration task: {e}")))?,
            DeviceKind::VideoInput => Ok(Vec::new()),
        }
    }
}
