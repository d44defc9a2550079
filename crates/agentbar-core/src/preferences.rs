use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::session::DeviceKind;

const FILE_NAME: &str = "device_preferences.json";

/// Last explicitly chosen device per capture kind.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DevicePreferences {
    #[serde(default)]
    pub audioinput: Option<String>,
    #[serde(default)]
    pub videoinput: Option<String>,
}

impl DevicePreferences {
    pub fn get(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::AudioInput => self.audioinput.as_deref(),
            DeviceKind::VideoInput => self.videoinput.as_deref(),
        }
    }

    fn set(&mut self, kind: DeviceKind, id: Option<String>) {
        match kind {
            DeviceKind::AudioInput => self.audioinput = id,
            DeviceKind::VideoInput => self.videoinput = id,
        }
    }
}

/// JSON-file backed device preference store.
pub struct PreferenceStore {
    prefs: Mutex<DevicePreferences>,
    file_path: PathBuf,
}

impl PreferenceStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join(FILE_NAME);
        let prefs = Self::load(&file_path);
        Self {
            prefs: Mutex::new(prefs),
            file_path,
        }
    }

    pub fn get(&self) -> DevicePreferences {
        self.lock().clone()
    }

    pub fn device(&self, kind: DeviceKind) -> Option<String> {
        self.lock().get(kind).map(str::to_string)
    }

    pub fn set_device(&self, kind: DeviceKind, id: Option<String>) {
        self.lock().set(kind, id);
        self.save();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DevicePreferences> {
        self.prefs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self) {
        let prefs = self.get();
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&prefs) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("failed to write device preferences: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to encode device preferences: {e}"),
        }
    }

    fn load(path: &Path) -> DevicePreferences {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring corrupt device preferences: {e}");
                DevicePreferences::default()
            }),
            Err(_) => DevicePreferences::default(),
        }
    }
}
