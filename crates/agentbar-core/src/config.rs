use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::ControlError;
use crate::permissions::RequestedControls;

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ControlConfig {
    /// Persist the last explicitly selected device per kind.
    #[serde(default = "default_true")]
    pub save_user_choices: bool,
    #[serde(default)]
    pub requested_controls: RequestedControls,
    /// Let `requested_controls` show a control the platform did not grant.
    /// The platform still enforces the grant when publishing.
    #[serde(default)]
    pub allow_override_denied_permission: bool,
    /// Where device preferences are stored. Nothing is persisted when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            save_user_choices: true,
            requested_controls: RequestedControls::default(),
            allow_override_denied_permission: false,
            data_dir: None,
        }
    }
}

impl ControlConfig {
    pub fn from_json(json: &str) -> Result<Self, ControlError> {
        serde_json::from_str(json).map_err(|e| ControlError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&contents)
    }
}

/// Feature switches of the hosting application.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub supports_chat_input: bool,
    #[serde(default)]
    pub supports_video_input: bool,
}

impl From<AppConfig> for RequestedControls {
    fn from(app: AppConfig) -> Self {
        RequestedControls {
            leave: Some(true),
            microphone: Some(true),
            camera: Some(app.supports_video_input),
            screen_share: Some(app.supports_video_input),
            chat: Some(app.supports_chat_input),
        }
    }
}
