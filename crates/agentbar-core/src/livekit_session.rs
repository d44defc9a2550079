//! [`MediaSession`] backed by a connected LiveKit room.
//!
//! Tracks are published from native sources; the host's capture code feeds
//! frames into the sources exposed here, reading the requested capture
//! device from [`LiveKitSession::capture_device`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livekit::data_stream::{StreamReader, StreamTextOptions};
use livekit::options::TrackPublishOptions;
use livekit::participant::ParticipantKind as LkParticipantKind;
use livekit::prelude::*;
use livekit::track::TrackSource as LkTrackSource;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::*;
use livekit::webrtc::video_source::native::NativeVideoSource;
use livekit_api::access_token::VideoGrants;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::errors::ControlError;
use crate::session::{
    LocalParticipant as CoreLocalParticipant, MediaSession, ParticipantKind, PublishPermissions,
    RemoteParticipant as CoreRemoteParticipant, TrackKind,
};
use crate::surface::ControlSurface;

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;

/// The topic LiveKit agents listen on for typed chat.
const CHAT_TOPIC: &str = "lk.chat";

impl From<&VideoGrants> for PublishPermissions {
    fn from(grants: &VideoGrants) -> Self {
        let can_publish_sources = grants
            .can_publish_sources
            .iter()
            .filter_map(|s| match s.as_str() {
                "microphone" => Some(TrackKind::Microphone),
                "camera" => Some(TrackKind::Camera),
                "screen_share" => Some(TrackKind::ScreenShare),
                _ => None,
            })
            .collect();
        Self {
            can_publish: grants.can_publish,
            can_publish_data: grants.can_publish_data,
            can_publish_sources,
        }
    }
}

fn lk_source(kind: TrackKind) -> LkTrackSource {
    match kind {
        TrackKind::Microphone => LkTrackSource::Microphone,
        TrackKind::Camera => LkTrackSource::Camera,
        TrackKind::ScreenShare => LkTrackSource::Screenshare,
    }
}

pub struct LiveKitSession {
    room: Arc<Room>,
    active: AtomicBool,
    permissions: RwLock<Option<PublishPermissions>>,
    capture_devices: RwLock<HashMap<TrackKind, Option<String>>>,
    audio_source: Mutex<Option<NativeAudioSource>>,
    video_source: Mutex<Option<NativeVideoSource>>,
    screen_source: Mutex<Option<NativeVideoSource>>,
}

impl LiveKitSession {
    /// Wrap a connected room. `permissions` usually comes from the grants the
    /// token was issued with.
    pub fn new(room: Arc<Room>, permissions: Option<PublishPermissions>) -> Self {
        Self {
            room,
            active: AtomicBool::new(true),
            permissions: RwLock::new(permissions),
            capture_devices: RwLock::new(HashMap::new()),
            audio_source: Mutex::new(None),
            video_source: Mutex::new(None),
            screen_source: Mutex::new(None),
        }
    }

    /// Apply a permission update pushed by the server.
    pub fn set_permissions(&self, permissions: Option<PublishPermissions>) {
        *self.permissions.write().unwrap_or_else(|e| e.into_inner()) = permissions;
    }

    /// Device the host should capture `kind` from; `None` means default.
    pub fn capture_device(&self, kind: TrackKind) -> Option<String> {
        self.capture_devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .flatten()
    }

    pub async fn audio_source(&self) -> Option<NativeAudioSource> {
        self.audio_source.lock().await.clone()
    }

    pub async fn video_source(&self) -> Option<NativeVideoSource> {
        self.video_source.lock().await.clone()
    }

    pub async fn screen_source(&self) -> Option<NativeVideoSource> {
        self.screen_source.lock().await.clone()
    }

    /// Consume the room's event stream, feeding agent chat into `surface`
    /// and marking the session inactive when the room disconnects.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: UnboundedReceiver<RoomEvent>,
        surface: Arc<ControlSurface>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RoomEvent::TextStreamOpened {
                        reader,
                        topic,
                        participant_identity,
                    } if topic == CHAT_TOPIC => {
                        let Some(reader) = reader.take() else {
                            tracing::warn!("chat stream reader already taken");
                            continue;
                        };
                        let identity = participant_identity.to_string();
                        let surface = surface.clone();
                        tokio::spawn(async move {
                            let sent_at = DateTime::from_timestamp_millis(reader.info().timestamp.timestamp_millis())
                                .unwrap_or_else(Utc::now);
                            match reader.read_all().await {
                                Ok(text) => surface.handle_incoming_message(&identity, &text, sent_at).await,
                                Err(e) => tracing::warn!("chat stream from {identity} failed: {e}"),
                            }
                        });
                    }
                    RoomEvent::Disconnected { reason } => {
                        tracing::info!("room disconnected: {reason:?}");
                        session.active.store(false, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }
            tracing::debug!("room event loop ended");
        })
    }

    async fn unpublish_source(&self, source: LkTrackSource) -> Result<bool, ControlError> {
        let local = self.room.local_participant();
        let sid = local
            .track_publications()
            .into_iter()
            .find(|(_, publication)| publication.source() == source)
            .map(|(sid, _)| sid);
        let Some(sid) = sid else {
            return Ok(false);
        };
        local
            .unpublish_track(&sid)
            .await
            .map_err(|e| ControlError::Session(format!("unpublish {source:?}: {e}")))?;
        Ok(true)
    }

    fn create_track(kind: TrackKind) -> (LocalTrack, Source) {
        match kind {
            TrackKind::Microphone => {
                let source = NativeAudioSource::new(
                    AudioSourceOptions {
                        echo_cancellation: true,
                        noise_suppression: true,
                        auto_gain_control: true,
                    },
                    AUDIO_SAMPLE_RATE,
                    AUDIO_CHANNELS,
                    AUDIO_QUEUE_SIZE_MS,
                );
                let track =
                    LocalAudioTrack::create_audio_track("microphone", RtcAudioSource::Native(source.clone()));
                (LocalTrack::Audio(track), Source::Audio(source))
            }
            TrackKind::Camera | TrackKind::ScreenShare => {
                let screencast = kind == TrackKind::ScreenShare;
                let source = NativeVideoSource::new(
                    VideoResolution {
                        width: VIDEO_WIDTH,
                        height: VIDEO_HEIGHT,
                    },
                    screencast,
                );
                let name = if screencast { "screen_share" } else { "camera" };
                let track = LocalVideoTrack::create_video_track(name, RtcVideoSource::Native(source.clone()));
                (LocalTrack::Video(track), Source::Video(source))
            }
        }
    }
}

enum Source {
    Audio(NativeAudioSource),
    Video(NativeVideoSource),
}

#[async_trait]
impl MediaSession for LiveKitSession {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn local_participant(&self) -> CoreLocalParticipant {
        let local = self.room.local_participant();
        CoreLocalParticipant {
            identity: local.identity().to_string(),
            permissions: self.permissions.read().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    fn remote_participants(&self) -> Vec<CoreRemoteParticipant> {
        self.room
            .remote_participants()
            .values()
            .map(|p| {
                let name = p.name().to_string();
                CoreRemoteParticipant {
                    identity: p.identity().to_string(),
                    name: if name.is_empty() { None } else { Some(name) },
                    kind: match p.kind() {
                        LkParticipantKind::Agent => ParticipantKind::Agent,
                        LkParticipantKind::Ingress => ParticipantKind::Ingress,
                        LkParticipantKind::Egress => ParticipantKind::Egress,
                        LkParticipantKind::Sip => ParticipantKind::Sip,
                        _ => ParticipantKind::Standard,
                    },
                }
            })
            .collect()
    }

    async fn publish_track(&self, kind: TrackKind, device_id: Option<&str>) -> Result<(), ControlError> {
        let source = lk_source(kind);
        // Publishing again replaces the current track of this source.
        if self.unpublish_source(source).await? {
            tracing::debug!("replacing published {source:?} track");
        }

        let (track, native) = Self::create_track(kind);
        self.room
            .local_participant()
            .publish_track(
                track,
                TrackPublishOptions {
                    source,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ControlError::Session(format!("publish {source:?}: {e}")))?;

        match (kind, native) {
            (TrackKind::Microphone, Source::Audio(s)) => *self.audio_source.lock().await = Some(s),
            (TrackKind::Camera, Source::Video(s)) => *self.video_source.lock().await = Some(s),
            (TrackKind::ScreenShare, Source::Video(s)) => *self.screen_source.lock().await = Some(s),
            _ => {}
        }
        self.capture_devices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, device_id.map(str::to_string));

        tracing::info!("{source:?} track published (device {device_id:?})");
        Ok(())
    }

    async fn unpublish_track(&self, kind: TrackKind) -> Result<(), ControlError> {
        let source = lk_source(kind);
        self.unpublish_source(source).await?;
        match kind {
            TrackKind::Microphone => *self.audio_source.lock().await = None,
            TrackKind::Camera => *self.video_source.lock().await = None,
            TrackKind::ScreenShare => *self.screen_source.lock().await = None,
        }
        self.capture_devices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&kind);
        tracing::info!("{source:?} track unpublished");
        Ok(())
    }

    async fn send_chat_message(&self, text: &str) -> Result<(), ControlError> {
        let options = StreamTextOptions {
            topic: CHAT_TOPIC.to_string(),
            ..Default::default()
        };
        self.room
            .local_participant()
            .send_text(text, options)
            .await
            .map_err(|e| ControlError::Session(format!("send chat: {e}")))?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ControlError> {
        self.active.store(false, Ordering::SeqCst);
        self.room
            .close()
            .await
            .map_err(|e| ControlError::Session(format!("close room: {e}")))
    }
}
