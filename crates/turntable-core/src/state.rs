use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: u8 = 50;
pub const MAX_VOLUME: u8 = 100;

/// User-visible playback settings, replicated to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub enable_motor: bool,
    pub enable_remote: bool,
    pub enforce_signature: bool,
    pub volume: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_motor: true,
            enable_remote: true,
            enforce_signature: true,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl Settings {
    /// True when none of the host-only fields differ from `other`.
    /// Volume is deliberately not sensitive.
    pub fn sensitive_fields_match(&self, other: &Settings) -> bool {
        self.enable_motor == other.enable_motor
            && self.enable_remote == other.enable_remote
            && self.enforce_signature == other.enforce_signature
    }

    pub fn with_volume(&self, volume: i32) -> Settings {
        let mut next = self.clone();
        next.volume = volume.clamp(0, MAX_VOLUME as i32) as u8;
        next
    }
}

/// The canonical shared application state. One instance per process,
/// mutated only through the state store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub play_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_track: Option<String>,
    #[serde(default)]
    pub settings: Settings,
}

/// The closed set of replicated state keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    PlayState,
    CurrentTrack,
    Settings,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::PlayState => "playState",
            StateKey::CurrentTrack => "currentTrack",
            StateKey::Settings => "settings",
        }
    }
}

/// One state mutation: exactly one top-level key replaced wholesale.
/// An exhaustive match over this type is the only place state reactions
/// live, so a new key cannot go silently unhandled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    PlayState(bool),
    CurrentTrack(String),
    Settings(Settings),
}

impl StateChange {
    pub fn key(&self) -> StateKey {
        match self {
            StateChange::PlayState(_) => StateKey::PlayState,
            StateChange::CurrentTrack(_) => StateKey::CurrentTrack,
            StateChange::Settings(_) => StateKey::Settings,
        }
    }

    /// True when applying this change would leave `state` untouched.
    pub fn is_noop_for(&self, state: &AppState) -> bool {
        match self {
            StateChange::PlayState(value) => state.play_state == *value,
            StateChange::CurrentTrack(value) => {
                state.current_track.as_deref() == Some(value.as_str())
            }
            StateChange::Settings(value) => state.settings == *value,
        }
    }

    /// Store the new value, replacing the previous one for this key.
    pub fn apply_to(&self, state: &mut AppState) {
        match self {
            StateChange::PlayState(value) => state.play_state = *value,
            StateChange::CurrentTrack(value) => state.current_track = Some(value.clone()),
            StateChange::Settings(value) => state.settings = value.clone(),
        }
    }
}
