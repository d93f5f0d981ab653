use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{AppState, Settings, StateChange, StateKey};

/// Every command that may appear on the wire, in either direction.
/// Unknown strings fail deserialization and the frame is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    PlayState,
    CurrentTrack,
    Settings,
    PlayNext,
    PlayPrevious,
    PlayAlbum,
    PlayPlaylist,
    Forwards,
    Reverse,
    Seek,
    RefreshPlaylist,
    Capture,
    RefreshHost,
    Token,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::PlayState => "playState",
            Command::CurrentTrack => "currentTrack",
            Command::Settings => "settings",
            Command::PlayNext => "playNext",
            Command::PlayPrevious => "playPrevious",
            Command::PlayAlbum => "playAlbum",
            Command::PlayPlaylist => "playPlaylist",
            Command::Forwards => "forwards",
            Command::Reverse => "reverse",
            Command::Seek => "seek",
            Command::RefreshPlaylist => "refreshPlaylist",
            Command::Capture => "capture",
            Command::RefreshHost => "refreshHost",
            Command::Token => "token",
        }
    }
}

impl From<StateKey> for Command {
    fn from(key: StateKey) -> Self {
        match key {
            StateKey::PlayState => Command::PlayState,
            StateKey::CurrentTrack => Command::CurrentTrack,
            StateKey::Settings => Command::Settings,
        }
    }
}

/// The JSON message shape exchanged with clients over the websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Frame {
    pub fn bare(command: Command) -> Self {
        Self {
            command,
            value: None,
            provider: None,
        }
    }

    pub fn with_value(command: Command, value: Value) -> Self {
        Self {
            command,
            value: Some(value),
            provider: None,
        }
    }

    /// A state-change broadcast frame, stamped with the music provider name.
    pub fn state_broadcast(change: &StateChange, provider: &str) -> Self {
        let value = match change {
            StateChange::PlayState(value) => Value::Bool(*value),
            StateChange::CurrentTrack(value) => Value::String(value.clone()),
            StateChange::Settings(value) => {
                serde_json::to_value(value).unwrap_or(Value::Null)
            }
        };
        Self {
            command: change.key().into(),
            value: Some(value),
            provider: Some(provider.to_string()),
        }
    }
}

/// One `{command, value}` frame per populated state entry, used to bring a
/// freshly registered socket up to date. `currentTrack` is omitted until a
/// track has been set.
pub fn snapshot_frames(state: &AppState) -> Vec<Frame> {
    let mut frames = vec![Frame::with_value(
        Command::PlayState,
        Value::Bool(state.play_state),
    )];
    if let Some(track) = &state.current_track {
        frames.push(Frame::with_value(
            Command::CurrentTrack,
            Value::String(track.clone()),
        ));
    }
    frames.push(Frame::with_value(
        Command::Settings,
        serde_json::to_value(&state.settings).unwrap_or(Value::Null),
    ));
    frames
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("payload does not match command '{command}': {detail}")]
    PayloadMismatch {
        command: &'static str,
        detail: String,
    },
    #[error("command '{0}' is not accepted from clients")]
    NotInbound(&'static str),
}

/// A fully validated inbound command: the payload shape is fixed by the
/// command tag, so downstream code never re-inspects raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    SetPlayState(bool),
    SetCurrentTrack(String),
    SetSettings(Settings),
    PlayNext,
    PlayPrevious,
    PlayAlbum(String),
    PlayPlaylist(String),
    FastForward,
    Rewind,
    Seek(f64),
    RefreshPlaylist,
}

impl ClientCommand {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let frame: Frame =
            serde_json::from_str(raw).map_err(|err| ProtocolError::Decode(err.to_string()))?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let command = frame.command;
        let value = frame.value;
        match command {
            Command::PlayState => Ok(Self::SetPlayState(expect_bool(command, value)?)),
            Command::CurrentTrack => Ok(Self::SetCurrentTrack(expect_string(command, value)?)),
            Command::Settings => {
                let value = value.ok_or_else(|| missing(command))?;
                let settings: Settings =
                    serde_json::from_value(value).map_err(|err| ProtocolError::PayloadMismatch {
                        command: command.as_str(),
                        detail: err.to_string(),
                    })?;
                Ok(Self::SetSettings(settings))
            }
            Command::PlayNext => Ok(Self::PlayNext),
            Command::PlayPrevious => Ok(Self::PlayPrevious),
            Command::PlayAlbum => Ok(Self::PlayAlbum(expect_string(command, value)?)),
            Command::PlayPlaylist => Ok(Self::PlayPlaylist(expect_string(command, value)?)),
            Command::Forwards => Ok(Self::FastForward),
            Command::Reverse => Ok(Self::Rewind),
            Command::Seek => Ok(Self::Seek(expect_number(command, value)?)),
            Command::RefreshPlaylist => Ok(Self::RefreshPlaylist),
            Command::Capture | Command::RefreshHost | Command::Token => {
                Err(ProtocolError::NotInbound(command.as_str()))
            }
        }
    }
}

fn missing(command: Command) -> ProtocolError {
    ProtocolError::PayloadMismatch {
        command: command.as_str(),
        detail: "missing value".to_string(),
    }
}

fn expect_bool(command: Command, value: Option<Value>) -> Result<bool, ProtocolError> {
    match value {
        Some(Value::Bool(inner)) => Ok(inner),
        Some(other) => Err(ProtocolError::PayloadMismatch {
            command: command.as_str(),
            detail: format!("expected bool, got {other}"),
        }),
        None => Err(missing(command)),
    }
}

fn expect_string(command: Command, value: Option<Value>) -> Result<String, ProtocolError> {
    match value {
        Some(Value::String(inner)) => Ok(inner),
        Some(other) => Err(ProtocolError::PayloadMismatch {
            command: command.as_str(),
            detail: format!("expected string, got {other}"),
        }),
        None => Err(missing(command)),
    }
}

fn expect_number(command: Command, value: Option<Value>) -> Result<f64, ProtocolError> {
    match value {
        Some(Value::Number(inner)) => inner.as_f64().ok_or_else(|| {
            ProtocolError::PayloadMismatch {
                command: command.as_str(),
                detail: "number out of range".to_string(),
            }
        }),
        Some(other) => Err(ProtocolError::PayloadMismatch {
            command: command.as_str(),
            detail: format!("expected number, got {other}"),
        }),
        None => Err(missing(command)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_strings_round_trip() {
        for command in [
            Command::PlayState,
            Command::CurrentTrack,
            Command::Settings,
            Command::PlayNext,
            Command::PlayPrevious,
            Command::PlayAlbum,
            Command::PlayPlaylist,
            Command::Forwards,
            Command::Reverse,
            Command::Seek,
            Command::RefreshPlaylist,
            Command::Capture,
            Command::RefreshHost,
            Command::Token,
        ] {
            let encoded = serde_json::to_string(&command).expect("encode");
            assert_eq!(encoded, format!("\"{}\"", command.as_str()));
            let decoded: Command = serde_json::from_str(&encoded).expect("decode");
            assert_eq!(decoded, command);
        }
    }

    #[test]
    fn parses_typed_payload_per_tag() {
        let play = ClientCommand::parse(r#"{"command": "playState", "value": true}"#)
            .expect("playState");
        assert_eq!(play, ClientCommand::SetPlayState(true));

        let track = ClientCommand::parse(r#"{"command": "currentTrack", "value": "t-42"}"#)
            .expect("currentTrack");
        assert_eq!(track, ClientCommand::SetCurrentTrack("t-42".into()));

        let settings = ClientCommand::parse(
            r#"{"command": "settings", "value": {
                "enableMotor": false, "enableRemote": true,
                "enforceSignature": true, "volume": 30}}"#,
        )
        .expect("settings");
        assert_eq!(
            settings,
            ClientCommand::SetSettings(Settings {
                enable_motor: false,
                enable_remote: true,
                enforce_signature: true,
                volume: 30,
            })
        );

        let next = ClientCommand::parse(r#"{"command": "playNext"}"#).expect("playNext");
        assert_eq!(next, ClientCommand::PlayNext);

        let seek = ClientCommand::parse(r#"{"command": "seek", "value": 12.5}"#).expect("seek");
        assert_eq!(seek, ClientCommand::Seek(12.5));
    }

    #[test]
    fn rejects_payload_of_wrong_shape() {
        let err = ClientCommand::parse(r#"{"command": "playState", "value": "yes"}"#)
            .expect_err("bool expected");
        assert!(matches!(err, ProtocolError::PayloadMismatch { .. }));

        let err = ClientCommand::parse(r#"{"command": "playAlbum"}"#).expect_err("value required");
        assert!(matches!(err, ProtocolError::PayloadMismatch { .. }));

        let err =
            ClientCommand::parse(r#"{"command": "warp"}"#).expect_err("unknown command string");
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn server_only_commands_are_not_inbound() {
        let err = ClientCommand::parse(r#"{"command": "refreshHost"}"#).expect_err("outbound only");
        assert!(matches!(err, ProtocolError::NotInbound("refreshHost")));
    }

    #[test]
    fn snapshot_skips_unset_track() {
        let mut state = AppState::default();
        let frames = snapshot_frames(&state);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::PlayState);
        assert_eq!(frames[1].command, Command::Settings);

        state.current_track = Some("t-1".into());
        let frames = snapshot_frames(&state);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].command, Command::CurrentTrack);
        assert_eq!(frames[1].value, Some(Value::String("t-1".into())));
    }

    #[test]
    fn broadcast_frame_carries_provider() {
        let frame = Frame::state_broadcast(&StateChange::PlayState(true), "Spotify");
        let encoded = serde_json::to_string(&frame).expect("encode");
        assert_eq!(
            encoded,
            r#"{"command":"playState","value":true,"provider":"Spotify"}"#
        );
    }
}
