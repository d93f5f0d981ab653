use serde_json::json;
use tracing::debug;
use turntable_core::protocol::{ClientCommand, Command, Frame};
use turntable_core::state::{Settings, StateChange};

use crate::store::Transient;
use crate::AppContext;

/// Who is asking. Resolved from the session registry before deciding;
/// an unknown session is simply neither host nor host-user, which the
/// decision procedure then treats with the strictest policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    /// The request arrived on the host connection.
    pub is_host: bool,
    /// The request came from the host's own authenticated user, possibly
    /// on another device.
    pub is_host_user: bool,
}

/// What to do with an authorized command.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Apply(StateChange),
    Motor(Transient),
    ForwardToHost(Frame),
    /// Re-announce the cached host playlist to every client.
    AnnouncePlaylist,
    /// Silently ignored; the reason is for logs and tests only.
    Drop(&'static str),
}

/// The authorization decision procedure. Hosts always self-trust; remote
/// devices are gated by `enableRemote`, and `enforceSignature`
/// additionally requires them to act as the host's own user, closing the
/// impersonation gap where any remote session could disable security
/// settings for itself.
pub fn decide(requester: Requester, settings: &Settings, command: ClientCommand) -> Decision {
    if !requester.is_host {
        if !settings.enable_remote {
            return Decision::Drop("remote_disabled");
        }
        if settings.enforce_signature && !requester.is_host_user {
            return Decision::Drop("signature_mismatch");
        }
    }

    match command {
        ClientCommand::SetPlayState(value) => Decision::Apply(StateChange::PlayState(value)),
        ClientCommand::SetCurrentTrack(value) => Decision::Apply(StateChange::CurrentTrack(value)),
        ClientCommand::SetSettings(incoming) => {
            // non-hosts may only touch non-sensitive fields, and the whole
            // update is rejected if any sensitive field differs
            if !requester.is_host && !settings.sensitive_fields_match(&incoming) {
                return Decision::Drop("sensitive_settings");
            }
            Decision::Apply(StateChange::Settings(incoming))
        }
        ClientCommand::PlayNext => Decision::ForwardToHost(Frame::bare(Command::PlayNext)),
        ClientCommand::PlayPrevious => Decision::ForwardToHost(Frame::bare(Command::PlayPrevious)),
        ClientCommand::PlayAlbum(id) => {
            Decision::ForwardToHost(Frame::with_value(Command::PlayAlbum, json!(id)))
        }
        ClientCommand::PlayPlaylist(id) => {
            Decision::ForwardToHost(Frame::with_value(Command::PlayPlaylist, json!(id)))
        }
        ClientCommand::FastForward => Decision::Motor(Transient::FastForward),
        ClientCommand::Rewind => Decision::Motor(Transient::Rewind),
        ClientCommand::Seek(position) => {
            Decision::ForwardToHost(Frame::with_value(Command::Seek, json!(position)))
        }
        ClientCommand::RefreshPlaylist => Decision::AnnouncePlaylist,
    }
}

/// Resolve the requester for a session id against the registry.
pub fn resolve_requester(ctx: &AppContext, session_id: &str) -> Requester {
    let session = ctx.registry.get(session_id);
    let host_user = ctx.registry.host_user_id();
    match session {
        Some(session) => Requester {
            is_host: session.is_host,
            is_host_user: match (&session.user_id, &host_user) {
                (Some(user), Some(host)) => user == host,
                _ => false,
            },
        },
        None => Requester {
            is_host: false,
            is_host_user: false,
        },
    }
}

/// Carry out a decision. Drops are silent on the wire by design: the
/// sender learns nothing about which check failed.
pub fn execute(ctx: &AppContext, session_id: &str, decision: Decision) {
    match decision {
        Decision::Apply(change) => ctx.store.apply(change),
        Decision::Motor(transient) => ctx.store.apply_transient(transient),
        Decision::ForwardToHost(frame) => ctx.broker.send_to_host(&frame),
        Decision::AnnouncePlaylist => match ctx.registry.host_playlist_id() {
            Some(playlist_id) => {
                ctx.broker
                    .broadcast(&Frame::with_value(Command::RefreshPlaylist, json!(playlist_id)));
            }
            None => debug!(event = "no_host_playlist", session_id = %session_id),
        },
        Decision::Drop(reason) => {
            debug!(event = "command_dropped", session_id = %session_id, reason = reason);
        }
    }
}

/// Resolve, decide, and execute one inbound command.
pub fn handle_command(ctx: &AppContext, session_id: &str, command: ClientCommand) {
    let requester = resolve_requester(ctx, session_id);
    let settings = ctx.store.snapshot().settings;
    let decision = decide(requester, &settings, command);
    execute(ctx, session_id, decision);
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: Requester = Requester {
        is_host: true,
        is_host_user: true,
    };
    const HOST_USER_REMOTE: Requester = Requester {
        is_host: false,
        is_host_user: true,
    };
    const STRANGER: Requester = Requester {
        is_host: false,
        is_host_user: false,
    };

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn host_state_commands_apply_directly() {
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::SetPlayState(true)),
            Decision::Apply(StateChange::PlayState(true))
        );
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::SetCurrentTrack("t".into())),
            Decision::Apply(StateChange::CurrentTrack("t".into()))
        );
    }

    #[test]
    fn remote_disabled_drops_everything_from_non_hosts() {
        let mut locked = settings();
        locked.enable_remote = false;

        for command in [
            ClientCommand::SetPlayState(true),
            ClientCommand::PlayNext,
            ClientCommand::PlayAlbum("a".into()),
            ClientCommand::SetSettings(locked.clone()),
        ] {
            assert_eq!(
                decide(HOST_USER_REMOTE, &locked, command),
                Decision::Drop("remote_disabled")
            );
        }
        // the host connection itself is unaffected
        assert_eq!(
            decide(HOST, &locked, ClientCommand::PlayNext),
            Decision::ForwardToHost(Frame::bare(Command::PlayNext))
        );
    }

    #[test]
    fn signature_enforcement_blocks_other_users() {
        assert_eq!(
            decide(STRANGER, &settings(), ClientCommand::SetPlayState(true)),
            Decision::Drop("signature_mismatch")
        );
        // same user on a second device passes
        assert_eq!(
            decide(HOST_USER_REMOTE, &settings(), ClientCommand::SetPlayState(true)),
            Decision::Apply(StateChange::PlayState(true))
        );
        // with enforcement off, any remote device passes
        let mut relaxed = settings();
        relaxed.enforce_signature = false;
        assert_eq!(
            decide(STRANGER, &relaxed, ClientCommand::SetPlayState(true)),
            Decision::Apply(StateChange::PlayState(true))
        );
    }

    #[test]
    fn sensitive_settings_change_rejected_wholesale_for_non_hosts() {
        // flipping enableMotor plus a benign volume change: all rejected
        let mut incoming = settings();
        incoming.enable_motor = false;
        incoming.volume = 80;
        assert_eq!(
            decide(HOST_USER_REMOTE, &settings(), ClientCommand::SetSettings(incoming)),
            Decision::Drop("sensitive_settings")
        );
    }

    #[test]
    fn volume_only_change_allowed_for_host_user_on_second_device() {
        let incoming = settings().with_volume(80);
        assert_eq!(
            decide(HOST_USER_REMOTE, &settings(), ClientCommand::SetSettings(incoming.clone())),
            Decision::Apply(StateChange::Settings(incoming))
        );
    }

    #[test]
    fn host_may_change_sensitive_settings() {
        let mut incoming = settings();
        incoming.enforce_signature = false;
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::SetSettings(incoming.clone())),
            Decision::Apply(StateChange::Settings(incoming))
        );
    }

    #[test]
    fn skip_commands_forward_with_and_without_payload() {
        assert_eq!(
            decide(HOST_USER_REMOTE, &settings(), ClientCommand::PlayNext),
            Decision::ForwardToHost(Frame::bare(Command::PlayNext))
        );
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::PlayPlaylist("p-1".into())),
            Decision::ForwardToHost(Frame::with_value(Command::PlayPlaylist, json!("p-1")))
        );
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::Seek(31.5)),
            Decision::ForwardToHost(Frame::with_value(Command::Seek, json!(31.5)))
        );
    }

    #[test]
    fn transport_nudges_become_motor_transients() {
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::FastForward),
            Decision::Motor(Transient::FastForward)
        );
        assert_eq!(
            decide(HOST, &settings(), ClientCommand::Rewind),
            Decision::Motor(Transient::Rewind)
        );
    }
}
