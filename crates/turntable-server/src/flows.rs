use serde_json::json;
use tracing::{info, warn};
use turntable_core::protocol::{Command, Frame};
use turntable_core::CoreError;

use crate::collab::best_prediction;
use crate::session::SessionUpdate;
use crate::AppContext;

/// Name of the playlist the device curates on the host's account.
pub const PLAYLIST_NAME: &str = "Virtual Turntable";

/// Record the tokens and user identity delivered by the auth callback.
/// A host session finishing login triggers the takeover sequence.
pub async fn complete_login(
    ctx: &AppContext,
    session_id: &str,
    access_token: String,
    refresh_token: Option<String>,
    user_id: String,
) -> Result<(), CoreError> {
    ctx.registry
        .update(
            session_id,
            SessionUpdate {
                access_token: Some(access_token.clone()),
                refresh_token,
                user_id: Some(user_id),
            },
        )
        .map_err(|err| CoreError::Unauthenticated(err.to_string()))?;

    let is_host = ctx
        .registry
        .get(session_id)
        .map(|session| session.is_host)
        .unwrap_or(false);
    if is_host {
        // the host client drives playback itself and needs the token
        ctx.broker
            .send_to_host(&Frame::with_value(Command::Token, json!(access_token)));
        host_takeover(ctx, session_id).await?;
    }
    Ok(())
}

/// Make `session_id` the sole host: tell every client to re-sync, drop
/// the stale host sessions and cached playlist, reset playback state,
/// then resolve (or create) the curated playlist on the new account.
pub async fn host_takeover(ctx: &AppContext, session_id: &str) -> Result<(), CoreError> {
    info!(event = "host_takeover", session_id = %session_id);
    ctx.broker.broadcast(&Frame::bare(Command::RefreshHost));

    let evicted = ctx.registry.evict_other_hosts(session_id);
    if !evicted.is_empty() {
        info!(event = "hosts_evicted", count = evicted.len());
    }
    ctx.registry.set_host_playlist_id(None);
    ctx.store.reset();
    // artifacts cached against the old account must not survive into
    // the new one
    ctx.provider.clear_cache().await?;

    let playlist_id = match ctx
        .provider
        .playlist_by_name(session_id, PLAYLIST_NAME)
        .await?
    {
        Some(playlist_id) => playlist_id,
        None => {
            let playlist_id = ctx.provider.create_playlist(session_id, PLAYLIST_NAME).await?;
            info!(event = "playlist_created", playlist_id = %playlist_id);
            playlist_id
        }
    };
    ctx.registry.set_host_playlist_id(Some(playlist_id));
    Ok(())
}

/// Identify the record on the platter and start playing it: capture
/// images, classify them, search the provider for the best match, file
/// the album into the curated playlist, and tell the host to play it.
pub async fn scan_and_play(ctx: &AppContext) -> Result<(), CoreError> {
    let camera = ctx
        .camera
        .as_ref()
        .ok_or_else(|| CoreError::HardwareFault("no camera attached".into()))?;
    let classifier = ctx
        .classifier
        .as_ref()
        .ok_or_else(|| CoreError::Upstream("no classifier configured".into()))?;

    let captured = camera.capture(&ctx.capture_dir).await?;
    info!(event = "capture_complete", frames = captured.len());
    ctx.broker.send_to_host(&Frame::bare(Command::Capture));

    let predictions = classifier.scan(&ctx.capture_dir).await?;
    let best = best_prediction(predictions)?;
    info!(event = "record_identified", class = %best.predicted_class, prob = best.predicted_prob);

    let album_id = ctx
        .provider
        .search_for_album(&best.predicted_class)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound(format!("no album matching '{}'", best.predicted_class))
        })?;

    let playlist_id = ctx
        .registry
        .host_playlist_id()
        .ok_or_else(|| CoreError::NotFound("no host playlist".into()))?;

    if let Err(err) = ctx.provider.add_album_to_playlist(&album_id, &playlist_id).await {
        // the album can still play even if filing it failed
        warn!(event = "playlist_add_failed", error = %err);
    } else {
        ctx.broker
            .broadcast(&Frame::with_value(Command::RefreshPlaylist, json!(playlist_id)));
    }

    ctx.broker
        .send_to_host(&Frame::with_value(Command::PlayAlbum, json!(album_id)));
    Ok(())
}
