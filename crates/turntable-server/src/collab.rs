use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use turntable_core::CoreError;

/// Streaming-service backend: playlist management and album lookup on
/// behalf of an authenticated session.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Human-readable provider name, stamped onto state broadcasts so
    /// clients know which backend produced a value.
    fn provider_name(&self) -> &str;

    async fn add_album_to_playlist(
        &self,
        album_id: &str,
        playlist_id: &str,
    ) -> Result<(), CoreError>;

    /// Find a playlist owned by the session's user by exact name.
    async fn playlist_by_name(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<Option<String>, CoreError>;

    async fn create_playlist(&self, session_id: &str, name: &str) -> Result<String, CoreError>;

    /// Free-text album search; `None` when nothing matched.
    async fn search_for_album(&self, description: &str) -> Result<Option<String>, CoreError>;

    /// Drop any cached artifacts tied to the current host account.
    /// Called during host takeover, before the new account is queried.
    async fn clear_cache(&self) -> Result<(), CoreError>;
}

/// One candidate identification of a scanned record.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub predicted_class: String,
    pub predicted_prob: f64,
}

/// Identifies a record from captured images.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn scan(&self, capture_dir: &Path) -> Result<Vec<Prediction>, CoreError>;
}

/// Captures images of the platter into a directory and returns the
/// written file paths.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self, capture_dir: &Path) -> Result<Vec<PathBuf>, CoreError>;
}

/// Pick the single most confident prediction.
pub fn best_prediction(predictions: Vec<Prediction>) -> Result<Prediction, CoreError> {
    let mut best: Option<Prediction> = None;
    for prediction in predictions {
        let better = match &best {
            Some(current) => prediction.predicted_prob > current.predicted_prob,
            None => true,
        };
        if better {
            best = Some(prediction);
        }
    }
    best.ok_or_else(|| CoreError::NotFound("no predictions returned".into()))
}

/// Stand-in backend for running without streaming credentials. Every
/// lookup fails upstream, which callers already treat as a soft error.
pub struct NullProvider;

#[async_trait]
impl MusicProvider for NullProvider {
    fn provider_name(&self) -> &str {
        "none"
    }

    async fn add_album_to_playlist(
        &self,
        _album_id: &str,
        _playlist_id: &str,
    ) -> Result<(), CoreError> {
        warn!(event = "provider_unconfigured");
        Err(CoreError::Upstream("no music provider configured".into()))
    }

    async fn playlist_by_name(
        &self,
        _session_id: &str,
        _name: &str,
    ) -> Result<Option<String>, CoreError> {
        warn!(event = "provider_unconfigured");
        Err(CoreError::Upstream("no music provider configured".into()))
    }

    async fn create_playlist(&self, _session_id: &str, _name: &str) -> Result<String, CoreError> {
        warn!(event = "provider_unconfigured");
        Err(CoreError::Upstream("no music provider configured".into()))
    }

    async fn search_for_album(&self, _description: &str) -> Result<Option<String>, CoreError> {
        warn!(event = "provider_unconfigured");
        Err(CoreError::Upstream("no music provider configured".into()))
    }

    async fn clear_cache(&self) -> Result<(), CoreError> {
        // nothing is cached without a backend
        Ok(())
    }
}
