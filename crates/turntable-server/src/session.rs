use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Connection metadata for one authenticated (or authenticating) client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub is_host: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
}

/// Fields merged into an existing session as auth completes.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session id is not known at all: an auth failure.
    #[error("unknown session '{0}'")]
    UnknownSession(String),
    /// The session exists but auth has not finished yet: a 404-equivalent,
    /// not an auth failure.
    #[error("session '{0}' has no access token yet")]
    TokenNotReady(String),
    #[error("session '{0}' already exists")]
    AlreadyExists(String),
}

#[derive(Debug, Default)]
struct RegistryInner {
    sessions: HashMap<String, Session>,
    host_user_id: Option<String>,
    host_playlist_id: Option<String>,
}

/// Owns every live session plus the derived host identity. All mutation
/// goes through these methods; the lock is never held across an await.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh session with a collision-checked unique id.
    pub fn mint(&self, is_host: bool) -> String {
        let mut inner = self.inner.write().expect("registry lock");
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if inner.sessions.contains_key(&id) {
                continue;
            }
            inner.sessions.insert(
                id.clone(),
                Session {
                    id: id.clone(),
                    is_host,
                    access_token: None,
                    refresh_token: None,
                    user_id: None,
                },
            );
            return id;
        }
    }

    pub fn create(&self, id: &str, is_host: bool) -> Result<(), SessionError> {
        let mut inner = self.inner.write().expect("registry lock");
        if inner.sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }
        inner.sessions.insert(
            id.to_string(),
            Session {
                id: id.to_string(),
                is_host,
                access_token: None,
                refresh_token: None,
                user_id: None,
            },
        );
        Ok(())
    }

    /// Idempotent: deleting an absent session is a no-op.
    pub fn delete(&self, id: &str) {
        self.inner
            .write()
            .expect("registry lock")
            .sessions
            .remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner
            .read()
            .expect("registry lock")
            .sessions
            .get(id)
            .cloned()
    }

    /// Merge fields into an existing session. When a host session learns
    /// its user id, that id becomes the authoritative host user.
    pub fn update(&self, id: &str, update: SessionUpdate) -> Result<(), SessionError> {
        let mut inner = self.inner.write().expect("registry lock");
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        if let Some(token) = update.access_token {
            session.access_token = Some(token);
        }
        if let Some(token) = update.refresh_token {
            session.refresh_token = Some(token);
        }
        let became_host_user = match update.user_id {
            Some(user_id) => {
                session.user_id = Some(user_id.clone());
                session.is_host.then_some(user_id)
            }
            None => None,
        };
        if let Some(user_id) = became_host_user {
            info!(event = "host_user_set", user_id = %user_id);
            inner.host_user_id = Some(user_id);
        }
        Ok(())
    }

    /// Access token of the first host-flagged session. More than one host
    /// session should be unreachable in steady state (takeover deletes the
    /// old ones first), so finding several is reported loudly.
    pub fn host_token(&self) -> Option<String> {
        let inner = self.inner.read().expect("registry lock");
        let mut hosts = inner.sessions.values().filter(|session| session.is_host);
        let first = hosts.next();
        let extras = hosts.count();
        if extras > 0 {
            warn!(event = "duplicate_host", extra = extras);
            debug_assert!(false, "more than one session flagged host");
        }
        first.and_then(|session| session.access_token.clone())
    }

    pub fn token(&self, id: &str) -> Result<String, SessionError> {
        let inner = self.inner.read().expect("registry lock");
        let session = inner
            .sessions
            .get(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        session
            .access_token
            .clone()
            .ok_or_else(|| SessionError::TokenNotReady(id.to_string()))
    }

    pub fn host_user_id(&self) -> Option<String> {
        self.inner
            .read()
            .expect("registry lock")
            .host_user_id
            .clone()
    }

    pub fn host_playlist_id(&self) -> Option<String> {
        self.inner
            .read()
            .expect("registry lock")
            .host_playlist_id
            .clone()
    }

    pub fn set_host_playlist_id(&self, playlist_id: Option<String>) {
        self.inner.write().expect("registry lock").host_playlist_id = playlist_id;
    }

    /// Delete every other host-flagged session; called when a new host
    /// completes login. Returns the evicted ids.
    pub fn evict_other_hosts(&self, keep_id: &str) -> Vec<String> {
        let mut inner = self.inner.write().expect("registry lock");
        let evicted: Vec<String> = inner
            .sessions
            .values()
            .filter(|session| session.is_host && session.id != keep_id)
            .map(|session| session.id.clone())
            .collect();
        for id in &evicted {
            inner.sessions.remove(id);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_duplicate_ids() {
        let registry = SessionRegistry::new();
        registry.create("abc", false).expect("first create");
        assert_eq!(
            registry.create("abc", true),
            Err(SessionError::AlreadyExists("abc".into()))
        );
    }

    #[test]
    fn minted_ids_are_unique_and_live() {
        let registry = SessionRegistry::new();
        let a = registry.mint(true);
        let b = registry.mint(false);
        assert_ne!(a, b);
        assert!(registry.get(&a).expect("host session").is_host);
        assert!(!registry.get(&b).expect("side session").is_host);
    }

    #[test]
    fn delete_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = registry.mint(false);
        registry.delete(&id);
        registry.delete(&id);
        assert_eq!(registry.get(&id), None);
    }

    #[test]
    fn token_errors_distinguish_unknown_from_not_ready() {
        let registry = SessionRegistry::new();
        let id = registry.mint(false);

        assert_eq!(
            registry.token("nope"),
            Err(SessionError::UnknownSession("nope".into()))
        );
        assert_eq!(
            registry.token(&id),
            Err(SessionError::TokenNotReady(id.clone()))
        );

        registry
            .update(
                &id,
                SessionUpdate {
                    access_token: Some("tok".into()),
                    ..SessionUpdate::default()
                },
            )
            .expect("update");
        assert_eq!(registry.token(&id), Ok("tok".into()));
    }

    #[test]
    fn host_user_id_follows_host_session_updates() {
        let registry = SessionRegistry::new();
        let host = registry.mint(true);
        let side = registry.mint(false);

        registry
            .update(
                &side,
                SessionUpdate {
                    user_id: Some("listener".into()),
                    ..SessionUpdate::default()
                },
            )
            .expect("side update");
        assert_eq!(registry.host_user_id(), None);

        registry
            .update(
                &host,
                SessionUpdate {
                    user_id: Some("dj".into()),
                    ..SessionUpdate::default()
                },
            )
            .expect("host update");
        assert_eq!(registry.host_user_id(), Some("dj".into()));
    }

    #[test]
    fn eviction_leaves_exactly_one_host() {
        let registry = SessionRegistry::new();
        let old_host = registry.mint(true);
        let side = registry.mint(false);
        let new_host = registry.mint(true);

        let evicted = registry.evict_other_hosts(&new_host);
        assert_eq!(evicted, vec![old_host.clone()]);
        assert_eq!(registry.get(&old_host), None);
        assert!(registry.get(&side).is_some());
        assert!(registry.get(&new_host).expect("new host").is_host);
    }

    #[test]
    fn host_token_returns_the_host_session_token() {
        let registry = SessionRegistry::new();
        let host = registry.mint(true);
        registry.mint(false);
        assert_eq!(registry.host_token(), None);

        registry
            .update(
                &host,
                SessionUpdate {
                    access_token: Some("host-tok".into()),
                    ..SessionUpdate::default()
                },
            )
            .expect("update");
        assert_eq!(registry.host_token(), Some("host-tok".into()));
    }
}
