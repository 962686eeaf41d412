//! Long-lived session cache.
//!
//! Sessions are keyed by the full credential tuple so a changed password never
//! reuses an old connection. A background reaper probes every cached session
//! at a fixed interval and evicts the ones that no longer answer.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::config::Settings;
use crate::error::SshError;
use crate::security_log;

use super::{ConnectTarget, Connector, RemoteSession};

#[derive(Clone, Eq)]
pub struct SessionKey {
    pub host: Arc<str>,
    pub port: u16,
    pub username: Arc<str>,
    password: Arc<str>,
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port
            && self.host.as_ref() == other.host.as_ref()
            && self.username.as_ref() == other.username.as_ref()
            && self.password.as_ref() == other.password.as_ref()
    }
}

impl Hash for SessionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.as_ref().hash(state);
        self.port.hash(state);
        self.username.as_ref().hash(state);
        self.password.as_ref().hash(state);
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SessionKey {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: Arc::from(host),
            port,
            username: Arc::from(username),
            password: Arc::from(password),
        }
    }
}

impl From<&ConnectTarget> for SessionKey {
    fn from(target: &ConnectTarget) -> Self {
        Self::new(
            &target.host,
            target.port,
            &target.user,
            target.password.expose_secret(),
        )
    }
}

pub struct SessionCache<C: Connector> {
    connector: Arc<C>,
    sessions: Mutex<HashMap<SessionKey, Arc<C::Session>>>,
    reap_interval: Duration,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> SessionCache<C> {
    /// Build an empty cache. The reaper is not running until
    /// [`start_reaper`](Self::start_reaper) is called.
    pub fn new(connector: Arc<C>, reap_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
            reap_interval,
            reaper: Mutex::new(None),
        })
    }

    /// Build a cache with its reaper already running. Must be called inside
    /// a Tokio runtime.
    pub fn start(connector: Arc<C>, reap_interval: Duration) -> Arc<Self> {
        let cache = Self::new(connector, reap_interval);
        cache.start_reaper();
        cache
    }

    /// Build a cache sweeping at `cache.reap_interval_secs`, with its reaper
    /// running. Must be called inside a Tokio runtime.
    pub fn from_settings(connector: Arc<C>, settings: &Settings) -> Arc<Self> {
        Self::start(connector, settings.cache.reap_interval())
    }

    pub fn reap_interval(&self) -> Duration {
        self.reap_interval
    }

    /// Start the periodic liveness sweep. Returns `false` if it was already
    /// started. The task only holds a weak reference and ends once the cache
    /// is dropped.
    pub fn start_reaper(self: &Arc<Self>) -> bool {
        let mut reaper = self.reaper.lock();
        if reaper.is_some() {
            return false;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.reap_interval;
        *reaper = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let evicted = cache.sweep().await;
                if evicted > 0 {
                    tracing::info!("Session reaper evicted {} session(s)", evicted);
                }
            }
            tracing::debug!("Session reaper stopped");
        }));
        true
    }

    /// Return the cached session for `target` if it still answers a probe,
    /// otherwise connect a new one and cache it.
    pub async fn acquire_long_lived(
        &self,
        target: &ConnectTarget,
    ) -> Result<Arc<C::Session>, SshError> {
        let key = SessionKey::from(target);

        let cached = self.sessions.lock().get(&key).cloned();
        if let Some(session) = cached {
            match session.probe().await {
                Ok(()) => {
                    tracing::debug!("Reusing cached session to {}", target.address());
                    return Ok(session);
                }
                Err(e) => {
                    self.evict_if_matches(&key, &session);
                    security_log::log_session_evicted(
                        &key.host,
                        key.port,
                        &key.username,
                        &e.to_string(),
                    );
                    session.close().await;
                }
            }
        }

        let fresh = self.connector.connect(target).await?;

        let winner = {
            let mut sessions = self.sessions.lock();
            match sessions.get(&key) {
                Some(existing) => Some(existing.clone()),
                None => {
                    sessions.insert(key, fresh.clone());
                    None
                }
            }
        };

        match winner {
            Some(existing) => {
                // Another caller connected first
                fresh.close().await;
                Ok(existing)
            }
            None => Ok(fresh),
        }
    }

    /// Probe every cached session once and evict those that fail.
    /// Returns how many were evicted.
    pub async fn sweep(&self) -> usize {
        let snapshot: Vec<(SessionKey, Arc<C::Session>)> = self
            .sessions
            .lock()
            .iter()
            .map(|(key, session)| (key.clone(), session.clone()))
            .collect();

        let mut evicted = 0;
        for (key, session) in snapshot {
            if let Err(e) = session.probe().await {
                if self.evict_if_matches(&key, &session) {
                    evicted += 1;
                }
                security_log::log_session_evicted(
                    &key.host,
                    key.port,
                    &key.username,
                    &e.to_string(),
                );
                session.close().await;
            }
        }
        evicted
    }

    fn evict_if_matches(&self, key: &SessionKey, session: &Arc<C::Session>) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(key) {
            Some(existing) if Arc::ptr_eq(existing, session) => {
                sessions.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Drop `session` from the cache and close it.
    pub async fn release(&self, session: &Arc<C::Session>) {
        let removed = {
            let mut sessions = self.sessions.lock();
            let before = sessions.len();
            sessions.retain(|_, cached| !Arc::ptr_eq(cached, session));
            before != sessions.len()
        };
        if !removed {
            tracing::debug!("Released session was not cached");
        }
        session.close().await;
    }

    /// Stop the reaper and close every cached session.
    pub async fn shutdown(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
        let drained: Vec<Arc<C::Session>> =
            self.sessions.lock().drain().map(|(_, session)| session).collect();
        for session in drained {
            session.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl<C: Connector> Drop for SessionCache<C> {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.abort();
        }
    }
}
