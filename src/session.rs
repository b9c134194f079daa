//! Per-victim rebinding state, keyed by the browser-generated session token.
//!
//! Many handler tasks read concurrently; mutations and the expiry sweep take
//! the write side of one lock over the whole map.
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use log::debug;

use crate::qname::AnswerIp;

/// Rebinding state of one victim browser.
#[derive(Debug, Clone)]
pub struct Session {
    pub response_ip: AnswerIp,
    pub rebound_ip: AnswerIp,
    /// Arrival time of the last fully processed query; `None` until the
    /// first query completes.
    pub last_query_at: Option<Instant>,
    /// Arrival time recorded when the last query was processed.
    pub current_query_at: Option<Instant>,
    /// 0 before the first round-robin answer, then flips 1 -> 2 -> 1.
    pub round_robin_phase: u8,
    /// Inherited from the config when the session is created.
    pub rebound_timeout: Duration,
    /// Forces the attacker answer regardless of timing. Kept end to end,
    /// but no query encoding sets it today.
    pub cache_flush: bool,
}

impl Session {
    fn new(
        response_ip: AnswerIp,
        rebound_ip: AnswerIp,
        cache_flush: bool,
        rebound_timeout: Duration,
    ) -> Self {
        Session {
            response_ip,
            rebound_ip,
            last_query_at: None,
            current_query_at: None,
            round_robin_phase: 0,
            rebound_timeout,
            cache_flush,
        }
    }
}

/// The shared map of sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Create the session on first sight, or refresh the per-query fields on
    /// an existing one (addresses and cache flush travel with every query;
    /// phase and timestamps stay). Returns true when the session was created.
    pub fn upsert(
        &self,
        session_id: &str,
        response_ip: AnswerIp,
        rebound_ip: AnswerIp,
        cache_flush: bool,
        rebound_timeout: Duration,
    ) -> bool {
        let mut sessions = self.sessions.write().expect("session store lock poisoned");

        match sessions.get_mut(session_id) {
            Some(session) => {
                session.response_ip = response_ip;
                session.rebound_ip = rebound_ip;
                session.cache_flush = cache_flush;
                false
            }
            None => {
                debug!("new session <{}>", session_id);
                sessions.insert(
                    session_id.to_string(),
                    Session::new(response_ip, rebound_ip, cache_flush, rebound_timeout),
                );
                true
            }
        }
    }

    /// Run `mutator` on the session under the write lock.
    pub fn with_mut<F, R>(&self, session_id: &str, mutator: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().expect("session store lock poisoned");
        sessions.get_mut(session_id).map(mutator)
    }

    /// Copy of the session for lock-free inspection.
    pub fn snapshot(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().expect("session store lock poisoned");
        sessions.get(session_id).cloned()
    }

    /// Mark a query as fully processed: both timestamps move to its arrival
    /// time, after the strategy ran.
    pub fn touch(&self, session_id: &str, now: Instant) {
        self.with_mut(session_id, |session| {
            session.current_query_at = Some(now);
            session.last_query_at = Some(now);
        });
    }

    /// Drop every session whose last completed query is older than `ttl`.
    /// Sessions that never completed a query are left alone.
    pub fn expire_older_than(&self, ttl: Duration, now: Instant) -> usize {
        let mut sessions = self.sessions.write().expect("session store lock poisoned");

        let before = sessions.len();
        sessions.retain(|_, session| match session.last_query_at {
            Some(last) => now.duration_since(last) <= ttl,
            None => true,
        });

        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
