//! Session registry with a hard cap and LRU eviction.
//!
//! The map itself sits behind one `parking_lot::Mutex` that is never held
//! across an `.await`.  Each session has its own `tokio::sync::Mutex`, so a
//! turn holds exclusive access to one session while others proceed.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mv_domain::config::SessionsConfig;
use mv_domain::error::SessionError;
use mv_domain::trace::TraceEvent;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::session::Session;

/// Last activity of one session, shared between its slot and any lease.
/// Eviction and idle pruning read this, never the session itself, so they
/// do not have to wait for a running turn.
struct Activity {
    at: DateTime<Utc>,
    /// Breaks `at` ties.
    tick: u64,
}

type ActivityStamp = Arc<Mutex<Activity>>;

/// Monotonic counter shared by the manager and its leases.
#[derive(Clone, Default)]
struct Clock(Arc<AtomicU64>);

impl Clock {
    fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    fn stamp(&self, activity: &ActivityStamp, at: DateTime<Utc>) {
        let tick = self.tick();
        let mut a = activity.lock();
        a.at = a.at.max(at);
        a.tick = tick;
    }
}

struct Slot {
    session: Arc<AsyncMutex<Session>>,
    created_at: DateTime<Utc>,
    activity: ActivityStamp,
}

impl Slot {
    fn last_active(&self) -> (DateTime<Utc>, u64) {
        let a = self.activity.lock();
        (a.at, a.tick)
    }
}

/// Exclusive access to one session for the duration of a turn.
///
/// Every mutable access counts as activity, and the session's own
/// `last_active_at` is copied back to the slot when the lease is dropped.
pub struct SessionLease {
    guard: OwnedMutexGuard<Session>,
    activity: ActivityStamp,
    clock: Clock,
}

impl Deref for SessionLease {
    type Target = Session;
    fn deref(&self) -> &Session {
        &self.guard
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut Session {
        self.clock.stamp(&self.activity, Utc::now());
        &mut self.guard
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.clock.stamp(&self.activity, self.guard.last_active_at);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// `None` while a turn holds the session.
    pub message_count: Option<usize>,
    pub tool_call_count: Option<usize>,
    pub busy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub total_messages: usize,
    pub total_tool_calls: usize,
    pub oldest_activity: Option<DateTime<Utc>>,
    pub newest_activity: Option<DateTime<Utc>>,
}

pub struct SessionManager {
    config: SessionsConfig,
    slots: Mutex<HashMap<String, Slot>>,
    clock: Clock,
}

impl SessionManager {
    pub fn new(config: SessionsConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            clock: Clock::default(),
        }
    }

    /// Register a fresh session, evicting the least recently active one if
    /// the cap is reached.
    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let tick = self.clock.tick();

        let (evicted, active) = {
            let mut slots = self.slots.lock();
            let mut evicted = None;
            if slots.len() >= self.config.max_sessions.max(1) {
                let victim = slots
                    .iter()
                    .map(|(k, s)| (k, s.last_active()))
                    .min_by_key(|(_, stamp)| *stamp)
                    .map(|(k, (at, _))| (k.clone(), at));
                if let Some((victim_id, last_active)) = victim {
                    slots.remove(&victim_id);
                    evicted = Some((victim_id, last_active));
                }
            }
            slots.insert(
                id.clone(),
                Slot {
                    session: Arc::new(AsyncMutex::new(Session::new(id.clone()))),
                    created_at: now,
                    activity: Arc::new(Mutex::new(Activity { at: now, tick })),
                },
            );
            (evicted, slots.len())
        };

        if let Some((victim_id, last_active)) = evicted {
            tracing::info!(session_id = %victim_id, "evicted least recently active session");
            TraceEvent::SessionEvicted {
                session_id: victim_id,
                idle_secs: (now - last_active).num_seconds(),
            }
            .emit();
        }
        TraceEvent::SessionCreated {
            session_id: id.clone(),
            active_sessions: active,
        }
        .emit();
        id
    }

    /// Look up a session handle and mark it active.
    fn handle(&self, id: &str) -> Result<(Arc<AsyncMutex<Session>>, ActivityStamp), SessionError> {
        let slots = self.slots.lock();
        let slot = slots
            .get(id)
            .ok_or_else(|| SessionError::SessionNotFound(id.to_owned()))?;
        self.clock.stamp(&slot.activity, Utc::now());
        Ok((slot.session.clone(), slot.activity.clone()))
    }

    /// `None` creates a new session; an unknown id is an error.
    pub fn resolve(&self, id: Option<&str>) -> Result<String, SessionError> {
        match id {
            None => Ok(self.create_session()),
            Some(id) => self.handle(id).map(|_| id.to_owned()),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.lock().contains_key(id)
    }

    /// Take the session for one turn.  Waits up to `lock_timeout_secs` for a
    /// concurrent turn to finish, then fails with `SessionBusy`.
    pub async fn lease(&self, id: &str) -> Result<SessionLease, SessionError> {
        let (handle, activity) = self.handle(id)?;
        let timeout = Duration::from_secs(self.config.lock_timeout_secs);
        let mut guard = tokio::time::timeout(timeout, handle.lock_owned())
            .await
            .map_err(|_| SessionError::SessionBusy(id.to_owned()))?;
        guard.touch();
        Ok(SessionLease {
            guard,
            activity,
            clock: self.clock.clone(),
        })
    }

    /// Snapshot of a session.
    pub async fn get_session(&self, id: &str) -> Result<Session, SessionError> {
        let lease = self.lease(id).await?;
        Ok(Session::clone(&lease))
    }

    pub async fn clear_session(&self, id: &str) -> Result<usize, SessionError> {
        let mut lease = self.lease(id).await?;
        let dropped = lease.clear();
        TraceEvent::SessionCleared {
            session_id: id.to_owned(),
            entries_dropped: dropped,
        }
        .emit();
        Ok(dropped)
    }

    pub fn destroy_session(&self, id: &str) -> Result<(), SessionError> {
        self.slots
            .lock()
            .remove(id)
            .ok_or_else(|| SessionError::SessionNotFound(id.to_owned()))?;
        TraceEvent::SessionDestroyed {
            session_id: id.to_owned(),
            reason: "deleted".into(),
        }
        .emit();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sessions ordered by most recent activity first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let slots = self.slots.lock();
        let mut infos: Vec<SessionInfo> = slots
            .iter()
            .map(|(id, slot)| {
                let (message_count, tool_call_count, busy) = match slot.session.try_lock() {
                    Ok(s) => (Some(s.message_count()), Some(s.tool_call_count()), false),
                    Err(_) => (None, None, true),
                };
                SessionInfo {
                    id: id.clone(),
                    created_at: slot.created_at,
                    last_active_at: slot.last_active().0,
                    message_count,
                    tool_call_count,
                    busy,
                }
            })
            .collect();
        infos.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        infos
    }

    pub fn stats(&self) -> SessionStats {
        let infos = self.list();
        SessionStats {
            active_sessions: infos.len(),
            max_sessions: self.config.max_sessions,
            total_messages: infos.iter().filter_map(|i| i.message_count).sum(),
            total_tool_calls: infos.iter().filter_map(|i| i.tool_call_count).sum(),
            oldest_activity: infos.iter().map(|i| i.last_active_at).min(),
            newest_activity: infos.iter().map(|i| i.last_active_at).max(),
        }
    }

    /// Drop sessions idle past `idle_timeout_minutes`.  Leased sessions are
    /// kept.  Returns the removed ids.
    pub fn prune_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let Some(minutes) = self.config.idle_timeout_minutes else {
            return Vec::new();
        };
        let limit = chrono::Duration::minutes(minutes as i64);

        let mut removed = Vec::new();
        self.slots.lock().retain(|id, slot| {
            let in_use = Arc::strong_count(&slot.session) > 1;
            let keep = in_use || now - slot.last_active().0 <= limit;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });

        for id in &removed {
            TraceEvent::SessionDestroyed {
                session_id: id.clone(),
                reason: "idle".into(),
            }
            .emit();
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "pruned idle sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max: usize) -> SessionManager {
        SessionManager::new(SessionsConfig {
            max_sessions: max,
            idle_timeout_minutes: Some(60),
            lock_timeout_secs: 1,
        })
    }

    #[tokio::test]
    async fn create_then_get_and_destroy() {
        let m = manager(10);
        let id = m.create_session();
        assert_eq!(m.get_session(&id).await.unwrap().id, id);
        m.destroy_session(&id).unwrap();
        assert_eq!(
            m.get_session(&id).await.unwrap_err(),
            SessionError::SessionNotFound(id.clone())
        );
        assert!(m.destroy_session(&id).is_err());
    }

    #[tokio::test]
    async fn eviction_picks_least_recently_active() {
        let m = manager(3);
        let a = m.create_session();
        let b = m.create_session();
        let c = m.create_session();
        // Reading `a` makes `b` the oldest.
        m.get_session(&a).await.unwrap();

        let d = m.create_session();
        assert_eq!(m.len(), 3);
        assert!(!m.contains(&b));
        for id in [&a, &c, &d] {
            assert!(m.contains(id));
        }
    }

    #[tokio::test]
    async fn eviction_counts_appends_made_under_a_lease() {
        let m = manager(2);
        let a = m.create_session();
        let mut lease = m.lease(&a).await.unwrap();
        let b = m.create_session();
        tokio::time::sleep(Duration::from_millis(20)).await;
        lease.push_user("still working");
        drop(lease);

        let c = m.create_session();
        assert!(m.contains(&a), "session with the newest append was evicted");
        assert!(!m.contains(&b));
        assert!(m.contains(&c));
    }

    #[tokio::test]
    async fn open_lease_activity_protects_from_eviction() {
        let m = manager(2);
        let a = m.create_session();
        let mut lease = m.lease(&a).await.unwrap();
        let b = m.create_session();
        tokio::time::sleep(Duration::from_millis(20)).await;
        lease.push_assistant("mid turn");

        m.create_session();
        assert!(m.contains(&a));
        assert!(!m.contains(&b));
        assert!(m.list().iter().any(|i| i.id == a && i.busy));
    }

    #[tokio::test]
    async fn prune_idle_uses_append_time() {
        let m = manager(5);
        let id = m.create_session();
        let started = Utc::now();
        {
            let mut lease = m.lease(&id).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            lease.push_user("hello");
        }
        let appended = m.list()[0].last_active_at;
        assert!(appended > started);
        assert!(m.prune_idle(appended + chrono::Duration::minutes(60)).is_empty());
        assert_eq!(m.prune_idle(appended + chrono::Duration::minutes(61)), vec![id]);
    }

    #[tokio::test]
    async fn clear_keeps_id_valid() {
        let m = manager(2);
        let id = m.create_session();
        {
            let mut lease = m.lease(&id).await.unwrap();
            lease.push_user("hello");
            lease.mark_touched("/memories/a.txt");
        }
        assert_eq!(m.clear_session(&id).await.unwrap(), 1);
        let s = m.get_session(&id).await.unwrap();
        assert!(s.transcript.is_empty());
        assert!(s.touched.is_empty());
    }

    #[tokio::test]
    async fn second_lease_times_out_as_busy() {
        let m = manager(2);
        let id = m.create_session();
        let _held = m.lease(&id).await.unwrap();
        let err = m.lease(&id).await.err().unwrap();
        assert_eq!(err, SessionError::SessionBusy(id.clone()));
        assert!(m.list()[0].busy);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_serialize() {
        let m = Arc::new(manager(2));
        let id = m.create_session();

        let mut handles = Vec::new();
        for i in 0..8 {
            let m = m.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let mut lease = m.lease(&id).await.unwrap();
                lease.push_user(format!("q{i}"));
                tokio::task::yield_now().await;
                lease.push_assistant(format!("a{i}"));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let s = m.get_session(&id).await.unwrap();
        assert_eq!(s.transcript.len(), 16);
        for pair in s.transcript.chunks(2) {
            let (
                crate::session::TranscriptEntry::User { text: q, .. },
                crate::session::TranscriptEntry::Assistant { text: a, .. },
            ) = (&pair[0], &pair[1])
            else {
                panic!("turns interleaved");
            };
            assert_eq!(&q[1..], &a[1..]);
        }
    }

    #[tokio::test]
    async fn prune_idle_skips_leased_sessions() {
        let m = manager(5);
        let idle = m.create_session();
        let busy = m.create_session();
        let _lease = m.lease(&busy).await.unwrap();

        let later = Utc::now() + chrono::Duration::minutes(61);
        let removed = m.prune_idle(later);
        assert_eq!(removed, vec![idle.clone()]);
        assert!(m.contains(&busy));
    }

    #[test]
    fn stats_reflect_cap() {
        let m = manager(4);
        m.create_session();
        let stats = m.stats();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.max_sessions, 4);
        assert!(stats.oldest_activity.is_some());
    }
}
