//! Session storage and management.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::generate_sid;
use crate::error::Error;
use crate::Result;

/// Sessions idle for longer than this are removed by the sweep.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A server-held bag of key/value state.
#[derive(Debug, Clone)]
struct Session {
    atime: DateTime<Utc>,
    values: HashMap<String, String>,
}

impl Session {
    fn new() -> Self {
        Self {
            atime: Utc::now(),
            values: HashMap::new(),
        }
    }

    /// Refresh the access time. Never moves backwards.
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.atime {
            self.atime = now;
        }
    }
}

/// Point-in-time copy of one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub sid: String,
    /// Last access time.
    pub atime: DateTime<Utc>,
    /// Stored key/value pairs.
    pub values: BTreeMap<String, String>,
}

/// Consistent snapshot of every live session, keyed by identifier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    /// Sessions by identifier.
    pub sessions: BTreeMap<String, SessionInfo>,
}

impl SessionSnapshot {
    /// Number of sessions in the snapshot.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the snapshot holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Flatten into the human-facing listing format.
    ///
    /// Each record carries `_sid` and `_atime` next to the stored values.
    pub fn to_listing(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.sessions
            .iter()
            .map(|(sid, info)| {
                let mut record = info.values.clone();
                record.insert("_sid".to_string(), info.sid.clone());
                record.insert("_atime".to_string(), info.atime.to_rfc3339());
                (sid.clone(), record)
            })
            .collect()
    }
}

/// Source of fresh session identifiers.
pub(crate) type SidSource = fn() -> Result<String>;

/// Thread-safe in-memory session store.
///
/// Every operation runs as one short critical section under a single
/// store-wide lock. Callers only ever hold identifiers, never sessions.
/// All data is lost when the process ends.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    idle_timeout: Duration,
    mint_sid: SidSource,
}

impl SessionStore {
    /// Create a new empty session store with the default 30 minute idle timeout.
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }

    /// Create a new empty session store with a custom idle timeout.
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
            mint_sid: generate_sid,
        }
    }

    /// Mint identifiers from `source` instead of the OS RNG.
    #[cfg(test)]
    pub(crate) fn with_sid_source(mut self, source: SidSource) -> Self {
        self.mint_sid = source;
        self
    }

    /// Idle timeout used by [`SessionStore::expire_sessions`].
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Remove every session idle for strictly longer than the idle timeout.
    ///
    /// Returns the number of sessions removed.
    pub fn expire_sessions(&self) -> Result<usize> {
        self.expire_sessions_at(Utc::now())
    }

    fn expire_sessions_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.lock()?;
        let before = sessions.len();

        sessions.retain(|_, session| {
            // A clock that went backwards yields a negative age; keep those.
            let idle = (now - session.atime).to_std().unwrap_or(Duration::ZERO);
            idle <= self.idle_timeout
        });

        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, live = sessions.len(), "expired sessions");
        }
        Ok(removed)
    }

    /// Set the access time of a live session to now. Unknown ids are ignored.
    pub fn touch_session(&self, sid: &str) -> Result<()> {
        let mut sessions = self.lock()?;
        if let Some(session) = sessions.get_mut(sid) {
            session.touch();
        }
        Ok(())
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn kill_session(&self, sid: &str) -> Result<()> {
        let mut sessions = self.lock()?;
        if sessions.remove(sid).is_some() {
            tracing::debug!(sid, "killed session");
        }
        Ok(())
    }

    /// Store a value in a session and return the session id.
    ///
    /// If `sid` does not name a live session (including the empty string),
    /// a new session is created under a freshly minted id, which is
    /// returned instead. Callers must always adopt the returned id.
    pub fn put_value(
        &self,
        sid: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<String> {
        let mut sessions = self.lock()?;

        let sid = match sessions.get_mut(sid) {
            Some(session) => {
                session.touch();
                session.values.insert(key.into(), value.into());
                return Ok(sid.to_string());
            }
            None => (self.mint_sid)()?,
        };

        let mut session = Session::new();
        session.values.insert(key.into(), value.into());
        sessions.insert(sid.clone(), session);
        tracing::debug!(sid = %sid, live = sessions.len(), "created session");

        Ok(sid)
    }

    /// Get a session value, or `None` if the session or key does not exist.
    pub fn get_value(&self, sid: &str, key: &str) -> Result<Option<String>> {
        let sessions = self.lock()?;
        Ok(sessions
            .get(sid)
            .and_then(|session| session.values.get(key))
            .cloned())
    }

    /// Take a consistent copy of all live sessions.
    ///
    /// Meant for operational inspection; request serving never calls this.
    pub fn list_sessions(&self) -> Result<SessionSnapshot> {
        let sessions = self.lock()?;
        let sessions = sessions
            .iter()
            .map(|(sid, session)| {
                let info = SessionInfo {
                    sid: sid.clone(),
                    atime: session.atime,
                    values: session
                        .values
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                };
                (sid.clone(), info)
            })
            .collect();
        Ok(SessionSnapshot { sessions })
    }

    /// Get the number of live sessions.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Insert an empty session with the given access time.
    #[cfg(test)]
    pub(crate) fn seed(&self, sid: &str, atime: DateTime<Utc>) {
        let session = Session {
            atime,
            values: HashMap::new(),
        };
        self.sessions.lock().unwrap().insert(sid.to_string(), session);
    }

    #[cfg(test)]
    pub(crate) fn atime(&self, sid: &str) -> Option<DateTime<Utc>> {
        self.sessions.lock().unwrap().get(sid).map(|s| s.atime)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::id::{exhausted_sid, is_well_formed};

    const MINUTE: Duration = Duration::from_secs(60);

    fn ago(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
        now - chrono::Duration::from_std(age).unwrap()
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = SessionStore::new();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.idle_timeout(), DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn test_get_unknown_session() {
        let store = SessionStore::new();
        assert_eq!(store.get_value("", "name").unwrap(), None);
        assert_eq!(store.get_value("nope", "name").unwrap(), None);
    }

    #[test]
    fn test_put_creates_session() {
        let store = SessionStore::new();
        let sid = store.put_value("", "name", "chris").unwrap();

        assert!(is_well_formed(&sid));
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_value(&sid, "name").unwrap().as_deref(), Some("chris"));
    }

    #[test]
    fn test_put_unknown_sid_mints_new_one() {
        let store = SessionStore::new();
        let sid = store.put_value("ff0a", "name", "chris").unwrap();
        assert_ne!(sid, "ff0a");
        assert_eq!(sid.len(), 32);
    }

    #[test]
    fn test_put_live_session_keeps_sid() {
        let store = SessionStore::new();
        let sid1 = store.put_value("", "name", "chris").unwrap();
        let sid2 = store.put_value(&sid1, "name", "bi").unwrap();

        assert_eq!(sid1, sid2);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_value(&sid1, "name").unwrap().as_deref(), Some("bi"));
    }

    #[test]
    fn test_get_unknown_key() {
        let store = SessionStore::new();
        let sid = store.put_value("", "name", "chris").unwrap();
        assert_eq!(store.get_value(&sid, "other").unwrap(), None);
    }

    #[test]
    fn test_empty_value_is_not_absent() {
        let store = SessionStore::new();
        let sid = store.put_value("", "name", "").unwrap();
        assert_eq!(store.get_value(&sid, "name").unwrap(), Some(String::new()));
    }

    #[test]
    fn test_kill_session() {
        let store = SessionStore::new();
        let sid = store.put_value("", "name", "chris").unwrap();

        store.kill_session(&sid).unwrap();
        assert_eq!(store.get_value(&sid, "name").unwrap(), None);
        assert_eq!(store.count().unwrap(), 0);

        let sid2 = store.put_value(&sid, "name", "chris").unwrap();
        assert_ne!(sid2, sid);
    }

    #[test]
    fn test_put_fails_when_no_id_can_be_minted() {
        let store = SessionStore::new().with_sid_source(exhausted_sid);

        let result = store.put_value("", "name", "chris");

        assert!(matches!(result, Err(Error::IdentifierMinting(_))));
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_put_live_session_needs_no_new_id() {
        let store = SessionStore::new().with_sid_source(exhausted_sid);
        store.seed("aaa", Utc::now());

        let sid = store.put_value("aaa", "name", "chris").unwrap();

        assert_eq!(sid, "aaa");
        assert_eq!(store.get_value("aaa", "name").unwrap().as_deref(), Some("chris"));
    }

    #[test]
    fn test_count_reports_poisoned_lock() {
        use std::sync::Arc;

        let store = Arc::new(SessionStore::new());
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.sessions.lock().unwrap();
            panic!("poison the store");
        })
        .join();

        assert!(matches!(store.count(), Err(Error::LockPoisoned)));
        assert!(matches!(
            store.put_value("", "k", "v"),
            Err(Error::LockPoisoned)
        ));
    }

    #[test]
    fn test_kill_unknown_is_noop() {
        let store = SessionStore::new();
        store.put_value("", "name", "chris").unwrap();
        store.kill_session("unknown").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_expire_boundary() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.seed("sid1", ago(now, 40 * MINUTE));
        store.seed("sid2", ago(now, 30 * MINUTE));
        store.seed("sid3", ago(now, 20 * MINUTE));

        let removed = store.expire_sessions_at(now).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.atime("sid1").is_none());
        assert!(store.atime("sid2").is_some());
        assert!(store.atime("sid3").is_some());
    }

    #[test]
    fn test_expire_custom_timeout() {
        let store = SessionStore::with_idle_timeout(5 * MINUTE);
        let now = Utc::now();
        store.seed("old", ago(now, 6 * MINUTE));
        store.seed("young", ago(now, 4 * MINUTE));

        assert_eq!(store.expire_sessions().unwrap(), 1);
        assert!(store.atime("young").is_some());
    }

    #[test]
    fn test_touch_advances_atime() {
        let store = SessionStore::new();
        store.seed("aaa", ago(Utc::now(), 10 * MINUTE));
        let before = store.atime("aaa").unwrap();

        store.touch_session("aaa").unwrap();

        assert!(store.atime("aaa").unwrap() > before);
    }

    #[test]
    fn test_touch_rescues_session_from_sweep() {
        let store = SessionStore::new();
        store.seed("aaa", ago(Utc::now(), 31 * MINUTE));
        store.touch_session("aaa").unwrap();

        assert_eq!(store.expire_sessions().unwrap(), 0);
        assert!(store.atime("aaa").is_some());
    }

    #[test]
    fn test_touch_unknown_is_noop() {
        let store = SessionStore::new();
        store.touch_session("unknown").unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_list_sessions() {
        let store = SessionStore::new();
        let sid1 = store.put_value("", "name", "chris").unwrap();
        store.put_value(&sid1, "room", "lobby").unwrap();
        let sid2 = store.put_value("", "name", "bi").unwrap();

        let snapshot = store.list_sessions().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.sessions[&sid1].values["room"], "lobby");
        assert_eq!(snapshot.sessions[&sid2].values["name"], "bi");

        // Snapshot is a copy, later writes don't show up in it
        store.put_value(&sid2, "name", "changed").unwrap();
        assert_eq!(snapshot.sessions[&sid2].values["name"], "bi");
    }

    #[test]
    fn test_listing_format() {
        let store = SessionStore::new();
        let sid = store.put_value("", "name", "chris").unwrap();

        let listing = store.list_sessions().unwrap().to_listing();
        let record = &listing[&sid];
        assert_eq!(record["_sid"], sid);
        assert!(record.contains_key("_atime"));
        assert_eq!(record["name"], "chris");
    }

    #[test]
    fn test_concurrent_put_mints_unique_ids() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(SessionStore::new());
        let mut handles = vec![];

        // Spawn 100 threads that each create a session
        for i in 0..100 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.put_value("", "n", i.to_string()).unwrap()
            }));
        }

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(store.count().unwrap(), 100);
    }

    #[test]
    fn test_concurrent_writes_to_same_session() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(SessionStore::new());
        let sid = store.put_value("", "seed", "0").unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let sid = sid.clone();
                thread::spawn(move || {
                    let got = store.put_value(&sid, format!("k{i}"), "v").unwrap();
                    store.expire_sessions().unwrap();
                    got
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), sid);
        }
        assert_eq!(store.list_sessions().unwrap().sessions[&sid].values.len(), 17);
    }
}
