use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::{Cookie, CookieJar, Key, SameSite};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// The number of random bytes in a session id.
const SESSION_ID_BYTES: usize = 24;

/// The number of random bytes in a CSRF token.
const CSRF_TOKEN_BYTES: usize = 32;

type Sessions = Arc<DashMap<String, SessionData>>;

/// Server-side sessions keyed by a random id that travels in a signed
/// cookie.
///
/// The store lives in memory for the lifetime of the process. Sessions do
/// not expire.
///
pub struct SessionStore {
    key: Key,
    cookie_name: String,
    sessions: Sessions,
}

/// A handle to one session in a [`SessionStore`].
///
/// Every read and write goes through the store, so handles to the same
/// session observe each other's changes.
///
#[derive(Clone)]
pub struct Session {
    id: Arc<str>,
    csrf_token: Arc<str>,
    sessions: Sessions,
}

#[derive(Debug)]
struct SessionData {
    values: Map<String, Value>,
    csrf_token: Arc<str>,
}

impl SessionStore {
    /// Returns a store that signs cookies with a key derived from `secret`.
    /// Secrets of any length are accepted.
    ///
    pub fn new(secret: &str, cookie_name: impl Into<String>) -> Self {
        let digest = Sha512::digest(secret.as_bytes());

        Self {
            key: Key::from(digest.as_slice()),
            cookie_name: cookie_name.into(),
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Returns the session named by the signed session cookie in `cookies`.
    /// When the cookie is missing, fails verification, or names a session
    /// that does not exist, a new session is created and the returned flag is
    /// `true`.
    ///
    pub fn load(&self, cookies: &CookieJar) -> (Session, bool) {
        if let Some(cookie) = cookies.get(&self.cookie_name) {
            match cookies.signed(&self.key).get(&self.cookie_name) {
                Some(verified) => {
                    if let Some(session) = self.find(verified.value()) {
                        return (session, false);
                    }

                    tracing::debug!("session cookie names an unknown session");
                }
                None => {
                    tracing::debug!(
                        cookie = cookie.name(),
                        "session cookie failed signature verification",
                    );
                }
            }
        }

        (self.create(), true)
    }

    /// Adds a signed cookie that carries the id of `session` to `jar`.
    ///
    pub fn issue(&self, session: &Session, jar: &mut CookieJar) {
        let cookie = Cookie::build((self.cookie_name.clone(), session.id().to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);

        jar.signed_mut(&self.key).add(cookie);
    }

    /// Returns the number of live sessions.
    ///
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn find(&self, id: &str) -> Option<Session> {
        let entry = self.sessions.get(id)?;

        Some(Session {
            id: Arc::from(id),
            csrf_token: Arc::clone(&entry.csrf_token),
            sessions: Arc::clone(&self.sessions),
        })
    }

    fn create(&self) -> Session {
        let csrf_token: Arc<str> = random_token(CSRF_TOKEN_BYTES).into();

        loop {
            let id = random_token(SESSION_ID_BYTES);

            // Insert under the entry lock so a colliding id is never
            // overwritten.
            if let Entry::Vacant(vacant) = self.sessions.entry(id.clone()) {
                vacant.insert(SessionData {
                    values: Map::new(),
                    csrf_token: Arc::clone(&csrf_token),
                });

                return Session {
                    id: id.into(),
                    csrf_token,
                    sessions: Arc::clone(&self.sessions),
                };
            }
        }
    }
}

impl Debug for SessionStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("cookie_name", &self.cookie_name)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the CSRF token of the session. The token is generated when the
    /// session is created and never changes.
    ///
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Returns a copy of the value stored under `key`.
    ///
    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = self.sessions.get(&*self.id)?;
        entry.values.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.sessions
            .get(&*self.id)
            .is_some_and(|entry| entry.values.contains_key(key))
    }

    /// Stores `value` under `key` and returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    ///
    pub fn insert<T>(&self, key: impl Into<String>, value: T) -> Result<Option<Value>, serde_json::Error>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value)?;
        Ok(self.update(|values| values.insert(key.into(), value)))
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.update(|values| values.remove(key))
    }

    /// Removes every value from the session. The id and CSRF token are kept.
    ///
    pub fn clear(&self) {
        self.update(Map::clear);
    }

    /// Runs `f` with exclusive access to the session's values.
    ///
    /// Concurrent requests that share the session are serialized for the
    /// duration of `f`, which makes read-modify-write sequences atomic.
    ///
    /// `f` runs while a write lock on part of the store is held. It must not
    /// call methods of this or any other [`Session`], or it may deadlock.
    /// Read what you need before calling `update` or from the map passed to
    /// `f`.
    ///
    /// ```
    /// # use cookie::CookieJar;
    /// # use mallo::SessionStore;
    /// # let store = SessionStore::new("secret", "session");
    /// # let (session, _) = store.load(&CookieJar::new());
    /// let visits = session.update(|values| {
    ///     let next = values.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
    ///     values.insert("visits".to_owned(), next.into());
    ///     next
    /// });
    ///
    /// assert_eq!(visits, 1);
    /// ```
    ///
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Map<String, Value>) -> R,
    {
        let mut entry = self
            .sessions
            .entry(self.id.to_string())
            .or_insert_with(|| SessionData {
                values: Map::new(),
                csrf_token: Arc::clone(&self.csrf_token),
            });

        f(&mut entry.values)
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];

    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use cookie::{Cookie, CookieJar};
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    use super::SessionStore;

    fn request_jar(response_jar: &CookieJar) -> CookieJar {
        let mut jar = CookieJar::new();

        for cookie in response_jar.delta() {
            jar.add_original(Cookie::new(
                cookie.name().to_owned(),
                cookie.value().to_owned(),
            ));
        }

        jar
    }

    #[test]
    fn creates_a_session_without_a_cookie() {
        let store = SessionStore::new("secret", "mallo_session");
        let (session, created) = store.load(&CookieJar::new());

        assert!(created);
        assert_eq!(store.len(), 1);
        assert_eq!(session.id().len(), 32);
        assert_eq!(session.csrf_token().len(), 43);
    }

    #[test]
    fn issued_cookie_round_trips() {
        let store = SessionStore::new("secret", "mallo_session");
        let (session, _) = store.load(&CookieJar::new());
        let mut response = CookieJar::new();

        store.issue(&session, &mut response);

        let cookie = response.delta().next().unwrap();
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_ne!(cookie.value(), session.id());

        let (loaded, created) = store.load(&request_jar(&response));

        assert!(!created);
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.csrf_token(), session.csrf_token());
    }

    #[test]
    fn tampered_cookie_starts_over() {
        let store = SessionStore::new("secret", "mallo_session");
        let (session, _) = store.load(&CookieJar::new());

        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new("mallo_session", session.id().to_owned()));

        let (other, created) = store.load(&jar);

        assert!(created);
        assert_ne!(other.id(), session.id());
    }

    #[test]
    fn cookie_from_another_secret_is_rejected() {
        let store = SessionStore::new("secret", "mallo_session");
        let other = SessionStore::new("another secret", "mallo_session");
        let (session, _) = other.load(&CookieJar::new());
        let mut response = CookieJar::new();

        other.issue(&session, &mut response);

        let (_, created) = store.load(&request_jar(&response));
        assert!(created);
    }

    #[test]
    fn values_are_shared_between_handles() {
        let store = SessionStore::new("secret", "mallo_session");
        let (session, _) = store.load(&CookieJar::new());
        let alias = session.clone();

        session.insert("user", json!({ "id": 7 })).unwrap();

        assert_eq!(alias.get("user"), Some(json!({ "id": 7 })));
        assert_eq!(alias.remove("user"), Some(json!({ "id": 7 })));
        assert!(!session.contains_key("user"));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(SessionStore::new("secret", "mallo_session"));
        let (session, _) = store.load(&CookieJar::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();

                thread::spawn(move || {
                    for _ in 0..100 {
                        session.update(|values| {
                            let count = values.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
                            values.insert("count".to_owned(), json!(count + 1));
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(session.get("count"), Some(json!(800)));
    }

    #[test]
    fn reads_do_not_take_the_write_lock() {
        let store = SessionStore::new("secret", "mallo_session");
        let (session, _) = store.load(&CookieJar::new());

        session.insert("theme", "dark").unwrap();

        let reader = session.clone();
        let held = session.sessions.get(session.id()).unwrap();

        // Reads share the shard with an outstanding read guard.
        assert_eq!(reader.get("theme"), Some(json!("dark")));
        assert!(reader.contains_key("theme"));
        assert!(!reader.contains_key("missing"));

        drop(held);
    }
}
