use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::Identity;
use crate::data::AuthService;

/// Process-wide session state. Constructed once at startup and shared by
/// every consumer through `Arc`, so all readers observe the same identity
/// transitions. Identity changes only through `refresh()` and `logout()`.
pub struct Manager {
    auth: Arc<dyn AuthService>,
    identity: RwLock<Option<Identity>>,
    loading: AtomicBool,
}

impl Manager {
    pub fn new(auth: Arc<dyn AuthService>) -> Arc<Self> {
        Arc::new(Self {
            auth,
            identity: RwLock::new(None),
            loading: AtomicBool::new(false),
        })
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    pub fn username(&self) -> Option<String> {
        self.identity.read().as_ref().map(|id| id.username.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Re-derives the viewer identity from the backend: auth check first,
    /// then the profile-info endpoint. Fails closed: any failure on either
    /// leg, an unauthorized answer, or a missing body clears the identity
    /// rather than leaving a stale one behind.
    pub fn refresh(&self) {
        self.loading.store(true, Ordering::SeqCst);
        let identity = self.fetch_identity();
        *self.identity.write() = identity;
        self.loading.store(false, Ordering::SeqCst);
    }

    /// Clears the cached identity. Local only: ending the server session is
    /// the caller's responsibility.
    pub fn logout(&self) {
        *self.identity.write() = None;
    }

    fn fetch_identity(&self) -> Option<Identity> {
        match self.auth.check() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                log::warn!("session: auth check failed: {err}");
                return None;
            }
        }
        match self.auth.me() {
            Ok(identity) => identity,
            Err(err) => {
                log::warn!("session: identity fetch failed: {err}");
                None
            }
        }
    }
}
