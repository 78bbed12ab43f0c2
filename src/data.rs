use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::api::{self, ApiError, CancelToken, EditRequest, Identity, InfoResponse, Station};

pub trait AuthService: Send + Sync {
    fn check(&self) -> Result<bool, ApiError>;
    fn me(&self) -> Result<Option<Identity>, ApiError>;
}

pub trait ProfileService: Send + Sync {
    fn info(&self, who: Option<&str>) -> Result<InfoResponse, ApiError>;
    fn save(&self, edit: EditRequest) -> Result<(), ApiError>;
    fn vote(&self, to: &str, action: i64) -> Result<(), ApiError>;
    fn add_comment(&self, to: &str, body: &str) -> Result<(), ApiError>;
    fn report_profile(
        &self,
        to: &str,
        reason_id: &str,
        reason_label: &str,
        details: &str,
    ) -> Result<(), ApiError>;
    fn report_comment(
        &self,
        author: &str,
        comment_id: i64,
        reason_id: &str,
        reason_label: &str,
        details: &str,
    ) -> Result<(), ApiError>;
    fn logout(&self) -> Result<(), ApiError>;
}

pub trait StationService: Send + Sync {
    fn suggest(&self, part: &str, cancel: &CancelToken) -> Result<Vec<Station>, ApiError>;
}

pub struct HttpAuthService {
    client: Arc<api::Client>,
}

impl HttpAuthService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl AuthService for HttpAuthService {
    fn check(&self) -> Result<bool, ApiError> {
        self.client.check()
    }

    fn me(&self) -> Result<Option<Identity>, ApiError> {
        let info = self.client.info(None)?;
        Ok(info.target_user)
    }
}

pub struct HttpProfileService {
    client: Arc<api::Client>,
}

impl HttpProfileService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ProfileService for HttpProfileService {
    fn info(&self, who: Option<&str>) -> Result<InfoResponse, ApiError> {
        self.client.info(who)
    }

    fn save(&self, edit: EditRequest) -> Result<(), ApiError> {
        self.client.edit_profile(edit)
    }

    fn vote(&self, to: &str, action: i64) -> Result<(), ApiError> {
        self.client.vote(to, action)
    }

    fn add_comment(&self, to: &str, body: &str) -> Result<(), ApiError> {
        self.client.add_comment(to, body)
    }

    fn report_profile(
        &self,
        to: &str,
        reason_id: &str,
        reason_label: &str,
        details: &str,
    ) -> Result<(), ApiError> {
        self.client
            .report_profile(to, reason_id, reason_label, details)
    }

    fn report_comment(
        &self,
        author: &str,
        comment_id: i64,
        reason_id: &str,
        reason_label: &str,
        details: &str,
    ) -> Result<(), ApiError> {
        self.client
            .report_comment(author, comment_id, reason_id, reason_label, details)
    }

    fn logout(&self) -> Result<(), ApiError> {
        self.client.logout()
    }
}

pub struct HttpStationService {
    client: Arc<api::Client>,
}

impl HttpStationService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl StationService for HttpStationService {
    fn suggest(&self, part: &str, cancel: &CancelToken) -> Result<Vec<Station>, ApiError> {
        self.client.stations(part, Some(cancel))
    }
}

#[derive(Default)]
pub struct MockAuthService {
    pub authorized: AtomicBool,
    pub identity: Mutex<Option<Identity>>,
    pub fail_check: AtomicBool,
    pub fail_me: AtomicBool,
    pub checks: AtomicUsize,
}

impl AuthService for MockAuthService {
    fn check(&self) -> Result<bool, ApiError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(ApiError::Server {
                status: "503 Service Unavailable".into(),
                detail: "mock outage".into(),
            });
        }
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    fn me(&self) -> Result<Option<Identity>, ApiError> {
        if self.fail_me.load(Ordering::SeqCst) {
            return Err(ApiError::NotAuthorized);
        }
        Ok(self.identity.lock().clone())
    }
}

#[derive(Default)]
pub struct MockProfileService {
    pub info_queue: Mutex<VecDeque<Result<InfoResponse, ApiError>>>,
    pub default_info: Mutex<Option<InfoResponse>>,
    pub save_errors: Mutex<VecDeque<ApiError>>,
    pub action_errors: Mutex<VecDeque<ApiError>>,
    pub saves: Mutex<Vec<EditRequest>>,
    pub votes: Mutex<Vec<(String, i64)>>,
    pub comments: Mutex<Vec<(String, String)>>,
    pub profile_reports: Mutex<Vec<(String, String)>>,
    pub comment_reports: Mutex<Vec<(String, i64, String)>>,
    pub info_calls: AtomicUsize,
    pub logouts: AtomicUsize,
    pub fail_logout: AtomicBool,
    /// Call-order trace across info and mutation endpoints.
    pub events: Mutex<Vec<&'static str>>,
    /// Sleep applied inside mutations, to widen race windows in tests.
    pub action_latency: Mutex<Option<Duration>>,
}

impl MockProfileService {
    fn mutation_delay(&self) {
        if let Some(latency) = *self.action_latency.lock() {
            std::thread::sleep(latency);
        }
    }
}

impl ProfileService for MockProfileService {
    fn info(&self, _who: Option<&str>) -> Result<InfoResponse, ApiError> {
        self.events.lock().push("info");
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.info_queue.lock().pop_front() {
            return scripted;
        }
        match self.default_info.lock().clone() {
            Some(info) => Ok(info),
            None => Err(ApiError::NotFound),
        }
    }

    fn save(&self, edit: EditRequest) -> Result<(), ApiError> {
        self.events.lock().push("save");
        self.mutation_delay();
        if let Some(err) = self.save_errors.lock().pop_front() {
            return Err(err);
        }
        self.saves.lock().push(edit);
        Ok(())
    }

    fn vote(&self, to: &str, action: i64) -> Result<(), ApiError> {
        self.events.lock().push("vote");
        self.mutation_delay();
        if let Some(err) = self.action_errors.lock().pop_front() {
            return Err(err);
        }
        self.votes.lock().push((to.to_string(), action));
        Ok(())
    }

    fn add_comment(&self, to: &str, body: &str) -> Result<(), ApiError> {
        self.events.lock().push("comment");
        self.mutation_delay();
        if let Some(err) = self.action_errors.lock().pop_front() {
            return Err(err);
        }
        self.comments
            .lock()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }

    fn report_profile(
        &self,
        to: &str,
        reason_id: &str,
        _reason_label: &str,
        _details: &str,
    ) -> Result<(), ApiError> {
        if let Some(err) = self.action_errors.lock().pop_front() {
            return Err(err);
        }
        self.profile_reports
            .lock()
            .push((to.to_string(), reason_id.to_string()));
        Ok(())
    }

    fn report_comment(
        &self,
        author: &str,
        comment_id: i64,
        reason_id: &str,
        _reason_label: &str,
        _details: &str,
    ) -> Result<(), ApiError> {
        if let Some(err) = self.action_errors.lock().pop_front() {
            return Err(err);
        }
        self.comment_reports
            .lock()
            .push((author.to_string(), comment_id, reason_id.to_string()));
        Ok(())
    }

    fn logout(&self) -> Result<(), ApiError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ApiError::Server {
                status: "500 Internal Server Error".into(),
                detail: "mock logout failure".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockStationService {
    pub responses: Mutex<HashMap<String, Vec<Station>>>,
    pub calls: Mutex<Vec<String>>,
    pub latency: Mutex<Option<Duration>>,
    pub fail: AtomicBool,
}

impl MockStationService {
    pub fn respond_with(&self, part: &str, stations: Vec<Station>) {
        self.responses.lock().insert(part.to_string(), stations);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl StationService for MockStationService {
    fn suggest(&self, part: &str, cancel: &CancelToken) -> Result<Vec<Station>, ApiError> {
        self.calls.lock().push(part.to_string());
        if let Some(latency) = *self.latency.lock() {
            std::thread::sleep(latency);
        }
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Server {
                status: "502 Bad Gateway".into(),
                detail: "mock upstream failure".into(),
            });
        }
        Ok(self.responses.lock().get(part).cloned().unwrap_or_default())
    }
}
