use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::api::{ApiError, Comment, EditRequest, Identity, InfoResponse, Upload};
use crate::data::ProfileService;
use crate::session;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Profile,
}

/// Seam to the page router. The controller only ever asks for a view
/// change; actual navigation lives outside this crate.
pub trait Navigator: Send + Sync {
    fn replace(&self, route: Route);
}

/// Navigator for contexts without a router, such as one-shot CLI commands.
#[derive(Default)]
pub struct NullNavigator;

impl Navigator for NullNavigator {
    fn replace(&self, _route: Route) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Loading,
    NotFound,
    NotAuthorized,
    Loaded,
    ConnectionError,
}

impl Status {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Status::NotFound => Some("Пользователь не найден"),
            Status::NotAuthorized => Some("Необходима авторизация"),
            Status::ConnectionError => Some("Ошибка соединения"),
            Status::Loading | Status::Loaded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Profile,
    Comment,
}

/// Lives only while the report modal is open; submit or cancel destroys it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDraft {
    pub kind: ReportKind,
    pub target_username: String,
    pub comment_id: Option<i64>,
    pub comment_index: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ReportSubmission {
    pub reason_id: String,
    pub reason_label: String,
    pub details: String,
}

pub struct ReportReason {
    pub id: &'static str,
    pub label: &'static str,
}

pub static REPORT_REASONS: Lazy<Vec<ReportReason>> = Lazy::new(|| {
    vec![
        ReportReason {
            id: "spam",
            label: "Спам или реклама",
        },
        ReportReason {
            id: "abuse",
            label: "Оскорбления",
        },
        ReportReason {
            id: "impersonation",
            label: "Выдаёт себя за другого",
        },
        ReportReason {
            id: "other",
            label: "Другое",
        },
    ]
});

/// At most one modal at a time by construction. The report draft is part of
/// the variant, so it cannot outlive its modal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Modal {
    #[default]
    None,
    Edit,
    Report(ReportDraft),
}

#[derive(Debug, Clone, Default)]
pub struct EditForm {
    pub nickname: String,
    pub description: String,
    pub photo: Option<Upload>,
    pub banner: Option<Upload>,
    pub photo_url: String,
    pub banner_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NicknameTooLong,
    DescriptionTooLong,
    ReportAccepted,
    Server(String),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::NicknameTooLong => "Ник слишком длинный :/".to_string(),
            Notice::DescriptionTooLong => {
                "Вот это описание у тебя во 👍 \nНо оно слишком длинное ☹️".to_string()
            }
            Notice::ReportAccepted => "Жалоба отправлена. Спасибо за обращение!".to_string(),
            Notice::Server(detail) => detail.clone(),
        }
    }
}

struct Ticker {
    stop: Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// View-state controller for a profile page. Composes the profile service
/// with the shared session manager; every mutating action re-fetches the
/// whole profile afterwards so the server stays authoritative.
pub struct Controller {
    service: Arc<dyn ProfileService>,
    session: Arc<session::Manager>,
    navigator: Arc<dyn Navigator>,
    target: RwLock<Option<String>>,
    status: RwLock<Status>,
    user: RwLock<Option<Identity>>,
    viewer: RwLock<Option<Identity>>,
    form: Mutex<EditForm>,
    modal: Mutex<Modal>,
    busy: AtomicBool,
    voting: AtomicBool,
    // Serializes mutating actions together with their follow-up reload.
    actions: Mutex<()>,
    notices: Mutex<Vec<Notice>>,
    now_ms: Arc<AtomicI64>,
    ticker: Mutex<Option<Ticker>>,
}

impl Controller {
    pub fn new(
        service: Arc<dyn ProfileService>,
        session: Arc<session::Manager>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            service,
            session,
            navigator,
            target: RwLock::new(None),
            status: RwLock::new(Status::Loading),
            user: RwLock::new(None),
            viewer: RwLock::new(None),
            form: Mutex::new(EditForm::default()),
            modal: Mutex::new(Modal::None),
            busy: AtomicBool::new(false),
            voting: AtomicBool::new(false),
            actions: Mutex::new(()),
            notices: Mutex::new(Vec::new()),
            now_ms: Arc::new(AtomicI64::new(0)),
            ticker: Mutex::new(None),
        }
    }

    /// Sets the target username from the navigation context. Empty means
    /// "the viewer's own profile".
    pub fn set_target(&self, who: Option<&str>) {
        *self.target.write() = who.filter(|w| !w.is_empty()).map(String::from);
    }

    pub fn target(&self) -> Option<String> {
        self.target.read().clone()
    }

    pub fn status(&self) -> Status {
        *self.status.read()
    }

    pub fn user(&self) -> Option<Identity> {
        self.user.read().clone()
    }

    pub fn viewer(&self) -> Option<Identity> {
        self.viewer.read().clone()
    }

    pub fn form(&self) -> EditForm {
        self.form.lock().clone()
    }

    pub fn update_form(&self, apply: impl FnOnce(&mut EditForm)) {
        apply(&mut self.form.lock());
    }

    pub fn modal(&self) -> Modal {
        self.modal.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_voting(&self) -> bool {
        self.voting.load(Ordering::SeqCst)
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }

    pub fn is_owner(&self) -> bool {
        self.user.read().as_ref().map_or(false, |u| u.is_owner)
    }

    pub fn can_vote(&self) -> bool {
        self.user.read().as_ref().map_or(false, |u| u.can_vote)
    }

    /// The viewer's recorded vote on the loaded profile, if any.
    pub fn my_vote(&self) -> Option<i64> {
        let viewer = self.viewer.read().as_ref()?.username.clone();
        self.user
            .read()
            .as_ref()?
            .reputation
            .voters
            .iter()
            .find(|v| v.username == viewer)
            .map(|v| v.action)
    }

    /// Loads the targeted profile and resolves the controller status.
    ///
    /// Not-found without a target means the viewer has no session to derive
    /// a "self" profile from, so the login view takes over and the status
    /// stays at `Loading` with no error surfaced.
    pub fn load(&self) -> Status {
        *self.status.write() = Status::Loading;
        let who = self.target.read().clone();
        let status = match self.service.info(who.as_deref()) {
            Ok(info) => match info.target_user {
                Some(_) => self.apply_info(info),
                None => self.handle_not_found(who.is_none()),
            },
            Err(ApiError::NotFound) => self.handle_not_found(who.is_none()),
            Err(ApiError::NotAuthorized) => {
                // Resync the global auth state; the local status drives the view.
                self.session.refresh();
                Status::NotAuthorized
            }
            Err(err) => {
                log::warn!("profile load failed: {err}");
                Status::ConnectionError
            }
        };
        *self.status.write() = status;
        status
    }

    fn handle_not_found(&self, self_profile: bool) -> Status {
        if self_profile {
            self.navigator.replace(Route::Login);
            return Status::Loading;
        }
        *self.user.write() = None;
        *self.viewer.write() = None;
        Status::NotFound
    }

    fn apply_info(&self, info: InfoResponse) -> Status {
        let mut target = info.target_user.unwrap_or_default();
        target.is_owner = info.is_owner;
        for (index, comment) in target.comments.iter_mut().enumerate() {
            comment.index = index as i64;
        }

        if info.is_owner {
            *self.form.lock() = EditForm {
                nickname: target.nickname.clone(),
                description: target.description.clone().unwrap_or_default(),
                photo: None,
                banner: None,
                photo_url: target.photo.clone().unwrap_or_default(),
                banner_url: target.banner.clone().unwrap_or_default(),
            };
        }

        *self.user.write() = Some(target);
        *self.viewer.write() = info.viewer_user;
        Status::Loaded
    }

    /// Posts the edit form and reloads. Validation rejections map to their
    /// dedicated notices; anything else surfaces the server's own message.
    pub fn save(&self) -> Result<(), ApiError> {
        let Some(user) = self.user.read().clone() else {
            return Ok(());
        };
        let _guard = self.actions.lock();
        self.busy.store(true, Ordering::SeqCst);

        let form = self.form.lock().clone();
        let edit = EditRequest {
            target: user.username,
            nickname: form.nickname,
            description: form.description,
            photo: form.photo,
            banner: form.banner,
        };
        let result = self.service.save(edit);
        match &result {
            Ok(()) => {
                *self.modal.lock() = Modal::None;
                self.load();
                // The viewer may have renamed themselves.
                self.session.refresh();
            }
            Err(ApiError::Validation { code, .. }) if code == "LN" => {
                self.push_notice(Notice::NicknameTooLong);
            }
            Err(ApiError::Validation { code, .. }) if code == "LD" => {
                self.push_notice(Notice::DescriptionTooLong);
            }
            Err(err) => self.push_notice(Notice::Server(server_message(err))),
        }

        self.busy.store(false, Ordering::SeqCst);
        result
    }

    /// Casts a reputation vote. Silently ignored when the viewer is not
    /// eligible or nothing is loaded; reloads on completion either way.
    pub fn vote(&self, action: i64) -> Result<(), ApiError> {
        if !self.can_vote() {
            return Ok(());
        }
        let Some(user) = self.user.read().clone() else {
            return Ok(());
        };
        let _guard = self.actions.lock();
        self.voting.store(true, Ordering::SeqCst);

        let result = self.service.vote(&user.username, action);
        if let Err(err) = &result {
            self.push_notice(Notice::Server(server_message(err)));
        }
        self.load();

        self.voting.store(false, Ordering::SeqCst);
        result
    }

    /// Returns true when the comment was posted and the profile reloaded.
    pub fn send_comment(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(user) = self.user.read().clone() else {
            return false;
        };
        let _guard = self.actions.lock();
        self.busy.store(true, Ordering::SeqCst);

        let posted = match self.service.add_comment(&user.username, text) {
            Ok(()) => {
                self.load();
                true
            }
            Err(err) => {
                self.push_notice(Notice::Server(server_message(&err)));
                false
            }
        };

        self.busy.store(false, Ordering::SeqCst);
        posted
    }

    pub fn open_edit(&self) {
        if !self.is_owner() {
            return;
        }
        *self.modal.lock() = Modal::Edit;
    }

    /// Opens the report modal for the loaded profile. Self-reports are
    /// silently refused.
    pub fn open_profile_report(&self) {
        if self.is_owner() {
            return;
        }
        let Some(user) = self.user.read().clone() else {
            return;
        };
        *self.modal.lock() = Modal::Report(ReportDraft {
            kind: ReportKind::Profile,
            target_username: user.username,
            comment_id: None,
            comment_index: None,
        });
    }

    /// Opens the report modal for a comment. The profile owner is recorded
    /// as the accused party alongside the comment's id and position.
    pub fn open_comment_report(&self, comment: &Comment) {
        let Some(user) = self.user.read().clone() else {
            return;
        };
        *self.modal.lock() = Modal::Report(ReportDraft {
            kind: ReportKind::Comment,
            target_username: user.username,
            comment_id: Some(comment.id),
            comment_index: Some(comment.index),
        });
    }

    pub fn close_modal(&self) {
        *self.modal.lock() = Modal::None;
    }

    /// Submits the open report draft. No-op without a selected reason. On
    /// failure the modal stays open so the draft can be corrected.
    pub fn send_report(&self, submission: &ReportSubmission) -> Result<(), ApiError> {
        if submission.reason_id.is_empty() {
            return Ok(());
        }
        let draft = match &*self.modal.lock() {
            Modal::Report(draft) => draft.clone(),
            _ => return Ok(()),
        };
        let _guard = self.actions.lock();
        self.busy.store(true, Ordering::SeqCst);

        let result = match draft.kind {
            ReportKind::Profile => self.service.report_profile(
                &draft.target_username,
                &submission.reason_id,
                &submission.reason_label,
                &submission.details,
            ),
            ReportKind::Comment => self.service.report_comment(
                &draft.target_username,
                draft.comment_id.unwrap_or_default(),
                &submission.reason_id,
                &submission.reason_label,
                &submission.details,
            ),
        };
        match &result {
            Ok(()) => {
                *self.modal.lock() = Modal::None;
                self.push_notice(Notice::ReportAccepted);
            }
            Err(err) => self.push_notice(Notice::Server(server_message(err))),
        }

        self.busy.store(false, Ordering::SeqCst);
        result
    }

    /// Ends the session: best-effort server logout, then back to the login
    /// view with the shared session resynced.
    pub fn logout(&self) {
        if let Err(err) = self.service.logout() {
            log::debug!("logout request failed: {err}");
        }
        self.navigator.replace(Route::Login);
        self.session.refresh();
    }

    /// Monotonic "now" updated by the ticker, for relative timestamps.
    pub fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    /// Starts the 1 Hz ticker behind relative-time rendering. Idempotent.
    pub fn activate(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let now_ms = Arc::clone(&self.now_ms);
        now_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::spawn(move || loop {
            match stop_rx.recv_timeout(TICK_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {
                    now_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
                }
                _ => break,
            }
        });
        *ticker = Some(Ticker {
            stop: stop_tx,
            thread,
        });
    }

    /// Stops the ticker. Must run before the controller goes away or the
    /// recurring timer leaks; `Drop` calls it as a backstop.
    pub fn deactivate(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            let _ = ticker.stop.send(());
            let _ = ticker.thread.join();
        }
    }

    fn push_notice(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// User-facing text for a failed action, preferring what the server said.
fn server_message(err: &ApiError) -> String {
    match err {
        ApiError::Validation { code, detail } => {
            if detail.is_empty() {
                code.clone()
            } else {
                detail.clone()
            }
        }
        ApiError::Server { detail, .. } => detail.clone(),
        other => other.to_string(),
    }
}
