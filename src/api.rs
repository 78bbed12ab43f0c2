use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{multipart, Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://railclub.ru/api/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("railclub: network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("railclub: invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("railclub: not found")]
    NotFound,
    #[error("railclub: not authorized")]
    NotAuthorized,
    #[error("railclub: rejected ({code}): {detail}")]
    Validation { code: String, detail: String },
    #[error("railclub: server error {status}: {detail}")]
    Server { status: String, detail: String },
    #[error("railclub: request cancelled")]
    Cancelled,
}

/// Marks an in-flight request as irrelevant so its result is discarded
/// instead of being surfaced to the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let user_agent = if config.user_agent.trim().is_empty() {
            format!("railclub/{}", crate::VERSION)
        } else {
            config.user_agent
        };
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .cookie_store(true)
                .build()?,
        };

        Ok(Client {
            http,
            user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Shareable link to a profile page on the service host.
    pub fn profile_url(&self, username: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.join("/profile")?;
        url.query_pairs_mut().append_pair("user", username);
        Ok(url)
    }

    pub fn check(&self) -> Result<bool, ApiError> {
        let resp = self.request(Method::GET, "check", &[], None)?;
        Ok(resp.json()?)
    }

    pub fn info(&self, who: Option<&str>) -> Result<InfoResponse, ApiError> {
        let params = match who {
            Some(who) if !who.is_empty() => vec![("who".to_string(), who.to_string())],
            _ => Vec::new(),
        };
        let resp = self.request(Method::GET, "info", &params, None)?;
        Ok(resp.json()?)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let form = multipart::Form::new()
            .text("username", username.to_string())
            .text("password", password.to_string());
        self.request(Method::POST, "login", &[], Some(form))?;
        Ok(())
    }

    pub fn register(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let form = multipart::Form::new()
            .text("username", username.to_string())
            .text("password", password.to_string());
        self.request(Method::POST, "register", &[], Some(form))?;
        Ok(())
    }

    pub fn edit_profile(&self, edit: EditRequest) -> Result<(), ApiError> {
        let mut form = multipart::Form::new()
            .text("nickname", edit.nickname)
            .text("description", edit.description)
            .text("target", edit.target);
        if let Some(photo) = edit.photo {
            form = form.part(
                "photo",
                multipart::Part::bytes(photo.bytes).file_name(photo.file_name),
            );
        }
        if let Some(banner) = edit.banner {
            form = form.part(
                "banner",
                multipart::Part::bytes(banner.bytes).file_name(banner.file_name),
            );
        }
        self.request(Method::POST, "profile/edit", &[], Some(form))?;
        Ok(())
    }

    pub fn vote(&self, to: &str, action: i64) -> Result<(), ApiError> {
        let form = multipart::Form::new()
            .text("to", to.to_string())
            .text("action", action.to_string());
        self.request(Method::POST, "profile/reputation", &[], Some(form))?;
        Ok(())
    }

    pub fn add_comment(&self, to: &str, body: &str) -> Result<(), ApiError> {
        let form = multipart::Form::new()
            .text("body", body.to_string())
            .text("to", to.to_string());
        self.request(Method::POST, "profile/add_comment", &[], Some(form))?;
        Ok(())
    }

    pub fn report_profile(
        &self,
        to: &str,
        reason_id: &str,
        reason_label: &str,
        details: &str,
    ) -> Result<(), ApiError> {
        let form = report_form(reason_id, reason_label, details).text("to", to.to_string());
        self.request(Method::POST, "report/profile", &[], Some(form))?;
        Ok(())
    }

    pub fn report_comment(
        &self,
        author: &str,
        comment_id: i64,
        reason_id: &str,
        reason_label: &str,
        details: &str,
    ) -> Result<(), ApiError> {
        let form = report_form(reason_id, reason_label, details)
            .text("author", author.to_string())
            .text("comment_id", comment_id.to_string());
        self.request(Method::POST, "report/comment", &[], Some(form))?;
        Ok(())
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.request(Method::POST, "logout", &[], None)?;
        Ok(())
    }

    /// Station suggestions for an autocomplete query. Queries shorter than
    /// two characters resolve to an empty list without a network call.
    pub fn stations(
        &self,
        part: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Station>, ApiError> {
        if part.trim().chars().count() < 2 {
            return Ok(Vec::new());
        }
        if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
            return Err(ApiError::Cancelled);
        }
        let params = vec![("part".to_string(), part.to_string())];
        let resp = self.request(Method::GET, "stations", &params, None)?;
        if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
            return Err(ApiError::Cancelled);
        }
        let body: StationsResponse = resp.json()?;
        Ok(body.stations)
    }

    pub fn routes(&self, code_from: &str, code_to: &str) -> Result<RoutesResponse, ApiError> {
        let params = vec![
            ("code_from".to_string(), code_from.to_string()),
            ("code_to".to_string(), code_to.to_string()),
        ];
        let resp = self.request(Method::GET, "routes", &params, None)?;
        Ok(resp.json()?)
    }

    pub fn station_list(
        &self,
        train_num: &str,
        code_from: &str,
        code_to: &str,
    ) -> Result<StopsResponse, ApiError> {
        let params = vec![
            ("train_num".to_string(), train_num.to_string()),
            ("code_from".to_string(), code_from.to_string()),
            ("code_to".to_string(), code_to.to_string()),
        ];
        let resp = self.request(Method::GET, "station_list", &params, None)?;
        Ok(resp.json()?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        form: Option<multipart::Form>,
    ) -> Result<Response, ApiError> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            drop(pairs);
        }

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(form) = form {
            req = req.multipart(form);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            Err(error_from_body(status, &text))
        }
    }
}

fn report_form(reason_id: &str, reason_label: &str, details: &str) -> multipart::Form {
    multipart::Form::new()
        .text("reason_id", reason_id.to_string())
        .text("reason_label", reason_label.to_string())
        .text("details", details.to_string())
}

/// Maps a failed response to the error taxonomy. The backend signals
/// not-found and not-authorized as `{"status":"NF"}` / `{"status":"NA"}`
/// bodies; short status codes on other failures are field-level rejections
/// (`LN`, `LD`, `WR`, ...). Anything unparseable falls back to the
/// transport status text.
fn error_from_body(status: reqwest::StatusCode, text: &str) -> ApiError {
    let body: Option<StatusBody> = serde_json::from_str(text).ok();
    match body {
        Some(body) if body.status == "NA" => ApiError::NotAuthorized,
        Some(body) if body.status == "NF" => ApiError::NotFound,
        Some(body) if !body.status.is_empty() => ApiError::Validation {
            code: body.status,
            detail: body.detail.unwrap_or_default(),
        },
        Some(body) => ApiError::Server {
            status: status.to_string(),
            detail: body.detail.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            }),
        },
        None => match status.as_u16() {
            401 => ApiError::NotAuthorized,
            404 => ApiError::NotFound,
            _ => ApiError::Server {
                status: status.to_string(),
                detail: if text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    text.to_string()
                },
            },
        },
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub can_vote: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub reputation: Reputation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sender: Option<SenderSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SenderSummary {
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Reputation {
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub dislikes: i64,
    #[serde(default, rename = "users")]
    pub voters: Vec<VoteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub username: String,
    pub action: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InfoResponse {
    #[serde(default)]
    pub target_user: Option<Identity>,
    #[serde(default)]
    pub viewer_user: Option<Identity>,
    #[serde(default)]
    pub is_owner: bool,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    pub target: String,
    pub nickname: String,
    pub description: String,
    pub photo: Option<Upload>,
    pub banner: Option<Upload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    pub station: String,
    pub code: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<Station>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RouteInfo {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Train {
    pub number: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub ts_dep: String,
    #[serde(default)]
    pub ts_arr: String,
    #[serde(default)]
    pub is_express: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RoutesResponse {
    #[serde(default)]
    pub info: RouteInfo,
    #[serde(default)]
    pub trains: Vec<Train>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub ts_arr: String,
    #[serde(default)]
    pub ts_dep: String,
    #[serde(default)]
    pub stop_min: i64,
    #[serde(default)]
    pub is_target: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StopsResponse {
    #[serde(default)]
    pub train: String,
    #[serde(default)]
    pub stops: Vec<Stop>,
}
