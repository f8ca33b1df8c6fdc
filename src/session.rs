use crate::config::ClientConfig;
use crate::errors::{backend_message, ClientError};
use crate::models::{LoginCredentials, LoginResponse, RefreshRequest, RefreshResponse, Session, User};
use crate::storage::{clear_session, load_session, persist_session, FileStore, KeyValueStore};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

pub const LOGIN_PATH: &str = "/auth/login/";
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Retries allowed after a refresh; a second 401 is final.
const MAX_RETRIES: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    RefreshInFlight,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug)]
struct Inner {
    state: AuthState,
    session: Option<Session>,
}

impl Inner {
    fn signed_out() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            session: None,
        }
    }
}

pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    inner: Mutex<Inner>,
}

impl SessionManager {
    /// Hydrates from `store`; partial or corrupt stored state is cleared.
    pub async fn init(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let inner = match load_session(store.as_ref()).await {
            Some(session) => {
                info!(user = %session.user.email, "restored stored session");
                Inner {
                    state: AuthState::Authenticated,
                    session: Some(session),
                }
            }
            None => {
                if let Err(err) = clear_session(store.as_ref()).await {
                    error!("failed to clear partial session: {err}");
                }
                Inner::signed_out()
            }
        };

        Self {
            http,
            base_url: base_url.into(),
            store,
            inner: Mutex::new(inner),
        }
    }

    pub async fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let store = Arc::new(FileStore::open(&config.session_path).await);
        Ok(Self::init(config.http_client()?, config.base_url.clone(), store).await)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> AuthState {
        self.lock().state
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().session.as_ref().map(|session| session.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock()
            .session
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Session, ClientError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(credentials)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = backend_message(&body, &["non_field_errors", "email", "password"])
                .unwrap_or_else(|| format!("login rejected with status {status}"));
            warn!(email = %credentials.email, %status, "login failed: {reason}");
            return Err(ClientError::Auth(reason));
        }

        let body = response.text().await?;
        let payload: LoginResponse =
            serde_json::from_str(&body).map_err(|err| ClientError::Decode(err.to_string()))?;

        let session = Session {
            access_token: payload.access,
            refresh_token: Some(payload.refresh),
            user: payload.user,
        };
        persist_session(self.store.as_ref(), &session).await?;

        {
            let mut inner = self.lock();
            inner.session = Some(session.clone());
            inner.state = AuthState::Authenticated;
        }

        info!(user = %session.user.email, role = ?session.user.role, "logged in");
        Ok(session)
    }

    pub async fn logout(&self) {
        let had_session = {
            let mut inner = self.lock();
            let had_session = inner.session.is_some();
            *inner = Inner::signed_out();
            had_session
        };

        if let Err(err) = clear_session(self.store.as_ref()).await {
            error!("failed to clear stored session: {err}");
        }
        if had_session {
            info!("logged out");
        }
    }

    /// Returns `false` and signs out when there is no refresh token or the
    /// backend rejects it.
    pub async fn refresh(&self) -> bool {
        let refresh_token = {
            let mut inner = self.lock();
            let Some(session) = inner.session.as_ref() else {
                return false;
            };
            let token = session.refresh_token.clone();
            if token.is_some() {
                inner.state = AuthState::RefreshInFlight;
            }
            token
        };

        let Some(refresh_token) = refresh_token else {
            warn!("no refresh token held, signing out");
            self.logout().await;
            return false;
        };

        let access = match self.request_refresh(&refresh_token).await {
            Ok(access) => access,
            Err(err) => {
                warn!("token refresh failed: {err}");
                self.logout_if_current(&refresh_token).await;
                return false;
            }
        };

        let session = {
            let mut inner = self.lock();
            // the session may have been replaced while the refresh was in flight
            let Some(session) = inner
                .session
                .as_mut()
                .filter(|session| session.refresh_token.as_deref() == Some(refresh_token.as_str()))
            else {
                return false;
            };
            session.access_token = access;
            let session = session.clone();
            inner.state = AuthState::Authenticated;
            session
        };

        if let Err(err) = persist_session(self.store.as_ref(), &session).await {
            error!("failed to persist refreshed session: {err}");
        }
        info!(user = %session.user.email, "access token refreshed");
        true
    }

    /// Signs out only if the session still holds `refresh_token`.
    async fn logout_if_current(&self, refresh_token: &str) {
        let cleared = {
            let mut inner = self.lock();
            let current = inner
                .session
                .as_ref()
                .is_some_and(|session| session.refresh_token.as_deref() == Some(refresh_token));
            if current {
                *inner = Inner::signed_out();
            }
            current
        };

        if !cleared {
            return;
        }
        if let Err(err) = clear_session(self.store.as_ref()).await {
            error!("failed to clear stored session: {err}");
        }
        info!("logged out after failed refresh");
    }

    /// A 401 on a credentialed first attempt triggers one refresh and at most
    /// one retry. If the refresh fails the original 401 response is returned.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ClientError> {
        let mut attempt = 0;
        loop {
            let (response, credentialed) = self.dispatch(request, attempt).await?;

            if response.status() != StatusCode::UNAUTHORIZED || !credentialed || attempt >= MAX_RETRIES {
                return Ok(response);
            }

            if !self.refresh().await {
                return Ok(response);
            }
            attempt += 1;
        }
    }

    async fn dispatch(&self, request: &ApiRequest, attempt: u8) -> Result<(Response, bool), ClientError> {
        let token = self.access_token();
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, attempt, "dispatching request");
        let response = builder.send().await?;
        Ok((response, token.is_some()))
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = backend_message(&body, &[])
                .unwrap_or_else(|| format!("refresh rejected with status {status}"));
            return Err(ClientError::Auth(reason));
        }

        let body = response.text().await?;
        let payload: RefreshResponse =
            serde_json::from_str(&body).map_err(|err| ClientError::Decode(err.to_string()))?;
        Ok(payload.access)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
