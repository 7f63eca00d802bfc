//! HTTP agent answering scan / get / teardown for its own folders

use super::protocol::{
    ErrorBody, GetRequest, GetResponse, ScanRequest, ScanResponse, TeardownRequest,
    TeardownResponse, GET_PATH, SCAN_PATH, TEARDOWN_PATH,
};
use crate::config::Settings;
use crate::provider::ProviderSet;
use crate::scan::ScanCoordinator;
use crate::store::{open_store, FileStore};
use crate::types::{ScanTask, SyncError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Failures reported to the coordinator as `{ "error": ... }`
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unknown or expired session {0}")]
    StaleSession(Uuid),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Agent worker failed: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AgentError::StaleSession(_) => StatusCode::CONFLICT,
            AgentError::Sync(e) if e.is_validation_error() => StatusCode::BAD_REQUEST,
            AgentError::Sync(_) | AgentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AgentError {
    fn from(rejection: JsonRejection) -> Self {
        AgentError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Agent request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Agent request rejected");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Store, providers and the single live session, guarded together
struct AgentSession {
    store: Box<dyn FileStore>,
    providers: ProviderSet,
    current: Option<Uuid>,
}

/// Shared agent state; one scan session is live at a time
#[derive(Clone)]
pub struct AgentState {
    settings: Arc<Settings>,
    session: Arc<Mutex<AgentSession>>,
}

impl AgentState {
    /// Open the configured store and build a local-only provider set
    pub fn new(settings: Settings) -> Result<Self, SyncError> {
        let mut store = open_store(settings.storage, &settings.database, settings.command_timeout())?;
        store.initialize()?;
        Ok(Self::with_store(settings, store))
    }

    pub fn with_store(settings: Settings, store: Box<dyn FileStore>) -> Self {
        let providers = ProviderSet::local(&settings);
        Self {
            settings: Arc::new(settings),
            session: Arc::new(Mutex::new(AgentSession {
                store,
                providers,
                current: None,
            })),
        }
    }

    /// Session id of the scan currently held, if any
    pub fn active_session(&self) -> Option<Uuid> {
        self.lock().ok().and_then(|guard| guard.current)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AgentSession>, AgentError> {
        self.session
            .lock()
            .map_err(|_| AgentError::Internal("agent state lock poisoned".to_string()))
    }

    fn scan(&self, request: ScanRequest) -> Result<ScanResponse, AgentError> {
        let task = ScanTask::new(
            request.root_folder,
            request.patterns,
            request.rule,
            request.limits,
            request.mode,
            request.use_journal,
        )?;

        let mut guard = self.lock()?;
        let session = &mut *guard;
        if let Some(previous) = session.current.take() {
            info!(session = %previous, "Replacing unreleased session");
        }
        session.store.initialize()?;

        let file_count = ScanCoordinator::new(
            session.store.as_mut(),
            &mut session.providers,
            self.settings.file_batch_size,
            self.settings.operation_delay(),
        )
        .scan(&task)?;

        let id = Uuid::new_v4();
        session.current = Some(id);
        info!(session = %id, root = %task.root, mode = %task.mode, files = file_count, "Agent scan finished");
        Ok(ScanResponse {
            file_count,
            session: id,
        })
    }

    fn page(&self, request: GetRequest) -> Result<GetResponse, AgentError> {
        if request.size == 0 {
            return Err(AgentError::BadRequest("page size must be at least 1".to_string()));
        }
        let offset = request
            .page
            .checked_mul(u64::from(request.size))
            .ok_or_else(|| AgentError::BadRequest(format!("page {} is out of range", request.page)))?;

        let guard = self.lock()?;
        if guard.current != Some(request.session) {
            return Err(AgentError::StaleSession(request.session));
        }
        let files = guard
            .store
            .records_page(request.mode.file_set(), offset, request.size as usize)?;
        Ok(GetResponse { files })
    }

    fn release(&self, request: TeardownRequest) -> Result<TeardownResponse, AgentError> {
        let mut guard = self.lock()?;
        if guard.current != Some(request.session) {
            // Already released, or replaced by a newer scan
            return Ok(TeardownResponse { released: false });
        }
        guard.store.teardown()?;
        guard.store.initialize()?;
        guard.current = None;
        info!(session = %request.session, folder = %request.folder, "Agent session released");
        Ok(TeardownResponse { released: true })
    }
}

/// Run blocking store work off the async workers
async fn blocking<T, F>(state: AgentState, work: F) -> Result<Json<T>, AgentError>
where
    T: Send + 'static,
    F: FnOnce(&AgentState) -> Result<T, AgentError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| AgentError::Internal(e.to_string()))?
        .map(Json)
}

async fn banner() -> String {
    format!("journsync agent {}", crate::VERSION)
}

async fn scan_handler(
    State(state): State<AgentState>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>, AgentError> {
    let Json(request) = body?;
    blocking(state, move |s| s.scan(request)).await
}

async fn get_handler(
    State(state): State<AgentState>,
    body: Result<Json<GetRequest>, JsonRejection>,
) -> Result<Json<GetResponse>, AgentError> {
    let Json(request) = body?;
    blocking(state, move |s| s.page(request)).await
}

async fn teardown_handler(
    State(state): State<AgentState>,
    body: Result<Json<TeardownRequest>, JsonRejection>,
) -> Result<Json<TeardownResponse>, AgentError> {
    let Json(request) = body?;
    blocking(state, move |s| s.release(request)).await
}

/// Routes served by the agent
pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route(SCAN_PATH, post(scan_handler))
        .route(GET_PATH, post(get_handler))
        .route(TEARDOWN_PATH, post(teardown_handler))
        .with_state(state)
}

/// Serve the agent on an already-bound listener until the task is dropped
pub async fn serve(listener: TcpListener, state: AgentState) -> Result<(), SyncError> {
    let address = listener.local_addr()?;
    info!(%address, "Agent listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::ScanMode;
    use std::fs;
    use tempfile::TempDir;

    fn state() -> AgentState {
        let settings = Settings {
            operation_delay_ms: 0,
            ..Settings::default()
        };
        AgentState::with_store(settings, Box::new(MemoryStore::new()))
    }

    fn scan_request(root: &std::path::Path) -> ScanRequest {
        ScanRequest {
            root_folder: root.to_string_lossy().into_owned(),
            patterns: Vec::new(),
            rule: Default::default(),
            limits: Vec::new(),
            mode: ScanMode::Target,
            use_journal: false,
        }
    }

    #[test]
    fn test_scan_get_teardown_cycle() {
        let temp = TempDir::new().expect("create temp dir");
        for i in 0..5 {
            fs::write(temp.path().join(format!("f{}.txt", i)), "x").expect("write");
        }
        let agent = state();

        let scanned = agent.scan(scan_request(temp.path())).expect("scan");
        assert_eq!(scanned.file_count, 5);

        let mut seen = 0;
        for page in 0.. {
            let files = agent
                .page(GetRequest {
                    session: scanned.session,
                    page,
                    size: 2,
                    mode: ScanMode::Target,
                })
                .expect("get")
                .files;
            if files.is_empty() {
                break;
            }
            seen += files.len();
        }
        assert_eq!(seen, 5);

        let released = agent
            .release(TeardownRequest {
                session: scanned.session,
                folder: "x".to_string(),
            })
            .expect("teardown");
        assert!(released.released);
    }

    #[test]
    fn test_unknown_session_is_conflict() {
        let agent = state();
        let err = agent
            .page(GetRequest {
                session: Uuid::new_v4(),
                page: 0,
                size: 10,
                mode: ScanMode::Target,
            })
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_bad_limit_is_bad_request() {
        let temp = TempDir::new().expect("create temp dir");
        let mut request = scan_request(temp.path());
        request.limits = vec!["sizemin=lots".to_string()];
        let err = state().scan(request).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_teardown_of_stale_session_releases_nothing() {
        let released = state()
            .release(TeardownRequest {
                session: Uuid::new_v4(),
                folder: "x".to_string(),
            })
            .expect("teardown");
        assert!(!released.released);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let err = state()
            .page(GetRequest {
                session: Uuid::new_v4(),
                page: 0,
                size: 0,
                mode: ScanMode::Target,
            })
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
