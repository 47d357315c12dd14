//! HTTP control surface.
//!
//! Translates external commands (status query, start/stop, settings update,
//! credential rotation, schedule toggle) into store and supervisor
//! operations, enforcing the restart-on-sensitive-change policy: destination
//! and credential changes restart affected running workers so no worker
//! keeps operating on a stale snapshot; window and frequency changes take
//! effect on the worker's next manual restart.

use axum::{
    extract::{FromRequest, OptionalFromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{JobConfig, ScheduleMode};
use crate::errors::{HarvestError, Result};
use crate::registry::{JobSpec, Registry};
use crate::store::ConfigStore;
use crate::supervisor::{JobStatus, StartOutcome, Supervisor};

/// Placeholder echoed wherever a password would appear.
const MASKED_PASSWORD: &str = "******";

pub struct AppState {
    pub registry: Registry,
    pub store: ConfigStore,
    pub supervisor: Supervisor,
    /// In-memory view of the persisted job document. Mutating handlers hold
    /// this lock end to end, serializing control requests.
    pub configs: Mutex<HashMap<String, JobConfig>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(registry: Registry, store: ConfigStore, supervisor: Supervisor) -> SharedState {
        let configs = Mutex::new(store.load(&registry));
        Arc::new(Self {
            registry,
            store,
            supervisor,
            configs,
        })
    }

    /// Persist `candidate` and only then commit it to memory, so a write
    /// failure aborts the mutation instead of reporting success with
    /// unsaved state.
    fn commit(
        &self,
        configs: &mut HashMap<String, JobConfig>,
        candidate: HashMap<String, JobConfig>,
    ) -> Result<()> {
        self.store.save(&candidate)?;
        *configs = candidate;
        Ok(())
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/control/{name}", post(control))
        .route("/update_settings/{name}", post(update_settings))
        .route("/update_credentials/{name}", post(update_credentials))
        .route("/update_schedule/{name}", post(update_schedule))
        .with_state(state)
}

impl IntoResponse for HarvestError {
    fn into_response(self) -> Response {
        let status = match &self {
            HarvestError::JobNotFound(_) | HarvestError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `Json` body extractor whose rejection carries the same `{"error": ...}`
/// body as every other client error, instead of axum's plain-text default.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HarvestError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match <Json<T> as FromRequest<S>>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(HarvestError::InvalidConfig(rejection.body_text())),
        }
    }
}

impl<S, T> OptionalFromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HarvestError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> std::result::Result<Option<Self>, Self::Rejection> {
        match <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await {
            Ok(Some(Json(value))) => Ok(Some(ApiJson(value))),
            Ok(None) => Ok(None),
            Err(rejection) => Err(HarvestError::InvalidConfig(rejection.body_text())),
        }
    }
}

/// Status view for one job: live supervisor state merged with the persisted
/// config. Credentials are masked, never echoed in plaintext.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub running: bool,
    pub status: String,
    pub hours: [u8; 2],
    pub frequency: u32,
    #[serde(rename = "destinationId")]
    pub destination_id: String,
    pub username: String,
    pub password: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_run: Option<u8>,
    pub destination_updated: Option<DateTime<Utc>>,
    pub credentials_updated: Option<DateTime<Utc>>,
}

impl JobView {
    fn assemble(spec: &JobSpec, config: &JobConfig, status: JobStatus) -> Self {
        Self {
            running: status.running,
            status: status.text(),
            hours: [config.start_hour, config.end_hour],
            frequency: config.frequency_minutes,
            destination_id: config.destination_id.clone(),
            username: config.username.clone(),
            password: MASKED_PASSWORD,
            schedule_run: spec.scheduled.then(|| match config.schedule_mode {
                ScheduleMode::Gated => 1,
                ScheduleMode::Always => 0,
            }),
            destination_updated: config.destination_updated,
            credentials_updated: config.credentials_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    job: Option<String>,
}

async fn get_status(
    State(state): State<SharedState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response> {
    let configs = state.configs.lock().await;

    match query.job {
        Some(name) => {
            let spec = state.registry.get(&name)?;
            let config = lookup(&configs, &name)?;
            let status = state.supervisor.status(&name).await;
            Ok(Json(JobView::assemble(spec, config, status)).into_response())
        }
        None => {
            let mut all = HashMap::new();
            for (name, spec) in state.registry.iter() {
                let config = lookup(&configs, name)?;
                let status = state.supervisor.status(name).await;
                all.insert(name.to_string(), JobView::assemble(spec, config, status));
            }
            Ok(Json(all).into_response())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ControlBody {
    action: Option<String>,
}

async fn control(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    body: Option<ApiJson<ControlBody>>,
) -> Result<Json<serde_json::Value>> {
    let spec = state.registry.get(&name)?;
    let action = body.and_then(|ApiJson(b)| b.action);

    // Held across the supervisor call: a start must spawn with the config
    // committed at that moment, not a snapshot that a concurrent settings
    // update could invalidate between clone and spawn.
    let configs = state.configs.lock().await;

    let message = match action.as_deref() {
        Some("start") => {
            let config = lookup(&configs, &name)?;
            match state.supervisor.start(&name, spec, config).await? {
                StartOutcome::Started { pid: Some(pid) } => {
                    format!("Started {}, PID={}", name, pid)
                }
                StartOutcome::Started { pid: None } => format!("Started {}", name),
                StartOutcome::AlreadyRunning => format!("{} is already running", name),
            }
        }
        Some("stop") => {
            if state.supervisor.stop(&name).await? {
                format!("Stopped {}", name)
            } else {
                format!("{} not running", name)
            }
        }
        // Unknown or missing action is a silent no-op, not an error.
        _ => "no change".to_string(),
    };

    Ok(Json(json!({ "status": message })))
}

#[derive(Debug, Deserialize)]
struct SettingsBody {
    start_hour: Option<u8>,
    end_hour: Option<u8>,
    frequency: Option<u32>,
    #[serde(rename = "destinationId")]
    destination_id: Option<String>,
}

async fn update_settings(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    ApiJson(body): ApiJson<SettingsBody>,
) -> Result<Json<serde_json::Value>> {
    let spec = state.registry.get(&name)?;
    let mut configs = state.configs.lock().await;

    let mut updated = lookup(&configs, &name)?.clone();
    if let Some(start) = body.start_hour {
        updated.start_hour = start;
    }
    if let Some(end) = body.end_hour {
        updated.end_hour = end;
    }
    if let Some(frequency) = body.frequency {
        updated.frequency_minutes = frequency;
    }
    let destination_changed = match body.destination_id {
        Some(ref destination) => {
            let changed = *destination != updated.destination_id;
            updated.destination_id = destination.clone();
            changed
        }
        None => false,
    };
    updated.validate()?;

    if destination_changed {
        updated.destination_updated = Some(Utc::now());
    }

    let mut candidate = configs.clone();
    candidate.insert(name.clone(), updated.clone());
    state.commit(&mut configs, candidate)?;

    // Destination is a sensitive change: a running worker keeps uploading to
    // the old target until restarted with the new snapshot.
    if destination_changed && state.supervisor.status(&name).await.running {
        info!("Destination for {} changed while running, restarting", name);
        state.supervisor.restart(&name, spec, &updated).await?;
    }

    let status = state.supervisor.status(&name).await;
    Ok(Json(json!({
        "status": "settings updated",
        "config": JobView::assemble(spec, &updated, status),
    })))
}

#[derive(Debug, Deserialize)]
struct CredentialsBody {
    username: Option<String>,
    password: Option<String>,
}

/// Credentials are process-wide: the update applies to every job's config,
/// regardless of which job the request was addressed to, and every running
/// worker is restarted so none keeps operating with stale credentials.
async fn update_credentials(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    ApiJson(body): ApiJson<CredentialsBody>,
) -> Result<Json<serde_json::Value>> {
    state.registry.get(&name)?;
    let mut configs = state.configs.lock().await;

    let now = Utc::now();
    let mut candidate = configs.clone();
    for config in candidate.values_mut() {
        if let Some(ref username) = body.username {
            config.username = username.clone();
        }
        if let Some(ref password) = body.password {
            config.password = password.clone();
        }
        config.credentials_updated = Some(now);
    }
    state.commit(&mut configs, candidate)?;

    // Each stop can consume a full grace period if the worker ignores
    // SIGTERM, so the restarts run concurrently and the rotation stays
    // bounded by one grace period instead of one per running job.
    let mut restarts = tokio::task::JoinSet::new();
    for job in state.registry.names() {
        if !state.supervisor.status(job).await.running {
            continue;
        }
        info!("Credentials changed, restarting running job {}", job);
        let config = lookup(&configs, job)?.clone();
        let job = job.to_string();
        let task_state = Arc::clone(&state);
        restarts.spawn(async move {
            let spec = task_state.registry.get(&job)?;
            task_state.supervisor.restart(&job, spec, &config).await?;
            Ok::<_, HarvestError>(())
        });
    }
    while let Some(joined) = restarts.join_next().await {
        joined.map_err(|e| HarvestError::Internal(format!("restart task failed: {}", e)))??;
    }

    let username = lookup(&configs, &name)?.username.clone();
    Ok(Json(json!({
        "status": "credentials updated",
        "username": username,
        "password": MASKED_PASSWORD,
    })))
}

#[derive(Debug, Deserialize)]
struct ScheduleBody {
    schedule_run: Option<i64>,
}

async fn update_schedule(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    ApiJson(body): ApiJson<ScheduleBody>,
) -> Result<Json<serde_json::Value>> {
    let spec = state.registry.get(&name)?;
    if !spec.scheduled {
        return Err(HarvestError::InvalidConfig(format!(
            "job {} does not support schedule gating",
            name
        )));
    }

    let (mode, flag) = match body.schedule_run {
        Some(0) => (ScheduleMode::Always, 0),
        Some(1) => (ScheduleMode::Gated, 1),
        other => {
            return Err(HarvestError::InvalidConfig(format!(
                "schedule_run must be 0 or 1, got {:?}",
                other
            )));
        }
    };

    let mut configs = state.configs.lock().await;
    let mut candidate = configs.clone();
    lookup_mut(&mut candidate, &name)?.schedule_mode = mode;
    state.commit(&mut configs, candidate)?;

    // No restart: the gated worker re-evaluates its calendar predicate on
    // its own next invocation.
    Ok(Json(json!({
        "status": "schedule updated",
        "schedule_run": flag,
    })))
}

fn lookup<'a>(configs: &'a HashMap<String, JobConfig>, name: &str) -> Result<&'a JobConfig> {
    configs
        .get(name)
        .ok_or_else(|| HarvestError::Internal(format!("no config slot for job {}", name)))
}

fn lookup_mut<'a>(
    configs: &'a mut HashMap<String, JobConfig>,
    name: &str,
) -> Result<&'a mut JobConfig> {
    configs
        .get_mut(name)
        .ok_or_else(|| HarvestError::Internal(format!("no config slot for job {}", name)))
}

#[cfg(test)]
mod tests;
