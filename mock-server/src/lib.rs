//! In-memory stand-in for a DeepDetect server.
//!
//! Services and training jobs live in shared state. Every request passing
//! through the router is recorded (method, path, query, JSON body) so tests
//! can inspect exactly what a client put on the wire, and a failure status
//! can be armed to short-circuit all requests.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct Job {
    pub id: u32,
    pub status: JobStatus,
    pub polls: u32,
    pub iterations: u64,
}

#[derive(Clone, Debug)]
pub struct Service {
    pub name: String,
    pub description: String,
    pub mllib: String,
    pub task_type: String,
    pub parameters: Value,
    pub model: Value,
    pub next_job: u32,
    pub jobs: HashMap<u32, Job>,
}

impl Service {
    fn nclasses(&self) -> u64 {
        self.parameters["mllib"]["nclasses"].as_u64().unwrap_or(2).max(1)
    }
}

#[derive(Debug, Default)]
pub struct MockData {
    pub services: HashMap<String, Service>,
    pub requests: Vec<RecordedRequest>,
    pub fail_with: Option<u16>,
}

pub type Db = Arc<RwLock<MockData>>;

#[derive(Deserialize)]
pub struct CreateService {
    #[serde(default)]
    pub description: String,
    pub mllib: String,
    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub parameters: Value,
    pub model: Value,
}

fn default_task_type() -> String {
    "supervised".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct TrainJob {
    pub service: String,
    #[serde(rename = "async", default = "default_true")]
    pub non_blocking: bool,
    #[serde(default)]
    pub parameters: Value,
    pub data: Value,
}

#[derive(Deserialize)]
pub struct PredictRequest {
    pub service: String,
    #[serde(default)]
    pub parameters: Value,
    pub data: Value,
}

#[derive(Deserialize)]
pub struct DeleteServiceParams {
    pub clear: Option<String>,
}

/// Query of `GET /train` and `DELETE /train`. Numbers arrive as strings.
#[derive(Deserialize)]
pub struct JobParams {
    pub service: String,
    pub job: Option<String>,
    pub timeout: Option<String>,
    #[serde(rename = "parameters.output.measure_hist")]
    pub measure_hist: Option<String>,
}

type Reply = (StatusCode, Json<Value>);

pub fn app() -> Router {
    app_with_state(Db::default())
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/info", get(info))
        .route(
            "/services/{name}",
            put(create_service).get(get_service).delete(delete_service),
        )
        .route(
            "/train",
            post(start_training).get(training_status).delete(cancel_training),
        )
        .route("/predict", post(predict))
        .layer(middleware::from_fn_with_state(db.clone(), record_and_inject))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, Db::default()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

/// Start the server on an ephemeral port in a background thread with its
/// own runtime. Returns the bound address and the shared state.
pub fn spawn_background() -> Result<(SocketAddr, Db), std::io::Error> {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = std_listener.local_addr()?;
    std_listener.set_nonblocking(true)?;

    let db = Db::default();
    let server_db = db.clone();
    std::thread::spawn(move || -> Result<(), std::io::Error> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(async {
            let listener = TcpListener::from_std(std_listener)?;
            run_with_state(listener, server_db).await
        })
    });
    Ok((addr, db))
}

/// Snapshot of recorded requests. Must not be called from async code.
pub fn recorded(db: &Db) -> Vec<RecordedRequest> {
    db.blocking_read().requests.clone()
}

/// Arm (or with `None`, disarm) a status returned for every request.
/// Must not be called from async code.
pub fn set_failure(db: &Db, status: Option<u16>) {
    db.blocking_write().fail_with = status;
}

fn reply(status: StatusCode, head: Option<Value>, body: Option<Value>) -> Reply {
    let mut envelope = json!({
        "status": {
            "code": status.as_u16(),
            "msg": status.canonical_reason().unwrap_or("Unknown"),
        }
    });
    if let Some(head) = head {
        envelope["head"] = head;
    }
    if let Some(body) = body {
        envelope["body"] = body;
    }
    (status, Json(envelope))
}

fn error(status: StatusCode, dd_msg: &str) -> Reply {
    let (status, Json(mut envelope)) = reply(status, None, None);
    envelope["status"]["dd_msg"] = json!(dd_msg);
    (status, Json(envelope))
}

fn measure(iterations: u64) -> Value {
    json!({
        "iteration": iterations,
        "train_loss": 0.05,
        "acc": 0.95,
        "f1": 0.94,
        "mcll": 0.21,
    })
}

fn measure_hist(iterations: u64) -> Value {
    let steps = iterations.clamp(1, 10);
    let losses: Vec<f64> = (1..=steps).map(|i| 1.0 / i as f64).collect();
    json!({ "train_loss_hist": losses })
}

async fn record_and_inject(State(db): State<Db>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();
    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query,
        body: serde_json::from_slice(&bytes).ok(),
    };
    debug!(method = %recorded.method, path = %recorded.path, "mock request");

    let fail_with = {
        let mut data = db.write().await;
        data.requests.push(recorded);
        data.fail_with
    };
    if let Some(code) = fail_with {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return error(status, "injected failure").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn info(State(db): State<Db>) -> Reply {
    let data = db.read().await;
    let mut services: Vec<Value> = data
        .services
        .values()
        .map(|s| {
            json!({
                "name": s.name,
                "description": s.description,
                "mllib": s.mllib,
            })
        })
        .collect();
    services.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    let head = json!({
        "method": "/info",
        "version": "0.1",
        "branch": "mock",
        "services": services,
    });
    reply(StatusCode::OK, Some(head), None)
}

async fn create_service(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<CreateService>,
) -> Reply {
    let mut data = db.write().await;
    if data.services.contains_key(&name) {
        return error(StatusCode::CONFLICT, "Service already exists");
    }
    data.services.insert(
        name.clone(),
        Service {
            name,
            description: input.description,
            mllib: input.mllib,
            task_type: input.task_type,
            parameters: input.parameters,
            model: input.model,
            next_job: 1,
            jobs: HashMap::new(),
        },
    );
    reply(StatusCode::CREATED, None, None)
}

async fn get_service(State(db): State<Db>, Path(name): Path<String>) -> Reply {
    let data = db.read().await;
    let Some(service) = data.services.get(&name) else {
        return error(StatusCode::NOT_FOUND, "Service Not Found");
    };
    let mut jobs: Vec<&Job> = service.jobs.values().collect();
    jobs.sort_by_key(|j| j.id);
    let jobs: Vec<Value> = jobs
        .iter()
        .map(|j| json!({ "job": j.id, "status": j.status }))
        .collect();
    let body = json!({
        "name": service.name,
        "description": service.description,
        "mllib": service.mllib,
        "type": service.task_type,
        "model": service.model,
        "jobs": jobs,
    });
    reply(StatusCode::OK, None, Some(body))
}

async fn delete_service(
    State(db): State<Db>,
    Path(name): Path<String>,
    Query(params): Query<DeleteServiceParams>,
) -> Reply {
    if let Some(clear) = params.clear.as_deref() {
        if !matches!(clear, "full" | "lib" | "mem") {
            return error(StatusCode::BAD_REQUEST, "Unknown clear mode");
        }
    }
    let mut data = db.write().await;
    match data.services.remove(&name) {
        Some(_) => reply(StatusCode::OK, None, None),
        None => error(StatusCode::NOT_FOUND, "Service Not Found"),
    }
}

async fn start_training(State(db): State<Db>, Json(input): Json<TrainJob>) -> Reply {
    let mut data = db.write().await;
    let Some(service) = data.services.get_mut(&input.service) else {
        return error(StatusCode::NOT_FOUND, "Service Not Found");
    };
    let iterations = input.parameters["mllib"]["solver"]["iterations"]
        .as_u64()
        .unwrap_or(100);
    let id = service.next_job;
    service.next_job += 1;

    if input.non_blocking {
        service.jobs.insert(
            id,
            Job {
                id,
                status: JobStatus::Running,
                polls: 0,
                iterations,
            },
        );
        let head = json!({ "method": "/train", "job": id, "status": "running" });
        return reply(StatusCode::CREATED, Some(head), None);
    }

    service.jobs.insert(
        id,
        Job {
            id,
            status: JobStatus::Finished,
            polls: 0,
            iterations,
        },
    );
    let head = json!({ "method": "/train", "job": id, "status": "finished", "time": 0.0 });
    reply(
        StatusCode::CREATED,
        Some(head),
        Some(json!({ "measure": measure(iterations) })),
    )
}

fn parse_job(params: &JobParams) -> Result<u32, Reply> {
    match params.job.as_deref() {
        None => Ok(1),
        Some(raw) => raw
            .parse()
            .map_err(|_| error(StatusCode::BAD_REQUEST, "Invalid job id")),
    }
}

async fn training_status(State(db): State<Db>, Query(params): Query<JobParams>) -> Reply {
    let id = match parse_job(&params) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    if let Some(timeout) = params.timeout.as_deref() {
        if timeout.parse::<u64>().is_err() {
            return error(StatusCode::BAD_REQUEST, "Invalid timeout");
        }
    }
    let want_hist = matches!(params.measure_hist.as_deref(), Some("true" | "1"));

    let mut data = db.write().await;
    let Some(service) = data.services.get_mut(&params.service) else {
        return error(StatusCode::NOT_FOUND, "Service Not Found");
    };
    let Some(job) = service.jobs.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Job Not Found");
    };
    if job.status == JobStatus::Running && job.polls > 0 {
        job.status = JobStatus::Finished;
    }
    job.polls += 1;

    let head = json!({ "method": "/train", "job": id, "status": job.status });
    let mut body = match job.status {
        JobStatus::Running => json!({ "measure": { "iteration": job.iterations / 2 } }),
        _ => json!({ "measure": measure(job.iterations) }),
    };
    if want_hist {
        body["measure_hist"] = measure_hist(job.iterations);
    }
    reply(StatusCode::OK, Some(head), Some(body))
}

async fn cancel_training(State(db): State<Db>, Query(params): Query<JobParams>) -> Reply {
    let id = match parse_job(&params) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    let mut data = db.write().await;
    let Some(service) = data.services.get_mut(&params.service) else {
        return error(StatusCode::NOT_FOUND, "Service Not Found");
    };
    let Some(job) = service.jobs.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Job Not Found");
    };
    job.status = JobStatus::Terminated;
    let head = json!({ "method": "/train", "job": id, "status": "terminated" });
    reply(StatusCode::OK, Some(head), None)
}

async fn predict(State(db): State<Db>, Json(input): Json<PredictRequest>) -> Reply {
    let data = db.read().await;
    let Some(service) = data.services.get(&input.service) else {
        return error(StatusCode::NOT_FOUND, "Service Not Found");
    };
    let Some(items) = input.data.as_array() else {
        return error(StatusCode::BAD_REQUEST, "data must be an array");
    };
    let nclasses = service.nclasses();
    let best = input.parameters["output"]["best"].as_u64().unwrap_or(1).max(1);
    let predictions: Vec<Value> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let uri = item.as_str().map(str::to_string).unwrap_or_else(|| i.to_string());
            let classes: Vec<Value> = (0..best.min(nclasses))
                .map(|rank| {
                    let cat = (i as u64 + rank) % nclasses;
                    json!({ "cat": cat.to_string(), "prob": 1.0 / (rank + 1) as f64 })
                })
                .collect();
            json!({ "uri": uri, "classes": classes })
        })
        .collect();
    let head = json!({ "method": "/predict", "service": service.name });
    reply(
        StatusCode::OK,
        Some(head),
        Some(json!({ "predictions": predictions })),
    )
}
