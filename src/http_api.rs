//! Job-queue HTTP surface: enqueue downloads, poll status, list jobs, and
//! optionally stream the finished file straight back over the same
//! connection that requested it.

use crate::job::{JobStatus, JobView};
use crate::queue::{JobQueue, QueueError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use warp::http::{header, StatusCode};
use warp::{Filter, Rejection, Reply};

/// How long `POST /download` with `return_file=true` will hold the
/// connection open waiting for the job to reach a terminal state before
/// giving up and reporting a timeout. Generous relative to a single chunk's
/// wall-clock ceiling since a large file is many chunks deep.
const RETURN_FILE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const RETURN_FILE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    code: u16,
    data: T,
    message: String,
}

fn envelope<T: Serialize>(code: StatusCode, data: T, message: impl Into<String>) -> impl Reply {
    warp::reply::with_status(
        warp::reply::json(&Envelope { code: code.as_u16(), data, message: message.into() }),
        code,
    )
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: String,
    filename: Option<String>,
    #[serde(default)]
    return_file: bool,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

/// `X-API-Key` guard; `/health` bypasses it entirely by not being wrapped
/// in this filter at the route-composition level.
fn with_api_key(expected: Option<Arc<String>>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-api-key")
        .and_then(move |provided: Option<String>| {
            let expected = expected.clone();
            async move {
                match &expected {
                    None => Ok(()),
                    Some(key) if provided.as_deref() == Some(key.as_str()) => Ok(()),
                    Some(_) => Err(warp::reject::custom(Unauthorized)),
                }
            }
        })
        .untuple_one()
}

#[derive(Debug)]
struct Unauthorized;
impl warp::reject::Reject for Unauthorized {}

fn with_queue(queue: Arc<JobQueue>) -> impl Filter<Extract = (Arc<JobQueue>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || queue.clone())
}

pub fn routes(
    queue: Arc<JobQueue>,
    api_key: Option<String>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let api_key = api_key.map(Arc::new);

    let health = warp::path("health").and(warp::get()).map(|| {
        envelope(
            StatusCode::OK,
            HealthBody { status: "ok", version: env!("CARGO_PKG_VERSION") },
            "ok",
        )
    });

    let guarded = with_api_key(api_key);

    let download = warp::path("download")
        .and(warp::post())
        .and(guarded.clone())
        .and(warp::body::json())
        .and(with_queue(queue.clone()))
        .and_then(handle_download);

    let status = warp::path!("status" / String)
        .and(warp::get())
        .and(guarded.clone())
        .and(with_queue(queue.clone()))
        .and_then(handle_status);

    let jobs = warp::path("jobs")
        .and(warp::get())
        .and(guarded.clone())
        .and(with_queue(queue.clone()))
        .and_then(handle_jobs);

    let delete_job = warp::path!("jobs" / String)
        .and(warp::delete())
        .and(guarded)
        .and(with_queue(queue))
        .and_then(handle_delete_job);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allow_headers(vec!["Content-Type", "X-API-Key"]);

    health
        .or(download)
        .or(status)
        .or(jobs)
        .or(delete_job)
        .with(cors)
        .recover(handle_rejection)
}

async fn handle_download(body: DownloadRequest, queue: Arc<JobQueue>) -> Result<Box<dyn Reply>, Rejection> {
    if body.url.trim().is_empty() {
        return Ok(Box::new(envelope(StatusCode::BAD_REQUEST, serde_json::Value::Null, "url must not be empty")));
    }

    let want_file = body.return_file;
    let job = match queue.add(body.url, body.filename).await {
        Ok(job) => job,
        Err(QueueError::Full) => return Ok(Box::new(envelope(StatusCode::SERVICE_UNAVAILABLE, serde_json::Value::Null, "queue full"))),
        Err(e) => return Ok(Box::new(envelope(StatusCode::INTERNAL_SERVER_ERROR, serde_json::Value::Null, e.to_string()))),
    };

    if !want_file {
        return Ok(Box::new(envelope(StatusCode::OK, serde_json::json!({"id": job.id, "status": job.status}), "enqueued")));
    }

    match wait_for_terminal(&queue, &job.id).await {
        Some(view) if view.status == JobStatus::Completed => match view.output_path {
            Some(path) => match stream_file(&path).await {
                Ok(reply) => Ok(reply),
                Err(err) => Ok(Box::new(envelope(StatusCode::INTERNAL_SERVER_ERROR, serde_json::Value::Null, err))),
            },
            None => Ok(Box::new(envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::Value::Null,
                "completed job has no output path",
            ))),
        },
        Some(view) => Ok(Box::new(envelope(
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({"id": view.id, "status": view.status}),
            view.error.unwrap_or_else(|| "download did not complete".to_string()),
        ))),
        None => Ok(Box::new(envelope(StatusCode::GATEWAY_TIMEOUT, serde_json::Value::Null, "timed out waiting for download"))),
    }
}

/// Polls `/status`-equivalent state until the job leaves Queued/Downloading,
/// or gives up after [`RETURN_FILE_TIMEOUT`]. There's no completion
/// notification inside `JobQueue` to await directly — the queue is built
/// around poll-friendly snapshots, so `return_file=true` polls it the same
/// way an external client hitting `/status/{id}` would.
async fn wait_for_terminal(queue: &JobQueue, id: &str) -> Option<JobView> {
    let deadline = tokio::time::Instant::now() + RETURN_FILE_TIMEOUT;
    loop {
        let view = queue.get(id).await?;
        if view.status.is_terminal() {
            return Some(view);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(RETURN_FILE_POLL_INTERVAL).await;
    }
}

/// Streams the downloaded file back as the HTTP response body for
/// `return_file=true`. No Range-request handling here — the file is already
/// complete and local by the time this runs.
async fn stream_file(path: &std::path::Path) -> Result<Box<dyn Reply>, String> {
    let file = tokio::fs::File::open(path).await.map_err(|e| e.to_string())?;
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("download").to_string();
    let content_type = mime_guess::from_path(path).first_or_octet_stream();

    let body = warp::hyper::Body::wrap_stream(ReaderStream::new(file));
    let response = warp::http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""))
        .body(body)
        .map_err(|e| e.to_string())?;
    Ok(Box::new(response))
}

async fn handle_status(id: String, queue: Arc<JobQueue>) -> Result<Box<dyn Reply>, Rejection> {
    match queue.get(&id).await {
        Some(job) => Ok(Box::new(envelope(StatusCode::OK, job, "ok"))),
        None => Ok(Box::new(envelope(StatusCode::NOT_FOUND, serde_json::Value::Null, "job not found"))),
    }
}

async fn handle_jobs(queue: Arc<JobQueue>) -> Result<Box<dyn Reply>, Rejection> {
    let jobs = queue.all().await;
    Ok(Box::new(envelope(StatusCode::OK, serde_json::json!({ "jobs": jobs }), "ok")))
}

async fn handle_delete_job(id: String, queue: Arc<JobQueue>) -> Result<Box<dyn Reply>, Rejection> {
    if queue.cancel(&id).await {
        Ok(Box::new(envelope(StatusCode::OK, serde_json::Value::Null, "cancelled")))
    } else {
        Ok(Box::new(envelope(StatusCode::NOT_FOUND, serde_json::Value::Null, "unknown or already-terminal job")))
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    if err.find::<Unauthorized>().is_some() {
        return Ok(envelope(StatusCode::UNAUTHORIZED, serde_json::Value::Null, "invalid api key"));
    }
    if err.is_not_found() {
        return Ok(envelope(StatusCode::NOT_FOUND, serde_json::Value::Null, "not found"));
    }
    Ok(envelope(StatusCode::INTERNAL_SERVER_ERROR, serde_json::Value::Null, "internal error"))
}

/// Binds and runs the job-queue HTTP surface on `127.0.0.1:port` until the
/// process is killed.
pub async fn serve(queue: Arc<JobQueue>, api_key: Option<String>, port: u16) {
    tracing::info!(port, "starting job-queue http surface");
    warp::serve(routes(queue, api_key)).run(([127, 0, 0, 1], port)).await;
}
