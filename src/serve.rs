//! HTTP API for the dashboard front end.
//!
//! `trackdash serve` → binds the port and answers tab selections with JSON
//! view payloads. Requests are handled one at a time on the calling thread.

use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server};

use crate::store::{COUNT_METRIC, Category, PopularityBin};
use crate::views::Dashboard;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(error.into()) }
    }
}

#[derive(Deserialize, Debug)]
pub struct MetricParams {
    #[serde(default = "default_metric")]
    pub metric: String,
}

fn default_metric() -> String {
    COUNT_METRIC.to_string()
}

#[derive(Deserialize, Debug)]
pub struct CategoryParams {
    pub category: String,
    pub bin: String,
    #[serde(default)]
    pub page: usize,
}

/// Status code and JSON body for one request.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn json<T: Serialize>(status: u16, payload: &ApiResponse<T>) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self { status, body },
            Err(e) => Self {
                status: 500,
                body: format!("{{\"ok\":false,\"data\":null,\"error\":\"serialization failed: {}\"}}", e),
            },
        }
    }

    fn ok<T: Serialize>(data: T) -> Self {
        Self::json(200, &ApiResponse::success(data))
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &ApiResponse::<()>::failure(message))
    }
}

/// Start server, serve requests until the process is stopped.
pub fn start(dashboard: &Dashboard, host: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{}:{}", host, port);
    let server = Server::http(&addr).map_err(|e| std::io::Error::other(e.to_string()))?;

    log::info!("Serving dashboard API on http://{}", addr);
    eprintln!("trackdash API listening on http://{}", addr);

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, dashboard) {
            log::warn!("Failed to respond: {}", e);
        }
    }

    Ok(())
}

fn handle_request(request: Request, dashboard: &Dashboard) -> std::io::Result<()> {
    let reply = route(dashboard, request.method(), request.url());
    log::debug!("{} {} -> {}", request.method(), request.url(), reply.status);

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    request.respond(response)
}

/// Map a method and URL onto a view payload.
pub fn route(dashboard: &Dashboard, method: &Method, url: &str) -> Reply {
    let mut parts = url.splitn(2, '?');
    let path = parts.next().unwrap_or("/");
    let query = parts.next().unwrap_or("");

    match (method, path) {
        (&Method::Get, "/") | (&Method::Get, "/api/tabs") => Reply::ok(dashboard.tabs()),

        (&Method::Get, "/api/averages") => Reply::ok(dashboard.averages()),

        (&Method::Get, "/api/metric") => {
            let params = match serde_urlencoded::from_str::<MetricParams>(query) {
                Ok(p) => p,
                Err(e) => return Reply::error(400, format!("invalid query: {}", e)),
            };
            match dashboard.metric_view(&params.metric) {
                Ok(view) => Reply::ok(view),
                Err(e) => Reply::error(400, e.to_string()),
            }
        }

        (&Method::Get, "/api/category") => {
            let params = match serde_urlencoded::from_str::<CategoryParams>(query) {
                Ok(p) => p,
                Err(e) => return Reply::error(400, format!("invalid query: {}", e)),
            };
            let category = match params.category.parse::<Category>() {
                Ok(c) => c,
                Err(e) => return Reply::error(400, e.to_string()),
            };
            let bin = match params.bin.parse::<PopularityBin>() {
                Ok(b) => b,
                Err(e) => return Reply::error(400, e.to_string()),
            };
            match dashboard.category_view(category, bin, params.page) {
                Ok(view) => Reply::ok(view),
                Err(e) => {
                    log::error!("category view failed: {}", e);
                    Reply::error(500, e.to_string())
                }
            }
        }

        _ => Reply::error(404, "Not found"),
    }
}
