use std::sync::Arc;

use async_trait::async_trait;
use http::{Response, StatusCode};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde::Serialize;

use crate::{
    compile::ProcessToolchain,
    config::Status,
    core::status,
    utils::response::{CommonErrors, ResponseBuilder},
};

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Readiness probe, served on its own address.
///
/// `/status/ready` answers 200 `{"status": "ok"}` once the server is wired up
/// and the compiler binary is present, 503 with the reason otherwise.
pub struct StatusHttpApp {
    config: Status,
    toolchain: Arc<ProcessToolchain>,
}

impl StatusHttpApp {
    pub fn new(cfg: &Status, toolchain: Arc<ProcessToolchain>) -> Self {
        Self {
            config: cfg.clone(),
            toolchain,
        }
    }

    pub fn status_http_service(cfg: &Status, toolchain: Arc<ProcessToolchain>) -> Service<Self> {
        let app = Self::new(cfg, toolchain);
        let addr = &app.config.address.to_string();
        let mut service = Service::new("Status HTTP".to_string(), app);
        service.add_tcp(addr);
        service
    }
}

#[async_trait]
impl ServeHttp for StatusHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        let path = http_session.req_header().uri.path();

        match path {
            "/status/ready" => ready_response(&self.toolchain),
            _ => CommonErrors::not_found("Not Found"),
        }
    }
}

fn ready_response(toolchain: &ProcessToolchain) -> Response<Vec<u8>> {
    let error = if !status::is_ready() {
        Some("Configuration not loaded yet".to_string())
    } else if !toolchain.is_available() {
        Some(format!(
            "Toolchain binary not found at {}",
            toolchain.program().display()
        ))
    } else {
        None
    };

    match error {
        None => ResponseBuilder::json(
            StatusCode::OK,
            &StatusResponse {
                status: "ok".to_string(),
                error: None,
            },
        ),
        Some(error) => ResponseBuilder::json(
            StatusCode::SERVICE_UNAVAILABLE,
            &StatusResponse {
                status: "error".to_string(),
                error: Some(error),
            },
        ),
    }
}
