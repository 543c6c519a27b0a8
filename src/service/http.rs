use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use http::{Method, Response};
use matchit::Router;
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use pingora_core::listeners::tls::TlsSettings;
use pingora_error::Result;

use crate::{
    compile::{CompileResponse, Orchestrator},
    config,
    core::error::{CompileError, CompileResult},
    utils::{
        request::{decode_compile_request, read_request_body},
        response::{content_type, CommonErrors, ResponseBuilder},
    },
};

#[async_trait]
trait Handler {
    async fn handle(&self, session: &mut ServerSession) -> Response<Vec<u8>>;
}

/// The public HTTP application: `POST /compile` plus the front-end assets.
pub struct CompileHttpApp {
    router: Router<HashMap<Method, Box<dyn Handler + Send + Sync>>>,
}

impl CompileHttpApp {
    pub fn new(cfg: &config::Oker, orchestrator: Orchestrator) -> Self {
        let mut this = Self {
            router: Router::new(),
        };

        this.route(
            "/compile",
            Method::POST,
            Box::new(CompileHandler {
                orchestrator,
                max_body_bytes: cfg.max_body_bytes,
            }),
        );

        let root = cfg.assets.as_ref().map(|assets| assets.root.clone());
        for (path, file, content_type) in [
            ("/", "index.html", content_type::TEXT_HTML),
            ("/index.html", "index.html", content_type::TEXT_HTML),
            ("/style.css", "style.css", content_type::TEXT_CSS),
            ("/app.js", "app.js", content_type::APPLICATION_JAVASCRIPT),
        ] {
            this.route(
                path,
                Method::GET,
                Box::new(AssetHandler {
                    root: root.clone(),
                    file,
                    content_type,
                }),
            );
        }

        this
    }

    /// Registers a handler for a path and method.
    fn route(
        &mut self,
        path: &str,
        method: Method,
        handler: Box<dyn Handler + Send + Sync>,
    ) -> &mut Self {
        match self.router.at_mut(path) {
            Ok(routes) => {
                routes.value.insert(method, handler);
            }
            Err(_) => {
                let mut handlers = HashMap::new();
                handlers.insert(method, handler);
                if let Err(e) = self.router.insert(path, handlers) {
                    log::error!("Failed to register route {path}: {e}");
                }
            }
        }
        self
    }

    fn handler(&self, method: &Method, path: &str) -> Option<&(dyn Handler + Send + Sync)> {
        self.router
            .at(path)
            .ok()
            .and_then(|matched| matched.value.get(method))
            .map(|handler| handler.as_ref())
    }

    /// Builds the listening service with every configured listener attached.
    pub fn compile_http_service(
        cfg: &config::Oker,
        orchestrator: Orchestrator,
    ) -> Result<Service<Self>> {
        let app = Self::new(cfg, orchestrator);
        let mut service = Service::new("Oker Compile HTTP".to_string(), app);

        for listener in cfg.listeners.iter() {
            let addr = listener.address.to_string();
            match &listener.tls {
                Some(config::Tls {
                    cert_path,
                    key_path,
                }) => {
                    let mut settings = TlsSettings::intermediate(cert_path, key_path)?;
                    if listener.offer_h2 {
                        settings.enable_h2();
                    }
                    log::info!("Listening on {addr} (tls)");
                    service.add_tls_with_settings(&addr, None, settings);
                }
                None => {
                    log::info!("Listening on {addr}");
                    service.add_tcp(&addr);
                }
            }
        }

        Ok(service)
    }
}

#[async_trait]
impl ServeHttp for CompileHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        let (path, method) = {
            let req_header = http_session.req_header();
            (req_header.uri.path().to_string(), req_header.method.clone())
        };

        if method == Method::OPTIONS {
            return ResponseBuilder::preflight();
        }

        match self.handler(&method, &path) {
            Some(handler) => handler.handle(http_session).await,
            None => not_routed(&method),
        }
    }
}

fn not_routed(method: &Method) -> Response<Vec<u8>> {
    match *method {
        Method::GET | Method::HEAD => CommonErrors::not_found("File not found"),
        Method::POST => CommonErrors::not_found("Endpoint not found"),
        _ => CommonErrors::method_not_allowed(),
    }
}

struct CompileHandler {
    orchestrator: Orchestrator,
    max_body_bytes: usize,
}

impl CompileHandler {
    async fn compile(&self, body: CompileResult<Vec<u8>>) -> CompileResponse {
        let request = body.and_then(|body| decode_compile_request(&body));

        match request {
            Ok(request) => self.orchestrator.handle(request).await,
            Err(e @ CompileError::InvalidJson(_)) => {
                log::debug!("Rejected compile request: {e}");
                CompileResponse::err(e.to_string())
            }
            Err(e) => {
                log::warn!("Rejected compile request: {e}");
                CompileResponse::err(format!("Server error: {e}"))
            }
        }
    }
}

#[async_trait]
impl Handler for CompileHandler {
    async fn handle(&self, session: &mut ServerSession) -> Response<Vec<u8>> {
        let body = read_request_body(session, self.max_body_bytes).await;
        ResponseBuilder::cors_json(&self.compile(body).await)
    }
}

struct AssetHandler {
    root: Option<PathBuf>,
    file: &'static str,
    content_type: &'static str,
}

impl AssetHandler {
    async fn serve(&self) -> Response<Vec<u8>> {
        let missing = || CommonErrors::not_found(&format!("File {} not found", self.file));

        let Some(root) = &self.root else {
            return missing();
        };

        match tokio::fs::read(root.join(self.file)).await {
            Ok(content) => ResponseBuilder::success_http(content, Some(self.content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => missing(),
            Err(e) => {
                log::error!("Error serving file {}: {e}", self.file);
                CommonErrors::internal_server_error(&format!("Error serving file: {e}"))
            }
        }
    }
}

#[async_trait]
impl Handler for AssetHandler {
    async fn handle(&self, _session: &mut ServerSession) -> Response<Vec<u8>> {
        self.serve().await
    }
}
