#![allow(clippy::upper_case_acronyms)]

use std::sync::Arc;

use pingora::services::listening::Service;
use pingora_core::server::{configuration::Opt, Server};

use oker_web::{
    compile::{Orchestrator, ProcessToolchain, TempWorkspaces},
    config::{self, Config},
    core::status,
    logging::Logger,
    service::{http::CompileHttpApp, status::StatusHttpApp},
};

fn main() {
    // Load configuration and command-line arguments
    let cli_options = Opt::parse_args();
    let config = match Config::load_yaml_with_opt_override(&cli_options) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let logger = if let Some(log_cfg) = &config.oker.log {
        let logger = Logger::new(log_cfg.clone());
        logger.init_env_logger();
        Some(logger)
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        None
    };

    // Compile pipeline
    let toolchain = Arc::new(ProcessToolchain::from_config(&config.oker.toolchain));
    if !toolchain.is_available() {
        log::warn!(
            "Oker compiler not found at {}, compile requests will fail until it is built",
            toolchain.program().display()
        );
    }
    let workspace_dir = config.oker.workspace.resolved_dir();
    log::info!("Writing workspaces to {}", workspace_dir.display());
    let orchestrator = Orchestrator::new(
        Arc::new(TempWorkspaces::new(workspace_dir)),
        toolchain.clone(),
    );

    // Create server instance
    let mut oker_server = Server::new_with_opt_and_conf(Some(cli_options), config.pingora);

    if let Some(log_service) = logger {
        log::info!("Adding log sync service...");
        oker_server.add_service(log_service);
    }

    log::info!("Adding listeners...");
    let compile_service =
        match CompileHttpApp::compile_http_service(&config.oker, orchestrator) {
            Ok(service) => service,
            Err(e) => {
                eprintln!("Failed to add listeners: {e}");
                std::process::exit(1);
            }
        };

    add_optional_services(&mut oker_server, &config.oker, toolchain);

    log::info!("Bootstrapping...");
    oker_server.bootstrap();
    log::info!("Bootstrapped. Adding Services...");
    oker_server.add_service(compile_service);
    status::mark_ready();

    log::info!("Starting Server...");
    oker_server.run_forever();
}

/// Add optional services (Status, Prometheus)
fn add_optional_services(server: &mut Server, cfg: &config::Oker, toolchain: Arc<ProcessToolchain>) {
    if let Some(status_cfg) = &cfg.status {
        log::info!("Adding Status HTTP...");
        let status_service_http = StatusHttpApp::status_http_service(status_cfg, toolchain);
        server.add_service(status_service_http);
    }

    if let Some(prometheus_cfg) = &cfg.prometheus {
        log::info!("Adding Prometheus HTTP...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        server.add_service(prometheus_service_http);
    }
}
