use std::sync::atomic::{AtomicBool, Ordering};

/// Global readiness flag indicating whether the service has successfully loaded its configuration.
///
/// The readiness probe combines this with a toolchain presence check.
static CONFIG_LOADED: AtomicBool = AtomicBool::new(false);

/// Mark the service as ready after configuration loading and service wiring.
pub fn mark_ready() {
    CONFIG_LOADED.store(true, Ordering::SeqCst);
    log::info!("Configuration loaded, service is ready");
}

/// Returns true if configuration has been successfully loaded, false otherwise.
pub fn is_ready() -> bool {
    CONFIG_LOADED.load(Ordering::SeqCst)
}

/// Reset readiness status (useful for testing)
#[allow(dead_code)]
pub fn reset() {
    CONFIG_LOADED.store(false, Ordering::SeqCst);
    log::debug!("Readiness status reset");
}
