// HTTP surface: live counters for the browser dashboard and the /vars
// runtime probes. The server runs on its own thread; the listener is bound
// by the caller so a busy port is a fatal startup error.

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::accounting::ValuesSnapshot;
use crate::capture::Core;
use crate::error::WirelogError;
use crate::vars::VarRegistry;

#[derive(Clone)]
struct AppState {
    core: Arc<Core>,
    vars: Arc<VarRegistry>,
}

/// Binds the dashboard listener. Kept separate from [`serve`] so bind
/// failures surface before any capture state is built.
pub fn bind(port: u16) -> Result<TcpListener, WirelogError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).map_err(|e| WirelogError::Bind { port, source: e })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| WirelogError::Bind { port, source: e })?;
    Ok(listener)
}

/// Serves the dashboard on a dedicated thread for the life of the process.
pub fn serve(
    listener: TcpListener,
    core: Arc<Core>,
    vars: Arc<VarRegistry>,
) -> Result<thread::JoinHandle<()>, WirelogError> {
    thread::Builder::new()
        .name("wirelog-http".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("dashboard runtime: {e}");
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        log::error!("dashboard listener: {e}");
                        return;
                    }
                };
                if let Err(e) = axum::serve(listener, router(core, vars)).await {
                    log::error!("dashboard serve: {e}");
                }
            });
        })
        .map_err(|e| WirelogError::Fatal(format!("spawn dashboard thread: {e}")))
}

fn router(core: Arc<Core>, vars: Arc<VarRegistry>) -> Router {
    Router::new()
        .route("/dashboard/json", get(values_handler))
        .route("/vars", get(vars_handler))
        .with_state(AppState { core, vars })
}

async fn values_handler(State(state): State<AppState>) -> Json<ValuesSnapshot> {
    Json(state.core.values.state())
}

async fn vars_handler(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.vars.evaluate())
}
