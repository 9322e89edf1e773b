//! Read-only HTTP introspection endpoint
//!
//! Serves the gateway snapshot as JSON:
//!
//! - `GET /` the complete snapshot
//! - `GET /cs`, `GET /cs/{name}` command stations
//! - `GET /loco`, `GET /loco/{name}` locos

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use pico_gateway::GatewaySnapshot;
use serde::Serialize;
use tokio::sync::oneshot;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_reply(message: &str, code: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&ErrorBody { error: message }), code)
}

fn lookup<T: Serialize>(
    kind: &str,
    name: &str,
    found: Option<&T>,
) -> warp::reply::WithStatus<warp::reply::Json> {
    match found {
        Some(item) => warp::reply::with_status(warp::reply::json(item), StatusCode::OK),
        None => error_reply(&format!("{kind} {name} not found"), StatusCode::NOT_FOUND),
    }
}

/// All introspection routes over `snapshot`.
pub fn routes(
    snapshot: Arc<GatewaySnapshot>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static {
    let with_snapshot = warp::any().map(move || snapshot.clone());

    let root = warp::path::end()
        .and(with_snapshot.clone())
        .map(|snapshot: Arc<GatewaySnapshot>| warp::reply::json(&*snapshot));

    let stations = warp::path!("cs")
        .and(with_snapshot.clone())
        .map(|snapshot: Arc<GatewaySnapshot>| warp::reply::json(&snapshot.controllers));

    let station = warp::path!("cs" / String)
        .and(with_snapshot.clone())
        .map(|name: String, snapshot: Arc<GatewaySnapshot>| {
            lookup("command station", &name, snapshot.controller(&name))
        });

    let locos = warp::path!("loco")
        .and(with_snapshot.clone())
        .map(|snapshot: Arc<GatewaySnapshot>| warp::reply::json(&snapshot.entities));

    let loco = warp::path!("loco" / String)
        .and(with_snapshot)
        .map(|name: String, snapshot: Arc<GatewaySnapshot>| {
            lookup("loco", &name, snapshot.entity(&name))
        });

    warp::get()
        .and(root.or(stations).or(station).or(locos).or(loco))
        .recover(handle_rejection)
        .with(warp::reply::with::header("Access-Control-Allow-Origin", "*"))
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        tracing::warn!("Unhandled HTTP rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    Ok(error_reply(message, code))
}

/// HTTP server running on its own thread and runtime
pub struct HttpServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Bind `addr` and start serving `snapshot`.
    ///
    /// Returns once the listener is bound.
    pub fn start(addr: SocketAddr, snapshot: Arc<GatewaySnapshot>) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<SocketAddr, String>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("gateway-http".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let bound = warp::serve(routes(snapshot)).try_bind_with_graceful_shutdown(
                        addr,
                        async move {
                            let _ = shutdown_rx.await;
                        },
                    );
                    match bound {
                        Ok((addr, server)) => {
                            let _ = ready_tx.send(Ok(addr));
                            server.await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                        }
                    }
                });
            })
            .context("Failed to spawn HTTP thread")?;

        let bound = ready_rx
            .recv()
            .map_err(|_| anyhow!("HTTP server thread exited before binding"))
            .and_then(|result| result.map_err(|e| anyhow!("Failed to bind {addr}: {e}")));

        match bound {
            Ok(addr) => {
                tracing::info!("HTTP endpoint listening on http://{}", addr);
                Ok(Self {
                    addr,
                    shutdown_tx: Some(shutdown_tx),
                    thread: Some(thread),
                })
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving and wait for in-flight requests.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("HTTP server thread panicked");
            }
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
