use crate::gui_bridge::model::DisplayModel;
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde_json::json;
use spectrocore::interface::ControlCommand;
use std::{
    net::SocketAddr,
    sync::{mpsc, Arc, PoisonError, RwLock},
    thread,
};
use tokio::runtime::Builder;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use warp::{http::StatusCode, hyper::body::Bytes, Filter};

const MAX_CONTROL_BODY: u64 = 4096;

type SharedModel = Arc<RwLock<DisplayModel>>;

/// Bridge that hosts the telemetry HTTP endpoint and forwards control
/// messages to the running chain.
pub struct TelemetryBridge {
    state: SharedModel,
    controls: UnboundedSender<ControlCommand>,
}

impl TelemetryBridge {
    /// Returns the bridge and the receiving end of its control channel.
    pub fn new() -> (Self, UnboundedReceiver<ControlCommand>) {
        let (controls, receiver) = unbounded_channel();
        let bridge = Self {
            state: Arc::new(RwLock::new(DisplayModel::default())),
            controls,
        };
        (bridge, receiver)
    }

    /// Starts the HTTP server on its own thread and returns the bound address.
    pub fn serve(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let routes = routes(self.state.clone(), self.controls.clone());
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building telemetry runtime")?;
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("telemetry-bridge".into())
            .spawn(move || {
                runtime.block_on(async move {
                    match warp::serve(routes).try_bind_ephemeral(addr) {
                        Ok((bound, server)) => {
                            let _ = ready_tx.send(Ok(bound));
                            server.await;
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(err.to_string()));
                        }
                    }
                });
            })
            .context("spawning telemetry thread")?;

        let bound = ready_rx
            .recv()
            .context("telemetry thread exited before binding")?
            .map_err(|err| anyhow!("binding telemetry endpoint {}: {}", addr, err))?;
        info!("telemetry bridge listening on http://{}", bound);
        Ok(bound)
    }

    /// Replaces the published spectrum; the current status line is kept.
    pub fn publish(&self, model: &DisplayModel) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let status = std::mem::take(&mut guard.status);
        *guard = model.clone();
        guard.status = status;
        debug!(
            "published {} channels, {} spectra so far",
            guard.power.len(),
            guard.metrics.spectra_emitted
        );
    }

    pub fn publish_status(&self, message: &str) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        guard.status = message.to_string();
        info!("[telemetry] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> DisplayModel {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    fn control_sender(&self) -> UnboundedSender<ControlCommand> {
        self.controls.clone()
    }
}

fn routes(
    state: SharedModel,
    controls: UnboundedSender<ControlCommand>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let telemetry = warp::path("telemetry")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::any().map(move || state.clone()))
        .map(|state: SharedModel| {
            let model = state.read().unwrap_or_else(PoisonError::into_inner);
            warp::reply::json(&*model)
        });

    let control = warp::path("control")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_CONTROL_BODY))
        .and(warp::body::bytes())
        .and(warp::any().map(move || controls.clone()))
        .map(|body: Bytes, controls: UnboundedSender<ControlCommand>| {
            let (status, reply) = handle_control(&body, &controls);
            warp::reply::with_status(warp::reply::json(&reply), status)
        });

    telemetry.or(control)
}

fn handle_control(
    body: &[u8],
    controls: &UnboundedSender<ControlCommand>,
) -> (StatusCode, serde_json::Value) {
    let parsed = std::str::from_utf8(body)
        .map_err(|err| err.to_string())
        .and_then(|text| ControlCommand::parse(text).map_err(|err| err.to_string()));
    match parsed {
        Ok(command) => match controls.send(command) {
            Ok(()) => (StatusCode::ACCEPTED, json!({"status": "accepted"})),
            Err(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"status": "rejected", "error": "pipeline is not running"}),
            ),
        },
        Err(error) => (
            StatusCode::BAD_REQUEST,
            json!({"status": "rejected", "error": error}),
        ),
    }
}
