//! The client-facing surface: the subscription engine and the websocket
//! route layer that carries it.

mod events;
mod hyper_serve;

use std::net::SocketAddr;

use futures::Future;
use warp::*;

pub use crate::events::service::{EngineConfig, EventService, TopicResources};

/// Bind the API and return the bound address plus the serve task. The
/// caller owns the task's lifetime; aborting it is the shutdown path.
pub fn serve(
    event_service: EventService,
    bind_to: SocketAddr,
) -> anyhow::Result<(SocketAddr, impl Future<Output = anyhow::Result<()>>)> {
    let api = routes(event_service);
    let (addr, task) = hyper_serve::serve_it(bind_to, api.boxed())?;
    tracing::info!(%addr, "API bound");
    Ok((addr, task))
}

fn routes(event_service: EventService) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let events = events::ws::routes(event_service);

    let log = warp::log::custom(|info| {
        tracing::debug!(
            remote_addr = ?info.remote_addr(),
            method = %info.method(),
            path = %info.path(),
            status = %info.status().as_u16(),
            elapsed = ?info.elapsed(),
            "processed request"
        );
    });

    path!("api" / "v1" / "events" / ..).and(events).with(log)
}
