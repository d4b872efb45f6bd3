use std::sync::Arc;

use maplit::btreemap;
use warp::*;
use wsrpc::Service;

use crate::events::service::EventService;

mod blotter;
mod executions;
mod executions_snapshot;
mod health;
mod orders;
mod orders_snapshot;

pub(crate) fn routes(
    event_service: EventService,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let services = Arc::new(btreemap! {
      "orders.stream"       => orders::service(event_service.clone()).boxed(),
      "executions.stream"   => executions::service(event_service.clone()).boxed(),
      "blotter.stream"      => blotter::service(event_service.clone()).boxed(),
      "orders.snapshot"     => orders_snapshot::service(event_service.clone()).boxed(),
      "executions.snapshot" => executions_snapshot::service(event_service).boxed(),
      "health"              => health::service().boxed(),
    });

    warp::path::end()
        .and(warp::ws())
        .and(warp::any().map(move || services.clone()))
        .and(warp::any().map(|| ()))
        .and_then(wsrpc::serve)
}
