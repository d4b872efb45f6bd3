use blotter_sdk::{service::OrderEvent, service::StreamError, Filter};
use futures::{stream::BoxStream, FutureExt, StreamExt};
use wsrpc::Service;

use crate::events::service::EventService;

/// Request/response shape: the whole filtered snapshot as a single frame.
pub struct OrdersSnapshot {
    event_service: EventService,
}

impl Service for OrdersSnapshot {
    type Req = Filter;
    type Resp = Vec<OrderEvent>;
    type Error = StreamError;
    type Ctx = ();

    fn serve(&self, _ctx: (), req: Filter) -> BoxStream<'static, Result<Vec<OrderEvent>, StreamError>> {
        let service = self.event_service.clone();
        async move { service.orders_snapshot(req).await }.into_stream().boxed()
    }
}

pub fn service(event_service: EventService) -> OrdersSnapshot {
    OrdersSnapshot { event_service }
}
