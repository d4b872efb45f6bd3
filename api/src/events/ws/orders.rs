use blotter_sdk::{service::OrderEvent, service::StreamError, Filter};
use futures::stream::{self, BoxStream, StreamExt};
use wsrpc::Service;

use crate::events::service::EventService;

pub struct Orders {
    event_service: EventService,
}

impl Service for Orders {
    type Req = Filter;
    type Resp = OrderEvent;
    type Error = StreamError;
    type Ctx = ();

    fn serve(&self, _ctx: (), req: Filter) -> BoxStream<'static, Result<OrderEvent, StreamError>> {
        match self.event_service.orders_stream(req) {
            Ok(stream) => stream,
            Err(e) => stream::once(futures::future::err(e)).boxed(),
        }
    }
}

pub fn service(event_service: EventService) -> Orders {
    Orders { event_service }
}
