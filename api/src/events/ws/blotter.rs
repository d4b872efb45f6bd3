use blotter_sdk::{
    service::{BlotterEvent, StreamError},
    StreamRequest,
};
use futures::stream::{self, BoxStream, StreamExt};
use wsrpc::Service;

use crate::events::service::EventService;

/// The unified stream: orders and executions multiplexed into one output,
/// steered by the `streamType` of the request.
pub struct Blotter {
    event_service: EventService,
}

impl Service for Blotter {
    type Req = StreamRequest;
    type Resp = BlotterEvent;
    type Error = StreamError;
    type Ctx = ();

    fn serve(&self, _ctx: (), req: StreamRequest) -> BoxStream<'static, Result<BlotterEvent, StreamError>> {
        match self.event_service.blotter_stream(req) {
            Ok(stream) => stream,
            Err(e) => stream::once(futures::future::err(e)).boxed(),
        }
    }
}

pub fn service(event_service: EventService) -> Blotter {
    Blotter { event_service }
}
