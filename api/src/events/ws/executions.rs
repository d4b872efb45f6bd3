use blotter_sdk::{service::ExecutionEvent, service::StreamError, Filter};
use futures::stream::{self, BoxStream, StreamExt};
use wsrpc::Service;

use crate::events::service::EventService;

pub struct Executions {
    event_service: EventService,
}

impl Service for Executions {
    type Req = Filter;
    type Resp = ExecutionEvent;
    type Error = StreamError;
    type Ctx = ();

    fn serve(&self, _ctx: (), req: Filter) -> BoxStream<'static, Result<ExecutionEvent, StreamError>> {
        match self.event_service.executions_stream(req) {
            Ok(stream) => stream,
            Err(e) => stream::once(futures::future::err(e)).boxed(),
        }
    }
}

pub fn service(event_service: EventService) -> Executions {
    Executions { event_service }
}
