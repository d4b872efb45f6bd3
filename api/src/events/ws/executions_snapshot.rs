use blotter_sdk::{service::ExecutionEvent, service::StreamError, Filter};
use futures::{stream::BoxStream, FutureExt, StreamExt};
use wsrpc::Service;

use crate::events::service::EventService;

pub struct ExecutionsSnapshot {
    event_service: EventService,
}

impl Service for ExecutionsSnapshot {
    type Req = Filter;
    type Resp = Vec<ExecutionEvent>;
    type Error = StreamError;
    type Ctx = ();

    fn serve(&self, _ctx: (), req: Filter) -> BoxStream<'static, Result<Vec<ExecutionEvent>, StreamError>> {
        let service = self.event_service.clone();
        async move { service.executions_snapshot(req).await }.into_stream().boxed()
    }
}

pub fn service(event_service: EventService) -> ExecutionsSnapshot {
    ExecutionsSnapshot { event_service }
}
