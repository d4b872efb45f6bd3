use blotter_sdk::service::{HealthResponse, StreamError};
use futures::stream::{self, BoxStream, StreamExt};
use wsrpc::Service;

pub struct Health;

impl Service for Health {
    type Req = serde_json::Value;
    type Resp = HealthResponse;
    type Error = StreamError;
    type Ctx = ();

    fn serve(&self, _ctx: (), _req: serde_json::Value) -> BoxStream<'static, Result<HealthResponse, StreamError>> {
        stream::once(futures::future::ok(HealthResponse::ok())).boxed()
    }
}

pub fn service() -> Health {
    Health
}
