//! Multiplexed request/stream RPC over a single websocket.
//!
//! Each connection carries any number of logical calls. A call names a
//! route (`serviceId`), gets its responses as `next` frames and ends with
//! one `complete` or `error` frame. The client steers a call with two
//! control frames: `cancel` tears it down, `demand` grants stream credits
//! against which `next` frames are spent.

mod demand;
mod formats;

use blotter_futures_util::prelude::*;
use demand::{DemandGate, Demanded};
use futures::channel::{mpsc, oneshot};
use futures::stream::BoxStream;
use futures::{future, stream, FutureExt, SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::*;
use warp::filters::ws::{Message, WebSocket};

pub use formats::{ErrorKind, Incoming, Outgoing, ReqId, RequestBody};

/// Outbound frames buffered per connection before the socket pushes back.
const OUTBOUND_BUFFER: usize = 1024;
/// Dead call handles tolerated before the call table is swept.
const CALL_GC_THRESHOLD: usize = 64;
/// Frames one call may write before its pump yields to sibling calls.
const CALL_FAIRNESS: u64 = 64;

pub trait Service {
    type Req: DeserializeOwned;
    type Resp: Serialize + 'static;
    type Error: Serialize + 'static;
    type Ctx: Clone;

    fn serve(&self, ctx: Self::Ctx, req: Self::Req) -> BoxStream<'static, Result<Self::Resp, Self::Error>>;

    fn boxed(self) -> BoxedService<Self::Ctx>
    where
        Self: Send + Sized + Sync + 'static,
    {
        Box::new(self)
    }
}

pub trait WebsocketService<Ctx: Clone> {
    fn serve_ws(&self, ctx: Ctx, raw_req: Value, service_id: &str) -> BoxStream<'static, Result<Value, ErrorKind>>;
}

impl<Req, Resp, Ctx, S> WebsocketService<Ctx> for S
where
    S: Service<Req = Req, Resp = Resp, Ctx = Ctx>,
    Req: DeserializeOwned,
    Resp: Serialize + 'static,
    Ctx: Clone,
{
    fn serve_ws(&self, ctx: Ctx, raw_req: Value, service_id: &str) -> BoxStream<'static, Result<Value, ErrorKind>> {
        let req = match serde_json::from_value(raw_req) {
            Ok(req) => req,
            Err(cause) => {
                warn!("rejecting malformed request for route {}: {}", service_id, cause);
                let message = cause.to_string();
                return stream::once(future::err(ErrorKind::BadRequest { message })).boxed();
            }
        };
        self.serve(ctx, req)
            .map(|result| {
                result
                    .map(|resp| serde_json::to_value(&resp).expect("service responses always serialize"))
                    .map_err(|err| ErrorKind::ServiceError {
                        value: serde_json::to_value(&err).expect("service errors always serialize"),
                    })
            })
            .boxed()
    }
}

pub type BoxedService<Ctx> = Box<dyn WebsocketService<Ctx> + Send + Sync>;

pub async fn serve<Ctx: Clone + Send + 'static>(
    ws: warp::ws::Ws,
    services: Arc<BTreeMap<&'static str, BoxedService<Ctx>>>,
    ctx: Ctx,
) -> Result<impl warp::Reply, warp::Rejection> {
    // Generous frame limits: a snapshot response arrives as one frame and a
    // single row already carries a full order payload.
    Ok(ws
        .max_frame_size(64 << 20)
        .max_message_size(128 << 20)
        .on_upgrade(move |socket| connection_loop(socket, ctx, services)))
}

async fn connection_loop<Ctx: Clone + Send + 'static>(
    ws: WebSocket,
    ctx: Ctx,
    services: Arc<BTreeMap<&'static str, BoxedService<Ctx>>>,
) {
    let (ws_out, mut ws_in) = ws.split();

    // all call pumps merge their frames into one outbound channel
    let (outbound, pump) = mpsc::channel::<Result<Message, warp::Error>>(OUTBOUND_BUFFER);
    tokio::spawn(pump.fuse().forward(ws_out).map(|_| ()));

    let mut connection = Connection {
        ctx,
        services,
        calls: HashMap::new(),
        outbound,
    };
    while let Some(frame) = ws_in.next().await {
        match frame {
            Ok(msg) => {
                if !connection.on_message(msg) {
                    break;
                }
            }
            Err(e) => {
                error!("websocket closed with error {}", e);
                break;
            }
        }
    }
    connection.hang_up();
}

/// Per-connection state: the route table and the calls in flight.
struct Connection<Ctx: Clone> {
    ctx: Ctx,
    services: Arc<BTreeMap<&'static str, BoxedService<Ctx>>>,
    calls: HashMap<ReqId, CallHandle>,
    outbound: mpsc::Sender<Result<Message, warp::Error>>,
}

impl<Ctx: Clone + Send + 'static> Connection<Ctx> {
    /// Dispatch one incoming websocket message. Returns false once the
    /// connection is beyond saving and the read loop should end.
    fn on_message(&mut self, msg: Message) -> bool {
        if self.calls.len() > CALL_GC_THRESHOLD {
            self.calls.retain(|_, call| !call.is_dead());
        }

        let text = if let Ok(text) = msg.to_str() {
            text
        } else if msg.is_ping() {
            // warp answers pings on its own
            return true;
        } else if msg.is_close() {
            info!("closing websocket connection (client disconnected)");
            self.hang_up();
            return false;
        } else {
            error!("expected TEXT websocket message but got binary");
            self.hang_up();
            return false;
        };

        match serde_json::from_str::<Incoming>(text) {
            Ok(Incoming::Request(body)) => self.open_call(body),
            Ok(Incoming::Demand {
                request_id,
                additional,
            }) => {
                if let Some(call) = self.calls.get(&request_id) {
                    call.gate.grant(additional);
                }
            }
            Ok(Incoming::Cancel { request_id }) => {
                if let Some(call) = self.calls.remove(&request_id) {
                    call.abort();
                }
            }
            Err(cause) => {
                error!("could not deserialize client request {}: {}", text, cause);
                self.hang_up();
                return false;
            }
        }
        true
    }

    fn open_call(&mut self, body: RequestBody) {
        let RequestBody {
            service_id,
            request_id,
            payload,
            demand,
        } = body;

        let gate = match demand {
            Some(initial) => DemandGate::with_initial(initial),
            None => DemandGate::unbounded(),
        };

        let frames = match self.services.get(service_id) {
            Some(srv) => call_frames(srv, self.ctx.clone(), gate.clone(), service_id, request_id, payload),
            None => {
                warn!("client tried to access unknown route: {}", service_id);
                self.send_frame(outgoing_text(&Outgoing::Error {
                    request_id,
                    kind: ErrorKind::UnknownEndpoint {
                        endpoint: service_id.to_string(),
                        valid_endpoints: self.services.keys().map(|e| e.to_string()).collect(),
                    },
                }));
                return;
            }
        };

        let (hangup, on_hangup) = oneshot::channel();
        if let Some(previous) = self.calls.insert(request_id, CallHandle { hangup, gate }) {
            previous.abort();
        }

        let outbound = self.outbound.clone();
        let pump = frames
            .take_until_signaled(on_hangup)
            .map(|msg| Ok(Ok(msg)))
            .yield_after(CALL_FAIRNESS)
            .forward(outbound);
        tokio::spawn(pump.map(|result| {
            if let Err(cause) = result {
                error!("multiplexing error {:?}", cause);
            }
        }));
    }

    /// Out-of-band frame for requests that never got a pump of their own.
    fn send_frame(&self, frame: Message) {
        let mut outbound = self.outbound.clone();
        tokio::spawn(async move {
            if outbound.send(Ok(frame)).await.is_err() {
                error!("could not send error frame, connection is gone");
            }
        });
    }

    fn hang_up(&mut self) {
        for (_, call) in self.calls.drain() {
            call.abort();
        }
        self.outbound.close_channel();
    }
}

/// Cancellation handle plus the demand account of one in-flight call.
struct CallHandle {
    hangup: oneshot::Sender<()>,
    gate: DemandGate,
}

impl CallHandle {
    fn is_dead(&self) -> bool {
        self.hangup.is_canceled()
    }

    // dropping the sender would also end the pump, the explicit send just
    // resolves the signal future immediately
    fn abort(self) {
        if self.hangup.send(()).is_ok() {
            debug!("cancelled in-flight response stream");
        }
    }
}

/// The outgoing frame sequence of one call: demand-gated `next` frames
/// behind a panic fence, then the terminal `complete` marker. Built
/// synchronously so the spawned pump owns no borrow of the route table.
fn call_frames<Ctx: Clone>(
    srv: &BoxedService<Ctx>,
    ctx: Ctx,
    gate: DemandGate,
    route: &str,
    request_id: ReqId,
    payload: Value,
) -> impl Stream<Item = Message> {
    let body = Demanded::new(srv.serve_ws(ctx, payload, route), gate).map(move |result| match result {
        Ok(payload) => Outgoing::Next { request_id, payload },
        Err(kind) => Outgoing::Error { request_id, kind },
    });

    AssertUnwindSafe(body)
        .catch_unwind()
        .map(move |frame| {
            frame.unwrap_or(Outgoing::Error {
                request_id,
                kind: ErrorKind::InternalError,
            })
        })
        .chain(stream::once(future::ready(Outgoing::Complete { request_id })))
        .map(|env| outgoing_text(&env))
}

fn outgoing_text(env: &Outgoing) -> Message {
    Message::text(serde_json::to_string(env).expect("response envelopes always serialize"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blotter_sdk::{
        service::{OrderEvent, StreamError},
        EventId, EventKind, Filter, FilterCondition, FilterOperator, OrderPayload,
    };
    use serde_json::json;
    use std::net::SocketAddr;
    use websocket::{ClientBuilder, OwnedMessage};

    /// Serves the orders it holds, narrowed by an `EQ` condition on
    /// `symbol` when the filter carries one.
    struct OrderFeed {
        orders: Vec<OrderEvent>,
    }

    impl OrderFeed {
        fn with_symbols(symbols: &[&str]) -> Self {
            let orders = symbols
                .iter()
                .enumerate()
                .map(|(i, symbol)| order(i as u64 + 1, symbol))
                .collect();
            Self { orders }
        }
    }

    impl Service for OrderFeed {
        type Req = Filter;
        type Resp = OrderEvent;
        type Error = StreamError;
        type Ctx = String;

        fn serve(&self, _desk: String, filter: Filter) -> BoxStream<'static, Result<OrderEvent, StreamError>> {
            let wanted = filter
                .filters
                .iter()
                .find(|c| c.field == "symbol" && c.operator == FilterOperator::Eq)
                .map(|c| c.value.clone());
            let matching: Vec<_> = self
                .orders
                .iter()
                .filter(|o| match (&wanted, &o.order.symbol) {
                    (None, _) => true,
                    (Some(w), Some(s)) => s.eq_ignore_ascii_case(w),
                    (Some(_), None) => false,
                })
                .cloned()
                .map(Ok)
                .collect();
            stream::iter(matching).boxed()
        }
    }

    /// Answers with the desk id the connection was opened under.
    struct DeskInfo;

    impl Service for DeskInfo {
        type Req = Value;
        type Resp = String;
        type Error = StreamError;
        type Ctx = String;

        fn serve(&self, desk: String, _req: Value) -> BoxStream<'static, Result<String, StreamError>> {
            stream::once(future::ok(desk)).boxed()
        }
    }

    /// Stand-in for a route whose upstream is gone.
    struct Degraded;

    impl Service for Degraded {
        type Req = Filter;
        type Resp = OrderEvent;
        type Error = StreamError;
        type Ctx = String;

        fn serve(&self, _desk: String, _filter: Filter) -> BoxStream<'static, Result<OrderEvent, StreamError>> {
            stream::once(future::err(StreamError::UpstreamUnavailable)).boxed()
        }
    }

    /// Stand-in for a route with a defect; the connection must survive it.
    struct Poisoned;

    impl Service for Poisoned {
        type Req = Filter;
        type Resp = OrderEvent;
        type Error = StreamError;
        type Ctx = String;

        fn serve(&self, _desk: String, _filter: Filter) -> BoxStream<'static, Result<OrderEvent, StreamError>> {
            stream::poll_fn(|_| panic!("defective route")).boxed()
        }
    }

    fn order(id: u64, symbol: &str) -> OrderEvent {
        OrderEvent {
            event_type: EventKind::Update,
            order_id: format!("O-{}", id),
            event_id: EventId::new(id),
            sequence_number: None,
            timestamp: "2024-05-02T09:30:00Z".parse().unwrap(),
            order: OrderPayload {
                order_id: format!("O-{}", id),
                symbol: Some(symbol.to_owned()),
                ..Default::default()
            },
        }
    }

    async fn start_blotter_ws(feed: OrderFeed) -> SocketAddr {
        let services: Arc<BTreeMap<&'static str, BoxedService<String>>> = Arc::new(maplit::btreemap! {
            "orders.feed"     => feed.boxed(),
            "desk.info"       => DeskInfo.boxed(),
            "orders.degraded" => Degraded.boxed(),
            "orders.poisoned" => Poisoned.boxed(),
        });
        use warp::Filter as _;
        let route = warp::path("blotter")
            .and(warp::ws())
            .and(warp::any().map(move || services.clone()))
            .and(warp::any().map(|| "desk-7".to_owned()))
            .and_then(super::serve);
        let (addr, task) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(task);
        addr
    }

    /// Blocking test client speaking the frame protocol. Frames of calls
    /// other than the one being waited on are parked, not dropped, so one
    /// client can interleave several calls on the same socket.
    struct DeskClient {
        sender: websocket::sender::Writer<std::net::TcpStream>,
        receiver: websocket::receiver::Reader<std::net::TcpStream>,
        parked: Vec<Outgoing>,
    }

    impl DeskClient {
        fn connect(addr: SocketAddr) -> Self {
            let client = ClientBuilder::new(&format!("ws://{}/blotter", addr))
                .expect("invalid websocket url")
                .connect_insecure()
                .expect("could not reach the blotter endpoint");
            let (receiver, sender) = client.split().unwrap();
            Self {
                sender,
                receiver,
                parked: Vec::new(),
            }
        }

        fn send(&mut self, frame: &Incoming) {
            let raw = serde_json::to_string(frame).expect("request envelopes always serialize");
            self.sender
                .send_message(&OwnedMessage::Text(raw))
                .expect("could not send frame");
        }

        fn open(&mut self, route: &str, id: u64, payload: Value, demand: Option<u64>) {
            self.send(&Incoming::Request(RequestBody {
                service_id: route,
                request_id: ReqId(id),
                payload,
                demand,
            }));
        }

        fn grant(&mut self, id: u64, additional: u64) {
            self.send(&Incoming::Demand {
                request_id: ReqId(id),
                additional,
            });
        }

        fn cancel(&mut self, id: u64) {
            self.send(&Incoming::Cancel { request_id: ReqId(id) });
        }

        fn next_frame(&mut self, id: u64) -> Outgoing {
            if let Some(pos) = self.parked.iter().position(|f| f.request_id().0 == id) {
                return self.parked.remove(pos);
            }
            for msg in self.receiver.incoming_messages() {
                if let OwnedMessage::Text(raw) = msg.expect("websocket transport error") {
                    let frame: Outgoing = serde_json::from_str(&raw).expect("undecodable response envelope");
                    if frame.request_id().0 == id {
                        return frame;
                    }
                    self.parked.push(frame);
                }
            }
            panic!("connection ended while call {} was still open", id);
        }

        fn parked_frames(&self, id: u64) -> usize {
            self.parked.iter().filter(|f| f.request_id().0 == id).count()
        }

        fn collect<R: DeserializeOwned>(&mut self, id: u64) -> (Vec<R>, Outgoing) {
            let mut items = Vec::new();
            loop {
                match self.next_frame(id) {
                    Outgoing::Next { payload, .. } => {
                        items.push(serde_json::from_value(payload).expect("undecodable payload"))
                    }
                    terminal => return (items, terminal),
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn streams_the_matching_orders() {
        let addr = start_blotter_ws(OrderFeed::with_symbols(&["INTC", "AAPL", "intc"])).await;

        let (orders, terminal) = tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            let filter = Filter::matching(vec![FilterCondition::new("symbol", FilterOperator::Eq, "INTC")]);
            desk.open("orders.feed", 1, serde_json::to_value(&filter).unwrap(), None);
            desk.collect::<OrderEvent>(1)
        })
        .await
        .unwrap();

        assert_eq!(
            orders.iter().map(|o| o.event_id.as_u64()).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(terminal, Outgoing::Complete { request_id: ReqId(1) });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn the_connection_context_reaches_every_route() {
        let addr = start_blotter_ws(OrderFeed::with_symbols(&[])).await;

        let (info, terminal) = tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("desk.info", 4, json!(null), None);
            desk.collect::<String>(4)
        })
        .await
        .unwrap();

        assert_eq!(info, vec!["desk-7"]);
        assert_eq!(terminal, Outgoing::Complete { request_id: ReqId(4) });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bulky_order_payloads_round_trip() {
        let mut big = order(1, "INTC");
        big.order.text = Some("x".repeat(4 << 20));
        let addr = start_blotter_ws(OrderFeed { orders: vec![big] }).await;

        let (orders, _) = tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.feed", 1, json!({}), None);
            desk.collect::<OrderEvent>(1)
        })
        .await
        .unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order.text.as_deref().map(str::len), Some(4 << 20));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn many_desks_stream_concurrently() {
        let addr = start_blotter_ws(OrderFeed {
            orders: (1..=40).map(|i| order(i, "INTC")).collect(),
        })
        .await;

        let desks: Vec<_> = (0..8u64)
            .map(|d| {
                std::thread::spawn(move || {
                    let mut desk = DeskClient::connect(addr);
                    desk.open("orders.feed", d, json!({}), None);
                    desk.collect::<OrderEvent>(d).0
                })
            })
            .collect();

        for handle in desks {
            let orders = handle.join().unwrap();
            assert_eq!(
                orders.iter().map(|o| o.event_id.as_u64()).collect::<Vec<_>>(),
                (1..=40).collect::<Vec<_>>()
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn demand_credits_gate_the_stream() {
        let addr = start_blotter_ws(OrderFeed {
            orders: (1..=5).map(|i| order(i, "INTC")).collect(),
        })
        .await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.feed", 7, json!({}), Some(2));

            let mut early = Vec::new();
            for _ in 0..2 {
                match desk.next_frame(7) {
                    Outgoing::Next { payload, .. } => {
                        early.push(serde_json::from_value::<OrderEvent>(payload).unwrap().event_id.as_u64())
                    }
                    other => panic!("expected a gated next frame, got {:?}", other),
                }
            }
            assert_eq!(early, vec![1, 2]);

            // topping the account up releases the rest and the completion
            desk.grant(7, 3);
            let (rest, terminal) = desk.collect::<OrderEvent>(7);
            assert_eq!(
                rest.iter().map(|o| o.event_id.as_u64()).collect::<Vec<_>>(),
                vec![3, 4, 5]
            );
            assert_eq!(terminal, Outgoing::Complete { request_id: ReqId(7) });
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn parked_calls_do_not_hold_up_their_siblings() {
        let addr = start_blotter_ws(OrderFeed {
            orders: (1..=3).map(|i| order(i, "INTC")).collect(),
        })
        .await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.feed", 10, json!({}), Some(0));
            desk.open("desk.info", 11, json!(null), None);

            let (info, terminal) = desk.collect::<String>(11);
            assert_eq!(info, vec!["desk-7"]);
            assert_eq!(terminal, Outgoing::Complete { request_id: ReqId(11) });
            // the parked call produced nothing while it had no credits
            assert_eq!(desk.parked_frames(10), 0);

            desk.grant(10, 4);
            let (orders, terminal) = desk.collect::<OrderEvent>(10);
            assert_eq!(orders.len(), 3);
            assert_eq!(terminal, Outgoing::Complete { request_id: ReqId(10) });
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_routes_list_the_valid_ones() {
        let addr = start_blotter_ws(OrderFeed::with_symbols(&[])).await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.stream", 49, json!({}), None);
            match desk.next_frame(49) {
                Outgoing::Error {
                    kind: ErrorKind::UnknownEndpoint {
                        endpoint,
                        valid_endpoints,
                    },
                    ..
                } => {
                    assert_eq!(endpoint, "orders.stream");
                    assert_eq!(
                        valid_endpoints,
                        vec!["desk.info", "orders.degraded", "orders.feed", "orders.poisoned"]
                    );
                }
                other => panic!("expected an unknown-endpoint error, got {:?}", other),
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_filters_are_rejected_per_call() {
        let addr = start_blotter_ws(OrderFeed::with_symbols(&[])).await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.feed", 3, json!({"filters": 7}), None);
            match desk.next_frame(3) {
                Outgoing::Error {
                    kind: ErrorKind::BadRequest { message },
                    ..
                } => assert!(message.contains("invalid type"), "unexpected message: {}", message),
                other => panic!("expected a bad-request error, got {:?}", other),
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_degraded_route_reports_its_structured_error() {
        let addr = start_blotter_ws(OrderFeed::with_symbols(&[])).await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.degraded", 5, json!({}), None);
            match desk.next_frame(5) {
                Outgoing::Error {
                    kind: ErrorKind::ServiceError { value },
                    ..
                } => assert_eq!(value["code"], "UPSTREAM_UNAVAILABLE"),
                other => panic!("expected a service error, got {:?}", other),
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_defective_route_does_not_take_the_connection_down() {
        let addr = start_blotter_ws(OrderFeed::with_symbols(&[])).await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.poisoned", 1, json!({}), None);
            match desk.next_frame(1) {
                Outgoing::Error {
                    kind: ErrorKind::InternalError,
                    ..
                } => {}
                other => panic!("expected the panic to surface as an internal error, got {:?}", other),
            }

            // the connection survives and keeps serving other calls
            desk.open("desk.info", 2, json!(null), None);
            let (info, _) = desk.collect::<String>(2);
            assert_eq!(info, vec!["desk-7"]);
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_tears_down_only_the_addressed_call() {
        let addr = start_blotter_ws(OrderFeed {
            orders: (1..=3).map(|i| order(i, "INTC")).collect(),
        })
        .await;

        tokio::task::spawn_blocking(move || {
            let mut desk = DeskClient::connect(addr);
            desk.open("orders.feed", 8, json!({}), Some(1));
            match desk.next_frame(8) {
                Outgoing::Next { .. } => {}
                other => panic!("expected one gated next frame, got {:?}", other),
            }
            desk.cancel(8);

            // a fresh call on the same socket is unaffected
            desk.open("desk.info", 9, json!(null), None);
            let (info, _) = desk.collect::<String>(9);
            assert_eq!(info, vec!["desk-7"]);
            // the cancelled call went quiet, not even a completion marker
            assert_eq!(desk.parked_frames(8), 0);
        })
        .await
        .unwrap();
    }
}
