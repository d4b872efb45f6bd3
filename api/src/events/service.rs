use blotter_futures_util::stream::Variable;
use blotter_sdk::{
    service::{BlotterEvent, ExecutionEvent, OrderEvent, StreamError},
    Event, EventId, EventKind, Filter, FilterOperator, PayloadKind, StreamRequest, StreamType,
};
use fnv::FnvHashSet;
use futures::{
    future,
    stream::{BoxStream, StreamExt},
};
use genawaiter::sync::{Co, Gen};
use hub::{query_client::SnapshotError, BlotterCache, EventHub, Inbox, IngestState, QueryClient};
use runtime::Query;
use std::{sync::Arc, time::Duration};

/// Everything one topic contributes to the engine: its hub, its key cache
/// and the observable consumer state.
#[derive(Clone)]
pub struct TopicResources {
    pub hub: EventHub,
    pub cache: BlotterCache,
    pub state: Variable<IngestState>,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long the snapshot id set is kept after the live phase starts.
    pub snapshot_id_grace: Duration,
    /// Reject new subscriptions while the relevant consumer is not RUNNING.
    pub require_running: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_id_grace: Duration::from_secs(5),
            require_running: true,
        }
    }
}

#[derive(Clone)]
pub struct EventService {
    orders: TopicResources,
    executions: TopicResources,
    query: QueryClient,
    config: EngineConfig,
}

impl EventService {
    pub fn new(orders: TopicResources, executions: TopicResources, query: QueryClient, config: EngineConfig) -> Self {
        Self {
            orders,
            executions,
            query,
            config,
        }
    }

    /// Stream for the `orders.stream` route: filtered snapshot first (if
    /// requested), then the matching live feed, deduplicated across the
    /// boundary.
    pub fn orders_stream(
        &self,
        filter: Filter,
    ) -> Result<BoxStream<'static, Result<OrderEvent, StreamError>>, StreamError> {
        let stream = self.subscribe_kind(PayloadKind::Order, filter)?;
        Ok(stream
            .filter_map(|item| {
                future::ready(match item {
                    Ok(ev) => OrderEvent::from_event(&ev).map(Ok),
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed())
    }

    /// Stream for the `executions.stream` route.
    pub fn executions_stream(
        &self,
        filter: Filter,
    ) -> Result<BoxStream<'static, Result<ExecutionEvent, StreamError>>, StreamError> {
        let stream = self.subscribe_kind(PayloadKind::Execution, filter)?;
        Ok(stream
            .filter_map(|item| {
                future::ready(match item {
                    Ok(ev) => ExecutionEvent::from_event(&ev).map(Ok),
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed())
    }

    /// Stream for the `blotter.stream` route. `ALL` multiplexes an order
    /// and an execution subscription into one output; the snapshots are
    /// emitted source-first (orders, then executions), the live phases
    /// merge with per-source dedup and demand accounting.
    pub fn blotter_stream(
        &self,
        request: StreamRequest,
    ) -> Result<BoxStream<'static, Result<BlotterEvent, StreamError>>, StreamError> {
        match request.stream_type {
            StreamType::Orders => {
                let stream = self.subscribe_kind(PayloadKind::Order, request.filter)?;
                Ok(stream.map(|item| item.map(|ev| BlotterEvent::from_event(&ev))).boxed())
            }
            StreamType::Executions => {
                let stream = self.subscribe_kind(PayloadKind::Execution, request.filter)?;
                Ok(stream.map(|item| item.map(|ev| BlotterEvent::from_event(&ev))).boxed())
            }
            StreamType::All => self.blotter_all(request.filter),
        }
    }

    /// Full filtered snapshot for the `orders.snapshot` route. Falls back
    /// to the key cache (as `CACHE` events) when the query API cannot be
    /// reached at all.
    pub async fn orders_snapshot(&self, filter: Filter) -> Result<Vec<OrderEvent>, StreamError> {
        let mut filter = filter;
        strip_like_wildcards(&mut filter);
        let query = Query::compile(PayloadKind::Order, &filter).map_err(invalid_filter)?;
        match self.collect_snapshot(PayloadKind::Order, &filter, &query).await {
            Ok(events) => Ok(events
                .iter()
                .filter_map(|ev| OrderEvent::from_event(ev))
                .collect()),
            Err(e) if unreachable_api(&e) => {
                tracing::warn!("query API unreachable, serving orders snapshot from cache: {}", e);
                Ok(self
                    .cache_snapshot(&self.orders.cache, &query)
                    .iter()
                    .filter_map(|ev| OrderEvent::from_event(ev))
                    .collect())
            }
            Err(e) => Err(snapshot_failed(&e)),
        }
    }

    /// Full filtered snapshot for the `executions.snapshot` route.
    pub async fn executions_snapshot(&self, filter: Filter) -> Result<Vec<ExecutionEvent>, StreamError> {
        let mut filter = filter;
        strip_like_wildcards(&mut filter);
        let query = Query::compile(PayloadKind::Execution, &filter).map_err(invalid_filter)?;
        match self.collect_snapshot(PayloadKind::Execution, &filter, &query).await {
            Ok(events) => Ok(events
                .iter()
                .filter_map(|ev| ExecutionEvent::from_event(ev))
                .collect()),
            Err(e) if unreachable_api(&e) => {
                tracing::warn!("query API unreachable, serving executions snapshot from cache: {}", e);
                Ok(self
                    .cache_snapshot(&self.executions.cache, &query)
                    .iter()
                    .filter_map(|ev| ExecutionEvent::from_event(ev))
                    .collect())
            }
            Err(e) => Err(snapshot_failed(&e)),
        }
    }

    fn topic(&self, kind: PayloadKind) -> &TopicResources {
        match kind {
            PayloadKind::Order => &self.orders,
            PayloadKind::Execution => &self.executions,
        }
    }

    fn check_available(&self, kind: PayloadKind) -> Result<(), StreamError> {
        if self.config.require_running && self.topic(kind).state.get() != IngestState::Running {
            return Err(StreamError::UpstreamUnavailable);
        }
        Ok(())
    }

    /// One subscription over one payload kind. The hub attach happens
    /// before the snapshot fetch starts, so every live event that races
    /// the snapshot waits in the inbox and passes through the dedup set.
    fn subscribe_kind(
        &self,
        kind: PayloadKind,
        mut filter: Filter,
    ) -> Result<BoxStream<'static, Result<Arc<Event>, StreamError>>, StreamError> {
        strip_like_wildcards(&mut filter);
        let query = Query::compile(kind, &filter).map_err(invalid_filter)?;
        self.check_available(kind)?;
        let inbox = self.topic(kind).hub.subscribe();
        let snapshot = query
            .include_snapshot()
            .then(|| self.query.fetch_snapshot(kind, &filter));
        Ok(subscription_stream(query, inbox, snapshot, self.config.snapshot_id_grace))
    }

    fn blotter_all(&self, filter: Filter) -> Result<BoxStream<'static, Result<BlotterEvent, StreamError>>, StreamError> {
        let mut filter = filter;
        strip_like_wildcards(&mut filter);
        // the filter must make sense for both sources
        let orders_query = Query::compile(PayloadKind::Order, &filter).map_err(invalid_filter)?;
        let executions_query = Query::compile(PayloadKind::Execution, &filter).map_err(invalid_filter)?;
        self.check_available(PayloadKind::Order)?;
        self.check_available(PayloadKind::Execution)?;

        let orders_inbox = self.orders.hub.subscribe();
        let executions_inbox = self.executions.hub.subscribe();
        let include_snapshot = orders_query.include_snapshot();
        let orders_snapshot = include_snapshot.then(|| self.query.fetch_snapshot(PayloadKind::Order, &filter));
        let executions_snapshot =
            include_snapshot.then(|| self.query.fetch_snapshot(PayloadKind::Execution, &filter));
        Ok(blotter_all_stream(
            orders_query,
            executions_query,
            orders_inbox,
            executions_inbox,
            orders_snapshot,
            executions_snapshot,
            self.config.snapshot_id_grace,
        ))
    }

    async fn collect_snapshot(
        &self,
        kind: PayloadKind,
        filter: &Filter,
        query: &Query,
    ) -> Result<Vec<Event>, SnapshotError> {
        let mut stream = self.query.fetch_snapshot(kind, filter);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            let event = item?;
            if query.eval(&event) {
                out.push(event);
            }
        }
        Ok(out)
    }

    fn cache_snapshot(&self, cache: &BlotterCache, query: &Query) -> Vec<Event> {
        cache
            .snapshot()
            .into_iter()
            .filter(|ev| query.eval(ev))
            .map(|ev| {
                let mut ev = (*ev).clone();
                ev.kind = EventKind::Cache;
                ev
            })
            .collect()
    }
}

/// The snapshot-then-live generator for one subscription.
fn subscription_stream(
    query: Query,
    mut inbox: Inbox,
    snapshot: Option<BoxStream<'static, Result<Event, SnapshotError>>>,
    grace: Duration,
) -> BoxStream<'static, Result<Arc<Event>, StreamError>> {
    Gen::new(move |co: Co<Result<Arc<Event>, StreamError>>| async move {
        let mut snapshot_ids: FnvHashSet<EventId> = FnvHashSet::default();

        if let Some(mut snapshot) = snapshot {
            while let Some(next) = snapshot.next().await {
                match next {
                    Ok(event) => {
                        if !query.eval(&event) {
                            continue;
                        }
                        snapshot_ids.insert(event.event_id);
                        co.yield_(Ok(Arc::new(event))).await;
                    }
                    Err(e) => {
                        tracing::warn!("aborting subscription during snapshot: {}", e);
                        co.yield_(Err(snapshot_failed(&e))).await;
                        return;
                    }
                }
            }
        }

        // live phase; the dedup set is reclaimed once the grace window has
        // passed, anything still racing the boundary has been drained by then
        let mut overflow_seen = 0u64;
        let gc = tokio::time::sleep(grace);
        tokio::pin!(gc);
        loop {
            tokio::select! {
                biased;
                _ = &mut gc, if !snapshot_ids.is_empty() => {
                    snapshot_ids = FnvHashSet::default();
                }
                next = inbox.next() => {
                    let Some(event) = next else { break };
                    let dropped = inbox.dropped();
                    if dropped > overflow_seen {
                        tracing::warn!(n = dropped - overflow_seen, "subscription inbox overflowed");
                        overflow_seen = dropped;
                    }
                    if snapshot_ids.contains(&event.event_id) {
                        continue;
                    }
                    if !query.eval(&event) {
                        continue;
                    }
                    co.yield_(Ok(event)).await;
                }
            }
        }
    })
    .boxed()
}

/// The merged generator behind `blotter.stream` with `streamType: ALL`.
fn blotter_all_stream(
    orders_query: Query,
    executions_query: Query,
    mut orders_inbox: Inbox,
    mut executions_inbox: Inbox,
    orders_snapshot: Option<BoxStream<'static, Result<Event, SnapshotError>>>,
    executions_snapshot: Option<BoxStream<'static, Result<Event, SnapshotError>>>,
    grace: Duration,
) -> BoxStream<'static, Result<BlotterEvent, StreamError>> {
    Gen::new(move |co: Co<Result<BlotterEvent, StreamError>>| async move {
        let mut order_ids: FnvHashSet<EventId> = FnvHashSet::default();
        let mut execution_ids: FnvHashSet<EventId> = FnvHashSet::default();

        // source-first interleaving: the whole orders snapshot, then the
        // whole executions snapshot
        if let Some(mut snapshot) = orders_snapshot {
            if !drain_snapshot(&co, &mut snapshot, &orders_query, &mut order_ids).await {
                return;
            }
        }
        if let Some(mut snapshot) = executions_snapshot {
            if !drain_snapshot(&co, &mut snapshot, &executions_query, &mut execution_ids).await {
                return;
            }
        }

        let mut orders_overflow = 0u64;
        let mut executions_overflow = 0u64;
        let mut orders_done = false;
        let mut executions_done = false;
        let gc = tokio::time::sleep(grace);
        tokio::pin!(gc);
        loop {
            tokio::select! {
                biased;
                _ = &mut gc, if !order_ids.is_empty() || !execution_ids.is_empty() => {
                    order_ids = FnvHashSet::default();
                    execution_ids = FnvHashSet::default();
                }
                next = orders_inbox.next(), if !orders_done => {
                    match next {
                        Some(event) => {
                            let dropped = orders_inbox.dropped();
                            if dropped > orders_overflow {
                                tracing::warn!(n = dropped - orders_overflow, "blotter orders inbox overflowed");
                                orders_overflow = dropped;
                            }
                            if !order_ids.contains(&event.event_id) && orders_query.eval(&event) {
                                co.yield_(Ok(BlotterEvent::from_event(&event))).await;
                            }
                        }
                        None => orders_done = true,
                    }
                }
                next = executions_inbox.next(), if !executions_done => {
                    match next {
                        Some(event) => {
                            let dropped = executions_inbox.dropped();
                            if dropped > executions_overflow {
                                tracing::warn!(n = dropped - executions_overflow, "blotter executions inbox overflowed");
                                executions_overflow = dropped;
                            }
                            if !execution_ids.contains(&event.event_id) && executions_query.eval(&event) {
                                co.yield_(Ok(BlotterEvent::from_event(&event))).await;
                            }
                        }
                        None => executions_done = true,
                    }
                }
                else => break,
            }
        }
    })
    .boxed()
}

async fn drain_snapshot(
    co: &Co<Result<BlotterEvent, StreamError>>,
    snapshot: &mut BoxStream<'static, Result<Event, SnapshotError>>,
    query: &Query,
    ids: &mut FnvHashSet<EventId>,
) -> bool {
    while let Some(next) = snapshot.next().await {
        match next {
            Ok(event) => {
                if !query.eval(&event) {
                    continue;
                }
                ids.insert(event.event_id);
                co.yield_(Ok(BlotterEvent::from_event(&event))).await;
            }
            Err(e) => {
                tracing::warn!("aborting blotter subscription during snapshot: {}", e);
                co.yield_(Err(snapshot_failed(&e))).await;
                return false;
            }
        }
    }
    true
}

/// Transport-layer LIKE wildcards are stripped before the filter reaches
/// the compiler; containment matching needs no metacharacters.
fn strip_like_wildcards(filter: &mut Filter) {
    for cond in &mut filter.filters {
        if cond.operator == FilterOperator::Like && cond.value.contains('%') {
            cond.value = cond.value.trim_matches('%').to_owned();
        }
    }
}

fn invalid_filter(e: runtime::FilterError) -> StreamError {
    StreamError::InvalidFilter {
        field: e.field().to_owned(),
        reason: e.to_string(),
    }
}

fn snapshot_failed(e: &SnapshotError) -> StreamError {
    let cause = match e {
        SnapshotError::Fetch { cause, .. } | SnapshotError::Decode { cause, .. } => cause.clone(),
        SnapshotError::Status { status, .. } => format!("HTTP status {}", status),
    };
    StreamError::SnapshotFailed { page: e.page(), cause }
}

/// A page-one connection failure means the API itself is unreachable, which
/// is the case the cache fallback exists for. Failures beyond page one are
/// genuine mid-snapshot aborts and must not degrade to partial data.
fn unreachable_api(e: &SnapshotError) -> bool {
    matches!(e, SnapshotError::Fetch { page: 1, .. })
}
