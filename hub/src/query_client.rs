//! Paginated snapshot retrieval from the external query API.
//!
//! A snapshot is fetched page by page, strictly sequentially, and surfaces
//! as a lazy finite stream of events. Any page-level failure aborts the
//! whole snapshot with the failing page number; a partially delivered
//! snapshot is never passed off as complete.

use blotter_sdk::{Event, EventId, EventKind, ExecutionPayload, Filter, FilterOperator, LogicalOperator, OrderPayload, Payload, PayloadKind};
use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use futures::stream::{BoxStream, StreamExt};
use genawaiter::sync::{Co, Gen};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub struct QueryConfig {
    pub base_url: Url,
    pub page_size: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// Why a snapshot aborted. Carries the 1-based page on which it happened.
#[derive(Clone, Debug, PartialEq, Display, Error)]
pub enum SnapshotError {
    #[display(fmt = "page {} could not be fetched: {}", page, cause)]
    Fetch { page: u32, cause: String },
    #[display(fmt = "page {} returned status {}", page, status)]
    Status { page: u32, status: u16 },
    #[display(fmt = "page {} could not be decoded: {}", page, cause)]
    Decode { page: u32, cause: String },
}

impl SnapshotError {
    pub fn page(&self) -> u32 {
        match self {
            SnapshotError::Fetch { page, .. }
            | SnapshotError::Status { page, .. }
            | SnapshotError::Decode { page, .. } => *page,
        }
    }
}

#[derive(Clone)]
pub struct QueryClient {
    client: reqwest::Client,
    orders_url: Url,
    executions_url: Url,
    page_size: usize,
}

impl QueryClient {
    pub fn new(config: &QueryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()?;
        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(Self {
            client,
            orders_url: base.join("orders")?,
            executions_url: base.join("executions")?,
            page_size: config.page_size,
        })
    }

    /// Lazy, finite stream of snapshot events matching the filter.
    ///
    /// Pages are requested sequentially until the last-page marker; each
    /// row is wrapped as a `SNAPSHOT` event carrying its upstream id. The
    /// subscription engine drives this stream exactly once per
    /// subscription; completion is observed by the engine loop itself, so
    /// no re-subscription can trigger a second fetch.
    pub fn fetch_snapshot(&self, kind: PayloadKind, filter: &Filter) -> BoxStream<'static, Result<Event, SnapshotError>> {
        let client = self.clone();
        let params = query_params(filter);
        Gen::new(move |co: Co<Result<Event, SnapshotError>>| async move {
            let mut page: u32 = 1;
            loop {
                match client.fetch_page(kind, &params, page).await {
                    Ok(fetched) => {
                        for event in fetched.events {
                            co.yield_(Ok(event)).await;
                        }
                        if fetched.last_page {
                            break;
                        }
                        page += 1;
                    }
                    Err(e) => {
                        co.yield_(Err(e)).await;
                        break;
                    }
                }
            }
        })
        .boxed()
    }

    async fn fetch_page(&self, kind: PayloadKind, params: &[(String, String)], page: u32) -> Result<FetchedPage, SnapshotError> {
        let url = match kind {
            PayloadKind::Order => self.orders_url.clone(),
            PayloadKind::Execution => self.executions_url.clone(),
        };
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("page", page.to_string()), ("pageSize", self.page_size.to_string())])
            .send()
            .await
            .map_err(|e| SnapshotError::Fetch {
                page,
                cause: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status {
                page,
                status: status.as_u16(),
            });
        }
        let decode_err = |e: reqwest::Error| SnapshotError::Decode {
            page,
            cause: e.to_string(),
        };
        match kind {
            PayloadKind::Order => {
                let body: SnapshotPage<OrderRow> = response.json().await.map_err(decode_err)?;
                Ok(FetchedPage {
                    events: body.items.into_iter().map(OrderRow::into_event).collect(),
                    last_page: body.last_page,
                })
            }
            PayloadKind::Execution => {
                let body: SnapshotPage<ExecutionRow> = response.json().await.map_err(decode_err)?;
                Ok(FetchedPage {
                    events: body.items.into_iter().map(ExecutionRow::into_event).collect(),
                    last_page: body.last_page,
                })
            }
        }
    }
}

/// Translate a filter into the query API's `field__op=value` parameters.
/// The top-level logical operator is transmitted verbatim.
fn query_params(filter: &Filter) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(filter.filters.len() + 1);
    params.push((
        "logicalOperator".to_owned(),
        match filter.logical_operator {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
        .to_owned(),
    ));
    for cond in &filter.filters {
        let (name, value) = match cond.operator {
            FilterOperator::Eq => (cond.field.clone(), cond.value.clone()),
            FilterOperator::Like => (format!("{}__like", cond.field), cond.value.clone()),
            FilterOperator::Gt => (format!("{}__gt", cond.field), cond.value.clone()),
            FilterOperator::Gte => (format!("{}__gte", cond.field), cond.value.clone()),
            FilterOperator::Lt => (format!("{}__lt", cond.field), cond.value.clone()),
            FilterOperator::Lte => (format!("{}__lte", cond.field), cond.value.clone()),
            FilterOperator::Between => (
                format!("{}__between", cond.field),
                format!("{},{}", cond.value, cond.value2.clone().unwrap_or_default()),
            ),
        };
        params.push((name, value));
    }
    params
}

struct FetchedPage {
    events: Vec<Event>,
    last_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    /// An absent marker ends pagination.
    #[serde(default = "default_true")]
    last_page: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRow {
    event_id: EventId,
    #[serde(default)]
    sequence_number: Option<u64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    order: OrderPayload,
}

impl OrderRow {
    fn into_event(self) -> Event {
        Event {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            kind: EventKind::Snapshot,
            payload: Payload::Order(self.order),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionRow {
    event_id: EventId,
    #[serde(default)]
    sequence_number: Option<u64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    execution: ExecutionPayload,
}

impl ExecutionRow {
    fn into_event(self) -> Event {
        Event {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            kind: EventKind::Snapshot,
            payload: Payload::Execution(self.execution),
        }
    }
}
