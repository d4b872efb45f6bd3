//! Durable consumer of one upstream topic.
//!
//! ```text
//!   STOPPED ──start──▶ STARTING ──consumer ready──▶ RUNNING
//!                        │                           │
//!                        │                           ├──fatal──▶ BACKOFF ──timer──▶ STARTING
//!                        │                           │
//!                        └──error──▶ BACKOFF         └──stop──▶ STOPPING ──▶ STOPPED
//! ```
//!
//! Acknowledgment is manual and per record: an ack is sent only after the
//! decoded event is in the replay ring and handed to the hub, giving
//! at-least-once delivery with the dedup downstream covering redeliveries.
//! Backoff is exponential with jitter and never gives up; only a stop
//! request reaches `STOPPED`.

use crate::{cache::BlotterCache, hub::EventHub, wire::RecordDecoder};
use anyhow::{anyhow, bail, Context as _};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy},
    AckKind,
};
use blotter_futures_util::stream::{variable::Observer, Variable};
use futures::StreamExt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Consumer lifecycle, published for the engine's availability policy and
/// the health probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum IngestState {
    #[display(fmt = "STOPPED")]
    Stopped,
    #[display(fmt = "STARTING")]
    Starting,
    #[display(fmt = "RUNNING")]
    Running,
    #[display(fmt = "BACKOFF")]
    Backoff,
    #[display(fmt = "STOPPING")]
    Stopping,
}

#[derive(Clone, Debug)]
pub struct IngestorConfig {
    pub servers: Vec<String>,
    /// JetStream stream holding the trade event subjects.
    pub stream_name: String,
    /// Subject of this consumer's topic.
    pub topic: String,
    /// Durable consumer name; doubles as the connection name.
    pub consumer_group: String,
    /// Undecodable records tolerated within `poison_window` before the
    /// consumer backs off.
    pub poison_threshold: u32,
    pub poison_window: Duration,
    pub backoff_initial: Duration,
    pub backoff_ceiling: Duration,
    pub backoff_jitter: f64,
}

pub struct IngestorHandle {
    state: Variable<IngestState>,
    poisoned: Arc<AtomicU64>,
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl IngestorHandle {
    pub fn state(&self) -> IngestState {
        self.state.get()
    }

    /// Shared view of the consumer state, for the subscription engine.
    pub fn state_variable(&self) -> Variable<IngestState> {
        self.state.clone()
    }

    pub fn observe(&self) -> Observer<IngestState> {
        self.state.new_observer()
    }

    /// Records skipped because they could not be decoded.
    pub fn poisoned(&self) -> u64 {
        self.poisoned.load(Ordering::Relaxed)
    }

    /// Request a drain and wait for `STOPPED`. In-flight records finish
    /// processing and their acks go out before the task ends.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("ingestor task ended abnormally: {}", e);
        }
    }
}

/// Spawn the consumer task for one topic.
pub fn spawn(config: IngestorConfig, decode: RecordDecoder, hub: EventHub, cache: BlotterCache) -> IngestorHandle {
    let state = Variable::new(IngestState::Stopped);
    let poisoned = Arc::new(AtomicU64::new(0));
    let (stop_tx, stop_rx) = watch::channel(false);
    let ingestor = Ingestor {
        config,
        decode,
        hub,
        cache,
        state: state.clone(),
        poisoned: poisoned.clone(),
    };
    let task = tokio::spawn(ingestor.run(stop_rx));
    IngestorHandle {
        state,
        poisoned,
        stop: stop_tx,
        task,
    }
}

struct Ingestor {
    config: IngestorConfig,
    decode: RecordDecoder,
    hub: EventHub,
    cache: BlotterCache,
    state: Variable<IngestState>,
    poisoned: Arc<AtomicU64>,
}

impl Ingestor {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut backoff = self.config.backoff_initial;
        loop {
            if *stop.borrow() {
                self.state.set(IngestState::Stopped);
                return;
            }
            self.state.set(IngestState::Starting);
            match self.consume(&mut stop, &mut backoff).await {
                Ok(()) => {
                    // drained after a stop request
                    self.state.set(IngestState::Stopped);
                    return;
                }
                Err(e) => {
                    if *stop.borrow() {
                        self.state.set(IngestState::Stopped);
                        return;
                    }
                    self.state.set(IngestState::Backoff);
                    let delay = jittered(backoff, self.config.backoff_jitter);
                    warn!(
                        topic = %self.config.topic,
                        delay_ms = delay.as_millis() as u64,
                        "consumer failed, backing off: {:#}", e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stop.changed() => {
                            self.state.set(IngestState::Stopped);
                            return;
                        }
                    }
                    backoff = backoff.saturating_mul(2).min(self.config.backoff_ceiling);
                }
            }
        }
    }

    async fn consume(&self, stop: &mut watch::Receiver<bool>, backoff: &mut Duration) -> anyhow::Result<()> {
        let options = async_nats::ConnectOptions::new().name(&self.config.consumer_group);
        let client = async_nats::connect_with_options(self.config.servers.join(","), options)
            .await
            .context("connecting to upstream brokers")?;
        let js = jetstream::new(client);
        let stream = js
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| anyhow!("looking up stream {}: {}", self.config.stream_name, e))?;
        let consumer = stream
            .get_or_create_consumer(
                &self.config.consumer_group,
                pull::Config {
                    durable_name: Some(self.config.consumer_group.clone()),
                    filter_subject: self.config.topic.clone(),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy: DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| anyhow!("creating consumer {}: {}", self.config.consumer_group, e))?;
        let mut messages = consumer.messages().await.context("opening message stream")?;

        self.state.set(IngestState::Running);
        *backoff = self.config.backoff_initial;
        info!(topic = %self.config.topic, "consumer running");

        let mut poison = PoisonWindow::new(self.config.poison_threshold, self.config.poison_window);
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    self.state.set(IngestState::Stopping);
                    info!(topic = %self.config.topic, "consumer draining");
                    return Ok(());
                }
                next = messages.next() => {
                    let msg = match next {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => bail!("message stream failed: {}", e),
                        None => bail!("message stream ended"),
                    };
                    match (self.decode)(&msg.payload) {
                        Ok(event) => {
                            let event = Arc::new(event);
                            self.cache.put(event.clone());
                            self.hub.publish_shared(event);
                            // commit only after the record reached the hub
                            msg.ack().await.map_err(|e| anyhow!("ack failed: {}", e))?;
                        }
                        Err(e) => {
                            self.poisoned.fetch_add(1, Ordering::Relaxed);
                            warn!(topic = %self.config.topic, "skipping undecodable record: {:#}", e);
                            // terminate the record so it is not redelivered
                            let _ = msg.ack_with(AckKind::Term).await;
                            if poison.record() {
                                bail!("poison threshold exceeded");
                            }
                        }
                    }
                }
            }
        }
    }
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    base.mul_f64(1.0 + jitter * (rand::random::<f64>() - 0.5))
}

/// Counts decode failures in a sliding window.
struct PoisonWindow {
    threshold: u32,
    window: Duration,
    count: u32,
    started: Instant,
}

impl PoisonWindow {
    fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window,
            count: 0,
            started: Instant::now(),
        }
    }

    fn record(&mut self) -> bool {
        self.record_at(Instant::now())
    }

    fn record_at(&mut self, now: Instant) -> bool {
        if now.duration_since(self.started) > self.window {
            self.started = now;
            self.count = 0;
        }
        self.count += 1;
        self.count >= self.threshold
    }
}
