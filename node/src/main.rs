//! `blotterd`: wires the components together in dependency order and takes
//! them down again in reverse on SIGINT.

mod settings;

use crate::settings::Settings;
use api::{EventService, TopicResources};
use blotter_futures_util::stream::Variable;
use hub::{ingest, wire, BlotterCache, EventHub, QueryClient};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "blotterd.json".to_owned());
    let settings = Settings::load(&path)?;
    run(settings).await
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    // registries first: filter compilation must never race their construction
    runtime::init();

    // caches and hubs
    let orders_cache = BlotterCache::new(settings.cache.max_entries);
    let executions_cache = BlotterCache::new(settings.cache.max_entries);
    let orders_hub = EventHub::new(settings.stream.replay_buffer_size, settings.stream.inbox_capacity);
    let executions_hub = EventHub::new(settings.stream.replay_buffer_size, settings.stream.inbox_capacity);

    // consumers
    let orders_ingestor = ingest::spawn(
        settings.ingestor_config(&settings.upstream.orders_topic, "orders"),
        wire::decode_order,
        orders_hub.clone(),
        orders_cache.clone(),
    );
    let executions_ingestor = ingest::spawn(
        settings.ingestor_config(&settings.upstream.executions_topic, "executions"),
        wire::decode_execution,
        executions_hub.clone(),
        executions_cache.clone(),
    );

    // snapshot client and engine
    let query = QueryClient::new(&settings.query_config())?;
    let event_service = EventService::new(
        TopicResources {
            hub: orders_hub,
            cache: orders_cache,
            state: orders_ingestor.state_variable(),
        },
        TopicResources {
            hub: executions_hub,
            cache: executions_cache,
            state: executions_ingestor.state_variable(),
        },
        query,
        settings.engine_config(),
    );

    // transport last
    let (_addr, server) = api::serve(event_service, settings.api.bind_addr)?;
    let server = tokio::spawn(server);

    watch_consumer("orders", orders_ingestor.state_variable());
    watch_consumer("executions", executions_ingestor.state_variable());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // reverse order: stop accepting clients, then drain the consumers
    server.abort();
    let grace = Duration::from_millis(settings.shutdown.grace_ms);
    let drained = tokio::time::timeout(grace, async {
        orders_ingestor.stop().await;
        executions_ingestor.stop().await;
    })
    .await;
    if drained.is_err() {
        warn!("consumers did not drain within {:?}, stopping forcibly", grace);
    }
    info!("bye");
    Ok(())
}

/// Log consumer state transitions; the states themselves are served to the
/// engine through the shared variable.
fn watch_consumer(topic: &'static str, state: Variable<ingest::IngestState>) {
    use futures::StreamExt;
    let mut observer = state.new_observer();
    tokio::spawn(async move {
        while let Some(state) = observer.next().await {
            info!(topic, %state, "consumer state");
        }
    });
}
