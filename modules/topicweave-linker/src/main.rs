use std::env;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use topicweave_client::TopicWeaveClient;
use topicweave_common::{Config, SearchRequest, Source};
use topicweave_linker::traits::TopicStore;
use topicweave_linker::{LinkedMirror, LinkerDeps};

/// Search the connected sources and link every new match to one topic.
///
/// TOPICWEAVE_TOPIC_ID and TOPICWEAVE_QUERY pick the topic and search;
/// TOPICWEAVE_SOURCES (comma separated) narrows the sources, all by default.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("topicweave=info".parse()?))
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let topic_id: Uuid = env::var("TOPICWEAVE_TOPIC_ID")
        .context("TOPICWEAVE_TOPIC_ID environment variable is required")?
        .parse()
        .context("TOPICWEAVE_TOPIC_ID must be a UUID")?;
    let query = env::var("TOPICWEAVE_QUERY").context("TOPICWEAVE_QUERY environment variable is required")?;
    let sources = match env::var("TOPICWEAVE_SOURCES") {
        Ok(raw) => raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<Source>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?,
        Err(_) => Source::ALL.to_vec(),
    };

    let client = TopicWeaveClient::from_config(&config)?;
    let deps = LinkerDeps::from_client(client, config.linked_by);

    let mut mirror = LinkedMirror::from_items(topic_id, deps.store.list_links(topic_id).await?);
    info!(topic_id = %topic_id, linked = mirror.len(), "Loaded topic");

    let aggregation = deps
        .build_aggregator()
        .search(
            &SearchRequest {
                query,
                sources,
                ..Default::default()
            },
            &mirror,
        )
        .await;
    for warning in &aggregation.warnings {
        warn!(source = %warning.source, message = warning.message.as_str(), "Source skipped");
    }

    let selection: Vec<_> = aggregation.linkable().cloned().collect();
    if selection.is_empty() {
        info!("No new candidates to link");
        return Ok(());
    }

    let run = deps
        .build_orchestrator()
        .run(&selection, topic_id, mirror.clone())
        .await;
    println!("{}", run.report);

    if let Some(enrichment) = run.enrichment {
        enrichment.await?;
    }
    mirror.absorb(run.mirror);
    info!(topic_id = %topic_id, linked = mirror.len(), "Topic mirror updated");

    Ok(())
}
