//! Starts one [`Ingester`] per configured `ingesters/*.json` entry, wired
//! through a [`CompositeSubscriber`] fan-out over each entry's broker
//! (spec §4.2, §4.3).

use std::collections::HashMap;

use gateway_brokers::CompositeSubscriber;
use gateway_config::{IngesterDefinition, InputChannelConfig};
use gateway_core::{BrokerConfig, Result};
use gateway_dispatch::Dispatcher;
use gateway_ingest::{resolve_chain, Ingester};

use crate::brokers::{broker_not_found, build_subscriber};

/// Resolve every ingester definition against its input channel and broker,
/// start its subscriber's fan-out, and spawn its pump loop.
///
/// # Errors
///
/// Returns an error if a definition references a missing channel or broker,
/// or if the broker's subscriber can't connect.
pub async fn start_ingesters(
    ingesters: Vec<IngesterDefinition>,
    channels: &[InputChannelConfig],
    brokers: &[BrokerConfig],
    dispatcher: &Dispatcher,
) -> Result<Vec<Ingester>> {
    let channels_by_id: HashMap<&str, &InputChannelConfig> = channels.iter().map(|channel| (channel.channel_id.as_str(), channel)).collect();
    let brokers_by_id: HashMap<&str, &BrokerConfig> = brokers.iter().map(|broker| (broker.broker_id.as_str(), broker)).collect();
    let composite = CompositeSubscriber::new();
    let mut started = Vec::new();

    for definition in ingesters {
        let channel = *channels_by_id.get(definition.channel_id.as_str()).ok_or_else(|| broker_not_found(&definition.channel_id))?;
        let broker = *brokers_by_id.get(channel.broker_id.as_str()).ok_or_else(|| broker_not_found(&channel.broker_id))?;

        let resolved = resolve_chain(&broker.settings, &channel.properties, &definition.overrides);
        let topic = resolved.get("topic").and_then(serde_json::Value::as_str).unwrap_or(&channel.topic).to_string();

        let subscriber = build_subscriber(broker).await?;
        let receiver = composite.add_listener(&topic, &definition.ingester_id).await;

        let driver = composite.clone();
        let driven_subscriber = subscriber.clone();
        let driven_topic = topic.clone();
        tokio::spawn(async move {
            if let Err(error) = driver.drive(driven_subscriber, &driven_topic).await {
                tracing::warn!(topic = %driven_topic, %error, "broker subscription ended");
            }
        });

        let ingester = Ingester::new(definition.ingester_id.clone(), broker_type_name(broker), definition.ttl_minutes, dispatcher.clone());
        ingester.start(receiver).await;
        started.push(ingester);
    }

    Ok(started)
}

fn broker_type_name(broker: &BrokerConfig) -> &'static str {
    match broker.broker_type {
        gateway_core::BrokerType::Kafka => "kafka",
        gateway_core::BrokerType::ConfluentKafka => "confluent-kafka",
        gateway_core::BrokerType::Activemq => "activemq",
        gateway_core::BrokerType::Rabbitmq => "rabbitmq",
        gateway_core::BrokerType::Ibmmq => "ibmmq",
        gateway_core::BrokerType::Filesystem => "filesystem",
        gateway_core::BrokerType::Sql => "sql",
    }
}
