//! Maps a declared [`BrokerConfig`] to the concrete transport it names
//! (spec §4.1).

use std::sync::Arc;

use gateway_brokers::resilience::{PublisherFactory, SubscriberFactory};
use gateway_brokers::{amqp, filesystem, kafka, sql, ReconnectingSubscriber, ResilientPublisher};
use gateway_core::{BrokerConfig, BrokerType, GatewayError, Publisher, Result, Subscriber};

fn setting<'a>(config: &'a BrokerConfig, key: &str) -> Option<&'a str> {
    config.settings.get(key).and_then(serde_json::Value::as_str)
}

/// Build the outbound half of `config`'s transport, wrapped in the shared
/// reconnect/backpressure/batch decorator (spec §4.1).
///
/// # Errors
///
/// Returns an error if `config.enabled` is `false`; a connectable-but-down
/// transport is not an error here, since the resilience wrapper's
/// background task owns retrying the connection.
pub async fn build_publisher(config: &BrokerConfig) -> Result<Arc<dyn Publisher>> {
    if !config.enabled {
        return Err(GatewayError::BrokerConnectionFailed {
            broker_id: config.broker_id.clone(),
            reason: "broker is disabled".to_string(),
        });
    }

    let broker_id = config.broker_id.clone();
    let connection_string = config.connection_string.clone();
    let broker_type = config.broker_type;

    let factory: PublisherFactory = Arc::new(move || {
        let broker_id = broker_id.clone();
        let connection_string = connection_string.clone();
        Box::pin(async move { connect_publisher(broker_type, &broker_id, &connection_string).await })
    });

    Ok(ResilientPublisher::spawn(config, factory))
}

async fn connect_publisher(broker_type: BrokerType, broker_id: &str, connection_string: &str) -> Result<Arc<dyn Publisher>> {
    match broker_type {
        BrokerType::Kafka | BrokerType::ConfluentKafka => {
            let publisher = kafka::KafkaPublisher::connect(broker_id, connection_string)?;
            Ok(Arc::new(publisher))
        }
        BrokerType::Activemq | BrokerType::Rabbitmq | BrokerType::Ibmmq => {
            let publisher = amqp::AmqpPublisher::connect(broker_id, connection_string).await?;
            Ok(Arc::new(publisher))
        }
        BrokerType::Filesystem => Ok(Arc::new(filesystem::FilesystemPublisher::new(connection_string))),
        BrokerType::Sql => {
            let publisher = sql::SqlPublisher::connect(broker_id, connection_string).await?;
            Ok(Arc::new(publisher))
        }
    }
}

/// Build the inbound half of `config`'s transport, wrapped in the shared
/// reconnect decorator (spec §4.1): previously-subscribed topics are
/// resubscribed automatically after each reconnect.
///
/// # Errors
///
/// Returns an error if `config.enabled` is `false`.
pub async fn build_subscriber(config: &BrokerConfig) -> Result<Arc<dyn Subscriber>> {
    if !config.enabled {
        return Err(GatewayError::BrokerConnectionFailed {
            broker_id: config.broker_id.clone(),
            reason: "broker is disabled".to_string(),
        });
    }

    let broker_id = config.broker_id.clone();
    let connection_string = config.connection_string.clone();
    let broker_type = config.broker_type;
    let consumer_group = setting(config, "consumer_group").unwrap_or("gateway").to_string();

    let factory: SubscriberFactory = Arc::new(move || {
        let broker_id = broker_id.clone();
        let connection_string = connection_string.clone();
        let consumer_group = consumer_group.clone();
        Box::pin(async move { connect_subscriber(broker_type, &broker_id, &connection_string, &consumer_group).await })
    });

    Ok(ReconnectingSubscriber::spawn(config, factory))
}

async fn connect_subscriber(
    broker_type: BrokerType,
    broker_id: &str,
    connection_string: &str,
    consumer_group: &str,
) -> Result<Arc<dyn Subscriber>> {
    match broker_type {
        BrokerType::Kafka | BrokerType::ConfluentKafka => {
            Ok(Arc::new(kafka::KafkaSubscriber::new(connection_string.to_string(), consumer_group.to_string())))
        }
        BrokerType::Activemq | BrokerType::Rabbitmq | BrokerType::Ibmmq => {
            let subscriber = amqp::AmqpSubscriber::connect(broker_id, connection_string).await?;
            Ok(Arc::new(subscriber))
        }
        BrokerType::Filesystem => Ok(Arc::new(filesystem::FilesystemSubscriber::new(connection_string))),
        BrokerType::Sql => {
            let subscriber = sql::SqlSubscriber::connect(broker_id, connection_string).await?;
            Ok(Arc::new(subscriber))
        }
    }
}

/// Surface a missing broker reference as the same error kind a connection
/// failure would produce, so callers don't need a separate case.
pub fn broker_not_found(broker_id: &str) -> GatewayError {
    GatewayError::BrokerConnectionFailed { broker_id: broker_id.to_string(), reason: "no broker config with this id".to_string() }
}
