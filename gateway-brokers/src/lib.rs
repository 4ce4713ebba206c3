//! # Gateway Brokers
//!
//! Concrete [`gateway_core::Publisher`]/[`gateway_core::Subscriber`]
//! implementations for every broker transport the data-gateway facade
//! supports (spec §4.1), plus the fan-out layer that lets several listeners
//! share one broker subscription.
//!
//! - [`kafka`]: Apache Kafka, Confluent Cloud Kafka, Redpanda
//! - [`amqp`]: RabbitMQ, ActiveMQ, IBM MQ (via its AMQP 1.0 bridge)
//! - [`filesystem`]: a watched directory standing in for a topic
//! - [`sql`]: a polled Postgres table standing in for a topic
//! - [`composite_subscriber`]: multi-broker, multi-listener fan-out
//! - [`resilience`]: reconnect, backpressure, and batch-mode decorators
//!   shared by every transport above

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amqp;
pub mod composite_subscriber;
pub mod filesystem;
pub mod kafka;
pub mod resilience;
pub mod sql;

pub use composite_subscriber::CompositeSubscriber;
pub use resilience::{PublisherFactory, ReconnectingSubscriber, ResilientPublisher, SubscriberFactory};
