//! Adapters for the outside world: SMTP, RabbitMQ and process signals

pub mod email;
pub mod queue;
pub mod shutdown;
