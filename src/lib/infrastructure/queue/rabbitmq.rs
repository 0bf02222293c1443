//! RabbitMQ consumer for the mail queue

use std::{fmt, future::Future};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::*,
    types::{AMQPValue, FieldTable, ShortString},
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
    Channel, Connection, ConnectionProperties,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::tickets::{TicketError, TicketService};

use super::{FailurePolicy, Settlement};

/// RabbitMQ connection and queue configuration
#[derive(Clone, Debug, Parser)]
pub struct RabbitMQConfig {
    /// The broker host
    #[clap(id = "rabbitmq_host", long = "rabbitmq-host", env = "RABBITMQ_HOST")]
    pub host: String,

    /// The broker port
    #[clap(id = "rabbitmq_port", long = "rabbitmq-port", env = "RABBITMQ_PORT", default_value = "5672")]
    pub port: u16,

    /// The broker username
    #[clap(id = "rabbitmq_id", long = "rabbitmq-id", env = "RABBITMQ_ID")]
    pub username: String,

    /// The broker password
    #[clap(
        id = "rabbitmq_password",
        long = "rabbitmq-password",
        env = "RABBITMQ_PASSWORD",
        hide_env_values = true
    )]
    pub password: String,

    /// The virtual host
    #[clap(long = "rabbitmq-vhost", env = "RABBITMQ_VHOST", default_value = "/")]
    pub vhost: String,

    /// The queue reservation messages are read from
    #[clap(long = "mail-queue", env = "MAIL_QUEUE", default_value = "mail.queue")]
    pub queue: String,

    /// Declare the queue on startup
    #[clap(long = "mail-queue-declare", env = "MAIL_QUEUE_DECLARE", default_value_t = true, action = clap::ArgAction::Set)]
    pub declare_queue: bool,

    /// Declare the queue as a quorum queue
    #[clap(long = "mail-queue-quorum", env = "MAIL_QUEUE_QUORUM", default_value_t = true, action = clap::ArgAction::Set)]
    pub quorum: bool,

    /// Dead letter exchange set on the declared queue
    #[clap(long = "mail-queue-dead-letter-exchange", env = "MAIL_QUEUE_DEAD_LETTER_EXCHANGE")]
    pub dead_letter_exchange: Option<String>,

    /// What to do with messages whose ticket could not be sent
    #[clap(long, env = "FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Requeue)]
    pub failure_policy: FailurePolicy,
}

impl RabbitMQConfig {
    /// The broker URI built from the configured parts
    pub fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            ..Default::default()
        }
    }

    /// Arguments used when declaring the queue
    pub fn queue_arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();

        if self.quorum {
            arguments.insert(
                "x-queue-type".into(),
                AMQPValue::LongString("quorum".into()),
            );
        }

        if let Some(exchange) = &self.dead_letter_exchange {
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(exchange.clone().into()),
            );
        }

        arguments
    }
}

/// Runs one payload through the ticket service and decides how to settle it
pub async fn process<S>(service: &S, policy: FailurePolicy, payload: &[u8]) -> Settlement
where
    S: TicketService,
{
    let result = service.send_ticket(payload).await;

    match &result {
        Ok(receipt) => debug!(reservation_id = %receipt.reservation_id, "ticket handled"),
        Err(e @ TicketError::Validation(_)) => {
            warn!(kind = e.kind(), error = %e, "discarding reservation message")
        }
        Err(e) => error!(kind = e.kind(), error = %e, ?policy, "could not send ticket"),
    }

    policy.settle(&result)
}

/// Consumes the mail queue, one delivery at a time
pub struct RabbitMQConsumer<S>
where
    S: TicketService,
{
    connection: Connection,
    channel: Channel,
    consumer_tag: String,
    config: RabbitMQConfig,
    service: S,
}

impl<S> fmt::Debug for RabbitMQConsumer<S>
where
    S: TicketService,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMQConsumer")
            .field("queue", &self.config.queue)
            .field("consumer_tag", &self.consumer_tag)
            .finish()
    }
}

impl<S> RabbitMQConsumer<S>
where
    S: TicketService,
{
    /// Connects to the broker, limits the channel to one unacknowledged
    /// delivery and declares the queue if configured to.
    pub async fn connect(config: RabbitMQConfig, service: S) -> Result<Self> {
        info!(host = %config.host, port = config.port, vhost = %config.vhost, "connecting to RabbitMQ");

        let connection = Connection::connect_uri(config.uri(), ConnectionProperties::default())
            .await
            .with_context(|| format!("could not connect to RabbitMQ at {}:{}", config.host, config.port))?;

        let channel = connection.create_channel().await?;

        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .context("could not set the channel prefetch")?;

        if config.declare_queue {
            channel
                .queue_declare(
                    &config.queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    config.queue_arguments(),
                )
                .await
                .with_context(|| format!("could not declare queue {}", config.queue))?;

            debug!(queue = %config.queue, quorum = config.quorum, "queue declared");
        }

        Ok(Self {
            connection,
            channel,
            consumer_tag: format!("ticket-mailer-{}", std::process::id()),
            config,
            service,
        })
    }

    /// Consumes until `shutdown` resolves or the broker ends the stream.
    ///
    /// A delivery being handled when `shutdown` resolves is finished and
    /// settled first. Once consuming has started the connection is always
    /// closed before returning.
    #[mutants::skip]
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.config.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("could not consume queue {}", self.config.queue))?;

        info!(queue = %self.config.queue, consumer_tag = %self.consumer_tag, "consuming reservation messages");

        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("stopping consumer");
                    break Ok(());
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => self.handle(delivery).await,
                    Some(Err(e)) => break Err(anyhow!(e).context("consumer stream failed")),
                    None => break Err(anyhow!("consumer stream ended")),
                },
            }
        };

        self.close().await;

        outcome
    }

    async fn handle(&self, delivery: Delivery) {
        let delivery_tag = delivery.delivery_tag;
        let span = info_span!("delivery", delivery_tag, redelivered = delivery.redelivered);

        let settlement = process(&self.service, self.config.failure_policy, &delivery.data)
            .instrument(span)
            .await;

        self.settle(delivery_tag, settlement).await;
    }

    async fn settle(&self, delivery_tag: u64, settlement: Settlement) {
        let result = match settlement {
            Settlement::Ack => {
                self.channel
                    .basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
            }
            Settlement::Requeue => {
                self.channel
                    .basic_nack(
                        delivery_tag,
                        BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        },
                    )
                    .await
            }
            Settlement::Reject => {
                self.channel
                    .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
                    .await
            }
        };

        match result {
            Ok(()) => debug!(delivery_tag, ?settlement, "delivery settled"),
            Err(e) => error!(delivery_tag, ?settlement, error = %e, "could not settle delivery"),
        }
    }

    async fn close(self) {
        if let Err(e) = self
            .channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(error = %e, "error cancelling consumer");
        }

        if let Err(e) = self.channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "error closing channel");
        }

        if let Err(e) = self.connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "error closing connection");
        }

        info!("RabbitMQ connection closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use testresult::TestResult;

    use crate::domain::{
        communication::{
            email_addresses::EmailAddress,
            mailer::{tests::MockMailer, MailerError},
        },
        tickets::{
            tests::MockTicketService, ReservationError, TicketConfig, TicketReceipt,
            TicketServiceImpl,
        },
    };

    use super::*;

    fn config() -> RabbitMQConfig {
        RabbitMQConfig::parse_from([
            "mail-consumer",
            "--rabbitmq-host",
            "rabbitmq.local",
            "--rabbitmq-id",
            "ticketaka",
            "--rabbitmq-password",
            "secret",
        ])
    }

    #[test]
    fn test_config_defaults() {
        let config = config();

        assert_eq!(config.port, 5672);
        assert_eq!(config.vhost, "/");
        assert_eq!(config.queue, "mail.queue");
        assert!(config.declare_queue);
        assert!(config.quorum);
        assert_eq!(config.dead_letter_exchange, None);
        assert_eq!(config.failure_policy, FailurePolicy::Requeue);
    }

    #[test]
    fn test_config_flags() -> TestResult {
        let config = RabbitMQConfig::try_parse_from([
            "mail-consumer",
            "--rabbitmq-host",
            "rabbitmq.local",
            "--rabbitmq-id",
            "ticketaka",
            "--rabbitmq-password",
            "secret",
            "--mail-queue-quorum",
            "false",
            "--failure-policy",
            "dead-letter",
        ])?;

        assert!(!config.quorum);
        assert_eq!(config.failure_policy, FailurePolicy::DeadLetter);

        Ok(())
    }

    #[test]
    fn test_uri() {
        let uri = config().uri();

        assert_eq!(uri.authority.host, "rabbitmq.local");
        assert_eq!(uri.authority.port, 5672);
        assert_eq!(uri.authority.userinfo.username, "ticketaka");
        assert_eq!(uri.authority.userinfo.password, "secret");
        assert_eq!(uri.vhost, "/");
    }

    #[test]
    fn test_quorum_queue_arguments() {
        let arguments = config().queue_arguments();

        assert_eq!(
            arguments.inner().get(&ShortString::from("x-queue-type")),
            Some(&AMQPValue::LongString("quorum".into()))
        );
        assert_eq!(arguments.inner().get(&ShortString::from("x-dead-letter-exchange")), None);
    }

    #[test]
    fn test_classic_queue_with_dead_letter_exchange() {
        let arguments = RabbitMQConfig {
            quorum: false,
            dead_letter_exchange: Some("mail.dlx".to_string()),
            ..config()
        }
        .queue_arguments();

        assert_eq!(arguments.inner().get(&ShortString::from("x-queue-type")), None);
        assert_eq!(
            arguments.inner().get(&ShortString::from("x-dead-letter-exchange")),
            Some(&AMQPValue::LongString("mail.dlx".into()))
        );
    }

    #[tokio::test]
    async fn test_process_acknowledges_sent_ticket() {
        let mut service = MockTicketService::new();

        service.expect_send_ticket().times(1).returning(|_| {
            Ok(TicketReceipt {
                reservation_id: "R123".to_string(),
                recipient: EmailAddress::new("a@example.com").unwrap(),
            })
        });

        let settlement = process(&service, FailurePolicy::Requeue, b"{}").await;

        assert_eq!(settlement, Settlement::Ack);
    }

    #[tokio::test]
    async fn test_process_rejects_invalid_message() {
        let mut service = MockTicketService::new();

        service
            .expect_send_ticket()
            .times(1)
            .returning(|_| Err(TicketError::Validation(ReservationError::EmptyReservationId)));

        let settlement = process(&service, FailurePolicy::Requeue, b"{}").await;

        assert_eq!(settlement, Settlement::Reject);
    }

    #[tokio::test]
    async fn test_process_requeues_undelivered_ticket() {
        let mut service = MockTicketService::new();

        service.expect_send_ticket().times(1).returning(|_| {
            Err(TicketError::Delivery(MailerError::SendError(
                "421 service not available".to_string(),
            )))
        });

        let settlement = process(&service, FailurePolicy::Requeue, b"{}").await;

        assert_eq!(settlement, Settlement::Requeue);
    }

    #[tokio::test]
    async fn test_process_passes_payload_through() {
        let mut service = MockTicketService::new();

        service
            .expect_send_ticket()
            .withf(|payload| payload.to_vec() == br#"{"reservationId":"R1"}"#.to_vec())
            .times(1)
            .returning(|_| Err(TicketError::Render("boom".to_string())));

        let settlement =
            process(&service, FailurePolicy::DeadLetter, br#"{"reservationId":"R1"}"#).await;

        assert_eq!(settlement, Settlement::Reject);
    }

    #[tokio::test]
    async fn test_process_rejects_undeliverable_member_email_under_every_policy() {
        for policy in [FailurePolicy::Requeue, FailurePolicy::DeadLetter, FailurePolicy::Drop] {
            let mut mailer = MockMailer::new();
            mailer.expect_send_email().times(0);

            let service = TicketServiceImpl::new(Arc::new(mailer), TicketConfig::default());

            let settlement = process(
                &service,
                policy,
                br#"{"reservationId":"R1","memberEmail":"a,b@example.com"}"#,
            )
            .await;

            assert_eq!(settlement, Settlement::Reject, "{policy:?}");
        }
    }
}
