//! SMTP email service implementation

use std::fmt;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::{debug, info};

use crate::domain::communication::mailer::{Mailer, MailerError, Message};

/// SMTP configuration
#[derive(Clone, Default, Debug, Parser)]
pub struct SMTPConfig {
    /// The SMTP host
    #[clap(long = "mail-server", env = "MAIL_SERVER")]
    pub host: String,

    /// The SMTP port
    #[clap(long = "mail-port", env = "MAIL_PORT")]
    pub port: u16,

    /// The SMTP username
    #[clap(long = "mail-username", env = "MAIL_USERNAME")]
    pub username: String,

    /// The SMTP password
    #[clap(long = "mail-password", env = "MAIL_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// The sender email address, the SMTP username when unset
    #[clap(long = "mail-sender", env = "MAIL_SENDER")]
    pub sender: Option<String>,

    /// Verify the TLS certificate
    #[clap(long = "mail-verify-tls", env = "MAIL_VERIFY_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub verify_tls: bool,

    /// Use STARTTLS instead of a TLS-wrapped connection
    #[clap(long = "mail-starttls", env = "MAIL_STARTTLS", default_value_t = false, action = clap::ArgAction::Set)]
    pub starttls: bool,
}

/// SMTP mailer
///
/// Holds one authenticated transport for the life of the process; connections
/// are reused across sends.
#[derive(Clone)]
pub struct SMTPMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    host: String,
}

impl fmt::Debug for SMTPMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SMTPMailer")
            .field("host", &self.host)
            .field("sender", &self.sender.to_string())
            .finish()
    }
}

impl SMTPMailer {
    /// Create a new SMTP mailer without contacting the server
    pub fn new(config: &SMTPConfig) -> Result<Self, MailerError> {
        let sender = config
            .sender
            .as_deref()
            .unwrap_or(&config.username)
            .parse::<Mailbox>()?;

        Ok(Self {
            transport: transport(config)?,
            sender,
            host: config.host.clone(),
        })
    }

    /// Create a new SMTP mailer and check that the server accepts our login
    pub async fn connect(config: &SMTPConfig) -> Result<Self> {
        let mailer = Self::new(config)?;

        let connected = mailer
            .transport
            .test_connection()
            .await
            .with_context(|| format!("could not reach SMTP server {}:{}", config.host, config.port))?;

        if !connected {
            return Err(anyhow!(
                "SMTP server {}:{} refused the connection",
                config.host,
                config.port
            ));
        }

        info!(host = %config.host, port = config.port, "connected to SMTP server");

        Ok(mailer)
    }

    /// Releases the transport.
    ///
    /// Idle pooled connections send `QUIT` from lettre's pool teardown, which
    /// runs in the background and may not finish before the process exits.
    pub fn close(self) {
        drop(self.transport);

        info!(host = %self.host, "SMTP transport released, pooled connections closing in the background");
    }

    fn build_email(&self, message: &Message) -> Result<lettre::Message, MailerError> {
        let from = match &message.from {
            Some(from) => from.as_str().parse::<Mailbox>()?,
            None => self.sender.clone(),
        };

        let alternative = MultiPart::alternative_plain_html(
            message.plain_body.clone(),
            message.html_body.clone(),
        );

        let body = if message.inline_images.is_empty() {
            alternative
        } else {
            let mut related = MultiPart::related().multipart(alternative);

            for image in &message.inline_images {
                let content_type = ContentType::parse(&image.content_type)
                    .map_err(|e| MailerError::InvalidMessage(e.to_string()))?;

                related = related.singlepart(
                    Attachment::new_inline(image.content_id.clone())
                        .body(image.data.clone(), content_type),
                );
            }

            related
        };

        Ok(lettre::Message::builder()
            .from(from)
            .to(message.to.as_str().parse::<Mailbox>()?)
            .subject(message.subject.clone())
            .multipart(body)?)
    }
}

fn transport(config: &SMTPConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let tls = TlsParameters::builder(config.host.clone())
        .dangerous_accept_invalid_certs(!config.verify_tls)
        .build()?;

    let relay = if config.starttls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.tls(Tls::Required(tls))
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.tls(Tls::Wrapper(tls))
    };

    Ok(relay.credentials(creds).port(config.port).build())
}

#[async_trait]
impl Mailer for SMTPMailer {
    async fn send_email(&self, message: &Message) -> Result<(), MailerError> {
        let email = self.build_email(message)?;

        debug!(to = %message.to, subject = %message.subject, "sending email");

        self.transport.send(email).await?;

        Ok(())
    }
}
