//! Ticket service: one reservation message in, one ticket email out

use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use clap::Parser;
use tracing::{debug, info};

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::{
    email_addresses::EmailAddress,
    mailer::{InlineImage, Mailer, Message},
};

use super::{
    QrCodeImage, QrEmbedding, Reservation, ReservationTicketTemplate, TicketError, QR_CONTENT_ID,
};

/// Subject of every ticket email unless configured otherwise
pub const DEFAULT_SUBJECT: &str = "[Ticketaka] 예약 정보 발송해 드립니다.";

/// Ticket email settings
#[derive(Clone, Debug, Parser)]
pub struct TicketConfig {
    /// The subject of the ticket email
    #[clap(long = "mail-subject", env = "MAIL_SUBJECT", default_value = DEFAULT_SUBJECT)]
    pub subject: String,

    /// How the QR code is embedded into the email
    #[clap(long, env = "QR_EMBEDDING", value_enum, default_value_t = QrEmbedding::DataUri)]
    pub qr_embedding: QrEmbedding,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            qr_embedding: QrEmbedding::default(),
        }
    }
}

/// What was sent for a handled reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketReceipt {
    /// The reservation identifier
    pub reservation_id: String,

    /// The address the ticket went to
    pub recipient: EmailAddress,
}

/// Ticket service
#[async_trait]
pub trait TicketService: Clone + Send + Sync + 'static {
    /// Decodes a reservation message and mails its ticket to the member.
    ///
    /// # Arguments
    /// * `payload` - The raw message body taken from the queue.
    ///
    /// # Returns
    /// - [`Ok`] with a [`TicketReceipt`] once the mail server accepted the email.
    /// - [`Err`] with the [`TicketError`] of the stage that failed. Nothing is
    ///   sent when decoding, QR generation or rendering fails.
    async fn send_ticket(&self, payload: &[u8]) -> Result<TicketReceipt, TicketError>;
}

#[cfg(test)]
mock! {
    pub TicketService {}

    impl Clone for TicketService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl TicketService for TicketService {
        async fn send_ticket(&self, payload: &[u8]) -> Result<TicketReceipt, TicketError>;
    }
}

/// Ticket service implementation
#[derive(Debug, Clone)]
pub struct TicketServiceImpl<M>
where
    M: Mailer,
{
    mailer: Arc<M>,
    config: TicketConfig,
}

impl<M> TicketServiceImpl<M>
where
    M: Mailer,
{
    /// Creates a new ticket service.
    pub fn new(mailer: Arc<M>, config: TicketConfig) -> Self {
        Self { mailer, config }
    }

    fn compose(&self, reservation: &Reservation) -> Result<Message, TicketError> {
        let qr = QrCodeImage::generate(&reservation.qr_payload())?;

        let template = ReservationTicketTemplate::new(
            reservation,
            self.config.qr_embedding.image_source(&qr),
        );
        let html = css_inline::inline(&template.render()?)?;
        let plain = template.render_plain();

        let message = Message::new(
            reservation.member_email.clone(),
            &self.config.subject,
            html,
            plain,
        );

        Ok(match self.config.qr_embedding {
            QrEmbedding::DataUri => message,
            QrEmbedding::Inline => message.with_inline_image(InlineImage {
                content_id: QR_CONTENT_ID.to_string(),
                content_type: "image/png".to_string(),
                data: qr.into_png(),
            }),
        })
    }
}

#[async_trait]
impl<M> TicketService for TicketServiceImpl<M>
where
    M: Mailer,
{
    async fn send_ticket(&self, payload: &[u8]) -> Result<TicketReceipt, TicketError> {
        let reservation = Reservation::from_slice(payload)?;

        debug!(
            reservation_id = %reservation.id,
            payload = %String::from_utf8_lossy(payload),
            "reservation received"
        );

        let message = self.compose(&reservation)?;

        self.mailer.send_email(&message).await?;

        info!(
            reservation_id = %reservation.id,
            recipient = %reservation.member_email,
            "ticket mail sent"
        );

        Ok(TicketReceipt {
            reservation_id: reservation.id.to_string(),
            recipient: reservation.member_email,
        })
    }
}
