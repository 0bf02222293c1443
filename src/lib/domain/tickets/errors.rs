//! Errors raised while turning a reservation message into a sent ticket

use css_inline::InlineError;
use thiserror::Error;
use tracing::debug;

use crate::domain::communication::mailer::MailerError;

use super::{QrCodeError, ReservationError};

/// Ticket errors, one variant per pipeline stage
#[derive(Debug, Error)]
pub enum TicketError {
    /// The queue payload is not a usable reservation
    #[error("invalid reservation message: {0}")]
    Validation(#[from] ReservationError),

    /// The QR code could not be drawn
    #[error("could not generate the QR code: {0}")]
    QrCode(#[from] QrCodeError),

    /// The email body could not be rendered
    #[error("could not render the ticket email: {0}")]
    Render(String),

    /// The email could not be handed to the mail server
    #[error("could not deliver the ticket email: {0}")]
    Delivery(#[from] MailerError),
}

impl TicketError {
    /// A short name of the failing stage, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::QrCode(_) => "qr_code",
            Self::Render(_) => "render",
            Self::Delivery(_) => "delivery",
        }
    }
}

impl From<askama::Error> for TicketError {
    fn from(err: askama::Error) -> Self {
        debug!("askama::Error -> TicketError");

        TicketError::Render(err.to_string())
    }
}

impl From<InlineError> for TicketError {
    fn from(err: InlineError) -> Self {
        debug!("InlineError -> TicketError");

        TicketError::Render(err.to_string())
    }
}
