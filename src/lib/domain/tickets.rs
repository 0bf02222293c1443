//! Reservation tickets: decoding reservation messages and mailing a QR ticket

mod errors;
mod qr_code;
mod reservation;
mod service;
mod template;

pub use errors::TicketError;
pub use qr_code::{QrCodeError, QrCodeImage, QrEmbedding, MODULE_SIZE, QR_CONTENT_ID};
pub use reservation::{Reservation, ReservationError, ReservationId};
pub use service::{TicketConfig, TicketReceipt, TicketService, TicketServiceImpl, DEFAULT_SUBJECT};
pub use template::{ReservationTicketTemplate, TicketDetail};

/// Test doubles for the ticket service
#[cfg(test)]
pub mod tests {
    pub use super::service::MockTicketService;
}
