#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Reservation ticket mailer
//!
//! Consumes reservation messages from RabbitMQ and sends each member a ticket
//! email carrying a QR code of the reservation identifier.

pub mod domain;
pub mod infrastructure;
