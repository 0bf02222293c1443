//! Outgoing communication: email addresses and the mailer port

pub mod email_addresses;
pub mod mailer;
