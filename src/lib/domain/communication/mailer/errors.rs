//! Mailer errors

use lettre::{address::AddressError, error::Error as MessageError, transport::smtp};
use thiserror::Error;
use tracing::debug;

/// Mailer errors
#[derive(Debug, Error)]
pub enum MailerError {
    /// The SMTP server refused or failed to accept the email
    #[error("an error occurred while sending the email: {0}")]
    SendError(String),

    /// Sender or recipient address could not be used
    #[error("invalid email address")]
    InvalidEmail,

    /// The MIME message could not be built
    #[error("could not build the email: {0}")]
    InvalidMessage(String),

    /// Unknown error
    #[error(transparent)]
    UnknownError(anyhow::Error),
}

impl From<anyhow::Error> for MailerError {
    fn from(err: anyhow::Error) -> Self {
        MailerError::UnknownError(err)
    }
}

impl From<AddressError> for MailerError {
    fn from(err: AddressError) -> Self {
        debug!("AddressError -> MailerError: {err}");

        MailerError::InvalidEmail
    }
}

impl From<MessageError> for MailerError {
    fn from(err: MessageError) -> Self {
        debug!("lettre::error::Error -> MailerError");

        MailerError::InvalidMessage(err.to_string())
    }
}

impl From<smtp::Error> for MailerError {
    fn from(err: smtp::Error) -> Self {
        debug!("smtp::Error -> MailerError");

        MailerError::SendError(err.to_string())
    }
}
