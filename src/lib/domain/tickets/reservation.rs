//! Reservation messages as published on the mail queue

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::domain::communication::email_addresses::{EmailAddress, EmailAddressError};

/// Errors raised while reading a reservation message
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Not UTF-8 JSON, not an object, or a required field is missing
    #[error("malformed reservation payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `reservationId` is an empty string
    #[error("reservation id is empty")]
    EmptyReservationId,

    /// `memberEmail` is not a usable address
    #[error("member email is invalid: {0}")]
    InvalidMemberEmail(#[from] EmailAddressError),
}

/// Reservation identifier, sent either as a string or as a number
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReservationId {
    /// A textual identifier such as `R123`
    Text(String),

    /// A numeric identifier
    Number(Number),
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(id) => write!(f, "{id}"),
            Self::Number(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReservation {
    reservation_id: ReservationId,
    member_email: String,
    #[serde(flatten)]
    details: Map<String, Value>,
}

/// A decoded reservation message
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    /// The reservation identifier encoded into the QR code
    pub id: ReservationId,

    /// The member the ticket is mailed to
    pub member_email: EmailAddress,

    /// Every other field of the message, in message order
    pub details: Map<String, Value>,
}

impl Reservation {
    /// Decodes a reservation from a raw queue payload
    ///
    /// # Errors
    /// Returns a [`ReservationError`] when the payload is not a JSON object, when
    /// `reservationId` or `memberEmail` is missing, or when either is unusable.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ReservationError> {
        let raw: RawReservation = serde_json::from_slice(payload)?;

        if matches!(&raw.reservation_id, ReservationId::Text(id) if id.trim().is_empty()) {
            return Err(ReservationError::EmptyReservationId);
        }

        Ok(Self {
            id: raw.reservation_id,
            member_email: EmailAddress::new(&raw.member_email)?,
            details: raw.details,
        })
    }

    /// The text carried by the ticket's QR code
    pub fn qr_payload(&self) -> String {
        format!("reservation_id: {}", self.id)
    }

    /// The extra fields as label/value pairs ready for display
    pub fn display_details(&self) -> Vec<(String, String)> {
        self.details
            .iter()
            .map(|(label, value)| (label.clone(), display_value(value)))
            .collect()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
