//! What happens to a delivery once its ticket was (or was not) sent

use clap::ValueEnum;

use crate::domain::tickets::TicketError;

/// How deliveries that failed after validation are settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Return the message to the queue for another attempt
    #[default]
    Requeue,

    /// Reject the message; the broker routes it to the queue's dead letter exchange if any
    DeadLetter,

    /// Acknowledge and forget the message
    Drop,
}

/// The answer given to the broker for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// `basic.ack`
    Ack,

    /// `basic.nack` with requeue
    Requeue,

    /// `basic.reject` without requeue
    Reject,
}

impl FailurePolicy {
    /// Settlement for a handling result.
    ///
    /// Sent tickets are acknowledged. Messages that can never succeed are
    /// rejected without requeue whatever the policy.
    pub fn settle<T>(&self, result: &Result<T, TicketError>) -> Settlement {
        match result {
            Ok(_) => Settlement::Ack,
            Err(TicketError::Validation(_)) => Settlement::Reject,
            Err(_) => match self {
                Self::Requeue => Settlement::Requeue,
                Self::DeadLetter => Settlement::Reject,
                Self::Drop => Settlement::Ack,
            },
        }
    }
}
