//! Reservation queue consumption

mod policy;
pub mod rabbitmq;

pub use policy::{FailurePolicy, Settlement};
