//! Email delivery adapters

pub mod smtp;
