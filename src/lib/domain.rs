//! Domain logic: reservation tickets and outgoing mail

pub mod communication;
pub mod tickets;
