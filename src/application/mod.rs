//! Application layer containing the marketplace use cases.
//!
//! `MarketEngine` is the primary entry point: it authenticates the caller and
//! dispatches each command to the contract workflow, the payment
//! orchestrator, the invoice generator, the message center or the
//! notification inbox. Side effects that must never fail a request go
//! through the notification dispatcher's background worker.

pub mod command;
pub mod engine;
pub mod export;
pub mod guards;
pub mod invoices;
pub mod messaging;
pub mod notifications;
pub mod payments;
pub mod workflow;
