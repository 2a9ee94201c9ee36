//! Marketplace entities, value types and the ports the application layer
//! depends on. Nothing in here performs I/O.

pub mod contract;
pub mod conversation;
pub mod invoice;
pub mod ledger;
pub mod money;
pub mod notification;
pub mod payment;
pub mod ports;
pub mod project;
pub mod proposal;
pub mod store;
pub mod user;

use uuid::Uuid;

pub type UserId = Uuid;
pub type ProjectId = Uuid;
pub type ProposalId = Uuid;
pub type ContractId = Uuid;
pub type PaymentId = Uuid;
pub type InvoiceId = Uuid;
pub type NotificationId = Uuid;
pub type ConversationId = Uuid;
pub type MessageId = Uuid;
