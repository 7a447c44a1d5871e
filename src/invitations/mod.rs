//! Invitation ledger: offers from a trainer to a contact.

pub mod ledger;
pub mod model;

pub use ledger::{Acceptance, InvitationLedger};
pub use model::{ClientDetails, CompletionMode, Invitation, InvitationStatus};
