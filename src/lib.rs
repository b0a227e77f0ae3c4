//! Single sign-on ticket validation against a ledger.
//!
//! A relying service hands a ticket to [`chain::TicketValidator::validate`]; the
//! ticket is accepted when the ledger shows that the ticket's user proved the
//! login to that service on chain.

// Ledger-backed validation
pub mod chain;

// Environment configuration
pub mod config;

// HTTP endpoints
pub mod modules;

pub mod ticket;

pub use chain::{LedgerValidator, TicketValidator, ValidationError};
pub use config::{load_config, Settings, ValidatorConfig};
pub use ticket::{ChallengeHasher, DecodedTicket, TicketCodec, TicketEncoding};
