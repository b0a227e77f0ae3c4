//! Ledger-backed ticket validation.
//!
//! A service ticket is accepted when the ledger holds a login transaction: the
//! user's coin pays the service's coin and gets the same amount back, with the
//! hash of the ticket's challenge attached to the return transfer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────────┐
//! │ RpcLedgerClient │────▶│ CachedLedger │────▶│  LedgerValidator  │
//! │ (LedgerReader)  │     │ (block cache)│     │ (TicketValidator) │
//! └─────────────────┘     └──────────────┘     └───────────────────┘
//!                                                 │             │
//!                                                 ▼             ▼
//!                                    ┌─────────────────┐ ┌──────────────┐
//!                                    │ AccountResolver │ │ ProofMatcher │
//!                                    └─────────────────┘ └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ledger_cas::chain::{LedgerValidator, RpcLedgerClient, TicketValidator};
//!
//! let client = Arc::new(RpcLedgerClient::new(rpc_url, Duration::from_secs(10))?);
//! let validator = LedgerValidator::new(client, settings.validator);
//!
//! match validator.validate(&service_url, &ticket).await {
//!     Ok(username) => { /* authentication success */ }
//!     Err(e) => { /* INVALID_TICKET */ }
//! }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod matcher;
pub mod memory;
pub mod resolver;
pub mod types;
pub mod validator;

// Re-export main types for convenience
pub use cache::CachedLedger;
pub use client::{LedgerReader, RpcLedgerClient};
pub use error::{ChainError, ErrorKind, ValidationError};
pub use matcher::{LogObserver, NoopObserver, ProofMatcher, SkipReason, WalkObserver};
pub use memory::MemoryLedger;
pub use resolver::AccountResolver;
pub use types::{Block, BlockId, InstanceId, Proof, ValidationOutcome};
pub use validator::{Clock, LedgerValidator, SystemClock, TicketValidator};
