//! Ticket validator walking the chain for a login proof.
//!
//! Starting from the latest finalized block, each block is searched for the
//! login transaction. When a block has none, the walk moves to its first back
//! link until the proof is found or the chain runs out.

use crate::chain::client::LedgerReader;
use crate::chain::error::ValidationError;
use crate::chain::matcher::{LogObserver, ProofMatcher, WalkObserver};
use crate::chain::resolver::AccountResolver;
use crate::chain::types::{Block, InstanceId};
use crate::config::ValidatorConfig;
use crate::ticket::TicketCodec;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use url::Url;

/// Trait for ticket validation.
///
/// This trait abstracts the validation logic to enable testing the HTTP layer
/// with mock implementations.
#[async_trait]
pub trait TicketValidator: Send + Sync {
    /// Validate `ticket` for the service at `service`, returning the username.
    async fn validate(&self, service: &Url, ticket: &str) -> Result<String, ValidationError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Key of a service URL in the service account map: host, plus the port when one is given.
pub fn service_key(service: &Url) -> Option<String> {
    let host = service.host_str()?;
    Some(match service.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Opaque, stable username derived from a credential id.
pub fn username_for(credential_id: &InstanceId) -> String {
    hex::encode(&credential_id.as_bytes()[..8])
}

/// Ledger-based ticket validator implementation.
pub struct LedgerValidator {
    ledger: Arc<dyn LedgerReader>,

    resolver: AccountResolver,

    codec: TicketCodec,

    config: ValidatorConfig,

    clock: Arc<dyn Clock>,

    observer: Arc<dyn WalkObserver>,
}

impl LedgerValidator {
    /// Create a validator using the system clock and logging walk progress.
    pub fn new(ledger: Arc<dyn LedgerReader>, config: ValidatorConfig) -> Self {
        Self {
            resolver: AccountResolver::new(ledger.clone()),
            codec: TicketCodec::new(config.challenge_size, config.ticket_encoding),
            ledger,
            config,
            clock: Arc::new(SystemClock),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn WalkObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fail when the head of the chain is older than the validity window.
    ///
    /// Only the head is checked; ancestors visited later are not.
    fn check_freshness(&self, latest: &Block) -> Result<(), ValidationError> {
        let header = latest.header().map_err(|e| ValidationError::CorruptBlock {
            block: latest.hash.to_string(),
            reason: e.to_string(),
        })?;

        let produced = Utc.timestamp_nanos(header.timestamp);
        // a head timestamped ahead of our clock has a negative age and is fresh
        if let Ok(age) = (self.clock.now() - produced).to_std() {
            if age > self.config.tx_validity {
                return Err(ValidationError::StaleProof {
                    age_secs: age.as_secs(),
                    window_secs: self.config.tx_validity.as_secs(),
                });
            }
        }
        Ok(())
    }

    /// Walk back from `latest` until a block holds the login proof.
    async fn find_login_proof(
        &self,
        latest: Block,
        matcher: &ProofMatcher<'_>,
    ) -> Result<(), ValidationError> {
        let mut block = latest;
        let mut visited = 1usize;

        loop {
            if matcher.matches(&block, self.observer.as_ref())? {
                debug!(
                    "Login proof found in block {} after {} block(s)",
                    block.hash.short(),
                    visited
                );
                return Ok(());
            }

            let parent = match block.parent_id() {
                Some(parent) => parent.clone(),
                None => {
                    debug!(
                        "Reached block {} without back link after {} block(s)",
                        block.hash.short(),
                        visited
                    );
                    return Err(ValidationError::ProofNotFound);
                }
            };

            let next = self.ledger.get_block(&parent).await?;
            // back links must point strictly down the chain or the walk could loop
            if next.index >= block.index {
                return Err(ValidationError::CorruptBlock {
                    block: block.hash.to_string(),
                    reason: format!(
                        "back link to block {} at index {}, not below {}",
                        next.hash, next.index, block.index
                    ),
                });
            }
            block = next;
            visited += 1;
        }
    }

    async fn validate_inner(&self, service: &Url, ticket: &str) -> Result<String, ValidationError> {
        // 1. Service account from configuration
        let host = service_key(service).ok_or_else(|| ValidationError::UnknownHost {
            host: service.to_string(),
        })?;
        let service_account = *self
            .config
            .service_accounts
            .get(&host)
            .ok_or(ValidationError::UnknownHost { host })?;

        // 2. Ticket contents
        let decoded = self.codec.decode(ticket)?;

        // 3. User account from the credential
        let user_account = self
            .resolver
            .resolve_account(&decoded.user_credential_id)
            .await?;

        // 4. Head of the chain, which must be recent enough
        let latest = self.ledger.get_latest_block().await?;
        self.check_freshness(&latest)?;

        // 5. Walk back for the login transaction
        let hashed_challenge = self.config.challenge_hasher.hash(&decoded.challenge);
        let matcher = ProofMatcher::new(
            &user_account,
            &service_account,
            &hashed_challenge,
            &self.config.tx_argument_name,
        );
        self.find_login_proof(latest, &matcher).await?;

        Ok(username_for(&decoded.user_credential_id))
    }
}

#[async_trait]
impl TicketValidator for LedgerValidator {
    async fn validate(&self, service: &Url, ticket: &str) -> Result<String, ValidationError> {
        match self.validate_inner(service, ticket).await {
            Ok(username) => {
                info!("Ticket validated for user {} at {}", username, service);
                Ok(username)
            }
            Err(e) => {
                warn!(
                    "Ticket validation failed for {} ({:?}): {}",
                    service,
                    e.kind(),
                    e
                );
                Err(e)
            }
        }
    }
}
