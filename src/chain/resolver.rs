//! Resolution of a user credential to the coin instance it controls.

use crate::chain::client::LedgerReader;
use crate::chain::error::ValidationError;
use crate::chain::types::{
    CredentialStruct, InstanceId, ATTRIBUTE_COIN, CONTRACT_CREDENTIAL_ID, CREDENTIAL_PUBLIC,
};
use log::debug;
use std::sync::Arc;

/// Looks up credential instances in the ledger state.
#[derive(Clone)]
pub struct AccountResolver {
    ledger: Arc<dyn LedgerReader>,
}

impl AccountResolver {
    pub fn new(ledger: Arc<dyn LedgerReader>) -> Self {
        Self { ledger }
    }

    /// Return the coin instance stored under `1-public/coin` of the credential.
    pub async fn resolve_account(
        &self,
        credential_id: &InstanceId,
    ) -> Result<InstanceId, ValidationError> {
        let proof = self.ledger.get_proof(credential_id.as_bytes()).await?;

        if !proof.exists {
            return Err(ValidationError::NotFound {
                credential_id: credential_id.to_string(),
            });
        }

        if proof.contract_id != CONTRACT_CREDENTIAL_ID {
            return Err(ValidationError::WrongContract {
                instance_id: credential_id.to_string(),
                actual: proof.contract_id,
                expected: CONTRACT_CREDENTIAL_ID,
            });
        }

        if proof.value.is_empty() {
            return Err(ValidationError::NotFound {
                credential_id: credential_id.to_string(),
            });
        }

        let record = CredentialStruct::decode_bytes(&proof.value).map_err(|e| {
            ValidationError::DecodeError {
                what: "credential",
                reason: e.to_string(),
            }
        })?;

        let coin = record
            .attribute(CREDENTIAL_PUBLIC, ATTRIBUTE_COIN)
            .ok_or_else(|| ValidationError::AttributeMissing {
                credential_id: credential_id.to_string(),
                group: CREDENTIAL_PUBLIC,
                attribute: ATTRIBUTE_COIN,
            })?;

        let account = InstanceId::from_slice(coin).ok_or_else(|| ValidationError::DecodeError {
            what: "coin instance id",
            reason: format!("expected 32 bytes, got {}", coin.len()),
        })?;

        debug!(
            "Credential {} resolved to coin {}",
            credential_id.short(),
            account.short()
        );
        Ok(account)
    }
}
