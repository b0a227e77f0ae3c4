//! Service ticket encoding.
//!
//! A ticket is `ST-` followed by the text encoding of `challenge || user_credential_id`,
//! where the challenge has a configured size and the credential id is an
//! [`InstanceId`].

use crate::chain::error::ValidationError;
use crate::chain::types::{InstanceId, INSTANCE_ID_SIZE};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use blake2::{digest::consts::U32, Blake2b};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Prefix every service ticket starts with.
pub const SERVICE_TICKET_PREFIX: &str = "ST-";

/// Text encoding of the ticket body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEncoding {
    Base64Url,
    Base64,
    Hex,
    Base58,
}

impl TicketEncoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            TicketEncoding::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
            TicketEncoding::Base64 => STANDARD.encode(bytes),
            TicketEncoding::Hex => hex::encode(bytes),
            TicketEncoding::Base58 => bs58::encode(bytes).into_string(),
        }
    }

    pub fn decode(&self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            TicketEncoding::Base64Url => URL_SAFE_NO_PAD.decode(text).map_err(|e| e.to_string()),
            TicketEncoding::Base64 => STANDARD.decode(text).map_err(|e| e.to_string()),
            TicketEncoding::Hex => hex::decode(text).map_err(|e| e.to_string()),
            TicketEncoding::Base58 => bs58::decode(text).into_vec().map_err(|e| e.to_string()),
        }
    }
}

impl FromStr for TicketEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64url" => Ok(TicketEncoding::Base64Url),
            "base64" => Ok(TicketEncoding::Base64),
            "hex" => Ok(TicketEncoding::Hex),
            "base58" => Ok(TicketEncoding::Base58),
            other => Err(format!("Unsupported ticket encoding: {}", other)),
        }
    }
}

impl fmt::Display for TicketEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketEncoding::Base64Url => write!(f, "base64url"),
            TicketEncoding::Base64 => write!(f, "base64"),
            TicketEncoding::Hex => write!(f, "hex"),
            TicketEncoding::Base58 => write!(f, "base58"),
        }
    }
}

/// Hash applied to the challenge before it is compared with the on-chain payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeHasher {
    Sha256,
    Blake2b256,
}

impl ChallengeHasher {
    pub fn hash(&self, challenge: &[u8]) -> Vec<u8> {
        match self {
            ChallengeHasher::Sha256 => Sha256::digest(challenge).to_vec(),
            ChallengeHasher::Blake2b256 => Blake2b::<U32>::digest(challenge).to_vec(),
        }
    }
}

impl FromStr for ChallengeHasher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(ChallengeHasher::Sha256),
            "blake2b256" => Ok(ChallengeHasher::Blake2b256),
            other => Err(format!("Unsupported challenge hash: {}", other)),
        }
    }
}

/// Ticket contents after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTicket {
    pub challenge: Vec<u8>,
    pub user_credential_id: InstanceId,
}

/// Encodes and decodes service tickets for one challenge size and text encoding.
#[derive(Debug, Clone, Copy)]
pub struct TicketCodec {
    challenge_size: usize,
    encoding: TicketEncoding,
}

impl TicketCodec {
    pub fn new(challenge_size: usize, encoding: TicketEncoding) -> Self {
        Self {
            challenge_size,
            encoding,
        }
    }

    /// Decode a ticket into its challenge and user credential id.
    pub fn decode(&self, ticket: &str) -> Result<DecodedTicket, ValidationError> {
        let body = ticket
            .strip_prefix(SERVICE_TICKET_PREFIX)
            .ok_or(ValidationError::MalformedTicket {
                prefix: SERVICE_TICKET_PREFIX,
            })?;

        let packed = self
            .encoding
            .decode(body)
            .map_err(|reason| ValidationError::DecodeError {
                what: "ticket",
                reason,
            })?;

        // a challenge size too large to add up can never match
        let expected = self
            .challenge_size
            .checked_add(INSTANCE_ID_SIZE)
            .unwrap_or(usize::MAX);
        if packed.len() != expected {
            return Err(ValidationError::InvalidLength {
                actual: packed.len(),
                expected,
            });
        }

        let (challenge, credential) = packed.split_at(self.challenge_size);
        let user_credential_id =
            InstanceId::from_slice(credential).ok_or(ValidationError::InvalidLength {
                actual: packed.len(),
                expected,
            })?;

        Ok(DecodedTicket {
            challenge: challenge.to_vec(),
            user_credential_id,
        })
    }

    /// Build the ticket a client presents after proving its login on chain.
    pub fn encode(&self, challenge: &[u8], user_credential_id: &InstanceId) -> String {
        let mut packed = Vec::with_capacity(challenge.len() + INSTANCE_ID_SIZE);
        packed.extend_from_slice(challenge);
        packed.extend_from_slice(user_credential_id.as_bytes());
        format!("{}{}", SERVICE_TICKET_PREFIX, self.encoding.encode(&packed))
    }
}
