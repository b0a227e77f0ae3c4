//! Ledger data model consumed by ticket validation.
//!
//! Blocks carry their header and body as SCALE-encoded byte strings, the same
//! way the node stores them. Decoding happens on demand in [`Block::header`]
//! and [`Block::body`] so a corrupt block is reported where it is inspected.

use scale::{Decode, DecodeAll, Encode};
use serde::Serialize;
use std::fmt;

/// Size in bytes of an instance (account / credential) identifier.
pub const INSTANCE_ID_SIZE: usize = 32;

/// Contract id of value-holding coin instances.
pub const CONTRACT_COIN_ID: &str = "coin";

/// Contract id of credential instances.
pub const CONTRACT_CREDENTIAL_ID: &str = "credential";

/// Coin contract command moving value between instances.
pub const COMMAND_TRANSFER: &str = "transfer";

/// Transfer argument naming the receiving coin instance.
pub const ARG_DESTINATION: &str = "destination";

/// Transfer argument holding the amount.
pub const ARG_COIN: &str = "coin";

/// Credential group holding the public attributes of a user.
pub const CREDENTIAL_PUBLIC: &str = "1-public";

/// Attribute in [`CREDENTIAL_PUBLIC`] pointing to the user's coin instance.
pub const ATTRIBUTE_COIN: &str = "coin";

/// Fixed-size identifier of a ledger instance (coin account, credential, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct InstanceId(pub [u8; INSTANCE_ID_SIZE]);

impl InstanceId {
    /// Build an identifier from a slice, failing unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; INSTANCE_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex of the first 8 bytes, used in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.short())
    }
}

/// Identifier (hash) of a block.
#[derive(Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct BlockId(pub Vec<u8>);

impl BlockId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(8)])
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.short())
    }
}

/// A finalized block as served by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: BlockId,

    /// Height of the block in the chain.
    pub index: u64,

    /// SCALE-encoded [`DataHeader`].
    pub data: Vec<u8>,

    /// SCALE-encoded [`DataBody`].
    pub payload: Vec<u8>,

    /// Links to earlier blocks; index 0 is the direct parent.
    pub back_link_ids: Vec<BlockId>,
}

impl Block {
    /// Assemble a block from its decoded parts.
    pub fn from_parts(
        hash: BlockId,
        index: u64,
        header: &DataHeader,
        body: &DataBody,
        back_link_ids: Vec<BlockId>,
    ) -> Self {
        Self {
            hash,
            index,
            data: header.encode(),
            payload: body.encode(),
            back_link_ids,
        }
    }

    pub fn header(&self) -> Result<DataHeader, scale::Error> {
        DataHeader::decode_all(&mut &self.data[..])
    }

    pub fn body(&self) -> Result<DataBody, scale::Error> {
        DataBody::decode_all(&mut &self.payload[..])
    }

    /// The block this one extends. Only the first back link is ever followed.
    pub fn parent_id(&self) -> Option<&BlockId> {
        self.back_link_ids.first()
    }
}

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DataHeader {
    pub trie_root: Vec<u8>,
    pub client_transaction_hash: Vec<u8>,
    pub state_change_hash: Vec<u8>,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub version: u32,
}

impl DataHeader {
    pub fn at(timestamp: i64) -> Self {
        Self {
            trie_root: Vec::new(),
            client_transaction_hash: Vec::new(),
            state_change_hash: Vec::new(),
            timestamp,
            version: 1,
        }
    }
}

/// Block body: every transaction the block processed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct DataBody {
    pub tx_results: Vec<TxResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxResult {
    pub client_transaction: ClientTransaction,
    pub accepted: bool,
}

impl TxResult {
    pub fn accepted(client_transaction: ClientTransaction) -> Self {
        Self {
            client_transaction,
            accepted: true,
        }
    }

    pub fn rejected(client_transaction: ClientTransaction) -> Self {
        Self {
            client_transaction,
            accepted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct ClientTransaction {
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Instruction {
    /// Instance the instruction acts on.
    pub instance_id: InstanceId,
    pub kind: InstructionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum InstructionKind {
    Spawn(Spawn),
    Invoke(Invoke),
    Delete(Delete),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Spawn {
    pub contract_id: String,
    pub args: Arguments,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Invoke {
    pub contract_id: String,
    pub command: String,
    pub args: Arguments,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Delete {
    pub contract_id: String,
}

impl Instruction {
    pub fn invoke(
        instance_id: InstanceId,
        contract_id: &str,
        command: &str,
        args: Vec<Argument>,
    ) -> Self {
        Self {
            instance_id,
            kind: InstructionKind::Invoke(Invoke {
                contract_id: contract_id.to_string(),
                command: command.to_string(),
                args: Arguments(args),
            }),
        }
    }

    pub fn spawn(instance_id: InstanceId, contract_id: &str, args: Vec<Argument>) -> Self {
        Self {
            instance_id,
            kind: InstructionKind::Spawn(Spawn {
                contract_id: contract_id.to_string(),
                args: Arguments(args),
            }),
        }
    }

    /// The invoke payload if this is a coin `transfer`.
    pub fn as_coin_transfer(&self) -> Option<&Invoke> {
        match &self.kind {
            InstructionKind::Invoke(invoke)
                if invoke.contract_id == CONTRACT_COIN_ID && invoke.command == COMMAND_TRANSFER =>
            {
                Some(invoke)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Argument {
    pub name: String,
    pub value: Vec<u8>,
}

impl Argument {
    pub fn new(name: &str, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Ordered keyed arguments of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct Arguments(pub Vec<Argument>);

impl Arguments {
    /// Value of the first argument called `name`.
    pub fn search(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| arg.value.as_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of a key lookup in the ledger's authenticated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub value: Vec<u8>,
    pub contract_id: String,
    pub exists: bool,
}

impl Proof {
    pub fn absent() -> Self {
        Self {
            value: Vec::new(),
            contract_id: String::new(),
            exists: false,
        }
    }
}

/// Value stored in a credential instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct CredentialStruct {
    pub credentials: Vec<Credential>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Credential {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Attribute {
    pub name: String,
    pub value: Vec<u8>,
}

impl CredentialStruct {
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, scale::Error> {
        Self::decode_all(&mut &bytes[..])
    }

    /// Value of `attribute` in the first group called `group` that has it.
    pub fn attribute(&self, group: &str, attribute: &str) -> Option<&[u8]> {
        self.credentials
            .iter()
            .filter(|c| c.name == group)
            .flat_map(|c| c.attributes.iter())
            .find(|a| a.name == attribute)
            .map(|a| a.value.as_slice())
    }

    /// Credential record pointing to `coin` through `1-public/coin`.
    pub fn with_coin(coin: &InstanceId) -> Self {
        Self {
            credentials: vec![Credential {
                name: CREDENTIAL_PUBLIC.to_string(),
                attributes: vec![Attribute {
                    name: ATTRIBUTE_COIN.to_string(),
                    value: coin.as_bytes().to_vec(),
                }],
            }],
        }
    }
}

/// Tagged result of one validation, before it is rendered for a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// The validated ticket, echoed back on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationOutcome {
    pub fn success(username: String) -> Self {
        Self {
            ok: true,
            username: Some(username),
            ticket: None,
            code: None,
            message: None,
        }
    }

    pub fn with_ticket(mut self, ticket: &str) -> Self {
        self.ticket = Some(ticket.to_string());
        self
    }

    pub fn failure(code: &str, message: String) -> Self {
        Self {
            ok: false,
            username: None,
            ticket: None,
            code: Some(code.to_string()),
            message: Some(message),
        }
    }
}
