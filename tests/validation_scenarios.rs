use chrono::{DateTime, TimeZone, Utc};
use ledger_cas::chain::memory::login_transaction;
use ledger_cas::chain::types::{DataBody, DataHeader, TxResult};
use ledger_cas::chain::{
    Block, BlockId, CachedLedger, ChainError, Clock, ErrorKind, InstanceId, LedgerValidator,
    MemoryLedger, SkipReason, TicketValidator, ValidationError, WalkObserver,
};
use ledger_cas::{ChallengeHasher, TicketCodec, TicketEncoding, ValidatorConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

const USER_CRED: InstanceId = InstanceId([0x01; 32]);
const USER_COIN: InstanceId = InstanceId([0x02; 32]);
const SERVICE_COIN: InstanceId = InstanceId([0x03; 32]);
const OTHER_SERVICE_COIN: InstanceId = InstanceId([0x04; 32]);
const CHALLENGE: [u8; 16] = [0u8; 16];
const SERVICE_URL: &str = "https://app.example.org/login";

/// 2023-11-14T22:13:20Z
const NOW_SECS: i64 = 1_700_000_000;
const NANOS: i64 = 1_000_000_000;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
struct Recorder {
    blocks: Mutex<Vec<(BlockId, bool)>>,
    skips: Mutex<Vec<SkipReason>>,
}

impl WalkObserver for Recorder {
    fn block_checked(&self, block: &BlockId, _timestamp: i64, matched: bool) {
        self.blocks.lock().unwrap().push((block.clone(), matched));
    }

    fn transaction_skipped(&self, _block: &BlockId, _index: usize, reason: SkipReason) {
        self.skips.lock().unwrap().push(reason);
    }
}

fn config() -> ValidatorConfig {
    let mut service_accounts = HashMap::new();
    service_accounts.insert("app.example.org".to_string(), SERVICE_COIN);
    service_accounts.insert("wiki.example.org".to_string(), OTHER_SERVICE_COIN);
    ValidatorConfig {
        service_accounts,
        ..ValidatorConfig::default()
    }
}

fn id(n: u8) -> BlockId {
    BlockId(vec![n; 32])
}

/// Seconds before "now" to nanosecond timestamp.
fn ago(secs: i64) -> i64 {
    (NOW_SECS - secs) * NANOS
}

fn block(n: u8, timestamp: i64, results: Vec<TxResult>, back_links: Vec<BlockId>) -> Block {
    Block::from_parts(
        id(n),
        n as u64,
        &DataHeader::at(timestamp),
        &DataBody {
            tx_results: results,
        },
        back_links,
    )
}

fn login(hash: &[u8]) -> TxResult {
    TxResult::accepted(login_transaction(
        &USER_COIN,
        &SERVICE_COIN,
        100,
        "challenge",
        hash,
    ))
}

fn good_hash() -> Vec<u8> {
    ChallengeHasher::Sha256.hash(&CHALLENGE)
}

fn bad_hash() -> Vec<u8> {
    let mut hash = good_hash();
    hash[0] ^= 0xff;
    hash
}

fn ticket() -> String {
    TicketCodec::new(16, TicketEncoding::Base64Url).encode(&CHALLENGE, &USER_CRED)
}

fn service() -> Url {
    Url::parse(SERVICE_URL).unwrap()
}

/// Ledger holding `head` as latest block plus `ancestors`, and the user's credential.
async fn ledger_with(head: Block, ancestors: Vec<Block>) -> Arc<MemoryLedger> {
    let ledger = Arc::new(MemoryLedger::new());
    for block in ancestors {
        ledger.insert_block(block).await;
    }
    ledger.push_block(head).await;
    ledger.insert_credential(&USER_CRED, &USER_COIN).await;
    ledger
}

fn validator(ledger: Arc<MemoryLedger>) -> LedgerValidator {
    validator_with(ledger, config())
}

fn validator_with(ledger: Arc<MemoryLedger>, config: ValidatorConfig) -> LedgerValidator {
    LedgerValidator::new(ledger, config)
        .with_clock(Arc::new(FixedClock(Utc.timestamp_opt(NOW_SECS, 0).unwrap())))
}

#[tokio::test]
async fn test_login_in_latest_block() {
    let ledger = ledger_with(block(1, ago(10), vec![login(&good_hash())], vec![id(0)]), vec![]).await;

    let username = validator(ledger.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap();

    assert_eq!(username, "0101010101010101");
    assert_eq!(ledger.block_fetches(), 1);
}

#[tokio::test]
async fn test_wrong_hash_walks_to_genesis() {
    let head = block(1, ago(10), vec![login(&bad_hash())], vec![id(0)]);
    let genesis = block(0, ago(20), vec![], vec![]);
    let ledger = ledger_with(head, vec![genesis]).await;

    let recorder = Arc::new(Recorder::default());
    let err = validator(ledger.clone())
        .with_observer(recorder.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap_err();

    assert!(matches!(err, ValidationError::ProofNotFound));
    assert_eq!(ledger.block_fetches(), 2);
    assert_eq!(
        *recorder.blocks.lock().unwrap(),
        vec![(id(1), false), (id(0), false)]
    );
    assert_eq!(
        *recorder.skips.lock().unwrap(),
        vec![SkipReason::ChallengeMismatch]
    );
}

#[tokio::test]
async fn test_login_found_in_ancestor() {
    let head = block(3, ago(5), vec![], vec![id(2)]);
    let b2 = block(2, ago(50), vec![login(&bad_hash())], vec![id(1)]);
    let b1 = block(1, ago(100), vec![login(&good_hash())], vec![id(0)]);
    let b0 = block(0, ago(200), vec![login(&good_hash())], vec![]);
    let ledger = ledger_with(head, vec![b2, b1, b0]).await;

    let username = validator(ledger.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap();

    assert_eq!(username, "0101010101010101");
    // stops at the first matching block, never reaching genesis
    assert_eq!(ledger.block_fetches(), 3);
}

#[tokio::test]
async fn test_stale_head_fails_without_walking() {
    let head = block(1, ago(7200), vec![login(&bad_hash())], vec![id(0)]);
    let genesis = block(0, ago(7300), vec![login(&good_hash())], vec![]);
    let ledger = ledger_with(head, vec![genesis]).await;

    let err = validator(ledger.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ValidationError::StaleProof {
            age_secs: 7200,
            window_secs: 3600
        }
    ));
    assert_eq!(ledger.block_fetches(), 1);
}

#[tokio::test]
async fn test_stale_head_even_with_proof_in_it() {
    let ledger = ledger_with(block(1, ago(3601), vec![login(&good_hash())], vec![]), vec![]).await;

    let err = validator(ledger)
        .validate(&service(), &ticket())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleProof);
}

#[tokio::test]
async fn test_freshness_only_checked_on_head() {
    // An ancestor far outside the window still proves the login while the head is recent.
    let head = block(2, ago(1), vec![], vec![id(1)]);
    let old = block(1, ago(30 * 86_400), vec![login(&good_hash())], vec![]);
    let ledger = ledger_with(head, vec![old]).await;

    let username = validator(ledger)
        .validate(&service(), &ticket())
        .await
        .unwrap();
    assert_eq!(username, "0101010101010101");
}

#[tokio::test]
async fn test_head_from_the_future_is_fresh() {
    let ledger = ledger_with(block(1, ago(-60), vec![login(&good_hash())], vec![]), vec![]).await;
    assert!(validator(ledger).validate(&service(), &ticket()).await.is_ok());
}

#[tokio::test]
async fn test_only_primary_back_link_followed() {
    let head = block(3, ago(1), vec![], vec![id(1), id(2)]);
    let primary = block(1, ago(2), vec![], vec![]);
    let secondary = block(2, ago(2), vec![login(&good_hash())], vec![]);
    let ledger = ledger_with(head, vec![primary, secondary]).await;

    let err = validator(ledger.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap_err();

    assert!(matches!(err, ValidationError::ProofNotFound));
    assert_eq!(ledger.block_fetches(), 2);
}

#[tokio::test]
async fn test_proof_unreachable_from_head() {
    // a valid login sitting in a block the head does not link back to
    let head = block(2, ago(1), vec![], vec![id(1)]);
    let parent = block(1, ago(2), vec![], vec![]);
    let detached = block(9, ago(3), vec![login(&good_hash())], vec![]);
    let ledger = ledger_with(head, vec![parent, detached]).await;

    let err = validator(ledger)
        .validate(&service(), &ticket())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProofNotFound);
}

#[tokio::test]
async fn test_login_for_other_service_rejected() {
    let ledger = ledger_with(block(1, ago(1), vec![login(&good_hash())], vec![]), vec![]).await;

    let err = validator(ledger)
        .validate(&Url::parse("https://wiki.example.org/").unwrap(), &ticket())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProofNotFound);
}

#[tokio::test]
async fn test_unknown_host() {
    let ledger = ledger_with(block(1, ago(1), vec![login(&good_hash())], vec![]), vec![]).await;

    let err = validator(ledger.clone())
        .validate(&Url::parse("https://evil.example.org/").unwrap(), &ticket())
        .await
        .unwrap_err();

    assert!(matches!(err, ValidationError::UnknownHost { .. }));
    assert_eq!(ledger.block_fetches(), 0);
    assert_eq!(ledger.proof_lookups(), 0);
}

#[tokio::test]
async fn test_missing_prefix_never_resolves_accounts() {
    let ledger = ledger_with(block(1, ago(1), vec![login(&good_hash())], vec![]), vec![]).await;
    let ticket = ticket().replacen("ST-", "PT-", 1);

    let err = validator(ledger.clone())
        .validate(&service(), &ticket)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedTicket);
    assert_eq!(ledger.proof_lookups(), 0);
    assert_eq!(ledger.block_fetches(), 0);
}

#[tokio::test]
async fn test_short_ticket() {
    let ledger = ledger_with(block(1, ago(1), vec![], vec![]), vec![]).await;
    let short = TicketCodec::new(8, TicketEncoding::Base64Url).encode(&[0u8; 8], &USER_CRED);

    let err = validator(ledger)
        .validate(&service(), &short)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::InvalidLength {
            actual: 40,
            expected: 48
        }
    ));
}

#[tokio::test]
async fn test_unknown_credential() {
    let ledger = ledger_with(block(1, ago(1), vec![login(&good_hash())], vec![]), vec![]).await;
    let stranger = TicketCodec::new(16, TicketEncoding::Base64Url)
        .encode(&CHALLENGE, &InstanceId([0x09; 32]));

    let err = validator(ledger.clone())
        .validate(&service(), &stranger)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(ledger.block_fetches(), 0);
}

#[tokio::test]
async fn test_missing_parent_is_transport_error() {
    let ledger = ledger_with(block(1, ago(1), vec![], vec![id(0)]), vec![]).await;

    let err = validator(ledger)
        .validate(&service(), &ticket())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Transport(ChainError::BlockNotFound { .. })
    ));
}

#[tokio::test]
async fn test_corrupt_ancestor_aborts_walk() {
    let head = block(2, ago(1), vec![], vec![id(1)]);
    let mut corrupt = block(1, ago(2), vec![login(&good_hash())], vec![id(0)]);
    corrupt.payload = vec![0xff];
    let genesis = block(0, ago(3), vec![login(&good_hash())], vec![]);
    let ledger = ledger_with(head, vec![corrupt, genesis]).await;

    let err = validator(ledger.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CorruptBlock);
    assert_eq!(ledger.block_fetches(), 2);
}

#[tokio::test]
async fn test_alternative_encoding_and_hash() {
    let hash = ChallengeHasher::Blake2b256.hash(&[7u8; 32]);
    let ledger = ledger_with(block(1, ago(1), vec![login(&hash)], vec![]), vec![]).await;
    let config = ValidatorConfig {
        challenge_size: 32,
        ticket_encoding: TicketEncoding::Base58,
        challenge_hasher: ChallengeHasher::Blake2b256,
        ..config()
    };
    let ticket = TicketCodec::new(32, TicketEncoding::Base58).encode(&[7u8; 32], &USER_CRED);

    let username = validator_with(ledger, config)
        .validate(&service(), &ticket)
        .await
        .unwrap();
    assert_eq!(username, "0101010101010101");
}

#[tokio::test]
async fn test_validation_through_block_cache() {
    let head = block(2, ago(1), vec![], vec![id(1)]);
    let parent = block(1, ago(2), vec![login(&good_hash())], vec![]);
    let memory = ledger_with(head, vec![parent]).await;
    let cached = Arc::new(CachedLedger::new(memory.clone(), 64));
    let validator = LedgerValidator::new(cached, config())
        .with_clock(Arc::new(FixedClock(Utc.timestamp_opt(NOW_SECS, 0).unwrap())));

    for _ in 0..3 {
        assert!(validator.validate(&service(), &ticket()).await.is_ok());
    }
    // head fetched every time, parent only once
    assert_eq!(memory.block_fetches(), 4);
}

#[tokio::test]
async fn test_concurrent_validations() {
    let head = block(1, ago(1), vec![login(&good_hash())], vec![id(0)]);
    let genesis = block(0, ago(2), vec![], vec![]);
    let ledger = ledger_with(head, vec![genesis]).await;
    let validator: Arc<dyn TicketValidator> = Arc::new(validator(ledger));

    let mut handles = Vec::new();
    for i in 0..8 {
        let validator = validator.clone();
        handles.push(tokio::spawn(async move {
            let ticket = if i % 2 == 0 {
                ticket()
            } else {
                ticket().replacen("ST-", "XX-", 1)
            };
            validator.validate(&service(), &ticket).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert_eq!(result.is_ok(), i % 2 == 0);
    }
}

#[tokio::test]
async fn test_short_validity_window() {
    let ledger = ledger_with(block(1, ago(90), vec![login(&good_hash())], vec![]), vec![]).await;
    let config = ValidatorConfig {
        tx_validity: Duration::from_secs(60),
        ..config()
    };

    let err = validator_with(ledger, config)
        .validate(&service(), &ticket())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleProof);
}

#[tokio::test]
async fn test_block_linking_to_itself_aborts_walk() {
    let ledger = ledger_with(block(1, ago(1), vec![], vec![id(1)]), vec![]).await;

    let err = validator(ledger.clone())
        .validate(&service(), &ticket())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CorruptBlock);
    assert_eq!(ledger.block_fetches(), 2);
}

#[tokio::test]
async fn test_back_link_loop_aborts_walk() {
    // 2 -> 1 -> 2 through the block cache, which would otherwise never hit the ledger again
    let head = block(2, ago(1), vec![], vec![id(1)]);
    let looping = block(1, ago(2), vec![], vec![id(2)]);
    let memory = ledger_with(head, vec![looping]).await;
    let cached = Arc::new(CachedLedger::new(memory.clone(), 64));
    let validator = LedgerValidator::new(cached, config())
        .with_clock(Arc::new(FixedClock(Utc.timestamp_opt(NOW_SECS, 0).unwrap())));

    let err = validator
        .validate(&service(), &ticket())
        .await
        .unwrap_err();

    assert!(matches!(err, ValidationError::CorruptBlock { .. }));
    assert_eq!(memory.block_fetches(), 2);
}
