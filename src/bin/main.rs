use std::sync::Arc;

use ledger_cas::chain::{CachedLedger, LedgerReader, LedgerValidator, RpcLedgerClient};
use ledger_cas::config::load_config;
use ledger_cas::modules::http_validate::{router, ValidateState};
use log::{info, warn};
use tokio::net::TcpListener;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let settings = load_config()?;
    info!(
        "Loaded {} service account(s), challenge size {}, validity {:?}",
        settings.validator.service_accounts.len(),
        settings.validator.challenge_size,
        settings.validator.tx_validity
    );
    if settings.validator.service_accounts.is_empty() {
        warn!("No service accounts configured, every ticket will be rejected");
    }

    // Ledger client, with the block cache unless disabled
    let client = Arc::new(RpcLedgerClient::new(
        settings.ledger_rpc_url.clone(),
        settings.ledger_rpc_timeout,
    )?);
    let ledger: Arc<dyn LedgerReader> = if settings.block_cache_capacity > 0 {
        Arc::new(CachedLedger::new(client, settings.block_cache_capacity))
    } else {
        client
    };

    let validator = Arc::new(LedgerValidator::new(ledger, settings.validator.clone()));
    let state = Arc::new(ValidateState {
        validator,
        expose_failure_reason: settings.expose_failure_reason,
    });

    // Bind the server
    let listener = TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!("Listening on: 0.0.0.0:{}", settings.port);

    axum::serve(listener, router(state)).await?;

    Ok(())
}
