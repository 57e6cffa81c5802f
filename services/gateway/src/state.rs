use crate::sandbox::SandboxSeed;
use crate::settings::Settings;
use settlement::audit::{AuditLog, HttpAuditLog, InMemoryAuditLog};
use settlement::ledger::{HttpLedgerGateway, LedgerGateway};
use settlement::oracle::{AssetPair, FixedPriceOracle, HttpPriceOracle, PriceOracle};
use settlement::store::{DurableStore, InMemoryStore, Store};
use settlement::Exchange;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
}

impl AppState {
    pub fn new(exchange: Arc<Exchange>) -> Self {
        Self { exchange }
    }

    /// Wire the exchange to HTTP collaborators where configured, sandbox ones otherwise
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let seed = match &settings.seed_path {
            Some(path) => SandboxSeed::load(path)?,
            None => SandboxSeed::default(),
        };
        let (store_seed, sandbox_ledger) = seed.into_parts();

        let store: Arc<dyn Store> = match settings.durable_store() {
            Some(config) => {
                tracing::info!(dir = %config.dir.display(), "Using durable store");
                Arc::new(DurableStore::open(config, store_seed)?)
            }
            None if settings.ledger_url.is_some() => {
                // Pending and partial settlements must survive a restart
                anyhow::bail!("ledger_url is set but store_dir is not; refusing to settle against an in-memory store");
            }
            None => {
                tracing::warn!("No store directory configured, state is lost on restart");
                Arc::new(InMemoryStore::from_seed(store_seed))
            }
        };

        let ledger: Arc<dyn LedgerGateway> = match &settings.ledger_url {
            Some(url) => {
                tracing::info!(url = %url, "Using ledger bridge");
                Arc::new(HttpLedgerGateway::new(url.clone(), settings.http_timeout())?)
            }
            None => {
                tracing::warn!("No ledger URL configured, settling against the sandbox ledger");
                Arc::new(sandbox_ledger)
            }
        };

        let oracle: Arc<dyn PriceOracle> = match &settings.oracle_url {
            Some(url) => Arc::new(HttpPriceOracle::new(url.clone(), settings.http_timeout())?),
            None => {
                let oracle = FixedPriceOracle::new();
                if let Some(rate) = settings.sandbox_exchange_rate {
                    let pair = AssetPair::new(&settings.engine.fiat_currency, &settings.engine.settlement_currency);
                    oracle.set_price(pair, rate);
                }
                Arc::new(oracle)
            }
        };

        let audit: Arc<dyn AuditLog> = match &settings.audit_url {
            Some(url) => Arc::new(HttpAuditLog::new(url.clone())),
            None => Arc::new(InMemoryAuditLog::new()),
        };

        let exchange = Exchange::new(settings.engine.clone(), store, ledger, oracle, audit);
        Ok(Self::new(Arc::new(exchange)))
    }
}
