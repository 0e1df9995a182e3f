use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use bulkpix_core::config::{AppConfig, ConfigError, LoadOptions};
use bulkpix_core::escalation::{EscalationService, NoopEscalationService};
use bulkpix_core::pricing::sources::{
    ApiPriceSource, BasePriceSource, DatasetPriceSource, DiscountRateSource, PageIdSource,
    StaticTablePriceSource,
};
use bulkpix_core::{BulkOrderEngine, PriceResolver};
use bulkpix_db::repositories::{SqlAnalyticsSink, SqlDiscountRateSource, SqlSessionStore};
use bulkpix_db::{connect_with_settings, migrations, DbPool};
use bulkpix_whatsapp::{CloudApiSender, FlowRunner, SendError};

use crate::freshdesk::FreshdeskEscalationService;
use crate::pricing_api::TierPricingClient;
use crate::webhook::WebhookState;

pub type Runner = FlowRunner<SqlSessionStore, PriceResolver>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub webhook_state: WebhookState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("message sender construction failed: {0}")]
    Sender(#[from] SendError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let rates = Arc::new(SqlDiscountRateSource::new(db_pool.clone()));

    // Base-price fallback chain, most trusted first: exported dataset CSV,
    // live storefront API, shipped static table, then whatever the discount
    // table itself carries.
    let mut sources: Vec<Arc<dyn BasePriceSource>> = Vec::new();
    if let Some(path) = &config.pricing.dataset_path {
        match DatasetPriceSource::load(path) {
            Ok(dataset) => sources.push(Arc::new(dataset)),
            Err(error) => {
                tracing::warn!(
                    event_name = "system.bootstrap.dataset_unavailable",
                    path = %path.display(),
                    error = %error,
                    "price dataset not loaded, continuing without it"
                );
            }
        }
    }

    let tier_api = TierPricingClient::new(
        config.pricing.api_base_url.clone(),
        config.pricing.api_timeout_secs,
    )
    .map_err(BootstrapError::HttpClient)?;
    let page_ids: Arc<dyn PageIdSource> = rates.clone();
    sources.push(Arc::new(ApiPriceSource::new(page_ids, Arc::new(tier_api))));
    sources.push(Arc::new(StaticTablePriceSource));
    sources.push(rates.clone());

    let discounts: Arc<dyn DiscountRateSource> = rates;
    let resolver = PriceResolver::new(discounts, sources);

    let engine = BulkOrderEngine::new(SqlSessionStore::new(db_pool.clone()), resolver)
        .with_session_ttl(Duration::from_secs(config.session.ttl_secs));

    let sender = Arc::new(CloudApiSender::new(
        config.whatsapp.api_base_url.clone(),
        config.whatsapp.phone_number_id.clone(),
        config.whatsapp.access_token.clone(),
    )?);

    let escalations: Arc<dyn EscalationService> =
        match (config.freshdesk.enabled, &config.freshdesk.domain, &config.freshdesk.api_key) {
            (true, Some(domain), Some(api_key)) => Arc::new(
                FreshdeskEscalationService::new(
                    domain.clone(),
                    api_key.clone(),
                    config.freshdesk.responder_id,
                    config.freshdesk.timeout_secs,
                )
                .map_err(BootstrapError::HttpClient)?,
            ),
            _ => {
                info!(
                    event_name = "system.bootstrap.escalation_noop",
                    "freshdesk disabled, escalations are log-only"
                );
                Arc::new(NoopEscalationService)
            }
        };

    let analytics = Arc::new(SqlAnalyticsSink::new(db_pool.clone()));

    let runner = Arc::new(FlowRunner::new(engine, sender, escalations, analytics));
    let webhook_state =
        WebhookState { runner, verify_token: config.whatsapp.verify_token.clone() };

    info!(event_name = "system.bootstrap.complete", "application bootstrap complete");
    Ok(Application { config, db_pool, webhook_state })
}
