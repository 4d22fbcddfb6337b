//! Reservation expiry sweeper for the Postgres ledger.
//!
//! Several sweepers may run against one database; each reservation is still
//! expired exactly once.

use std::sync::Arc;

use anyhow::{Context, bail};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use merchledger_core::{Clock, SystemClock};
use merchledger_events::TracingAuditSink;
use merchledger_infra::config::Settings;
use merchledger_infra::postgres::PostgresLedger;

fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    merchledger_observability::init(settings.log_format);

    let Some(database_url) = settings.database_url.clone() else {
        bail!("DATABASE_URL must be set");
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .context("failed to connect to postgres")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = PostgresLedger::new(pool, Arc::new(TracingAuditSink), clock.clone()).with_settings(&settings);
        ledger.migrate().await.context("failed to apply ledger schema")?;

        let interval = settings.sweep_interval();
        info!(interval_secs = interval.as_secs(), "sweeper started");
        loop {
            match ledger.expire_sweep(clock.now()).await {
                Ok(report) if report.failed > 0 => {
                    error!(failed = report.failed, "sweep finished with failures");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "sweep failed"),
            }
            tokio::time::sleep(interval).await;
        }
    })
}
