use analytics_service::{
    build_report,
    config::{AppConfig, StoreKind},
    metrics_server, observability,
    sources::{load_csv_store, CsvPaths},
    DateRange, ReportRequest,
};
use anyhow::{anyhow, bail, Context, Result};
use metering_client::{InMemoryStore, MeteringStore, PgMeteringStore};
use sqlx::postgres::PgPoolOptions;
use std::env;
use time::{macros::format_description, Date};

fn parse_date(arg: &str) -> Result<Date> {
    Date::parse(arg, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date '{arg}', expected YYYY-MM-DD"))
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        bail!("usage: settlement-report <client_id> <start YYYY-MM-DD> <end YYYY-MM-DD> [plant]");
    }
    let request = ReportRequest {
        client_id: args[1].clone(),
        range: DateRange::new(parse_date(&args[2])?, parse_date(&args[3])?)?,
        plant: args.get(4).cloned(),
    };

    // Point ANALYTICS_CONFIG elsewhere to report from a different store.
    let cfg = AppConfig::load()?;
    let settings = cfg.validate()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store: Box<dyn MeteringStore> = match cfg.store.kind {
        StoreKind::Postgres => {
            let uri = cfg
                .store
                .uri
                .as_deref()
                .ok_or_else(|| anyhow!("store.uri is required"))?;
            let pool = PgPoolOptions::new()
                .max_connections(cfg.store.max_connections)
                .connect(uri)
                .await?;
            Box::new(PgMeteringStore::new(pool))
        }
        StoreKind::Csv => {
            let paths = CsvPaths {
                metering: cfg
                    .store
                    .metering_csv
                    .clone()
                    .ok_or_else(|| anyhow!("store.metering_csv is required"))?,
                settlement: cfg
                    .store
                    .settlement_csv
                    .clone()
                    .ok_or_else(|| anyhow!("store.settlement_csv is required"))?,
                plants: cfg.store.plants_csv.clone(),
            };
            let (store, load): (InMemoryStore, _) =
                tokio::task::spawn_blocking(move || load_csv_store(&paths)).await??;
            if load.malformed_rows > 0 {
                tracing::warn!(
                    malformed_rows = load.malformed_rows,
                    "CSV exports contain malformed rows; skipped rows are not reflected in report anomalies"
                );
            }
            Box::new(store)
        }
    };

    let report = build_report(store.as_ref(), &request, &settings).await?;
    tracing::info!(
        client_id = %report.client_id,
        policy = %report.selected_policy,
        malformed_rows = report.anomalies.malformed_rows,
        unrecognized_slots = report.anomalies.unrecognized_slots.len(),
        empty = report.is_empty(),
        "report complete"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
