use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pointpay_core::cli::{self, Cli, Commands, DbCommands, PaymentCommands, PayoutCommands};
use pointpay_core::config::{Config, EngineConfig};
use pointpay_core::services::{run_scheduler, JobSchedules};
use pointpay_core::{build_state, create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    // Commands that don't need the full service graph
    match &command {
        Commands::Config => return cli::handle_config_validate(&config),
        Commands::Db(DbCommands::Migrate) => return cli::handle_db_migrate(&config).await,
        _ => {}
    }

    let engine_config = EngineConfig::from_env()?;

    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let state = build_state(pool, &config, engine_config);

    match command {
        Commands::Serve => {
            let schedules = JobSchedules {
                monthly_close: config.close_schedule.clone(),
                due_payouts: config.due_payout_schedule.clone(),
                pending_captures: config.capture_schedule.clone(),
            };
            tokio::spawn(run_scheduler(
                state.payout_engine.clone(),
                state.automatic_payments.clone(),
                schedules,
            ));

            let app = create_app(state);

            let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
            tracing::info!("listening on {}", addr);

            let listener = TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Payout(PayoutCommands::CloseMonth { month }) => {
            cli::handle_payout_close_month(&state, month.as_deref()).await?;
        }
        Commands::Payout(PayoutCommands::RunDue) => {
            cli::handle_payout_run_due(&state).await?;
        }
        Commands::Payout(PayoutCommands::Retry { payout_id }) => {
            cli::handle_payout_retry(&state, payout_id).await?;
        }
        Commands::Payout(PayoutCommands::Cancel { payout_id }) => {
            cli::handle_payout_cancel(&state, payout_id).await?;
        }
        Commands::Payments(PaymentCommands::CaptureSweep) => {
            cli::handle_capture_sweep(&state).await?;
        }
        Commands::Db(_) | Commands::Config => unreachable!("handled above"),
    }

    Ok(())
}
