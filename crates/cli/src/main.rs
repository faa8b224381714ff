use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use invoice_anchor_chain::{ChainClient, ChainClientConfig};
use invoice_anchor_common::{sh_eprintln, sh_println};
use invoice_anchor_config::Config;
use invoice_anchor_db::Repository;
use invoice_anchor_ipfs::{IpfsClient, IpfsClientConfig};
use invoice_anchor_kernel::{
    BatchJobConfig, CreateBatchJob, JobRunner, PipelineJob, PollerConfig, SubmitJobConfig,
    SubmitToBlockchainJob, UploadJobConfig, UploadToIpfsJob,
};

#[derive(Parser)]
#[command(name = "invoice-anchor", about = "Invoice anchoring pipeline worker")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs every job on its cron schedule until interrupted. Default.
    Run,
    /// Runs the IPFS upload job once, out of band.
    TriggerUpload {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Runs the batch-creation job once, out of band.
    TriggerBatch {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Runs the blockchain submission job (and confirmation poller) once, out of band.
    TriggerSubmit {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Verifies a single invoice against its anchored batch.
    VerifyInvoice { invoice_id: Uuid },
    /// Prints per-status invoice and batch counts.
    Stats,
}

struct Components {
    repo: Repository,
    ipfs: Arc<IpfsClient>,
    chain: Arc<ChainClient>,
}

async fn build_components(config: &Config) -> anyhow::Result<Components> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.database_url)
        .await
        .context("connecting to the business database")?;
    let repo = Repository::new(pool);
    repo.migrate().await.context("running database migrations")?;

    let ipfs = Arc::new(IpfsClient::new(IpfsClientConfig {
        pin_base_url: config.ipfs.pin_base_url.clone(),
        gateway_base_url: config.ipfs.gateway_base_url.clone(),
        rate_per_minute: config.ipfs.rate_per_minute,
        max_retries: config.ipfs.max_retries,
        base_delay: config.ipfs.base_delay(),
        request_timeout: config.ipfs.request_timeout(),
    }));

    let contract_address = config
        .chain
        .contract_address
        .parse()
        .context("parsing chain contract address")?;
    let chain = Arc::new(
        ChainClient::new(ChainClientConfig {
            rpc_url: config.chain.rpc_url.clone(),
            contract_address,
            private_key: config.chain.private_key.clone(),
            gas_headroom_percent: config.chain.gas_headroom_percent,
            max_gas_price: config.chain.max_gas_price_wei,
            max_retries: config.chain.max_retries,
            base_delay: config.chain.base_delay(),
        })
        .context("constructing chain client")?,
    );

    Ok(Components { repo, ipfs, chain })
}

fn upload_job(components: &Components, config: &Config) -> UploadToIpfsJob {
    UploadToIpfsJob::new(
        components.repo.clone(),
        components.ipfs.clone(),
        UploadJobConfig {
            max_invoices_per_run: config.jobs.upload_max_invoices_per_run,
            concurrent_uploads: config.jobs.upload_concurrent_uploads,
        },
    )
}

fn batch_job(components: &Components, config: &Config) -> CreateBatchJob {
    CreateBatchJob::new(
        components.repo.clone(),
        components.ipfs.clone(),
        BatchJobConfig {
            batch_size: config.jobs.batch_size,
            batches_per_run: config.jobs.batches_per_run,
        },
    )
}

fn submit_job(components: &Components, config: &Config) -> SubmitToBlockchainJob {
    SubmitToBlockchainJob::new(
        components.repo.clone(),
        components.chain.clone(),
        SubmitJobConfig {
            poller: PollerConfig {
                confirmation_blocks: config.jobs.confirmation_blocks,
                timeout: config.jobs.confirmation_timeout(),
            },
        },
    )
}

async fn run(config: Config) -> anyhow::Result<()> {
    let components = build_components(&config).await?;

    let (cancel_tx, cancel_rx) = invoice_anchor_kernel::cancel_channel();

    let upload_runner = JobRunner::new(
        Arc::new(upload_job(&components, &config)) as Arc<dyn PipelineJob>,
        &config.jobs.upload_cron,
        cancel_rx.clone(),
    )
    .context("parsing upload cron expression")?;
    let batch_runner = JobRunner::new(
        Arc::new(batch_job(&components, &config)) as Arc<dyn PipelineJob>,
        &config.jobs.batch_cron,
        cancel_rx.clone(),
    )
    .context("parsing batch cron expression")?;
    let submit_runner = JobRunner::new(
        Arc::new(submit_job(&components, &config)) as Arc<dyn PipelineJob>,
        &config.jobs.submit_cron,
        cancel_rx.clone(),
    )
    .context("parsing submit cron expression")?;

    let upload_task = tokio::spawn(upload_runner.run());
    let batch_task = tokio::spawn(batch_runner.run());
    let submit_task = tokio::spawn(submit_runner.run());

    sh_println!("invoice-anchor running, press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, stopping job runners");
        }
    }

    let _ = cancel_tx.send(true);
    for task in [upload_task, batch_task, submit_task] {
        let _ = task.await;
    }

    Ok(())
}

async fn trigger_once(
    components: &Components,
    config: &Config,
    job: &str,
    force: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let (_cancel_tx, cancel_rx) = invoice_anchor_kernel::cancel_channel();
    let report = match job {
        "upload" => upload_job(components, config).execute(force, dry_run, cancel_rx).await,
        "batch" => batch_job(components, config).execute(force, dry_run, cancel_rx).await,
        "submit" => submit_job(components, config).execute(force, dry_run, cancel_rx).await,
        other => anyhow::bail!("unknown job {other}"),
    };

    sh_println!(
        "{job}: {} succeeded, {} failed, {} skipped",
        report.success_count,
        report.failure_count,
        report.skipped_count
    );
    for error in &report.errors {
        sh_eprintln!("  error: {error}");
    }
    if report.failure_count > 0 {
        anyhow::bail!("{job} run completed with {} failure(s)", report.failure_count);
    }
    Ok(())
}

async fn verify_invoice(components: &Components, invoice_id: Uuid) -> anyhow::Result<()> {
    let result = invoice_anchor_kernel::verify_invoice(
        &components.repo,
        &components.chain,
        &components.ipfs,
        invoice_id,
    )
    .await
    .context("verifying invoice")?;

    let rendered = serde_json::to_string_pretty(&result)?;
    sh_println!("{rendered}");
    Ok(())
}

async fn stats(components: &Components) -> anyhow::Result<()> {
    let stats = components
        .repo
        .get_pipeline_stats()
        .await
        .context("reading pipeline stats")?;
    sh_println!("{stats:#?}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    invoice_anchor_common::logging::init_tracing("invoice_anchor=info,invoice_anchor_kernel=info");

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    match command {
        Command::Run => run(cli.config).await,
        Command::TriggerUpload { force, dry_run } => {
            let components = build_components(&cli.config).await?;
            trigger_once(&components, &cli.config, "upload", force, dry_run).await
        }
        Command::TriggerBatch { force, dry_run } => {
            let components = build_components(&cli.config).await?;
            trigger_once(&components, &cli.config, "batch", force, dry_run).await
        }
        Command::TriggerSubmit { force, dry_run } => {
            let components = build_components(&cli.config).await?;
            trigger_once(&components, &cli.config, "submit", force, dry_run).await
        }
        Command::VerifyInvoice { invoice_id } => {
            let components = build_components(&cli.config).await?;
            verify_invoice(&components, invoice_id).await
        }
        Command::Stats => {
            let components = build_components(&cli.config).await?;
            stats(&components).await
        }
    }
}
