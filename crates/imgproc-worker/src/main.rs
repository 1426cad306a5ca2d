//! Image conversion worker binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use imgproc_queue::{QueueConfig, QueueTransport, RedisQueue};
use imgproc_worker::{
    build_job, init_tracing, metrics, ExecutionEnv, JobExecutor, Task, WorkerConfig,
};

/// Convert images from the job queue, or a single local file.
#[derive(Debug, Parser)]
#[command(name = "imgproc-worker", version)]
struct Cli {
    /// Raw input file; enables one-shot mode together with --output
    #[arg(long)]
    input: Option<PathBuf>,

    /// Folder receiving the converted files
    #[arg(long)]
    output: Option<PathBuf>,

    /// Target aspect ratio as X:Y
    #[arg(long, default_value = "3:1")]
    aspect_ratio: String,

    /// Output size as name:width:height (repeatable)
    #[arg(long = "size", alias = "sizes", value_delimiter = ',')]
    sizes: Vec<String>,
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS connections)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();

    let code = match (cli.input.clone(), cli.output.clone()) {
        (Some(input), Some(output)) => run_oneshot(config, input, output, &cli).await,
        (None, None) => run_listener(config).await,
        _ => {
            error!("--input and --output must be given together");
            2
        }
    };
    std::process::exit(code);
}

async fn run_oneshot(config: WorkerConfig, input: PathBuf, output: PathBuf, cli: &Cli) -> i32 {
    let job = match build_job(&input, &output, &cli.aspect_ratio, &cli.sizes) {
        Ok(job) => job,
        Err(e) => {
            error!("{}", e);
            return 2;
        }
    };
    let env = match ExecutionEnv::from_config(config) {
        Ok(env) => env,
        Err(e) => {
            error!("Failed to set up worker: {}", e);
            return 1;
        }
    };

    let task = Task::new(job, &CancellationToken::new(), None);
    let events = task.events();
    task.start(env);

    let stopper = task.clone();
    let signals = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping task");
        stopper.stop();
    });

    if let Some(mut events) = events {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    }
    task.done().await;
    signals.abort();

    if let Some(err) = task.failed() {
        error!("Conversion failed: {}", err);
        return 1;
    }
    match serde_json::to_string_pretty(&task.files()) {
        Ok(files) => println!("{files}"),
        Err(e) => warn!("Failed to encode files: {}", e),
    }
    0
}

async fn run_listener(config: WorkerConfig) -> i32 {
    info!("Starting imgproc-worker");
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = metrics::init_metrics(port) {
            error!("Failed to start metrics exporter: {}", e);
            return 1;
        }
    }

    let queue_config = QueueConfig::from_env().with_claim_idle_at_least(config.max_delivery_hold());
    let queue: Arc<dyn QueueTransport> = match RedisQueue::connect(queue_config).await {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to connect to job queue: {}", e);
            return 1;
        }
    };

    let grace = config.shutdown_timeout;
    let env = match ExecutionEnv::from_config(config) {
        Ok(env) => env,
        Err(e) => {
            error!("Failed to create execution environment: {}", e);
            return 1;
        }
    };

    let executor = Arc::new(JobExecutor::new(env, queue));
    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };
    tokio::pin!(runner);

    tokio::select! {
        finished = &mut runner => return exit_code(finished),
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            executor.shutdown();
        }
    }

    tokio::select! {
        finished = &mut runner => {
            let code = exit_code(finished);
            info!("Worker shutdown complete");
            code
        }
        _ = shutdown_signal() => {
            error!("Received second shutdown signal, forcing exit");
            1
        }
        _ = tokio::time::sleep(grace + Duration::from_secs(5)) => {
            error!("Shutdown grace period expired, forcing exit");
            1
        }
    }
}

fn exit_code(
    finished: Result<imgproc_worker::WorkerResult<()>, tokio::task::JoinError>,
) -> i32 {
    match finished {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!("Executor error: {}", e);
            1
        }
        Err(e) => {
            error!("Executor crashed: {}", e);
            1
        }
    }
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
