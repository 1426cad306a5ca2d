use std::path::Path;

use imgproc_media::{check_tool, check_tools};
use imgproc_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tools(&config)?;
    ensure_env_present(&["REDIS_URL"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    Ok(())
}

fn ensure_tools(config: &WorkerConfig) -> anyhow::Result<()> {
    let found = check_tools().map_err(|e| anyhow::anyhow!("{}", e))?;
    for path in found {
        println!("worker-selfcheck: found {}", path.display());
    }
    for codec in [&config.av1_encoder, &config.av1_decoder] {
        if check_tool(codec).is_err() {
            println!("worker-selfcheck: note: {codec} is not on PATH, avifenc/avifdump may embed it");
        }
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
