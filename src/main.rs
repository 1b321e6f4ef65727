use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use sandbox_exec::{
    CapabilityConfig, ExecutionRequest, ExecutionResult, NetworkPolicy, Sandbox, SandboxConfig,
};

const DEFAULT_MAX_PARALLEL: usize = 4;

const USAGE: &str = "usage: sandbox-exec <code> | sandbox-exec - | sandbox-exec --batch";

/// One line of batch input
#[derive(Debug, Deserialize)]
struct BatchJob {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(flatten)]
    request: ExecutionRequest,
}

/// One line of batch output
#[derive(Debug, Serialize)]
struct BatchResult {
    id: serde_json::Value,
    /// 1-based input line number
    line: usize,
    #[serde(flatten)]
    result: ExecutionResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sandbox_exec=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = match std::env::var("SANDBOX_CONFIG") {
        Ok(path) => SandboxConfig::from_toml_file(&path)
            .with_context(|| format!("Failed to load sandbox config from {}", path))?,
        Err(_) => SandboxConfig::from_env().context("Invalid sandbox environment")?,
    };
    info!(
        "Sandbox config: launcher={}, entry_script={}, timeout={:?}",
        config.launcher,
        config.entry_script.display(),
        config.timeout
    );
    let sandbox = Sandbox::new(config).context("Invalid sandbox configuration")?;

    let arg = std::env::args().nth(1);
    let all_succeeded = match arg.as_deref() {
        Some("--batch") => {
            let max_parallel = max_parallel_from_env()?;
            run_batch(
                Arc::new(sandbox),
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                max_parallel,
            )
            .await?
        }
        Some("-") => {
            let mut code = String::new();
            tokio::io::stdin()
                .read_to_string(&mut code)
                .await
                .context("Failed to read code from stdin")?;
            let request = ExecutionRequest::new(code).with_capabilities(capabilities_from_env()?);
            run_single(&sandbox, &request, tokio::io::stdout()).await?
        }
        Some(code) => {
            let request = ExecutionRequest::new(code).with_capabilities(capabilities_from_env()?);
            run_single(&sandbox, &request, tokio::io::stdout()).await?
        }
        None => anyhow::bail!(USAGE),
    };

    if !all_succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// Execute one request and write its result as a single JSON line
async fn run_single<W>(
    sandbox: &Sandbox,
    request: &ExecutionRequest,
    mut output: W,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    info!("Capabilities: {:?}", request.capabilities);

    let result = sandbox.execute(request).await;
    write_json_line(&mut output, &result).await?;
    Ok(result.success)
}

/// Run JSON-lines jobs concurrently, writing each result as it completes
///
/// Returns whether every job succeeded. Malformed lines become failed results
/// and never stop the batch.
async fn run_batch<I, W>(
    sandbox: Arc<Sandbox>,
    input: I,
    output: W,
    max_parallel: usize,
) -> Result<bool>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!("Batch mode, up to {} parallel executions", max_parallel);

    let permits = Arc::new(Semaphore::new(max_parallel));
    let (tx, mut rx) = mpsc::unbounded_channel::<BatchResult>();

    let printer = tokio::spawn(async move {
        let mut output = output;
        let mut all_succeeded = true;
        while let Some(result) = rx.recv().await {
            all_succeeded &= result.result.success;
            write_json_line(&mut output, &result)
                .await
                .with_context(|| format!("Failed to write result for line {}", result.line))?;
        }
        Ok::<_, anyhow::Error>(all_succeeded)
    });

    let mut lines = input.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read job")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let job = match serde_json::from_str::<BatchJob>(&line) {
            Ok(job) => job,
            Err(e) => {
                warn!("Failed to parse job on line {}: {}", line_no, e);
                let _ = tx.send(BatchResult {
                    id: serde_json::Value::Null,
                    line: line_no,
                    result: ExecutionResult::failure(format!("invalid job: {}", e)),
                });
                continue;
            }
        };

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .context("Job semaphore closed")?;
        let sandbox = sandbox.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = sandbox.execute(&job.request).await;
            drop(permit);
            let _ = tx.send(BatchResult {
                id: job.id,
                line: line_no,
                result,
            });
        });
    }

    // Printer finishes once every job has dropped its sender
    drop(tx);
    let all_succeeded = printer.await.context("Result printer panicked")??;
    info!("Batch complete: {} lines read", line_no);
    Ok(all_succeeded)
}

async fn write_json_line<W, T>(output: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}

/// Batch parallelism from `SANDBOX_MAX_PARALLEL` (default 4)
fn max_parallel_from_env() -> Result<usize> {
    match std::env::var("SANDBOX_MAX_PARALLEL") {
        Ok(value) => parse_max_parallel(&value),
        Err(_) => Ok(DEFAULT_MAX_PARALLEL),
    }
}

fn parse_max_parallel(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .with_context(|| format!("Invalid SANDBOX_MAX_PARALLEL: {:?}", value))
}

/// Capabilities for single-shot mode from `SANDBOX_ALLOW_NET`, `SANDBOX_ALLOW_READ`, `SANDBOX_ALLOW_ENV`
fn capabilities_from_env() -> Result<CapabilityConfig> {
    let mut caps = CapabilityConfig::default();
    if let Ok(value) = std::env::var("SANDBOX_ALLOW_NET") {
        caps.network = parse_network(&value);
    }
    if let Ok(value) = std::env::var("SANDBOX_ALLOW_READ") {
        caps.file_read = parse_bool("SANDBOX_ALLOW_READ", &value)?;
    }
    if let Ok(value) = std::env::var("SANDBOX_ALLOW_ENV") {
        caps.env_access = parse_bool("SANDBOX_ALLOW_ENV", &value)?;
    }
    Ok(caps)
}

/// `true`, `false`, or a comma-separated host list
fn parse_network(value: &str) -> NetworkPolicy {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "all" => NetworkPolicy::AllAllowed,
        "false" | "0" | "none" => NetworkPolicy::Denied,
        _ => NetworkPolicy::allow_list(
            value
                .split(',')
                .map(str::trim)
                .filter(|host| !host.is_empty()),
        ),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("Invalid value for {}: {:?}", name, other),
    }
}
