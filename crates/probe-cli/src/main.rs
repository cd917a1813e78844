use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use opentelemetry_otlp::WithExportConfig;
use probe_common::config::ProbeConfig;
use probe_core::{CompletionRequest, CompletionResult, Mode, ParallelDispatcher, RequestRunner, RunSummary};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "probe", version, about = "Send completion requests to a llama.cpp server and report latency")]
struct Cli {
    /// Server base URL
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
    /// Print the completion as it is generated
    #[arg(long)]
    stream: bool,
    /// Number of parallel requests (0 for a single request)
    #[arg(long, default_value_t = 0)]
    parallel: usize,
    #[arg(short = 'n', long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,
}

impl Cli {
    fn apply(&self, mut cfg: ProbeConfig) -> ProbeConfig {
        if let Some(url) = &self.url { cfg.base_url = url.clone(); }
        if let Some(prompt) = &self.prompt { cfg.prompt = prompt.clone(); }
        if let Some(v) = self.max_tokens { cfg.max_tokens = v; }
        if let Some(v) = self.temperature { cfg.temperature = v; }
        if let Some(v) = self.timeout_secs { cfg.timeout_secs = Some(v); }
        cfg
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let otel = init_tracing();

    let cli = Cli::parse();
    let cfg = cli.apply(ProbeConfig::load());
    let runner = RequestRunner::new(cfg.timeout_secs.map(Duration::from_secs)).context("building HTTP client")?;
    probe_obs::init();
    tracing::debug!(target: "probe", url = %cfg.base_url, "probe starting");

    let all_ok = match Mode::from_flags(cli.stream, cli.parallel) {
        Mode::Single { stream } => single(&runner, &cfg, stream).await,
        Mode::Parallel(count) => burst(runner, &cfg, count).await,
    };

    if cli.metrics {
        print!("{}", probe_obs::render());
    }
    if otel {
        opentelemetry::global::shutdown_tracer_provider();
    }
    Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn single(runner: &RequestRunner, cfg: &ProbeConfig, stream: bool) -> bool {
    let request = CompletionRequest::new(cfg.prompt.clone(), cfg.max_tokens, cfg.temperature, stream);
    let mut stdout = std::io::stdout();
    let result = runner
        .execute_with(&cfg.base_url, &request, |fragment| {
            let _ = write!(stdout, "{}", fragment);
            let _ = stdout.flush();
        })
        .await;
    if stream {
        println!();
    } else if result.succeeded() {
        println!("{}", result.text);
    }
    report(&result);
    result.succeeded()
}

async fn burst(runner: RequestRunner, cfg: &ProbeConfig, count: usize) -> bool {
    println!("Running {} parallel requests...", count);
    let dispatcher = ParallelDispatcher::new(runner);
    let start = Instant::now();
    let results = dispatcher.run(&cfg.base_url, &cfg.prompt, count).await;
    let wall = start.elapsed();
    for r in &results {
        println!("--- Request {} ---", r.index);
        if r.result.succeeded() {
            println!("{}", r.result.text);
        }
        report(&r.result);
    }
    let summary = RunSummary::from_results(results.iter().map(|r| &r.result), wall);
    println!("\n{}", summary);
    summary.failed == 0
}

fn report(result: &CompletionResult) {
    match result.error_detail() {
        None => println!("\nRequest completed in {:.2} seconds", result.elapsed_seconds()),
        Some(detail) => eprintln!("Request failed after {:.2} seconds: {}", result.elapsed_seconds(), detail),
    }
}

/// Returns true when an OTLP exporter was installed and needs flushing on exit.
fn init_tracing() -> bool {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .install_simple()
            .ok();
        if let Some(tracer) = tracer {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(OpenTelemetryLayer::new(tracer))
                .init();
            return true;
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    false
}
