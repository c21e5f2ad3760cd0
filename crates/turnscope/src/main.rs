mod output;
mod server;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use turnscope_core::config::Config;
use turnscope_core::ids::TraceKey;
use turnscope_core::query::{FlatSpansResponse, SpanCount, TurnsResponse};
use turnscope_feed::{DuckDbSource, HttpSource, SessionController, SpanSource};
use turnscope_store::CollectorDb;

use crate::output::{
    print_count_human, print_flat_spans_human, print_span_human, print_traces_human,
    print_turns_human,
};
use crate::telemetry::{init_cli_tracing, init_serve_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "turnscope")]
#[command(about = "Rebuild voice-agent session traces into span trees and conversation turns")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Collector DuckDB file")]
    db_path: Option<PathBuf>,

    #[arg(long, global = true, help = "Base URL of a remote collector or turnscope serve")]
    remote: Option<String>,

    #[arg(long, global = true)]
    page_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Group a trace into conversation turns")]
    Turns {
        trace_key: String,
        #[arg(long, help = "Load pages on the autoload timer and report progress")]
        follow: bool,
    },
    #[command(about = "Print the reconstructed span tree in display order")]
    Spans {
        trace_key: String,
        #[arg(long, help = "Load pages on the autoload timer and report progress")]
        follow: bool,
    },
    #[command(about = "Inspect one span of a trace")]
    Span { trace_key: String, span_id: String },
    #[command(about = "Span count reported by the source")]
    Count { trace_key: String },
    #[command(about = "List traces in the collector database")]
    Traces {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    #[command(about = "Serve pages, turns and flattened spans over HTTP")]
    Serve {
        #[arg(long)]
        http_addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = cli.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = cli.remote {
        cfg.remote_url = Some(v);
    }
    if let Some(v) = cli.page_size {
        anyhow::ensure!(v > 0, "--page-size must be at least 1");
        cfg.page_size = v;
    }

    match cli.command {
        Commands::Serve { http_addr } => {
            if let Some(v) = http_addr {
                cfg.query_http_addr = v;
            }
            run_server(cfg).await
        }
        Commands::Turns { trace_key, follow } => {
            init_cli_tracing();
            let key = TraceKey::parse(&trace_key)?;
            let session = load_session(&cfg, key, follow).await?;
            let view = session.view();
            if cli.json {
                print_json(&TurnsResponse {
                    trace_key,
                    turns: view.turns.clone(),
                    stats: view.stats.clone(),
                })
            } else {
                print_turns_human(&trace_key, &view, &session.status());
                Ok(())
            }
        }
        Commands::Spans { trace_key, follow } => {
            init_cli_tracing();
            let key = TraceKey::parse(&trace_key)?;
            let session = load_session(&cfg, key, follow).await?;
            let view = session.view();
            if cli.json {
                print_json(&FlatSpansResponse {
                    trace_key,
                    spans: view.flat_spans.clone(),
                    stats: view.stats.clone(),
                })
            } else {
                print_flat_spans_human(&trace_key, &view, &session.status());
                Ok(())
            }
        }
        Commands::Span { trace_key, span_id } => {
            init_cli_tracing();
            let key = TraceKey::parse(&trace_key)?;
            let session = load_session(&cfg, key, false).await?;
            let Some(span) = session.select_span(&span_id) else {
                anyhow::bail!("span {span_id} not found in trace {trace_key}");
            };
            if cli.json {
                print_json(&span)
            } else {
                print_span_human(&span);
                Ok(())
            }
        }
        Commands::Count { trace_key } => {
            init_cli_tracing();
            let key = TraceKey::parse(&trace_key)?;
            let source = open_source(&cfg)?;
            let count = source.fetch_span_count(&key).await?;
            if cli.json {
                print_json(&SpanCount { count })
            } else {
                print_count_human(&trace_key, count);
                Ok(())
            }
        }
        Commands::Traces { limit } => {
            init_cli_tracing();
            let db = CollectorDb::open(&cfg.db_path)
                .with_context(|| format!("open collector db {}", cfg.db_path.display()))?;
            let items = tokio::task::spawn_blocking(move || db.list_traces(limit)).await??;
            if cli.json {
                print_json(&items)
            } else {
                print_traces_human(&items);
                Ok(())
            }
        }
    }
}

fn open_source(cfg: &Config) -> anyhow::Result<Arc<dyn SpanSource>> {
    if let Some(url) = &cfg.remote_url {
        tracing::debug!(url = %url, "reading spans over http");
        return Ok(Arc::new(HttpSource::new(url, cfg.request_timeout)?));
    }
    let source = DuckDbSource::open(&cfg.db_path)
        .with_context(|| format!("open collector db {}", cfg.db_path.display()))?;
    Ok(Arc::new(source))
}

async fn load_session(
    cfg: &Config,
    key: TraceKey,
    follow: bool,
) -> anyhow::Result<SessionController> {
    let session = SessionController::new(open_source(cfg)?, cfg.page_size);
    session.open(key.clone());
    if let Err(err) = session.refresh_count().await {
        tracing::debug!(error = %err, "span count unavailable");
    }

    if follow {
        let autoload = session.spawn_autoload(cfg.autoload_interval);
        while !autoload.is_finished() {
            tokio::time::sleep(cfg.autoload_interval).await;
            let status = session.status();
            match status.total_hint {
                Some(total) => eprintln!("loaded {}/{total} spans", status.loaded),
                None => eprintln!("loaded {} spans", status.loaded),
            }
        }
        autoload
            .await
            .context("autoload task failed")?
            .with_context(|| format!("autoload spans for trace {key}"))?;
    }

    session
        .load_all()
        .await
        .with_context(|| format!("load spans for trace {key}"))?;
    Ok(session)
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    init_serve_tracing();
    let source = DuckDbSource::open(&cfg.db_path)
        .with_context(|| format!("open collector db {}", cfg.db_path.display()))?;
    let addr = cfg
        .query_http_addr
        .parse()
        .with_context(|| format!("invalid query http addr {}", cfg.query_http_addr))?;

    eprintln!("turnscope serve");
    eprintln!("  db: {}", cfg.db_path.display());
    eprintln!("  query http: {}", cfg.query_http_addr);
    eprintln!("  page size: {}", cfg.page_size);

    let server_task = tokio::spawn(server::run_query_http_server(source, cfg.page_size, addr));

    tokio::select! {
        res = server_task => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    shutdown_tracing();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
