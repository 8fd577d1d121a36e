use clap::Parser;
use declarest::render::{plain_text, text_renderer, TEXT_PLAIN};
use declarest::server::{AppService, HttpServer};
use declarest::telemetry::{self, LogConfig, LogFormat};
use declarest::{Bind, Endpoint, Engine, EngineConfig, RequestContext, Router, RuntimeConfig};
use http::Method;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Demo server with a single `GET /hello/{id}` endpoint.
#[derive(Parser)]
#[command(name = "declarest", version, about = "declarest demo server", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "DECLAREST_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,

    /// YAML engine configuration; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Human-readable logs instead of JSON
    #[arg(long, default_value_t = false)]
    pretty_logs: bool,
}

#[derive(Debug, Default, Bind)]
struct Hello {
    #[bind(path = "id", required)]
    id: u64,
    #[bind(query)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct Greeting {
    greeting: String,
}

fn hello(_ctx: &RequestContext, input: Hello) -> anyhow::Result<Greeting> {
    let name = input.name.as_deref().unwrap_or("stranger");
    Ok(Greeting {
        greeting: format!("hello {name} (#{})", input.id),
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.pretty_logs {
        log_config.format = LogFormat::Pretty;
    }
    telemetry::init_logging(&log_config)?;

    RuntimeConfig::from_env().apply();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env(),
    };
    let engine = Engine::new(config);

    let mut router = Router::new();
    engine.mount(
        &mut router,
        Endpoint::new(Method::GET, "/hello/{id}", hello)
            .renderer(TEXT_PLAIN, text_renderer(plain_text)),
    )?;

    let service = AppService::new(router, &engine);
    let handle = HttpServer(service).start(cli.addr.as_str())?;
    handle.wait_ready()?;
    info!(addr = %handle.addr(), "declarest demo ready");

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        if let Some(signal) = signals.forever().next() {
            info!(signal, "shutting down");
        }
        handle.stop();
        Ok(())
    }

    #[cfg(not(unix))]
    {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("server coroutine panicked"))
    }
}
