use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sound_ai::api::AnalysisService;
use sound_ai::config::{AppConfig, DEFAULT_CONFIG_PATH};
use sound_ai::http;

const DEFAULT_LOG_FILTER: &str = "sound_ai=info,tower_http=info";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sound_ai_server error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "sound_ai_server", about = "Audio analysis pipeline HTTP server")]
struct Cli {
    /// JSON configuration file; defaults apply when missing or invalid.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Listening port (overrides the config file and SOUND_AI_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Interface to bind (overrides the config file).
    #[arg(long)]
    host: Option<IpAddr>,
}

impl Cli {
    fn execute(self) -> Result<()> {
        let mut config = AppConfig::load_from_file(&self.config).with_env_overrides();
        if let Some(port) = self.port {
            config.server.port = port;
        }
        let host: IpAddr = match self.host {
            Some(host) => host,
            None => config
                .server
                .host
                .parse()
                .with_context(|| format!("parsing server host {:?}", config.server.host))?,
        };
        let addr = SocketAddr::new(host, config.server.port);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;

        runtime.block_on(async move {
            let listener = http::bind(addr).await?;
            let port = listener.local_addr().context("reading bound address")?.port();
            // The desktop client reads the port from the first stdout line
            println!("{}", serde_json::json!({ "port": port }));

            let service = Arc::new(AnalysisService::new(config));
            http::run_http_server(listener, service).await
        })
    }
}
