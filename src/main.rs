use clap::Parser;
use ispw::services::config::ConfigOverrides;
use ispw::services::logger::LogLevel;

#[derive(Parser)]
#[command(name = "ispw-mcp")]
#[command(about = "ISPW REST API tools over MCP stdio", version)]
struct Args {
    /// Upstream base URL; overrides ISPW_BASE_URL and CES_HOST/CES_PORT
    #[arg(long)]
    base_url: Option<String>,

    /// SRID used when a call omits it; overrides ISPW_DEFAULT_SRID
    #[arg(long)]
    default_srid: Option<String>,

    /// Request timeout in seconds; overrides ISPW_TIMEOUT
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip TLS certificate verification for the upstream connection
    #[arg(long)]
    insecure_tls: bool,

    /// error, warn, info or debug; overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let log_level = match args.log_level.as_deref() {
        None => None,
        Some(raw) => match LogLevel::parse(raw) {
            Some(level) => Some(level),
            None => {
                eprintln!("ispw-mcp: unknown log level '{}'", raw);
                std::process::exit(2);
            }
        },
    };
    let overrides = ConfigOverrides {
        base_url: args.base_url,
        default_srid: args.default_srid,
        timeout_secs: args.timeout_secs,
        insecure_tls: args.insecure_tls,
    };
    if let Err(err) = ispw::mcp::server::run_stdio(overrides, log_level).await {
        eprintln!("ispw-mcp: {}", err);
        std::process::exit(1);
    }
}
