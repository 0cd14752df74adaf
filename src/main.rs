use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so report output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("carelog_lib=warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = carelog_lib::cli::run_cli().await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
