use std::process;

use conduit::config::Config;
use error_chain::ChainedError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[rocket::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("{}", e.display_chain());
            process::exit(1);
        }
    };
    init_logging();

    let app = match conduit::rocket(config) {
        Ok(app) => app,
        Err(e) => {
            error!("failed to start: {}", e.display_chain());
            process::exit(1);
        }
    };

    match app.launch().await {
        Ok(_) => info!("shut down"),
        Err(e) => {
            error!("server error: {}", e);
            process::exit(1);
        }
    }
}
