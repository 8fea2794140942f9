//! Realm Registry - Entry Point
//!
//! Accepts realm server registrations and streams realm events to the admin
//! session.

use log::{error, info};

use realm_registry::Server;
use realm_registry::config::ServerConfig;
use realm_registry::error::handlers::handle_error;
use realm_registry::utils::logging::setup_logging;

#[tokio::main]
async fn main() {
    setup_logging();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Launching realm registry...");

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            handle_error(&e);
            std::process::exit(1);
        }
    };

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await;
}
