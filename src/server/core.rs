use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::admin::serve_admin;
use crate::config::ServerConfig;
use crate::error::RegistryServerError;
use crate::registry::{RealmRegistry, spawn_harvester};
use crate::session::RegistrationSession;

pub struct Server {
    registry: Arc<RealmRegistry>,
    listener: TcpListener,
    admin_listener: Option<TcpListener>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
}

impl Server {
    /// Binds the registration listener and, if configured, the admin listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, RegistryServerError> {
        config.validate()?;

        let socket = config.registration_socket();
        let listener = TcpListener::bind(&socket).await.map_err(|e| {
            error!("Failed to bind to {}: {}", socket, e);
            e
        })?;
        info!("Registration listener bound to {}", listener.local_addr()?);

        let admin_listener = match &config.admin_address {
            Some(addr) => {
                let admin = TcpListener::bind(addr).await.map_err(|e| {
                    error!("Failed to bind admin listener to {}: {}", addr, e);
                    e
                })?;
                info!("Admin listener bound to {}", admin.local_addr()?);
                Some(admin)
            }
            None => None,
        };

        Ok(Self::from_listeners(config, listener, admin_listener))
    }

    /// Builds a server around listeners that are already bound.
    pub fn from_listeners(
        config: ServerConfig,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
    ) -> Self {
        Self {
            registry: Arc::new(RealmRegistry::new()),
            listener,
            admin_listener,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    pub fn registry(&self) -> Arc<RealmRegistry> {
        Arc::clone(&self.registry)
    }

    /// Token that stops the server and everything it spawned.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serves until the shutdown token is cancelled, then waits for every
    /// session to close.
    pub async fn run(self) {
        let Server {
            registry,
            listener,
            admin_listener,
            config,
            shutdown,
        } = self;

        info!(
            "Starting realm registry on {} (max {} connections)",
            config.registration_socket(),
            config.max_connections
        );

        let harvester = spawn_harvester(Arc::clone(&registry), shutdown.clone());
        let admin = admin_listener.map(|admin_listener| {
            tokio::spawn(serve_admin(
                admin_listener,
                Arc::clone(&registry),
                shutdown.clone(),
            ))
        });

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        error!("Realm session task failed: {}", e);
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if sessions.len() >= config.max_connections {
                            warn!(
                                "Refusing {}: {} connections already open",
                                peer,
                                sessions.len()
                            );
                            continue;
                        }
                        info!("Accepted realm connection from {}", peer);
                        let session = RegistrationSession::new(
                            stream,
                            peer,
                            Arc::clone(&registry),
                            shutdown.child_token(),
                        );
                        sessions.spawn(session.run());
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
        }

        info!("Shutting down, closing {} realm connections", sessions.len());
        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                error!("Realm session task failed: {}", e);
            }
        }
        if let Err(e) = harvester.await {
            error!("Log harvester task failed: {}", e);
        }
        if let Some(admin) = admin {
            if let Err(e) = admin.await {
                error!("Admin listener task failed: {}", e);
            }
        }
        info!("Realm registry stopped");
    }
}
