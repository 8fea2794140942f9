//! Local admin listener.
//!
//! Each accepted connection is taken as an Administrator login and upgraded
//! through `AdminChannel`. Admitted connections receive fan-out frames until
//! they disconnect; the rest are closed immediately.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::admin::channel::AdminChannel;
use crate::realm::AccessLevel;
use crate::registry::{AdminSink, RealmRegistry};

/// Frames queued for a slow admin before further events are dropped.
pub const ADMIN_QUEUE_DEPTH: usize = 256;

/// Accepts admin connections until `shutdown` is cancelled.
pub async fn serve_admin(
    listener: TcpListener,
    registry: Arc<RealmRegistry>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Admin listener stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Admin connection from {}", peer);
                    let registry = Arc::clone(&registry);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_admin_connection(stream, peer, registry, shutdown).await;
                    });
                }
                Err(e) => error!("Error accepting admin connection: {}", e),
            },
        }
    }
}

async fn handle_admin_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<RealmRegistry>,
    shutdown: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(ADMIN_QUEUE_DEPTH);
    let sink: Arc<dyn AdminSink> = Arc::new(tx);
    let mut channel = AdminChannel::new(peer, sink);

    if let Err(e) = channel.request_admin_upgrade(AccessLevel::Administrator, &registry) {
        warn!("Closing admin connection from {}: {}", peer, e);
        return;
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut discard = [0u8; 256];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    debug!("Admin session for {} was evicted", peer);
                    break;
                };
                if let Err(e) = writer.write_all(&frame).await {
                    error!("Failed to write to admin {}: {}", peer, e);
                    break;
                }
            }
            read = reader.read(&mut discard) => match read {
                Ok(0) => {
                    info!("Admin {} disconnected", peer);
                    break;
                }
                Ok(n) => debug!("Ignoring {} bytes from admin {}", n, peer),
                Err(e) => {
                    error!("Failed to read from admin {}: {}", peer, e);
                    break;
                }
            },
        }
    }

    channel.close();
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of admin {} failed: {}", peer, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::envelope::ADMIN_HEADER_LEN;
    use crate::protocol::messages::{decode_realm_added, decode_realm_list};
    use crate::protocol::opcodes::AdminOpcode;
    use crate::realm::RealmRecord;
    use crate::realm::record::tests::request;
    use std::sync::Weak;
    use std::time::Duration;

    async fn read_frame(stream: &mut TcpStream) -> Option<(AdminOpcode, Vec<u8>)> {
        let mut header = [0u8; ADMIN_HEADER_LEN];
        stream.read_exact(&mut header).await.ok()?;
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.ok()?;
        Some((AdminOpcode::try_from(header[0]).ok()?, payload))
    }

    async fn start() -> (SocketAddr, Arc<RealmRegistry>, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(RealmRegistry::new());
        let shutdown = CancellationToken::new();
        tokio::spawn(serve_admin(listener, Arc::clone(&registry), shutdown.clone()));
        (addr, registry, shutdown)
    }

    async fn wait_for_slot(registry: &RealmRegistry, occupied: bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.admin_session_id().is_some() != occupied {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_admin_receives_list_then_events() {
        let (addr, registry, shutdown) = start().await;
        registry
            .add_or_update(RealmRecord::from_registration(request(1), "a".into(), Weak::new()))
            .unwrap();

        let mut admin = TcpStream::connect(addr).await.unwrap();
        let (opcode, payload) = read_frame(&mut admin).await.unwrap();
        assert_eq!(opcode, AdminOpcode::RealmList);
        let listed = decode_realm_list(&payload).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 1);

        registry
            .add_or_update(RealmRecord::from_registration(request(2), "b".into(), Weak::new()))
            .unwrap();
        let (opcode, payload) = read_frame(&mut admin).await.unwrap();
        assert_eq!(opcode, AdminOpcode::RealmAdded);
        assert_eq!(decode_realm_added(&payload).unwrap().id, 2);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_second_admin_is_turned_away() {
        let (addr, registry, shutdown) = start().await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert_eq!(read_frame(&mut first).await.unwrap().0, AdminOpcode::RealmList);

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert!(read_frame(&mut second).await.is_none());

        drop(first);
        wait_for_slot(&registry, false).await;

        let mut third = TcpStream::connect(addr).await.unwrap();
        assert_eq!(read_frame(&mut third).await.unwrap().0, AdminOpcode::RealmList);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_ends_admin_stream() {
        let (addr, registry, shutdown) = start().await;

        let mut admin = TcpStream::connect(addr).await.unwrap();
        assert_eq!(read_frame(&mut admin).await.unwrap().0, AdminOpcode::RealmList);

        shutdown.cancel();
        let mut rest = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), admin.read_to_end(&mut rest))
            .await
            .unwrap();
        assert_eq!(read.unwrap(), 0);
        wait_for_slot(&registry, false).await;
    }
}
