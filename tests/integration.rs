use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use flate2::read::ZlibDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use realm_registry::Server;
use realm_registry::config::ServerConfig;
use realm_registry::protocol::envelope::{ADMIN_HEADER_LEN, Envelope, HEADER_LEN};
use realm_registry::protocol::messages::{
    LogMessage, RealmStatusEvent, RegistrationRequest, StatusUpdate, decode_log_batch,
    decode_realm_added, decode_realm_list, decode_registration_response,
};
use realm_registry::protocol::opcodes::{AdminOpcode, SrvComOpcode};
use realm_registry::realm::{AccessLevel, RealmFlags, RealmType, Timezone};
use realm_registry::registry::RealmRegistry;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    admin_addr: SocketAddr,
    registry: Arc<RealmRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

async fn start_server(max_connections: usize) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ServerConfig {
        bind_address: "127.0.0.1".into(),
        max_connections,
        ..ServerConfig::default()
    };

    let server = Server::from_listeners(config, listener, Some(admin_listener));
    let addr = server.local_addr().unwrap();
    let admin_addr = server.admin_addr().unwrap();
    let registry = server.registry();
    let shutdown = server.shutdown_token();
    let task = tokio::spawn(server.run());

    Running {
        addr,
        admin_addr,
        registry,
        shutdown,
        task,
    }
}

fn request(id: u32, name: &str) -> RegistrationRequest {
    RegistrationRequest {
        realm_id: id,
        name: name.to_string(),
        game_port: 8085,
        max_players: 1000,
        online_players: 250,
        min_access_level: AccessLevel::Player,
        flags: RealmFlags::NEW_PLAYERS,
        realm_type: RealmType::Pvp,
        timezone: Timezone::Development,
        builds: vec![5875],
    }
}

async fn send(stream: &mut TcpStream, envelope: Envelope) {
    stream.write_all(&envelope.encode().unwrap()).await.unwrap();
}

/// Next non-heartbeat envelope, or `None` once the server closes.
async fn next_reply(stream: &mut TcpStream) -> Option<Envelope> {
    tokio::time::timeout(IO_TIMEOUT, async {
        loop {
            let mut header = [0u8; HEADER_LEN];
            stream.read_exact(&mut header).await.ok()?;
            let len = u16::from_le_bytes([header[1], header[2]]) as usize;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).await.ok()?;
            let opcode = SrvComOpcode::try_from(header[0]).ok()?;
            if opcode != SrvComOpcode::Heartbeat {
                return Some(Envelope::new(opcode, payload));
            }
        }
    })
    .await
    .expect("timed out waiting for the registry")
}

async fn register(stream: &mut TcpStream, id: u32, name: &str) -> bool {
    let payload = request(id, name).encode().unwrap();
    send(stream, Envelope::new(SrvComOpcode::RegisteringRequest, payload)).await;
    let reply = next_reply(stream).await.expect("connection closed");
    assert_eq!(reply.opcode, SrvComOpcode::RegistrationResponse);
    decode_registration_response(&reply.payload).unwrap()
}

async fn read_admin_frame(stream: &mut TcpStream) -> (AdminOpcode, Vec<u8>) {
    tokio::time::timeout(IO_TIMEOUT, async {
        let mut header = [0u8; ADMIN_HEADER_LEN];
        stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        (AdminOpcode::try_from(header[0]).unwrap(), payload)
    })
    .await
    .expect("timed out waiting for an admin frame")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(IO_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn test_registration_over_tcp() {
    let server = start_server(8).await;
    let mut realm = TcpStream::connect(server.addr).await.unwrap();

    assert!(register(&mut realm, 1, "Kalimdor").await);
    assert!(!register(&mut realm, 1, "Kalimdor").await);

    let snapshot = server.registry.snapshot(1).unwrap();
    assert_eq!(snapshot.name, "Kalimdor");
    assert_eq!(snapshot.address, "127.0.0.1");
    assert_eq!(snapshot.population, 0.25);
    assert!(!snapshot.flags.is_offline());

    drop(realm);
    let registry = Arc::clone(&server.registry);
    wait_until(move || registry.snapshot(1).is_some_and(|r| r.flags.is_offline())).await;

    server.shutdown.cancel();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_reconnect_takes_over_offline_realm() {
    let server = start_server(8).await;

    let mut first = TcpStream::connect(server.addr).await.unwrap();
    assert!(register(&mut first, 5, "Outland").await);

    // a second connection cannot claim a realm that is still live
    let mut rival = TcpStream::connect(server.addr).await.unwrap();
    assert!(!register(&mut rival, 5, "Outland").await);

    drop(first);
    let registry = Arc::clone(&server.registry);
    wait_until(move || registry.snapshot(5).is_some_and(|r| r.flags.is_offline())).await;

    assert!(register(&mut rival, 5, "Outland").await);
    assert!(!server.registry.snapshot(5).unwrap().flags.is_offline());

    server.shutdown.cancel();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_admin_receives_realm_events_and_logs() {
    let server = start_server(8).await;

    let mut admin = TcpStream::connect(server.admin_addr).await.unwrap();
    let (opcode, payload) = read_admin_frame(&mut admin).await;
    assert_eq!(opcode, AdminOpcode::RealmList);
    assert!(decode_realm_list(&payload).unwrap().is_empty());

    let mut realm = TcpStream::connect(server.addr).await.unwrap();
    assert!(register(&mut realm, 7, "Northrend").await);

    let (opcode, payload) = read_admin_frame(&mut admin).await;
    assert_eq!(opcode, AdminOpcode::RealmAdded);
    let added = decode_realm_added(&payload).unwrap();
    assert_eq!(added.id, 7);
    assert_eq!(added.realm_type, RealmType::Pvp);

    let status = StatusUpdate {
        flags: RealmFlags::FULL,
        population: 2.0,
    };
    send(&mut realm, Envelope::new(SrvComOpcode::StatusUpdate, status.encode())).await;
    let (opcode, payload) = read_admin_frame(&mut admin).await;
    assert_eq!(opcode, AdminOpcode::RealmStatus);
    let event = RealmStatusEvent::decode(&payload).unwrap();
    assert_eq!(event.id, 7);
    assert!(event.flags.contains(RealmFlags::FULL));
    assert_eq!(event.population, 2.0);

    let line = LogMessage::new(3, "world boss spawned");
    send(&mut realm, Envelope::new(SrvComOpcode::LogMessage, line.encode())).await;
    let (opcode, payload) = read_admin_frame(&mut admin).await;
    assert_eq!(opcode, AdminOpcode::LogBatch);

    let size = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let mut raw = Vec::new();
    ZlibDecoder::new(&payload[4..]).read_to_end(&mut raw).unwrap();
    assert_eq!(raw.len(), size);
    let batch = decode_log_batch(&raw).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].realm_id, 7);
    assert_eq!(batch[0].entries, vec![line]);

    drop(realm);
    let (opcode, payload) = read_admin_frame(&mut admin).await;
    assert_eq!(opcode, AdminOpcode::RealmStatus);
    assert!(RealmStatusEvent::decode(&payload).unwrap().flags.is_offline());

    server.shutdown.cancel();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_connection_cap_refuses_extra_realms() {
    let server = start_server(1).await;

    let mut first = TcpStream::connect(server.addr).await.unwrap();
    assert!(register(&mut first, 1, "Only").await);

    let mut second = TcpStream::connect(server.addr).await.unwrap();
    assert!(next_reply(&mut second).await.is_none());

    assert!(!register(&mut first, 1, "Only").await);
    server.shutdown.cancel();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = start_server(8).await;
    let mut realm = TcpStream::connect(server.addr).await.unwrap();
    assert!(register(&mut realm, 11, "Draenor").await);

    server.shutdown.cancel();
    server.task.await.unwrap();

    assert!(next_reply(&mut realm).await.is_none());
    assert!(server.registry.snapshot(11).unwrap().flags.is_offline());
}
