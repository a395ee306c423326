// CLASSIFICATION: COMMUNITY
// Filename: disk_protocol.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use remotefs::cli::stop_on_signal;
use remotefs::config::DiskServerConfig;
use remotefs::disk::DiskServer;
use remotefs::wire::{DiskRequest, DiskResponse, SectorAddr, DISK_NAMES, DISK_SIZE, SECTOR_SIZE};
use serial_test::serial;
use tempfile::tempdir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn start_server(root: &Path) -> (DiskServer, SocketAddr) {
    start_server_with_idle(root, 30)
}

fn start_server_with_idle(root: &Path, idle_timeout_secs: u64) -> (DiskServer, SocketAddr) {
    let cfg = DiskServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        template_dir: root.join("disks"),
        clients_dir: root.join("clients"),
        workers: 4,
        idle_timeout_secs,
        flush_interval_ms: 50,
    };
    let mut server = DiskServer::new(cfg).expect("configure disk server");
    let addr = server.start().expect("start disk server");
    (server, addr)
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn send(stream: &mut TcpStream, request: &DiskRequest) {
    stream.write_all(&request.encode()).unwrap();
}

fn handshake(stream: &mut TcpStream, id: &str) -> DiskResponse {
    send(
        stream,
        &DiskRequest::Handshake {
            id: id.as_bytes().to_vec(),
        },
    );
    DiskResponse::read_status(stream).unwrap()
}

fn read_sector(stream: &mut TcpStream, addr: SectorAddr) -> DiskResponse {
    send(stream, &DiskRequest::ReadSector(addr));
    DiskResponse::read_sector_reply(stream).unwrap()
}

fn sector(fill: u8) -> Box<[u8; SECTOR_SIZE]> {
    Box::new([fill; SECTOR_SIZE])
}

#[test]
#[serial]
fn handshake_write_read_over_tcp() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);

    assert_eq!(handshake(&mut client, "altair-1"), DiskResponse::Ok);
    let at = SectorAddr::new(2, 10, 31);
    send(&mut client, &DiskRequest::WriteSector(at, sector(0x5C)));
    assert_eq!(read_sector(&mut client, at), DiskResponse::Sector(sector(0x5C)));

    drop(client);
    server.stop();
}

#[test]
#[serial]
fn sector_traffic_before_handshake_is_rejected() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);

    send(&mut client, &DiskRequest::WriteSector(SectorAddr::new(0, 0, 0), sector(1)));
    assert_eq!(DiskResponse::read_status(&mut client).unwrap(), DiskResponse::Error);
    assert_eq!(
        read_sector(&mut client, SectorAddr::new(0, 0, 0)),
        DiskResponse::Error
    );

    drop(client);
    server.stop();
}

#[test]
#[serial]
fn new_client_gets_template_copies() {
    init_logger();
    let dir = tempdir().unwrap();
    let templates = dir.path().join("disks");
    fs::create_dir_all(&templates).unwrap();
    let mut image = vec![0u8; DISK_SIZE];
    image[..SECTOR_SIZE].fill(0xC3);
    fs::write(templates.join(DISK_NAMES[0]), &image).unwrap();

    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);
    assert_eq!(handshake(&mut client, "fresh"), DiskResponse::Ok);
    assert_eq!(
        read_sector(&mut client, SectorAddr::new(0, 0, 0)),
        DiskResponse::Sector(sector(0xC3))
    );
    assert_eq!(
        read_sector(&mut client, SectorAddr::new(3, 0, 0)),
        DiskResponse::Sector(sector(0))
    );

    for name in DISK_NAMES {
        let len = fs::metadata(dir.path().join("clients/fresh").join(name))
            .unwrap()
            .len();
        assert_eq!(len, DISK_SIZE as u64);
    }
    // Template untouched by client writes.
    send(&mut client, &DiskRequest::WriteSector(SectorAddr::new(0, 0, 0), sector(0)));
    read_sector(&mut client, SectorAddr::new(0, 0, 0));
    assert_eq!(fs::read(templates.join(DISK_NAMES[0])).unwrap(), image);

    drop(client);
    server.stop();
}

#[test]
#[serial]
fn clients_are_isolated() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    let at = SectorAddr::new(1, 4, 4);

    let mut a = connect(addr);
    let mut b = connect(addr);
    assert_eq!(handshake(&mut a, "client-a"), DiskResponse::Ok);
    assert_eq!(handshake(&mut b, "client-b"), DiskResponse::Ok);
    send(&mut a, &DiskRequest::WriteSector(at, sector(0xAA)));
    send(&mut b, &DiskRequest::WriteSector(at, sector(0xBB)));
    assert_eq!(read_sector(&mut a, at), DiskResponse::Sector(sector(0xAA)));
    assert_eq!(read_sector(&mut b, at), DiskResponse::Sector(sector(0xBB)));

    // A second connection with the same id shares the images.
    let mut a2 = connect(addr);
    assert_eq!(handshake(&mut a2, "client-a"), DiskResponse::Ok);
    assert_eq!(read_sector(&mut a2, at), DiskResponse::Sector(sector(0xAA)));
    assert_eq!(server.registry().client_count(), 2);

    drop((a, b, a2));
    server.stop();
}

#[test]
#[serial]
fn concurrent_handshakes_provision_once() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(move || {
                let mut client = connect(addr);
                let reply = handshake(&mut client, "shared");
                (reply, client)
            })
        })
        .collect();
    let clients: Vec<_> = handles
        .into_iter()
        .map(|h| {
            let (reply, client) = h.join().unwrap();
            assert_eq!(reply, DiskResponse::Ok);
            client
        })
        .collect();
    assert_eq!(server.registry().client_count(), 1);

    drop(clients);
    server.stop();
}

#[test]
#[serial]
fn writes_survive_restart() {
    init_logger();
    let dir = tempdir().unwrap();
    let at = SectorAddr::new(0, 76, 31);
    {
        let (mut server, addr) = start_server(dir.path());
        let mut client = connect(addr);
        assert_eq!(handshake(&mut client, "persist"), DiskResponse::Ok);
        send(&mut client, &DiskRequest::WriteSector(at, sector(0x77)));
        // The read reply orders after the write on the same connection.
        assert_eq!(read_sector(&mut client, at), DiskResponse::Sector(sector(0x77)));
        drop(client);
        server.stop();
    }

    let image = fs::read(dir.path().join("clients/persist").join(DISK_NAMES[0])).unwrap();
    let offset = remotefs::wire::sector_offset(76, 31).unwrap();
    assert!(image[offset..offset + SECTOR_SIZE].iter().all(|b| *b == 0x77));

    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);
    assert_eq!(handshake(&mut client, "persist"), DiskResponse::Ok);
    assert_eq!(read_sector(&mut client, at), DiskResponse::Sector(sector(0x77)));
    drop(client);
    server.stop();
}

#[test]
#[serial]
fn background_flush_reaches_disk() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);
    assert_eq!(handshake(&mut client, "flusher"), DiskResponse::Ok);
    let at = SectorAddr::new(1, 0, 1);
    send(&mut client, &DiskRequest::WriteSector(at, sector(0x42)));
    read_sector(&mut client, at);

    let registry = server.registry();
    let mut clean = false;
    for _ in 0..100 {
        thread::sleep(Duration::from_millis(20));
        let drives = registry.get_or_create_drives("flusher").unwrap();
        if !drives[1].is_dirty() {
            clean = true;
            break;
        }
    }
    assert!(clean, "dirty image never flushed");

    drop(client);
    server.stop();
}

#[test]
#[serial]
fn unknown_command_answers_error_and_continues() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);
    client.write_all(&[0x09]).unwrap();
    let mut reply = [0u8; 1];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(reply, [0xFFu8]);
    assert_eq!(handshake(&mut client, "after-unknown"), DiskResponse::Ok);
    drop(client);
    server.stop();
}

/// Reads until the server closes the socket; `true` when no reply bytes
/// arrived first.
fn closed_without_reply(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1 + SECTOR_SIZE];
    matches!(stream.read(&mut buf), Ok(0) | Err(_))
}

#[test]
#[serial]
fn stop_ends_live_sessions_before_releasing_images() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    let mut client = connect(addr);
    assert_eq!(handshake(&mut client, "live"), DiskResponse::Ok);
    let at = SectorAddr::new(0, 5, 10);
    send(&mut client, &DiskRequest::WriteSector(at, sector(0xAA)));
    assert_eq!(read_sector(&mut client, at), DiskResponse::Sector(sector(0xAA)));
    assert_eq!(server.live_connections(), 1);

    server.stop();
    assert_eq!(server.live_connections(), 0);

    // The session is gone: a request on the old socket gets no sector back.
    let _ = client.write_all(&DiskRequest::ReadSector(at).encode());
    assert!(closed_without_reply(&mut client));

    let image = fs::read(dir.path().join("clients/live").join(DISK_NAMES[0])).unwrap();
    let offset = remotefs::wire::sector_offset(5, 10).unwrap();
    assert!(image[offset..offset + SECTOR_SIZE].iter().all(|b| *b == 0xAA));
}

#[test]
#[serial]
fn sigterm_stops_server_and_flushes() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server(dir.path());
    stop_on_signal(server.shutdown_handle().unwrap()).unwrap();
    let mut client = connect(addr);
    assert_eq!(handshake(&mut client, "signalled"), DiskResponse::Ok);
    let at = SectorAddr::new(3, 40, 2);
    send(&mut client, &DiskRequest::WriteSector(at, sector(0x3D)));
    assert_eq!(read_sector(&mut client, at), DiskResponse::Sector(sector(0x3D)));

    signal_hook::low_level::raise(signal_hook::consts::SIGTERM).unwrap();
    server.wait();
    server.stop();

    assert!(closed_without_reply(&mut client));
    let image = fs::read(dir.path().join("clients/signalled").join(DISK_NAMES[3])).unwrap();
    let offset = remotefs::wire::sector_offset(40, 2).unwrap();
    assert!(image[offset..offset + SECTOR_SIZE].iter().all(|b| *b == 0x3D));
}

#[test]
#[serial]
fn idle_connection_is_closed() {
    init_logger();
    let dir = tempdir().unwrap();
    let (mut server, addr) = start_server_with_idle(dir.path(), 1);
    let mut client = connect(addr);
    assert_eq!(handshake(&mut client, "sleepy"), DiskResponse::Ok);
    thread::sleep(Duration::from_millis(1500));
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
    server.stop();
}
