//! Host key capture against a local SSH server

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server;
use russh_keys::key::{KeyPair, SignatureHash};
use tokio::net::TcpListener;

use gws_tunnel::known_hosts;

struct Silent;

#[async_trait]
impl server::Handler for Silent {
    type Error = russh::Error;
}

/// Serve SSH handshakes with a fixed Ed25519 host key
async fn ssh_server() -> std::net::SocketAddr {
    ssh_server_with(KeyPair::generate_ed25519().expect("generate host key")).await
}

async fn ssh_server_with(key: KeyPair) -> std::net::SocketAddr {
    let config = Arc::new(server::Config {
        keys: vec![key],
        ..Default::default()
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                if let Ok(running) = server::run_stream(config, socket, Silent).await {
                    let _ = running.await;
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_sync_twice_leaves_file_identical() {
    let addr = ssh_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_hosts");
    std::fs::write(&path, "github.com ssh-ed25519 AAAAgithub\n").unwrap();

    let changed = known_hosts::sync(&path, addr, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(changed);

    let first = std::fs::read_to_string(&path).unwrap();
    assert!(first.starts_with("github.com ssh-ed25519 AAAAgithub\n"));
    let prefix = format!("[127.0.0.1]:{} ssh-ed25519 ", addr.port());
    assert_eq!(first.lines().filter(|l| l.starts_with(&prefix)).count(), 1);

    let changed = known_hosts::sync(&path, addr, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
}

#[tokio::test]
async fn test_stale_key_is_replaced() {
    let addr = ssh_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_hosts");
    let stale = format!("[127.0.0.1]:{} ssh-rsa AAAAstale\n", addr.port());
    std::fs::write(&path, &stale).unwrap();

    assert!(known_hosts::sync(&path, addr, Duration::from_secs(10))
        .await
        .unwrap());

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("AAAAstale"));
    assert_eq!(content.lines().count(), 1);
}

#[tokio::test]
async fn test_rsa_host_key_recorded_as_ssh_rsa() {
    let key = KeyPair::generate_rsa(2048, SignatureHash::SHA2_256).expect("generate host key");
    let addr = ssh_server_with(key).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_hosts");

    assert!(known_hosts::sync(&path, addr, Duration::from_secs(30))
        .await
        .unwrap());

    let content = std::fs::read_to_string(&path).unwrap();
    let fields: Vec<&str> = content.trim_end().split(' ').collect();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0], format!("[127.0.0.1]:{}", addr.port()));
    assert_eq!(fields[1], "ssh-rsa");

    // A line ssh itself would have written stays untouched
    assert!(!known_hosts::sync(&path, addr, Duration::from_secs(30))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_handshake_timeout() {
    // Accepts TCP but never speaks SSH
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let result = known_hosts::fetch_host_key(addr, Duration::from_millis(200)).await;
    assert!(matches!(
        result,
        Err(gws_tunnel::KnownHostsError::Timeout { .. })
    ));
}
