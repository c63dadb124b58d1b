//! known_hosts maintenance for the local tunnel endpoint
//!
//! One throwaway SSH handshake through the tunnel reveals the workstation's
//! host key; the `[127.0.0.1]:{port}` line is then upserted so `ssh -p {port}
//! 127.0.0.1` does not prompt.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use thiserror::Error;

/// Host key capture and file update failures
#[derive(Debug, Error)]
pub enum KnownHostsError {
    #[error("SSH handshake with {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    #[error("SSH handshake with {addr} failed: {source}")]
    Handshake {
        addr: SocketAddr,
        #[source]
        source: russh::Error,
    },

    #[error("Server at {0} presented no host key")]
    NoKey(SocketAddr),

    #[error("Failed to update {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Host pattern used for the local tunnel endpoint
pub fn host_pattern(port: u16) -> String {
    format!("[127.0.0.1]:{}", port)
}

/// Full known_hosts line for `port`
pub fn known_hosts_entry(port: u16, key_type: &str, key_base64: &str) -> String {
    format!("{} {} {}", host_pattern(port), key_type, key_base64)
}

/// Insert or replace the line for `port`.
///
/// Returns the new file content, or `None` when nothing would change.
pub fn upsert_entry(content: &str, port: u16, entry: &str) -> Option<String> {
    let prefix = format!("{} ", host_pattern(port));

    let mut lines: Vec<&str> = Vec::new();
    let mut found = false;
    for line in content.lines() {
        if line.starts_with(&prefix) {
            // Collapse duplicates into the single fresh entry
            if !found {
                lines.push(entry);
                found = true;
            }
        } else {
            lines.push(line);
        }
    }
    if !found {
        lines.push(entry);
    }

    let mut updated = lines.join("\n");
    updated.push('\n');

    (updated != content).then_some(updated)
}

/// Upsert `entry` into the file at `path`, writing only on change
pub async fn write_if_changed(path: &Path, port: u16, entry: &str) -> Result<bool, KnownHostsError> {
    let io_err = |source| KnownHostsError::Io {
        path: path.to_path_buf(),
        source,
    };

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(e)),
    };

    let Some(updated) = upsert_entry(&content, port, entry) else {
        tracing::debug!("{} already up to date", path.display());
        return Ok(false);
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }
    tokio::fs::write(path, updated).await.map_err(io_err)?;
    Ok(true)
}

/// Accepts any host key and remembers it
struct KeyCapture {
    key: Arc<Mutex<Option<PublicKey>>>,
}

#[async_trait]
impl client::Handler for KeyCapture {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Observed host key {}", server_public_key.fingerprint());
        if let Ok(mut slot) = self.key.lock() {
            *slot = Some(server_public_key.clone());
        }
        Ok(true)
    }
}

/// Complete key exchange with `addr` and return the server's host key
pub async fn fetch_host_key(addr: SocketAddr, timeout: Duration) -> Result<PublicKey, KnownHostsError> {
    let key = Arc::new(Mutex::new(None));
    let handler = KeyCapture {
        key: Arc::clone(&key),
    };

    let session = tokio::time::timeout(
        timeout,
        client::connect(Arc::new(client::Config::default()), addr, handler),
    )
    .await
    .map_err(|_| KnownHostsError::Timeout { addr, timeout })?
    .map_err(|source| KnownHostsError::Handshake { addr, source })?;

    let _ = session
        .disconnect(Disconnect::ByApplication, "host key captured", "en")
        .await;

    let captured = key.lock().ok().and_then(|mut slot| slot.take());
    captured.ok_or(KnownHostsError::NoKey(addr))
}

/// known_hosts key type of `key`.
///
/// `name()` reports the negotiated signature algorithm for RSA keys
/// (`rsa-sha2-256`), while known_hosts records the key type.
pub fn key_type(key: &PublicKey) -> &'static str {
    match key {
        PublicKey::RSA { .. } => "ssh-rsa",
        _ => key.name(),
    }
}

/// Capture the host key behind `addr` and record it in `path`.
///
/// Returns whether the file changed.
pub async fn sync(path: &Path, addr: SocketAddr, timeout: Duration) -> Result<bool, KnownHostsError> {
    let key = fetch_host_key(addr, timeout).await?;
    let entry = known_hosts_entry(addr.port(), key_type(&key), &key.public_key_base64());
    write_if_changed(path, addr.port(), &entry).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "[127.0.0.1]:2222 ssh-ed25519 AAAAnew";

    #[test]
    fn test_entry_format() {
        assert_eq!(known_hosts_entry(2222, "ssh-ed25519", "AAAAnew"), ENTRY);
    }

    #[test]
    fn test_append_when_absent() {
        let content = "github.com ssh-ed25519 AAAAgh\n";
        let updated = upsert_entry(content, 2222, ENTRY).unwrap();
        assert_eq!(updated, format!("{}{}\n", content, ENTRY));
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(upsert_entry("", 2222, ENTRY).unwrap(), format!("{}\n", ENTRY));
    }

    #[test]
    fn test_replace_stale_line_in_place() {
        let content = "a ssh-rsa AAAA1\n[127.0.0.1]:2222 ssh-ed25519 AAAAold\nb ssh-rsa AAAA2\n";
        let updated = upsert_entry(content, 2222, ENTRY).unwrap();
        assert_eq!(
            updated,
            format!("a ssh-rsa AAAA1\n{}\nb ssh-rsa AAAA2\n", ENTRY)
        );
    }

    #[test]
    fn test_unchanged_returns_none() {
        let content = format!("a ssh-rsa AAAA1\n{}\n", ENTRY);
        assert!(upsert_entry(&content, 2222, ENTRY).is_none());
    }

    #[test]
    fn test_other_ports_untouched() {
        let content = "[127.0.0.1]:22222 ssh-ed25519 AAAAother\n";
        let updated = upsert_entry(content, 2222, ENTRY).unwrap();
        assert!(updated.starts_with(content));
    }

    #[test]
    fn test_missing_trailing_newline_is_repaired() {
        let content = ENTRY.to_string();
        assert_eq!(
            upsert_entry(&content, 2222, ENTRY).unwrap(),
            format!("{}\n", ENTRY)
        );
    }

    #[tokio::test]
    async fn test_write_if_changed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh").join("known_hosts");

        assert!(write_if_changed(&path, 2222, ENTRY).await.unwrap());
        let first = std::fs::read(&path).unwrap();

        assert!(!write_if_changed(&path, 2222, ENTRY).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }
}
