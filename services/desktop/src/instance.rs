//! services/desktop/src/instance.rs
//!
//! Single-instance lock. The first instance binds a loopback relay port; a
//! later launch finds it taken, sends its command line over it as one JSON
//! line, and exits.

use crate::auth::AuthSender;
use crate::error::DesktopError;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Caps a relayed command line.
const MAX_RELAY_BYTES: u64 = 64 * 1024;

/// A relay client must deliver its line within this window.
const RELAY_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub enum InstanceRole {
    /// This process holds the lock; the listener receives later launches.
    Primary(TcpListener),
    /// Another instance is running and has been handed `args`.
    Secondary,
}

/// Takes the lock, or forwards `args` to the instance that holds it.
pub async fn acquire(port: u16, args: &[String]) -> Result<InstanceRole, DesktopError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            debug!("Holding the single-instance lock on {}", addr);
            Ok(InstanceRole::Primary(listener))
        }
        Err(bind_err) => {
            let mut stream = TcpStream::connect(addr).await.map_err(|_| {
                DesktopError::ListenerBind {
                    addr,
                    source: bind_err,
                }
            })?;
            let mut line = serde_json::to_vec(args)
                .map_err(|e| DesktopError::Internal(format!("Cannot encode arguments: {}", e)))?;
            line.push(b'\n');
            stream.write_all(&line).await?;
            stream.shutdown().await?;
            info!("Another instance is running; handed over {} arguments", args.len());
            Ok(InstanceRole::Secondary)
        }
    }
}

/// Accepts relayed command lines until `shutdown` fires and publishes each
/// as a second-instance event. Each connection is read on its own task, so a
/// stalled client cannot hold up later launches.
pub fn spawn_relay(
    listener: TcpListener,
    sender: AuthSender,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Instance relay accept failed: {}", e);
                        continue;
                    }
                }
            };
            let sender = sender.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(RELAY_READ_TIMEOUT, read_args(stream)).await {
                    Ok(Ok(args)) => {
                        sender.second_instance(args).await;
                    }
                    Ok(Err(e)) => warn!("Ignoring malformed relay message from {}: {}", peer, e),
                    Err(_) => warn!("Relay client {} sent nothing within {:?}", peer, RELAY_READ_TIMEOUT),
                }
            });
        }
        debug!("Instance relay stopped.");
    })
}

async fn read_args(stream: TcpStream) -> Result<Vec<String>, DesktopError> {
    let mut reader = BufReader::new(stream).take(MAX_RELAY_BYTES);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    serde_json::from_str(line.trim_end())
        .map_err(|e| DesktopError::Internal(format!("Cannot decode arguments: {}", e)))
}
