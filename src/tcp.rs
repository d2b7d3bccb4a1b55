//! TCP listener that exposes a [`ServiceRegistry`] over the network.
//!
//! This module binds a listening socket and serves every accepted connection
//! on its own task through [`Server`]. Each connection:
//! - Starts with the options handshake selecting the codec
//! - Carries any number of concurrent calls, correlated by sequence number
//! - Is closed once the peer stops sending and pending responses are written

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::info;

use crate::server::Server;
use crate::service::ServiceRegistry;

/// RPC TCP connection handler that listens for incoming client connections.
pub struct RpcTcpListener {
    /// TCP Listener for accepting incoming connections
    listener: TcpListener,
    /// Port on which the server is listening
    port: u16,
    /// Server answering the calls
    server: Server,
}

/// Interface for RPC TCP servers.
#[async_trait]
pub trait RpcTcp: Send + Sync {
    /// Returns the actual port number on which the server is listening
    ///
    /// Useful when binding to port 0, which lets the OS pick a free port.
    fn get_listen_port(&self) -> u16;

    /// Returns the IP address on which the server is listening
    fn get_listen_ip(&self) -> IpAddr;

    /// Accepts connections and serves each one on its own task.
    ///
    /// Runs until accepting a connection fails.
    async fn handle_forever(&self) -> io::Result<()>;
}

impl RpcTcpListener {
    /// Creates a new listener bound to `ipstr`
    ///
    /// # Arguments
    ///
    /// * `ipstr` - IP address and port in the format "IP:PORT" (e.g. "127.0.0.1:9999")
    /// * `registry` - Services answering the calls
    pub async fn bind<T: ServiceRegistry>(ipstr: &str, registry: T) -> io::Result<RpcTcpListener> {
        Self::bind_server(ipstr, Server::new(registry)).await
    }

    /// Same as [`RpcTcpListener::bind`] for an existing [`Server`].
    pub async fn bind_server(ipstr: &str, server: Server) -> io::Result<RpcTcpListener> {
        let (ip, port) = ipstr.rsplit_once(':').ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "IP Address must be of form ip:port")
        })?;
        let port = port.parse::<u16>().map_err(|_| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "Port not in range 0..=65535")
        })?;

        let listener = TcpListener::bind((ip, port)).await?;
        let port = listener.local_addr()?.port();
        info!("rpc server: listening on {}:{}", ip, port);
        Ok(RpcTcpListener { listener, port, server })
    }
}

#[async_trait]
impl RpcTcp for RpcTcpListener {
    fn get_listen_port(&self) -> u16 {
        self.port
    }

    fn get_listen_ip(&self) -> IpAddr {
        self.listener
            .local_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
    }

    async fn handle_forever(&self) -> io::Result<()> {
        self.server.accept(&self.listener).await
    }
}
