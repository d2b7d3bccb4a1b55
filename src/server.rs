//! RPC server: accepts connections, performs the handshake and hands each
//! connection to the request pipeline.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::protocol::codec::{CodecReader, CodecWriter};
use crate::protocol::{handshake, rpc};
use crate::service::ServiceRegistry;

/// Serves calls against a [`ServiceRegistry`].
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Server {
    registry: Arc<dyn ServiceRegistry>,
}

impl Server {
    pub fn new<T: ServiceRegistry>(registry: T) -> Self {
        Self { registry: Arc::new(registry) }
    }

    /// Builds a server around a registry that is already shared.
    pub fn with_registry(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Accepts connections on `listener` and serves each on its own task.
    ///
    /// Only returns if accepting fails.
    pub async fn accept(&self, listener: &TcpListener) -> io::Result<()> {
        loop {
            let (socket, peer) = listener.accept().await.map_err(|e| {
                error!("rpc server: accept error: {}", e);
                e
            })?;
            let _ = socket.set_nodelay(true);
            info!("Accepting connection from {}", peer);
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_conn_from(socket, peer.to_string()).await {
                    debug!("rpc server: connection from {} dropped: {}", peer, e);
                }
            });
        }
    }

    /// Serves one already-connected stream until it is closed.
    ///
    /// Fails without writing anything back if the handshake is rejected.
    pub async fn serve_conn<S>(&self, stream: S) -> Result<(), anyhow::Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.serve_conn_from(stream, "<stream>".to_string()).await
    }

    async fn serve_conn_from<S>(&self, stream: S, client_addr: String) -> Result<(), anyhow::Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let opt = match handshake::read_options(&mut reader).await {
            Ok(opt) => opt,
            Err(e) => {
                warn!("rpc server: options error from {}: {}", client_addr, e);
                let _ = writer.shutdown().await;
                return Err(e.into());
            }
        };
        debug!("rpc server: {} negotiated codec {}", client_addr, opt.codec_type);

        let context = rpc::Context {
            client_addr,
            codec_type: opt.codec_type,
            registry: self.registry.clone(),
        };
        rpc::serve_codec(
            CodecReader::new(opt.codec_type, reader),
            CodecWriter::new(opt.codec_type, writer),
            context,
        )
        .await;
        Ok(())
    }
}
