//! Request pipeline of one server connection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, trace, warn};

use crate::error::{CodecError, DispatchError};
use crate::protocol::codec::{CodecReader, CodecWriter, Header};
use crate::protocol::rpc;
use crate::service::Invoker;

/// Response writer shared by all dispatch tasks of a connection.
type Sending<W> = Arc<Mutex<CodecWriter<W>>>;

/// Body sent in place of a reply when a request failed.
#[derive(serde::Serialize)]
struct InvalidRequest {}

/// A request ready for dispatch.
struct Request {
    header: Header,
    /// Argument body, still encoded: only the invoker knows its type.
    argv: Vec<u8>,
    invoker: Arc<dyn Invoker>,
}

/// Outcome of reading one header/body pair.
enum ReadOutcome {
    Request(Request),
    /// Read fine, but cannot be dispatched; answered with the error.
    Invalid(Header, DispatchError),
}

enum Reply {
    Encoded(Vec<u8>),
    Invalid,
}

/// Serves one connection until its read side ends.
///
/// Each request runs on its own task. Once the read loop stops, every
/// in-flight request is allowed to finish and write its response, then the
/// writer is closed.
pub async fn serve_codec<R, W>(
    mut reader: CodecReader<R>,
    writer: CodecWriter<W>,
    context: rpc::Context,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let sending: Sending<W> = Arc::new(Mutex::new(writer));
    let mut handlers = JoinSet::new();
    loop {
        match read_request(&mut reader, &context).await {
            Ok(ReadOutcome::Request(req)) => {
                handlers.spawn(handle_request(req, sending.clone(), context.clone()));
            }
            Ok(ReadOutcome::Invalid(mut header, err)) => {
                warn!("rpc server: {} (seq {}, from {})", err, header.seq, context.client_addr);
                header.error = err.to_string();
                send_response(&sending, &header, Reply::Invalid).await;
            }
            Err(CodecError::ConnectionClosed) => {
                debug!("rpc server: {} closed the connection", context.client_addr);
                break;
            }
            Err(e) if e.is_decode() => {
                // no sequence number to answer
                warn!("rpc server: read header error from {}: {}", context.client_addr, e);
                break;
            }
            Err(e) => {
                debug!("rpc server: read error from {}: {}", context.client_addr, e);
                break;
            }
        }
        // reap finished handlers so the set does not grow with the connection
        while handlers.try_join_next().is_some() {}
    }

    while let Some(res) = handlers.join_next().await {
        if let Err(e) = res {
            error!("rpc server: dispatch task failed: {}", e);
        }
    }
    sending.lock().await.close().await;
    debug!("rpc server: connection from {} finished", context.client_addr);
}

/// Reads the next header and its body.
///
/// Errors are the ones that end the connection: end of stream, transport
/// failures, oversized records and malformed headers. A request that cannot
/// be dispatched still consumes its body and is answered with an error.
async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut CodecReader<R>,
    context: &rpc::Context,
) -> Result<ReadOutcome, CodecError> {
    let header = reader.read_header().await?;
    let argv = reader.read_body_raw().await?;
    trace!("rpc server: request {:?}, {} body bytes", header, argv.len());

    match context.registry.resolve(&header.service_method) {
        Ok(invoker) => Ok(ReadOutcome::Request(Request { header, argv, invoker })),
        Err(e) => Ok(ReadOutcome::Invalid(header, e)),
    }
}

/// Runs one request and answers it.
async fn handle_request<W>(req: Request, sending: Sending<W>, context: rpc::Context)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let Request { mut header, argv, invoker } = req;
    debug!("rpc server: dispatching {} seq {}", header.service_method, header.seq);
    let reply = match invoker.invoke(context.codec_type, &argv).await {
        Ok(reply) => Reply::Encoded(reply),
        Err(e) => {
            debug!("rpc server: {} seq {} failed: {}", header.service_method, header.seq, e);
            header.error = e.to_string();
            Reply::Invalid
        }
    };
    send_response(&sending, &header, reply).await;
}

/// Writes one response as a single header/body pair.
async fn send_response<W>(sending: &Sending<W>, header: &Header, reply: Reply)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = sending.lock().await;
    let result = match reply {
        Reply::Encoded(body) => writer.write_encoded(header, &body).await,
        Reply::Invalid => writer.write(header, &InvalidRequest {}).await,
    };
    if let Err(e) = result {
        error!("rpc server: write response error: {}", e);
    }
}
