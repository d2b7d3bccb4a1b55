//! RPC client multiplexing concurrent calls over one connection.
//!
//! A [`Client`] owns one connection. Requests are written under a send lock;
//! a single background task, the receive loop, reads every response and hands
//! it to the call registered under the response's sequence number. Responses
//! can therefore arrive in any order.
//!
//! Two locks guard the client state:
//! - the send lock, which owns the codec writer and serializes requests
//! - the registry lock, which guards the sequence counter, the pending calls
//!   and the `closing`/`shutdown` flags
//!
//! Whenever both are needed they are taken in that order, send lock first.
//!
//! Any failure of the receive loop is terminal: every pending call fails with
//! that error and the client refuses new calls with [`RpcError::Shutdown`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::error::RpcError;
use crate::protocol::codec::{CodecReader, CodecType, CodecWriter, Header};
use crate::protocol::handshake::{self, Options, MAGIC_NUMBER};

mod call;

pub use call::{AsyncCall, Call};
use call::{Done, Pending, PendingCall};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Call registry state, guarded by the registry lock.
struct State {
    /// Next sequence number to hand out; 0 is never used.
    seq: u64,
    pending: HashMap<u64, Box<dyn PendingCall>>,
    /// The user called [`Client::close`].
    closing: bool,
    /// The receive loop stopped.
    shutdown: bool,
}

struct Inner {
    codec_type: CodecType,
    /// Send lock.
    sending: tokio::sync::Mutex<CodecWriter<BoxedWriter>>,
    /// Registry lock.
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("unable to lock client state")
    }

    /// Assigns the next sequence number to `call` and makes it pending.
    ///
    /// Hands the call back if the client is closing or shut down.
    fn register_call(&self, mut call: Box<dyn PendingCall>) -> Result<u64, Box<dyn PendingCall>> {
        let mut state = self.state();
        if state.closing || state.shutdown {
            return Err(call);
        }
        let seq = state.seq;
        call.assign(seq);
        state.pending.insert(seq, call);
        state.seq += 1;
        Ok(seq)
    }

    fn is_shut_down(&self) -> bool {
        let state = self.state();
        state.closing || state.shutdown
    }

    fn remove_call(&self, seq: u64) -> Option<Box<dyn PendingCall>> {
        self.state().pending.remove(&seq)
    }

    /// Marks the client shut down and fails every pending call with `err`.
    async fn terminate_calls(&self, err: RpcError) {
        let _sending = self.sending.lock().await;
        let mut state = self.state();
        state.shutdown = true;
        let pending = std::mem::take(&mut state.pending);
        drop(state);
        for (_, call) in pending {
            call.complete(Err(err.clone()));
        }
    }
}

/// Client side of one RPC connection.
///
/// Calls may be issued concurrently from any number of tasks through a shared
/// reference. Dropping the client stops its receive loop and closes the
/// connection.
pub struct Client {
    inner: Arc<Inner>,
    receiver: JoinHandle<()>,
}

impl Client {
    /// Connects to an RPC server over TCP.
    ///
    /// `opts` defaults to [`Options::default`]. The magic number is always
    /// the protocol's own.
    pub async fn dial<A: ToSocketAddrs>(addr: A, opts: Option<Options>) -> Result<Client, RpcError> {
        let opt = parse_options(opts);
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        Client::new(stream, opt).await
    }

    /// Performs the handshake on `stream` and starts the receive loop.
    pub async fn new<S>(stream: S, opt: Options) -> Result<Client, RpcError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        if let Err(e) = handshake::write_options(&mut writer, &opt).await {
            error!("rpc client: options error: {}", e);
            return Err(e.into());
        }

        let inner = Arc::new(Inner {
            codec_type: opt.codec_type,
            sending: tokio::sync::Mutex::new(CodecWriter::new(
                opt.codec_type,
                Box::new(writer) as BoxedWriter,
            )),
            state: Mutex::new(State {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        });
        let reader = CodecReader::new(opt.codec_type, BufReader::new(reader));
        let receiver = tokio::spawn(receive(inner.clone(), reader));
        Ok(Client { inner, receiver })
    }

    pub fn codec_type(&self) -> CodecType {
        self.inner.codec_type
    }

    /// True until the client is closed or its connection fails.
    pub fn is_available(&self) -> bool {
        !self.inner.is_shut_down()
    }

    /// Closes the connection.
    ///
    /// New calls fail with [`RpcError::Shutdown`]. Calls still pending fail
    /// once the server has closed its side. Closing twice fails with
    /// [`RpcError::Shutdown`].
    pub async fn close(&self) -> Result<(), RpcError> {
        {
            let mut state = self.inner.state();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }
        self.inner.sending.lock().await.close().await;
        Ok(())
    }

    /// Sends a request and returns a handle resolving to its outcome.
    ///
    /// Returns as soon as the request is written; the reply is decoded as `R`.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> AsyncCall<R>
    where
        A: serde::Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let seq = self.send(service_method, args, Done::Oneshot(tx)).await;
        AsyncCall::new(seq, service_method, rx)
    }

    /// Sends a request whose outcome is delivered on `done`.
    ///
    /// `done` may be shared by many calls. Delivery never blocks the receive
    /// loop, even if the channel is full. Returns the request's sequence
    /// number, 0 if it could not be registered.
    pub async fn go_with<A, R>(
        &self,
        service_method: &str,
        args: &A,
        done: mpsc::Sender<Call<R>>,
    ) -> u64
    where
        A: serde::Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.send(service_method, args, Done::Channel(done)).await
    }

    /// Calls `service_method` and waits for the reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R, RpcError>
    where
        A: serde::Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.go(service_method, args).await.await.into_result()
    }

    /// Registers the call and writes its request.
    ///
    /// If the request cannot be written the call is completed right away with
    /// the write error, since no response will ever come for it.
    async fn send<A, R>(&self, service_method: &str, args: &A, done: Done<R>) -> u64
    where
        A: serde::Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let pending = Box::new(Pending::new(service_method, self.inner.codec_type, done));
        // refuse without queueing behind a write in progress
        if self.inner.is_shut_down() {
            pending.complete(Err(RpcError::Shutdown));
            return 0;
        }

        let mut writer = self.inner.sending.lock().await;
        let seq = match self.inner.register_call(pending) {
            Ok(seq) => seq,
            Err(call) => {
                call.complete(Err(RpcError::Shutdown));
                return 0;
            }
        };

        let header = Header { service_method: service_method.to_string(), seq, error: String::new() };
        trace!("rpc client: sending {:?}", header);
        if let Err(e) = writer.write(&header, args).await {
            // the receive loop may already have completed it
            if let Some(call) = self.inner.remove_call(seq) {
                call.complete(Err(e.into()));
            }
        }
        seq
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Uses exactly the options given, with the protocol's magic number.
fn parse_options(opts: Option<Options>) -> Options {
    match opts {
        None => Options::default(),
        Some(opt) => Options { magic_number: MAGIC_NUMBER, ..opt },
    }
}

/// Receive loop: demultiplexes responses to pending calls until the
/// connection fails, then terminates whatever is still pending.
async fn receive<R>(inner: Arc<Inner>, mut reader: CodecReader<R>)
where
    R: AsyncRead + Unpin,
{
    let err = loop {
        let header = match reader.read_header().await {
            Ok(header) => header,
            Err(e) => break RpcError::from(e),
        };
        match inner.remove_call(header.seq) {
            None => {
                debug!("rpc client: no pending call for seq {}", header.seq);
                if let Err(e) = reader.discard_body().await {
                    break e.into();
                }
            }
            Some(call) if !header.error.is_empty() => {
                let res = reader.discard_body().await;
                call.complete(Err(RpcError::Dispatch(header.error)));
                if let Err(e) = res {
                    break e.into();
                }
            }
            Some(call) => match reader.read_body_raw().await {
                Ok(body) => call.complete(Ok(&body)),
                Err(e) => {
                    let err = RpcError::from(e);
                    call.complete(Err(err.clone()));
                    break err;
                }
            },
        }
    };
    debug!("rpc client: receive loop finished: {}", err);
    inner.terminate_calls(err).await;
}
