//! Calls as seen by the client: the pending entry kept by the call registry
//! and the handles returned to the caller.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::RpcError;
use crate::protocol::codec::CodecType;

/// A finished call.
#[derive(Debug)]
pub struct Call<R> {
    /// Sequence number assigned at registration, 0 if the call was never
    /// registered.
    pub seq: u64,
    pub service_method: String,
    /// The decoded reply, or why there is none.
    pub result: Result<R, RpcError>,
}

impl<R> Call<R> {
    pub fn error(&self) -> Option<&RpcError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<R, RpcError> {
        self.result
    }
}

/// Where a finished call is delivered.
pub(crate) enum Done<R> {
    /// Single waiter, see [`AsyncCall`].
    Oneshot(oneshot::Sender<Call<R>>),
    /// Caller-supplied channel, possibly shared by many calls.
    Channel(mpsc::Sender<Call<R>>),
}

impl<R: Send + 'static> Done<R> {
    /// Hands `call` over without ever blocking the caller.
    fn deliver(self, call: Call<R>) {
        match self {
            Done::Oneshot(tx) => {
                let _ = tx.send(call);
            }
            Done::Channel(tx) => match tx.try_send(call) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(call)) => {
                    // the receive loop must keep reading; finish delivery elsewhere
                    tokio::spawn(async move {
                        let _ = tx.send(call).await;
                    });
                }
                Err(mpsc::error::TrySendError::Closed(call)) => {
                    debug!("rpc client: done channel closed, dropping reply for seq {}", call.seq);
                }
            },
        }
    }
}

/// Entry of the call registry.
///
/// Completing consumes the entry, so a call can only be signaled once.
pub(crate) trait PendingCall: Send {
    /// Records the sequence number chosen by the registry.
    fn assign(&mut self, seq: u64);

    /// Decodes the reply body, or records the error, and signals the caller.
    fn complete(self: Box<Self>, outcome: Result<&[u8], RpcError>);
}

pub(crate) struct Pending<R> {
    seq: u64,
    service_method: String,
    codec_type: CodecType,
    done: Done<R>,
}

impl<R> Pending<R> {
    pub(crate) fn new(service_method: &str, codec_type: CodecType, done: Done<R>) -> Self {
        Self { seq: 0, service_method: service_method.to_string(), codec_type, done }
    }
}

impl<R: DeserializeOwned + Send + 'static> PendingCall for Pending<R> {
    fn assign(&mut self, seq: u64) {
        self.seq = seq;
    }

    fn complete(self: Box<Self>, outcome: Result<&[u8], RpcError>) {
        let Pending { seq, service_method, codec_type, done } = *self;
        let result = outcome.and_then(|body| {
            codec_type
                .decode_body::<R>(body)
                .map_err(|e| RpcError::Decode(format!("read body: {e}")))
        });
        done.deliver(Call { seq, service_method, result });
    }
}

/// Handle of a call in flight; resolves to the finished [`Call`].
#[derive(Debug)]
pub struct AsyncCall<R> {
    seq: u64,
    service_method: String,
    rx: oneshot::Receiver<Call<R>>,
}

impl<R> AsyncCall<R> {
    pub(crate) fn new(seq: u64, service_method: &str, rx: oneshot::Receiver<Call<R>>) -> Self {
        Self { seq, service_method: service_method.to_string(), rx }
    }

    /// Sequence number of the request, 0 if it was never registered.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }
}

impl<R> Future for AsyncCall<R> {
    type Output = Call<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(call)) => Poll::Ready(call),
            // the client went away with the call still registered
            Poll::Ready(Err(_)) => Poll::Ready(Call {
                seq: this.seq,
                service_method: std::mem::take(&mut this.service_method),
                result: Err(RpcError::ConnectionClosed),
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}
