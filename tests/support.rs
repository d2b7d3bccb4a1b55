#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{BufReader, DuplexStream, ReadHalf, WriteHalf};

use seqrpc::protocol::codec::{CodecReader, CodecType, CodecWriter};
use seqrpc::protocol::handshake;
use seqrpc::{Client, Options, Server, Service, Services};

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Args {
    pub num1: i64,
    pub num2: i64,
}

/// `Foo` service used across the tests.
pub fn foo_service() -> Service {
    Service::new("Foo")
        .method("Sum", |args: Args| async move { Ok::<_, String>(args.num1 + args.num2) })
        .method("Echo", |s: String| async move { Ok::<_, String>(s) })
        .method("Sleep", |ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, String>(ms)
        })
        .method("Fail", |msg: String| async move { Err::<(), _>(msg) })
}

pub fn foo_services() -> Services {
    let mut services = Services::new();
    services.register(foo_service()).expect("register Foo");
    services
}

/// Serves `server` on one end of an in-memory pipe and connects a client to
/// the other end.
pub async fn connect(server: Server, codec_type: CodecType) -> Client {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let _ = server.serve_conn(server_end).await;
    });
    Client::new(client_end, Options::new(codec_type)).await.expect("client handshake")
}

pub type FakeReader = CodecReader<BufReader<ReadHalf<DuplexStream>>>;
pub type FakeWriter = CodecWriter<WriteHalf<DuplexStream>>;

/// Scripted server end: reads the handshake and hands back the codec halves
/// so the test decides what gets answered and when.
pub async fn fake_server(stream: DuplexStream) -> (FakeReader, FakeWriter) {
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let opt = handshake::read_options(&mut reader).await.expect("read options");
    (CodecReader::new(opt.codec_type, reader), CodecWriter::new(opt.codec_type, writer))
}

/// Client connected to a [`fake_server`].
pub async fn fake_pair(codec_type: CodecType) -> (Client, FakeReader, FakeWriter) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let client = Client::new(client_end, Options::new(codec_type)).await.expect("client handshake");
    let (reader, writer) = fake_server(server_end).await;
    (client, reader, writer)
}
