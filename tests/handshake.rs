use tokio::io::AsyncReadExt;

use seqrpc::protocol::codec::CodecType;
use seqrpc::protocol::handshake::{read_options, write_options, Options, MAGIC_NUMBER};
use seqrpc::RpcError;

#[tokio::test]
async fn writes_one_json_line() {
    let mut buf = Vec::new();
    write_options(&mut buf, &Options::default()).await.expect("write options");
    assert_eq!(buf, b"{\"MagicNumber\":3927900,\"CodecType\":\"application/json\"}\n");
    assert_eq!(MAGIC_NUMBER, 3927900);
}

#[tokio::test]
async fn reads_options_and_leaves_the_rest() {
    let mut buf = Vec::new();
    write_options(&mut buf, &Options::new(CodecType::MsgPack)).await.expect("write options");
    buf.extend_from_slice(b"next");

    let mut input = buf.as_slice();
    let opt = read_options(&mut input).await.expect("read options");
    assert_eq!(opt, Options::new(CodecType::MsgPack));

    let mut rest = Vec::new();
    input.read_to_end(&mut rest).await.expect("read rest");
    assert_eq!(rest, b"next");
}

async fn rejection(line: &[u8]) -> RpcError {
    let mut input = line;
    read_options(&mut input).await.expect_err("options must be rejected")
}

#[tokio::test]
async fn rejects_bad_options() {
    let cases: [&[u8]; 4] = [
        b"{\"MagicNumber\":1,\"CodecType\":\"application/json\"}\n",
        b"{\"MagicNumber\":3927900,\"CodecType\":\"application/xml\"}\n",
        b"{\"MagicNumber\":3927900\n",
        b"{\"MagicNumber\":3927900,\"CodecType\":\"application/json\"}",
    ];
    for line in cases {
        let err = rejection(line).await;
        assert!(
            matches!(err, RpcError::HandshakeRejected(_)),
            "{:?}: unexpected error {err:?}",
            String::from_utf8_lossy(line)
        );
    }
}

#[tokio::test]
async fn empty_stream_is_closed_connection() {
    assert_eq!(rejection(b"").await, RpcError::ConnectionClosed);
}
