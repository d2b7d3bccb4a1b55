use std::collections::{HashMap, HashSet};
use std::sync::Arc;

mod support;

use tokio::sync::mpsc;
use tokio::time::timeout;

use seqrpc::protocol::codec::{CodecType, Header};
use seqrpc::{Call, Client, Options, RpcError, Server};

use support::{fake_pair, TIMEOUT};

#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let (client, mut reader, mut writer) = fake_pair(CodecType::Json).await;

    let mut calls = Vec::new();
    for i in 1..=5_i64 {
        calls.push(client.go::<_, i64>("Foo.Echo", &i).await);
    }

    let mut requests = HashMap::new();
    for _ in 0..5 {
        let header = reader.read_header().await.expect("read header");
        let value: i64 = reader.read_body().await.expect("read body");
        requests.insert(header.seq, (header, value));
    }
    for seq in [5, 3, 1, 4, 2] {
        let (header, value) = &requests[&seq];
        writer.write(header, &(value * 10)).await.expect("write response");
    }

    for (i, call) in calls.into_iter().enumerate() {
        let call = timeout(TIMEOUT, call).await.expect("call timeout");
        assert_eq!(call.seq, i as u64 + 1);
        assert_eq!(call.service_method, "Foo.Echo");
        assert_eq!(call.into_result().expect("call result"), (i as i64 + 1) * 10);
    }
}

#[tokio::test]
async fn concurrent_calls_get_increasing_sequence_numbers() {
    let (client, mut reader, _writer) = fake_pair(CodecType::MsgPack).await;
    let client = Arc::new(client);

    let mut tasks = Vec::new();
    for i in 0..20_u64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.go::<_, u64>("Foo.Echo", &i).await.seq() }));
    }
    let mut seqs = HashSet::new();
    for task in tasks {
        seqs.insert(task.await.expect("join"));
    }
    assert_eq!(seqs, (1..=20).collect::<HashSet<u64>>());

    let mut last = 0;
    for _ in 0..20 {
        let header = reader.read_header().await.expect("read header");
        reader.discard_body().await.expect("discard body");
        assert!(header.seq > last, "seq {} written after {}", header.seq, last);
        last = header.seq;
    }
}

#[tokio::test]
async fn server_error_fails_only_that_call() {
    let (client, mut reader, mut writer) = fake_pair(CodecType::Json).await;

    let failing = client.go::<_, i64>("Foo.Echo", &1).await;
    let header = reader.read_header().await.expect("read header");
    reader.discard_body().await.expect("discard body");
    let reply = Header { error: "boom".to_string(), ..header };
    writer.write(&reply, &serde_json::json!({})).await.expect("write response");

    let call = timeout(TIMEOUT, failing).await.expect("call timeout");
    assert_eq!(call.error(), Some(&RpcError::Dispatch("boom".to_string())));

    let ok = client.go::<_, i64>("Foo.Echo", &2).await;
    let header = reader.read_header().await.expect("read header");
    let value: i64 = reader.read_body().await.expect("read body");
    writer.write(&header, &value).await.expect("write response");
    let call = timeout(TIMEOUT, ok).await.expect("call timeout");
    assert_eq!(call.into_result(), Ok(2));
    assert!(client.is_available());
}

#[tokio::test]
async fn undecodable_reply_fails_only_that_call() {
    let (client, mut reader, mut writer) = fake_pair(CodecType::Json).await;

    let first = client.go::<_, i64>("Foo.Echo", &1).await;
    let second = client.go::<_, i64>("Foo.Echo", &2).await;
    let first_header = reader.read_header().await.expect("read header");
    reader.discard_body().await.expect("discard body");
    let second_header = reader.read_header().await.expect("read header");
    reader.discard_body().await.expect("discard body");

    writer.write(&first_header, "not a number").await.expect("write response");
    writer.write(&second_header, &2_i64).await.expect("write response");

    let call = timeout(TIMEOUT, first).await.expect("call timeout");
    match call.error() {
        Some(RpcError::Decode(msg)) => assert!(msg.starts_with("read body"), "{msg}"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let call = timeout(TIMEOUT, second).await.expect("call timeout");
    assert_eq!(call.into_result(), Ok(2));
}

#[tokio::test]
async fn response_for_unknown_seq_is_skipped() {
    let (client, mut reader, mut writer) = fake_pair(CodecType::MsgPack).await;

    let pending = client.go::<_, String>("Foo.Echo", "hi").await;
    let header = reader.read_header().await.expect("read header");
    let value: String = reader.read_body().await.expect("read body");

    let stray = Header { seq: 99, ..header.clone() };
    writer.write(&stray, "stray").await.expect("write stray response");
    writer.write(&header, &value).await.expect("write response");

    let call = timeout(TIMEOUT, pending).await.expect("call timeout");
    assert_eq!(call.into_result(), Ok("hi".to_string()));
}

#[tokio::test]
async fn connection_loss_terminates_pending_calls() {
    let (client, mut reader, writer) = fake_pair(CodecType::Json).await;

    let first = client.go::<_, i64>("Foo.Echo", &1).await;
    let second = client.go::<_, i64>("Foo.Echo", &2).await;
    for _ in 0..2 {
        reader.read_header().await.expect("read header");
        reader.discard_body().await.expect("discard body");
    }
    drop(reader);
    drop(writer);

    for pending in [first, second] {
        let call = timeout(TIMEOUT, pending).await.expect("call timeout");
        assert_eq!(call.error(), Some(&RpcError::ConnectionClosed));
    }
    assert!(!client.is_available());

    let call = client.go::<_, i64>("Foo.Echo", &3).await;
    assert_eq!(call.seq(), 0);
    let call = timeout(TIMEOUT, call).await.expect("call timeout");
    assert_eq!(call.error(), Some(&RpcError::Shutdown));
}

#[tokio::test]
async fn close_twice_reports_shutdown() {
    let client = support::connect(Server::new(support::foo_services()), CodecType::Json).await;
    assert!(client.is_available());

    client.close().await.expect("first close");
    assert!(!client.is_available());
    assert_eq!(client.close().await, Err(RpcError::Shutdown));

    let res = client.call::<_, i64>("Foo.Echo", &1).await;
    assert_eq!(res, Err(RpcError::Shutdown));
}

#[tokio::test]
async fn close_waits_for_in_flight_replies() {
    let client = support::connect(Server::new(support::foo_services()), CodecType::Json).await;

    let pending = client.go::<_, u64>("Foo.Sleep", &50).await;
    client.close().await.expect("close");

    let call = timeout(TIMEOUT, pending).await.expect("call timeout");
    assert_eq!(call.into_result(), Ok(50));
}

#[tokio::test]
async fn replies_delivered_on_shared_channel() {
    let client = support::connect(Server::new(support::foo_services()), CodecType::MsgPack).await;

    // smaller than the number of calls: delivery must not stall the client
    let (tx, mut rx) = mpsc::channel::<Call<i64>>(1);
    let mut seqs = HashSet::new();
    for i in 0..4_i64 {
        let args = support::Args { num1: i, num2: 1 };
        seqs.insert(client.go_with("Foo.Sum", &args, tx.clone()).await);
    }
    drop(tx);

    let mut got = HashSet::new();
    while let Some(call) = timeout(TIMEOUT, rx.recv()).await.expect("recv timeout") {
        let seq = call.seq;
        let sum = call.into_result().expect("call result");
        assert_eq!(sum, seq as i64);
        got.insert(seq);
    }
    assert_eq!(got, seqs);
}

#[tokio::test]
async fn unencodable_argument_fails_the_call_and_the_connection() {
    let client = support::connect(Server::new(support::foo_services()), CodecType::Json).await;

    // JSON object keys must be strings
    let args: HashMap<(i32, i32), i32> = HashMap::from([((1, 2), 3)]);
    let call = client.go::<_, i64>("Foo.Echo", &args).await;
    assert_eq!(call.seq(), 1);
    let call = timeout(TIMEOUT, call).await.expect("call timeout");
    match call.error() {
        Some(RpcError::Encode(msg)) => assert!(msg.contains("key must be a string"), "{msg}"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let res = timeout(TIMEOUT, client.call::<_, i64>("Foo.Echo", &1))
        .await
        .expect("call timeout");
    assert!(
        matches!(res, Err(RpcError::ConnectionClosed) | Err(RpcError::Shutdown)),
        "unexpected outcome: {res:?}"
    );

    timeout(TIMEOUT, async {
        while client.is_available() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client still available");
}

#[tokio::test]
async fn closed_client_refuses_calls_behind_a_stuck_write() {
    let (client_end, server_end) = tokio::io::duplex(256);
    let client =
        Arc::new(Client::new(client_end, Options::default()).await.expect("client handshake"));
    // reads the handshake, then never reads again
    let (_reader, _writer) = support::fake_server(server_end).await;

    let stuck = client.clone();
    tokio::spawn(async move {
        let big = "x".repeat(64 * 1024);
        stuck.go::<_, String>("Foo.Echo", big.as_str()).await
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let closing = client.clone();
    tokio::spawn(async move { closing.close().await });
    timeout(TIMEOUT, async {
        while client.is_available() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client still available");

    let call = timeout(TIMEOUT, client.go::<_, i64>("Foo.Echo", &1))
        .await
        .expect("call waited for the send lock");
    assert_eq!(call.seq(), 0);
    let call = timeout(TIMEOUT, call).await.expect("call timeout");
    assert_eq!(call.error(), Some(&RpcError::Shutdown));
}
