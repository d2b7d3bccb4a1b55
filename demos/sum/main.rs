use seqrpc::tcp::{RpcTcp, RpcTcpListener};
use seqrpc::{Client, Service, Services};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Args {
    num1: i64,
    num2: i64,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let mut services = Services::new();
    services.register(Service::new("Foo").method("Sum", |args: Args| async move {
        Ok::<_, String>(args.num1 + args.num2)
    }))?;

    let listener = RpcTcpListener::bind("127.0.0.1:0", services).await?;
    let port = listener.get_listen_port();
    tokio::spawn(async move { listener.handle_forever().await });

    let client = Client::dial(("127.0.0.1", port), None).await?;
    let calls = (0..5).map(|i| {
        let client = &client;
        async move {
            let args = Args { num1: i, num2: i * i };
            let reply: i64 = client.call("Foo.Sum", &args).await?;
            println!("{} + {} = {}", args.num1, args.num2, reply);
            Ok::<_, seqrpc::RpcError>(())
        }
    });
    for res in futures::future::join_all(calls).await {
        res?;
    }
    client.close().await?;
    Ok(())
}
