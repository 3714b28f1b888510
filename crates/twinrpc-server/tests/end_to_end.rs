use anyhow::Result;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use twinrpc_client::{
    CallSpec, ClientError, HttpTransport, RpcClient, Transport,
};
use twinrpc_core::models::{ClientConfig, ServerConfig};
use twinrpc_core::{Protocol, Value};
use twinrpc_server::api;

struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(protocol: Protocol) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let config = ServerConfig {
            protocol,
            bind_addr: addr.to_string(),
            ..ServerConfig::default()
        };

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            if let Err(e) =
                twinrpc_server::serve(listener, &config, api::demo_capabilities(), shutdown).await
            {
                panic!("server failed: {}", e);
            }
        });

        Ok(Self {
            addr,
            stop: Some(stop),
            handle,
        })
    }

    fn url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

fn client_for(server: &TestServer, protocol: Protocol) -> Result<RpcClient> {
    let client = RpcClient::http(ClientConfig {
        url: server.url(),
        protocol,
        timeout_ms: 5_000,
        ..ClientConfig::default()
    })?;
    Ok(client)
}

type Collected = Arc<Mutex<Vec<(String, Value)>>>;

fn collector() -> Collected {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(into: &Collected) -> impl FnOnce(&twinrpc_client::CallContext, Value) + Send + 'static {
    let sink = into.clone();
    move |ctx, value| sink.lock().unwrap().push((ctx.method.clone(), value))
}

fn exceptions(client: &RpcClient) -> Arc<Mutex<Vec<ClientError>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.on_exception(move |exc| sink.lock().unwrap().push(exc.error.clone()));
    seen
}

#[tokio::test]
async fn test_json_rpc_batch_round_trip() -> Result<()> {
    let server = TestServer::start(Protocol::JsonRpc).await?;
    let client = client_for(&server, Protocol::JsonRpc)?;
    client.initialize().await;
    let errors = exceptions(&client);

    let results = collector();
    client
        .call(vec![
            CallSpec::new("saveFields")
                .named([
                    ("field1", Value::from("a")),
                    ("field2", Value::from("b")),
                    ("field3", Value::from("c")),
                ])
                .batch_order(1)
                .on_result(record(&results)),
            CallSpec::new("getFields")
                .batch_order(0)
                .on_result(record(&results)),
            CallSpec::new("echo")
                .positional(vec![Value::from("ignored")])
                .notification(),
        ])
        .await;
    client.settle().await;

    let results = results.lock().unwrap().clone();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "getFields");
    assert_eq!(results[0].1.get("field1"), Some(&Value::from("mimi")));
    assert_eq!(results[1].0, "saveFields");
    assert_eq!(
        results[1].1,
        Value::from("Hey dude! We are really got your fields: field1=[a]; field2=[b]; field3=[c]")
    );
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(client.pending_count().await, 0);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_method_raises_server_exception() -> Result<()> {
    let server = TestServer::start(Protocol::JsonRpc).await?;
    let client = client_for(&server, Protocol::JsonRpc)?;
    client.initialize().await;
    let errors = exceptions(&client);

    client.call_one(CallSpec::new("doesNotExist")).await;
    client.settle().await;

    let errors = errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ClientError::Server(error) => {
            assert_eq!(error.code.code(), -32601);
            assert_eq!(error.message, "Method [doesNotExist] not found");
            assert!(error.source.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_payload_level_errors_over_http() -> Result<()> {
    let server = TestServer::start(Protocol::JsonRpc).await?;
    let transport = HttpTransport::new(server.url(), Duration::from_secs(5))?;

    let reply = transport.send(Protocol::JsonRpc, "[]".to_string()).await?;
    let reply: serde_json::Value = serde_json::from_str(&reply)?;
    assert_eq!(reply["error"]["code"], -32600);
    assert!(reply["id"].is_null());

    let reply = transport
        .send(
            Protocol::JsonRpc,
            r#"{"jsonrpc":"2.0","method":"rpc.internal","id":5}"#.to_string(),
        )
        .await?;
    let reply: serde_json::Value = serde_json::from_str(&reply)?;
    assert_eq!(reply["error"]["code"], -32098);
    assert_eq!(reply["id"], 5);

    let reply = transport
        .send(
            Protocol::JsonRpc,
            r#"{"jsonrpc":"2.0","method":"saveFields","params":{"field1":"only"},"id":6}"#
                .to_string(),
        )
        .await?;
    let reply: serde_json::Value = serde_json::from_str(&reply)?;
    assert_eq!(reply["error"]["code"], -32602);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_xml_rpc_values_and_fault() -> Result<()> {
    let server = TestServer::start(Protocol::XmlRpc).await?;
    let client = client_for(&server, Protocol::XmlRpc)?;
    client.initialize().await;
    let errors = exceptions(&client);

    let stamp = chrono::DateTime::parse_from_rfc3339("2024-05-06T07:08:09Z")?.with_timezone(&chrono::Utc);
    let payload = Value::structure([
        ("when", Value::DateTime(stamp)),
        ("blob", Value::Bytes(vec![0, 1, 2, 255])),
        ("ratio", Value::Double(0.5)),
        ("items", Value::Array(vec![Value::Int(-3), Value::Nil])),
    ]);

    let results = collector();
    client
        .call(vec![
            CallSpec::new("echo")
                .positional(vec![payload.clone()])
                .on_result(record(&results)),
            CallSpec::new("fail").positional(vec![Value::from("boom")]),
        ])
        .await;
    client.settle().await;

    let results = results.lock().unwrap().clone();
    assert_eq!(results, vec![("echo".to_string(), payload)]);

    let errors = errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ClientError::Server(error) => assert_eq!(error.message, "boom"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client.pending_count().await, 0);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_xml_rpc_named_params() -> Result<()> {
    let server = TestServer::start(Protocol::XmlRpc).await?;
    let client = client_for(&server, Protocol::XmlRpc)?;
    client.initialize().await;
    let errors = exceptions(&client);

    let results = collector();
    client
        .call_one(
            CallSpec::new("saveFields")
                .named([
                    ("field3", Value::from("c")),
                    ("field1", Value::from("a")),
                    ("field2", Value::from("b")),
                ])
                .on_result(record(&results)),
        )
        .await;
    client.settle().await;

    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(
        results.lock().unwrap().clone(),
        vec![(
            "saveFields".to_string(),
            Value::from("Hey dude! We are really got your fields: field1=[a]; field2=[b]; field3=[c]")
        )]
    );

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_connection_refused_raises_exception() -> Result<()> {
    let server = TestServer::start(Protocol::JsonRpc).await?;
    let client = client_for(&server, Protocol::JsonRpc)?;
    server.stop().await;

    client.initialize().await;
    let errors = exceptions(&client);

    client.call_one(CallSpec::new("getFields")).await;
    client.settle().await;

    assert!(matches!(
        errors.lock().unwrap().as_slice(),
        [ClientError::Connection(_)]
    ));
    assert_eq!(client.pending_count().await, 0);
    Ok(())
}
