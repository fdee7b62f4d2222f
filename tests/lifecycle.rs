use std::sync::Arc;
use std::time::{Duration, Instant};

use kameo::Actor;
use kameo::error::SendError;
use kameo::prelude::ActorRef;
use rtm_client::testing::{
    CollectingSubscriptionSink, MockSession, MockTransport, RecordingErrorSink,
    RecordingRequestSink,
};
use rtm_client::{
    ClientState, ClientStats, GetClientStats, Publish, RtmClient, RtmClientArgs, RtmConfig,
    RtmError, Start, Stop, Subscribe, SubscriptionHandle,
};
use sonic_rs::json;

type TestClient = ActorRef<RtmClient<MockTransport>>;

fn test_config() -> RtmConfig {
    RtmConfig::new("mock.rtm", 443, "appkey").with_ping_interval(Duration::from_secs(30))
}

fn spawn_client(transport: MockTransport, error_sink: Arc<RecordingErrorSink>) -> TestClient {
    RtmClient::spawn(RtmClientArgs {
        config: test_config(),
        transport,
        error_sink,
        metrics: None,
    })
}

async fn wait_for_stats(
    client: &TestClient,
    predicate: impl Fn(&ClientStats) -> bool,
    timeout: Duration,
) -> ClientStats {
    let deadline = Instant::now() + timeout;
    loop {
        let stats = client.ask(GetClientStats).await.expect("stats");
        if predicate(&stats) {
            return stats;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for stats, last: {stats:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upgrade_parameters_follow_the_encoding() {
    let (transport, mut server) = MockTransport::channel_pair();
    let client = spawn_client(transport, Arc::new(RecordingErrorSink::default()));
    client.ask(Start).await.expect("start");

    let session = server.accept().await.expect("session");
    assert_eq!(session.params.url, "wss://mock.rtm:443/v2?appkey=appkey");
    assert_eq!(session.params.subprotocol, None);
    assert_eq!(session.params.read_message_limit, 100_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn binary_encoding_selects_cbor_upgrade_and_frames() {
    use rtm_client::core::codec;
    use rtm_client::{WireEncoding, WsFrame};

    let (transport, mut server) = MockTransport::channel_pair();
    let client = RtmClient::spawn(RtmClientArgs {
        config: test_config().with_encoding(WireEncoding::Cbor),
        transport,
        error_sink: Arc::new(RecordingErrorSink::default()),
        metrics: None,
    });
    client.ask(Start).await.expect("start");
    let mut session = server.accept().await.expect("session");
    assert_eq!(session.params.subprotocol, Some("cbor"));

    client
        .tell(Publish {
            channel: "t".to_string(),
            message: json!({"k": 3}),
            callbacks: None,
        })
        .send()
        .await
        .expect("publish accepted");

    let frame = session.recv_outbound().await.expect("outbound frame");
    let WsFrame::Binary(bytes) = frame else {
        panic!("binary encoding must set the binary frame bit");
    };
    assert_eq!(
        codec::decode(WireEncoding::Cbor, bytes.as_ref()).expect("cbor pdu"),
        json!({"action": "rtm/publish", "id": 1, "body": {"channel": "t", "message": {"k": 3}}})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_clears_every_table() {
    let (transport, mut server) = MockTransport::channel_pair();
    let client = spawn_client(transport, Arc::new(RecordingErrorSink::default()));
    client.ask(Start).await.expect("start");
    let mut session: MockSession = server.accept().await.expect("session");

    let requests = Arc::new(RecordingRequestSink::default());
    client
        .tell(Subscribe {
            channel: "t".to_string(),
            handle: SubscriptionHandle::new(),
            data_sink: Arc::new(CollectingSubscriptionSink::default()),
            callbacks: None,
            options: None,
        })
        .send()
        .await
        .expect("subscribe accepted");
    client
        .tell(Publish {
            channel: "t".to_string(),
            message: json!(1),
            callbacks: Some(requests.clone()),
        })
        .send()
        .await
        .expect("publish accepted");

    // Both writes reach the wire; their terminals never arrive.
    let _ = session.recv_outbound().await.expect("subscribe frame");
    let _ = session.recv_outbound().await.expect("publish frame");

    client.ask(Stop).await.expect("stop");

    let stats = wait_for_stats(
        &client,
        |stats| stats.state == ClientState::Stopped,
        Duration::from_secs(1),
    )
    .await;
    assert_eq!(stats.pending_requests, 0);
    assert_eq!(stats.subscriptions, 0);
    assert_eq!(stats.pings_outstanding, 0);

    // The dangling publish observed a transport-level completion.
    assert_eq!(requests.ok_count(), 0);
    let errors = requests.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RtmError::Transport { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_connect_leaves_the_client_stopped() {
    let (transport, _server) = MockTransport::channel_pair();
    transport.set_failing(true);
    let client = spawn_client(transport, Arc::new(RecordingErrorSink::default()));

    let result = client.ask(Start).await;
    match result {
        Err(SendError::HandlerError(RtmError::Transport { context, .. })) => {
            assert_eq!(context, "connect");
        }
        _ => panic!("expected a transport error from start"),
    }

    let stats = client.ask(GetClientStats).await.expect("stats");
    assert_eq!(stats.state, ClientState::Stopped);
    assert_eq!(stats.pending_requests, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_again_after_a_failed_attempt() {
    let (transport, mut server) = MockTransport::channel_pair();
    transport.set_failing(true);
    let client = spawn_client(transport.clone(), Arc::new(RecordingErrorSink::default()));

    assert!(client.ask(Start).await.is_err());

    transport.set_failing(false);
    client.ask(Start).await.expect("second start");
    let _session = server.accept().await.expect("session");

    let stats = client.ask(GetClientStats).await.expect("stats");
    assert_eq!(stats.state, ClientState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_close_surfaces_a_transport_error() {
    let (transport, mut server) = MockTransport::channel_pair();
    let errors = Arc::new(RecordingErrorSink::default());
    let client = spawn_client(transport, errors.clone());
    client.ask(Start).await.expect("start");
    let mut session = server.accept().await.expect("session");

    session.drop_socket();

    let deadline = Instant::now() + Duration::from_secs(1);
    while errors.errors().is_empty() {
        assert!(Instant::now() < deadline, "error never surfaced");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let reported = errors.errors();
    assert_eq!(reported.len(), 1);
    assert!(matches!(reported[0], RtmError::Transport { context: "read", .. }));

    // Retrying is the resilient layer's job; this client stays put.
    let stats = client.ask(GetClientStats).await.expect("stats");
    assert_eq!(stats.state, ClientState::Running);
}
