use std::sync::Arc;
use std::time::{Duration, Instant};

use kameo::Actor;
use kameo::prelude::ActorRef;
use rtm_client::testing::{
    MockServer, MockSession, MockTransport, RecordingErrorSink, RecordingMetrics,
};
use rtm_client::{
    ClientStats, GetClientStats, RtmClient, RtmClientArgs, RtmConfig, Start, WsFrame,
};

type TestClient = ActorRef<RtmClient<MockTransport>>;

async fn started_client(
    metrics: Arc<RecordingMetrics>,
) -> (TestClient, MockSession, MockServer) {
    let (transport, mut server) = MockTransport::channel_pair();
    let client = RtmClient::spawn(RtmClientArgs {
        config: RtmConfig::new("mock.rtm", 443, "appkey")
            .with_ping_interval(Duration::from_millis(25)),
        transport,
        error_sink: Arc::new(RecordingErrorSink::default()),
        metrics: Some(metrics),
    });
    client.ask(Start).await.expect("start");
    let session = server.accept().await.expect("session");
    (client, session, server)
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
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn ping_payload(frame: &WsFrame) -> String {
    match frame {
        WsFrame::Ping(payload) => String::from_utf8(payload.to_vec()).expect("utf-8 nonce"),
        other => panic!("expected ping frame, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_pong_measures_round_trip() {
    let metrics = Arc::new(RecordingMetrics::default());
    let (client, mut session, _server) = started_client(metrics.clone()).await;

    let frame = session.recv_outbound().await.expect("ping frame");
    let nonce = ping_payload(&frame);
    // First request id issued on this connection becomes the nonce.
    assert_eq!(nonce, "1");

    assert!(session.send_pong(&nonce));

    let stats = wait_for_stats(
        &client,
        |stats| stats.ping_rtt.samples >= 1,
        Duration::from_secs(1),
    )
    .await;
    assert!(stats.ping_rtt.samples >= 1);

    let rtts = metrics.ping_rtts();
    assert_eq!(rtts.len(), 1);
    assert!(rtts[0] < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_completion_rearms_the_timer() {
    let metrics = Arc::new(RecordingMetrics::default());
    let (client, mut session, _server) = started_client(metrics.clone()).await;

    let first = ping_payload(&session.recv_outbound().await.expect("first ping"));
    assert!(session.send_pong(&first));

    // A second ping proves the one-shot timer was re-armed by the first
    // ping's completion, with a fresh monotonic nonce.
    let second = ping_payload(&session.recv_outbound().await.expect("second ping"));
    assert!(second.parse::<u64>().expect("nonce") > first.parse::<u64>().expect("nonce"));
    assert!(session.send_pong(&second));

    wait_for_stats(
        &client,
        |stats| stats.ping_rtt.samples >= 2,
        Duration::from_secs(1),
    )
    .await;
}
