use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sonic_rs::json;

use rtm_client::WireEncoding;
use rtm_client::core::{codec, pdu};

fn representative_pdu() -> sonic_rs::Value {
    // Payload shaped like a typical telemetry publish.
    pdu::publish(
        12345,
        "analysis/frames",
        json!({
            "source": "camera-7",
            "ts": 1700000000000_u64,
            "detections": [
                {"label": "person", "score": 0.97, "box": [10, 20, 110, 220]},
                {"label": "bicycle", "score": 0.81, "box": [300, 40, 420, 260]},
            ],
        }),
    )
}

fn bench_encode_decode(c: &mut Criterion) {
    let pdu = representative_pdu();
    let json_bytes = codec::encode(WireEncoding::Json, &pdu).expect("encode json");
    let cbor_bytes = codec::encode(WireEncoding::Cbor, &pdu).expect("encode cbor");

    c.bench_function("encode_publish_json", |b| {
        b.iter(|| codec::encode(WireEncoding::Json, black_box(&pdu)).unwrap())
    });

    c.bench_function("encode_publish_cbor", |b| {
        b.iter(|| codec::encode(WireEncoding::Cbor, black_box(&pdu)).unwrap())
    });

    c.bench_function("decode_publish_json", |b| {
        b.iter(|| codec::decode(WireEncoding::Json, black_box(json_bytes.as_ref())).unwrap())
    });

    c.bench_function("decode_publish_cbor", |b| {
        b.iter(|| codec::decode(WireEncoding::Cbor, black_box(cbor_bytes.as_ref())).unwrap())
    });
}

criterion_group!(benches, bench_encode_decode);
criterion_main!(benches);
