use bytes::{BufMut, BytesMut};
use coppermq_codec::codec::{AMQPCodec, Frame};
use coppermq_codec::frame::{self, AMQPFieldValue, AMQPFrame, FieldTable, MethodFrameArgs};
use tokio_util::codec::{Decoder, Encoder};

fn roundtrip(frame: AMQPFrame) -> AMQPFrame {
    let mut codec = AMQPCodec {};
    let mut buf = BytesMut::with_capacity(4096);

    codec.encode(Frame::Frame(frame), &mut buf).unwrap();

    match codec.decode(&mut buf).unwrap() {
        Some(Frame::Frame(frame)) => frame,
        other => panic!("expected a single frame, got {:?}", other),
    }
}

fn sample_table() -> FieldTable {
    use AMQPFieldValue::*;

    let mut nested = frame::FieldTable::new();
    nested.insert("depth".to_string(), Uint8(2));

    let mut table = frame::FieldTable::new();
    table.insert("bool".to_string(), Bool(true));
    table.insert("i8".to_string(), Int8(-8));
    table.insert("u8".to_string(), Uint8(8));
    table.insert("i16".to_string(), Int16(-16));
    table.insert("u16".to_string(), Uint16(16));
    table.insert("i32".to_string(), Int32(-32));
    table.insert("u32".to_string(), Uint32(32));
    table.insert("i64".to_string(), Int64(-64));
    table.insert("u64-max".to_string(), Uint64(u64::MAX));
    table.insert("zero".to_string(), Uint64(0));
    table.insert("float".to_string(), Float(3.5));
    table.insert("double".to_string(), Double(-0.25));
    table.insert("decimal".to_string(), Decimal(2, 12345));
    table.insert("sstr".to_string(), SimpleString("short".to_string()));
    table.insert("lstr".to_string(), LongString("long string value".to_string()));
    table.insert("empty".to_string(), LongString(String::new()));
    table.insert("max-sstr".to_string(), SimpleString("x".repeat(255)));
    table.insert("ts".to_string(), Timestamp(1_600_000_000));
    table.insert("void".to_string(), Void);
    table.insert(
        "array".to_string(),
        FieldArray(vec![Int32(1), LongString("two".to_string()), AMQPFieldValue::FieldTable(Box::new(nested.clone()))]),
    );
    table.insert("table".to_string(), AMQPFieldValue::FieldTable(Box::new(nested)));

    table
}

#[test]
fn field_table_roundtrip_all_value_tags() {
    let table = sample_table();

    let args = frame::QueueDeclareArgs {
        name: "tagged".to_string(),
        args: Some(table.clone()),
        ..Default::default()
    };

    match roundtrip(args.frame(7)) {
        AMQPFrame::Method(7, frame::QUEUE_DECLARE, MethodFrameArgs::QueueDeclare(decoded)) => {
            assert_eq!(decoded.name, "tagged");
            assert_eq!(decoded.args, Some(table));
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn empty_field_table_decodes_to_none() {
    let args = frame::QueueDeclareArgs {
        name: "plain".to_string(),
        args: None,
        ..Default::default()
    };

    match roundtrip(args.frame(1)) {
        AMQPFrame::Method(1, frame::QUEUE_DECLARE, MethodFrameArgs::QueueDeclare(decoded)) => {
            assert_eq!(decoded.args, None);
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn connection_start_ok_roundtrip() {
    let mut caps = FieldTable::new();
    caps.insert("publisher_confirms".to_string(), AMQPFieldValue::Bool(true));

    match roundtrip(frame::connection_start_ok("guest", "secret", caps)) {
        AMQPFrame::Method(0, frame::CONNECTION_START_OK, MethodFrameArgs::ConnectionStartOk(args)) => {
            assert_eq!(args.mechanism, "PLAIN");
            assert_eq!(args.response, "\u{0}guest\u{0}secret");
            assert_eq!(args.locale, "en_US");

            let props = args.properties.unwrap();
            assert!(matches!(props.get("capabilities"), Some(AMQPFieldValue::FieldTable(_))));
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn decode_connection_tune_from_raw_bytes() {
    let mut buf = BytesMut::new();
    buf.put_u8(0x01);
    buf.put_u16(0);
    buf.put_u32(12);
    buf.put_u32(frame::CONNECTION_TUNE);
    buf.put_u16(2047);
    buf.put_u32(131_072);
    buf.put_u16(60);
    buf.put_u8(0xCE);

    let mut codec = AMQPCodec {};

    match codec.decode(&mut buf).unwrap() {
        Some(Frame::Frame(AMQPFrame::Method(0, frame::CONNECTION_TUNE, MethodFrameArgs::ConnectionTune(tune)))) => {
            assert_eq!(tune.channel_max, 2047);
            assert_eq!(tune.frame_max, 131_072);
            assert_eq!(tune.heartbeat, 60);
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn unknown_value_tag_is_an_error() {
    // queue.declare with an arguments table holding a bogus type tag 'Z'
    let mut table_buf = BytesMut::new();
    table_buf.put_u8(3);
    table_buf.put(&b"key"[..]);
    table_buf.put_u8(b'Z');

    let mut payload = BytesMut::new();
    payload.put_u32(frame::QUEUE_DECLARE);
    payload.put_u16(0);
    payload.put_u8(1);
    payload.put(&b"q"[..]);
    payload.put_u8(0);
    payload.put_u32(table_buf.len() as u32);
    payload.put(table_buf);

    let mut buf = BytesMut::new();
    buf.put_u8(0x01);
    buf.put_u16(1);
    buf.put_u32(payload.len() as u32);
    buf.put(payload);
    buf.put_u8(0xCE);

    let mut codec = AMQPCodec {};

    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn method_pair_ids_are_packed_class_and_method() {
    assert_eq!(frame::split_class_method(frame::QUEUE_DECLARE), (0x32, 0x0A));
    assert_eq!(frame::unify_class_method(0x3C, 0x50), frame::BASIC_ACK);
    assert_eq!(frame::method_name(frame::BASIC_ACK), "basic.ack");
    assert_eq!(frame::method_name(0x00FF00FF), "<unknown>");
}
