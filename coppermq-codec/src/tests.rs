use super::*;
use bytes::{Buf, BufMut, BytesMut};
use codec::{AMQPCodec, Frame};
use frame::{AMQPFrame, MethodFrameArgs};
use tokio_util::codec::{Decoder, Encoder};

fn encode_frame(frame: AMQPFrame) -> BytesMut {
    let mut encoder = AMQPCodec {};
    let mut buf = BytesMut::with_capacity(1024);

    encoder.encode(Frame::Frame(frame), &mut buf).unwrap();

    buf
}

fn decode_frame(buf: &mut BytesMut) -> AMQPFrame {
    let mut decoder = AMQPCodec {};

    match decoder.decode(buf).unwrap() {
        Some(Frame::Frame(frame)) => frame,
        other => panic!("expected a single frame, got {:?}", other),
    }
}

#[test]
fn encode_protocol_header_frame() {
    let mut buf = encode_frame(AMQPFrame::Header);

    let expected = b"AMQP\x00\x00\x09\x01";
    let mut current = [0u8; 8];

    buf.copy_to_slice(&mut current[..]);

    assert_eq!(expected, &current);
}

#[test]
fn encode_method_frame() {
    let args = frame::QueueBindArgs {
        queue_name: "queue".into(),
        exchange_name: "exchg".into(),
        routing_key: "key".into(),
        no_wait: false,
        args: None,
    };

    let buf = encode_frame(AMQPFrame::Method(
        0x0205,
        frame::QUEUE_BIND,
        MethodFrameArgs::QueueBind(args),
    ));

    let frame_header = b"\x01\x02\x05";
    let class_method = b"\x00\x32\x00\x14";

    let mut argbuf = BytesMut::with_capacity(256);
    argbuf.put(&class_method[..]);
    argbuf.put(&b"\x00\x00"[..]);
    argbuf.put(&b"\x05queue"[..]);
    argbuf.put(&b"\x05exchg"[..]);
    argbuf.put(&b"\x03key"[..]);
    argbuf.put(&b"\x00"[..]);
    argbuf.put(&b"\x00\x00\x00\x00"[..]);

    let mut expected = BytesMut::with_capacity(256);
    expected.put(&frame_header[..]);
    expected.put_u32(argbuf.len() as u32);
    expected.put(argbuf);
    expected.put_u8(0xCE);

    assert_eq!(expected, buf);
}

#[test]
fn method_frame_roundtrip() {
    let args = frame::BasicDeliverArgs::new("ctag-1", 42, "events").routing_key("audit");
    let mut buf = encode_frame(args.frame(9));

    match decode_frame(&mut buf) {
        AMQPFrame::Method(9, frame::BASIC_DELIVER, MethodFrameArgs::BasicDeliver(deliver)) => {
            assert_eq!(deliver.consumer_tag, "ctag-1");
            assert_eq!(deliver.delivery_tag, 42);
            assert!(!deliver.redelivered);
            assert_eq!(deliver.exchange_name, "events");
            assert_eq!(deliver.routing_key, "audit");
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn heartbeat_roundtrip() {
    let mut buf = encode_frame(frame::heartbeat());

    assert!(matches!(decode_frame(&mut buf), AMQPFrame::Heartbeat(0)));
    assert_eq!(buf.remaining(), 0);
}

#[test]
fn corrupted_frame_end_is_rejected() {
    let mut buf = encode_frame(frame::channel_open(1));
    let last = buf.len() - 1;
    buf[last] = 0xCD;

    let mut decoder = AMQPCodec {};
    let result = decoder.decode(&mut buf);

    assert!(result.is_err());
}

#[test]
fn unknown_frame_type_is_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(0x07);
    buf.put_u16(0);
    buf.put_u32(0);
    buf.put_u8(0xCE);

    let mut decoder = AMQPCodec {};

    assert!(decoder.decode(&mut buf).is_err());
}

#[test]
fn unknown_method_is_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(0x01);
    buf.put_u16(0);
    buf.put_u32(4);
    buf.put_u32(0x00FF00FF);
    buf.put_u8(0xCE);

    let mut decoder = AMQPCodec {};

    assert!(decoder.decode(&mut buf).is_err());
}

#[test]
fn partial_frame_is_not_consumed() {
    let full = encode_frame(frame::channel_open(1));
    let mut partial = BytesMut::from(&full[..full.len() - 3]);
    let partial_len = partial.len();

    let mut decoder = AMQPCodec {};

    assert!(matches!(decoder.decode(&mut partial), Ok(None)));
    assert_eq!(partial.len(), partial_len);
}

#[test]
fn content_header_properties_roundtrip() {
    let mut header = frame::ContentHeaderFrame {
        channel: 4,
        class_id: frame::BASIC_CLASS,
        body_size: 1024,
        ..Default::default()
    };
    header.with_content_type("application/json".to_string());
    header.with_delivery_mode(2);
    header.with_correlation_id("0000000000000001".to_string());
    header.with_reply_to("amq.gen-xyz".to_string());
    header.with_timestamp(1_600_000_000);

    let mut buf = encode_frame(header.frame());

    match decode_frame(&mut buf) {
        AMQPFrame::ContentHeader(h) => {
            assert_eq!(h.channel, 4);
            assert_eq!(h.class_id, frame::BASIC_CLASS);
            assert_eq!(h.body_size, 1024);
            assert_eq!(h.content_type.as_deref(), Some("application/json"));
            assert_eq!(h.delivery_mode, Some(2));
            assert_eq!(h.correlation_id.as_deref(), Some("0000000000000001"));
            assert_eq!(h.reply_to.as_deref(), Some("amq.gen-xyz"));
            assert_eq!(h.timestamp, Some(1_600_000_000));
            assert_eq!(h.content_encoding, None);
            assert_eq!(h.message_id, None);
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn content_body_roundtrip() {
    let body = frame::ContentBodyFrame {
        channel: 3,
        body: b"payload bytes".to_vec(),
    };

    let mut buf = encode_frame(body.frame());

    match decode_frame(&mut buf) {
        AMQPFrame::ContentBody(b) => {
            assert_eq!(b.channel, 3);
            assert_eq!(b.body, b"payload bytes");
        }
        other => panic!("unexpected frame {:?}", other),
    }
}
