//! Encoder and decoder between AMQP frames and their wire form.
//!
//! Every frame is `type octet | channel short | length long | payload |
//! 0xCE`. Method payloads start with the packed class/method id, followed
//! by the method fields in specification order. The decoder consumes
//! nothing until a whole frame is buffered, and a frame whose trailing
//! octet is not `0xCE` is a framing error.
use crate::frame::*;
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

const FRAME_METHOD_FRAME: u8 = 0x01;
const FRAME_CONTENT_HEADER: u8 = 0x02;
const FRAME_CONTENT_BODY: u8 = 0x03;
const FRAME_HEARTBEAT: u8 = 0x08;
const FRAME_AMQP_VERSION: u8 = 0x41;

const FRAME_END: u8 = 0xCE;

pub struct AMQPCodec {}

#[derive(Debug)]
pub enum Frame {
    Frame(AMQPFrame),
    /// An ordered batch written out back to back, used for content
    /// sequences which must not interleave with other frames.
    Frames(Vec<AMQPFrame>),
}

impl Encoder<Frame> for AMQPCodec {
    type Error = io::Error;

    fn encode(&mut self, event: Frame, buf: &mut BytesMut) -> Result<(), Self::Error> {
        match event {
            Frame::Frame(frame) => encode_amqp_frame(buf, frame),
            Frame::Frames(frames) => {
                for frame in frames {
                    encode_amqp_frame(buf, frame);
                }
            }
        }

        Ok(())
    }
}

impl Decoder for AMQPCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 8 || !is_full_frame(src) {
            return Ok(None);
        }

        match src.get_u8() {
            FRAME_METHOD_FRAME => {
                let channel = src.get_u16();
                let frame_len = src.get_u32() as usize;

                let mut frame_buf = src.split_to(frame_len);
                let frame = decode_method_frame(&mut frame_buf, channel)?;

                expect_frame_end(src)?;

                Ok(Some(Frame::Frame(frame)))
            }
            FRAME_CONTENT_HEADER => {
                let channel = src.get_u16();
                let frame_len = src.get_u32() as usize;

                let mut frame_buf = src.split_to(frame_len);
                let frame = decode_content_header_frame(&mut frame_buf, channel)?;

                expect_frame_end(src)?;

                Ok(Some(Frame::Frame(frame)))
            }
            FRAME_CONTENT_BODY => {
                let channel = src.get_u16();
                let body_len = src.get_u32() as usize;
                let body = src.split_to(body_len).to_vec();

                expect_frame_end(src)?;

                Ok(Some(Frame::Frame(AMQPFrame::ContentBody(ContentBodyFrame {
                    channel,
                    body,
                }))))
            }
            FRAME_HEARTBEAT => {
                let channel = src.get_u16();
                let len = src.get_u32() as usize;
                let _ = src.split_to(len);

                expect_frame_end(src)?;

                Ok(Some(Frame::Frame(AMQPFrame::Heartbeat(channel))))
            }
            FRAME_AMQP_VERSION => {
                let mut head = [0u8; 7];
                src.copy_to_slice(&mut head);

                if head != *b"MQP\x00\x00\x09\x01" {
                    return Err(invalid_data(format!("unsupported protocol header {:?}", head)));
                }

                Ok(Some(Frame::Frame(AMQPFrame::Header)))
            }
            f => Err(invalid_data(format!("unknown frame type 0x{:02X}", f))),
        }
    }
}

/// Check if the buffer contains a full frame. All frame types except the
/// protocol header carry their payload length at a fixed offset.
fn is_full_frame(src: &BytesMut) -> bool {
    match src[0] {
        FRAME_AMQP_VERSION => src.len() >= 8,
        _ => {
            let mut bs = [0u8; 4];
            bs.copy_from_slice(&src[3..7]);

            let len = u32::from_be_bytes(bs) as usize;

            src.len() >= len + 8
        }
    }
}

fn expect_frame_end(src: &mut BytesMut) -> io::Result<()> {
    let eof = src.get_u8();

    if eof != FRAME_END {
        return Err(invalid_data(format!(
            "frame end octet is 0x{:02X}, expected 0x{:02X}",
            eof, FRAME_END
        )));
    }

    Ok(())
}

fn decode_method_frame(src: &mut BytesMut, channel: u16) -> io::Result<AMQPFrame> {
    let class_method = decode_u32(src)?;

    let args = match class_method {
        CONNECTION_START => decode_connection_start(src)?,
        CONNECTION_START_OK => decode_connection_start_ok(src)?,
        CONNECTION_SECURE => MethodFrameArgs::ConnectionSecure(ConnectionSecureArgs {
            challenge: decode_long_string(src)?,
        }),
        CONNECTION_SECURE_OK => MethodFrameArgs::ConnectionSecureOk(ConnectionSecureOkArgs {
            response: decode_long_string(src)?,
        }),
        CONNECTION_TUNE => decode_connection_tune(src)?,
        CONNECTION_TUNE_OK => decode_connection_tune_ok(src)?,
        CONNECTION_OPEN => decode_connection_open(src)?,
        CONNECTION_OPEN_OK => {
            let _known_hosts = decode_short_string(src)?;

            MethodFrameArgs::ConnectionOpenOk
        }
        CONNECTION_CLOSE => decode_connection_close(src)?,
        CONNECTION_CLOSE_OK => MethodFrameArgs::ConnectionCloseOk,
        CHANNEL_OPEN => {
            let _out_of_band = decode_short_string(src)?;

            MethodFrameArgs::ChannelOpen
        }
        CHANNEL_OPEN_OK => {
            let _channel_id = decode_long_string(src)?;

            MethodFrameArgs::ChannelOpenOk
        }
        CHANNEL_FLOW => MethodFrameArgs::ChannelFlow(ChannelFlowArgs {
            active: decode_u8(src)? != 0,
        }),
        CHANNEL_FLOW_OK => MethodFrameArgs::ChannelFlowOk(ChannelFlowArgs {
            active: decode_u8(src)? != 0,
        }),
        CHANNEL_CLOSE => decode_channel_close(src)?,
        CHANNEL_CLOSE_OK => MethodFrameArgs::ChannelCloseOk,
        EXCHANGE_DECLARE => decode_exchange_declare(src)?,
        EXCHANGE_DECLARE_OK => MethodFrameArgs::ExchangeDeclareOk,
        EXCHANGE_DELETE => decode_exchange_delete(src)?,
        EXCHANGE_DELETE_OK => MethodFrameArgs::ExchangeDeleteOk,
        QUEUE_DECLARE => decode_queue_declare(src)?,
        QUEUE_DECLARE_OK => decode_queue_declare_ok(src)?,
        QUEUE_BIND => decode_queue_bind(src)?,
        QUEUE_BIND_OK => MethodFrameArgs::QueueBindOk,
        QUEUE_PURGE => decode_queue_purge(src)?,
        QUEUE_PURGE_OK => MethodFrameArgs::QueuePurgeOk(QueuePurgeOkArgs {
            message_count: decode_u32(src)?,
        }),
        QUEUE_DELETE => decode_queue_delete(src)?,
        QUEUE_DELETE_OK => MethodFrameArgs::QueueDeleteOk(QueueDeleteOkArgs {
            message_count: decode_u32(src)?,
        }),
        QUEUE_UNBIND => decode_queue_unbind(src)?,
        QUEUE_UNBIND_OK => MethodFrameArgs::QueueUnbindOk,
        BASIC_QOS => decode_basic_qos(src)?,
        BASIC_QOS_OK => MethodFrameArgs::BasicQosOk,
        BASIC_CONSUME => decode_basic_consume(src)?,
        BASIC_CONSUME_OK => MethodFrameArgs::BasicConsumeOk(BasicConsumeOkArgs {
            consumer_tag: decode_short_string(src)?,
        }),
        BASIC_CANCEL => MethodFrameArgs::BasicCancel(BasicCancelArgs {
            consumer_tag: decode_short_string(src)?,
            no_wait: decode_u8(src)? != 0,
        }),
        BASIC_CANCEL_OK => MethodFrameArgs::BasicCancelOk(BasicCancelOkArgs {
            consumer_tag: decode_short_string(src)?,
        }),
        BASIC_PUBLISH => decode_basic_publish(src)?,
        BASIC_RETURN => decode_basic_return(src)?,
        BASIC_DELIVER => decode_basic_deliver(src)?,
        BASIC_GET => decode_basic_get(src)?,
        BASIC_GET_OK => decode_basic_get_ok(src)?,
        BASIC_GET_EMPTY => {
            let _cluster_id = decode_short_string(src)?;

            MethodFrameArgs::BasicGetEmpty
        }
        BASIC_ACK => MethodFrameArgs::BasicAck(BasicAckArgs {
            delivery_tag: decode_u64(src)?,
            multiple: decode_u8(src)? != 0,
        }),
        BASIC_REJECT => MethodFrameArgs::BasicReject(BasicRejectArgs {
            delivery_tag: decode_u64(src)?,
            requeue: decode_u8(src)? != 0,
        }),
        BASIC_RECOVER_ASYNC => MethodFrameArgs::BasicRecoverAsync(BasicRecoverArgs {
            requeue: decode_u8(src)? != 0,
        }),
        BASIC_RECOVER => MethodFrameArgs::BasicRecover(BasicRecoverArgs {
            requeue: decode_u8(src)? != 0,
        }),
        BASIC_RECOVER_OK => MethodFrameArgs::BasicRecoverOk,
        BASIC_NACK => decode_basic_nack(src)?,
        CONFIRM_SELECT => MethodFrameArgs::ConfirmSelect(ConfirmSelectArgs {
            no_wait: decode_u8(src)? != 0,
        }),
        CONFIRM_SELECT_OK => MethodFrameArgs::ConfirmSelectOk,
        cm => return Err(invalid_data(format!("unknown method 0x{:08X}", cm))),
    };

    Ok(AMQPFrame::Method(channel, class_method, args))
}

fn decode_connection_start(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionStart(ConnectionStartArgs {
        version_major: decode_u8(src)?,
        version_minor: decode_u8(src)?,
        properties: decode_field_table(src)?,
        mechanisms: decode_long_string(src)?,
        locales: decode_long_string(src)?,
    }))
}

fn decode_connection_start_ok(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionStartOk(ConnectionStartOkArgs {
        properties: decode_field_table(src)?,
        mechanism: decode_short_string(src)?,
        response: decode_long_string(src)?,
        locale: decode_short_string(src)?,
    }))
}

fn decode_connection_tune(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionTune(ConnectionTuneArgs {
        channel_max: decode_u16(src)?,
        frame_max: decode_u32(src)?,
        heartbeat: decode_u16(src)?,
    }))
}

fn decode_connection_tune_ok(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionTuneOk(ConnectionTuneOkArgs {
        channel_max: decode_u16(src)?,
        frame_max: decode_u32(src)?,
        heartbeat: decode_u16(src)?,
    }))
}

fn decode_connection_open(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let virtual_host = decode_short_string(src)?;
    let _reserved = decode_short_string(src)?;
    let flags = decode_u8(src)?;

    Ok(MethodFrameArgs::ConnectionOpen(ConnectionOpenArgs {
        virtual_host,
        insist: flags & 0x01 != 0,
    }))
}

fn decode_connection_close(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionClose(ConnectionCloseArgs {
        code: decode_u16(src)?,
        text: decode_short_string(src)?,
        class_id: decode_u16(src)?,
        method_id: decode_u16(src)?,
    }))
}

fn decode_channel_close(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ChannelClose(ChannelCloseArgs {
        code: decode_u16(src)?,
        text: decode_short_string(src)?,
        class_id: decode_u16(src)?,
        method_id: decode_u16(src)?,
    }))
}

fn decode_exchange_declare(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = ExchangeDeclareArgs::default();

    args.exchange_name = decode_short_string(src)?;
    args.exchange_type = decode_short_string(src)?;
    args.flags = ExchangeDeclareFlags::from_bits(decode_u8(src)?).unwrap_or_default();
    args.args = decode_field_table(src)?;

    Ok(MethodFrameArgs::ExchangeDeclare(args))
}

fn decode_exchange_delete(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = ExchangeDeleteArgs::default();

    args.exchange_name = decode_short_string(src)?;
    args.flags = ExchangeDeleteFlags::from_bits(decode_u8(src)?).unwrap_or_default();

    Ok(MethodFrameArgs::ExchangeDelete(args))
}

fn decode_queue_declare(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = QueueDeclareArgs::default();

    args.name = decode_short_string(src)?;
    args.flags = QueueDeclareFlags::from_bits(decode_u8(src)?).unwrap_or_default();
    args.args = decode_field_table(src)?;

    Ok(MethodFrameArgs::QueueDeclare(args))
}

fn decode_queue_declare_ok(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::QueueDeclareOk(QueueDeclareOkArgs {
        name: decode_short_string(src)?,
        message_count: decode_u32(src)?,
        consumer_count: decode_u32(src)?,
    }))
}

fn decode_queue_bind(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = QueueBindArgs::default();

    args.queue_name = decode_short_string(src)?;
    args.exchange_name = decode_short_string(src)?;
    args.routing_key = decode_short_string(src)?;
    args.no_wait = decode_u8(src)? != 0;
    args.args = decode_field_table(src)?;

    Ok(MethodFrameArgs::QueueBind(args))
}

fn decode_queue_purge(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;

    Ok(MethodFrameArgs::QueuePurge(QueuePurgeArgs {
        queue_name: decode_short_string(src)?,
        no_wait: decode_u8(src)? != 0,
    }))
}

fn decode_queue_delete(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = QueueDeleteArgs::default();

    args.queue_name = decode_short_string(src)?;
    args.flags = QueueDeleteFlags::from_bits(decode_u8(src)?).unwrap_or_default();

    Ok(MethodFrameArgs::QueueDelete(args))
}

fn decode_queue_unbind(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = QueueUnbindArgs::default();

    args.queue_name = decode_short_string(src)?;
    args.exchange_name = decode_short_string(src)?;
    args.routing_key = decode_short_string(src)?;
    args.args = decode_field_table(src)?;

    Ok(MethodFrameArgs::QueueUnbind(args))
}

fn decode_basic_qos(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::BasicQos(BasicQosArgs {
        prefetch_size: decode_u32(src)?,
        prefetch_count: decode_u16(src)?,
        global: decode_u8(src)? != 0,
    }))
}

fn decode_basic_consume(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = BasicConsumeArgs::default();

    args.queue = decode_short_string(src)?;
    args.consumer_tag = decode_short_string(src)?;
    args.flags = BasicConsumeFlags::from_bits(decode_u8(src)?).unwrap_or_default();
    args.args = decode_field_table(src)?;

    Ok(MethodFrameArgs::BasicConsume(args))
}

fn decode_basic_publish(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;
    let mut args = BasicPublishArgs::default();

    args.exchange_name = decode_short_string(src)?;
    args.routing_key = decode_short_string(src)?;
    args.flags = BasicPublishFlags::from_bits(decode_u8(src)?).unwrap_or_default();

    Ok(MethodFrameArgs::BasicPublish(args))
}

fn decode_basic_return(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::BasicReturn(BasicReturnArgs {
        reply_code: decode_u16(src)?,
        reply_text: decode_short_string(src)?,
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
    }))
}

fn decode_basic_deliver(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::BasicDeliver(BasicDeliverArgs {
        consumer_tag: decode_short_string(src)?,
        delivery_tag: decode_u64(src)?,
        redelivered: decode_u8(src)? != 0,
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
    }))
}

fn decode_basic_get(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    let _ticket = decode_u16(src)?;

    Ok(MethodFrameArgs::BasicGet(BasicGetArgs {
        queue: decode_short_string(src)?,
        no_ack: decode_u8(src)? != 0,
    }))
}

fn decode_basic_get_ok(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::BasicGetOk(BasicGetOkArgs {
        delivery_tag: decode_u64(src)?,
        redelivered: decode_u8(src)? != 0,
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
        message_count: decode_u32(src)?,
    }))
}

fn decode_basic_nack(src: &mut BytesMut) -> io::Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::BasicNack(BasicNackArgs {
        delivery_tag: decode_u64(src)?,
        flags: BasicNackFlags::from_bits(decode_u8(src)?).unwrap_or_default(),
    }))
}

fn decode_content_header_frame(src: &mut BytesMut, channel: u16) -> io::Result<AMQPFrame> {
    let mut header = ContentHeaderFrame {
        channel,
        class_id: decode_u16(src)?,
        weight: decode_u16(src)?,
        body_size: decode_u64(src)?,
        prop_flags: HeaderPropertyFlags::from_bits_truncate(decode_u16(src)?),
        ..Default::default()
    };

    // Properties are on the wire in spec order, highest flag bit first.
    if header.prop_flags.contains(HeaderPropertyFlags::CONTENT_TYPE) {
        header.content_type = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::CONTENT_ENCODING) {
        header.content_encoding = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::HEADERS) {
        header.headers = decode_field_table(src)?;
    }
    if header.prop_flags.contains(HeaderPropertyFlags::DELIVERY_MODE) {
        header.delivery_mode = Some(decode_u8(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::PRIORITY) {
        header.priority = Some(decode_u8(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::CORRELATION_ID) {
        header.correlation_id = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::REPLY_TO) {
        header.reply_to = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::EXPIRATION) {
        header.expiration = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::MESSAGE_ID) {
        header.message_id = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::TIMESTAMP) {
        header.timestamp = Some(decode_u64(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::MESSAGE_TYPE) {
        header.message_type = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::USER_ID) {
        header.user_id = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::APP_ID) {
        header.app_id = Some(decode_short_string(src)?);
    }
    if header.prop_flags.contains(HeaderPropertyFlags::CLUSTER_ID) {
        header.cluster_id = Some(decode_short_string(src)?);
    }

    Ok(AMQPFrame::ContentHeader(header))
}

fn encode_amqp_frame(buf: &mut BytesMut, frame: AMQPFrame) {
    match frame {
        AMQPFrame::Header => buf.put(&b"AMQP\x00\x00\x09\x01"[..]),

        AMQPFrame::Method(ch, cm, args) => encode_method_frame(buf, ch, cm, &args),

        AMQPFrame::ContentHeader(header_frame) => encode_content_header_frame(buf, &header_frame),

        AMQPFrame::ContentBody(body_frame) => encode_content_body_frame(buf, &body_frame),

        AMQPFrame::Heartbeat(channel) => encode_heartbeat_frame(buf, channel),
    }
}

fn encode_method_frame(buf: &mut BytesMut, channel: Channel, cm: ClassMethod, args: &MethodFrameArgs) {
    buf.put_u8(FRAME_METHOD_FRAME);
    buf.put_u16(channel);

    // Method fields go to a scratch buffer first, the frame length is the
    // measured serialized size.
    let mut fr = BytesMut::with_capacity(4096);
    fr.put_u32(cm);

    match args {
        MethodFrameArgs::ConnectionStart(args) => encode_connection_start(&mut fr, args),
        MethodFrameArgs::ConnectionStartOk(args) => encode_connection_start_ok(&mut fr, args),
        MethodFrameArgs::ConnectionSecure(args) => encode_long_string(&mut fr, &args.challenge),
        MethodFrameArgs::ConnectionSecureOk(args) => encode_long_string(&mut fr, &args.response),
        MethodFrameArgs::ConnectionTune(args) => {
            fr.put_u16(args.channel_max);
            fr.put_u32(args.frame_max);
            fr.put_u16(args.heartbeat);
        }
        MethodFrameArgs::ConnectionTuneOk(args) => {
            fr.put_u16(args.channel_max);
            fr.put_u32(args.frame_max);
            fr.put_u16(args.heartbeat);
        }
        MethodFrameArgs::ConnectionOpen(args) => encode_connection_open(&mut fr, args),
        MethodFrameArgs::ConnectionOpenOk => encode_short_string(&mut fr, ""),
        MethodFrameArgs::ConnectionClose(args) => {
            fr.put_u16(args.code);
            encode_short_string(&mut fr, &args.text);
            fr.put_u16(args.class_id);
            fr.put_u16(args.method_id);
        }
        MethodFrameArgs::ConnectionCloseOk => (),
        MethodFrameArgs::ChannelOpen => encode_short_string(&mut fr, ""),
        MethodFrameArgs::ChannelOpenOk => encode_long_string(&mut fr, ""),
        MethodFrameArgs::ChannelFlow(args) => fr.put_u8(u8::from(args.active)),
        MethodFrameArgs::ChannelFlowOk(args) => fr.put_u8(u8::from(args.active)),
        MethodFrameArgs::ChannelClose(args) => {
            fr.put_u16(args.code);
            encode_short_string(&mut fr, &args.text);
            fr.put_u16(args.class_id);
            fr.put_u16(args.method_id);
        }
        MethodFrameArgs::ChannelCloseOk => (),
        MethodFrameArgs::ExchangeDeclare(args) => encode_exchange_declare(&mut fr, args),
        MethodFrameArgs::ExchangeDeclareOk => (),
        MethodFrameArgs::ExchangeDelete(args) => encode_exchange_delete(&mut fr, args),
        MethodFrameArgs::ExchangeDeleteOk => (),
        MethodFrameArgs::QueueDeclare(args) => encode_queue_declare(&mut fr, args),
        MethodFrameArgs::QueueDeclareOk(args) => encode_queue_declare_ok(&mut fr, args),
        MethodFrameArgs::QueueBind(args) => encode_queue_bind(&mut fr, args),
        MethodFrameArgs::QueueBindOk => (),
        MethodFrameArgs::QueuePurge(args) => {
            fr.put_u16(0);
            encode_short_string(&mut fr, &args.queue_name);
            fr.put_u8(u8::from(args.no_wait));
        }
        MethodFrameArgs::QueuePurgeOk(args) => fr.put_u32(args.message_count),
        MethodFrameArgs::QueueDelete(args) => {
            fr.put_u16(0);
            encode_short_string(&mut fr, &args.queue_name);
            fr.put_u8(args.flags.bits());
        }
        MethodFrameArgs::QueueDeleteOk(args) => fr.put_u32(args.message_count),
        MethodFrameArgs::QueueUnbind(args) => encode_queue_unbind(&mut fr, args),
        MethodFrameArgs::QueueUnbindOk => (),
        MethodFrameArgs::BasicQos(args) => {
            fr.put_u32(args.prefetch_size);
            fr.put_u16(args.prefetch_count);
            fr.put_u8(u8::from(args.global));
        }
        MethodFrameArgs::BasicQosOk => (),
        MethodFrameArgs::BasicConsume(args) => encode_basic_consume(&mut fr, args),
        MethodFrameArgs::BasicConsumeOk(args) => encode_short_string(&mut fr, &args.consumer_tag),
        MethodFrameArgs::BasicCancel(args) => {
            encode_short_string(&mut fr, &args.consumer_tag);
            fr.put_u8(u8::from(args.no_wait));
        }
        MethodFrameArgs::BasicCancelOk(args) => encode_short_string(&mut fr, &args.consumer_tag),
        MethodFrameArgs::BasicPublish(args) => {
            fr.put_u16(0);
            encode_short_string(&mut fr, &args.exchange_name);
            encode_short_string(&mut fr, &args.routing_key);
            fr.put_u8(args.flags.bits());
        }
        MethodFrameArgs::BasicReturn(args) => {
            fr.put_u16(args.reply_code);
            encode_short_string(&mut fr, &args.reply_text);
            encode_short_string(&mut fr, &args.exchange_name);
            encode_short_string(&mut fr, &args.routing_key);
        }
        MethodFrameArgs::BasicDeliver(args) => {
            encode_short_string(&mut fr, &args.consumer_tag);
            fr.put_u64(args.delivery_tag);
            fr.put_u8(u8::from(args.redelivered));
            encode_short_string(&mut fr, &args.exchange_name);
            encode_short_string(&mut fr, &args.routing_key);
        }
        MethodFrameArgs::BasicGet(args) => {
            fr.put_u16(0);
            encode_short_string(&mut fr, &args.queue);
            fr.put_u8(u8::from(args.no_ack));
        }
        MethodFrameArgs::BasicGetOk(args) => {
            fr.put_u64(args.delivery_tag);
            fr.put_u8(u8::from(args.redelivered));
            encode_short_string(&mut fr, &args.exchange_name);
            encode_short_string(&mut fr, &args.routing_key);
            fr.put_u32(args.message_count);
        }
        MethodFrameArgs::BasicGetEmpty => encode_short_string(&mut fr, ""),
        MethodFrameArgs::BasicAck(args) => {
            fr.put_u64(args.delivery_tag);
            fr.put_u8(u8::from(args.multiple));
        }
        MethodFrameArgs::BasicReject(args) => {
            fr.put_u64(args.delivery_tag);
            fr.put_u8(u8::from(args.requeue));
        }
        MethodFrameArgs::BasicRecoverAsync(args) => fr.put_u8(u8::from(args.requeue)),
        MethodFrameArgs::BasicRecover(args) => fr.put_u8(u8::from(args.requeue)),
        MethodFrameArgs::BasicRecoverOk => (),
        MethodFrameArgs::BasicNack(args) => {
            fr.put_u64(args.delivery_tag);
            fr.put_u8(args.flags.bits());
        }
        MethodFrameArgs::ConfirmSelect(args) => fr.put_u8(u8::from(args.no_wait)),
        MethodFrameArgs::ConfirmSelectOk => (),
    }

    buf.put_u32(fr.len() as u32);
    buf.put(fr);
    buf.put_u8(FRAME_END);
}

fn encode_connection_start(buf: &mut BytesMut, args: &ConnectionStartArgs) {
    buf.put_u8(args.version_major);
    buf.put_u8(args.version_minor);
    encode_field_table(buf, args.properties.as_ref());
    encode_long_string(buf, &args.mechanisms);
    encode_long_string(buf, &args.locales);
}

fn encode_connection_start_ok(buf: &mut BytesMut, args: &ConnectionStartOkArgs) {
    encode_field_table(buf, args.properties.as_ref());
    encode_short_string(buf, &args.mechanism);
    encode_long_string(buf, &args.response);
    encode_short_string(buf, &args.locale);
}

fn encode_connection_open(buf: &mut BytesMut, args: &ConnectionOpenArgs) {
    encode_short_string(buf, &args.virtual_host);
    encode_short_string(buf, "");

    let mut flags = 0x00;

    if args.insist {
        flags |= 0x01;
    }

    buf.put_u8(flags);
}

fn encode_exchange_declare(buf: &mut BytesMut, args: &ExchangeDeclareArgs) {
    buf.put_u16(0);
    encode_short_string(buf, &args.exchange_name);
    encode_short_string(buf, &args.exchange_type);
    buf.put_u8(args.flags.bits());
    encode_field_table(buf, args.args.as_ref());
}

fn encode_exchange_delete(buf: &mut BytesMut, args: &ExchangeDeleteArgs) {
    buf.put_u16(0);
    encode_short_string(buf, &args.exchange_name);
    buf.put_u8(args.flags.bits());
}

fn encode_queue_declare(buf: &mut BytesMut, args: &QueueDeclareArgs) {
    buf.put_u16(0);
    encode_short_string(buf, &args.name);
    buf.put_u8(args.flags.bits());
    encode_field_table(buf, args.args.as_ref());
}

fn encode_queue_declare_ok(buf: &mut BytesMut, args: &QueueDeclareOkArgs) {
    encode_short_string(buf, &args.name);
    buf.put_u32(args.message_count);
    buf.put_u32(args.consumer_count);
}

fn encode_queue_bind(buf: &mut BytesMut, args: &QueueBindArgs) {
    buf.put_u16(0);
    encode_short_string(buf, &args.queue_name);
    encode_short_string(buf, &args.exchange_name);
    encode_short_string(buf, &args.routing_key);
    buf.put_u8(u8::from(args.no_wait));
    encode_field_table(buf, args.args.as_ref());
}

fn encode_queue_unbind(buf: &mut BytesMut, args: &QueueUnbindArgs) {
    buf.put_u16(0);
    encode_short_string(buf, &args.queue_name);
    encode_short_string(buf, &args.exchange_name);
    encode_short_string(buf, &args.routing_key);
    encode_field_table(buf, args.args.as_ref());
}

fn encode_basic_consume(buf: &mut BytesMut, args: &BasicConsumeArgs) {
    buf.put_u16(0);
    encode_short_string(buf, &args.queue);
    encode_short_string(buf, &args.consumer_tag);
    buf.put_u8(args.flags.bits());
    encode_field_table(buf, args.args.as_ref());
}

fn encode_content_header_frame(buf: &mut BytesMut, hf: &ContentHeaderFrame) {
    buf.put_u8(FRAME_CONTENT_HEADER);
    buf.put_u16(hf.channel);

    let mut fr = BytesMut::with_capacity(4096);
    fr.put_u16(hf.class_id);
    fr.put_u16(hf.weight);
    fr.put_u64(hf.body_size);
    fr.put_u16(hf.prop_flags.bits());

    if let Some(ref v) = hf.content_type {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.content_encoding {
        encode_short_string(&mut fr, v);
    }
    if hf.prop_flags.contains(HeaderPropertyFlags::HEADERS) {
        encode_field_table(&mut fr, hf.headers.as_ref());
    }
    if let Some(v) = hf.delivery_mode {
        fr.put_u8(v);
    }
    if let Some(v) = hf.priority {
        fr.put_u8(v);
    }
    if let Some(ref v) = hf.correlation_id {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.reply_to {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.expiration {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.message_id {
        encode_short_string(&mut fr, v);
    }
    if let Some(v) = hf.timestamp {
        fr.put_u64(v);
    }
    if let Some(ref v) = hf.message_type {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.user_id {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.app_id {
        encode_short_string(&mut fr, v);
    }
    if let Some(ref v) = hf.cluster_id {
        encode_short_string(&mut fr, v);
    }

    buf.put_u32(fr.len() as u32);
    buf.put(fr);
    buf.put_u8(FRAME_END);
}

fn encode_content_body_frame(buf: &mut BytesMut, bf: &ContentBodyFrame) {
    buf.put_u8(FRAME_CONTENT_BODY);
    buf.put_u16(bf.channel);
    buf.put_u32(bf.body.len() as u32);
    buf.put(bf.body.as_slice());
    buf.put_u8(FRAME_END);
}

fn encode_heartbeat_frame(buf: &mut BytesMut, channel: Channel) {
    buf.put_u8(FRAME_HEARTBEAT);
    buf.put_u16(channel);
    buf.put_u32(0);
    buf.put_u8(FRAME_END);
}
