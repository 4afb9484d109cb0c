mod basic;
mod channel;
mod connection;
mod exchange;
mod queue;
mod value;

pub use self::{
    basic::{
        basic_get_empty, basic_qos_ok, basic_recover_ok, confirm_select, confirm_select_ok, BasicAckArgs,
        BasicCancelArgs, BasicCancelOkArgs, BasicConsumeArgs, BasicConsumeFlags, BasicConsumeOkArgs, BasicDeliverArgs,
        BasicGetArgs, BasicGetOkArgs, BasicNackArgs, BasicNackFlags, BasicPublishArgs, BasicPublishFlags, BasicQosArgs,
        BasicRecoverArgs, BasicRejectArgs, BasicReturnArgs, ConfirmSelectArgs,
    },
    channel::{
        channel_close, channel_close_ok, channel_flow_ok, channel_open, channel_open_ok, ChannelCloseArgs,
        ChannelFlowArgs,
    },
    connection::{
        connection_close, connection_close_ok, connection_open, connection_start_ok, connection_tune_ok,
        ConnectionCloseArgs, ConnectionOpenArgs, ConnectionSecureArgs, ConnectionSecureOkArgs, ConnectionStartArgs,
        ConnectionStartOkArgs, ConnectionTuneArgs, ConnectionTuneOkArgs,
    },
    exchange::{
        exchange_declare, exchange_delete, ExchangeDeclareArgs, ExchangeDeclareFlags, ExchangeDeleteArgs,
        ExchangeDeleteFlags,
    },
    queue::{
        queue_bind, queue_declare, queue_delete, queue_purge, queue_unbind, QueueBindArgs, QueueDeclareArgs,
        QueueDeclareFlags, QueueDeclareOkArgs, QueueDeleteArgs, QueueDeleteFlags, QueueDeleteOkArgs, QueuePurgeArgs,
        QueuePurgeOkArgs, QueueUnbindArgs,
    },
    value::{AMQPFieldValue, FieldArray, FieldTable},
};

pub(crate) use self::value::{
    decode_f32, decode_f64, decode_field_array, decode_field_table, decode_i16, decode_i32, decode_i64, decode_i8,
    decode_long_string, decode_short_string, decode_u16, decode_u32, decode_u64, decode_u8, decode_value,
    encode_field_array, encode_field_table, encode_long_string, encode_short_string, encode_value, invalid_data,
};

pub const CONNECTION_START: u32 = 0x000A000A;
pub const CONNECTION_START_OK: u32 = 0x000A000B;
pub const CONNECTION_SECURE: u32 = 0x000A0014;
pub const CONNECTION_SECURE_OK: u32 = 0x000A0015;
pub const CONNECTION_TUNE: u32 = 0x000A001E;
pub const CONNECTION_TUNE_OK: u32 = 0x000A001F;
pub const CONNECTION_OPEN: u32 = 0x000A0028;
pub const CONNECTION_OPEN_OK: u32 = 0x000A0029;
pub const CONNECTION_CLOSE: u32 = 0x000A0032;
pub const CONNECTION_CLOSE_OK: u32 = 0x000A0033;

pub const CHANNEL_OPEN: u32 = 0x0014000A;
pub const CHANNEL_OPEN_OK: u32 = 0x0014000B;
pub const CHANNEL_FLOW: u32 = 0x00140014;
pub const CHANNEL_FLOW_OK: u32 = 0x00140015;
pub const CHANNEL_CLOSE: u32 = 0x00140028;
pub const CHANNEL_CLOSE_OK: u32 = 0x00140029;

pub const EXCHANGE_DECLARE: u32 = 0x0028000A;
pub const EXCHANGE_DECLARE_OK: u32 = 0x0028000B;
pub const EXCHANGE_DELETE: u32 = 0x00280014;
pub const EXCHANGE_DELETE_OK: u32 = 0x00280015;

pub const QUEUE_DECLARE: u32 = 0x0032000A;
pub const QUEUE_DECLARE_OK: u32 = 0x0032000B;
pub const QUEUE_BIND: u32 = 0x00320014;
pub const QUEUE_BIND_OK: u32 = 0x00320015;
pub const QUEUE_PURGE: u32 = 0x0032001E;
pub const QUEUE_PURGE_OK: u32 = 0x0032001F;
pub const QUEUE_DELETE: u32 = 0x00320028;
pub const QUEUE_DELETE_OK: u32 = 0x00320029;
pub const QUEUE_UNBIND: u32 = 0x00320032;
pub const QUEUE_UNBIND_OK: u32 = 0x00320033;

pub const BASIC_QOS: u32 = 0x003C000A;
pub const BASIC_QOS_OK: u32 = 0x003C000B;
pub const BASIC_CONSUME: u32 = 0x003C0014;
pub const BASIC_CONSUME_OK: u32 = 0x003C0015;
pub const BASIC_CANCEL: u32 = 0x003C001E;
pub const BASIC_CANCEL_OK: u32 = 0x003C001F;
pub const BASIC_PUBLISH: u32 = 0x003C0028;
pub const BASIC_RETURN: u32 = 0x003C0032;
pub const BASIC_DELIVER: u32 = 0x003C003C;
pub const BASIC_GET: u32 = 0x003C0046;
pub const BASIC_GET_OK: u32 = 0x003C0047;
pub const BASIC_GET_EMPTY: u32 = 0x003C0048;
pub const BASIC_ACK: u32 = 0x003C0050;
pub const BASIC_REJECT: u32 = 0x003C005A;
pub const BASIC_RECOVER_ASYNC: u32 = 0x003C0064;
pub const BASIC_RECOVER: u32 = 0x003C006E;
pub const BASIC_RECOVER_OK: u32 = 0x003C006F;
pub const BASIC_NACK: u32 = 0x003C0078;

pub const CONFIRM_SELECT: u32 = 0x0055000A;
pub const CONFIRM_SELECT_OK: u32 = 0x0055000B;

/// Class id of the `basic` class, carried by content headers of deliveries
/// and publishes.
pub const BASIC_CLASS: u16 = 0x003C;

pub type Channel = u16;
pub type ClassMethod = u32;
pub type ClassId = u16;
pub type Weight = u16;

/// Represents an AMQP frame.
pub enum AMQPFrame {
    /// The protocol greeting, sent to the server first, announcing the AMQP
    /// version the client speaks.
    Header,
    /// A method frame. Connection level calls travel on channel 0,
    /// everything else on the channel it belongs to. The typed arguments
    /// are in `MethodFrameArgs`.
    Method(Channel, ClassMethod, MethodFrameArgs),
    ContentHeader(ContentHeaderFrame),
    ContentBody(ContentBodyFrame),
    Heartbeat(Channel),
}

impl std::fmt::Debug for AMQPFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AMQPFrame::Header => write!(f, "Header"),
            AMQPFrame::Method(ch, cm, args) => {
                write!(f, "Method(channel={}, {}, {:?})", ch, method_name(*cm), args)
            }
            AMQPFrame::ContentHeader(ch) => write!(f, "ContentHeader({:?})", ch),
            AMQPFrame::ContentBody(cb) => write!(f, "ContentBody({:?})", cb),
            AMQPFrame::Heartbeat(ch) => write!(f, "Heartbeat(channel={})", ch),
        }
    }
}

/// Represents all types of method frame arguments.
#[derive(Debug)]
pub enum MethodFrameArgs {
    ConnectionStart(ConnectionStartArgs),
    ConnectionStartOk(ConnectionStartOkArgs),
    ConnectionSecure(ConnectionSecureArgs),
    ConnectionSecureOk(ConnectionSecureOkArgs),
    ConnectionTune(ConnectionTuneArgs),
    ConnectionTuneOk(ConnectionTuneOkArgs),
    ConnectionOpen(ConnectionOpenArgs),
    ConnectionOpenOk,
    ConnectionClose(ConnectionCloseArgs),
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow(ChannelFlowArgs),
    ChannelFlowOk(ChannelFlowArgs),
    ChannelClose(ChannelCloseArgs),
    ChannelCloseOk,
    ExchangeDeclare(ExchangeDeclareArgs),
    ExchangeDeclareOk,
    ExchangeDelete(ExchangeDeleteArgs),
    ExchangeDeleteOk,
    QueueDeclare(QueueDeclareArgs),
    QueueDeclareOk(QueueDeclareOkArgs),
    QueueBind(QueueBindArgs),
    QueueBindOk,
    QueuePurge(QueuePurgeArgs),
    QueuePurgeOk(QueuePurgeOkArgs),
    QueueDelete(QueueDeleteArgs),
    QueueDeleteOk(QueueDeleteOkArgs),
    QueueUnbind(QueueUnbindArgs),
    QueueUnbindOk,
    BasicQos(BasicQosArgs),
    BasicQosOk,
    BasicConsume(BasicConsumeArgs),
    BasicConsumeOk(BasicConsumeOkArgs),
    BasicCancel(BasicCancelArgs),
    BasicCancelOk(BasicCancelOkArgs),
    BasicPublish(BasicPublishArgs),
    BasicReturn(BasicReturnArgs),
    BasicDeliver(BasicDeliverArgs),
    BasicGet(BasicGetArgs),
    BasicGetOk(BasicGetOkArgs),
    BasicGetEmpty,
    BasicAck(BasicAckArgs),
    BasicReject(BasicRejectArgs),
    BasicRecoverAsync(BasicRecoverArgs),
    BasicRecover(BasicRecoverArgs),
    BasicRecoverOk,
    BasicNack(BasicNackArgs),
    ConfirmSelect(ConfirmSelectArgs),
    ConfirmSelectOk,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq)]
    pub struct HeaderPropertyFlags: u16 {
        const CLUSTER_ID       = 0b0000_0000_0000_0100;
        const APP_ID           = 0b0000_0000_0000_1000;
        const USER_ID          = 0b0000_0000_0001_0000;
        const MESSAGE_TYPE     = 0b0000_0000_0010_0000;
        const TIMESTAMP        = 0b0000_0000_0100_0000;
        const MESSAGE_ID       = 0b0000_0000_1000_0000;
        const EXPIRATION       = 0b0000_0001_0000_0000;
        const REPLY_TO         = 0b0000_0010_0000_0000;
        const CORRELATION_ID   = 0b0000_0100_0000_0000;
        const PRIORITY         = 0b0000_1000_0000_0000;
        const DELIVERY_MODE    = 0b0001_0000_0000_0000;
        const HEADERS          = 0b0010_0000_0000_0000;
        const CONTENT_ENCODING = 0b0100_0000_0000_0000;
        const CONTENT_TYPE     = 0b1000_0000_0000_0000;
    }
}

impl Default for HeaderPropertyFlags {
    fn default() -> Self {
        HeaderPropertyFlags::empty()
    }
}

/// A content header frame carrying the declared body size and the optional
/// basic properties of a message.
///
/// A property is on the wire only if its bit is set in `prop_flags`; the
/// setters below keep the flag and the field in sync.
#[derive(Debug, Default)]
pub struct ContentHeaderFrame {
    pub channel: Channel,
    pub class_id: ClassId,
    pub weight: Weight,
    pub body_size: u64,
    pub prop_flags: HeaderPropertyFlags,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub message_type: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl ContentHeaderFrame {
    pub fn with_content_type(&mut self, content_type: String) -> &mut ContentHeaderFrame {
        self.content_type = Some(content_type);
        self.prop_flags.set(HeaderPropertyFlags::CONTENT_TYPE, true);
        self
    }

    pub fn with_delivery_mode(&mut self, delivery_mode: u8) -> &mut ContentHeaderFrame {
        self.delivery_mode = Some(delivery_mode);
        self.prop_flags.set(HeaderPropertyFlags::DELIVERY_MODE, true);
        self
    }

    pub fn with_correlation_id(&mut self, correlation_id: String) -> &mut ContentHeaderFrame {
        self.correlation_id = Some(correlation_id);
        self.prop_flags.set(HeaderPropertyFlags::CORRELATION_ID, true);
        self
    }

    pub fn with_reply_to(&mut self, reply_to: String) -> &mut ContentHeaderFrame {
        self.reply_to = Some(reply_to);
        self.prop_flags.set(HeaderPropertyFlags::REPLY_TO, true);
        self
    }

    pub fn with_headers(&mut self, headers: FieldTable) -> &mut ContentHeaderFrame {
        self.headers = Some(headers);
        self.prop_flags.set(HeaderPropertyFlags::HEADERS, true);
        self
    }

    pub fn with_message_id(&mut self, message_id: String) -> &mut ContentHeaderFrame {
        self.message_id = Some(message_id);
        self.prop_flags.set(HeaderPropertyFlags::MESSAGE_ID, true);
        self
    }

    pub fn with_timestamp(&mut self, timestamp: u64) -> &mut ContentHeaderFrame {
        self.timestamp = Some(timestamp);
        self.prop_flags.set(HeaderPropertyFlags::TIMESTAMP, true);
        self
    }

    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::ContentHeader(self)
    }
}

pub struct ContentBodyFrame {
    pub channel: Channel,
    pub body: Vec<u8>,
}

impl ContentBodyFrame {
    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::ContentBody(self)
    }
}

impl std::fmt::Debug for ContentBodyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = String::from_utf8_lossy(&self.body[..std::cmp::min(64usize, self.body.len())]);

        f.write_fmt(format_args!(
            "ContentBodyFrame {{ channel: {}, body: \"{}\" }}",
            &self.channel, body
        ))
    }
}

impl From<ContentHeaderFrame> for AMQPFrame {
    fn from(chf: ContentHeaderFrame) -> AMQPFrame {
        AMQPFrame::ContentHeader(chf)
    }
}

impl From<ContentBodyFrame> for AMQPFrame {
    fn from(cbf: ContentBodyFrame) -> AMQPFrame {
        AMQPFrame::ContentBody(cbf)
    }
}

/// Split class id and method id from the `u32` combined code.
pub fn split_class_method(cm: u32) -> (u16, u16) {
    let method_id = (cm & 0x0000FFFF) as u16;
    let class_id = (cm >> 16) as u16;

    (class_id, method_id)
}

/// Combine class id and method id to a single `u32` value.
pub fn unify_class_method(class: u16, method: u16) -> u32 {
    ((class as u32) << 16) | (method as u32)
}

pub fn heartbeat() -> AMQPFrame {
    AMQPFrame::Heartbeat(0)
}

/// Human readable name of a method, for diagnostics.
pub fn method_name(cm: ClassMethod) -> &'static str {
    match cm {
        CONNECTION_START => "connection.start",
        CONNECTION_START_OK => "connection.start-ok",
        CONNECTION_SECURE => "connection.secure",
        CONNECTION_SECURE_OK => "connection.secure-ok",
        CONNECTION_TUNE => "connection.tune",
        CONNECTION_TUNE_OK => "connection.tune-ok",
        CONNECTION_OPEN => "connection.open",
        CONNECTION_OPEN_OK => "connection.open-ok",
        CONNECTION_CLOSE => "connection.close",
        CONNECTION_CLOSE_OK => "connection.close-ok",
        CHANNEL_OPEN => "channel.open",
        CHANNEL_OPEN_OK => "channel.open-ok",
        CHANNEL_FLOW => "channel.flow",
        CHANNEL_FLOW_OK => "channel.flow-ok",
        CHANNEL_CLOSE => "channel.close",
        CHANNEL_CLOSE_OK => "channel.close-ok",
        EXCHANGE_DECLARE => "exchange.declare",
        EXCHANGE_DECLARE_OK => "exchange.declare-ok",
        EXCHANGE_DELETE => "exchange.delete",
        EXCHANGE_DELETE_OK => "exchange.delete-ok",
        QUEUE_DECLARE => "queue.declare",
        QUEUE_DECLARE_OK => "queue.declare-ok",
        QUEUE_BIND => "queue.bind",
        QUEUE_BIND_OK => "queue.bind-ok",
        QUEUE_PURGE => "queue.purge",
        QUEUE_PURGE_OK => "queue.purge-ok",
        QUEUE_DELETE => "queue.delete",
        QUEUE_DELETE_OK => "queue.delete-ok",
        QUEUE_UNBIND => "queue.unbind",
        QUEUE_UNBIND_OK => "queue.unbind-ok",
        BASIC_QOS => "basic.qos",
        BASIC_QOS_OK => "basic.qos-ok",
        BASIC_CONSUME => "basic.consume",
        BASIC_CONSUME_OK => "basic.consume-ok",
        BASIC_CANCEL => "basic.cancel",
        BASIC_CANCEL_OK => "basic.cancel-ok",
        BASIC_PUBLISH => "basic.publish",
        BASIC_RETURN => "basic.return",
        BASIC_DELIVER => "basic.deliver",
        BASIC_GET => "basic.get",
        BASIC_GET_OK => "basic.get-ok",
        BASIC_GET_EMPTY => "basic.get-empty",
        BASIC_ACK => "basic.ack",
        BASIC_REJECT => "basic.reject",
        BASIC_RECOVER_ASYNC => "basic.recover-async",
        BASIC_RECOVER => "basic.recover",
        BASIC_RECOVER_OK => "basic.recover-ok",
        BASIC_NACK => "basic.nack",
        CONFIRM_SELECT => "confirm.select",
        CONFIRM_SELECT_OK => "confirm.select-ok",
        _ => "<unknown>",
    }
}
