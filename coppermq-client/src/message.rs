use std::collections::HashMap;

use coppermq_codec::frame::{AMQPFieldValue, ContentHeaderFrame, FieldTable, HeaderPropertyFlags};

use crate::model::ChannelNumber;

/// A message sent to the server or received from the server.
#[derive(Debug, Default)]
pub struct Content {
    pub channel: ChannelNumber,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

/// Standard set of message properties.
#[derive(Debug, Default)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: HashMap<String, String>,
    /// 1 - non-persistent, 2 - persistent
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
}

/// A delivered message.
///
/// With the `consumer_tag` and `delivery_tag` a client can send back
/// acknowledgements to the server, saying that the message was successfully
/// arrived.
#[derive(Debug, Default)]
pub struct DeliveredMessage {
    pub message: Content,
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

/// A message got by `Basic.Get`.
#[derive(Debug, Default)]
pub struct GetMessage {
    pub message: Content,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message_count: u32,
}

/// A message returned to the client.
#[derive(Debug, Default)]
pub struct ReturnedMessage {
    pub message: Content,
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

/// A message published by the client.
#[derive(Debug, Default)]
pub struct PublishedMessage {
    pub message: Content,
    pub mandatory: bool,
    pub immediate: bool,
}

/// Internally it is comfortable to handle delivered, returned or got
/// messages in the same variable.
#[derive(Debug)]
pub(crate) enum Message {
    Delivered(DeliveredMessage),
    Get(GetMessage),
    Returned(ReturnedMessage),
}

impl Message {
    pub(crate) fn content_mut(&mut self) -> &mut Content {
        match self {
            Message::Delivered(dm) => &mut dm.message,
            Message::Get(gm) => &mut gm.message,
            Message::Returned(rm) => &mut rm.message,
        }
    }
}

/// Convert the message to a content header and the raw body, the body is
/// fragmented later according to the negotiated maximum frame size.
pub(crate) fn to_content_frames(content: Content) -> (ContentHeaderFrame, Vec<u8>) {
    let mut header = ContentHeaderFrame {
        channel: content.channel,
        body_size: content.body.len() as u64,
        ..Default::default()
    };

    let props = content.properties;

    macro_rules! prop {
        ($field:ident, $flag:ident) => {
            if props.$field.is_some() {
                header.$field = props.$field;
                header.prop_flags.set(HeaderPropertyFlags::$flag, true);
            }
        };
    }

    prop!(content_type, CONTENT_TYPE);
    prop!(content_encoding, CONTENT_ENCODING);
    prop!(delivery_mode, DELIVERY_MODE);
    prop!(priority, PRIORITY);
    prop!(correlation_id, CORRELATION_ID);
    prop!(reply_to, REPLY_TO);
    prop!(expiration, EXPIRATION);
    prop!(message_id, MESSAGE_ID);
    prop!(timestamp, TIMESTAMP);
    prop!(message_type, MESSAGE_TYPE);
    prop!(user_id, USER_ID);
    prop!(app_id, APP_ID);

    if !props.headers.is_empty() {
        let mut headers = FieldTable::new();

        for (k, v) in props.headers {
            headers.insert(k, AMQPFieldValue::LongString(v));
        }

        header.headers = Some(headers);
        header.prop_flags.set(HeaderPropertyFlags::HEADERS, true);
    }

    (header, content.body)
}

impl From<ContentHeaderFrame> for MessageProperties {
    fn from(header: ContentHeaderFrame) -> Self {
        let mut headers = HashMap::new();

        if let Some(table) = header.headers {
            for (k, v) in table {
                match v {
                    AMQPFieldValue::LongString(s) => {
                        headers.insert(k, s);
                    }
                    AMQPFieldValue::SimpleString(s) => {
                        headers.insert(k, s);
                    }
                    AMQPFieldValue::Bool(b) => {
                        headers.insert(k, b.to_string());
                    }
                    // other value types are not representable in the string
                    // header map, skip them
                    _ => (),
                }
            }
        }

        MessageProperties {
            content_type: header.content_type,
            content_encoding: header.content_encoding,
            headers,
            delivery_mode: header.delivery_mode,
            priority: header.priority,
            correlation_id: header.correlation_id,
            reply_to: header.reply_to,
            expiration: header.expiration,
            message_id: header.message_id,
            timestamp: header.timestamp,
            message_type: header.message_type,
            user_id: header.user_id,
            app_id: header.app_id,
        }
    }
}

impl From<&str> for PublishedMessage {
    fn from(value: &str) -> Self {
        PublishedMessage::default().text(value)
    }
}

impl PublishedMessage {
    pub fn text(mut self, value: &str) -> Self {
        self.message.body = value.as_bytes().to_vec();
        self
    }

    pub fn body(mut self, value: Vec<u8>) -> Self {
        self.message.body = value;
        self
    }

    /// Condition for mandatory publishing. Mandatory messages are failed if
    /// the exchange doesn't have bound queue or if the routing keys are not
    /// matched.
    pub fn mandatory(mut self, value: bool) -> Self {
        self.mandatory = value;
        self
    }

    /// Condition for immediate publishing. Immediate messages are received
    /// by a server successfully if they managed to be sent to a consumer
    /// immediately.
    pub fn immediate(mut self, value: bool) -> Self {
        self.immediate = value;
        self
    }
}
