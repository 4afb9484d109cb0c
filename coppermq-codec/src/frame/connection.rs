use super::{AMQPFrame, AMQPFieldValue, FieldTable, MethodFrameArgs};

#[derive(Debug, Default)]
pub struct ConnectionStartArgs {
    pub version_major: u8,
    pub version_minor: u8,
    pub properties: Option<FieldTable>,
    pub mechanisms: String,
    pub locales: String,
}

impl ConnectionStartArgs {
    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::Method(0, super::CONNECTION_START, MethodFrameArgs::ConnectionStart(self))
    }
}

#[derive(Debug, Default)]
pub struct ConnectionStartOkArgs {
    pub properties: Option<FieldTable>,
    pub mechanism: String,
    pub response: String,
    pub locale: String,
}

impl ConnectionStartOkArgs {
    /// Build a start-ok answer using the PLAIN mechanism. The SASL response
    /// is the NUL-delimited `\0username\0password` blob.
    pub fn plain(username: &str, password: &str, capabilities: FieldTable) -> Self {
        let mut properties = FieldTable::new();

        properties.insert("product".to_string(), AMQPFieldValue::LongString("coppermq".to_string()));
        properties.insert(
            "version".to_string(),
            AMQPFieldValue::LongString(env!("CARGO_PKG_VERSION").to_string()),
        );
        properties.insert(
            "capabilities".to_string(),
            AMQPFieldValue::FieldTable(Box::new(capabilities)),
        );

        ConnectionStartOkArgs {
            properties: Some(properties),
            mechanism: "PLAIN".to_string(),
            response: format!("\u{0}{}\u{0}{}", username, password),
            locale: "en_US".to_string(),
        }
    }

    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::Method(0, super::CONNECTION_START_OK, MethodFrameArgs::ConnectionStartOk(self))
    }
}

#[derive(Debug, Default)]
pub struct ConnectionSecureArgs {
    pub challenge: String,
}

#[derive(Debug, Default)]
pub struct ConnectionSecureOkArgs {
    pub response: String,
}

#[derive(Debug, Default)]
pub struct ConnectionTuneArgs {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

#[derive(Debug, Default)]
pub struct ConnectionTuneOkArgs {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl ConnectionTuneOkArgs {
    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::Method(0, super::CONNECTION_TUNE_OK, MethodFrameArgs::ConnectionTuneOk(self))
    }
}

#[derive(Debug)]
pub struct ConnectionOpenArgs {
    pub virtual_host: String,
    pub insist: bool,
}

impl Default for ConnectionOpenArgs {
    fn default() -> Self {
        ConnectionOpenArgs {
            virtual_host: "/".to_string(),
            insist: false,
        }
    }
}

impl ConnectionOpenArgs {
    pub fn virtual_host(mut self, virtual_host: &str) -> Self {
        self.virtual_host = virtual_host.to_string();
        self
    }

    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::Method(0, super::CONNECTION_OPEN, MethodFrameArgs::ConnectionOpen(self))
    }
}

#[derive(Debug, Default)]
pub struct ConnectionCloseArgs {
    pub code: u16,
    pub text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl ConnectionCloseArgs {
    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::Method(0, super::CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(self))
    }
}

pub fn connection_open(virtual_host: &str) -> AMQPFrame {
    ConnectionOpenArgs::default().virtual_host(virtual_host).frame()
}

pub fn connection_start_ok(username: &str, password: &str, capabilities: FieldTable) -> AMQPFrame {
    ConnectionStartOkArgs::plain(username, password, capabilities).frame()
}

pub fn connection_tune_ok(channel_max: u16, frame_max: u32, heartbeat: u16) -> AMQPFrame {
    ConnectionTuneOkArgs {
        channel_max,
        frame_max,
        heartbeat,
    }
    .frame()
}

pub fn connection_close(code: u16, text: &str, class_method: u32) -> AMQPFrame {
    let (class_id, method_id) = super::split_class_method(class_method);

    ConnectionCloseArgs {
        code,
        text: text.to_string(),
        class_id,
        method_id,
    }
    .frame()
}

pub fn connection_close_ok() -> AMQPFrame {
    AMQPFrame::Method(0, super::CONNECTION_CLOSE_OK, MethodFrameArgs::ConnectionCloseOk)
}
