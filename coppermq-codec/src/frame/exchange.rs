use super::{AMQPFrame, Channel, FieldTable, MethodFrameArgs};

bitflags! {
    #[derive(Debug)]
    pub struct ExchangeDeclareFlags: u8 {
        const PASSIVE = 0b00000001;
        const DURABLE = 0b00000010;
        const AUTO_DELETE = 0b00000100;
        const INTERNAL = 0b00001000;
        const NO_WAIT = 0b00010000;
    }
}

impl Default for ExchangeDeclareFlags {
    fn default() -> Self {
        ExchangeDeclareFlags::empty()
    }
}

#[derive(Debug, Default)]
pub struct ExchangeDeclareArgs {
    pub exchange_name: String,
    pub exchange_type: String,
    pub flags: ExchangeDeclareFlags,
    pub args: Option<FieldTable>,
}

impl ExchangeDeclareArgs {
    pub fn exchange_name(mut self, exchange_name: &str) -> Self {
        self.exchange_name = exchange_name.to_string();
        self
    }

    pub fn exchange_type(mut self, exchange_type: &str) -> Self {
        self.exchange_type = exchange_type.to_string();
        self
    }

    pub fn durable(mut self, mode: bool) -> Self {
        self.flags.set(ExchangeDeclareFlags::DURABLE, mode);
        self
    }

    pub fn auto_delete(mut self, mode: bool) -> Self {
        self.flags.set(ExchangeDeclareFlags::AUTO_DELETE, mode);
        self
    }

    pub fn passive(mut self, mode: bool) -> Self {
        self.flags.set(ExchangeDeclareFlags::PASSIVE, mode);
        self
    }

    pub fn frame(self, channel: Channel) -> AMQPFrame {
        AMQPFrame::Method(channel, super::EXCHANGE_DECLARE, MethodFrameArgs::ExchangeDeclare(self))
    }
}

bitflags! {
    #[derive(Debug)]
    pub struct ExchangeDeleteFlags: u8 {
        const IF_UNUSED = 0b00000001;
        const NO_WAIT = 0b00000010;
    }
}

impl Default for ExchangeDeleteFlags {
    fn default() -> Self {
        ExchangeDeleteFlags::empty()
    }
}

#[derive(Debug, Default)]
pub struct ExchangeDeleteArgs {
    pub exchange_name: String,
    pub flags: ExchangeDeleteFlags,
}

impl ExchangeDeleteArgs {
    pub fn exchange_name(mut self, exchange_name: &str) -> Self {
        self.exchange_name = exchange_name.to_string();
        self
    }

    pub fn if_unused(mut self, mode: bool) -> Self {
        self.flags.set(ExchangeDeleteFlags::IF_UNUSED, mode);
        self
    }

    pub fn frame(self, channel: Channel) -> AMQPFrame {
        AMQPFrame::Method(channel, super::EXCHANGE_DELETE, MethodFrameArgs::ExchangeDelete(self))
    }
}

pub fn exchange_declare(
    channel: Channel,
    exchange_name: &str,
    exchange_type: &str,
    flags: Option<ExchangeDeclareFlags>,
) -> AMQPFrame {
    ExchangeDeclareArgs {
        exchange_name: exchange_name.to_string(),
        exchange_type: exchange_type.to_string(),
        flags: flags.unwrap_or_default(),
        args: None,
    }
    .frame(channel)
}

pub fn exchange_delete(channel: Channel, exchange_name: &str, flags: Option<ExchangeDeleteFlags>) -> AMQPFrame {
    ExchangeDeleteArgs {
        exchange_name: exchange_name.to_string(),
        flags: flags.unwrap_or_default(),
    }
    .frame(channel)
}
