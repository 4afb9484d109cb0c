//! The connection state machine.
//!
//! Everything coming from the server or going to the server is an AMQP
//! frame; everything talking to the client API is a typed struct or a
//! signal on an mpsc channel. The state tracks the consumer registry, the
//! per-channel pending publisher confirms and the in-flight content
//! reassembly, and it is driven solely by the socket loop task, so none of
//! it needs locking.
use crate::client_api::{ConnectionSink, EventSignal};
use crate::client_error;
use crate::consumer::{ConsumerSignal, GetSignal};
use crate::message::{self, Content, DeliveredMessage, GetMessage, Message, MessageProperties, ReturnedMessage};
use crate::model::{ChannelNumber, ConnectionError};
use crate::processor::{ConsumerSink, GetSink};
use anyhow::Result;
use coppermq_codec::codec::Frame;
use coppermq_codec::frame::{self, AMQPFrame, ContentBodyFrame, ContentHeaderFrame, MethodFrameArgs};
use log::{debug, error};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::{mpsc, oneshot};

/// Frame type octet, channel short, length long and the end octet.
const FRAME_OVERHEAD: usize = 8;

const DEFAULT_FRAME_MAX: usize = 131_072;

/// A content being delivered by content frames, built step by step. The
/// `basic.deliver` (or `basic.get-ok`, `basic.return`) method frame opens
/// it, the content header sizes it and the body frames fill it up.
#[derive(Debug)]
struct DeliveredContent {
    message: Message,
    body_size: Option<u64>,
    body: Vec<u8>,
}

/// A publish waiting for its `basic.ack` in confirm mode. Confirms resolve
/// strictly in publish order, the broker acknowledges delivery tags
/// monotonically.
struct PendingConfirm {
    seq: u64,
    tx: oneshot::Sender<Result<()>>,
}

pub(crate) struct ClientState {
    /// Channel for sending out frames to the server.
    outgoing: mpsc::Sender<Frame>,
    /// The biggest payload which fits in one content body frame, from the
    /// negotiated frame max.
    payload_max: usize,
    /// Active consumers by channel and consumer tag.
    consumers: HashMap<(ChannelNumber, String), ConsumerSink>,
    /// Passive consumers (`Basic.Get`) by channel.
    passive_consumers: HashMap<ChannelNumber, GetSink>,
    /// In-flight content reassembly per channel.
    in_delivery: HashMap<ChannelNumber, DeliveredContent>,
    /// Channels in confirm mode.
    confirm_mode: HashSet<ChannelNumber>,
    /// Next publish sequence number per channel, confirm mode only.
    publish_seq: HashMap<ChannelNumber, u64>,
    /// Publishes waiting for their confirm, in publish order per channel.
    pending_confirms: HashMap<ChannelNumber, VecDeque<PendingConfirm>>,
    /// Channel for notifying the application about async events.
    event_sink: ConnectionSink,
    /// Guard so consumers and waiters are woken exactly once on teardown.
    closed: bool,
}

pub(crate) fn new(outgoing: mpsc::Sender<Frame>, event_sink: ConnectionSink) -> ClientState {
    ClientState {
        outgoing,
        payload_max: DEFAULT_FRAME_MAX - FRAME_OVERHEAD,
        consumers: HashMap::new(),
        passive_consumers: HashMap::new(),
        in_delivery: HashMap::new(),
        confirm_mode: HashSet::new(),
        publish_seq: HashMap::new(),
        pending_confirms: HashMap::new(),
        event_sink,
        closed: false,
    }
}

impl ClientState {
    pub(crate) async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.outgoing
            .send(frame)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot send frame {:?}", e))
    }

    /// Send out a method frame built by the client API, capturing the
    /// tuning parameters the frame carries.
    pub(crate) async fn handle_out_frame(
        &mut self,
        channel: ChannelNumber,
        cm: frame::ClassMethod,
        args: MethodFrameArgs,
    ) -> Result<()> {
        match &args {
            MethodFrameArgs::ConnectionTuneOk(tune_ok) => {
                if tune_ok.frame_max > 0 {
                    self.payload_max = (tune_ok.frame_max as usize).saturating_sub(FRAME_OVERHEAD);
                }
            }
            MethodFrameArgs::ConfirmSelect(_) => {
                self.confirm_mode.insert(channel);
            }
            _ => (),
        }

        self.send_frame(Frame::Frame(AMQPFrame::Method(channel, cm, args))).await
    }

    /// The server pings us, echo it back right away.
    pub(crate) async fn heartbeat_received(&mut self) -> Result<()> {
        self.send_frame(Frame::Frame(frame::heartbeat())).await
    }

    /// The server closes the connection with a reply code and text. Reply
    /// with close-ok and wake up everybody with the reason.
    pub(crate) async fn handle_connection_close(&mut self, args: frame::ConnectionCloseArgs) -> Result<()> {
        error!("Server closed the connection: code={} text={}", args.code, args.text);

        self.send_frame(Frame::Frame(frame::connection_close_ok())).await?;

        self.notify_connection_closed(
            args.code,
            &args.text,
            frame::unify_class_method(args.class_id, args.method_id),
        );

        Ok(())
    }

    /// Our graceful close finished.
    pub(crate) async fn connection_close_ok(&mut self) -> Result<()> {
        self.notify_connection_closed(200, "Normal close", frame::CONNECTION_CLOSE);

        Ok(())
    }

    /// The server closes a channel, reply with close-ok. Only that
    /// channel's consumers and confirms are affected.
    pub(crate) async fn handle_channel_close(
        &mut self,
        channel: ChannelNumber,
        args: frame::ChannelCloseArgs,
    ) -> Result<()> {
        error!(
            "Server closed channel {}: code={} text={}",
            channel, args.code, args.text
        );

        self.send_frame(Frame::Frame(frame::channel_close_ok(channel))).await?;

        let class_method = frame::unify_class_method(args.class_id, args.method_id);

        self.close_channel(channel, args.code, &args.text, class_method);

        if self
            .event_sink
            .send(EventSignal::ChannelClosed {
                channel,
                code: args.code,
                text: args.text,
                class_method,
            })
            .is_err()
        {
            debug!("Event stream is gone");
        }

        Ok(())
    }

    /// Our graceful channel close finished.
    pub(crate) async fn channel_close_ok(&mut self, channel: ChannelNumber) -> Result<()> {
        self.close_channel(channel, 200, "Normal close", frame::CHANNEL_CLOSE);

        Ok(())
    }

    /// Local only teardown of a channel, no frames are sent. Used while the
    /// connection itself is going away.
    pub(crate) async fn channel_close_fast(&mut self, channel: ChannelNumber) -> Result<()> {
        self.close_channel(channel, 200, "Channel closed", frame::CHANNEL_CLOSE);

        Ok(())
    }

    pub(crate) async fn on_channel_flow(&mut self, channel: ChannelNumber, args: frame::ChannelFlowArgs) -> Result<()> {
        self.send_frame(Frame::Frame(frame::channel_flow_ok(channel, args.active)))
            .await
    }

    /// Register the consumer before `basic.consume` goes out; a duplicate
    /// consumer tag on the same channel is refused.
    pub(crate) async fn basic_consume(
        &mut self,
        channel: ChannelNumber,
        consumer_tag: String,
        sink: ConsumerSink,
    ) -> Result<()> {
        if self.consumers.contains_key(&(channel, consumer_tag.clone())) {
            return client_error!(
                Some(channel),
                ConnectionError::NotAllowed as u16,
                format!("Duplicate consumer tag {}", consumer_tag),
                frame::BASIC_CONSUME
            );
        }

        self.consumers.insert((channel, consumer_tag), sink);

        Ok(())
    }

    /// Cancel confirmed by the server, drop the consumer.
    pub(crate) async fn basic_cancel_ok(
        &mut self,
        channel: ChannelNumber,
        args: &frame::BasicCancelOkArgs,
    ) -> Result<()> {
        if let Some(sink) = self.consumers.remove(&(channel, args.consumer_tag.clone())) {
            let _ = sink.send(ConsumerSignal::Cancelled);
        }

        Ok(())
    }

    /// The server cancels the consumer (for example its queue got deleted).
    /// With the consumer-cancel-notify capability the server tells us and
    /// expects a cancel-ok unless no-wait was set.
    pub(crate) async fn on_basic_cancel(&mut self, channel: ChannelNumber, args: frame::BasicCancelArgs) -> Result<()> {
        match self.consumers.remove(&(channel, args.consumer_tag.clone())) {
            Some(sink) => {
                let _ = sink.send(ConsumerSignal::Cancelled);
            }
            None => debug!("Cancel for unknown consumer {}", args.consumer_tag),
        }

        if !args.no_wait {
            self.send_frame(Frame::Frame(
                frame::BasicCancelOkArgs::new(&args.consumer_tag).frame(channel),
            ))
            .await?;
        }

        Ok(())
    }

    /// A delivery starts a new content reassembly on its channel. The
    /// content header and body frames complete it.
    pub(crate) async fn basic_deliver(&mut self, channel: ChannelNumber, args: frame::BasicDeliverArgs) -> Result<()> {
        if !self.consumers.contains_key(&(channel, args.consumer_tag.clone())) {
            debug!("Cannot find consumer {}, discarding frame", args.consumer_tag);

            return Ok(());
        }

        let message = Message::Delivered(DeliveredMessage {
            message: Content {
                channel,
                ..Default::default()
            },
            consumer_tag: args.consumer_tag,
            delivery_tag: args.delivery_tag,
            redelivered: args.redelivered,
            exchange: args.exchange_name,
            routing_key: args.routing_key,
        });

        self.start_delivery(channel, message);

        Ok(())
    }

    pub(crate) async fn basic_return(&mut self, channel: ChannelNumber, args: frame::BasicReturnArgs) -> Result<()> {
        let message = Message::Returned(ReturnedMessage {
            message: Content {
                channel,
                ..Default::default()
            },
            reply_code: args.reply_code,
            reply_text: args.reply_text,
            exchange: args.exchange_name,
            routing_key: args.routing_key,
        });

        self.start_delivery(channel, message);

        Ok(())
    }

    pub(crate) async fn basic_get(&mut self, channel: ChannelNumber, sink: GetSink) -> Result<()> {
        self.passive_consumers.insert(channel, sink);

        Ok(())
    }

    pub(crate) async fn basic_get_ok(&mut self, channel: ChannelNumber, args: frame::BasicGetOkArgs) -> Result<()> {
        let message = Message::Get(GetMessage {
            message: Content {
                channel,
                ..Default::default()
            },
            delivery_tag: args.delivery_tag,
            redelivered: args.redelivered,
            exchange: args.exchange_name,
            routing_key: args.routing_key,
            message_count: args.message_count,
        });

        self.start_delivery(channel, message);

        Ok(())
    }

    pub(crate) async fn basic_get_empty(&mut self, channel: ChannelNumber) -> Result<()> {
        if let Some(sink) = self.passive_consumers.remove(&channel) {
            let _ = sink.send(GetSignal::GetEmpty);
        }

        Ok(())
    }

    fn start_delivery(&mut self, channel: ChannelNumber, message: Message) {
        let previous = self.in_delivery.insert(
            channel,
            DeliveredContent {
                message,
                body_size: None,
                body: Vec::new(),
            },
        );

        if previous.is_some() {
            debug!("Incomplete content on channel {} dropped by a new delivery", channel);
        }
    }

    /// Attach a content header to the reassembly opened by the preceding
    /// method frame. Headers with no pending content, duplicate headers and
    /// headers of a foreign class are dropped; later frames of well-formed
    /// deliveries are not affected.
    pub(crate) async fn content_header(&mut self, header: ContentHeaderFrame) -> Result<()> {
        let channel = header.channel;

        let Some(dc) = self.in_delivery.get_mut(&channel) else {
            debug!("Content header on channel {} with no pending content", channel);

            return Ok(());
        };

        if dc.body_size.is_some() {
            debug!("Duplicate content header on channel {}, discarding", channel);

            return Ok(());
        }

        if header.class_id != frame::BASIC_CLASS {
            debug!(
                "Content header class {} does not match the delivery, discarding",
                header.class_id
            );

            return Ok(());
        }

        let body_size = header.body_size;

        dc.body_size = Some(body_size);
        dc.body.reserve_exact(body_size as usize);

        let props: MessageProperties = header.into();
        dc.message.content_mut().properties = props;

        if body_size == 0 {
            self.complete_delivery(channel).await?;
        }

        Ok(())
    }

    /// Append a body fragment, completing the reassembly when the received
    /// bytes reach the declared body size.
    pub(crate) async fn content_body(&mut self, body: ContentBodyFrame) -> Result<()> {
        let channel = body.channel;

        let Some(dc) = self.in_delivery.get_mut(&channel) else {
            debug!("Content body on channel {} with no pending content", channel);

            return Ok(());
        };

        let Some(body_size) = dc.body_size else {
            debug!("Content body on channel {} before the content header", channel);

            return Ok(());
        };

        dc.body.extend_from_slice(&body.body);

        if dc.body.len() as u64 >= body_size {
            self.complete_delivery(channel).await?;
        }

        Ok(())
    }

    async fn complete_delivery(&mut self, channel: ChannelNumber) -> Result<()> {
        let Some(dc) = self.in_delivery.remove(&channel) else {
            return Ok(());
        };

        let DeliveredContent { mut message, body, .. } = dc;

        message.content_mut().body = body;

        match message {
            Message::Delivered(dm) => {
                match self.consumers.get(&(channel, dm.consumer_tag.clone())) {
                    Some(sink) => {
                        if sink.send(ConsumerSignal::Delivered(Box::new(dm))).is_err() {
                            debug!("Consumer stream on channel {} is gone", channel);
                        }
                    }
                    None => debug!("Consumer {} is gone, dropping the delivery", dm.consumer_tag),
                }
            }
            Message::Returned(rm) => {
                if self
                    .event_sink
                    .send(EventSignal::BasicReturn {
                        channel,
                        message: Box::new(rm),
                    })
                    .is_err()
                {
                    debug!("Event stream is gone, dropping the returned message");
                }
            }
            Message::Get(gm) => {
                if let Some(sink) = self.passive_consumers.remove(&channel) {
                    let _ = sink.send(GetSignal::GetOk(Box::new(gm)));
                }
            }
        }

        Ok(())
    }

    /// Publish a message: the method frame, the content header and the body
    /// split into payload-max sized fragments go out as one batch. In
    /// confirm mode the publish gets the next sequence number and a pending
    /// confirm entry.
    pub(crate) async fn basic_publish(
        &mut self,
        channel: ChannelNumber,
        args: frame::BasicPublishArgs,
        content: Content,
        confirm: Option<oneshot::Sender<Result<()>>>,
    ) -> Result<()> {
        let (mut header, body) = message::to_content_frames(content);

        header.channel = channel;
        header.class_id = frame::BASIC_CLASS;

        let mut frames = Vec::with_capacity(2 + body.len() / self.payload_max.max(1));
        frames.push(args.frame(channel));
        frames.push(header.frame());

        for chunk in body.chunks(self.payload_max.max(1)) {
            frames.push(
                ContentBodyFrame {
                    channel,
                    body: chunk.to_vec(),
                }
                .frame(),
            );
        }

        if let Some(tx) = confirm {
            if self.confirm_mode.contains(&channel) {
                let seq = self.publish_seq.entry(channel).or_insert(0);
                *seq += 1;

                self.pending_confirms
                    .entry(channel)
                    .or_default()
                    .push_back(PendingConfirm { seq: *seq, tx });
            } else {
                let _ = tx.send(Ok(()));
            }
        }

        self.send_frame(Frame::Frames(frames)).await
    }

    /// Publisher confirm from the server.
    pub(crate) async fn on_basic_ack(&mut self, channel: ChannelNumber, args: frame::BasicAckArgs) -> Result<()> {
        if !self.confirm_mode.contains(&channel) {
            debug!("basic.ack on channel {} outside confirm mode, ignoring", channel);

            return Ok(());
        }

        self.resolve_confirms(channel, args.delivery_tag, args.multiple, false, frame::BASIC_ACK);

        Ok(())
    }

    /// Negative publisher confirm, the pending publish failed.
    pub(crate) async fn on_basic_nack(&mut self, channel: ChannelNumber, args: frame::BasicNackArgs) -> Result<()> {
        if !self.confirm_mode.contains(&channel) {
            debug!("basic.nack on channel {} outside confirm mode, ignoring", channel);

            return Ok(());
        }

        let multiple = args.is_multiple();

        self.resolve_confirms(channel, args.delivery_tag, multiple, true, frame::BASIC_NACK);

        Ok(())
    }

    /// Resolve pending confirms in FIFO order. With `multiple` every entry
    /// up to and including the delivery tag is resolved; without it only the
    /// exactly matching entry. A tag older than the oldest pending publish
    /// is a protocol violation reported to that waiter alone.
    fn resolve_confirms(
        &mut self,
        channel: ChannelNumber,
        delivery_tag: u64,
        multiple: bool,
        nacked: bool,
        cm: frame::ClassMethod,
    ) {
        let Some(queue) = self.pending_confirms.get_mut(&channel) else {
            debug!("Confirm on channel {} with no pending publish", channel);

            return;
        };

        let Some(oldest) = queue.front().map(|p| p.seq) else {
            debug!("Confirm on channel {} with no pending publish", channel);

            return;
        };

        if delivery_tag < oldest {
            if let Some(pending) = queue.pop_front() {
                let _ = pending.tx.send(client_error!(
                    Some(channel),
                    ConnectionError::UnexpectedFrame as u16,
                    format!(
                        "Confirm delivery tag {} is older than the oldest pending publish {}",
                        delivery_tag, oldest
                    ),
                    cm
                ));
            }

            return;
        }

        if multiple {
            while queue.front().map_or(false, |p| p.seq <= delivery_tag) {
                if let Some(pending) = queue.pop_front() {
                    let _ = pending.tx.send(confirm_result(channel, pending.seq, nacked, cm));
                }
            }
        } else {
            match queue.iter().position(|p| p.seq == delivery_tag) {
                Some(pos) => {
                    if let Some(pending) = queue.remove(pos) {
                        let _ = pending.tx.send(confirm_result(channel, pending.seq, nacked, cm));
                    }
                }
                None => debug!("Confirm for unknown delivery tag {} on channel {}", delivery_tag, channel),
            }
        }
    }

    /// Wake up everything blocked on this connection, exactly once.
    pub(crate) async fn shutdown(&mut self) {
        self.notify_connection_closed(200, "Connection closed", frame::CONNECTION_CLOSE);
    }

    fn notify_connection_closed(&mut self, code: u16, text: &str, class_method: frame::ClassMethod) {
        if self.closed {
            return;
        }

        self.closed = true;

        for (_, sink) in self.consumers.drain() {
            let _ = sink.send(ConsumerSignal::ConnectionClosed {
                reply_code: code,
                reply_text: text.to_string(),
                class_method,
            });
        }

        for (_, sink) in self.passive_consumers.drain() {
            let _ = sink.send(GetSignal::ConnectionClosed {
                reply_code: code,
                reply_text: text.to_string(),
                class_method,
            });
        }

        for (channel, mut queue) in self.pending_confirms.drain() {
            for pending in queue.drain(..) {
                let _ = pending
                    .tx
                    .send(client_error!(Some(channel), code, text.to_string(), class_method));
            }
        }

        let _ = self.event_sink.send(EventSignal::ConnectionClosed {
            code,
            text: text.to_string(),
            class_method,
        });
    }

    fn close_channel(&mut self, channel: ChannelNumber, code: u16, text: &str, class_method: frame::ClassMethod) {
        let tags: Vec<_> = self
            .consumers
            .keys()
            .filter(|(ch, _)| *ch == channel)
            .cloned()
            .collect();

        for key in tags {
            if let Some(sink) = self.consumers.remove(&key) {
                let _ = sink.send(ConsumerSignal::ChannelClosed {
                    reply_code: code,
                    reply_text: text.to_string(),
                    class_method,
                });
            }
        }

        if let Some(sink) = self.passive_consumers.remove(&channel) {
            let _ = sink.send(GetSignal::ChannelClosed {
                reply_code: code,
                reply_text: text.to_string(),
                class_method,
            });
        }

        if let Some(mut queue) = self.pending_confirms.remove(&channel) {
            for pending in queue.drain(..) {
                let _ = pending
                    .tx
                    .send(client_error!(Some(channel), code, text.to_string(), class_method));
            }
        }

        self.confirm_mode.remove(&channel);
        self.publish_seq.remove(&channel);
        self.in_delivery.remove(&channel);
    }
}

fn confirm_result(channel: ChannelNumber, seq: u64, nacked: bool, cm: frame::ClassMethod) -> Result<()> {
    if nacked {
        client_error!(
            Some(channel),
            ConnectionError::InternalError as u16,
            format!("Publish {} was not confirmed by the server", seq),
            cm
        )
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coppermq_codec::frame::HeaderPropertyFlags;

    fn test_state() -> (
        ClientState,
        mpsc::Receiver<Frame>,
        mpsc::UnboundedReceiver<EventSignal>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (new(out_tx, event_tx), out_rx, event_rx)
    }

    fn deliver_args(consumer_tag: &str, delivery_tag: u64) -> frame::BasicDeliverArgs {
        frame::BasicDeliverArgs::new(consumer_tag, delivery_tag, "x-events").routing_key("rk")
    }

    fn content_header(channel: ChannelNumber, body_size: u64) -> ContentHeaderFrame {
        ContentHeaderFrame {
            channel,
            class_id: frame::BASIC_CLASS,
            body_size,
            ..Default::default()
        }
    }

    async fn publish_with_confirm(cs: &mut ClientState, channel: ChannelNumber) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();

        cs.basic_publish(
            channel,
            frame::BasicPublishArgs::new("x").routing_key("rk"),
            Content {
                channel,
                body: b"payload".to_vec(),
                ..Default::default()
            },
            Some(tx),
        )
        .await
        .unwrap();

        rx
    }

    #[tokio::test]
    async fn multiple_ack_resolves_older_confirms_in_fifo_order() {
        let (mut cs, mut out_rx, _events) = test_state();

        cs.handle_out_frame(1, frame::CONFIRM_SELECT, MethodFrameArgs::ConfirmSelect(Default::default()))
            .await
            .unwrap();

        let mut waiters = Vec::new();

        for _ in 0..5 {
            waiters.push(publish_with_confirm(&mut cs, 1).await);
        }

        cs.on_basic_ack(
            1,
            frame::BasicAckArgs::default().delivery_tag(3).multiple(true),
        )
        .await
        .unwrap();

        let mut resolved = Vec::new();

        for mut rx in waiters {
            resolved.push(rx.try_recv().is_ok());
        }

        assert_eq!(resolved, vec![true, true, true, false, false]);

        // the outgoing queue holds confirm.select and the publish batches
        assert!(out_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn ack_older_than_oldest_pending_is_a_protocol_error() {
        let (mut cs, _out_rx, _events) = test_state();

        cs.handle_out_frame(1, frame::CONFIRM_SELECT, MethodFrameArgs::ConfirmSelect(Default::default()))
            .await
            .unwrap();

        // five publishes, the first four already confirmed
        let mut waiters = Vec::new();

        for _ in 0..5 {
            waiters.push(publish_with_confirm(&mut cs, 1).await);
        }

        cs.on_basic_ack(
            1,
            frame::BasicAckArgs::default().delivery_tag(4).multiple(true),
        )
        .await
        .unwrap();

        for rx in waiters.drain(..4) {
            assert!(rx.await.unwrap().is_ok());
        }

        // oldest pending is 5 now, an ack for 3 is inconsistent
        cs.on_basic_ack(1, frame::BasicAckArgs::default().delivery_tag(3))
            .await
            .unwrap();

        let outcome = waiters.pop().unwrap().await.unwrap();
        let err = outcome.unwrap_err().downcast::<crate::error::ClientError>().unwrap();

        assert_eq!(err.code, ConnectionError::UnexpectedFrame as u16);
    }

    #[tokio::test]
    async fn single_ack_resolves_only_the_matching_confirm() {
        let (mut cs, _out_rx, _events) = test_state();

        cs.handle_out_frame(1, frame::CONFIRM_SELECT, MethodFrameArgs::ConfirmSelect(Default::default()))
            .await
            .unwrap();

        let mut waiters = Vec::new();

        for _ in 0..3 {
            waiters.push(publish_with_confirm(&mut cs, 1).await);
        }

        cs.on_basic_ack(1, frame::BasicAckArgs::default().delivery_tag(2))
            .await
            .unwrap();

        assert!(waiters.remove(1).await.unwrap().is_ok());
        assert!(waiters[0].try_recv().is_err());
        assert!(waiters[1].try_recv().is_err());
    }

    #[tokio::test]
    async fn nack_fails_the_pending_publish() {
        let (mut cs, _out_rx, _events) = test_state();

        cs.handle_out_frame(1, frame::CONFIRM_SELECT, MethodFrameArgs::ConfirmSelect(Default::default()))
            .await
            .unwrap();

        let rx = publish_with_confirm(&mut cs, 1).await;

        cs.on_basic_nack(1, frame::BasicNackArgs::default().delivery_tag(1))
            .await
            .unwrap();

        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn content_reassembly_from_two_fragments() {
        let (mut cs, _out_rx, _events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        cs.basic_consume(4, "ctag-1".to_string(), sink).await.unwrap();
        cs.basic_deliver(4, deliver_args("ctag-1", 42)).await.unwrap();
        cs.content_header(content_header(4, 10)).await.unwrap();

        cs.content_body(ContentBodyFrame {
            channel: 4,
            body: b"012345".to_vec(),
        })
        .await
        .unwrap();

        // not complete yet
        assert!(stream.try_recv().is_err());

        cs.content_body(ContentBodyFrame {
            channel: 4,
            body: b"6789".to_vec(),
        })
        .await
        .unwrap();

        match stream.try_recv().unwrap() {
            ConsumerSignal::Delivered(dm) => {
                assert_eq!(dm.delivery_tag, 42);
                assert_eq!(dm.message.body, b"0123456789");
            }
            other => panic!("unexpected signal {:?}", other),
        }

        // exactly one delivery
        assert!(stream.try_recv().is_err());
    }

    #[tokio::test]
    async fn zero_length_body_completes_on_header() {
        let (mut cs, _out_rx, _events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        cs.basic_consume(2, "ctag-0".to_string(), sink).await.unwrap();
        cs.basic_deliver(2, deliver_args("ctag-0", 1)).await.unwrap();
        cs.content_header(content_header(2, 0)).await.unwrap();

        assert!(matches!(stream.try_recv().unwrap(), ConsumerSignal::Delivered(_)));
    }

    #[tokio::test]
    async fn unmatched_content_frames_are_discarded() {
        let (mut cs, _out_rx, _events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        // header and body without any pending delivery
        cs.content_header(content_header(3, 10)).await.unwrap();
        cs.content_body(ContentBodyFrame {
            channel: 3,
            body: b"junk".to_vec(),
        })
        .await
        .unwrap();

        // a correctly sequenced delivery on the same channel still works
        cs.basic_consume(3, "ctag-2".to_string(), sink).await.unwrap();
        cs.basic_deliver(3, deliver_args("ctag-2", 7)).await.unwrap();
        cs.content_header(content_header(3, 2)).await.unwrap();
        cs.content_body(ContentBodyFrame {
            channel: 3,
            body: b"ok".to_vec(),
        })
        .await
        .unwrap();

        match stream.try_recv().unwrap() {
            ConsumerSignal::Delivered(dm) => assert_eq!(dm.message.body, b"ok"),
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn mismatched_header_class_is_discarded() {
        let (mut cs, _out_rx, _events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        cs.basic_consume(5, "ctag-3".to_string(), sink).await.unwrap();
        cs.basic_deliver(5, deliver_args("ctag-3", 9)).await.unwrap();

        let mut foreign = content_header(5, 2);
        foreign.class_id = 0x28;

        cs.content_header(foreign).await.unwrap();

        // the delivery is still waiting for its real header
        assert!(stream.try_recv().is_err());

        cs.content_header(content_header(5, 2)).await.unwrap();
        cs.content_body(ContentBodyFrame {
            channel: 5,
            body: b"ok".to_vec(),
        })
        .await
        .unwrap();

        assert!(matches!(stream.try_recv().unwrap(), ConsumerSignal::Delivered(_)));
    }

    #[tokio::test]
    async fn delivery_for_unknown_consumer_is_dropped() {
        let (mut cs, _out_rx, _events) = test_state();

        cs.basic_deliver(6, deliver_args("nobody", 1)).await.unwrap();

        assert!(cs.in_delivery.is_empty());
    }

    #[tokio::test]
    async fn published_body_is_fragmented_by_payload_max() {
        let (mut cs, mut out_rx, _events) = test_state();

        cs.handle_out_frame(
            0,
            frame::CONNECTION_TUNE_OK,
            MethodFrameArgs::ConnectionTuneOk(frame::ConnectionTuneOkArgs {
                channel_max: 2047,
                frame_max: 16,
                heartbeat: 0,
            }),
        )
        .await
        .unwrap();

        // tune-ok frame itself
        assert!(out_rx.recv().await.is_some());

        cs.basic_publish(
            1,
            frame::BasicPublishArgs::new("x"),
            Content {
                channel: 1,
                body: vec![0u8; 20],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        match out_rx.recv().await.unwrap() {
            Frame::Frames(frames) => {
                // method, header and three body fragments of at most 8 bytes
                assert_eq!(frames.len(), 5);

                match &frames[1] {
                    AMQPFrame::ContentHeader(header) => {
                        assert_eq!(header.body_size, 20);
                        assert_eq!(header.prop_flags, HeaderPropertyFlags::empty());
                    }
                    other => panic!("expected content header, got {:?}", other),
                }

                for body_frame in &frames[2..] {
                    match body_frame {
                        AMQPFrame::ContentBody(cb) => assert!(cb.body.len() <= 8),
                        other => panic!("expected content body, got {:?}", other),
                    }
                }
            }
            other => panic!("expected a frame batch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn server_cancel_signals_the_consumer_and_replies() {
        let (mut cs, mut out_rx, _events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        cs.basic_consume(2, "ctag-9".to_string(), sink).await.unwrap();

        cs.on_basic_cancel(2, frame::BasicCancelArgs::new("ctag-9"))
            .await
            .unwrap();

        assert!(matches!(stream.try_recv().unwrap(), ConsumerSignal::Cancelled));

        match out_rx.recv().await.unwrap() {
            Frame::Frame(AMQPFrame::Method(2, cm, _)) => assert_eq!(cm, frame::BASIC_CANCEL_OK),
            other => panic!("expected cancel-ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connection_close_from_server_replies_and_signals() {
        let (mut cs, mut out_rx, mut events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        cs.basic_consume(2, "ctag-5".to_string(), sink).await.unwrap();

        cs.handle_connection_close(frame::ConnectionCloseArgs {
            code: 320,
            text: "Connection forced".to_string(),
            class_id: 0,
            method_id: 0,
        })
        .await
        .unwrap();

        match out_rx.recv().await.unwrap() {
            Frame::Frame(AMQPFrame::Method(0, cm, _)) => assert_eq!(cm, frame::CONNECTION_CLOSE_OK),
            other => panic!("expected close-ok, got {:?}", other),
        }

        match stream.try_recv().unwrap() {
            ConsumerSignal::ConnectionClosed { reply_code, .. } => assert_eq!(reply_code, 320),
            other => panic!("unexpected signal {:?}", other),
        }

        match events.try_recv().unwrap() {
            EventSignal::ConnectionClosed { code, text, .. } => {
                assert_eq!(code, 320);
                assert_eq!(text, "Connection forced");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn heartbeat_is_echoed() {
        let (mut cs, mut out_rx, _events) = test_state();

        cs.heartbeat_received().await.unwrap();

        assert!(matches!(
            out_rx.recv().await.unwrap(),
            Frame::Frame(AMQPFrame::Heartbeat(0))
        ));
    }

    #[tokio::test]
    async fn duplicate_consumer_tag_is_refused() {
        let (mut cs, _out_rx, _events) = test_state();
        let (sink1, _stream1) = mpsc::unbounded_channel();
        let (sink2, _stream2) = mpsc::unbounded_channel();

        cs.basic_consume(1, "same-tag".to_string(), sink1).await.unwrap();

        assert!(cs.basic_consume(1, "same-tag".to_string(), sink2).await.is_err());
    }

    #[tokio::test]
    async fn channel_close_fast_wakes_consumers_without_frames() {
        let (mut cs, mut out_rx, _events) = test_state();
        let (sink, mut stream) = mpsc::unbounded_channel();

        cs.basic_consume(3, "ctag-7".to_string(), sink).await.unwrap();
        cs.channel_close_fast(3).await.unwrap();

        assert!(matches!(
            stream.try_recv().unwrap(),
            ConsumerSignal::ChannelClosed { .. }
        ));

        assert!(out_rx.try_recv().is_err());
    }
}
