use std::time::Duration;

use crate::{
    channel_api::Channel,
    client_error,
    message::{DeliveredMessage, GetMessage},
    model,
    processor::{self, ClientRequest, ClientRequestSink, Param, WaitFor},
};
use anyhow::Result;
use coppermq_codec::frame;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A signal arriving from the server during consuming a queue.
#[derive(Debug)]
pub enum ConsumerSignal {
    Delivered(Box<DeliveredMessage>),
    /// The consume was cancelled, either by us or by the server. Intentional
    /// teardown, not an error.
    Cancelled,
    ChannelClosed {
        reply_code: u16,
        reply_text: String,
        class_method: u32,
    },
    ConnectionClosed {
        reply_code: u16,
        reply_text: String,
        class_method: u32,
    },
}

/// A signal for handling the result of a `Basic.Get` from the server.
#[derive(Debug)]
pub enum GetSignal {
    GetOk(Box<GetMessage>),
    GetEmpty,
    ChannelClosed {
        reply_code: u16,
        reply_text: String,
        class_method: u32,
    },
    ConnectionClosed {
        reply_code: u16,
        reply_text: String,
        class_method: u32,
    },
}

/// Consumer API for `Basic.Consume`.
///
/// A `ConsumerHandler` is got by invoking [`Channel::basic_consume`]. The
/// messages and the channel lifecycle events arrive on `signal_stream`;
/// alternatively [`ConsumerHandler::start`] spawns a processing task which
/// invokes a callback per message and acknowledges automatically.
pub struct ConsumerHandler {
    /// The channel number we are consuming messages on.
    pub channel: model::ChannelNumber,
    /// Identifier of the consumer in the server.
    pub consumer_tag: String,
    /// The consumer was started in no-ack mode, the server does not expect
    /// acknowledgements.
    pub no_ack: bool,
    client_sink: ClientRequestSink,
    /// Stream of [`ConsumerSignal`] values: deliveries, cancellation and
    /// channel or connection close events.
    pub signal_stream: mpsc::UnboundedReceiver<ConsumerSignal>,
}

/// Handler for the result of a `Basic.Get`, a passive consume.
pub struct GetHandler {
    /// The channel on which the client is doing the get operation.
    pub channel: model::ChannelNumber,
    /// Stream delivering `GetOk` with the message or `GetEmpty` if the
    /// queue has no message.
    pub signal_stream: mpsc::UnboundedReceiver<GetSignal>,
    client_sink: ClientRequestSink,
}

impl ConsumerHandler {
    pub async fn receive(&mut self, timeout: Duration) -> Option<ConsumerSignal> {
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        tokio::select! {
            signal = self.signal_stream.recv() => {
                signal
            }
            _ = &mut sleep => {
                None
            }
        }
    }

    /// Spawn the delivery processing task. Every delivered message is
    /// handed to `on_message` and, unless the consumer was started in
    /// no-ack mode, acknowledged afterwards. When the consume is cancelled
    /// `on_cancel` runs once and the task stops; channel or connection
    /// close stops the task silently.
    pub fn start<F, C>(mut self, mut on_message: F, on_cancel: C) -> JoinHandle<()>
    where
        F: FnMut(DeliveredMessage) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move {
            let mut on_cancel = Some(on_cancel);

            while let Some(signal) = self.signal_stream.recv().await {
                match signal {
                    ConsumerSignal::Delivered(message) => {
                        let delivery_tag = message.delivery_tag;

                        on_message(*message);

                        if !self.no_ack {
                            let ack = frame::BasicAckArgs::default()
                                .delivery_tag(delivery_tag)
                                .frame(self.channel);

                            if processor::sync_send(&self.client_sink, ack).await.is_err() {
                                break;
                            }
                        }
                    }
                    ConsumerSignal::Cancelled => {
                        if let Some(cb) = on_cancel.take() {
                            cb();
                        }

                        break;
                    }
                    ConsumerSignal::ChannelClosed { .. } | ConsumerSignal::ConnectionClosed { .. } => break,
                }
            }
        })
    }

    pub async fn basic_ack(&self, delivery_tag: u64) -> Result<()> {
        processor::sync_send(
            &self.client_sink,
            frame::BasicAckArgs::default()
                .delivery_tag(delivery_tag)
                .multiple(false)
                .frame(self.channel),
        )
        .await
    }

    pub async fn basic_nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<()> {
        processor::sync_send(
            &self.client_sink,
            frame::BasicNackArgs::default()
                .delivery_tag(delivery_tag)
                .multiple(multiple)
                .requeue(requeue)
                .frame(self.channel),
        )
        .await
    }

    pub async fn basic_reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        processor::sync_send(
            &self.client_sink,
            frame::BasicRejectArgs::default()
                .delivery_tag(delivery_tag)
                .requeue(requeue)
                .frame(self.channel),
        )
        .await
    }

    /// Stop consuming with a `basic.cancel` method pair.
    pub async fn basic_cancel(self) -> Result<()> {
        let frame = frame::BasicCancelArgs::new(&self.consumer_tag).frame(self.channel);

        processor::call(&self.client_sink, frame, frame::BASIC_CANCEL_OK)
            .await
            .map(|_| ())
    }
}

impl GetHandler {
    pub async fn receive(&mut self, timeout: Duration) -> Option<GetSignal> {
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        tokio::select! {
            signal = self.signal_stream.recv() => {
                signal
            }
            _ = &mut sleep => {
                None
            }
        }
    }

    pub async fn basic_ack(&self, delivery_tag: u64) -> Result<()> {
        processor::sync_send(
            &self.client_sink,
            frame::BasicAckArgs::default()
                .delivery_tag(delivery_tag)
                .multiple(false)
                .frame(self.channel),
        )
        .await
    }
}

/// Specify if the consume is exclusive aka no other client can consume the queue.
pub struct Exclusive(pub bool);
/// Specify if the client needs to ack messages after delivery.
pub struct NoAck(pub bool);
/// Specify if the server sends messages to the same connection which published them.
pub struct NoLocal(pub bool);

impl Channel {
    /// Start consuming a queue.
    ///
    /// The consumer tag is generated by the client and confirmed by the
    /// server in `basic.consume-ok`. The returned handler carries the
    /// signal stream with the deliveries.
    ///
    /// ```no_run
    /// use coppermq_client::{Channel, ConsumerSignal, Exclusive, NoAck, NoLocal};
    ///
    /// async fn consume(channel: &mut Channel) {
    ///     let mut handler = channel.basic_consume("queue", NoAck(false), Exclusive(false),
    ///         NoLocal(false)).await.unwrap();
    ///
    ///     while let Some(signal) = handler.signal_stream.recv().await {
    ///         match signal {
    ///             ConsumerSignal::Delivered(m) => {
    ///                 handler.basic_ack(m.delivery_tag).await.unwrap();
    ///             }
    ///             ConsumerSignal::Cancelled | ConsumerSignal::ChannelClosed { .. } |
    ///                 ConsumerSignal::ConnectionClosed { .. } => {
    ///                 break;
    ///             }
    ///         }
    ///     }
    /// }
    /// ```
    pub async fn basic_consume(
        &mut self,
        queue_name: &str,
        no_ack: NoAck,
        exclusive: Exclusive,
        no_local: NoLocal,
    ) -> Result<ConsumerHandler> {
        let consumer_tag = generated_consumer_tag();

        let frame = frame::BasicConsumeArgs::default()
            .queue(queue_name)
            .consumer_tag(&consumer_tag)
            .no_ack(no_ack.0)
            .exclusive(exclusive.0)
            .no_local(no_local.0)
            .frame(self.channel);

        let (signal_sink, signal_stream) = mpsc::unbounded_channel::<ConsumerSignal>();

        let handler = ConsumerHandler {
            channel: self.channel,
            consumer_tag: consumer_tag.clone(),
            no_ack: no_ack.0,
            client_sink: self.sink.clone(),
            signal_stream,
        };

        let (tx, rx) = oneshot::channel();

        {
            let _call = self.call_guard.lock().await;

            self.sink
                .send(ClientRequest {
                    param: Param::Consume {
                        frame: Box::new(frame),
                        channel: self.channel,
                        consumer_tag: consumer_tag.clone(),
                        sink: signal_sink,
                    },
                    response: WaitFor::FrameResponse {
                        expected: frame::BASIC_CONSUME_OK,
                        tx,
                    },
                })
                .await?;

            match rx.await {
                Ok(Ok(_consume_ok)) => (),
                Ok(Err(e)) => return Err(e),
                Err(_) => return client_error!(None, 501, "Channel recv error", 0),
            }
        }

        self.consumer_tags.push(consumer_tag);

        Ok(handler)
    }

    /// Start consuming without waiting for `basic.consume-ok`; the client
    /// generated consumer tag is adopted immediately.
    pub async fn basic_consume_no_wait(
        &mut self,
        queue_name: &str,
        no_ack: NoAck,
        exclusive: Exclusive,
        no_local: NoLocal,
    ) -> Result<ConsumerHandler> {
        let consumer_tag = generated_consumer_tag();

        let frame = frame::BasicConsumeArgs::default()
            .queue(queue_name)
            .consumer_tag(&consumer_tag)
            .no_ack(no_ack.0)
            .exclusive(exclusive.0)
            .no_local(no_local.0)
            .no_wait(true)
            .frame(self.channel);

        let (signal_sink, signal_stream) = mpsc::unbounded_channel::<ConsumerSignal>();

        let handler = ConsumerHandler {
            channel: self.channel,
            consumer_tag: consumer_tag.clone(),
            no_ack: no_ack.0,
            client_sink: self.sink.clone(),
            signal_stream,
        };

        let (tx, rx) = oneshot::channel();

        {
            let _call = self.call_guard.lock().await;

            self.sink
                .send(ClientRequest {
                    param: Param::Consume {
                        frame: Box::new(frame),
                        channel: self.channel,
                        consumer_tag: consumer_tag.clone(),
                        sink: signal_sink,
                    },
                    response: WaitFor::SentOut(tx),
                })
                .await?;

            match rx.await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => return Err(e),
                Err(_) => return client_error!(None, 501, "Channel recv error", 0),
            }
        }

        self.consumer_tags.push(consumer_tag);

        Ok(handler)
    }

    /// Get a single message from a queue without a standing consume.
    pub async fn basic_get(&self, queue_name: &str, no_ack: NoAck) -> Result<GetHandler> {
        let (signal_sink, signal_stream) = mpsc::unbounded_channel();

        let handler = GetHandler {
            channel: self.channel,
            signal_stream,
            client_sink: self.sink.clone(),
        };

        let frame = frame::BasicGetArgs::new(queue_name).no_ack(no_ack.0).frame(self.channel);

        let (tx, rx) = oneshot::channel();

        let _call = self.call_guard.lock().await;

        self.sink
            .send(ClientRequest {
                param: Param::Get {
                    frame: Box::new(frame),
                    channel: self.channel,
                    sink: signal_sink,
                },
                response: WaitFor::SentOut(tx),
            })
            .await?;

        match rx.await {
            Ok(Ok(())) => Ok(handler),
            Ok(Err(e)) => Err(e),
            Err(_) => client_error!(None, 501, "Channel recv error", 0),
        }
    }
}

fn generated_consumer_tag() -> String {
    format!("coppermq-{}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coppermq_codec::frame::{AMQPFrame, MethodFrameArgs};
    use std::time::Duration;

    fn test_handler(no_ack: bool) -> (
        ConsumerHandler,
        mpsc::UnboundedSender<ConsumerSignal>,
        mpsc::Receiver<ClientRequest>,
    ) {
        let (req_tx, req_rx) = mpsc::channel(16);
        let (signal_tx, signal_stream) = mpsc::unbounded_channel();

        let handler = ConsumerHandler {
            channel: 1,
            consumer_tag: "ctag-test".to_string(),
            no_ack,
            client_sink: req_tx,
            signal_stream,
        };

        (handler, signal_tx, req_rx)
    }

    fn delivered(delivery_tag: u64) -> ConsumerSignal {
        ConsumerSignal::Delivered(Box::new(DeliveredMessage {
            delivery_tag,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn start_acks_exactly_once_after_the_callback() {
        let (handler, signal_tx, mut req_rx) = test_handler(false);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let join = handler.start(
            move |message| {
                seen_tx.send(message.delivery_tag).unwrap();
            },
            || (),
        );

        signal_tx.send(delivered(42)).unwrap();

        // the engine receives one ack for the delivery tag
        let request = req_rx.recv().await.unwrap();

        match request.param {
            Param::Frame(AMQPFrame::Method(1, cm, MethodFrameArgs::BasicAck(args))) => {
                assert_eq!(cm, coppermq_codec::frame::BASIC_ACK);
                assert_eq!(args.delivery_tag, 42);
                assert!(!args.multiple);
            }
            other => panic!("expected basic.ack, got {:?}", other),
        }

        if let WaitFor::SentOut(tx) = request.response {
            let _ = tx.send(Ok(()));
        }

        assert_eq!(seen_rx.recv().await, Some(42));

        // the callback ran before the ack was requested, and only once
        assert!(seen_rx.try_recv().is_err());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), req_rx.recv())
                .await
                .is_err()
        );

        signal_tx.send(ConsumerSignal::Cancelled).unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn start_does_not_ack_in_no_ack_mode() {
        let (handler, signal_tx, mut req_rx) = test_handler(true);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let join = handler.start(
            move |message| {
                seen_tx.send(message.delivery_tag).unwrap();
            },
            || (),
        );

        signal_tx.send(delivered(7)).unwrap();

        assert_eq!(seen_rx.recv().await, Some(7));

        // no ack goes out
        assert!(
            tokio::time::timeout(Duration::from_millis(50), req_rx.recv())
                .await
                .is_err()
        );

        signal_tx.send(ConsumerSignal::Cancelled).unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_invokes_the_cancel_callback_and_stops() {
        let (handler, signal_tx, _req_rx) = test_handler(true);
        let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();

        let join = handler.start(
            |_| (),
            move || {
                cancel_tx.send(()).unwrap();
            },
        );

        signal_tx.send(ConsumerSignal::Cancelled).unwrap();

        join.await.unwrap();

        assert_eq!(cancel_rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn channel_close_stops_the_task_without_cancel_callback() {
        let (handler, signal_tx, _req_rx) = test_handler(true);
        let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();

        let join = handler.start(
            |_| (),
            move || {
                cancel_tx.send(()).unwrap();
            },
        );

        signal_tx
            .send(ConsumerSignal::ChannelClosed {
                reply_code: 200,
                reply_text: "Normal close".to_string(),
                class_method: 0,
            })
            .unwrap();

        join.await.unwrap();

        // intentional teardown, not a cancel
        assert!(cancel_rx.recv().await.is_none());
    }
}
