use crate::client_error;
use crate::message::PublishedMessage;
use crate::model::ChannelNumber;
use crate::processor::{self, ClientRequest, ClientRequestSink, Param, WaitFor};
use anyhow::Result;
use coppermq_codec::frame::{self, AMQPFrame, MethodFrameArgs};
use tokio::sync::{oneshot, Mutex};

/// Condition for deleting an entity only if nobody uses it.
pub struct IfUnused(pub bool);
/// Condition for deleting a queue only if it is empty.
pub struct IfEmpty(pub bool);

/// A channel, the logical multiplexing unit of a connection.
///
/// Synchronous calls on a channel are mutually exclusive: the request frame
/// of the second call is not sent before the response of the first one
/// arrived, and content frames of a publish never interleave with another
/// call. Callers queue on the channel's call mutex in FIFO order.
pub struct Channel {
    pub channel: ChannelNumber,
    pub(crate) sink: ClientRequestSink,
    pub(crate) call_guard: Mutex<()>,
    pub(crate) consumer_tags: Vec<String>,
    confirm_mode: bool,
}

impl Channel {
    pub(crate) fn new(channel: ChannelNumber, sink: ClientRequestSink) -> Channel {
        Channel {
            channel,
            sink,
            call_guard: Mutex::new(()),
            consumer_tags: Vec::new(),
            confirm_mode: false,
        }
    }

    /// Run a method pair round trip, holding the channel's call mutex. With
    /// `no_wait` the request is only handed to the writer and no response
    /// is awaited.
    async fn method_pair(
        &self,
        frame: AMQPFrame,
        expected: frame::ClassMethod,
        no_wait: bool,
    ) -> Result<Option<AMQPFrame>> {
        let _call = self.call_guard.lock().await;

        if no_wait {
            processor::sync_send(&self.sink, frame).await?;

            Ok(None)
        } else {
            processor::call(&self.sink, frame, expected).await.map(Some)
        }
    }

    /// Declare an exchange.
    pub async fn exchange_declare(
        &self,
        exchange_name: &str,
        exchange_type: &str,
        flags: Option<frame::ExchangeDeclareFlags>,
    ) -> Result<()> {
        let no_wait = flags
            .as_ref()
            .is_some_and(|f| f.contains(frame::ExchangeDeclareFlags::NO_WAIT));
        let frame = frame::exchange_declare(self.channel, exchange_name, exchange_type, flags);

        self.method_pair(frame, frame::EXCHANGE_DECLARE_OK, no_wait).await?;

        Ok(())
    }

    /// Declare an exchange, letting the caller adjust the outgoing method
    /// arguments (for example to inject an arguments table) before the
    /// frame is sent.
    pub async fn exchange_declare_ex<F>(
        &self,
        exchange_name: &str,
        exchange_type: &str,
        flags: Option<frame::ExchangeDeclareFlags>,
        completion: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut frame::ExchangeDeclareArgs),
    {
        let mut args = frame::ExchangeDeclareArgs {
            exchange_name: exchange_name.to_string(),
            exchange_type: exchange_type.to_string(),
            flags: flags.unwrap_or_default(),
            args: None,
        };

        completion(&mut args);

        let no_wait = args.flags.contains(frame::ExchangeDeclareFlags::NO_WAIT);

        self.method_pair(args.frame(self.channel), frame::EXCHANGE_DECLARE_OK, no_wait)
            .await?;

        Ok(())
    }

    /// Delete an exchange.
    pub async fn exchange_delete(&self, exchange_name: &str, if_unused: IfUnused) -> Result<()> {
        let mut flags = frame::ExchangeDeleteFlags::default();
        flags.set(frame::ExchangeDeleteFlags::IF_UNUSED, if_unused.0);

        let frame = frame::exchange_delete(self.channel, exchange_name, Some(flags));

        self.method_pair(frame, frame::EXCHANGE_DELETE_OK, false).await?;

        Ok(())
    }

    /// Declare a queue. The reply carries the queue name the server
    /// assigned when the declared name was empty.
    pub async fn queue_declare(
        &self,
        queue_name: &str,
        flags: Option<frame::QueueDeclareFlags>,
    ) -> Result<frame::QueueDeclareOkArgs> {
        let no_wait = flags
            .as_ref()
            .is_some_and(|f| f.contains(frame::QueueDeclareFlags::NO_WAIT));
        let frame = frame::queue_declare(self.channel, queue_name, flags);

        match self.method_pair(frame, frame::QUEUE_DECLARE_OK, no_wait).await? {
            Some(AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeclareOk(args))) => Ok(args),
            None => Ok(frame::QueueDeclareOkArgs {
                name: queue_name.to_string(),
                ..Default::default()
            }),
            Some(other) => client_error!(
                Some(self.channel),
                502,
                format!("Unexpected response {:?}", other),
                frame::QUEUE_DECLARE
            ),
        }
    }

    /// Declare a queue with a completion callback mutating the outgoing
    /// method arguments before send.
    pub async fn queue_declare_ex<F>(
        &self,
        queue_name: &str,
        flags: Option<frame::QueueDeclareFlags>,
        completion: F,
    ) -> Result<frame::QueueDeclareOkArgs>
    where
        F: FnOnce(&mut frame::QueueDeclareArgs),
    {
        let mut args = frame::QueueDeclareArgs {
            name: queue_name.to_string(),
            flags: flags.unwrap_or_default(),
            args: None,
        };

        completion(&mut args);

        let no_wait = args.flags.contains(frame::QueueDeclareFlags::NO_WAIT);

        match self
            .method_pair(args.frame(self.channel), frame::QUEUE_DECLARE_OK, no_wait)
            .await?
        {
            Some(AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeclareOk(args))) => Ok(args),
            None => Ok(frame::QueueDeclareOkArgs {
                name: queue_name.to_string(),
                ..Default::default()
            }),
            Some(other) => client_error!(
                Some(self.channel),
                502,
                format!("Unexpected response {:?}", other),
                frame::QUEUE_DECLARE
            ),
        }
    }

    /// Bind a queue to an exchange.
    pub async fn queue_bind(&self, queue_name: &str, exchange_name: &str, routing_key: &str) -> Result<()> {
        let frame = frame::queue_bind(self.channel, queue_name, exchange_name, routing_key);

        self.method_pair(frame, frame::QUEUE_BIND_OK, false).await?;

        Ok(())
    }

    /// Bind a queue with a completion callback mutating the outgoing
    /// arguments, for example to set binding arguments.
    pub async fn queue_bind_ex<F>(
        &self,
        queue_name: &str,
        exchange_name: &str,
        routing_key: &str,
        completion: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut frame::QueueBindArgs),
    {
        let mut args = frame::QueueBindArgs::new(queue_name, exchange_name).routing_key(routing_key);

        completion(&mut args);

        let no_wait = args.no_wait;

        self.method_pair(args.frame(self.channel), frame::QUEUE_BIND_OK, no_wait)
            .await?;

        Ok(())
    }

    pub async fn queue_unbind(&self, queue_name: &str, exchange_name: &str, routing_key: &str) -> Result<()> {
        let frame = frame::queue_unbind(self.channel, queue_name, exchange_name, routing_key);

        self.method_pair(frame, frame::QUEUE_UNBIND_OK, false).await?;

        Ok(())
    }

    /// Unbind a queue with a completion callback mutating the outgoing
    /// arguments before send.
    pub async fn queue_unbind_ex<F>(
        &self,
        queue_name: &str,
        exchange_name: &str,
        routing_key: &str,
        completion: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut frame::QueueUnbindArgs),
    {
        let mut args = frame::QueueUnbindArgs::new(queue_name, exchange_name).routing_key(routing_key);

        completion(&mut args);

        self.method_pair(args.frame(self.channel), frame::QUEUE_UNBIND_OK, false)
            .await?;

        Ok(())
    }

    /// Purge a queue, dropping its messages. The reply carries the number
    /// of messages dropped.
    pub async fn queue_purge(&self, queue_name: &str) -> Result<u32> {
        let frame = frame::queue_purge(self.channel, queue_name);

        match self.method_pair(frame, frame::QUEUE_PURGE_OK, false).await? {
            Some(AMQPFrame::Method(_, _, MethodFrameArgs::QueuePurgeOk(args))) => Ok(args.message_count),
            _ => Ok(0),
        }
    }

    pub async fn queue_delete(&self, queue_name: &str, if_unused: IfUnused, if_empty: IfEmpty) -> Result<u32> {
        let mut flags = frame::QueueDeleteFlags::empty();
        flags.set(frame::QueueDeleteFlags::IF_UNUSED, if_unused.0);
        flags.set(frame::QueueDeleteFlags::IF_EMPTY, if_empty.0);

        let frame = frame::queue_delete(self.channel, queue_name, Some(flags));

        match self.method_pair(frame, frame::QUEUE_DELETE_OK, false).await? {
            Some(AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeleteOk(args))) => Ok(args.message_count),
            _ => Ok(0),
        }
    }

    /// Negotiate prefetching with the server.
    pub async fn basic_qos(&self, prefetch_size: u32, prefetch_count: u16, global: bool) -> Result<()> {
        let frame = frame::BasicQosArgs {
            prefetch_size,
            prefetch_count,
            global,
        }
        .frame(self.channel);

        self.method_pair(frame, frame::BASIC_QOS_OK, false).await?;

        Ok(())
    }

    /// Put the channel in confirm mode. From now on every publish on this
    /// channel waits for a publisher confirm from the server.
    pub async fn confirm_select(&mut self) -> Result<()> {
        self.method_pair(frame::confirm_select(self.channel), frame::CONFIRM_SELECT_OK, false)
            .await?;

        self.confirm_mode = true;

        Ok(())
    }

    /// Cancel a consumer by tag.
    pub async fn basic_cancel(&self, consumer_tag: &str) -> Result<()> {
        let frame = frame::BasicCancelArgs::new(consumer_tag).frame(self.channel);

        self.method_pair(frame, frame::BASIC_CANCEL_OK, false).await?;

        Ok(())
    }

    /// Publish a message.
    ///
    /// The method frame, the content header and the fragmented body go out
    /// as one unit under the channel's call mutex. In confirm mode the call
    /// returns when the server acked (or nacked) the publish; the confirm
    /// wait itself happens outside the mutex, so several publishes may be
    /// waiting for their confirms at the same time.
    pub async fn basic_publish(&self, exchange_name: &str, routing_key: &str, message: PublishedMessage) -> Result<()> {
        let args = frame::BasicPublishArgs::new(exchange_name)
            .routing_key(routing_key)
            .mandatory(message.mandatory)
            .immediate(message.immediate);

        let mut content = message.message;
        content.channel = self.channel;

        let (sent_tx, sent_rx) = oneshot::channel();

        let confirm_rx = {
            let _call = self.call_guard.lock().await;

            let (confirm_tx, confirm_rx) = if self.confirm_mode {
                let (tx, rx) = oneshot::channel();

                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            self.sink
                .send(ClientRequest {
                    param: Param::Publish {
                        frame: Box::new(args.frame(self.channel)),
                        content,
                        confirm: confirm_tx,
                    },
                    response: WaitFor::SentOut(sent_tx),
                })
                .await?;

            match sent_rx.await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => return Err(e),
                Err(_) => return client_error!(None, 501, "Channel recv error", 0),
            }

            confirm_rx
        };

        if let Some(rx) = confirm_rx {
            match rx.await {
                Ok(result) => result,
                Err(_) => client_error!(Some(self.channel), 501, "Connection closed", frame::BASIC_PUBLISH),
            }
        } else {
            Ok(())
        }
    }

    /// Close the channel gracefully: cancel the consumers started on it,
    /// then run the `channel.close` method pair.
    pub async fn close(mut self) -> Result<()> {
        let tags = std::mem::take(&mut self.consumer_tags);

        for tag in tags {
            if let Err(e) = self.basic_cancel(&tag).await {
                log::debug!("Cancel of consumer {} failed during close: {:?}", tag, e);
            }
        }

        self.method_pair(
            frame::channel_close(self.channel, 200, "Normal close", frame::CHANNEL_CLOSE),
            frame::CHANNEL_CLOSE_OK,
            false,
        )
        .await?;

        Ok(())
    }

    /// Close the channel locally without talking to the broker. Consumers
    /// get a channel closed signal; used when the connection is already
    /// going away.
    pub async fn close_fast(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        self.sink
            .send(ClientRequest {
                param: Param::ChannelCloseFast(self.channel),
                response: WaitFor::SentOut(tx),
            })
            .await?;

        match rx.await {
            Ok(result) => result,
            Err(_) => client_error!(None, 501, "Channel recv error", 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// A stand-in for the connection engine: answers method pairs after an
    /// optional delay while keeping on receiving, and records how many
    /// calls were awaiting their response at the same time.
    fn spawn_fake_engine(
        mut requests: mpsc::Receiver<ClientRequest>,
        response_delay: std::time::Duration,
    ) -> Arc<AtomicUsize> {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&max_in_flight);

        tokio::spawn(async move {
            let in_flight = Arc::new(AtomicUsize::new(0));

            while let Some(request) = requests.recv().await {
                match request.response {
                    WaitFor::FrameResponse { expected, tx } => {
                        let previous = in_flight.fetch_add(1, Ordering::SeqCst);
                        seen.fetch_max(previous + 1, Ordering::SeqCst);

                        let channel = match &request.param {
                            Param::Frame(AMQPFrame::Method(ch, _, _)) => *ch,
                            _ => 0,
                        };

                        // reply from a separate task so overlapping requests
                        // would be observed by the in-flight counter
                        let in_flight = Arc::clone(&in_flight);

                        tokio::spawn(async move {
                            tokio::time::sleep(response_delay).await;

                            let response = AMQPFrame::Method(channel, expected, response_args(expected));
                            let _ = tx.send(Ok(response));

                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    WaitFor::SentOut(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    WaitFor::Nothing => (),
                }
            }
        });

        max_in_flight
    }

    fn response_args(expected: frame::ClassMethod) -> MethodFrameArgs {
        match expected {
            frame::QUEUE_DECLARE_OK => MethodFrameArgs::QueueDeclareOk(frame::QueueDeclareOkArgs {
                name: "server-named".to_string(),
                message_count: 0,
                consumer_count: 0,
            }),
            frame::QUEUE_BIND_OK => MethodFrameArgs::QueueBindOk,
            frame::EXCHANGE_DECLARE_OK => MethodFrameArgs::ExchangeDeclareOk,
            frame::CONFIRM_SELECT_OK => MethodFrameArgs::ConfirmSelectOk,
            frame::CHANNEL_CLOSE_OK => MethodFrameArgs::ChannelCloseOk,
            frame::BASIC_CANCEL_OK => MethodFrameArgs::BasicCancelOk(frame::BasicCancelOkArgs::new("ctag")),
            frame::BASIC_QOS_OK => MethodFrameArgs::BasicQosOk,
            _ => MethodFrameArgs::ChannelOpenOk,
        }
    }

    #[tokio::test]
    async fn queue_declare_returns_server_assigned_name() {
        let (tx, rx) = mpsc::channel(16);
        spawn_fake_engine(rx, std::time::Duration::from_millis(0));

        let channel = Channel::new(1, tx);
        let declare_ok = channel.queue_declare("", None).await.unwrap();

        assert_eq!(declare_ok.name, "server-named");
    }

    #[tokio::test]
    async fn concurrent_method_pairs_do_not_interleave() {
        let (tx, rx) = mpsc::channel(16);
        let max_in_flight = spawn_fake_engine(rx, std::time::Duration::from_millis(20));

        let channel = Channel::new(1, tx);

        let (r1, r2, r3) = tokio::join!(
            channel.queue_declare("q1", None),
            channel.queue_bind("q1", "x", "rk"),
            channel.basic_qos(0, 10, false),
        );

        r1.unwrap();
        r2.unwrap();
        r3.unwrap();

        // the second request is not sent before the first response arrived
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_without_confirm_mode_returns_after_sent() {
        let (tx, rx) = mpsc::channel(16);
        spawn_fake_engine(rx, std::time::Duration::from_millis(0));

        let channel = Channel::new(1, tx);

        channel
            .basic_publish("x", "rk", PublishedMessage::default().text("hello"))
            .await
            .unwrap();
    }
}
