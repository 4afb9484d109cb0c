//! Request/response pattern on top of publish and consume.
//!
//! The client declares a reply queue, publishes requests with a generated
//! correlation id and a reply-to pointing at that queue, and matches the
//! replies back to the blocked callers by the correlation id. The server
//! consumes a named queue, runs a handler on every request and publishes
//! the response to the reply-to with the correlation id propagated.
use crate::channel_api::{Channel, IfEmpty, IfUnused};
use crate::consumer::{ConsumerHandler, ConsumerSignal, Exclusive, NoAck, NoLocal};
use crate::message::{MessageProperties, PublishedMessage};
use anyhow::anyhow;
use anyhow::Result;
use coppermq_codec::frame::QueueDeclareFlags;
use log::{debug, error};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A request arriving to an RPC server handler.
#[derive(Debug)]
pub struct RpcRequest {
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

/// The reply of a successful RPC call.
#[derive(Debug)]
pub struct RpcReply {
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

/// Outcome of an RPC call which did not succeed.
///
/// A timeout is recoverable: the request may still be processed by the
/// server, the caller may retry or abandon the call. Everything else is a
/// hard failure.
#[derive(Debug)]
pub enum RpcError {
    Timeout(Duration),
    Failed(anyhow::Error),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout(d) => write!(f, "no reply within {:?}", d),
            RpcError::Failed(e) => write!(f, "rpc call failed: {}", e),
        }
    }
}

impl std::error::Error for RpcError {}

type PendingCalls = Arc<Mutex<HashMap<String, oneshot::Sender<RpcReply>>>>;

/// The client role of the RPC pattern.
pub struct RpcClient {
    channel: Channel,
    exchange: String,
    routing_key: String,
    reply_to: String,
    consumer_tag: String,
    calls: PendingCalls,
    next_id: u64,
}

impl RpcClient {
    /// Set up the client: declare a server-named exclusive auto-delete
    /// reply queue, bind it when an exchange is used, and start consuming
    /// it in no-ack mode.
    pub async fn bind(mut channel: Channel, exchange: &str, routing_key: &str) -> Result<RpcClient> {
        let declare_ok = channel
            .queue_declare(
                "",
                Some(QueueDeclareFlags::EXCLUSIVE | QueueDeclareFlags::AUTO_DELETE),
            )
            .await?;

        let reply_to = declare_ok.name;

        if !exchange.is_empty() {
            channel.queue_bind(&reply_to, exchange, &reply_to).await?;
        }

        let consumer = channel
            .basic_consume(&reply_to, NoAck(true), Exclusive(false), NoLocal(false))
            .await?;

        let consumer_tag = consumer.consumer_tag.clone();
        let calls: PendingCalls = Arc::new(Mutex::new(HashMap::new()));

        spawn_reply_task(consumer, Arc::clone(&calls));

        Ok(RpcClient {
            channel,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            reply_to,
            consumer_tag,
            calls,
            next_id: 0,
        })
    }

    /// Call with a raw body and wait for the reply with a deadline.
    pub async fn call(&mut self, request: Vec<u8>, timeout: Duration) -> Result<RpcReply, RpcError> {
        self.call_message(PublishedMessage::default().body(request), timeout).await
    }

    /// Call with a prepared message, so request properties (content type,
    /// headers) can be set by the caller. The reply-to and the correlation
    /// id are filled in here.
    pub async fn call_message(
        &mut self,
        mut request: PublishedMessage,
        timeout: Duration,
    ) -> Result<RpcReply, RpcError> {
        self.next_id += 1;

        let correlation_id = format!("{:016x}", self.next_id);

        request.message.properties.reply_to = Some(self.reply_to.clone());
        request.message.properties.correlation_id = Some(correlation_id.clone());

        let (tx, rx) = oneshot::channel();

        self.calls
            .lock()
            .unwrap()
            .insert(correlation_id.clone(), tx);

        if let Err(e) = self
            .channel
            .basic_publish(&self.exchange, &self.routing_key, request)
            .await
        {
            self.calls.lock().unwrap().remove(&correlation_id);

            return Err(RpcError::Failed(e));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.calls.lock().unwrap().remove(&correlation_id);

                Err(RpcError::Failed(anyhow!("reply stream closed")))
            }
            Err(_) => {
                self.calls.lock().unwrap().remove(&correlation_id);

                Err(RpcError::Timeout(timeout))
            }
        }
    }

    /// Stop consuming the reply queue and delete it.
    pub async fn teardown(self) -> Result<()> {
        self.channel.basic_cancel(&self.consumer_tag).await?;
        self.channel
            .queue_delete(&self.reply_to, IfUnused(false), IfEmpty(false))
            .await?;

        Ok(())
    }
}

/// Match incoming replies to pending calls by the correlation id. A miss
/// is not an error, the reply may be stale or duplicated, it is logged and
/// dropped.
fn spawn_reply_task(mut consumer: ConsumerHandler, calls: PendingCalls) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = consumer.signal_stream.recv().await {
            match signal {
                ConsumerSignal::Delivered(message) => {
                    let message = *message;

                    let Some(correlation_id) = message.message.properties.correlation_id.clone() else {
                        debug!("Reply without correlation id, dropping");
                        continue;
                    };

                    let waiter = calls.lock().unwrap().remove(&correlation_id);

                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(RpcReply {
                                properties: message.message.properties,
                                body: message.message.body,
                            });
                        }
                        None => debug!("No pending call for correlation id {}, dropping", correlation_id),
                    }
                }
                ConsumerSignal::Cancelled
                | ConsumerSignal::ChannelClosed { .. }
                | ConsumerSignal::ConnectionClosed { .. } => break,
            }
        }
    })
}

/// The server role of the RPC pattern.
pub struct RpcServer {
    pub queue: String,
    task: JoinHandle<()>,
}

impl RpcServer {
    /// Set up the server: declare and bind the request queue, consume it
    /// in no-ack mode and run the handler on every request. When a request
    /// carries a reply-to, the handler's response is published there with
    /// the correlation id propagated; responses to requests without a
    /// reply-to are discarded.
    pub async fn bind<H>(mut channel: Channel, exchange: &str, queue: &str, handler: H) -> Result<RpcServer>
    where
        H: FnMut(RpcRequest) -> Option<Vec<u8>> + Send + 'static,
    {
        channel.queue_declare(queue, None).await?;

        if !exchange.is_empty() {
            channel.queue_bind(queue, exchange, queue).await?;
        }

        let consumer = channel
            .basic_consume(queue, NoAck(true), Exclusive(false), NoLocal(false))
            .await?;

        let exchange = exchange.to_string();
        let task = tokio::spawn(serve(channel, consumer, exchange, handler));

        Ok(RpcServer {
            queue: queue.to_string(),
            task,
        })
    }

    /// Stop serving. The channel held by the server task is dropped.
    pub fn stop(self) {
        self.task.abort();
    }
}

async fn serve<H>(channel: Channel, mut consumer: ConsumerHandler, exchange: String, mut handler: H)
where
    H: FnMut(RpcRequest) -> Option<Vec<u8>> + Send + 'static,
{
    while let Some(signal) = consumer.signal_stream.recv().await {
        match signal {
            ConsumerSignal::Delivered(message) => {
                let message = *message;
                let reply_to = message.message.properties.reply_to.clone();
                let correlation_id = message.message.properties.correlation_id.clone();

                let response = handler(RpcRequest {
                    properties: message.message.properties,
                    body: message.message.body,
                });

                match (reply_to, response) {
                    (Some(reply_to), Some(body)) => {
                        let mut reply = PublishedMessage::default().body(body);
                        reply.message.properties.correlation_id = correlation_id;

                        if let Err(e) = channel.basic_publish(&exchange, &reply_to, reply).await {
                            error!("Cannot publish the rpc response: {:?}", e);
                            break;
                        }
                    }
                    (None, Some(_)) => debug!("No reply-to in the request, discarding the response"),
                    (_, None) => (),
                }
            }
            ConsumerSignal::Cancelled
            | ConsumerSignal::ChannelClosed { .. }
            | ConsumerSignal::ConnectionClosed { .. } => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Content, DeliveredMessage};
    use crate::processor::{ClientRequest, ConsumerSink, Param, WaitFor};
    use coppermq_codec::frame::{self, AMQPFrame, MethodFrameArgs};
    use tokio::sync::mpsc;

    /// A stand-in connection engine for the RPC tests. It answers the
    /// method pairs, captures the consumer sink and, when `echo` is on,
    /// replies to every publish with a `pong` delivery carrying the same
    /// correlation id.
    fn spawn_fake_engine(mut requests: mpsc::Receiver<ClientRequest>, echo: bool) {
        tokio::spawn(async move {
            let mut consumer_sink: Option<ConsumerSink> = None;

            while let Some(request) = requests.recv().await {
                match request.param {
                    Param::Consume { sink, .. } => {
                        consumer_sink = Some(sink);

                        if let WaitFor::FrameResponse { expected, tx } = request.response {
                            let _ = tx.send(Ok(AMQPFrame::Method(
                                1,
                                expected,
                                MethodFrameArgs::BasicConsumeOk(frame::BasicConsumeOkArgs::new("rpc-ctag")),
                            )));
                        }
                    }
                    Param::Publish { content, .. } => {
                        if let WaitFor::SentOut(tx) = request.response {
                            let _ = tx.send(Ok(()));
                        }

                        if echo {
                            if let Some(sink) = &consumer_sink {
                                let mut reply = DeliveredMessage {
                                    message: Content {
                                        channel: 1,
                                        body: b"pong".to_vec(),
                                        ..Default::default()
                                    },
                                    consumer_tag: "rpc-ctag".to_string(),
                                    delivery_tag: 1,
                                    ..Default::default()
                                };
                                reply.message.properties.correlation_id =
                                    content.properties.correlation_id.clone();

                                let _ = sink.send(ConsumerSignal::Delivered(Box::new(reply)));
                            }
                        }
                    }
                    Param::Frame(AMQPFrame::Method(ch, _, _)) => match request.response {
                        WaitFor::FrameResponse { expected, tx } => {
                            let args = match expected {
                                frame::QUEUE_DECLARE_OK => {
                                    MethodFrameArgs::QueueDeclareOk(frame::QueueDeclareOkArgs {
                                        name: "amq.gen-reply".to_string(),
                                        message_count: 0,
                                        consumer_count: 0,
                                    })
                                }
                                frame::QUEUE_BIND_OK => MethodFrameArgs::QueueBindOk,
                                frame::BASIC_CANCEL_OK => {
                                    MethodFrameArgs::BasicCancelOk(frame::BasicCancelOkArgs::new("rpc-ctag"))
                                }
                                frame::QUEUE_DELETE_OK => {
                                    MethodFrameArgs::QueueDeleteOk(frame::QueueDeleteOkArgs { message_count: 0 })
                                }
                                _ => MethodFrameArgs::ChannelOpenOk,
                            };

                            let _ = tx.send(Ok(AMQPFrame::Method(ch, expected, args)));
                        }
                        WaitFor::SentOut(tx) => {
                            let _ = tx.send(Ok(()));
                        }
                        WaitFor::Nothing => (),
                    },
                    _ => (),
                }
            }
        });
    }

    async fn bound_client(echo: bool) -> RpcClient {
        let (tx, rx) = mpsc::channel(16);
        spawn_fake_engine(rx, echo);

        let channel = Channel::new(1, tx);

        RpcClient::bind(channel, "", "rpc-queue").await.unwrap()
    }

    #[tokio::test]
    async fn call_resolves_with_the_server_reply() {
        let mut rpc = bound_client(true).await;

        let reply = rpc
            .call(b"ping".to_vec(), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(reply.body, b"pong");
        assert_eq!(reply.properties.correlation_id.as_deref(), Some("0000000000000001"));

        // the pending call entry is removed on success
        assert!(rpc.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_times_out_when_nobody_replies() {
        let mut rpc = bound_client(false).await;

        let timeout = Duration::from_millis(200);
        let started = tokio::time::Instant::now();
        let outcome = rpc.call(b"ping".to_vec(), timeout).await;

        let elapsed = started.elapsed();

        assert!(matches!(outcome, Err(RpcError::Timeout(_))));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));

        // the pending call entry is removed on timeout as well
        assert!(rpc.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_queue_is_the_server_named_one() {
        let rpc = bound_client(false).await;

        assert_eq!(rpc.reply_to, "amq.gen-reply");

        rpc.teardown().await.unwrap();
    }
}
