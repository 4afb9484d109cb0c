//! The I/O engine of a connection.
//!
//! `socket_loop` is the single reader of the framed transport: it
//! demultiplexes incoming frames to the channel state machine, to consumers
//! and to synchronous callers blocked on a response. A companion task,
//! `handle_outgoing`, is the single writer draining the outbound frame
//! queue, so frames of one content sequence are never interleaved with
//! other traffic on the wire.
use crate::client_api::ConnectionSink;
use crate::client_error;
use crate::consumer::{ConsumerSignal, GetSignal};
use crate::message::Content;
use crate::model::{ChannelNumber, ConnectionError};
use crate::state::{self, ClientState};
use anyhow::Result;
use coppermq_codec::codec::{AMQPCodec, Frame};
use coppermq_codec::frame::{self, AMQPFrame, MethodFrameArgs};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use log::{debug, error, trace};
use std::collections::HashMap;
use std::fmt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

pub(crate) type ClientRequestSink = mpsc::Sender<ClientRequest>;
pub(crate) type ConsumerSink = mpsc::UnboundedSender<ConsumerSignal>;
pub(crate) type GetSink = mpsc::UnboundedSender<GetSignal>;
pub(crate) type FrameResponse = oneshot::Sender<Result<AMQPFrame>>;

/// Represents a client request: sending out a frame, consuming a queue or
/// publishing a message.
#[derive(Debug)]
pub(crate) enum Param {
    Frame(AMQPFrame),
    Consume {
        frame: Box<AMQPFrame>,
        channel: ChannelNumber,
        consumer_tag: String,
        sink: ConsumerSink,
    },
    Get {
        frame: Box<AMQPFrame>,
        channel: ChannelNumber,
        sink: GetSink,
    },
    Publish {
        frame: Box<AMQPFrame>,
        content: Content,
        confirm: Option<oneshot::Sender<Result<()>>>,
    },
    /// Close a channel locally without talking to the broker, used when the
    /// connection itself is going away.
    ChannelCloseFast(ChannelNumber),
}

/// What the caller is waiting for when it issues a request.
pub(crate) enum WaitFor {
    Nothing,
    /// Resolved as soon as the frame is handed to the writer.
    SentOut(oneshot::Sender<Result<()>>),
    /// Resolved by the response method frame of the given id, or by an
    /// error if the response does not pair up.
    FrameResponse { expected: frame::ClassMethod, tx: FrameResponse },
}

pub(crate) struct ClientRequest {
    pub(crate) param: Param,
    pub(crate) response: WaitFor,
}

impl fmt::Debug for ClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Param::Frame(frame) => write!(f, "Request{{Frame={:?}}}", frame),
            Param::Consume { frame, .. } => write!(f, "Request{{Consume={:?}}}", frame),
            Param::Get { frame, .. } => write!(f, "Request{{Get={:?}}}", frame),
            Param::Publish { frame, .. } => write!(f, "Request{{Publish={:?}}}", frame),
            Param::ChannelCloseFast(ch) => write!(f, "Request{{ChannelCloseFast={}}}", ch),
        }
    }
}

/// A synchronous method call blocked on its response frame. At most one can
/// be registered per channel, the per-channel call mutex in the API layer
/// guarantees that.
struct WaitingCall {
    expected: frame::ClassMethod,
    tx: FrameResponse,
}

type SyncCalls = HashMap<ChannelNumber, WaitingCall>;

enum Flow {
    Continue,
    Stop,
}

pub(crate) async fn socket_loop(
    socket: TcpStream,
    mut requests: mpsc::Receiver<ClientRequest>,
    event_sink: ConnectionSink,
) -> Result<()> {
    let (sink, mut stream) = Framed::new(socket, AMQPCodec {}).split();
    let (out_tx, out_rx) = mpsc::channel(16);
    let mut client = state::new(out_tx, event_sink);
    let mut sync_calls = SyncCalls::new();

    tokio::spawn(async move {
        if let Err(e) = handle_outgoing(sink, out_rx).await {
            error!("Error writing to socket {:?}", e);
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Frame::Frame(frame))) => {
                        match handle_in_frame(frame, &mut client, &mut sync_calls).await {
                            Ok(Flow::Continue) => (),
                            Ok(Flow::Stop) => break,
                            Err(e) => {
                                // a framing error poisons the whole
                                // connection, stop reading
                                error!("Error handling incoming frame {:?}", e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Frame::Frames(frames))) => {
                        let mut stop = false;

                        for frame in frames {
                            match handle_in_frame(frame, &mut client, &mut sync_calls).await {
                                Ok(Flow::Continue) => (),
                                Ok(Flow::Stop) => stop = true,
                                Err(e) => {
                                    error!("Error handling incoming frame {:?}", e);
                                    stop = true;
                                }
                            }
                        }

                        if stop {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error reading frame {:?}", e);
                        break;
                    }
                    None => {
                        debug!("Server closed the stream");
                        break;
                    }
                }
            }
            req = requests.recv() => {
                match req {
                    Some(request) => {
                        trace!("Client request {:?}", request);

                        if let Err(e) = handle_request(request, &mut client, &mut sync_calls).await {
                            error!("Error handling client request {:?}", e);
                        }
                    }
                    None => {
                        debug!("Client closed the request sink");
                        break;
                    }
                }
            }
        }
    }

    // Nobody may stay blocked after the loop is gone: fail the pending
    // calls and signal the consumers.
    for (_, wc) in sync_calls.drain() {
        let _ = wc.tx.send(client_error!(None, 501, "Connection closed by peer", 0));
    }

    client.shutdown().await;

    Ok(())
}

async fn handle_outgoing(
    mut sink: SplitSink<Framed<TcpStream, AMQPCodec>, Frame>,
    mut outgoing: mpsc::Receiver<Frame>,
) -> Result<()> {
    while let Some(f) = outgoing.recv().await {
        sink.send(f).await?;
    }

    Ok(())
}

async fn handle_in_frame(frame: AMQPFrame, client: &mut ClientState, sync_calls: &mut SyncCalls) -> Result<Flow> {
    trace!("Incoming frame {:?}", frame);

    match frame {
        AMQPFrame::Header => Ok(Flow::Continue),
        AMQPFrame::Method(ch, cm, args) => handle_in_method_frame(ch, cm, args, client, sync_calls).await,
        AMQPFrame::ContentHeader(header) => {
            client.content_header(header).await?;

            Ok(Flow::Continue)
        }
        AMQPFrame::ContentBody(body) => {
            client.content_body(body).await?;

            Ok(Flow::Continue)
        }
        AMQPFrame::Heartbeat(0) => {
            client.heartbeat_received().await?;

            Ok(Flow::Continue)
        }
        AMQPFrame::Heartbeat(channel) => client_error!(
            Some(channel),
            ConnectionError::FrameError as u16,
            "Heartbeat frame on a non-zero channel",
            0
        ),
    }
}

/// Handle a method frame coming from the server.
///
/// Asynchronous notifications (deliveries, returns, confirms, server side
/// close and cancel) go to the state machine; everything else is the
/// response of a pending synchronous call on its channel.
async fn handle_in_method_frame(
    channel: ChannelNumber,
    cm: frame::ClassMethod,
    args: MethodFrameArgs,
    client: &mut ClientState,
    sync_calls: &mut SyncCalls,
) -> Result<Flow> {
    use MethodFrameArgs::*;

    match args {
        BasicDeliver(args) => client.basic_deliver(channel, args).await?,
        BasicCancel(args) => client.on_basic_cancel(channel, args).await?,
        BasicReturn(args) => client.basic_return(channel, args).await?,
        BasicAck(args) => client.on_basic_ack(channel, args).await?,
        BasicNack(args) => client.on_basic_nack(channel, args).await?,
        BasicGetOk(args) => client.basic_get_ok(channel, args).await?,
        BasicGetEmpty => client.basic_get_empty(channel).await?,
        ChannelFlow(args) => client.on_channel_flow(channel, args).await?,
        ConnectionClose(args) => {
            fail_all_waiters(sync_calls, &args);
            client.handle_connection_close(args).await?;
        }
        ChannelClose(args) => {
            fail_channel_waiter(sync_calls, channel, &args);
            client.handle_channel_close(channel, args).await?;
        }
        BasicCancelOk(cancel_ok) => {
            client.basic_cancel_ok(channel, &cancel_ok).await?;
            resolve_waiter(
                sync_calls,
                channel,
                cm,
                AMQPFrame::Method(channel, cm, BasicCancelOk(cancel_ok)),
            );
        }
        ChannelCloseOk => {
            client.channel_close_ok(channel).await?;
            resolve_waiter(sync_calls, channel, cm, AMQPFrame::Method(channel, cm, ChannelCloseOk));
        }
        ConnectionCloseOk => {
            resolve_waiter(sync_calls, channel, cm, AMQPFrame::Method(channel, cm, ConnectionCloseOk));
            client.connection_close_ok().await?;

            return Ok(Flow::Stop);
        }
        args => resolve_waiter(sync_calls, channel, cm, AMQPFrame::Method(channel, cm, args)),
    }

    Ok(Flow::Continue)
}

/// Unblock the synchronous call waiting on this channel. A response whose
/// method id differs from the expected one resolves the call with a pairing
/// error which names both methods.
fn resolve_waiter(sync_calls: &mut SyncCalls, channel: ChannelNumber, cm: frame::ClassMethod, frame: AMQPFrame) {
    match sync_calls.remove(&channel) {
        Some(wc) => {
            let response = if wc.expected == cm {
                Ok(frame)
            } else {
                client_error!(
                    Some(channel),
                    ConnectionError::CommandInvalid as u16,
                    format!(
                        "Expected {}, received {}",
                        frame::method_name(wc.expected),
                        frame::method_name(cm)
                    ),
                    cm
                )
            };

            if wc.tx.send(response).is_err() {
                debug!("Waiter on channel {} is gone", channel);
            }
        }
        None => debug!("No waiter on channel {}, dropping {:?}", channel, frame),
    }
}

/// A connection level close fails every pending call on every channel.
fn fail_all_waiters(sync_calls: &mut SyncCalls, args: &frame::ConnectionCloseArgs) {
    for (_, wc) in sync_calls.drain() {
        let err = crate::error::ClientError {
            channel: None,
            code: args.code,
            message: args.text.clone(),
            class_method: frame::unify_class_method(args.class_id, args.method_id),
        };

        if wc.tx.send(Err(anyhow::Error::new(err))).is_err() {
            debug!("A connection close waiter is gone");
        }
    }
}

/// A channel level close fails only the call pending on that channel, the
/// other channels keep working.
fn fail_channel_waiter(sync_calls: &mut SyncCalls, channel: ChannelNumber, args: &frame::ChannelCloseArgs) {
    if let Some(wc) = sync_calls.remove(&channel) {
        let response = client_error!(
            Some(channel),
            args.code,
            args.text.clone(),
            frame::unify_class_method(args.class_id, args.method_id)
        );

        if wc.tx.send(response).is_err() {
            debug!("Channel close waiter on channel {} is gone", channel);
        }
    }
}

fn register_waiter(sync_calls: &mut SyncCalls, channel: ChannelNumber, response: WaitFor) -> Result<()> {
    match response {
        WaitFor::Nothing => (),
        WaitFor::SentOut(tx) => {
            if tx.send(Ok(())).is_err() {
                debug!("Sent out waiter on channel {} is gone", channel);
            }
        }
        WaitFor::FrameResponse { expected, tx } => {
            if sync_calls.contains_key(&channel) {
                let _ = tx.send(client_error!(
                    Some(channel),
                    ConnectionError::ChannelError as u16,
                    "Another synchronous call is already pending on this channel",
                    expected
                ));
            } else {
                sync_calls.insert(channel, WaitingCall { expected, tx });
            }
        }
    }

    Ok(())
}

async fn handle_request(request: ClientRequest, client: &mut ClientState, sync_calls: &mut SyncCalls) -> Result<()> {
    match request.param {
        Param::Frame(AMQPFrame::Header) => {
            if let WaitFor::FrameResponse { expected, tx } = request.response {
                sync_calls.insert(0, WaitingCall { expected, tx });
            }

            client.send_frame(Frame::Frame(AMQPFrame::Header)).await?;
        }
        Param::Frame(AMQPFrame::Method(ch, cm, args)) => match request.response {
            WaitFor::FrameResponse { expected, tx } => {
                register_waiter(sync_calls, ch, WaitFor::FrameResponse { expected, tx })?;
                client.handle_out_frame(ch, cm, args).await?;
            }
            other => {
                client.handle_out_frame(ch, cm, args).await?;
                register_waiter(sync_calls, ch, other)?;
            }
        },
        Param::Frame(frame) => {
            client.send_frame(Frame::Frame(frame)).await?;
            register_waiter(sync_calls, 0, request.response)?;
        }
        Param::Consume {
            frame,
            channel,
            consumer_tag,
            sink,
        } => match client.basic_consume(channel, consumer_tag, sink).await {
            Ok(()) => match request.response {
                WaitFor::FrameResponse { expected, tx } => {
                    register_waiter(sync_calls, channel, WaitFor::FrameResponse { expected, tx })?;
                    client.send_frame(Frame::Frame(*frame)).await?;
                }
                other => {
                    client.send_frame(Frame::Frame(*frame)).await?;
                    register_waiter(sync_calls, channel, other)?;
                }
            },
            Err(e) => match request.response {
                WaitFor::Nothing => (),
                WaitFor::SentOut(tx) => {
                    let _ = tx.send(Err(e));
                }
                WaitFor::FrameResponse { tx, .. } => {
                    let _ = tx.send(Err(e));
                }
            },
        },
        Param::Get { frame, channel, sink } => {
            client.basic_get(channel, sink).await?;
            client.send_frame(Frame::Frame(*frame)).await?;
            register_waiter(sync_calls, channel, request.response)?;
        }
        Param::Publish { frame, content, confirm } => match *frame {
            AMQPFrame::Method(ch, _, MethodFrameArgs::BasicPublish(args)) => {
                client.basic_publish(ch, args, content, confirm).await?;
                register_waiter(sync_calls, ch, request.response)?;
            }
            other => unreachable!("{:?}", other),
        },
        Param::ChannelCloseFast(channel) => {
            client.channel_close_fast(channel).await?;
            register_waiter(sync_calls, channel, request.response)?;
        }
    }

    Ok(())
}

/// Send a method frame and wait for its paired response.
pub(crate) async fn call(sink: &ClientRequestSink, f: AMQPFrame, expected: frame::ClassMethod) -> Result<AMQPFrame> {
    let (tx, rx) = oneshot::channel();

    sink.send(ClientRequest {
        param: Param::Frame(f),
        response: WaitFor::FrameResponse { expected, tx },
    })
    .await
    .map_err(|_| connection_gone())?;

    match rx.await {
        Ok(response) => response,
        Err(_) => Err(connection_gone()),
    }
}

/// Send a frame without waiting for any server response.
pub(crate) async fn send(sink: &ClientRequestSink, f: AMQPFrame) -> Result<()> {
    sink.send(ClientRequest {
        param: Param::Frame(f),
        response: WaitFor::Nothing,
    })
    .await
    .map_err(|_| connection_gone())?;

    Ok(())
}

/// Send a frame and wait until it is handed over to the writer.
pub(crate) async fn sync_send(sink: &ClientRequestSink, f: AMQPFrame) -> Result<()> {
    let (tx, rx) = oneshot::channel();

    sink.send(ClientRequest {
        param: Param::Frame(f),
        response: WaitFor::SentOut(tx),
    })
    .await
    .map_err(|_| connection_gone())?;

    match rx.await {
        Ok(response) => response,
        Err(_) => Err(connection_gone()),
    }
}

fn connection_gone() -> anyhow::Error {
    anyhow::Error::new(crate::error::ClientError {
        channel: None,
        code: 501,
        message: "Connection closed".to_string(),
        class_method: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_api::EventSignal;
    use crate::error::ClientError;

    fn test_parts() -> (
        ClientState,
        SyncCalls,
        mpsc::Receiver<Frame>,
        mpsc::UnboundedReceiver<EventSignal>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (state::new(out_tx, event_tx), SyncCalls::new(), out_rx, event_rx)
    }

    fn register_call(sync_calls: &mut SyncCalls, channel: ChannelNumber, expected: frame::ClassMethod) -> oneshot::Receiver<Result<AMQPFrame>> {
        let (tx, rx) = oneshot::channel();

        sync_calls.insert(channel, WaitingCall { expected, tx });

        rx
    }

    #[tokio::test]
    async fn mismatched_response_names_both_methods() {
        crate::dev::setup_logger();

        let (mut client, mut sync_calls, _out_rx, _events) = test_parts();
        let rx = register_call(&mut sync_calls, 1, frame::QUEUE_DECLARE_OK);

        // the server answers with exchange.declare-ok instead
        let flow = handle_in_method_frame(
            1,
            frame::EXCHANGE_DECLARE_OK,
            MethodFrameArgs::ExchangeDeclareOk,
            &mut client,
            &mut sync_calls,
        )
        .await
        .unwrap();

        assert!(matches!(flow, Flow::Continue));

        let err = rx.await.unwrap().unwrap_err().downcast::<ClientError>().unwrap();

        assert_eq!(err.code, ConnectionError::CommandInvalid as u16);
        assert!(err.message.contains("queue.declare-ok"));
        assert!(err.message.contains("exchange.declare-ok"));
    }

    #[tokio::test]
    async fn channel_close_fails_only_that_channels_waiter() {
        let (mut client, mut sync_calls, mut out_rx, _events) = test_parts();

        let rx1 = register_call(&mut sync_calls, 1, frame::QUEUE_DECLARE_OK);
        let rx2 = register_call(&mut sync_calls, 2, frame::QUEUE_BIND_OK);

        let args = frame::ChannelCloseArgs {
            code: 404,
            text: "Queue not found".to_string(),
            class_id: 0x32,
            method_id: 0x0A,
        };

        handle_in_method_frame(1, frame::CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(args), &mut client, &mut sync_calls)
            .await
            .unwrap();

        let err = rx1.await.unwrap().unwrap_err().downcast::<ClientError>().unwrap();

        assert_eq!(err.channel, Some(1));
        assert_eq!(err.code, 404);

        // the other channel's call is still pending
        assert!(sync_calls.contains_key(&2));
        drop(rx2);

        // the engine replied with channel.close-ok
        match out_rx.recv().await.unwrap() {
            Frame::Frame(AMQPFrame::Method(1, cm, _)) => assert_eq!(cm, frame::CHANNEL_CLOSE_OK),
            other => panic!("expected channel.close-ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connection_close_fails_all_waiters() {
        let (mut client, mut sync_calls, mut out_rx, _events) = test_parts();

        let rx1 = register_call(&mut sync_calls, 1, frame::QUEUE_DECLARE_OK);
        let rx2 = register_call(&mut sync_calls, 2, frame::QUEUE_BIND_OK);

        let args = frame::ConnectionCloseArgs {
            code: 320,
            text: "Connection forced".to_string(),
            class_id: 0,
            method_id: 0,
        };

        handle_in_method_frame(
            0,
            frame::CONNECTION_CLOSE,
            MethodFrameArgs::ConnectionClose(args),
            &mut client,
            &mut sync_calls,
        )
        .await
        .unwrap();

        assert!(sync_calls.is_empty());

        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err().downcast::<ClientError>().unwrap();

            assert_eq!(err.code, 320);
        }

        match out_rx.recv().await.unwrap() {
            Frame::Frame(AMQPFrame::Method(0, cm, _)) => assert_eq!(cm, frame::CONNECTION_CLOSE_OK),
            other => panic!("expected connection.close-ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn heartbeat_on_nonzero_channel_is_a_framing_error() {
        let (mut client, mut sync_calls, _out_rx, _events) = test_parts();

        let result = handle_in_frame(AMQPFrame::Heartbeat(7), &mut client, &mut sync_calls).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn expected_response_resolves_with_the_frame() {
        let (mut client, mut sync_calls, _out_rx, _events) = test_parts();
        let rx = register_call(&mut sync_calls, 3, frame::QUEUE_DECLARE_OK);

        let args = frame::QueueDeclareOkArgs {
            name: "inbox".to_string(),
            message_count: 12,
            consumer_count: 1,
        };

        handle_in_method_frame(
            3,
            frame::QUEUE_DECLARE_OK,
            MethodFrameArgs::QueueDeclareOk(args),
            &mut client,
            &mut sync_calls,
        )
        .await
        .unwrap();

        match rx.await.unwrap().unwrap() {
            AMQPFrame::Method(3, _, MethodFrameArgs::QueueDeclareOk(ok)) => {
                assert_eq!(ok.name, "inbox");
                assert_eq!(ok.message_count, 12);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }
}
