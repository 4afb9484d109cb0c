//! AMQP 0.9.1 client library.
//!
//! The entry point is [`connect`] or [`ConnectionBuilder`] which negotiate
//! a connection and give back a [`Client`] and an [`EventHandler`]. The
//! [`Client`] opens [`Channel`]s; channels declare exchanges and queues,
//! publish messages (optionally with publisher confirms) and start
//! consumers. [`RpcClient`] and [`RpcServer`] implement the correlated
//! request/response pattern on top of that.
//!
//! ```no_run
//! use coppermq_client::{connect, Exclusive, NoAck, NoLocal, PublishedMessage};
//!
//! async fn publish_and_consume() -> anyhow::Result<()> {
//!     let (mut client, _events) = connect("amqp://localhost", "guest", "guest").await?;
//!     let mut channel = client.channel_open_next().await?;
//!
//!     channel.queue_declare("inbox", None).await?;
//!     channel.basic_publish("", "inbox", PublishedMessage::default().text("hello")).await?;
//!
//!     let handler = channel.basic_consume("inbox", NoAck(false), Exclusive(false), NoLocal(false)).await?;
//!
//!     handler.start(
//!         |message| println!("{:?}", message),
//!         || println!("consume cancelled"),
//!     );
//!
//!     Ok(())
//! }
//! ```
mod dev;
pub use dev::setup_logger;

mod channel_api;
pub use channel_api::{Channel, IfEmpty, IfUnused};

mod client_api;
pub use client_api::{connect, Client, ConnectionBuilder, EventHandler, EventSignal};

mod consumer;
pub use consumer::{ConsumerHandler, ConsumerSignal, Exclusive, GetHandler, GetSignal, NoAck, NoLocal};

mod error;
pub use error::ClientError;

mod message;
pub use message::{Content, DeliveredMessage, GetMessage, MessageProperties, PublishedMessage, ReturnedMessage};

mod model;
pub use model::{ChannelError, ChannelNumber, ClassId, ClassMethod, ConnectionError};

mod processor;

mod rpc;
pub use rpc::{RpcClient, RpcError, RpcReply, RpcRequest, RpcServer};

mod state;
