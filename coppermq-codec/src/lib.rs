//! Wire-level encoding and decoding of the AMQP 0.9.1 protocol.
//!
//! The `frame` module holds the data types: frames, method arguments and
//! field values. The `codec` module implements the byte-level encoder and
//! decoder on top of them.
pub mod codec;
pub mod frame;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate bitflags;
