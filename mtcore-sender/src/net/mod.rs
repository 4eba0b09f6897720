// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod tcp;

use std::io;
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// A socket address to dial a data center at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerAddr {
    pub address: std::net::SocketAddr,
}

impl ServerAddr {
    pub fn new(address: std::net::SocketAddr) -> Self {
        Self { address }
    }
}

/// The connected socket, split on demand so the sender's read and write
/// paths can be polled concurrently from the same `select!` (§4.3).
///
/// Proxy tunneling is out of scope for this crate: a caller that needs
/// one should dial its own stream and wrap it the same way.
pub(crate) struct NetStream {
    stream: TcpStream,
}

impl NetStream {
    pub(crate) async fn connect(addr: &ServerAddr) -> io::Result<Self> {
        Ok(Self {
            stream: tcp::connect(addr).await?,
        })
    }

    pub(crate) fn split(&mut self) -> (ReadHalf<'_>, WriteHalf<'_>) {
        self.stream.split()
    }
}
