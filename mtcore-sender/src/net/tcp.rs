// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use log::info;
use tokio::net::TcpStream;

use super::ServerAddr;

/// Opens a plain TCP connection to `addr`. Proxy tunneling is out of
/// scope for this crate.
pub(crate) async fn connect(addr: &ServerAddr) -> Result<TcpStream, std::io::Error> {
    info!("connecting to {}...", addr.address);
    TcpStream::connect(addr.address).await
}
