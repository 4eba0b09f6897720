// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The sender/receiver loop (§4.3): owns the socket, drives the
//! authorization-key exchange, and turns enqueued requests into resolved
//! replies, retrying or migrating as the server demands.

use std::collections::VecDeque;
use std::io;
use std::ops::ControlFlow;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::{sleep_until, Instant};

use mtcore_proto::authentication;
use mtcore_proto::errors::{AuthenticationError, RequestError};
use mtcore_proto::manual_tl::MAXIMUM_CONTAINER_LENGTH;
use mtcore_proto::mtp::{self, Deserialization, Mtp, MsgIdPair, NewSessionInfo};
use mtcore_proto::transport::{self, RingBuffer, Transport};
use mtcore_proto::MsgId;
use mtcore_session::DataCenterExtractor;
use mtcore_tl::constructors::InvokeAfterMsg;
use mtcore_tl::{Deserializable, RemoteCall, Serializable};

use crate::errors::{BulkSendError, InvocationError, ReadError, RpcError};
use crate::flood::FloodState;
use crate::net::{NetStream, ServerAddr};
use crate::reconnection::{NoReconnect, ReconnectionPolicy};

/// Largest amount of data read from or written to the socket per I/O
/// operation. Telegram closes the connection past roughly a megabyte, so
/// this leaves headroom for whichever transport's own framing overhead.
const MAXIMUM_DATA: usize = (1024 * 1024) + (8 * 1024);

/// Leading space reserved in the write buffer for the transport's own
/// framing, so `Transport::pack` rarely needs to grow the buffer to
/// prepend its header.
const TRANSPORT_LEADING_SPACE: usize = 16;

/// Every how often a keepalive ping is enqueued.
const PING_DELAY: Duration = Duration::from_secs(60);

/// Seconds the server is told to wait before disconnecting us if no
/// further ping arrives in time.
const NO_PING_DISCONNECT: i32 = 75;

fn random_session_id() -> i64 {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("failed to generate a session id");
    i64::from_le_bytes(bytes)
}

fn constructor_id_of(body: &[u8]) -> u32 {
    assert!(body.len() >= 4, "a request body is always 4-byte prefixed");
    u32::from_le_bytes([body[0], body[1], body[2], body[3]])
}

fn decode_reply<R: Deserializable>(bytes: &[u8]) -> Result<R, InvocationError> {
    R::from_bytes(bytes).map_err(|error| {
        InvocationError::Deserialize(mtcore_proto::errors::DeserializeError::from(error))
    })
}

/// The migration targets Telegram signals via RPC error name (§4.3.5).
/// The new `dc_id` rides along as the error's numeric suffix.
fn migrate_target(rpc: &RpcError) -> Option<i32> {
    match rpc.name.as_str() {
        "PHONE_MIGRATE" | "NETWORK_MIGRATE" | "USER_MIGRATE" | "FILE_MIGRATE" => {
            rpc.value.map(|dc_id| dc_id as i32)
        }
        _ => None,
    }
}

/// `bad_msg_notification` codes the codec already knows how to correct
/// locally (clock drift, `seq_no` drift); anything else is unrecoverable
/// for the offending message.
fn bad_message_retryable(code: i32) -> bool {
    matches!(code, 16 | 17 | 32 | 33)
}

struct Request {
    /// A locally unique handle so a caller that just enqueued a request
    /// can find it again by identity, even though other requests ahead
    /// of it in `Sender::requests` may complete (and get `swap_remove`d,
    /// shuffling indices) in the meantime.
    tag: u64,
    body: Vec<u8>,
    state: RequestState,
    result: oneshot::Sender<Result<Vec<u8>, InvocationError>>,
}

#[derive(Clone, Copy)]
enum RequestState {
    NotSerialized,
    Serialized(MsgIdPair),
    Sent(MsgIdPair),
}

/// Drives one connection to a Telegram data center: enqueues requests,
/// matches their replies, and keeps the session alive with periodic
/// pings. Does not know about any particular RPC schema; requests and
/// replies are opaque byte strings the caller serializes/deserializes
/// with its own generated types via [`RemoteCall`].
pub struct Sender<T: Transport, M: Mtp> {
    stream: NetStream,
    transport: T,
    mtp: M,
    addr: ServerAddr,
    dc_id: i32,
    test_mode: bool,

    requests: Vec<Request>,
    next_tag: u64,
    pending_updates: VecDeque<Vec<u8>>,
    flood: FloodState,
    reconnection: Box<dyn ReconnectionPolicy + Send + Sync>,
    next_ping: Instant,

    read_buffer: Vec<u8>,
    read_tail: usize,
    write_buffer: RingBuffer<u8>,
    write_head: usize,
}

impl<T: Transport, M: Mtp> Sender<T, M> {
    /// The data center this sender is currently connected to.
    pub fn dc_id(&self) -> i32 {
        self.dc_id
    }

    /// Replaces the reconnection strategy used when the connection drops
    /// unexpectedly (§4.3.5). Defaults to [`NoReconnect`], so a dropped
    /// connection is final unless a caller opts into retries.
    pub fn set_reconnection_policy(&mut self, policy: impl ReconnectionPolicy + 'static) {
        self.reconnection = Box::new(policy);
    }

    /// Pops the oldest update byte string received but not yet consumed,
    /// if any. The caller decodes it with its own schema's `Updates` enum.
    pub fn next_update(&mut self) -> Option<Vec<u8>> {
        self.pending_updates.pop_front()
    }

    /// Drops the connection and fails every pending request with
    /// [`InvocationError::Dropped`]. Disconnecting this way is always
    /// user-initiated; a dead socket is instead surfaced the next time
    /// [`Self::step`] is driven (via every pending future resolving to
    /// an error), never silently.
    pub fn disconnect(mut self) {
        for req in self.requests.drain(..) {
            drop(req.result.send(Err(InvocationError::Dropped)));
        }
    }

    fn enqueue_body(
        &mut self,
        body: Vec<u8>,
        result: oneshot::Sender<Result<Vec<u8>, InvocationError>>,
    ) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        debug!(
            "enqueueing request {:08x} to be serialized",
            constructor_id_of(&body)
        );
        self.requests.push(Request {
            tag,
            body,
            state: RequestState::NotSerialized,
            result,
        });
        tag
    }

    async fn invoke_body(&mut self, body: Vec<u8>) -> Result<Vec<u8>, InvocationError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue_body(body, tx);
        self.step_until_receive(rx).await
    }

    async fn step_until_receive(
        &mut self,
        mut rx: oneshot::Receiver<Result<Vec<u8>, InvocationError>>,
    ) -> Result<Vec<u8>, InvocationError> {
        loop {
            match rx.try_recv() {
                Ok(outcome) => return outcome,
                Err(TryRecvError::Empty) => self.step().await?,
                Err(TryRecvError::Closed) => return Err(InvocationError::Dropped),
            }
        }
    }

    /// Steps forward until `tag`'s request has at least been assigned a
    /// `msg_id`, without waiting for its reply. Used to learn the
    /// `msg_id` an `ordered` batch's next link needs to reference.
    async fn await_serialized(&mut self, tag: u64) -> Result<MsgIdPair, InvocationError> {
        loop {
            match self.requests.iter().find(|r| r.tag == tag).map(|r| r.state) {
                Some(RequestState::Serialized(pair)) | Some(RequestState::Sent(pair)) => {
                    return Ok(pair)
                }
                Some(RequestState::NotSerialized) => self.step().await?,
                None => return Err(InvocationError::Dropped),
            }
        }
    }

    /// Drives one round of network I/O: fills the write buffer from any
    /// not-yet-serialized requests, then reads and writes at the same
    /// time, whichever is ready first. A dead connection is reported by
    /// failing every pending request and returning the error that killed
    /// it; the sender should not be reused afterwards.
    pub async fn step(&mut self) -> Result<(), ReadError> {
        self.try_fill_write();

        let write_pending = !self.write_buffer.is_empty();
        let read_tail = self.read_tail;
        let write_head = self.write_head;
        let (mut reader, mut writer) = self.stream.split();
        let sleep = sleep_until(self.next_ping);

        let outcome: Result<(), ReadError> = tokio::select! {
            result = reader.read(&mut self.read_buffer[read_tail..]) => {
                match result {
                    Ok(0) => Err(ReadError::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection closed by peer",
                    ))),
                    Ok(n) => {
                        self.read_tail += n;
                        self.on_net_read()
                    }
                    Err(err) => Err(err.into()),
                }
            }
            result = writer.write(&self.write_buffer.as_ref()[write_head..]), if write_pending => {
                match result {
                    Ok(n) => {
                        self.on_net_write(n);
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            }
            _ = sleep => {
                self.on_ping_timeout();
                Ok(())
            }
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(err) if matches!(err, ReadError::Io(_) | ReadError::Transport(_)) => {
                if self.try_reconnect(&err).await {
                    Ok(())
                } else {
                    self.fail_all(&err);
                    Err(err)
                }
            }
            Err(err) => {
                self.fail_all(&err);
                Err(err)
            }
        }
    }

    /// Redials the socket and resets the transport's framing state,
    /// following [`Self::set_reconnection_policy`] (§4.3.5). The
    /// authorization key and session are untouched: a dropped TCP
    /// connection does not invalidate either, so every pending request
    /// is simply marked for resending instead of being failed.
    async fn try_reconnect(&mut self, error: &ReadError) -> bool {
        let mut attempts = 0;
        loop {
            match self.reconnection.should_retry(attempts) {
                ControlFlow::Continue(delay) => {
                    warn!(
                        "connection lost ({error}), reconnecting in {delay:?} (attempt {attempts})"
                    );
                    tokio::time::sleep(delay).await;
                    match NetStream::connect(&self.addr).await {
                        Ok(stream) => {
                            self.stream = stream;
                            self.transport.reset();
                            self.read_tail = 0;
                            self.write_buffer.clear();
                            self.write_head = 0;
                            for req in self.requests.iter_mut() {
                                req.state = RequestState::NotSerialized;
                            }
                            self.next_ping = Instant::now() + PING_DELAY;
                            info!("reconnected successfully");
                            return true;
                        }
                        Err(_) => attempts += 1,
                    }
                }
                ControlFlow::Break(()) => return false,
            }
        }
    }

    /// Batches every not-yet-serialized request into a single outgoing
    /// message (bounded by how many a container may hold) and hands it
    /// to the transport for framing.
    ///
    /// An all-acks-no-requests flush is not forced here: acks simply
    /// piggyback on the next real request instead of being proactively
    /// flushed on their own, which keeps this in step with [`Mtp`]'s
    /// single-shot `serialize` (no separate "finalize with whatever is
    /// pending" call).
    fn try_fill_write(&mut self) {
        if !self.write_buffer.is_empty() {
            return;
        }

        let pending: Vec<usize> = self
            .requests
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r.state, RequestState::NotSerialized))
            .map(|(i, _)| i)
            .take(MAXIMUM_CONTAINER_LENGTH)
            .collect();
        if pending.is_empty() {
            return;
        }

        let bodies: Vec<Vec<u8>> = pending.iter().map(|&i| self.requests[i].body.clone()).collect();
        let mut message = Vec::new();
        let ids = self.mtp.serialize(&bodies, &mut message);
        if message.is_empty() {
            return;
        }

        for (&i, pair) in pending.iter().zip(ids.iter()) {
            self.requests[i].state = RequestState::Serialized(*pair);
        }

        self.write_buffer.clear();
        self.write_buffer.extend(message);
        self.transport.pack(&mut self.write_buffer);
        self.write_head = 0;
    }

    fn on_net_read(&mut self) -> Result<(), ReadError> {
        let mut offset = 0;
        while offset < self.read_tail {
            match self.transport.unpack(&mut self.read_buffer[offset..self.read_tail]) {
                Ok(unpacked) => {
                    let result = self.mtp.deserialize(
                        &self.read_buffer[offset + unpacked.data_start..offset + unpacked.data_end],
                    )?;
                    self.process_deserialization(result);
                    offset += unpacked.next_offset;
                }
                Err(transport::Error::MissingBytes) => break,
                Err(err) => return Err(err.into()),
            }
        }
        self.read_buffer.copy_within(offset..self.read_tail, 0);
        self.read_tail -= offset;
        Ok(())
    }

    fn on_net_write(&mut self, n: usize) {
        self.write_head += n;
        if self.write_head < self.write_buffer.len() {
            return;
        }
        self.write_buffer.clear();
        self.write_head = 0;
        for req in self.requests.iter_mut() {
            if let RequestState::Serialized(pair) = req.state {
                req.state = RequestState::Sent(pair);
            }
        }
    }

    fn on_ping_timeout(&mut self) {
        // A bare ping is enough to keep the connection alive; the reply
        // is routed like any other rpc_result and simply discarded.
        let ping_id = {
            let mut bytes = [0u8; 8];
            getrandom::getrandom(&mut bytes).expect("failed to generate a ping id");
            i64::from_le_bytes(bytes)
        };
        let (tx, _rx) = oneshot::channel();
        self.enqueue_body(
            mtcore_tl::constructors::PingDelayDisconnect {
                ping_id,
                disconnect_delay: NO_PING_DISCONNECT,
            }
            .to_bytes(),
            tx,
        );
        self.next_ping = Instant::now() + PING_DELAY;
    }

    fn fail_all(&mut self, error: &ReadError) {
        warn!(
            "connection failed, dropping {} pending request(s): {}",
            self.requests.len(),
            error
        );
        for req in self.requests.drain(..) {
            drop(req.result.send(Err(InvocationError::from(error.clone()))));
        }
    }

    fn process_deserialization(&mut self, result: Deserialization) {
        for (msg_id, outcome) in result.rpc_results {
            self.process_rpc_result(msg_id, outcome);
        }
        self.pending_updates.extend(result.updates);
        if let Some(info) = result.new_session {
            self.process_new_session(info);
        }
        // `result.acks` only records receipts the codec already used to
        // drop its own internal bookkeeping; this engine does not (yet)
        // implement a resend-on-missing-ack timeout, so there is nothing
        // further to act on here.
    }

    fn process_rpc_result(&mut self, msg_id: MsgId, outcome: Result<Vec<u8>, RequestError>) {
        if let Err(RequestError::BadMessage { code }) = outcome {
            self.process_bad_message(msg_id, code);
            return;
        }

        let Some(req) = self.pop_request(msg_id) else {
            info!("got a reply for {:?} but no such request is pending", msg_id);
            return;
        };

        let resolved = match outcome {
            Ok(body) => Ok(body),
            Err(RequestError::RpcError(error)) => {
                let constructor_id = constructor_id_of(&req.body);
                Err(InvocationError::Rpc(
                    RpcError::from(error).with_caused_by(constructor_id),
                ))
            }
            Err(RequestError::Deserialize(error)) => Err(InvocationError::from(error)),
            Err(RequestError::BadMessage { .. }) => unreachable!("handled above"),
        };
        drop(req.result.send(resolved));
    }

    /// `msg_id` here may be the offending message's own id, or the id of
    /// the outer container it rode in (§4.3.2).
    fn process_bad_message(&mut self, msg_id: MsgId, code: i32) {
        for i in (0..self.requests.len()).rev() {
            let hit = match self.requests[i].state {
                RequestState::Serialized(pair) | RequestState::Sent(pair) => {
                    pair.msg_id == msg_id || pair.container_msg_id == msg_id
                }
                RequestState::NotSerialized => false,
            };
            if !hit {
                continue;
            }

            if bad_message_retryable(code) {
                debug!("bad_msg_notification (code {code}); re-sending request");
                self.requests[i].state = RequestState::NotSerialized;
            } else {
                warn!("bad_msg_notification (code {code}); request cannot be retried");
                let req = self.requests.swap_remove(i);
                drop(req.result.send(Err(InvocationError::Dropped)));
            }
        }
    }

    fn process_new_session(&mut self, info: NewSessionInfo) {
        for req in self.requests.iter_mut() {
            let lost = match req.state {
                RequestState::Sent(pair) => pair.msg_id.0 < info.first_msg_id,
                _ => false,
            };
            if lost {
                req.state = RequestState::NotSerialized;
            }
        }
    }

    fn pop_request(&mut self, msg_id: MsgId) -> Option<Request> {
        for i in 0..self.requests.len() {
            if let RequestState::Sent(pair) = self.requests[i].state {
                if pair.msg_id == msg_id {
                    return Some(self.requests.swap_remove(i));
                }
            }
        }
        None
    }

    async fn wait_for_flood(&self, body: &[u8], chat_id: Option<i64>) {
        if let Some(wait) = self.flood.check_flood_wait(constructor_id_of(body)) {
            tokio::time::sleep(wait).await;
        }
        if let Some(chat_id) = chat_id {
            if let Some(wait) = self.flood.check_slow_mode(chat_id) {
                tokio::time::sleep(wait).await;
            }
        }
    }

    fn record_flood(&mut self, rpc: &RpcError, chat_id: Option<i64>) {
        let Some(value) = rpc.value else { return };
        match (rpc.name.as_str(), chat_id) {
            ("FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT", _) => {
                if let Some(constructor_id) = rpc.caused_by {
                    self.flood
                        .record_flood_wait(constructor_id, Duration::from_secs(value as u64));
                }
            }
            ("SLOWMODE_WAIT", Some(chat_id)) => {
                self.flood
                    .record_slow_mode(chat_id, Duration::from_secs(value as u64));
            }
            _ => {}
        }
    }
}

async fn plain_roundtrip<T: Transport>(
    stream: &mut NetStream,
    transport: &mut T,
    body: Vec<u8>,
) -> Result<Vec<u8>, InvocationError> {
    let mut plain = mtp::Plain::new();
    let mut message = Vec::new();
    plain.serialize(&[body], &mut message);

    let mut framed = RingBuffer::with_capacity(message.len() + TRANSPORT_LEADING_SPACE, TRANSPORT_LEADING_SPACE);
    framed.extend(message);
    transport.pack(&mut framed);

    let (mut reader, mut writer) = stream.split();
    writer
        .write_all(framed.as_ref())
        .await
        .map_err(ReadError::Io)?;

    let mut buffer = vec![0u8; MAXIMUM_DATA];
    let mut tail = 0usize;
    loop {
        let n = reader
            .read(&mut buffer[tail..])
            .await
            .map_err(ReadError::Io)?;
        if n == 0 {
            return Err(
                ReadError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection closed during the handshake",
                ))
                .into(),
            );
        }
        tail += n;

        match transport.unpack(&mut buffer[..tail]) {
            Ok(unpacked) => {
                let result = plain
                    .deserialize(&buffer[unpacked.data_start..unpacked.data_end])
                    .map_err(ReadError::Deserialize)?;
                let (_, outcome) = result
                    .rpc_results
                    .into_iter()
                    .next()
                    .expect("a plain reply always yields exactly one result");
                return match outcome {
                    Ok(bytes) => Ok(bytes),
                    Err(RequestError::Deserialize(error)) => Err(ReadError::Deserialize(error).into()),
                    Err(_) => Err(ReadError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "server sent an rpc error during a plain handshake",
                    ))
                    .into()),
                };
            }
            Err(transport::Error::MissingBytes) => continue,
            Err(err) => return Err(ReadError::Transport(err).into()),
        }
    }
}

async fn handshake<T: Transport>(
    stream: &mut NetStream,
    transport: &mut T,
) -> Result<authentication::Finished, InvocationError> {
    info!("generating new authorization key...");
    let (request, data) = authentication::step1().map_err(wrap_auth)?;
    let response = plain_roundtrip(stream, transport, request).await?;

    let (request, data) = authentication::step2(data, &response).map_err(wrap_auth)?;
    let response = plain_roundtrip(stream, transport, request).await?;

    let (request, data) = authentication::step3(data, &response).map_err(wrap_auth)?;
    let response = plain_roundtrip(stream, transport, request).await?;

    let finished = authentication::create_key(data, &response).map_err(wrap_auth)?;
    info!("authorization key generated successfully");
    Ok(finished)
}

fn wrap_auth(error: AuthenticationError) -> InvocationError {
    InvocationError::Authentication(error)
}

impl<T: Transport> Sender<T, mtp::Encrypted> {
    /// Opens a fresh socket to `addr` and runs the authorization-key
    /// exchange over it (§4.1). `dc_id`/`test_mode` are only needed
    /// later, to resolve a migration target (§4.3.5).
    pub async fn connect(
        mut transport: T,
        addr: ServerAddr,
        dc_id: i32,
        test_mode: bool,
    ) -> Result<Self, InvocationError> {
        let mut stream = NetStream::connect(&addr).await.map_err(ReadError::Io)?;
        let finished = handshake(&mut stream, &mut transport).await?;
        Ok(Self::from_finished(stream, transport, addr, dc_id, test_mode, finished))
    }

    /// Opens a fresh socket to `addr` and reuses a previously negotiated
    /// authorization key instead of running the exchange again, as a
    /// persisted [`mtcore_session::Session`] allows.
    pub async fn connect_with_auth_key(
        transport: T,
        addr: ServerAddr,
        dc_id: i32,
        test_mode: bool,
        auth_key: [u8; 256],
        first_salt: i64,
    ) -> Result<Self, io::Error> {
        let stream = NetStream::connect(&addr).await?;
        let session_id = random_session_id();
        Ok(Self {
            stream,
            transport,
            mtp: mtp::Encrypted::build()
                .first_salt(first_salt)
                .finish(auth_key, session_id),
            addr,
            dc_id,
            test_mode,
            requests: Vec::new(),
            next_tag: 0,
            pending_updates: VecDeque::new(),
            flood: FloodState::new(),
            reconnection: Box::new(NoReconnect),
            next_ping: Instant::now() + PING_DELAY,
            read_buffer: vec![0; MAXIMUM_DATA],
            read_tail: 0,
            write_buffer: RingBuffer::with_capacity(MAXIMUM_DATA, TRANSPORT_LEADING_SPACE),
            write_head: 0,
        })
    }

    fn from_finished(
        stream: NetStream,
        transport: T,
        addr: ServerAddr,
        dc_id: i32,
        test_mode: bool,
        finished: authentication::Finished,
    ) -> Self {
        let session_id = random_session_id();
        Self {
            stream,
            transport,
            mtp: mtp::Encrypted::build()
                .time_offset(finished.time_offset)
                .first_salt(finished.first_salt)
                .finish(finished.auth_key, session_id),
            addr,
            dc_id,
            test_mode,
            requests: Vec::new(),
            next_tag: 0,
            pending_updates: VecDeque::new(),
            flood: FloodState::new(),
            reconnection: Box::new(NoReconnect),
            next_ping: Instant::now() + PING_DELAY,
            read_buffer: vec![0; MAXIMUM_DATA],
            read_tail: 0,
            write_buffer: RingBuffer::with_capacity(MAXIMUM_DATA, TRANSPORT_LEADING_SPACE),
            write_head: 0,
        }
    }

    /// The authorization key currently in use, to be persisted by the
    /// caller's [`mtcore_session::Session`].
    pub fn auth_key(&self) -> [u8; 256] {
        self.mtp.auth_key()
    }

    /// Reconnects to `dc_id`, discarding the current authorization key
    /// and every pending request (§4.3.5). Telegram does not let an
    /// authorization key be reused across data centers, so a fresh
    /// exchange always follows the reconnect.
    async fn migrate(&mut self, dc_id: i32) -> Result<(), InvocationError> {
        let (address, port) = DataCenterExtractor::find(dc_id, self.test_mode, false, false)
            .ok_or(InvocationError::InvalidDc)?;
        let socket_addr = format!("{address}:{port}")
            .parse()
            .map_err(|_| InvocationError::InvalidDc)?;
        let addr = ServerAddr::new(socket_addr);

        info!("migrating from dc {} to dc {}", self.dc_id, dc_id);
        for req in self.requests.drain(..) {
            drop(req.result.send(Err(InvocationError::Dropped)));
        }

        let mut stream = NetStream::connect(&addr).await.map_err(ReadError::Io)?;
        self.transport.reset();
        let finished = handshake(&mut stream, &mut self.transport).await?;

        self.stream = stream;
        self.addr = addr;
        self.dc_id = dc_id;
        self.mtp = mtp::Encrypted::build()
            .time_offset(finished.time_offset)
            .first_salt(finished.first_salt)
            .finish(finished.auth_key, random_session_id());
        self.read_tail = 0;
        self.write_buffer.clear();
        self.write_head = 0;
        Ok(())
    }

    async fn invoke_typed<R: RemoteCall>(
        &mut self,
        request: &R,
        chat_id: Option<i64>,
    ) -> Result<R::Return, InvocationError> {
        let body = request.to_bytes();
        self.wait_for_flood(&body, chat_id).await;

        match self.invoke_body(body.clone()).await {
            Ok(bytes) => decode_reply(&bytes),
            Err(InvocationError::Rpc(rpc)) => {
                self.record_flood(&rpc, chat_id);
                if let Some(dc_id) = migrate_target(&rpc) {
                    self.migrate(dc_id).await?;
                    let bytes = self.invoke_body(body).await?;
                    return decode_reply(&bytes);
                }
                Err(InvocationError::Rpc(rpc))
            }
            Err(other) => Err(other),
        }
    }

    /// Serializes `request`, enqueues it, and drives the connection
    /// until its reply (or a final error) arrives. Transparently follows
    /// one data-center migration and retries the request once if the
    /// server asks for one (§4.3.5).
    pub async fn invoke<R: RemoteCall>(&mut self, request: &R) -> Result<R::Return, InvocationError> {
        self.invoke_typed(request, None).await
    }

    /// Like [`Self::invoke`], but also tracks per-chat slow-mode waits
    /// (§4.3.6), which this crate cannot otherwise infer since it does
    /// not know the request's schema well enough to find a chat id
    /// inside it.
    pub async fn invoke_scoped<R: RemoteCall>(
        &mut self,
        request: &R,
        chat_id: i64,
    ) -> Result<R::Return, InvocationError> {
        self.invoke_typed(request, Some(chat_id)).await
    }

    /// Sends every request in `bodies`, returning each reply in order.
    /// If `ordered`, every request after the first is wrapped in
    /// `invokeAfterMsg` referencing the previous one's `msg_id`, so the
    /// server executes the batch serially (§4.3.1, §5). Any failure is
    /// reported as a single [`BulkSendError`] bundling every request's
    /// outcome rather than failing the whole call on the first error
    /// (§7).
    pub async fn invoke_many(
        &mut self,
        bodies: &[Vec<u8>],
        ordered: bool,
    ) -> Result<Vec<Vec<u8>>, BulkSendError> {
        let mut receivers = Vec::with_capacity(bodies.len());
        let mut prev_msg_id: Option<i64> = None;

        for body in bodies {
            let wrapped = match (ordered, prev_msg_id) {
                (true, Some(msg_id)) => InvokeAfterMsg {
                    msg_id,
                    query: body.clone(),
                }
                .to_bytes(),
                _ => body.clone(),
            };

            let (tx, rx) = oneshot::channel();
            let tag = self.enqueue_body(wrapped, tx);

            if ordered {
                match self.await_serialized(tag).await {
                    Ok(pair) => prev_msg_id = Some(pair.msg_id.0),
                    Err(err) => {
                        return Err(self.finish_bulk_send(bodies, receivers, Some(err)).await)
                    }
                }
            }

            receivers.push(rx);
        }

        let outcome = self.finish_bulk_send(bodies, receivers, None).await;
        if outcome.exceptions.iter().all(Option::is_none) {
            Ok(outcome
                .results
                .into_iter()
                .map(|r| r.expect("no exceptions recorded"))
                .collect())
        } else {
            Err(outcome)
        }
    }

    async fn finish_bulk_send(
        &mut self,
        bodies: &[Vec<u8>],
        receivers: Vec<oneshot::Receiver<Result<Vec<u8>, InvocationError>>>,
        upfront_error: Option<InvocationError>,
    ) -> BulkSendError {
        let mut results = Vec::with_capacity(bodies.len());
        let mut exceptions = Vec::with_capacity(bodies.len());

        for _ in 0..(bodies.len() - receivers.len()) {
            results.push(None);
            exceptions.push(upfront_error.clone());
        }

        for mut rx in receivers {
            let outcome = loop {
                match rx.try_recv() {
                    Ok(outcome) => break outcome,
                    Err(TryRecvError::Empty) => match self.step().await {
                        Ok(()) => continue,
                        Err(err) => break Err(err.into()),
                    },
                    Err(TryRecvError::Closed) => break Err(InvocationError::Dropped),
                }
            };
            match outcome {
                Ok(body) => {
                    results.push(Some(body));
                    exceptions.push(None);
                }
                Err(err) => {
                    results.push(None);
                    exceptions.push(Some(err));
                }
            }
        }

        BulkSendError {
            requests: bodies.to_vec(),
            results,
            exceptions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtcore_tl::Identifiable;

    fn rpc_error(name: &str, value: Option<u32>) -> RpcError {
        RpcError {
            code: 303,
            name: name.to_string(),
            value,
            caused_by: None,
        }
    }

    #[test]
    fn migrate_target_reads_every_migrate_error() {
        for name in ["PHONE_MIGRATE", "NETWORK_MIGRATE", "USER_MIGRATE", "FILE_MIGRATE"] {
            assert_eq!(migrate_target(&rpc_error(name, Some(2))), Some(2));
        }
        assert_eq!(migrate_target(&rpc_error("PHONE_MIGRATE", None)), None);
        assert_eq!(migrate_target(&rpc_error("FLOOD_WAIT", Some(2))), None);
    }

    #[test]
    fn bad_message_retryable_matches_only_correctable_codes() {
        for code in [16, 17, 32, 33] {
            assert!(bad_message_retryable(code));
        }
        for code in [18, 20, 48, 64] {
            assert!(!bad_message_retryable(code));
        }
    }

    #[test]
    fn constructor_id_of_reads_little_endian_prefix() {
        let body = vec![0x2d, 0x37, 0x9f, 0xcb, 1, 2, 3];
        assert_eq!(constructor_id_of(&body), 0xcb9f372d);
    }

    #[test]
    fn invoke_after_msg_wraps_query_verbatim() {
        let query = vec![9, 9, 9, 9, 1, 2, 3];
        let wrapped = InvokeAfterMsg {
            msg_id: 42,
            query: query.clone(),
        }
        .to_bytes();

        assert_eq!(constructor_id_of(&wrapped), InvokeAfterMsg::CONSTRUCTOR_ID);
        assert!(wrapped.ends_with(&query));
    }

    #[test]
    fn request_state_tracks_serialization_lifecycle() {
        let pair = MsgIdPair {
            msg_id: MsgId(101),
            container_msg_id: MsgId(101),
        };
        let mut state = RequestState::NotSerialized;
        assert!(matches!(state, RequestState::NotSerialized));

        state = RequestState::Serialized(pair);
        assert!(matches!(state, RequestState::Serialized(p) if p == pair));

        state = RequestState::Sent(pair);
        assert!(matches!(state, RequestState::Sent(p) if p == pair));
    }
}
