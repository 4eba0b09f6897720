// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use super::{Deserialization, Mtp, MsgIdPair, NewSessionInfo};
use crate::errors::{DeserializeError, RequestError};
use crate::{manual_tl, MsgId};
use mtcore_crypto::{decrypt_data_v2, encrypt_data_v2, AuthKey, RingBuffer};
use mtcore_tl::{constructors as tl, Cursor, Deserializable, Identifiable, Serializable};
use std::mem;
use web_time::{SystemTime, UNIX_EPOCH};

/// A builder to configure [`Encrypted`] instances.
///
/// Use [`Encrypted::build`] to create one.
pub struct Builder {
    time_offset: i32,
    first_salt: i64,
    compression_threshold: Option<usize>,
}

impl Builder {
    /// Configures the time offset to the server, as computed at the end
    /// of the authorization-key exchange (§4.1, step 3).
    pub fn time_offset(mut self, offset: i32) -> Self {
        self.time_offset = offset;
        self
    }

    /// Configures the initial server salt. A persisted session may supply
    /// the last salt it saw to skip an initial `bad_server_salt` round
    /// trip (§4.5.4); otherwise `0` is fine and the first exchange will
    /// correct it.
    pub fn first_salt(mut self, first_salt: i64) -> Self {
        self.first_salt = first_salt;
        self
    }

    /// Configures the compression threshold for outgoing messages. `None`
    /// disables compression entirely.
    pub fn compression_threshold(mut self, threshold: Option<usize>) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Finishes the builder, binding it to an authorization key and the
    /// session id the caller's [`Session`](mtcore_session) has assigned
    /// for this connection.
    pub fn finish(self, auth_key: [u8; 256], session_id: i64) -> Encrypted {
        Encrypted {
            auth_key: AuthKey::from_bytes(auth_key),
            time_offset: self.time_offset,
            salt: self.first_salt,
            session_id,
            sequence: 0,
            last_msg_id: 0,
            pending_ack: Vec::new(),
            compression_threshold: self.compression_threshold,
            rpc_results: Vec::new(),
            updates: Vec::new(),
            acks: Vec::new(),
            new_session: None,
        }
    }
}

/// An implementation of the [Mobile Transport Protocol] for ciphertext
/// (encrypted) messages: the workhorse of an established session. Turns
/// batches of outgoing requests into a single AES-IGE encrypted packet
/// (optionally wrapped in a `msg_container`), and decodes the server's
/// encrypted replies back into RPC results, acknowledgements and updates.
///
/// [Mobile Transport Protocol]: https://core.telegram.org/mtproto
pub struct Encrypted {
    auth_key: AuthKey,
    time_offset: i32,
    salt: i64,
    session_id: i64,
    sequence: i32,
    last_msg_id: i64,

    /// Identifiers of server messages that still need acknowledging; sent
    /// as a `msgs_ack` piggybacked on the next outgoing packet.
    pending_ack: Vec<i64>,

    /// Threshold in bytes above which an outgoing request is wrapped in
    /// `gzip_packed`, if doing so actually shrinks it. `None` disables
    /// compression.
    compression_threshold: Option<usize>,

    rpc_results: Vec<(MsgId, Result<Vec<u8>, RequestError>)>,
    updates: Vec<Vec<u8>>,
    acks: Vec<i64>,
    new_session: Option<NewSessionInfo>,
}

impl Encrypted {
    /// Starts building a new [`Encrypted`] codec.
    pub fn build() -> Builder {
        Builder {
            time_offset: 0,
            first_salt: 0,
            compression_threshold: crate::DEFAULT_COMPRESSION_THRESHOLD,
        }
    }

    /// The authorization key in use.
    pub fn auth_key(&self) -> [u8; 256] {
        self.auth_key.to_bytes()
    }

    /// The server salt currently attached to outgoing messages.
    pub fn salt(&self) -> i64 {
        self.salt
    }

    /// Overwrites the server salt. Called after a `bad_server_salt` or
    /// `new_session_created` notification (§3, invariant 5); never
    /// speculatively.
    pub fn set_salt(&mut self, salt: i64) {
        self.salt = salt;
    }

    /// The clock correction currently applied to outgoing `msg_id`s.
    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }

    /// Recomputes `time_offset` from an authoritative server `msg_id`
    /// (§4.5.3), used after `bad_msg_notification` codes 16/17.
    pub fn correct_time_offset(&mut self, authoritative_msg_id: i64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is before epoch")
            .as_secs() as i32;
        self.time_offset = (authoritative_msg_id >> 32) as i32 - now;
        self.last_msg_id = 0;
    }

    /// Generates a new strictly-increasing `msg_id` (§4.5.1).
    fn next_msg_id(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is before epoch");

        let seconds = (now.as_secs() as i32 + self.time_offset) as u64;
        let nanoseconds = now.subsec_nanos() as u64;
        let mut new_msg_id = ((seconds << 32) | (nanoseconds << 2)) as i64;

        if new_msg_id <= self.last_msg_id {
            new_msg_id = self.last_msg_id + 4;
        }

        self.last_msg_id = new_msg_id;
        new_msg_id
    }

    /// Generates the next sequence number (§4.5.2): odd and incrementing
    /// for content-related messages, even (and unchanged) otherwise.
    fn gen_seq(&mut self, content_related: bool) -> i32 {
        if content_related {
            let r = self.sequence * 2 + 1;
            self.sequence += 1;
            r
        } else {
            self.sequence * 2
        }
    }

    /// Adjusts `sequence` after a `bad_msg_notification` with code 32 or
    /// 33 (seqno drift). Positive to bump, negative to decrement.
    fn bump_sequence(&mut self, delta: i32) {
        self.sequence += delta;
    }

    fn push_ack_message(&mut self) -> Option<manual_tl::Message> {
        if self.pending_ack.is_empty() {
            return None;
        }
        let body = tl::MsgsAck {
            msg_ids: mem::take(&mut self.pending_ack),
        }
        .to_bytes();
        let msg_id = self.next_msg_id();
        let seq_no = self.gen_seq(false);
        Some(manual_tl::Message {
            msg_id,
            seq_no,
            body,
        })
    }

    fn compress_if_worthwhile(&self, request: &[u8]) -> Vec<u8> {
        if let Some(threshold) = self.compression_threshold {
            if request.len() >= threshold {
                let compressed = manual_tl::GzipPacked::new(request).to_bytes();
                if compressed.len() < request.len() {
                    return compressed;
                }
            }
        }
        request.to_vec()
    }

    fn process_message(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        if message.requires_ack() {
            self.pending_ack.push(message.msg_id);
        }

        // Acks, service messages and rpc_result all count as "the server
        // has received our query", per the protocol's acknowledgment
        // rules for containers (every top-level msg_id we see, except a
        // bare ack sent by us, counts as a server-side acknowledgment of
        // whatever message it carries a req_msg_id for).
        match message.constructor_id()? {
            manual_tl::RpcResult::CONSTRUCTOR_ID => self.handle_rpc_result(message),
            tl::MsgsAck::CONSTRUCTOR_ID => self.handle_ack(message),
            tl::BadServerSalt::CONSTRUCTOR_ID => self.handle_bad_server_salt(message),
            tl::BadMsgNotification::CONSTRUCTOR_ID => self.handle_bad_msg_notification(message),
            tl::MsgsStateReq::CONSTRUCTOR_ID => self.handle_state_req(message),
            tl::MsgsStateInfo::CONSTRUCTOR_ID => self.handle_state_info(message),
            tl::MsgsAllInfo::CONSTRUCTOR_ID => self.handle_msg_all(message),
            tl::MsgDetailedInfo::CONSTRUCTOR_ID => self.handle_detailed_info(message),
            tl::MsgNewDetailedInfo::CONSTRUCTOR_ID => self.handle_new_detailed_info(message),
            tl::MsgResendReq::CONSTRUCTOR_ID => self.handle_msg_resend(message),
            tl::FutureSalt::CONSTRUCTOR_ID => self.handle_future_salt(message),
            tl::FutureSalts::CONSTRUCTOR_ID => self.handle_future_salts(message),
            tl::Pong::CONSTRUCTOR_ID => self.handle_pong(message),
            tl::NewSessionCreated::CONSTRUCTOR_ID => self.handle_new_session_created(message),
            manual_tl::MessageContainer::CONSTRUCTOR_ID => self.handle_container(message),
            manual_tl::GzipPacked::CONSTRUCTOR_ID => self.handle_gzip_packed(message),
            _ => self.handle_update(message),
        }
    }

    /// `rpc_result#f35c6d01 req_msg_id:long result:Object = RpcResult;`
    ///
    /// A response to an RPC query, or, if its inner constructor is
    /// `rpc_error`, a typed application-level failure.
    fn handle_rpc_result(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        let rpc_result = manual_tl::RpcResult::from_bytes(&message.body)?;
        let msg_id = MsgId(rpc_result.req_msg_id);
        self.acks.push(rpc_result.req_msg_id);

        let inner_constructor = match rpc_result.inner_constructor() {
            Ok(id) => id,
            Err(e) => {
                self.rpc_results.push((msg_id, Err(e.into())));
                return Ok(());
            }
        };

        match inner_constructor {
            tl::RpcError::CONSTRUCTOR_ID => {
                let result = match tl::RpcError::from_bytes(&rpc_result.result) {
                    Ok(error) => Err(RequestError::RpcError(crate::errors::RpcError::from_parts(
                        error.error_code,
                        &error.error_message,
                    ))),
                    Err(e) => Err(e.into()),
                };
                self.rpc_results.push((msg_id, result));
            }
            manual_tl::GzipPacked::CONSTRUCTOR_ID => {
                let result = match manual_tl::GzipPacked::from_bytes(&rpc_result.result) {
                    Ok(gzip) => gzip.decompress().map_err(RequestError::from),
                    Err(e) => Err(e.into()),
                };
                self.rpc_results.push((msg_id, result));
            }
            _ => {
                self.rpc_results.push((msg_id, Ok(rpc_result.result)));
            }
        }

        Ok(())
    }

    /// `msgs_ack#62d6b459 msg_ids:Vector<long> = MsgsAck;`
    fn handle_ack(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        let ack = tl::MsgsAck::from_bytes(&message.body)?;
        self.acks.extend(ack.msg_ids);
        Ok(())
    }

    /// `bad_server_salt#edab447b bad_msg_id:long bad_msg_seqno:int
    ///   error_code:int new_server_salt:long = BadMsgNotification;`
    ///
    /// The salt we were using is stale; adopt the new one and let the
    /// sender retransmit the offending message.
    fn handle_bad_server_salt(
        &mut self,
        message: manual_tl::Message,
    ) -> Result<(), DeserializeError> {
        let bad_salt = tl::BadServerSalt::from_bytes(&message.body)?;
        self.salt = bad_salt.new_server_salt;
        self.rpc_results.push((
            MsgId(bad_salt.bad_msg_id),
            Err(RequestError::BadMessage {
                code: bad_salt.error_code,
            }),
        ));
        Ok(())
    }

    /// `bad_msg_notification#a7eff811 bad_msg_id:long bad_msg_seqno:int
    ///   error_code:int = BadMsgNotification;`
    ///
    /// Codes 16/17 mean our clock is off; 32/33 mean our `seq_no` drifted.
    /// In both cases the offending message should be retransmitted, which
    /// the sender does by matching `RequestError::BadMessage` off of
    /// `rpc_results`.
    fn handle_bad_msg_notification(
        &mut self,
        message: manual_tl::Message,
    ) -> Result<(), DeserializeError> {
        let bad_msg = tl::BadMsgNotification::from_bytes(&message.body)?;

        match bad_msg.error_code {
            16 | 17 => self.correct_time_offset(message.msg_id),
            32 => self.bump_sequence(64),
            33 => self.bump_sequence(-16),
            _ => {}
        }

        self.rpc_results.push((
            MsgId(bad_msg.bad_msg_id),
            Err(RequestError::BadMessage {
                code: bad_msg.error_code,
            }),
        ));
        Ok(())
    }

    /// `msgs_state_req#da69fb52 msg_ids:Vector<long> = MsgsStateReq;`
    ///
    /// Telegram's servers do not send this to clients in practice; no
    /// generated schema type exists to answer it, so it is acknowledged
    /// (via `requires_ack`) and otherwise ignored.
    fn handle_state_req(&mut self, _message: manual_tl::Message) -> Result<(), DeserializeError> {
        Ok(())
    }

    /// `msgs_state_info#04deb57d req_msg_id:long info:string = MsgsStateInfo;`
    fn handle_state_info(&mut self, _message: manual_tl::Message) -> Result<(), DeserializeError> {
        Ok(())
    }

    /// `msgs_all_info#8cc0d131 msg_ids:Vector<long> info:string = MsgsAllInfo;`
    fn handle_msg_all(&mut self, _message: manual_tl::Message) -> Result<(), DeserializeError> {
        Ok(())
    }

    /// `msg_detailed_info#276d3ec6 msg_id:long answer_msg_id:long
    ///   bytes:int status:int = MsgDetailedInfo;`
    ///
    /// Queue the referenced answer for acknowledgment (§4.3.3).
    fn handle_detailed_info(
        &mut self,
        message: manual_tl::Message,
    ) -> Result<(), DeserializeError> {
        let info = tl::MsgDetailedInfo::from_bytes(&message.body)?;
        self.pending_ack.push(info.answer_msg_id);
        Ok(())
    }

    /// `msg_new_detailed_info#809db6df answer_msg_id:long bytes:int
    ///   status:int = MsgDetailedInfo;`
    fn handle_new_detailed_info(
        &mut self,
        message: manual_tl::Message,
    ) -> Result<(), DeserializeError> {
        let info = tl::MsgNewDetailedInfo::from_bytes(&message.body)?;
        self.pending_ack.push(info.answer_msg_id);
        Ok(())
    }

    /// `msg_resend_req#7d861a08 msg_ids:Vector<long> = MsgResendReq;`
    ///
    /// Never sent by Telegram's production servers to a well-behaved
    /// client; there is nothing for the core to resend on its own
    /// (resending lives in the sender's pending map), so this is a no-op
    /// beyond the ack already queued by `process_message`.
    fn handle_msg_resend(&mut self, _message: manual_tl::Message) -> Result<(), DeserializeError> {
        Ok(())
    }

    /// `future_salt#0949d9dc valid_since:int valid_until:int salt:long = FutureSalt;`
    ///
    /// No request in this core ever produces a bare `future_salt` as a
    /// top-level result (only wrapped in `future_salts`); log and ignore
    /// rather than treat it as fatal.
    fn handle_future_salt(&mut self, _message: manual_tl::Message) -> Result<(), DeserializeError> {
        log::warn!("received a bare future_salt outside of future_salts, ignoring");
        Ok(())
    }

    /// `future_salts#ae500895 req_msg_id:long now:int salts:vector<future_salt> = FutureSalts;`
    fn handle_future_salts(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        let salts = tl::FutureSalts::from_bytes(&message.body)?;
        self.rpc_results
            .push((MsgId(salts.req_msg_id), Ok(message.body)));
        Ok(())
    }

    /// `pong#347773c5 msg_id:long ping_id:long = Pong;`
    fn handle_pong(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        let pong = tl::Pong::from_bytes(&message.body)?;
        self.rpc_results
            .push((MsgId(pong.msg_id), Ok(message.body)));
        Ok(())
    }

    /// `new_session_created#9ec20908 first_msg_id:long unique_id:long
    ///   server_salt:long = NewSession;`
    fn handle_new_session_created(
        &mut self,
        message: manual_tl::Message,
    ) -> Result<(), DeserializeError> {
        let created = tl::NewSessionCreated::from_bytes(&message.body)?;
        self.salt = created.server_salt;
        self.new_session = Some(NewSessionInfo {
            first_msg_id: created.first_msg_id,
            server_salt: created.server_salt,
        });
        Ok(())
    }

    /// `msg_container#73f1f8dc messages:vector<message> = MessageContainer;`
    fn handle_container(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        let container = manual_tl::MessageContainer::from_bytes(&message.body)?;
        for inner in container.messages {
            self.process_message(inner)?;
        }
        Ok(())
    }

    /// `gzip_packed#3072cfa1 packed_data:string = Object;`
    fn handle_gzip_packed(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        let container = manual_tl::GzipPacked::from_bytes(&message.body)?;
        self.process_message(manual_tl::Message {
            body: container.decompress()?,
            ..message
        })
    }

    /// Anything that isn't a recognized service message is an update:
    /// an application-level `Updates` constructor this core does not
    /// itself understand the shape of.
    fn handle_update(&mut self, message: manual_tl::Message) -> Result<(), DeserializeError> {
        self.updates.push(message.body);
        Ok(())
    }
}

// The first actual message comes after `salt`, `session_id` (8 bytes each).
const HEADER_LEN: usize = 16;

impl Mtp for Encrypted {
    fn serialize(&mut self, requests: &[Vec<u8>], output: &mut Vec<u8>) -> Vec<MsgIdPair> {
        output.clear();

        let mut msg_ids = Vec::with_capacity(requests.len());
        let mut messages = Vec::with_capacity(requests.len() + 1);

        if let Some(ack) = self.push_ack_message() {
            messages.push(ack);
        }

        for request in requests {
            assert_eq!(request.len() % 4, 0, "requests must be 4-byte aligned");
            let body = self.compress_if_worthwhile(request);
            let msg_id = self.next_msg_id();
            let seq_no = self.gen_seq(true);
            msg_ids.push(MsgIdPair {
                msg_id: MsgId(msg_id),
                container_msg_id: MsgId(msg_id), // corrected below if batched
            });
            messages.push(manual_tl::Message {
                msg_id,
                seq_no,
                body,
            });
        }

        if messages.is_empty() {
            return msg_ids;
        }

        let body = if messages.len() == 1 {
            messages.into_iter().next().unwrap().to_bytes()
        } else {
            let container_body = manual_tl::MessageContainer { messages }.to_bytes();
            let msg_id = self.next_msg_id();
            let seq_no = self.gen_seq(false);
            for pair in msg_ids.iter_mut() {
                pair.container_msg_id = MsgId(msg_id);
            }
            manual_tl::Message {
                msg_id,
                seq_no,
                body: container_body,
            }
            .to_bytes()
        };

        let mut plaintext = RingBuffer::with_capacity(HEADER_LEN + body.len(), 0);
        self.salt.serialize(&mut plaintext);
        self.session_id.serialize(&mut plaintext);
        plaintext.extend(body);

        encrypt_data_v2(&mut plaintext, &self.auth_key);
        output.extend_from_slice(plaintext.as_ref());

        msg_ids
    }

    fn deserialize(&mut self, payload: &[u8]) -> Result<Deserialization, DeserializeError> {
        crate::utils::check_message_buffer(payload)?;

        let plaintext = decrypt_data_v2(payload, &self.auth_key)?;
        let mut buf = Cursor::from_slice(&plaintext);

        let _salt = i64::deserialize(&mut buf)?;
        let session_id = i64::deserialize(&mut buf)?;
        if session_id != self.session_id {
            return Err(DeserializeError::BadSessionId {
                got: session_id,
                expected: self.session_id,
            });
        }

        let message = manual_tl::Message::deserialize(&mut buf)?;
        self.process_message(message)?;

        Ok(Deserialization {
            rpc_results: mem::take(&mut self.rpc_results),
            updates: mem::take(&mut self.updates),
            acks: mem::take(&mut self.acks),
            new_session: self.new_session.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE_PREFIX_LEN: usize = 8 + 8;

    fn auth_key() -> [u8; 256] {
        [0; 256]
    }

    #[test]
    fn serialize_has_salt_and_session_id() {
        let mut mtp = Encrypted::build()
            .first_salt(7)
            .finish(auth_key(), 42);

        let mut output = Vec::new();
        mtp.serialize(&[vec![1, 2, 3, 4]], &mut output);

        // We can't inspect the plaintext directly (it's encrypted), but
        // we can check the codec round-trips through another instance
        // sharing the same key/session in `encrypted_roundtrip`.
        assert!(!output.is_empty());
    }

    #[test]
    fn msg_id_is_monotone_and_div_by_4() {
        let mut mtp = Encrypted::build().finish(auth_key(), 1);
        let a = mtp.next_msg_id();
        let b = mtp.next_msg_id();
        assert!(b > a);
        assert_eq!(a % 4, 0);
        assert_eq!(b % 4, 0);
    }

    #[test]
    fn seq_no_parity() {
        let mut mtp = Encrypted::build().finish(auth_key(), 1);
        assert_eq!(mtp.gen_seq(true) % 2, 1);
        assert_eq!(mtp.gen_seq(true) % 2, 1);
        assert_eq!(mtp.gen_seq(false) % 2, 0);
    }

    #[test]
    fn encrypted_roundtrip_single_message() {
        let mut client = Encrypted::build().finish(auth_key(), 99);
        let mut server = Encrypted::build().finish(auth_key(), 99);

        let mut packet = Vec::new();
        let ids = client.serialize(&[b"Hey!".to_vec()], &mut packet);
        assert_eq!(ids.len(), 1);

        // Server can decode the packet (it recognizes the constructor as
        // an update since `Hey!` isn't a real TL object, which is fine;
        // we only care that decryption and session-id checks succeed).
        let result = server.deserialize(&packet);
        assert!(result.is_ok());
    }

    #[test]
    fn encrypted_rejects_wrong_session_id() {
        let mut client = Encrypted::build().finish(auth_key(), 1);
        let mut other = Encrypted::build().finish(auth_key(), 2);

        let mut packet = Vec::new();
        client.serialize(&[b"Hey!".to_vec()], &mut packet);

        assert!(matches!(
            other.deserialize(&packet),
            Err(DeserializeError::BadSessionId { .. })
        ));
    }

    #[test]
    fn container_used_for_multiple_requests() {
        let mut mtp = Encrypted::build()
            .compression_threshold(None)
            .finish(auth_key(), 5);

        let mut output = Vec::new();
        let ids = mtp.serialize(&[b"Hey!".to_vec(), b"Bye!".to_vec()], &mut output);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0].msg_id, ids[1].msg_id);
        // Both requests were batched into the same outer container.
        assert_eq!(ids[0].container_msg_id, ids[1].container_msg_id);
        assert_ne!(ids[0].container_msg_id, ids[0].msg_id);
    }

    #[test]
    fn bad_msg_notification_code_16_corrects_time_offset() {
        let mut mtp = Encrypted::build().finish(auth_key(), 1);
        let before = mtp.time_offset();
        mtp.correct_time_offset(((1_700_000_000i64) << 32) | 0);
        assert_ne!(mtp.time_offset(), before);
    }

    #[test]
    fn empty_serialize_is_empty() {
        let mut mtp = Encrypted::build().finish(auth_key(), 1);
        let mut output = vec![0xffu8];
        let ids = mtp.serialize(&[], &mut output);
        assert!(ids.is_empty());
        assert!(output.is_empty());
    }
}
