// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Hand-written TL constructors for the fixed set of messages the engine
//! itself must speak: the authorization-key exchange, and the small
//! notification/acknowledgement objects that ride inside an encrypted
//! session regardless of which application-level schema sits on top.
//!
//! This is deliberately not a generated schema (see `SPEC_FULL.md` §6a);
//! a caller's own generated types only need to implement [`Serializable`],
//! [`Deserializable`], [`Identifiable`] and [`RemoteCall`] to interoperate.

use crate::cursor::{Cursor, Deserializable};
use crate::error::{DeserializeError, Result};
use crate::serialize::Serializable;

/// Associates a type with its 4-byte little-endian constructor ID.
pub trait Identifiable {
    const CONSTRUCTOR_ID: u32;
}

/// Pairs a request type with the type of its expected response, so a
/// caller can decode a reply without re-stating what shape to expect.
pub trait RemoteCall: Serializable {
    type Return: Deserializable;
}

fn expect_id(buf: &mut Cursor, expected: u32) -> Result<()> {
    let id = u32::deserialize(buf)?;
    if id != expected {
        return Err(DeserializeError::UnexpectedConstructor { id });
    }
    Ok(())
}

/// `req_pq_multi#be7e8ef1 nonce:int128 = ResPQ;`
pub struct ReqPqMulti {
    pub nonce: [u8; 16],
}

impl Identifiable for ReqPqMulti {
    const CONSTRUCTOR_ID: u32 = 0xbe7e8ef1;
}

impl Serializable for ReqPqMulti {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
    }
}

impl RemoteCall for ReqPqMulti {
    type Return = ResPq;
}

/// `resPQ#05162463 nonce:int128 server_nonce:int128 pq:bytes
///   server_public_key_fingerprints:Vector<long> = ResPQ;`
pub struct ResPq {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub pq: Vec<u8>,
    pub server_public_key_fingerprints: Vec<i64>,
}

impl Identifiable for ResPq {
    const CONSTRUCTOR_ID: u32 = 0x0516_2463;
}

impl Deserializable for ResPq {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            nonce: Deserializable::deserialize(buf)?,
            server_nonce: Deserializable::deserialize(buf)?,
            pq: Deserializable::deserialize(buf)?,
            server_public_key_fingerprints: Deserializable::deserialize(buf)?,
        })
    }
}

/// `p_q_inner_data#83c95aec pq:bytes p:bytes q:bytes nonce:int128
///   server_nonce:int128 new_nonce:int256 = P_Q_inner_data;`
pub struct PqInnerData {
    pub pq: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce: [u8; 32],
}

impl Identifiable for PqInnerData {
    const CONSTRUCTOR_ID: u32 = 0x83c9_5aec;
}

impl Serializable for PqInnerData {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.pq.serialize(buf);
        self.p.serialize(buf);
        self.q.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.new_nonce.serialize(buf);
    }
}

/// `req_DH_params#d712e4be nonce:int128 server_nonce:int128 p:bytes q:bytes
///   public_key_fingerprint:long encrypted_data:bytes = Server_DH_Params;`
pub struct ReqDhParams {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub public_key_fingerprint: i64,
    pub encrypted_data: Vec<u8>,
}

impl Identifiable for ReqDhParams {
    const CONSTRUCTOR_ID: u32 = 0xd712_e4be;
}

impl Serializable for ReqDhParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.p.serialize(buf);
        self.q.serialize(buf);
        self.public_key_fingerprint.serialize(buf);
        self.encrypted_data.serialize(buf);
    }
}

impl RemoteCall for ReqDhParams {
    type Return = ServerDhParams;
}

/// Either `server_DH_params_ok` or `server_DH_params_fail`.
pub enum ServerDhParams {
    Ok(ServerDhParamsOk),
    Fail(ServerDhParamsFail),
}

impl Deserializable for ServerDhParams {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        match id {
            ServerDhParamsOk::CONSTRUCTOR_ID => Ok(Self::Ok(ServerDhParamsOk {
                nonce: Deserializable::deserialize(buf)?,
                server_nonce: Deserializable::deserialize(buf)?,
                encrypted_answer: Deserializable::deserialize(buf)?,
            })),
            ServerDhParamsFail::CONSTRUCTOR_ID => Ok(Self::Fail(ServerDhParamsFail {
                nonce: Deserializable::deserialize(buf)?,
                server_nonce: Deserializable::deserialize(buf)?,
                new_nonce_hash: Deserializable::deserialize(buf)?,
            })),
            _ => Err(DeserializeError::UnexpectedConstructor { id }),
        }
    }
}

/// `server_DH_params_ok#d0e8075c nonce:int128 server_nonce:int128
///   encrypted_answer:bytes = Server_DH_Params;`
pub struct ServerDhParamsOk {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub encrypted_answer: Vec<u8>,
}

impl Identifiable for ServerDhParamsOk {
    const CONSTRUCTOR_ID: u32 = 0xd0e8_075c;
}

/// `server_DH_params_fail#79cb045d nonce:int128 server_nonce:int128
///   new_nonce_hash:int128 = Server_DH_Params;`
pub struct ServerDhParamsFail {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce_hash: [u8; 16],
}

impl Identifiable for ServerDhParamsFail {
    const CONSTRUCTOR_ID: u32 = 0x79cb_045d;
}

/// `server_DH_inner_data#b5890dba nonce:int128 server_nonce:int128 g:int
///   dh_prime:bytes g_a:bytes server_time:int = Server_DH_inner_data;`
pub struct ServerDhInnerData {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub g: i32,
    pub dh_prime: Vec<u8>,
    pub g_a: Vec<u8>,
    pub server_time: i32,
}

impl Identifiable for ServerDhInnerData {
    const CONSTRUCTOR_ID: u32 = 0xb589_0dba;
}

impl Deserializable for ServerDhInnerData {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            nonce: Deserializable::deserialize(buf)?,
            server_nonce: Deserializable::deserialize(buf)?,
            g: Deserializable::deserialize(buf)?,
            dh_prime: Deserializable::deserialize(buf)?,
            g_a: Deserializable::deserialize(buf)?,
            server_time: Deserializable::deserialize(buf)?,
        })
    }
}

/// `client_DH_inner_data#6643b654 nonce:int128 server_nonce:int128
///   retry_id:long g_b:bytes = Client_DH_Inner_Data;`
pub struct ClientDhInnerData {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub retry_id: i64,
    pub g_b: Vec<u8>,
}

impl Identifiable for ClientDhInnerData {
    const CONSTRUCTOR_ID: u32 = 0x6643_b654;
}

impl Serializable for ClientDhInnerData {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.retry_id.serialize(buf);
        self.g_b.serialize(buf);
    }
}

/// `set_client_DH_params#f5045f1f nonce:int128 server_nonce:int128
///   encrypted_data:bytes = Set_client_DH_params_answer;`
pub struct SetClientDhParams {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub encrypted_data: Vec<u8>,
}

impl Identifiable for SetClientDhParams {
    const CONSTRUCTOR_ID: u32 = 0xf504_5f1f;
}

impl Serializable for SetClientDhParams {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.nonce.serialize(buf);
        self.server_nonce.serialize(buf);
        self.encrypted_data.serialize(buf);
    }
}

impl RemoteCall for SetClientDhParams {
    type Return = SetClientDhParamsAnswer;
}

/// One of `dh_gen_ok`, `dh_gen_retry`, `dh_gen_fail`.
pub enum SetClientDhParamsAnswer {
    DhGenOk(DhGenOk),
    DhGenRetry(DhGenRetry),
    DhGenFail(DhGenFail),
}

impl Deserializable for SetClientDhParamsAnswer {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        match id {
            DhGenOk::CONSTRUCTOR_ID => Ok(Self::DhGenOk(DhGenOk {
                nonce: Deserializable::deserialize(buf)?,
                server_nonce: Deserializable::deserialize(buf)?,
                new_nonce_hash1: Deserializable::deserialize(buf)?,
            })),
            DhGenRetry::CONSTRUCTOR_ID => Ok(Self::DhGenRetry(DhGenRetry {
                nonce: Deserializable::deserialize(buf)?,
                server_nonce: Deserializable::deserialize(buf)?,
                new_nonce_hash2: Deserializable::deserialize(buf)?,
            })),
            DhGenFail::CONSTRUCTOR_ID => Ok(Self::DhGenFail(DhGenFail {
                nonce: Deserializable::deserialize(buf)?,
                server_nonce: Deserializable::deserialize(buf)?,
                new_nonce_hash3: Deserializable::deserialize(buf)?,
            })),
            _ => Err(DeserializeError::UnexpectedConstructor { id }),
        }
    }
}

/// `dh_gen_ok#3bcbf734 nonce:int128 server_nonce:int128
///   new_nonce_hash1:int128 = Set_client_DH_params_answer;`
pub struct DhGenOk {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce_hash1: [u8; 16],
}

impl Identifiable for DhGenOk {
    const CONSTRUCTOR_ID: u32 = 0x3bcb_f734;
}

/// `dh_gen_retry#46dc1fb9 nonce:int128 server_nonce:int128
///   new_nonce_hash2:int128 = Set_client_DH_params_answer;`
pub struct DhGenRetry {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce_hash2: [u8; 16],
}

impl Identifiable for DhGenRetry {
    const CONSTRUCTOR_ID: u32 = 0x46dc_1fb9;
}

/// `dh_gen_fail#a69dae02 nonce:int128 server_nonce:int128
///   new_nonce_hash3:int128 = Set_client_DH_params_answer;`
pub struct DhGenFail {
    pub nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce_hash3: [u8; 16],
}

impl Identifiable for DhGenFail {
    const CONSTRUCTOR_ID: u32 = 0xa69d_ae02;
}

/// `rpc_error#2144ca19 error_code:int error_message:string = RpcError;`
pub struct RpcError {
    pub error_code: i32,
    pub error_message: String,
}

impl Identifiable for RpcError {
    const CONSTRUCTOR_ID: u32 = 0x2144_ca19;
}

impl Deserializable for RpcError {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            error_code: Deserializable::deserialize(buf)?,
            error_message: Deserializable::deserialize(buf)?,
        })
    }
}

/// `bad_server_salt#edab447b bad_msg_id:long bad_msg_seqno:int
///   error_code:int new_server_salt:long = BadMsgNotification;`
pub struct BadServerSalt {
    pub bad_msg_id: i64,
    pub bad_msg_seqno: i32,
    pub error_code: i32,
    pub new_server_salt: i64,
}

impl Identifiable for BadServerSalt {
    const CONSTRUCTOR_ID: u32 = 0xedab_447b;
}

impl Deserializable for BadServerSalt {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            bad_msg_id: Deserializable::deserialize(buf)?,
            bad_msg_seqno: Deserializable::deserialize(buf)?,
            error_code: Deserializable::deserialize(buf)?,
            new_server_salt: Deserializable::deserialize(buf)?,
        })
    }
}

/// `bad_msg_notification#a7eff811 bad_msg_id:long bad_msg_seqno:int
///   error_code:int = BadMsgNotification;`
pub struct BadMsgNotification {
    pub bad_msg_id: i64,
    pub bad_msg_seqno: i32,
    pub error_code: i32,
}

impl Identifiable for BadMsgNotification {
    const CONSTRUCTOR_ID: u32 = 0xa7ef_f811;
}

impl Deserializable for BadMsgNotification {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            bad_msg_id: Deserializable::deserialize(buf)?,
            bad_msg_seqno: Deserializable::deserialize(buf)?,
            error_code: Deserializable::deserialize(buf)?,
        })
    }
}

/// `msgs_ack#62d6b459 msg_ids:Vector<long> = MsgsAck;`
pub struct MsgsAck {
    pub msg_ids: Vec<i64>,
}

impl Identifiable for MsgsAck {
    const CONSTRUCTOR_ID: u32 = 0x62d6_b459;
}

impl Serializable for MsgsAck {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.msg_ids.serialize(buf);
    }
}

impl Deserializable for MsgsAck {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            msg_ids: Deserializable::deserialize(buf)?,
        })
    }
}

/// `msg_detailed_info#276d3ec6 msg_id:long answer_msg_id:long bytes:int
///   status:int = MsgDetailedInfo;`
pub struct MsgDetailedInfo {
    pub msg_id: i64,
    pub answer_msg_id: i64,
    pub bytes: i32,
    pub status: i32,
}

impl Identifiable for MsgDetailedInfo {
    const CONSTRUCTOR_ID: u32 = 0x276d_3ec6;
}

impl Deserializable for MsgDetailedInfo {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            msg_id: Deserializable::deserialize(buf)?,
            answer_msg_id: Deserializable::deserialize(buf)?,
            bytes: Deserializable::deserialize(buf)?,
            status: Deserializable::deserialize(buf)?,
        })
    }
}

/// `msg_new_detailed_info#809db6df answer_msg_id:long bytes:int
///   status:int = MsgDetailedInfo;`
pub struct MsgNewDetailedInfo {
    pub answer_msg_id: i64,
    pub bytes: i32,
    pub status: i32,
}

impl Identifiable for MsgNewDetailedInfo {
    const CONSTRUCTOR_ID: u32 = 0x809d_b6df;
}

impl Deserializable for MsgNewDetailedInfo {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            answer_msg_id: Deserializable::deserialize(buf)?,
            bytes: Deserializable::deserialize(buf)?,
            status: Deserializable::deserialize(buf)?,
        })
    }
}

/// `future_salt#0949d9dc valid_since:int valid_until:int salt:long = FutureSalt;`
pub struct FutureSalt {
    pub valid_since: i32,
    pub valid_until: i32,
    pub salt: i64,
}

impl Identifiable for FutureSalt {
    const CONSTRUCTOR_ID: u32 = 0x0949_d9dc;
}

impl Deserializable for FutureSalt {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            valid_since: Deserializable::deserialize(buf)?,
            valid_until: Deserializable::deserialize(buf)?,
            salt: Deserializable::deserialize(buf)?,
        })
    }
}

/// `future_salts#ae500895 req_msg_id:long now:int salts:vector<future_salt>
///   = FutureSalts;`
pub struct FutureSalts {
    pub req_msg_id: i64,
    pub now: i32,
    pub salts: Vec<FutureSalt>,
}

impl Identifiable for FutureSalts {
    const CONSTRUCTOR_ID: u32 = 0xae50_0895;
}

impl Deserializable for FutureSalts {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        let req_msg_id = i64::deserialize(buf)?;
        let now = i32::deserialize(buf)?;
        let len = u32::deserialize(buf)?;
        let salts = (0..len).map(|_| FutureSalt::deserialize(buf)).collect::<Result<_>>()?;
        Ok(Self { req_msg_id, now, salts })
    }
}

/// `ping#7abe77ec ping_id:long = Pong;`
pub struct Ping {
    pub ping_id: i64,
}

impl Identifiable for Ping {
    const CONSTRUCTOR_ID: u32 = 0x7abe_77ec;
}

impl Serializable for Ping {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.ping_id.serialize(buf);
    }
}

impl RemoteCall for Ping {
    type Return = Pong;
}

/// `pong#347773c5 msg_id:long ping_id:long = Pong;`
pub struct Pong {
    pub msg_id: i64,
    pub ping_id: i64,
}

impl Identifiable for Pong {
    const CONSTRUCTOR_ID: u32 = 0x3477_73c5;
}

impl Deserializable for Pong {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            msg_id: Deserializable::deserialize(buf)?,
            ping_id: Deserializable::deserialize(buf)?,
        })
    }
}

/// `ping_delay_disconnect#f3427b8c ping_id:long disconnect_delay:int
///   = Pong;`
///
/// Like `ping`, but tells the server to drop the connection if no
/// further request arrives within `disconnect_delay` seconds. Sent
/// instead of a bare `ping` so an idle connection is torn down
/// server-side rather than lingering.
pub struct PingDelayDisconnect {
    pub ping_id: i64,
    pub disconnect_delay: i32,
}

impl Identifiable for PingDelayDisconnect {
    const CONSTRUCTOR_ID: u32 = 0xf342_7b8c;
}

impl Serializable for PingDelayDisconnect {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.ping_id.serialize(buf);
        self.disconnect_delay.serialize(buf);
    }
}

impl RemoteCall for PingDelayDisconnect {
    type Return = Pong;
}

/// `new_session_created#9ec20908 first_msg_id:long unique_id:long
///   server_salt:long = NewSession;`
pub struct NewSessionCreated {
    pub first_msg_id: i64,
    pub unique_id: i64,
    pub server_salt: i64,
}

impl Identifiable for NewSessionCreated {
    const CONSTRUCTOR_ID: u32 = 0x9ec2_0908;
}

impl Deserializable for NewSessionCreated {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            first_msg_id: Deserializable::deserialize(buf)?,
            unique_id: Deserializable::deserialize(buf)?,
            server_salt: Deserializable::deserialize(buf)?,
        })
    }
}

/// `msgs_state_req#da69fb52 msg_ids:Vector<long> = MsgsStateReq;`
pub struct MsgsStateReq {
    pub msg_ids: Vec<i64>,
}

impl Identifiable for MsgsStateReq {
    const CONSTRUCTOR_ID: u32 = 0xda69_fb52;
}

impl Serializable for MsgsStateReq {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.msg_ids.serialize(buf);
    }
}

/// `msgs_state_info#04deb57d req_msg_id:long info:bytes = MsgsStateInfo;`
pub struct MsgsStateInfo {
    pub req_msg_id: i64,
    pub info: Vec<u8>,
}

impl Identifiable for MsgsStateInfo {
    const CONSTRUCTOR_ID: u32 = 0x04de_b57d;
}

impl Deserializable for MsgsStateInfo {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            req_msg_id: Deserializable::deserialize(buf)?,
            info: Deserializable::deserialize(buf)?,
        })
    }
}

/// `msgs_all_info#8cc0d131 msg_ids:Vector<long> info:bytes = MsgsAllInfo;`
pub struct MsgsAllInfo {
    pub msg_ids: Vec<i64>,
    pub info: Vec<u8>,
}

impl Identifiable for MsgsAllInfo {
    const CONSTRUCTOR_ID: u32 = 0x8cc0_d131;
}

impl Deserializable for MsgsAllInfo {
    fn deserialize(buf: &mut Cursor) -> Result<Self> {
        expect_id(buf, Self::CONSTRUCTOR_ID)?;
        Ok(Self {
            msg_ids: Deserializable::deserialize(buf)?,
            info: Deserializable::deserialize(buf)?,
        })
    }
}

/// `msg_resend_req#7d861a08 msg_ids:Vector<long> = MsgResendReq;`
pub struct MsgResendReq {
    pub msg_ids: Vec<i64>,
}

impl Identifiable for MsgResendReq {
    const CONSTRUCTOR_ID: u32 = 0x7d86_1a08;
}

impl Serializable for MsgResendReq {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.msg_ids.serialize(buf);
    }
}

/// `invokeAfterMsg#cb9f372d msg_id:long query:!X = X;`
///
/// Wraps an already-serialized request so the server executes it only
/// after the message identified by `msg_id` has been processed. Used to
/// chain an `ordered` batch (§4.3.1, §5) without needing the caller's
/// schema to know about this wrapper: `query` is the callee's request
/// bytes, constructor id included, copied verbatim.
pub struct InvokeAfterMsg {
    pub msg_id: i64,
    pub query: Vec<u8>,
}

impl Identifiable for InvokeAfterMsg {
    const CONSTRUCTOR_ID: u32 = 0xcb9f_372d;
}

impl Serializable for InvokeAfterMsg {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.msg_id.serialize(buf);
        buf.extend(self.query.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_pq_multi_matches_known_bytes() {
        let nonce: [u8; 16] = hex_decode("4e44b426241e8b839153122d44585ac6"[..32].as_bytes());
        let req = ReqPqMulti { nonce };
        let bytes = req.to_bytes();
        assert_eq!(&bytes[0..4], &0xbe7e_8ef1u32.to_le_bytes());
        assert_eq!(&bytes[4..20], &nonce);
    }

    fn hex_decode(hex: &[u8]) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (i, chunk) in hex.chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk).unwrap();
            out[i] = u8::from_str_radix(s, 16).unwrap();
        }
        out
    }
}
