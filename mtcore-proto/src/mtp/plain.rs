// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use super::{Deserialization, Mtp, MsgIdPair};
use crate::errors::DeserializeError;
use crate::MsgId;
use mtcore_tl::{Cursor, Deserializable, Serializable};

/// An implementation of the [Mobile Transport Protocol] for plaintext
/// (unencrypted) messages.
///
/// The reason to separate the plaintext and encrypted implementations
/// for serializing messages is that, even though they are similar, the
/// benefits outweigh the minor code duplication.
///
/// This way, the encryption key for [`Encrypted`] is mandatory, so
/// errors from trying to encrypt data without a key are eliminated
/// entirely at the type level.
///
/// Plain messages are only ever used for the handful of unencrypted
/// requests that precede the authorization-key exchange itself (see
/// `authentication`); no higher layer should reach for this type once a
/// key has been established.
///
/// [Mobile Transport Protocol]: https://core.telegram.org/mtproto
/// [`Encrypted`]: super::Encrypted
#[derive(Default)]
#[non_exhaustive]
pub struct Plain;

impl Plain {
    pub fn new() -> Self {
        Self
    }
}

impl Mtp for Plain {
    /// Wraps a request's data into a plain message (also known as
    /// [unencrypted messages]), and returns its serialized contents.
    ///
    /// Plain messages may be used for requests that don't require an
    /// authorization key to be present, such as those needed to generate
    /// the authorization key itself.
    ///
    /// Panics unless exactly one request is given.
    ///
    /// [unencrypted messages]: https://core.telegram.org/mtproto/description#unencrypted-message
    fn serialize(&mut self, requests: &[Vec<u8>], output: &mut Vec<u8>) -> Vec<MsgIdPair> {
        assert_eq!(requests.len(), 1);
        let body = &requests[0];

        output.clear();

        0i64.serialize(output); // auth_key_id = 0

        // Even though https://core.telegram.org/mtproto/samples-auth_key
        // seems to imply the `msg_id` has to follow some rules, there is
        // no need to generate a valid one here; the server does not
        // correlate plain replies by `msg_id`.
        0i64.serialize(output); // message_id

        (body.len() as i32).serialize(output); // message_data_length
        output.extend_from_slice(body); // message_data

        vec![MsgIdPair {
            msg_id: MsgId(0),
            container_msg_id: MsgId(0),
        }]
    }

    /// Validates that the returned data is a correctly-framed plain
    /// message and, if it is, returns its inner contents as a single
    /// "rpc result" keyed by `MsgId(0)`.
    fn deserialize(&mut self, payload: &[u8]) -> Result<Deserialization, DeserializeError> {
        crate::utils::check_message_buffer(payload)?;

        let mut buf = Cursor::from_slice(payload);
        let auth_key_id = i64::deserialize(&mut buf)?;
        if auth_key_id != 0 {
            return Err(DeserializeError::BadAuthKey {
                got: auth_key_id,
                expected: 0,
            });
        }

        let msg_id = i64::deserialize(&mut buf)?;
        // We can't validate it's close to our system time because our
        // system time may be wrong at this point (it only matters once
        // encrypted communication begins). However, we can validate the
        // following:
        //
        // > server message identifiers modulo 4 yield 1 if the message
        // > is a response to a client message
        // https://core.telegram.org/mtproto/description#message-identifier-msg-id
        if msg_id <= 0 || (msg_id % 4) != 1 {
            return Err(DeserializeError::BadMessageId { got: msg_id });
        }

        let len = i32::deserialize(&mut buf)?;
        if len <= 0 {
            return Err(DeserializeError::NegativeMessageLength { got: len });
        }
        if (20 + len) as usize > payload.len() {
            return Err(DeserializeError::TooLongMessageLength {
                got: len as usize,
                max_length: payload.len() - 20,
            });
        }

        Ok(Deserialization {
            rpc_results: vec![(MsgId(0), Ok(payload[20..20 + len as usize].into()))],
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_serialize_clears_buffer() {
        let mut mtp = Plain::new();
        let requests = vec![vec![b'H', b'e', b'y', b'!']];
        let mut output = Vec::new();

        mtp.serialize(&requests, &mut output);
        assert_eq!(output.len(), 24);

        mtp.serialize(&requests, &mut output);
        assert_eq!(output.len(), 24);
    }

    #[test]
    fn plain_roundtrip() {
        let mut mtp = Plain::new();
        let requests = vec![vec![1, 2, 3, 4]];
        let mut output = Vec::new();
        mtp.serialize(&requests, &mut output);

        // Fabricate a server-shaped reply: auth_key_id=0, a valid msg_id,
        // then the same body echoed back.
        let mut reply = Vec::new();
        0i64.serialize(&mut reply);
        5i64.serialize(&mut reply); // msg_id % 4 == 1
        4i32.serialize(&mut reply);
        reply.extend_from_slice(&[9, 9, 9, 9]);

        let got = mtp.deserialize(&reply).unwrap();
        assert_eq!(got.rpc_results.len(), 1);
        assert_eq!(got.rpc_results[0].1.as_ref().unwrap(), &vec![9, 9, 9, 9]);
    }

    #[test]
    fn rejects_bad_auth_key() {
        let mut mtp = Plain::new();
        let mut reply = Vec::new();
        1i64.serialize(&mut reply);
        5i64.serialize(&mut reply);
        0i32.serialize(&mut reply);

        assert!(matches!(
            mtp.deserialize(&reply),
            Err(DeserializeError::BadAuthKey { .. })
        ));
    }
}
