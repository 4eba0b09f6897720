// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use super::{Error, RingBuffer, Transport, UnpackedOffset};

/// The full transport, as described in the
/// [full transport](https://core.telegram.org/mtproto/mtproto-transports#full)
/// documentation.
///
/// It sends the most amount of data over the wire, but it is able to
/// notice transmission issues via its embedded length, sequence number
/// and CRC32 checksum.
///
/// ```text
/// +----+----+----...----+----+
/// | len| seq|  payload  | crc|
/// +----+----+----...----+----+
/// ```
#[derive(Default)]
pub struct Full {
    send_seq: i32,
    recv_seq: i32,
}

impl Full {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for Full {
    fn pack(&mut self, buffer: &mut RingBuffer<u8>) {
        assert_eq!(buffer.len() % 4, 0);

        // length (4 bytes) + seq (4 bytes) + payload + crc (4 bytes)
        let full_len = buffer.len() as i32 + 12;

        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&full_len.to_le_bytes());
        header[4..].copy_from_slice(&self.send_seq.to_le_bytes());
        buffer.shift(&header);

        let crc = crc32fast::hash(buffer.as_ref());
        buffer.extend(crc.to_le_bytes());

        self.send_seq += 1;
    }

    fn unpack(&mut self, buffer: &mut [u8]) -> Result<UnpackedOffset, Error> {
        if buffer.len() < 4 {
            return Err(Error::MissingBytes);
        }

        let len = i32::from_le_bytes(buffer[0..4].try_into().unwrap());
        if len < 0 {
            return Err(Error::BadStatus {
                status: (-len) as u32,
            });
        }
        if (len as usize) < 12 || len % 4 != 0 {
            return Err(Error::BadLen { got: len });
        }
        let len = len as usize;

        if buffer.len() < len {
            return Err(Error::MissingBytes);
        }

        let seq = i32::from_le_bytes(buffer[4..8].try_into().unwrap());
        if seq != self.recv_seq {
            return Err(Error::BadSeq {
                expected: self.recv_seq,
                got: seq,
            });
        }
        self.recv_seq += 1;

        let checksum = u32::from_le_bytes(buffer[len - 4..len].try_into().unwrap());
        let valid_checksum = crc32fast::hash(&buffer[..len - 4]);
        if checksum != valid_checksum {
            return Err(Error::BadCrc {
                expected: valid_checksum,
                got: checksum,
            });
        }

        Ok(UnpackedOffset {
            data_start: 8,
            data_end: len - 4,
            next_offset: len,
        })
    }

    fn reset(&mut self) {
        self.send_seq = 0;
        self.recv_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_empty() {
        let mut transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        transport.pack(&mut buffer);
        assert_eq!(buffer.as_ref(), [12, 0, 0, 0, 0, 0, 0, 0, 38, 202, 141, 50]);
    }

    #[test]
    #[should_panic]
    fn pack_non_padded() {
        let mut transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        buffer.shift(&[1, 2, 3]);
        transport.pack(&mut buffer);
    }

    #[test]
    fn pack_normal() {
        let mut transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        buffer.shift(&[1, 2, 3, 4]);
        transport.pack(&mut buffer);
        assert_eq!(buffer.as_ref()[..8], [16, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(buffer.as_ref()[8..12], [1, 2, 3, 4]);
    }

    #[test]
    fn pack_twice() {
        let mut transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        buffer.shift(&[1, 2, 3, 4]);
        transport.pack(&mut buffer);
        assert_eq!(transport.send_seq, 1);

        buffer.clear();
        buffer.shift(&[1, 2, 3, 4]);
        transport.pack(&mut buffer);
        assert_eq!(buffer.as_ref()[4..8], [1, 0, 0, 0]);
        assert_eq!(transport.send_seq, 2);
    }

    #[test]
    fn unpack_small() {
        let mut transport = Full::new();
        assert_eq!(transport.unpack(&mut [1, 2, 3]), Err(Error::MissingBytes));
    }

    #[test]
    fn unpack_normal() {
        let mut pack_transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        buffer.shift(&[1, 2, 3, 4]);
        pack_transport.pack(&mut buffer);

        let mut transport = Full::new();
        let len = buffer.len();
        let offset = transport.unpack(buffer.as_mut()).unwrap();
        assert_eq!(&buffer.as_ref()[offset.data_start..offset.data_end], &[1, 2, 3, 4]);
        assert_eq!(offset.next_offset, len);
    }

    #[test]
    fn unpack_two_at_once() {
        let mut pack_transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(64, 0);
        buffer.shift(&[1, 2, 3, 4]);
        pack_transport.pack(&mut buffer);
        buffer.shift(&[5, 6, 7, 8]);
        pack_transport.pack(&mut buffer);

        let mut transport = Full::new();
        let first = transport.unpack(buffer.as_mut()).unwrap();
        assert_eq!(&buffer.as_ref()[first.data_start..first.data_end], &[1, 2, 3, 4]);
        let second = transport
            .unpack(&mut buffer.as_mut()[first.next_offset..])
            .unwrap();
        assert_eq!(
            &buffer.as_ref()[first.next_offset + second.data_start..first.next_offset + second.data_end],
            &[5, 6, 7, 8]
        );
    }

    #[test]
    fn unpack_bad_seq() {
        let mut pack_transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        buffer.shift(&[1, 2, 3, 4]);
        pack_transport.pack(&mut buffer);

        let mut transport = Full::new();
        transport.recv_seq = 1;
        assert_eq!(
            transport.unpack(buffer.as_mut()),
            Err(Error::BadSeq { expected: 1, got: 0 })
        );
    }

    #[test]
    fn unpack_bad_crc() {
        let mut pack_transport = Full::new();
        let mut buffer = RingBuffer::with_capacity(32, 0);
        buffer.shift(&[1, 2, 3, 4]);
        pack_transport.pack(&mut buffer);

        let mut corrupted: Vec<u8> = buffer.as_ref().to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        let mut transport = Full::new();
        assert!(matches!(transport.unpack(&mut corrupted), Err(Error::BadCrc { .. })));
    }
}
