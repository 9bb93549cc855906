//! FILEMQ message catalogue: the `Message` enum plus its header-framed
//! encode/decode entry points.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use super::{primitive as dec, serializer as enc, DecodeError, Result, MAGIC, VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MessageId {
    Ohai = 1,
    OhaiOk = 2,
    Icanhaz = 3,
    IcanhazOk = 4,
    Nom = 5,
    Cheezburger = 6,
    Hugz = 7,
    HugzOk = 8,
    Kthxbai = 9,
    Srsly = 10,
    Rtfm = 11,
}

/// The op carried by a CHEEZBURGER frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Op {
    Create = 1,
    Delete = 2,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ohai,
    OhaiOk,
    Icanhaz {
        path: String,
        options: HashMap<String, String>,
        cache: HashMap<String, String>,
    },
    IcanhazOk,
    Nom {
        credit: u64,
        sequence: u64,
    },
    Cheezburger {
        sequence: u64,
        operation: Op,
        filename: String,
        offset: u64,
        eof: bool,
        headers: HashMap<String, String>,
        chunk: Vec<u8>,
    },
    Hugz,
    HugzOk,
    Kthxbai,
    Srsly {
        reason: String,
    },
    Rtfm {
        reason: String,
    },
}

impl Message {
    fn id(&self) -> MessageId {
        match self {
            Message::Ohai => MessageId::Ohai,
            Message::OhaiOk => MessageId::OhaiOk,
            Message::Icanhaz { .. } => MessageId::Icanhaz,
            Message::IcanhazOk => MessageId::IcanhazOk,
            Message::Nom { .. } => MessageId::Nom,
            Message::Cheezburger { .. } => MessageId::Cheezburger,
            Message::Hugz => MessageId::Hugz,
            Message::HugzOk => MessageId::HugzOk,
            Message::Kthxbai => MessageId::Kthxbai,
            Message::Srsly { .. } => MessageId::Srsly,
            Message::Rtfm { .. } => MessageId::Rtfm,
        }
    }
}

/// Encodes `msg` into a new buffer: 4-byte magic, 1-byte version, 1-byte
/// message id, then the id-specific fields.
pub fn encode(msg: &Message) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_all(&MAGIC)?;
    enc::u8(&mut buf, VERSION)?;
    enc::u8(&mut buf, msg.id().to_u8().expect("MessageId fits in u8"))?;

    match msg {
        Message::Ohai
        | Message::OhaiOk
        | Message::IcanhazOk
        | Message::Hugz
        | Message::HugzOk
        | Message::Kthxbai => {}
        Message::Icanhaz { path, options, cache } => {
            enc::short_string(&mut buf, path)?;
            enc::map(&mut buf, options)?;
            enc::map(&mut buf, cache)?;
        }
        Message::Nom { credit, sequence } => {
            enc::number(&mut buf, *credit)?;
            enc::number(&mut buf, *sequence)?;
        }
        Message::Cheezburger { sequence, operation, filename, offset, eof, headers, chunk } => {
            enc::number(&mut buf, *sequence)?;
            enc::u8(&mut buf, operation.to_u8().expect("Op fits in u8"))?;
            enc::short_string(&mut buf, filename)?;
            enc::number(&mut buf, *offset)?;
            enc::u8(&mut buf, if *eof { 1 } else { 0 })?;
            enc::map(&mut buf, headers)?;
            enc::chunk(&mut buf, chunk)?;
        }
        Message::Srsly { reason } | Message::Rtfm { reason } => {
            enc::long_string(&mut buf, reason)?;
        }
    }

    Ok(buf)
}

/// Decodes a complete frame from `bytes`. Any leftover trailing bytes are
/// ignored by the caller; the transport is expected to deliver exactly one
/// frame per buffer.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let mut r = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|_| DecodeError::Truncated)?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    let version = dec::u8(&mut r)?;
    if version != VERSION {
        return Err(DecodeError::BadVersion(version));
    }

    let id_byte = dec::u8(&mut r)?;
    let id = MessageId::from_u8(id_byte).ok_or(DecodeError::BadMessageId(id_byte))?;

    decode_body(id, &mut r)
}

fn decode_body(id: MessageId, r: &mut impl Read) -> Result<Message> {
    Ok(match id {
        MessageId::Ohai => Message::Ohai,
        MessageId::OhaiOk => Message::OhaiOk,
        MessageId::Icanhaz => {
            let path = dec::short_string(r)?;
            let options = dec::map(r)?;
            let cache = dec::map(r)?;
            Message::Icanhaz { path, options, cache }
        }
        MessageId::IcanhazOk => Message::IcanhazOk,
        MessageId::Nom => {
            let credit = dec::number(r)?;
            let sequence = dec::number(r)?;
            Message::Nom { credit, sequence }
        }
        MessageId::Cheezburger => {
            let sequence = dec::number(r)?;
            let op_byte = dec::u8(r)?;
            let operation = Op::from_u8(op_byte).ok_or(DecodeError::BadOp(op_byte))?;
            let filename = dec::short_string(r)?;
            let offset = dec::number(r)?;
            let eof = dec::u8(r)? != 0;
            let headers = dec::map(r)?;
            let chunk = dec::chunk(r)?;
            Message::Cheezburger { sequence, operation, filename, offset, eof, headers, chunk }
        }
        MessageId::Hugz => Message::Hugz,
        MessageId::HugzOk => Message::HugzOk,
        MessageId::Kthxbai => Message::Kthxbai,
        MessageId::Srsly => Message::Srsly { reason: dec::long_string(r)? },
        MessageId::Rtfm => Message::Rtfm { reason: dec::long_string(r)? },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let bytes = encode(&msg).expect("encode");
        let decoded = decode(&bytes).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn roundtrip_simple_messages() {
        roundtrip(Message::Ohai);
        roundtrip(Message::OhaiOk);
        roundtrip(Message::IcanhazOk);
        roundtrip(Message::Hugz);
        roundtrip(Message::HugzOk);
        roundtrip(Message::Kthxbai);
    }

    #[test]
    fn roundtrip_icanhaz() {
        let mut options = HashMap::new();
        options.insert("resync".to_string(), "0".to_string());
        let mut cache = HashMap::new();
        cache.insert("/a.txt".to_string(), "deadbeef".to_string());
        roundtrip(Message::Icanhaz { path: "/photos".to_string(), options, cache });
    }

    #[test]
    fn roundtrip_nom() {
        roundtrip(Message::Nom { credit: 4_000_001, sequence: 7 });
    }

    #[test]
    fn roundtrip_cheezburger() {
        roundtrip(Message::Cheezburger {
            sequence: 1,
            operation: Op::Create,
            filename: "a.txt".to_string(),
            offset: 0,
            eof: false,
            headers: HashMap::new(),
            chunk: b"hello".to_vec(),
        });
        roundtrip(Message::Cheezburger {
            sequence: 2,
            operation: Op::Delete,
            filename: "a.txt".to_string(),
            offset: 0,
            eof: true,
            headers: HashMap::new(),
            chunk: Vec::new(),
        });
    }

    #[test]
    fn roundtrip_reason_messages() {
        roundtrip(Message::Srsly { reason: "unexpected message in this state".to_string() });
        roundtrip(Message::Rtfm { reason: "bad magic".to_string() });
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = encode(&Message::Ohai).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic)));
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let bytes = encode(&Message::Nom { credit: 1, sequence: 1 }).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(truncated), Err(DecodeError::Truncated)));
    }

    #[test]
    fn decode_rejects_unknown_message_id() {
        let mut bytes = encode(&Message::Ohai).unwrap();
        bytes[5] = 200;
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMessageId(200))));
    }
}
