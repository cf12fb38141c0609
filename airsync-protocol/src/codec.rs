//! Binary framing: one self-delimited MessagePack fixmap per message.
//!
//! The type codes used here are exactly those the wire protocol calls
//! normative — positive fixint, fixmap, fixstr, str8, uint8/16/32,
//! float64, bin8/16/32, negative fixint — so a minimal reader (a web
//! sink decoding with nothing but a MessagePack cursor) can parse this
//! without pulling in a full schema. `rmp`'s `write_uint`/`write_str`
//! already pick the shortest of those codes for a given value; we never
//! hand-pick a width.

use std::io::{Cursor, Read};

use crate::error::MalformedMessage;
use crate::messages::{AudioChunkMsg, ClientReady, ErrorMsg, Message, ServerInfo, SyncRequest, SyncResponse};

type EncodeResult<T> = Result<T, MalformedMessage>;

fn write_key(buf: &mut Vec<u8>, key: &str) {
    rmp::encode::write_str(buf, key).expect("write to Vec<u8> cannot fail");
}

fn write_u32_field(buf: &mut Vec<u8>, key: &str, value: u32) {
    write_key(buf, key);
    rmp::encode::write_uint(buf, value as u64).expect("write to Vec<u8> cannot fail");
}

fn write_f64_field(buf: &mut Vec<u8>, key: &str, value: f64) {
    write_key(buf, key);
    rmp::encode::write_f64(buf, value).expect("write to Vec<u8> cannot fail");
}

fn write_str_field(buf: &mut Vec<u8>, key: &str, value: &str) {
    write_key(buf, key);
    rmp::encode::write_str(buf, value).expect("write to Vec<u8> cannot fail");
}

fn write_bin_field(buf: &mut Vec<u8>, key: &str, value: &[u8]) {
    write_key(buf, key);
    rmp::encode::write_bin(buf, value).expect("write to Vec<u8> cannot fail");
}

/// Encodes a message to its wire form: one fixmap, `"type"` first, then
/// each field in the table order from the protocol spec.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    let field_count: u32 = 1 + match msg {
        Message::ServerInfo(_) => 5,
        Message::SyncRequest(_) => 1,
        Message::SyncResponse(_) => 3,
        Message::AudioChunk(_) => 3,
        Message::ClientReady(_) => 1,
        Message::Error(_) => 1,
    };
    rmp::encode::write_map_len(&mut buf, field_count).expect("write to Vec<u8> cannot fail");
    write_str_field(&mut buf, "type", msg.tag());

    match msg {
        Message::ServerInfo(m) => {
            write_u32_field(&mut buf, "sampleRate", m.sample_rate);
            write_u32_field(&mut buf, "channels", m.channels);
            write_u32_field(&mut buf, "bitDepth", m.bit_depth);
            write_u32_field(&mut buf, "chunkDurationMs", m.chunk_duration_ms);
            write_f64_field(&mut buf, "serverStartTime", m.server_start_time);
        }
        Message::SyncRequest(m) => {
            write_f64_field(&mut buf, "t1", m.t1);
        }
        Message::SyncResponse(m) => {
            write_f64_field(&mut buf, "t1", m.t1);
            write_f64_field(&mut buf, "t2", m.t2);
            write_f64_field(&mut buf, "t3", m.t3);
        }
        Message::AudioChunk(m) => {
            write_f64_field(&mut buf, "timestamp", m.timestamp);
            write_u32_field(&mut buf, "sequence", m.sequence);
            write_bin_field(&mut buf, "data", &m.data);
        }
        Message::ClientReady(m) => {
            write_str_field(&mut buf, "clientId", &m.client_id);
        }
        Message::Error(m) => {
            write_str_field(&mut buf, "message", &m.message);
        }
    }

    buf
}

fn read_key(cur: &mut Cursor<&[u8]>) -> EncodeResult<String> {
    read_string(cur).map_err(|_| MalformedMessage::Encoding("expected field key".into()))
}

fn expect_key(cur: &mut Cursor<&[u8]>, expected: &'static str) -> EncodeResult<()> {
    let key = read_key(cur)?;
    if key != expected {
        return Err(MalformedMessage::MissingField(expected));
    }
    Ok(())
}

fn read_string(cur: &mut Cursor<&[u8]>) -> EncodeResult<String> {
    let len = rmp::decode::read_str_len(cur)
        .map_err(|e| MalformedMessage::Encoding(e.to_string()))? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)
        .map_err(|e| MalformedMessage::Encoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| MalformedMessage::Encoding(e.to_string()))
}

fn read_u32(cur: &mut Cursor<&[u8]>, field: &'static str) -> EncodeResult<u32> {
    rmp::decode::read_int::<u32, _>(cur).map_err(|_| MalformedMessage::OutOfRange(field))
}

fn read_f64(cur: &mut Cursor<&[u8]>, field: &'static str) -> EncodeResult<f64> {
    rmp::decode::read_f64(cur).map_err(|_| MalformedMessage::OutOfRange(field))
}

fn read_bin(cur: &mut Cursor<&[u8]>, field: &'static str) -> EncodeResult<Vec<u8>> {
    let len = rmp::decode::read_bin_len(cur)
        .map_err(|_| MalformedMessage::LengthMismatch(field))? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)
        .map_err(|_| MalformedMessage::LengthMismatch(field))?;
    Ok(bytes)
}

/// Decodes one wire message. Fails with [`MalformedMessage`] when the
/// tag is unknown, a required field is absent or out of order, a
/// numeric field is out of range, or a binary blob's declared length
/// can't be satisfied from the remaining bytes.
pub fn decode(bytes: &[u8]) -> Result<Message, MalformedMessage> {
    let mut cur = Cursor::new(bytes);
    let map_len = rmp::decode::read_map_len(&mut cur)
        .map_err(|e| MalformedMessage::Encoding(e.to_string()))?;
    if map_len == 0 {
        return Err(MalformedMessage::MissingField("type"));
    }
    expect_key(&mut cur, "type")?;
    let tag = read_string(&mut cur)?;

    let expected_len = match tag.as_str() {
        "server_info" => 6,
        "sync_request" => 2,
        "sync_response" => 4,
        "audio_chunk" => 4,
        "client_ready" => 2,
        "error" => 2,
        other => return Err(MalformedMessage::UnknownTag(other.to_string())),
    };
    if map_len != expected_len {
        return Err(MalformedMessage::MissingField("field count"));
    }

    let message = match tag.as_str() {
        "server_info" => {
            expect_key(&mut cur, "sampleRate")?;
            let sample_rate = read_u32(&mut cur, "sampleRate")?;
            expect_key(&mut cur, "channels")?;
            let channels = read_u32(&mut cur, "channels")?;
            expect_key(&mut cur, "bitDepth")?;
            let bit_depth = read_u32(&mut cur, "bitDepth")?;
            expect_key(&mut cur, "chunkDurationMs")?;
            let chunk_duration_ms = read_u32(&mut cur, "chunkDurationMs")?;
            expect_key(&mut cur, "serverStartTime")?;
            let server_start_time = read_f64(&mut cur, "serverStartTime")?;
            Message::ServerInfo(ServerInfo {
                sample_rate,
                channels,
                bit_depth,
                chunk_duration_ms,
                server_start_time,
            })
        }
        "sync_request" => {
            expect_key(&mut cur, "t1")?;
            let t1 = read_f64(&mut cur, "t1")?;
            Message::SyncRequest(SyncRequest { t1 })
        }
        "sync_response" => {
            expect_key(&mut cur, "t1")?;
            let t1 = read_f64(&mut cur, "t1")?;
            expect_key(&mut cur, "t2")?;
            let t2 = read_f64(&mut cur, "t2")?;
            expect_key(&mut cur, "t3")?;
            let t3 = read_f64(&mut cur, "t3")?;
            Message::SyncResponse(SyncResponse { t1, t2, t3 })
        }
        "audio_chunk" => {
            expect_key(&mut cur, "timestamp")?;
            let timestamp = read_f64(&mut cur, "timestamp")?;
            expect_key(&mut cur, "sequence")?;
            let sequence = read_u32(&mut cur, "sequence")?;
            expect_key(&mut cur, "data")?;
            let data = read_bin(&mut cur, "data")?;
            Message::AudioChunk(AudioChunkMsg { timestamp, sequence, data })
        }
        "client_ready" => {
            expect_key(&mut cur, "clientId")?;
            let client_id = read_string(&mut cur)?;
            Message::ClientReady(ClientReady { client_id })
        }
        "error" => {
            expect_key(&mut cur, "message")?;
            let message = read_string(&mut cur)?;
            Message::Error(ErrorMsg { message })
        }
        other => return Err(MalformedMessage::UnknownTag(other.to_string())),
    };

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn roundtrip(msg: Message) {
        let bytes = encode(&msg);
        let decoded = decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn roundtrips_every_tag() {
        let mut rng = rand::rng();
        for _ in 0..64 {
            roundtrip(Message::ServerInfo(ServerInfo {
                sample_rate: rng.random_range(1..200_000),
                channels: rng.random_range(1..8),
                bit_depth: *[8u32, 16, 24, 32].iter().nth(rng.random_range(0..4)).unwrap(),
                chunk_duration_ms: rng.random_range(1..1000),
                server_start_time: rng.random_range(0.0..1e12),
            }));
            roundtrip(Message::SyncRequest(SyncRequest { t1: rng.random_range(0.0..1e12) }));
            roundtrip(Message::SyncResponse(SyncResponse {
                t1: rng.random_range(0.0..1e12),
                t2: rng.random_range(0.0..1e12),
                t3: rng.random_range(0.0..1e12),
            }));
            let len: usize = rng.random_range(0..4096);
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            roundtrip(Message::AudioChunk(AudioChunkMsg {
                timestamp: rng.random_range(0.0..1e12),
                sequence: rng.random(),
                data,
            }));
            roundtrip(Message::ClientReady(ClientReady { client_id: "sink-1".to_string() }));
            roundtrip(Message::Error(ErrorMsg { message: "boom".to_string() }));
        }
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut buf = Vec::new();
        rmp::encode::write_map_len(&mut buf, 1).unwrap();
        rmp::encode::write_str(&mut buf, "type").unwrap();
        rmp::encode::write_str(&mut buf, "not_a_real_tag").unwrap();
        assert!(matches!(decode(&buf), Err(MalformedMessage::UnknownTag(_))));
    }

    #[test]
    fn rejects_truncated_payload() {
        let msg = Message::SyncRequest(SyncRequest { t1: 42.0 });
        let mut bytes = encode(&msg);
        bytes.truncate(bytes.len() - 2);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn rejects_bin_length_mismatch() {
        // Declare a bin16 blob of 10 bytes but only supply 2.
        let mut buf = Vec::new();
        rmp::encode::write_map_len(&mut buf, 4).unwrap();
        rmp::encode::write_str(&mut buf, "type").unwrap();
        rmp::encode::write_str(&mut buf, "audio_chunk").unwrap();
        rmp::encode::write_str(&mut buf, "timestamp").unwrap();
        rmp::encode::write_f64(&mut buf, 1.0).unwrap();
        rmp::encode::write_str(&mut buf, "sequence").unwrap();
        rmp::encode::write_uint(&mut buf, 1).unwrap();
        rmp::encode::write_str(&mut buf, "data").unwrap();
        rmp::encode::write_bin_len(&mut buf, 10).unwrap();
        buf.extend_from_slice(&[1, 2]);
        assert!(matches!(decode(&buf), Err(MalformedMessage::LengthMismatch(_))));
    }

    #[test]
    fn encodes_audio_chunk_data_as_bin_type_code() {
        let msg = Message::AudioChunk(AudioChunkMsg {
            timestamp: 0.0,
            sequence: 0,
            data: vec![0u8; 3840],
        });
        let bytes = encode(&msg);
        // bin16 marker (0xc5) must appear since 3840 exceeds bin8's 255-byte limit.
        assert!(bytes.contains(&0xc5));
    }
}
