// src/core/protocol/codec.rs

//! `tokio_util::codec` `Encoder`/`Decoder` pair for [`Envelope`], generalized
//! from `resp_frame.rs`'s `RespFrameCodec`: a length-prefixed frame around a
//! single `bincode`-encoded value, rather than a recursive line protocol.

use crate::core::errors::GnsError;
use crate::core::protocol::messages::Envelope;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames larger than this are rejected outright rather than buffered,
/// bounding how much a misbehaving peer can make us hold in memory.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = GnsError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let config = bincode::config::standard();
        let body = bincode::serde::encode_to_vec(&item, config)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(GnsError::Encoding(format!(
                "frame of {} bytes exceeds max {}",
                body.len(),
                MAX_FRAME_LEN
            )));
        }
        dst.reserve(LEN_PREFIX + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = GnsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = u32::from_be_bytes(src[..LEN_PREFIX].try_into().unwrap()) as usize;
        if len > MAX_FRAME_LEN {
            return Err(GnsError::Encoding(format!(
                "incoming frame of {len} bytes exceeds max {MAX_FRAME_LEN}"
            )));
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let body = src.split_to(len);
        let config = bincode::config::standard();
        let (envelope, _) = bincode::serde::decode_from_slice(&body, config)?;
        Ok(Some(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::node_id::NodeId;

    #[test]
    fn round_trips_an_envelope() {
        let mut codec = EnvelopeCodec;
        let mut buf = BytesMut::new();
        let msg = Envelope::StopEpoch {
            service_name: "svc.example".to_string(),
            epoch_number: 7,
            requester: NodeId::new("rc-1"),
        };
        codec.encode(msg.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        match decoded {
            Envelope::StopEpoch {
                service_name,
                epoch_number,
                requester,
            } => {
                assert_eq!(service_name, "svc.example");
                assert_eq!(epoch_number, 7);
                assert_eq!(requester, NodeId::new("rc-1"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_a_full_frame() {
        let mut codec = EnvelopeCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(
                Envelope::DemandReport {
                    service_name: "svc".into(),
                    epoch_number: 1,
                    sender: NodeId::new("ar-1"),
                    profile_blob: vec![1, 2, 3],
                },
                &mut buf,
            )
            .unwrap();
        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }
}
