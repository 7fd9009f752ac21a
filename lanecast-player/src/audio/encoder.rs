//! Frame encoding for voice sinks
//!
//! A sink decides its wire format by handing out an encoder per track.

use crate::error::Result;

/// Turns one frame of interleaved PCM into a sink packet
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>>;
}

/// Passes PCM through as s16le bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmFrameEncoder;

impl FrameEncoder for PcmFrameEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(pcm.len() * 2);
        for sample in pcm {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_encoder_is_little_endian() {
        let mut encoder = PcmFrameEncoder;
        assert_eq!(encoder.encode(&[1, -2]).unwrap(), vec![0x01, 0x00, 0xfe, 0xff]);
    }
}
