//! G.711 mu-law transcoding
//!
//! Standard ITU-T G.711 companding with the 0x84 bias and inverted output
//! bits. Both directions run on int16 linear samples; normalization to f32
//! lives in [`voice_bridge_core::AudioFrame`].

const BIAS: i16 = 0x84;
const CLIP: i16 = 32635;

/// Encode one linear PCM16 sample to mu-law
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0 };
    let mut magnitude = if sample < 0 {
        // i16::MIN has no positive counterpart; clamp before negating
        (sample.max(-CLIP)).wrapping_neg()
    } else {
        sample.min(CLIP)
    };
    magnitude += BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (magnitude & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode one mu-law byte to linear PCM16
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let magnitude = (((mantissa as i16) << 3) + BIAS) << exponent;
    let magnitude = magnitude - BIAS;

    if sign != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a PCM16 sample slice to mu-law bytes
pub fn encode_mulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}

/// Decode mu-law bytes to PCM16 samples
pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}
