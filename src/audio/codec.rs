// G.711 mu-law companding
//
// Converts 16-bit linear PCM samples to 8-bit logarithmic codes and back.
// Encoding follows the CCITT reference: add a bias of 0x84 to the magnitude,
// find the segment (exponent) from the highest set bit, keep the next four
// bits as the mantissa and store the whole byte inverted.

/// Bias added to the magnitude before segment search
const BIAS: i32 = 0x84;

/// Largest magnitude that still fits once the bias is added
const CLIP: i32 = 32635;

/// Encode one 16-bit PCM sample to a mu-law byte
pub fn encode(sample: i16) -> u8 {
    let mut magnitude = sample as i32;

    let sign: u8 = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let biased = magnitude.min(CLIP) + BIAS;

    // biased >> 7 is in 0..=255; the exponent is the index of its top bit
    let exponent = 31 - ((biased >> 7) as u32 | 1).leading_zeros();
    let mantissa = ((biased >> (exponent + 3)) & 0x0F) as u8;

    !(sign | ((exponent as u8) << 4) | mantissa)
}

/// Decode one mu-law byte back to a 16-bit PCM sample
pub fn decode(byte: u8) -> i16 {
    let code = !byte;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = (code & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if code & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a frame of samples into a mu-law payload (one byte per sample)
pub fn encode_frame(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| encode(s)).collect()
}
