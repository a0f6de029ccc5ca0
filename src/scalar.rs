//! Scalar conversions shared by the marshaller and the unmarshaller:
//! - **BCD**: one decimal digit per 4-bit nibble, most significant digit first.
//! - **Justification**: padding text to a fixed width and stripping it again.
//! - **Character encodings**: UTF-8, US-ASCII and ISO-8859-1.

use std::str::FromStr;

use num_bigint::{BigInt, BigUint};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    errors::CodecError,
    schema::{Encoding, Justification},
};

const BCD_DIGIT_BITS: u64 = 4;

fn check_bcd_length(bits: u64, type_name: &str) -> Result<u64, CodecError> {
    if bits % BCD_DIGIT_BITS != 0 {
        return Err(CodecError::InvalidBcdLength {
            type_name: type_name.to_string(),
            bits,
        });
    }

    Ok(bits / BCD_DIGIT_BITS)
}

/// Packs the decimal digits of `value` into `bits` bits, left-padded with zero digits.
pub fn encode_bcd(value: &BigInt, bits: u64, type_name: &str) -> Result<BigUint, CodecError> {
    let num_digits = check_bcd_length(bits, type_name)?;
    if value.is_negative() {
        return Err(CodecError::Unsupported {
            type_name: type_name.to_string(),
            what: "negative BCD value".to_string(),
        });
    }

    let digits = value.to_string();
    if digits.len() as u64 > num_digits {
        return Err(CodecError::ValueTooWide {
            type_name: type_name.to_string(),
            width: format!("{num_digits} BCD digits"),
            value: digits,
        });
    }

    let mut packed = BigUint::zero();
    for digit in digits.bytes() {
        packed = (packed << BCD_DIGIT_BITS as usize) | BigUint::from(digit - b'0');
    }

    Ok(packed)
}

/// Unpacks `bits / 4` BCD digits.
pub fn decode_bcd(raw: &BigUint, bits: u64, type_name: &str) -> Result<BigUint, CodecError> {
    let num_digits = check_bcd_length(bits, type_name)?;
    let mut value = BigUint::zero();

    for i in (0..num_digits).rev() {
        let nibble = (raw >> (i * BCD_DIGIT_BITS) as usize) & BigUint::from(0x0Fu8);
        let digit = nibble.to_u64().unwrap_or(u64::MAX);
        if digit > 9 {
            return Err(CodecError::InvalidBcdDigit {
                type_name: type_name.to_string(),
                digit,
            });
        }
        value = value * 10u8 + digit;
    }

    Ok(value)
}

/// Pads `content` to `width` bytes with `pad`. With center justification an odd
/// extra pad byte goes on the left. `None` when `content` is wider than `width`.
pub fn justify(content: &[u8], width: usize, justification: Justification, pad: u8) -> Option<Vec<u8>> {
    let padding = width.checked_sub(content.len())?;
    let left = match justification {
        Justification::Left => 0,
        Justification::Right => padding,
        Justification::Center => padding - padding / 2,
    };

    let mut out = Vec::with_capacity(width);
    out.resize(left, pad);
    out.extend_from_slice(content);
    out.resize(width, pad);
    Some(out)
}

/// Removes pad bytes on the side(s) [justify] added them.
pub fn strip_padding(content: &[u8], justification: Justification, pad: u8) -> &[u8] {
    let start = match justification {
        Justification::Left => 0,
        Justification::Right | Justification::Center => {
            content.iter().position(|b| *b != pad).unwrap_or(content.len())
        }
    };
    let end = match justification {
        Justification::Right => content.len(),
        Justification::Left | Justification::Center => content
            .iter()
            .rposition(|b| *b != pad)
            .map_or(start, |i| i + 1),
    };

    &content[start..end.max(start)]
}

/// A number padded with a digit is only recoverable when the padding is on the left.
pub fn check_number_padding(
    pad: char,
    justification: Justification,
    type_name: &str,
) -> Result<(), CodecError> {
    if pad.is_ascii_digit() && justification != Justification::Right {
        return Err(CodecError::Unsupported {
            type_name: type_name.to_string(),
            what: format!("{justification:?} justified number padded with {pad:?}"),
        });
    }

    Ok(())
}

/// Encodes a pad character; it must be a single byte in `encoding`.
pub fn pad_byte(pad: char, encoding: Encoding, type_name: &str) -> Result<u8, CodecError> {
    match encode_text(&pad.to_string(), encoding, type_name)?.as_slice() {
        [byte] => Ok(*byte),
        _ => Err(CodecError::Unsupported {
            type_name: type_name.to_string(),
            what: format!("multi-byte pad character {pad:?}"),
        }),
    }
}

pub fn encode_text(text: &str, encoding: Encoding, type_name: &str) -> Result<Vec<u8>, CodecError> {
    let invalid = || CodecError::InvalidText {
        type_name: type_name.to_string(),
        encoding: encoding.name(),
    };

    match encoding {
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Ascii if text.is_ascii() => Ok(text.as_bytes().to_vec()),
        Encoding::Ascii => Err(invalid()),
        Encoding::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).map_err(|_| invalid()))
            .collect(),
    }
}

pub fn decode_text(bytes: &[u8], encoding: Encoding, type_name: &str) -> Result<String, CodecError> {
    let invalid = || CodecError::InvalidText {
        type_name: type_name.to_string(),
        encoding: encoding.name(),
    };

    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|_| invalid()),
        Encoding::Ascii if bytes.is_ascii() => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        Encoding::Ascii => Err(invalid()),
        Encoding::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
    }
}

/// Parses decimal text whose padding has been stripped. All-pad input of a `'0'`-padded number is zero.
pub fn parse_number(text: &str, pad: char, type_name: &str) -> Result<BigInt, CodecError> {
    let text = text.trim();
    if text.is_empty() && pad == '0' {
        return Ok(BigInt::zero());
    }

    BigInt::from_str(text).map_err(|_| CodecError::InvalidNumber {
        type_name: type_name.to_string(),
        text: text.to_string(),
    })
}
