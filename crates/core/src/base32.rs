//! Nix base32 codec.
//!
//! Nix uses a custom 32-character alphabet (no `e`, `o`, `u`, `t`) and
//! encodes from the least-significant end: the last character of the string
//! holds the lowest 5 bits of the value.

/// The Nix base32 alphabet.
pub const ALPHABET: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Decode a Nix base32 string into raw bytes.
///
/// The output length is `floor(len * 5 / 8)`. Characters outside the
/// alphabet fail with [`Error::InvalidCharacter`]; encodings whose set bits
/// do not fit in that many bytes (non-canonical strings such as `"zz"`)
/// fail with [`Error::TrailingBits`].
///
/// [`Error::InvalidCharacter`]: crate::Error::InvalidCharacter
/// [`Error::TrailingBits`]: crate::Error::TrailingBits
pub fn decode(input: &str) -> crate::Result<Vec<u8>> {
    let mut output = vec![0u8; input.len() * 5 / 8];

    for (n, c) in input.chars().rev().enumerate() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or(crate::Error::InvalidCharacter(c))? as u16;

        let b = n * 5;
        let i = b / 8;
        let j = b % 8;

        let value = digit << j;
        if i >= output.len() {
            return Err(crate::Error::TrailingBits);
        }
        output[i] |= (value & 0xff) as u8;

        let carry = value >> 8;
        if carry != 0 {
            if i + 1 >= output.len() {
                return Err(crate::Error::TrailingBits);
            }
            output[i + 1] |= carry as u8;
        }
    }

    Ok(output)
}

/// Encode raw bytes as a Nix base32 string, the inverse of [`decode`].
pub fn encode(input: &[u8]) -> String {
    let length = input.len() * 8 / 5 + usize::from(input.len() * 8 % 5 != 0);

    let mut output = String::with_capacity(length);
    for n in (0..length).rev() {
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;

        let mut c = input[i] >> j;
        if i + 1 < input.len() {
            c |= (((input[i + 1] as u16) << (8 - j)) & 0xff) as u8;
        }
        output.push(ALPHABET[(c & 0x1f) as usize] as char);
    }
    output
}
