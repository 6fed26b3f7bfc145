//! Authorized-key format checks for SSH public keys.
//!
//! Accepts `[options] <type> <base64 blob> [comment]`. The blob must
//! decode to an SSH wire-format key whose embedded type matches the
//! declared one and whose length-prefixed fields are consumed exactly.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum KeyError {
    #[error("missing key type or key data")]
    Incomplete,

    #[error("unsupported key type: {0}")]
    UnsupportedType(String),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("key data is truncated")]
    Truncated,

    #[error("declared type {declared} does not match encoded type {encoded}")]
    TypeMismatch { declared: String, encoded: String },

    #[error("trailing bytes after key data")]
    TrailingBytes,
}

/// Number of length-prefixed fields following the type string.
fn field_count(key_type: &str) -> Option<usize> {
    match key_type {
        "ssh-ed25519" => Some(1),
        "ssh-rsa" => Some(2),
        "ssh-dss" => Some(4),
        "ecdsa-sha2-nistp256" | "ecdsa-sha2-nistp384" | "ecdsa-sha2-nistp521" => Some(2),
        "sk-ssh-ed25519@openssh.com" => Some(2),
        "sk-ecdsa-sha2-nistp256@openssh.com" => Some(3),
        _ => None,
    }
}

/// Validate one authorized-keys line.
pub fn parse_authorized_key(line: &str) -> Result<(), KeyError> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next().ok_or(KeyError::Incomplete)?;

    // A leading token that is no key type is an options list.
    let (key_type, fields) = match field_count(first) {
        Some(n) => (first, n),
        None => {
            let second = tokens.next().ok_or(KeyError::Incomplete)?;
            let n = field_count(second)
                .ok_or_else(|| KeyError::UnsupportedType(second.to_string()))?;
            (second, n)
        }
    };

    let data = tokens.next().ok_or(KeyError::Incomplete)?;
    let blob = STANDARD.decode(data)?;

    let mut reader = WireReader { buf: &blob };
    let encoded = reader.string()?;
    if encoded != key_type.as_bytes() {
        return Err(KeyError::TypeMismatch {
            declared: key_type.to_string(),
            encoded: String::from_utf8_lossy(encoded).into_owned(),
        });
    }

    for _ in 0..fields {
        reader.string()?;
    }
    if !reader.buf.is_empty() {
        return Err(KeyError::TrailingBytes);
    }
    Ok(())
}

struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn string(&mut self) -> Result<&'a [u8], KeyError> {
        let (len, rest) = self.buf.split_first_chunk::<4>().ok_or(KeyError::Truncated)?;
        let len = u32::from_be_bytes(*len) as usize;
        if rest.len() < len {
            return Err(KeyError::Truncated);
        }
        let (field, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(field)
    }
}
