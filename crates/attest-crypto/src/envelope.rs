//! Token envelope wire format
//!
//! Version 1 layout (all integers big-endian):
//!
//! ```text
//! u8   format marker (0x01)
//! u32  len || wrapped symmetric key
//! u32  len || encrypted payload
//! u32  len || signature
//! u16  metadata entry count, then per entry: u16 len || key, u16 len || value
//! ```
//!
//! Trailing bytes are rejected. The token string is URL-safe base64.

use std::collections::BTreeMap;

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};

use crate::{CryptoError, Result};

/// Format marker for version 1 tokens
pub const FORMAT_V1: u8 = 0x01;

/// Metadata key carrying the recipient key fingerprint
pub const KEY_ID: &str = "kid";

/// Parsed structural form of a token, before any decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    /// Symmetric key, encrypted to the recipient's RSA key
    pub wrapped_key: Vec<u8>,
    /// nonce || ciphertext || tag
    pub encrypted_payload: Vec<u8>,
    /// Service signature over the plaintext payload
    pub signature: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
}

impl Envelope {
    pub fn new(wrapped_key: Vec<u8>, encrypted_payload: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            version: FORMAT_V1,
            wrapped_key,
            encrypted_payload,
            signature,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Recipient key fingerprint, if the issuer stated one
    pub fn key_id(&self) -> Option<&str> {
        self.metadata.get(KEY_ID).map(String::as_str)
    }

    /// Decode a transport-delivered token string
    pub fn decode(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CryptoError::MalformedToken("empty token".into()));
        }
        let raw = decode_base64(token)?;
        Self::from_bytes(&raw)
    }

    /// Encode to the URL-safe token string
    pub fn encode(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_bytes()?))
    }

    /// Parse the binary layout
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let version = reader.u8()?;
        if version != FORMAT_V1 {
            return Err(CryptoError::MalformedToken(format!(
                "unrecognized format marker 0x{version:02x}"
            )));
        }

        let wrapped_key = reader.field("wrapped key")?;
        let encrypted_payload = reader.field("encrypted payload")?;
        let signature = reader.field("signature")?;

        let count = reader.u16()?;
        let mut metadata = BTreeMap::new();
        for _ in 0..count {
            let key = reader.short_string()?;
            let value = reader.short_string()?;
            if metadata.insert(key.clone(), value).is_some() {
                return Err(CryptoError::MalformedToken(format!(
                    "duplicate metadata key '{key}'"
                )));
            }
        }

        if !reader.is_empty() {
            return Err(CryptoError::MalformedToken(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }

        Ok(Self {
            version,
            wrapped_key,
            encrypted_payload,
            signature,
            metadata,
        })
    }

    /// Serialize the binary layout
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            1 + 12 + self.wrapped_key.len() + self.encrypted_payload.len() + self.signature.len(),
        );
        out.push(self.version);
        for field in [&self.wrapped_key, &self.encrypted_payload, &self.signature] {
            let len = u32::try_from(field.len())
                .map_err(|_| CryptoError::Encryption("field exceeds u32 length".into()))?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(field);
        }
        out.extend_from_slice(&self.metadata_block()?);
        Ok(out)
    }

    /// Bytes bound into the payload cipher and the signature: the format
    /// marker followed by the canonical metadata block.
    pub fn associated_data(&self) -> Result<Vec<u8>> {
        let mut aad = vec![self.version];
        aad.extend_from_slice(&self.metadata_block()?);
        Ok(aad)
    }

    fn metadata_block(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.metadata.len())
            .map_err(|_| CryptoError::Encryption("too many metadata entries".into()))?;
        let mut out = count.to_be_bytes().to_vec();
        for (key, value) in &self.metadata {
            for part in [key, value] {
                let len = u16::try_from(part.len())
                    .map_err(|_| CryptoError::Encryption("metadata entry too long".into()))?;
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(part.as_bytes());
            }
        }
        Ok(out)
    }
}

fn decode_base64(token: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(token)
        .or_else(|_| URL_SAFE.decode(token))
        .or_else(|_| STANDARD.decode(token))
        .or_else(|_| STANDARD_NO_PAD.decode(token))
        .map_err(|e| CryptoError::MalformedToken(format!("not base64: {e}")))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                CryptoError::MalformedToken(format!(
                    "{what}: need {n} bytes, {} left",
                    self.remaining()
                ))
            })?;
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "format marker")?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2, "length prefix")?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4, "length prefix")?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// A required, non-empty u32-prefixed field
    fn field(&mut self, what: &str) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        if len == 0 {
            return Err(CryptoError::MalformedToken(format!("{what} is empty")));
        }
        Ok(self.take(len, what)?.to_vec())
    }

    fn short_string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len, "metadata entry")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CryptoError::MalformedToken("metadata is not UTF-8".into()))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
