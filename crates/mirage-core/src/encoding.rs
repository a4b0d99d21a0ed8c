use std::io::Write;

use bytes::Bytes;
use flate2::write::{GzDecoder, ZlibDecoder};

use mirage_common::{Headers, header_get};

/// Content codings the observation path can undo.
pub const DECODABLE_CODINGS: &[&str] = &["gzip", "x-gzip", "deflate", "identity"];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported content-encoding {0:?}")]
    Unsupported(String),
    #[error("{coding} body is corrupt: {source}")]
    Corrupt {
        coding: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Incremental decoder for the observer copy of an upstream body.
///
/// The client copy is never passed through here.
pub enum ContentDecoder {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl ContentDecoder {
    pub fn for_headers(headers: &Headers) -> Result<Self, DecodeError> {
        let coding = header_get(headers, "content-encoding")
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match coding.as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip(GzDecoder::new(Vec::new()))),
            "deflate" => Ok(Self::Deflate(ZlibDecoder::new(Vec::new()))),
            _ => Err(DecodeError::Unsupported(coding)),
        }
    }

    /// Decoded bytes available so far; may be empty while the decoder buffers.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Bytes, DecodeError> {
        match self {
            Self::Identity => Ok(Bytes::copy_from_slice(chunk)),
            Self::Gzip(decoder) => {
                decoder.write_all(chunk).map_err(corrupt("gzip"))?;
                Ok(Bytes::from(std::mem::take(decoder.get_mut())))
            }
            Self::Deflate(decoder) => {
                decoder.write_all(chunk).map_err(corrupt("deflate"))?;
                Ok(Bytes::from(std::mem::take(decoder.get_mut())))
            }
        }
    }

    pub fn finish(self) -> Result<Bytes, DecodeError> {
        match self {
            Self::Identity => Ok(Bytes::new()),
            Self::Gzip(decoder) => decoder.finish().map(Bytes::from).map_err(corrupt("gzip")),
            Self::Deflate(decoder) => decoder.finish().map(Bytes::from).map_err(corrupt("deflate")),
        }
    }

    pub fn decode_all(headers: &Headers, body: &Bytes) -> Result<Bytes, DecodeError> {
        let mut decoder = Self::for_headers(headers)?;
        if let Self::Identity = decoder {
            return Ok(body.clone());
        }
        let head = decoder.push(body)?;
        let tail = decoder.finish()?;
        let mut out = Vec::with_capacity(head.len() + tail.len());
        out.extend_from_slice(&head);
        out.extend_from_slice(&tail);
        Ok(Bytes::from(out))
    }
}

fn corrupt(coding: &'static str) -> impl Fn(std::io::Error) -> DecodeError {
    move |source| DecodeError::Corrupt { coding, source }
}

/// Drops codings the observer cannot decode from a caller's `accept-encoding`.
///
/// Returns `identity` when nothing decodable is left.
pub fn narrow_accept_encoding(value: &str) -> String {
    let kept: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|item| {
            let coding = item.split(';').next().unwrap_or("").trim();
            DECODABLE_CODINGS
                .iter()
                .any(|known| coding.eq_ignore_ascii_case(known))
        })
        .collect();
    if kept.is_empty() {
        "identity".to_string()
    } else {
        kept.join(", ")
    }
}
