//! TOON/JSON conversion through `/api/convert`, plus a local token estimate.
//!
//! # Design
//! Conversion happens entirely on the server. `compare_tokens` is the one
//! operation that never touches the network: it counts whitespace-separated
//! words, a rough stand-in for a real tokenizer.
//!
//! Structured input to `json_to_toon` is written with `", "` and `": "`
//! separators, so the server's whitespace-based token counts see the same
//! text a Python client would send.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::error::ToonDbError;
use crate::http::HttpMethod;
use crate::transport::{decode, Transport};
use crate::types::{Conversion, ConvertOptions, Format, TokenComparison};

#[derive(Serialize)]
struct ConvertRequest<'a> {
    content: &'a str,
    from_format: Format,
    to_format: Format,
    options: &'a ConvertOptions,
}

#[derive(Clone, Copy)]
pub struct Converter<'a> {
    transport: &'a Transport,
}

impl<'a> Converter<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Raw conversion call. `options` of `None` sends `{}`.
    pub fn convert(
        &self,
        content: &str,
        from_format: Format,
        to_format: Format,
        options: Option<&ConvertOptions>,
    ) -> Result<Conversion, ToonDbError> {
        let defaults = ConvertOptions::default();
        let request = ConvertRequest {
            content,
            from_format,
            to_format,
            options: options.unwrap_or(&defaults),
        };
        let body = self.transport.send(HttpMethod::Post, "/api/convert", &request)?;
        decode(body)
    }

    /// Encode `data` as TOON.
    ///
    /// A value that serializes to a JSON string is treated as JSON text and
    /// sent unchanged; any other value is serialized to JSON first.
    pub fn json_to_toon<T>(&self, data: &T, options: Option<&ConvertOptions>) -> Result<String, ToonDbError>
    where
        T: Serialize + ?Sized,
    {
        let content = match serde_json::to_value(data)
            .map_err(|e| ToonDbError::Serialization(e.to_string()))?
        {
            Value::String(text) => text,
            other => to_json_text(&other)?,
        };
        Ok(self
            .convert(&content, Format::Json, Format::Toon, options)?
            .output)
    }

    /// Decode TOON text and parse the server's JSON output.
    pub fn toon_to_json(&self, toon: &str, options: Option<&ConvertOptions>) -> Result<Value, ToonDbError> {
        let conversion = self.convert(toon, Format::Toon, Format::Json, options)?;
        serde_json::from_str(&conversion.output)
            .map_err(|e| ToonDbError::MalformedResponse(format!("converted output is not JSON: {e}")))
    }

    /// Local estimate; no request is sent.
    pub fn compare_tokens(&self, toon: &str, json: &str) -> TokenComparison {
        compare_tokens(toon, json)
    }
}

/// Compare whitespace-delimited word counts of the two texts.
pub fn compare_tokens(toon: &str, json: &str) -> TokenComparison {
    TokenComparison::from_counts(word_count(toon), word_count(json))
}

/// Compact layout except for a space after every `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn to_json_text<T: Serialize + ?Sized>(value: &T) -> Result<String, ToonDbError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| ToonDbError::Serialization(e.to_string()))?;
    String::from_utf8(out).map_err(|e| ToonDbError::Serialization(e.to_string()))
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
