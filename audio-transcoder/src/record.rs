//! Record types exchanged with the host.
//!
//! An [`InputRecord`] is a string-keyed mapping whose `content` field (raw
//! audio bytes) is held apart from the other fields, so it never travels
//! through the JSON passthrough map and is never copied forward.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{Error, Result};

pub const CONTENT_KEY: &str = "content";
pub const PATH_KEY: &str = "path";
pub const FILENAME_KEY: &str = "filename";
pub const FORMAT_KEY: &str = "format";

/// Where the audio payload of a record comes from.
///
/// Resolved once at the staging boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource<'a> {
    /// Inline bytes, with the record's filename if it carried one.
    Content {
        bytes: &'a Bytes,
        filename: Option<&'a str>,
    },
    /// A caller-owned file on disk.
    Path(&'a str),
}

/// A record received from the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRecord {
    fields: Map<String, Value>,
    content: Option<Bytes>,
}

impl InputRecord {
    /// Record pointing at an existing file.
    pub fn from_path(path: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(PATH_KEY.to_string(), Value::String(path.into()));
        Self {
            fields,
            content: None,
        }
    }

    /// Record carrying inline bytes.
    pub fn from_content(content: impl Into<Bytes>, filename: Option<&str>) -> Self {
        let mut fields = Map::new();
        if let Some(filename) = filename {
            fields.insert(FILENAME_KEY.to_string(), Value::String(filename.to_string()));
        }
        Self {
            fields,
            content: Some(content.into()),
        }
    }

    /// Parse a record from a JSON object.
    ///
    /// `content` may be a base64 string or an array of byte values; `null`
    /// is treated as absent.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::invalid_input("record must be a JSON object"));
        };

        let content = match fields.remove(CONTENT_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(encoded)) => Some(Bytes::from(
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| Error::invalid_input(format!("content is not base64: {}", e)))?,
            )),
            Some(Value::Array(items)) => {
                let bytes = items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|b| u8::try_from(b).ok())
                            .ok_or_else(|| Error::invalid_input("content array must hold bytes"))
                    })
                    .collect::<Result<Vec<u8>>>()?;
                Some(Bytes::from(bytes))
            }
            Some(_) => {
                return Err(Error::invalid_input(
                    "content must be a base64 string or a byte array",
                ));
            }
        };

        Ok(Self { fields, content })
    }

    /// Set a passthrough field. `content` cannot be set this way.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != CONTENT_KEY {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.str_field(PATH_KEY)
    }

    pub fn filename(&self) -> Option<&str> {
        self.str_field(FILENAME_KEY)
    }

    pub fn format(&self) -> Option<&str> {
        self.str_field(FORMAT_KEY)
    }

    /// All fields except `content`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Pick the input source. Inline content wins over a path.
    pub fn source(&self) -> Option<InputSource<'_>> {
        if let Some(bytes) = self.content.as_ref() {
            return Some(InputSource::Content {
                bytes,
                filename: self.filename(),
            });
        }
        self.path().map(InputSource::Path)
    }

    /// Short identifier for diagnostics: path, then filename, then a placeholder.
    pub fn describe(&self) -> &str {
        self.path()
            .or_else(|| self.filename())
            .unwrap_or("<inline content>")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// The record handed back to the host after a successful transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    fields: Map<String, Value>,
    content: Bytes,
}

impl OutputRecord {
    pub(crate) fn new(fields: Map<String, Value>, content: Bytes) -> Self {
        Self { fields, content }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Every field except `content`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Transcoded audio bytes.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Render as a JSON object with `content` base64-encoded.
    pub fn to_json(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert(
            CONTENT_KEY.to_string(),
            Value::String(STANDARD.encode(&self.content)),
        );
        Value::Object(fields)
    }
}
