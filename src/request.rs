//! Inbound request model and the wire field names shared by every operation.

use serde_json::{Map, Value};

use crate::error::{Result, WorkerError};

pub const XML: &str = "xml";
pub const URL_XML: &str = "url_xml";
pub const XSL: &str = "xsl";
pub const URL_XSL: &str = "url_xsl";
pub const QUERY: &str = "query";
pub const XPATH: &str = "xpath";
pub const PARAMS: &str = "params";

/// A request body as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Raw document bytes, accepted by validation only.
    Raw(Vec<u8>),
    /// Named fields of a structured request.
    Fields(Map<String, Value>),
}

impl Request {
    /// Build a request from a JSON message body.
    ///
    /// A JSON string is the raw payload form; an object carries named fields.
    /// Anything else is treated as an object with no fields.
    pub fn from_json(body: Value) -> Self {
        match body {
            Value::String(text) => Request::Raw(text.into_bytes()),
            Value::Object(fields) => Request::Fields(fields),
            _ => Request::Fields(Map::new()),
        }
    }

    /// Look up a string field. Null, empty and non-string values count as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Request::Raw(_) => None,
            Request::Fields(fields) => match fields.get(name) {
                Some(Value::String(value)) if !value.is_empty() => Some(value.as_str()),
                _ => None,
            },
        }
    }

    /// Parse the optional `params` field: a list of `{name: value}` maps.
    pub fn params(&self) -> Result<Params> {
        let Request::Fields(fields) = self else {
            return Ok(Params::default());
        };

        let entries = match fields.get(PARAMS) {
            None | Some(Value::Null) => return Ok(Params::default()),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(WorkerError::InvalidRequest(format!(
                    "params must be a list of objects, found {}",
                    json_kind(other)
                )));
            }
        };

        let mut params = Params::default();
        for entry in entries {
            let Value::Object(map) = entry else {
                return Err(WorkerError::InvalidRequest(format!(
                    "params entries must be objects, found {}",
                    json_kind(entry)
                )));
            };
            for (name, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(WorkerError::InvalidRequest(format!(
                            "param '{}' must be a string, found {}",
                            name,
                            json_kind(other)
                        )));
                    }
                };
                params.push(name.clone(), value);
            }
        }

        Ok(params)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A named external parameter bound into a compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
}

/// Ordered external parameters; insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Param {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
