use reqwest::multipart::{Form, Part};

use crate::{NexRayError, Result};

/// A single multipart field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

impl FormValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn file(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::File {
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        }
    }

    /// Sets the content type of a file part. No effect on text values.
    pub fn with_mime(self, mime: impl Into<String>) -> Self {
        match self {
            Self::File {
                file_name, bytes, ..
            } => Self::File {
                file_name,
                mime: Some(mime.into()),
                bytes,
            },
            text => text,
        }
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Multipart form payload.
///
/// Absent values are dropped when the fields are collected, so callers can
/// pass optional inputs straight through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, FormValue)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    /// Appends a field only when `value` is present.
    pub fn optional(self, name: impl Into<String>, value: Option<impl Into<FormValue>>) -> Self {
        match value {
            Some(value) => self.field(name, value),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[(String, FormValue)] {
        &self.0
    }

    /// Checks that every file part carries a usable content type.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in &self.0 {
            if let FormValue::File {
                mime: Some(mime), ..
            } = value
            {
                Part::bytes(Vec::new()).mime_str(mime).map_err(|err| {
                    NexRayError::InvalidRequest(format!(
                        "form field '{name}' has invalid content type '{mime}': {err}"
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Encodes the fields into a fresh multipart body.
    ///
    /// A body is rebuilt for every attempt since encoded forms are single-use.
    pub(crate) fn to_multipart(&self) -> reqwest::Result<Form> {
        let mut form = Form::new();
        for (name, value) in &self.0 {
            let part = match value {
                FormValue::Text(text) => Part::text(text.clone()),
                FormValue::File {
                    file_name,
                    mime,
                    bytes,
                } => {
                    let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    match mime {
                        Some(mime) => part.mime_str(mime)?,
                        None => part,
                    }
                }
            };
            form = form.part(name.clone(), part);
        }
        Ok(form)
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for FormFields
where
    K: Into<String>,
    V: Into<FormValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |fields, (name, value)| fields.optional(name, value))
    }
}
