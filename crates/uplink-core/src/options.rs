use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

/// HTTP method for the upload request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Put,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

/// Header values are restricted to strings and integers. Any other JSON
/// type fails deserialization instead of being silently dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
}

impl HeaderValue {
    pub fn to_header_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(n) => n.to_string(),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<i64> for HeaderValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// Typed upload request options. Validation of the URL and payload path is
/// the transport's job; the task ID here is the correlation key the caller
/// must reuse for `subscribe` and saved-event retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    #[serde(rename = "ID")]
    pub task_id: TaskId,
    pub url: String,
    pub path: String,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, HeaderValue)>,
}

fn default_method() -> HttpMethod {
    HttpMethod::Put
}

impl UploadOptions {
    pub fn new(task_id: TaskId, url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            task_id,
            url: url.into(),
            path: path.into(),
            method: HttpMethod::Put,
            headers: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
