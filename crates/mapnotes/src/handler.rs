//! Request handling for the read and write endpoints.
//!
//! Both entry points are transport-agnostic: they take the already-extracted
//! query parameter or request body and return a [`Reply`] holding the
//! rendered envelope and its content type. Nothing in here fails; every
//! error is folded into a `{"success": false, "message": ...}` envelope.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{Record, ID};
use crate::store::{Fields, RecordStore};

/// Request key selecting the write action.
pub const ACTION_KEY: &str = "_action";

/// Message returned after a successful create.
pub const CREATED_MESSAGE: &str = "資料已成功寫入";

/// Message returned after a successful update.
pub const UPDATED_MESSAGE: &str = "資料已更新";

/// Message returned after a successful delete.
pub const DELETED_MESSAGE: &str = "資料已刪除";

/// JSONP callbacks must be a dotted path of JavaScript identifiers.
const CALLBACK_PATTERN: &str = r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$";

fn callback_regex() -> &'static Regex {
    static CALLBACK: OnceLock<Regex> = OnceLock::new();
    CALLBACK.get_or_init(|| Regex::new(CALLBACK_PATTERN).expect("callback pattern is valid"))
}

/// Content type of a rendered reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Plain JSON body.
    Json,
    /// JSON wrapped in a callback invocation.
    JavaScript,
}

impl ContentType {
    /// The MIME type sent in the `Content-Type` header.
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json; charset=utf-8",
            Self::JavaScript => "application/javascript; charset=utf-8",
        }
    }
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// How the body should be labelled.
    pub content_type: ContentType,
    /// The response body.
    pub body: String,
}

/// The uniform response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable outcome; absent on successful listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Records, present only on successful listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Record>>,
    /// Id of a newly created record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Envelope {
    /// A successful listing.
    #[must_use]
    pub fn listing(data: Vec<Record>) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            id: None,
        }
    }

    /// A successful write with a confirmation message.
    #[must_use]
    pub fn confirmed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            id: None,
        }
    }

    /// A successful create carrying the new id.
    #[must_use]
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::confirmed(CREATED_MESSAGE)
        }
    }

    /// A failure reporting the error text.
    #[must_use]
    pub fn failure(err: &Error) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            data: None,
            id: None,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            warn!("Failed to serialize envelope: {}", err);
            r#"{"success":false,"message":"internal serialization error"}"#.to_string()
        })
    }
}

/// Which write operation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Store a new record.
    #[default]
    Create,
    /// Change fields of an existing record.
    Update,
    /// Remove an existing record.
    Delete,
}

impl Action {
    /// Read the action from the `_action` request value.
    ///
    /// Anything other than `"update"` or `"delete"` is a create.
    #[must_use]
    pub fn from_request(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("update") => Self::Update,
            Some("delete") => Self::Delete,
            _ => Self::Create,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Handle a read request, optionally wrapped for JSONP.
///
/// An empty callback counts as no callback.
pub fn handle_list<S: RecordStore + ?Sized>(store: &S, callback: Option<&str>) -> Reply {
    let callback = callback.filter(|name| !name.is_empty());
    if let Some(name) = callback {
        if !callback_regex().is_match(name) {
            let err = Error::InvalidCallback {
                name: name.to_string(),
            };
            warn!("Rejected list request: {}", err);
            return render(&Envelope::failure(&err), None);
        }
    }

    let envelope = match store.list_all() {
        Ok(records) => {
            debug!("Serving {} records", records.len());
            Envelope::listing(records)
        }
        Err(err) => {
            warn!("List failed: {}", err);
            Envelope::failure(&err)
        }
    };
    render(&envelope, callback)
}

/// Handle a raw write request body.
///
/// The body must be UTF-8 JSON; anything else is reported in the envelope.
pub fn handle_write<S, B>(store: &mut S, body: B) -> Reply
where
    S: RecordStore + ?Sized,
    B: AsRef<[u8]>,
{
    match dispatch(store, body.as_ref()) {
        Ok(envelope) => render(&envelope, None),
        Err(err) => reject(&err),
    }
}

/// Render a write failure that happened before or during dispatch.
#[must_use]
pub fn reject(err: &Error) -> Reply {
    if err.is_client_error() {
        debug!("Write rejected: {}", err);
    } else {
        warn!("Write failed: {}", err);
    }
    render(&Envelope::failure(err), None)
}

fn dispatch<S: RecordStore + ?Sized>(store: &mut S, body: &[u8]) -> Result<Envelope> {
    let body = std::str::from_utf8(body).map_err(|err| {
        Error::invalid_request(format!("request body is not valid UTF-8: {err}"))
    })?;
    let Value::Object(request) = serde_json::from_str::<Value>(body)? else {
        return Err(Error::invalid_request("request body must be a JSON object"));
    };

    let action = Action::from_request(request.get(ACTION_KEY));
    let fields = request_fields(&request);
    debug!("Handling {} request", action);

    match action {
        Action::Create => {
            let id = store.append(&fields)?;
            Ok(Envelope::created(id))
        }
        Action::Update => {
            let id = required_id(&fields)?;
            if store.update(id, &fields)? {
                Ok(Envelope::confirmed(UPDATED_MESSAGE))
            } else {
                Err(Error::record_not_found(id))
            }
        }
        Action::Delete => {
            let id = required_id(&fields)?;
            if store.remove(id)? {
                Ok(Envelope::confirmed(DELETED_MESSAGE))
            } else {
                Err(Error::record_not_found(id))
            }
        }
    }
}

fn required_id(fields: &Fields) -> Result<&str> {
    fields
        .get(ID)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(Error::MissingId)
}

/// Convert request values to stored text, dropping the action key.
fn request_fields(request: &Map<String, Value>) -> Fields {
    request
        .iter()
        .filter(|(key, _)| key.as_str() != ACTION_KEY)
        .map(|(key, value)| (key.clone(), field_text(value)))
        .collect()
}

/// Text stored for a JSON value: strings verbatim, `null` as empty, anything
/// else as its JSON text.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render(envelope: &Envelope, callback: Option<&str>) -> Reply {
    let json = envelope.to_json();
    match callback {
        Some(name) => Reply {
            content_type: ContentType::JavaScript,
            body: format!("{name}({json})"),
        },
        None => Reply {
            content_type: ContentType::Json,
            body: json,
        },
    }
}
