//! Per-call request descriptors handed to the executor.

mod interrupt;
mod query;

pub use interrupt::*;
pub use query::*;

// crates.io
use oauth2::http::Method;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, error::ConfigError};

/// Default content type for JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type used by partial updates.
pub const CONTENT_TYPE_MERGE_PATCH: &str = "application/merge-patch+json";

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
	/// JSON document, re-encoded for every attempt.
	Json(serde_json::Value),
	/// Pre-encoded bytes sent verbatim.
	Raw(Vec<u8>),
}
impl RequestBody {
	/// Encodes the payload for one attempt.
	pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
		match self {
			Self::Json(value) => Ok(serde_json::to_vec(value)?),
			Self::Raw(bytes) => Ok(bytes.clone()),
		}
	}

	/// Returns the top-level string or numeric field `name` of a JSON object body.
	pub fn field(&self, name: &str) -> Option<String> {
		match self {
			Self::Json(serde_json::Value::Object(map)) => match map.get(name)? {
				serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
				serde_json::Value::Number(n) => Some(n.to_string()),
				_ => None,
			},
			_ => None,
		}
	}
}

/// Everything the executor needs for one logical call.
///
/// Built fresh per call. The executor regenerates the body bytes for every attempt and
/// never mutates the descriptor.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Base URL overriding the dialect-selected base.
	pub base_url: Option<Url>,
	/// Relative path, possibly carrying its own query string.
	pub path: String,
	/// Query parameters derived from the caller's options.
	pub options: Vec<(String, String)>,
	/// Optional payload.
	pub body: Option<RequestBody>,
	/// Content type overriding `application/json`.
	pub content_type: Option<String>,
	/// Tenant scope used when the query does not carry one.
	pub tenant: Option<String>,
	/// Caller cancellation signal.
	pub cancellation: Option<CancellationToken>,
	/// Caller deadline.
	pub deadline: Option<Instant>,
}
impl RequestDescriptor {
	/// Creates a descriptor for `method` and `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			base_url: None,
			path: path.into(),
			options: Vec::new(),
			body: None,
			content_type: None,
			tenant: None,
			cancellation: None,
			deadline: None,
		}
	}

	/// `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` descriptor.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Parses a method name, e.g. from a wrapper layer's string constants.
	pub fn with_method_name(method: &str, path: impl Into<String>) -> Result<Self> {
		let parsed = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
			.map_err(|_| ConfigError::InvalidMethod { method: method.to_owned() })?;

		Ok(Self::new(parsed, path))
	}

	/// Overrides the base URL for this call.
	pub fn with_base_url(mut self, base_url: Url) -> Self {
		self.base_url = Some(base_url);

		self
	}

	/// Flattens a serializable options value into query parameters.
	pub fn with_options<O>(mut self, options: &O) -> Result<Self>
	where
		O: ?Sized + Serialize,
	{
		let value = serde_json::to_value(options).map_err(ConfigError::from)?;

		self.options.extend(flatten_options(&value)?);

		Ok(self)
	}

	/// Appends a single query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.options.push((key.into(), value.into()));

		self
	}

	/// Attaches a JSON body.
	pub fn with_json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(RequestBody::Json(serde_json::to_value(body).map_err(ConfigError::from)?));

		Ok(self)
	}

	/// Attaches pre-encoded bytes with their content type.
	pub fn with_raw_body(mut self, body: Vec<u8>, content_type: impl Into<String>) -> Self {
		self.body = Some(RequestBody::Raw(body));
		self.content_type = Some(content_type.into());

		self
	}

	/// Overrides the content type.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}

	/// Sets the tenant scope for this call.
	pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
		self.tenant = Some(tenant.into());

		self
	}

	/// Attaches a cancellation signal observed by token fetch, dispatch, and retry sleeps.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);

		self
	}

	/// Sets an absolute deadline.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Sets a deadline `timeout` from now.
	pub fn with_timeout(self, timeout: StdDuration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Content type sent with the request.
	pub fn effective_content_type(&self) -> &str {
		self.content_type.as_deref().unwrap_or(CONTENT_TYPE_JSON)
	}

	/// Cancellation view of this descriptor.
	pub fn interrupt(&self) -> Interrupt {
		Interrupt::new(self.cancellation.clone(), self.deadline)
	}

	/// Returns `true` for `GET` requests, the only cacheable method.
	pub fn is_read(&self) -> bool {
		self.method == Method::GET
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Serialize)]
	struct Options {
		search: Option<&'static str>,
		page: u32,
		#[serde(rename = "pageSize")]
		page_size: Option<u32>,
	}

	#[test]
	fn options_flatten_and_skip_absent_fields() {
		let descriptor = RequestDescriptor::get("/users")
			.with_options(&Options { search: Some("ada"), page: 2, page_size: None })
			.expect("Flat options should serialize.");

		assert_eq!(
			descriptor.options,
			vec![("page".to_owned(), "2".to_owned()), ("search".to_owned(), "ada".to_owned())]
		);
	}

	#[test]
	fn body_tenant_field_accepts_strings_and_numbers() {
		let string = RequestDescriptor::post("/apps")
			.with_json(&serde_json::json!({ "microtenantId": "42" }))
			.expect("JSON body should serialize.");
		let number = RequestDescriptor::post("/apps")
			.with_json(&serde_json::json!({ "microtenantId": 7 }))
			.expect("JSON body should serialize.");

		assert_eq!(string.body.and_then(|b| b.field("microtenantId")).as_deref(), Some("42"));
		assert_eq!(number.body.and_then(|b| b.field("microtenantId")).as_deref(), Some("7"));
	}

	#[test]
	fn method_names_parse_case_insensitively() {
		let descriptor = RequestDescriptor::with_method_name("patch", "/x")
			.expect("Known method names should parse.");

		assert_eq!(descriptor.method, Method::PATCH);
		assert!(!descriptor.is_read());
		assert!(RequestDescriptor::with_method_name("BAD METHOD", "/x").is_err());
		assert_eq!(descriptor.effective_content_type(), CONTENT_TYPE_JSON);
	}
}
