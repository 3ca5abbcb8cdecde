// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::ConfigError};

/// Query parameters keyed by name; each key may repeat.
pub type QueryMap = BTreeMap<String, Vec<String>>;

/// Flattens a serialized options object into `(key, value)` pairs.
///
/// `null` fields are skipped, arrays repeat their key, and nested objects are rejected.
pub fn flatten_options(value: &serde_json::Value) -> Result<Vec<(String, String)>, ConfigError> {
	let object = match value {
		serde_json::Value::Null => return Ok(Vec::new()),
		serde_json::Value::Object(object) => object,
		other => {
			return Err(ConfigError::InvalidOptions {
				reason: format!("expected an object, found {}", json_kind(other)),
			});
		},
	};
	let mut pairs = Vec::with_capacity(object.len());

	for (key, value) in object {
		match value {
			serde_json::Value::Array(items) =>
				for item in items {
					if let Some(rendered) = scalar(key, item)? {
						pairs.push((key.clone(), rendered));
					}
				},
			value =>
				if let Some(rendered) = scalar(key, value)? {
					pairs.push((key.clone(), rendered));
				},
		}
	}

	Ok(pairs)
}

fn scalar(key: &str, value: &serde_json::Value) -> Result<Option<String>, ConfigError> {
	match value {
		serde_json::Value::Null => Ok(None),
		serde_json::Value::String(s) => Ok(Some(s.clone())),
		serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
		serde_json::Value::Number(n) => Ok(Some(n.to_string())),
		other => Err(ConfigError::InvalidOptions {
			reason: format!("field `{key}` is a nested {}", json_kind(other)),
		}),
	}
}

fn json_kind(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "boolean",
		serde_json::Value::Number(_) => "number",
		serde_json::Value::String(_) => "string",
		serde_json::Value::Array(_) => "array",
		serde_json::Value::Object(_) => "object",
	}
}

/// Merges query sources additively: the path's embedded query, then the options pairs,
/// then `tenant` under `tenant_param` when no source already set that parameter.
pub fn merge_query(
	path_query: Option<&str>,
	options: &[(String, String)],
	tenant_param: &str,
	tenant: Option<&str>,
) -> QueryMap {
	let mut merged = QueryMap::new();

	if let Some(raw) = path_query {
		for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
			merged.entry(key.into_owned()).or_default().push(value.into_owned());
		}
	}
	for (key, value) in options {
		merged.entry(key.clone()).or_default().push(value.clone());
	}

	if let Some(tenant) = tenant.filter(|t| !t.is_empty())
		&& !merged.contains_key(tenant_param)
	{
		merged.insert(tenant_param.to_owned(), vec![tenant.to_owned()]);
	}

	merged
}

/// Encodes a merged query with keys in sorted order; `None` when empty.
pub fn encode_query(query: &QueryMap) -> Option<String> {
	if query.is_empty() {
		return None;
	}

	let mut serializer = form_urlencoded::Serializer::new(String::new());

	for (key, values) in query {
		for value in values {
			serializer.append_pair(key, value);
		}
	}

	Some(serializer.finish())
}
