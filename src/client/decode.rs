//! Response body decoding shared by live and cached responses.

// std
use std::borrow::Cow;
// self
use crate::{_prelude::*, error::DecodeError};

const UNESCAPED_FIELDS: [&str; 2] = ["name", "description"];

/// Parses a body into JSON, treating an empty body as `null`.
///
/// Top-level `name` and `description` strings are HTML-unescaped twice; the vendor stores
/// them escaped and some records carry a second layer.
pub(crate) fn parse_body(body: &[u8]) -> Result<serde_json::Value, DecodeError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(serde_json::Value::Null);
	}

	let mut value = serde_json::from_slice::<serde_json::Value>(body).map_err(DecodeError::Json)?;

	if let serde_json::Value::Object(object) = &mut value {
		for field in UNESCAPED_FIELDS {
			if let Some(serde_json::Value::String(text)) = object.get_mut(field) {
				let once = unescape_html(text).into_owned();

				*text = unescape_html(&once).into_owned();
			}
		}
	}

	Ok(value)
}

/// Returns `true` when a `GET` body may be stored: well-formed JSON that is not a list.
pub(crate) fn is_cacheable(body: &[u8]) -> bool {
	if body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[') {
		return false;
	}

	body.iter().all(u8::is_ascii_whitespace)
		|| serde_json::from_slice::<serde::de::IgnoredAny>(body).is_ok()
}

/// Deserializes a parsed body into the caller's destination type.
pub(crate) fn into_typed<T>(value: serde_json::Value) -> Result<T, DecodeError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(DecodeError::Shape)
}

/// Decodes HTML character references (`&amp;`, `&#39;`, `&#x27;`, ...).
pub fn unescape_html(text: &str) -> Cow<'_, str> {
	if !text.contains('&') {
		return Cow::Borrowed(text);
	}

	let mut out = String::with_capacity(text.len());
	let mut rest = text;

	while let Some(start) = rest.find('&') {
		out.push_str(&rest[..start]);
		rest = &rest[start..];

		match rest.find(';').and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end))) {
			Some((decoded, end)) => {
				out.push(decoded);
				rest = &rest[end + 1..];
			},
			None => {
				out.push('&');
				rest = &rest[1..];
			},
		}
	}

	out.push_str(rest);

	Cow::Owned(out)
}

fn decode_entity(entity: &str) -> Option<char> {
	match entity {
		"amp" => Some('&'),
		"lt" => Some('<'),
		"gt" => Some('>'),
		"quot" => Some('"'),
		"apos" => Some('\''),
		"nbsp" => Some('\u{a0}'),
		_ => {
			let code = entity.strip_prefix('#')?;
			let parsed = match code.strip_prefix(['x', 'X']) {
				Some(hex) => u32::from_str_radix(hex, 16).ok()?,
				None => code.parse::<u32>().ok()?,
			};

			char::from_u32(parsed)
		},
	}
}
