//! Redacting wrapper for client secrets, private keys, and access tokens.

// std
use std::borrow::Cow;
// self
use crate::_prelude::*;

/// Replacement written in place of sensitive substrings.
pub const REDACTION_MASK: &str = "********";

/// Secret string that never prints its contents through `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the secret is empty or whitespace.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// Replaces every occurrence of the secret inside `text` with [`REDACTION_MASK`].
	pub fn mask<'a>(&self, text: &'a str) -> Cow<'a, str> {
		if self.is_blank() || !text.contains(self.0.as_str()) {
			return Cow::Borrowed(text);
		}

		Cow::Owned(text.replace(self.0.as_str(), REDACTION_MASK))
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&REDACTION_MASK).finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTION_MASK)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatters_never_print_the_secret() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"********\")");
		assert_eq!(format!("{secret}"), "********");
	}

	#[test]
	fn mask_replaces_every_occurrence() {
		let secret = TokenSecret::new("abc123");

		assert_eq!(
			secret.mask("client_secret=abc123&again=abc123"),
			"client_secret=********&again=********"
		);
		assert!(matches!(secret.mask("nothing here"), Cow::Borrowed(_)));
		assert!(matches!(TokenSecret::new(" ").mask("a b"), Cow::Borrowed(_)));
	}
}
