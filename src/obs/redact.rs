// std
use std::borrow::Cow;
// self
use crate::auth::TokenSecret;

/// Replaces configured sensitive substrings before payloads reach the logs.
#[derive(Clone, Debug, Default)]
pub struct Redactor {
	secrets: Vec<TokenSecret>,
}
impl Redactor {
	/// Creates a redactor for the provided substrings; blanks are ignored.
	pub fn new<I, S>(secrets: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			secrets: secrets
				.into_iter()
				.map(|s| TokenSecret::new(s))
				.filter(|s| !s.is_blank())
				.collect(),
		}
	}

	/// Adds one more substring to redact.
	pub fn with(mut self, secret: &TokenSecret) -> Self {
		if !secret.is_blank() {
			self.secrets.push(secret.clone());
		}

		self
	}

	/// Returns `text` with every configured substring masked.
	pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
		let mut out = Cow::Borrowed(text);

		for secret in &self.secrets {
			let masked = match secret.mask(&out) {
				Cow::Owned(masked) => Some(masked),
				Cow::Borrowed(_) => None,
			};

			if let Some(masked) = masked {
				out = Cow::Owned(masked);
			}
		}

		out
	}

	/// Lossy UTF-8 view of `body`, masked.
	pub fn apply_bytes(&self, body: &[u8]) -> String {
		self.apply(&String::from_utf8_lossy(body)).into_owned()
	}
}
