//! Bearer token snapshot and lifecycle helpers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Lifecycle status of an [`AuthToken`] at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	/// Token is usable.
	Valid,
	/// Token is inside the expiry margin and should be replaced.
	Expiring,
	/// Token passed its recorded expiry.
	Expired,
}

/// Bearer token issued by the token endpoint.
///
/// Values are immutable snapshots; the authenticator swaps whole tokens, so readers never
/// observe a partially updated one.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
	/// Token type reported by the endpoint (usually `Bearer`).
	pub token_type: String,
	/// Opaque access token; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the token was received.
	pub issued_at: OffsetDateTime,
	/// Instant the token stops being accepted (`issued_at + expires_in`).
	pub expires_at: OffsetDateTime,
}
impl AuthToken {
	/// Creates a token from an endpoint response lifetime.
	pub fn new(
		token_type: impl Into<String>,
		access_token: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Self {
		Self {
			token_type: token_type.into(),
			access_token: TokenSecret::new(access_token),
			issued_at,
			expires_at: issued_at + expires_in,
		}
	}

	/// Computes the status at `instant`, treating the token as expiring `margin` early.
	///
	/// The margin never exceeds half the token's lifetime so short-lived tokens remain
	/// usable for part of their life.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if instant >= self.renew_at(margin) {
			return TokenStatus::Expiring;
		}

		TokenStatus::Valid
	}

	/// Returns `true` when the token can be attached to a request at `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.status_at(instant, margin), TokenStatus::Valid)
	}

	/// Instant at which the token should be replaced.
	pub fn renew_at(&self, margin: Duration) -> OffsetDateTime {
		let lifetime = self.expires_at - self.issued_at;
		let effective = if margin * 2 > lifetime { lifetime / 2 } else { margin };

		self.expires_at - effective
	}

	/// Renders the `Authorization` header value.
	pub fn authorization(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
impl Debug for AuthToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthToken")
			.field("token_type", &self.token_type)
			.field("access_token", &self.access_token)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn token(expires_in: Duration) -> AuthToken {
		AuthToken::new("Bearer", "access", macros::datetime!(2025-01-01 00:00 UTC), expires_in)
	}

	#[test]
	fn expiry_is_issue_time_plus_lifetime() {
		let token = token(Duration::seconds(3_600));

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(token.authorization(), "Bearer access");
	}

	#[test]
	fn status_transitions_respect_margin() {
		let token = token(Duration::hours(1));
		let margin = Duration::seconds(60);

		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:30 UTC), margin),
			TokenStatus::Valid
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:59:30 UTC), margin),
			TokenStatus::Expiring
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 01:00 UTC), margin),
			TokenStatus::Expired
		);
	}

	#[test]
	fn margin_is_capped_at_half_the_lifetime() {
		let token = token(Duration::seconds(40));

		assert_eq!(token.renew_at(Duration::seconds(60)), macros::datetime!(2025-01-01 00:00:20 UTC));
		assert!(token.is_usable_at(macros::datetime!(2025-01-01 00:00:10 UTC), Duration::seconds(60)));
	}

	#[test]
	fn debug_output_redacts_access_token() {
		let rendered = format!("{:?}", token(Duration::minutes(5)));

		assert!(!rendered.contains("access\""));
		assert!(rendered.contains("********"));
	}
}
