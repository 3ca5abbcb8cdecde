// std
use std::future;
// crates.io
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Cancellation signal and deadline observed by every blocking step of a request.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
	token: Option<CancellationToken>,
	deadline: Option<Instant>,
}
impl Interrupt {
	/// Creates an interrupt from an optional token and deadline.
	pub fn new(token: Option<CancellationToken>, deadline: Option<Instant>) -> Self {
		Self { token, deadline }
	}

	/// Fails immediately when already cancelled or past the deadline.
	pub fn check(&self) -> Result<()> {
		if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
			return Err(Error::Cancelled);
		}
		if self.deadline.is_some_and(|d| d <= Instant::now()) {
			return Err(Error::DeadlineExceeded);
		}

		Ok(())
	}

	/// Drives `fut` to completion unless the caller cancels or the deadline passes first.
	pub async fn run<F>(&self, fut: F) -> Result<F::Output>
	where
		F: Future,
	{
		self.check()?;

		let cancelled = async {
			match &self.token {
				Some(token) => token.cancelled().await,
				None => future::pending::<()>().await,
			}
		};
		let expired = async {
			match self.deadline {
				Some(deadline) => time::sleep_until(deadline).await,
				None => future::pending::<()>().await,
			}
		};

		tokio::select! {
			biased;
			_ = cancelled => Err(Error::Cancelled),
			_ = expired => Err(Error::DeadlineExceeded),
			output = fut => Ok(output),
		}
	}
}
