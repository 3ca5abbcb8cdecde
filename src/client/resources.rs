//! Typed resource helpers and pagination layered on [`Client::execute`].

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	client::Client,
	error::DecodeError,
	http::ApiHttpClient,
	oauth::TransportErrorMapper,
	request::{CONTENT_TYPE_MERGE_PATCH, RequestDescriptor},
};

const PAGE_PARAM: &str = "page";
const PAGE_SIZE_PARAM: &str = "pageSize";

impl<C, M> Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// `GET path` decoded into `T`.
	pub async fn get<T>(&self, path: impl Into<String>) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.execute(RequestDescriptor::get(path)).await
	}

	/// `POST path` with a JSON body; returns the created resource.
	pub async fn create<B, T>(&self, path: impl Into<String>, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.execute(RequestDescriptor::post(path).with_json(body)?).await
	}

	/// Partial update: `PATCH path` with an `application/merge-patch+json` body.
	pub async fn update<B, T>(&self, path: impl Into<String>, patch: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.execute(
			RequestDescriptor::patch(path)
				.with_json(patch)?
				.with_content_type(CONTENT_TYPE_MERGE_PATCH),
		)
		.await
	}

	/// Full replacement: `PUT path` with a JSON body.
	pub async fn update_with_put<B, T>(&self, path: impl Into<String>, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.execute(RequestDescriptor::put(path).with_json(body)?).await
	}

	/// `DELETE path`; any response body is discarded without being parsed.
	pub async fn delete(&self, path: impl Into<String>) -> Result<()> {
		self.send(RequestDescriptor::delete(path)).await.map(|_| ())
	}

	/// Bulk deletion: `POST path` with the id payload; the endpoint must answer with an
	/// empty body.
	pub async fn bulk_delete<B>(&self, path: impl Into<String>, payload: &B) -> Result<()>
	where
		B: ?Sized + Serialize,
	{
		let descriptor = RequestDescriptor::post(path).with_json(payload)?;
		let reply = self.send(descriptor).await?;

		if reply.iter().all(u8::is_ascii_whitespace) {
			return Ok(());
		}

		Err(DecodeError::UnexpectedBody { body: String::from_utf8_lossy(&reply).into_owned() }
			.into())
	}

	/// Fetches page `page` (one-based) of a list endpoint with the configured page size.
	pub async fn read_page<T>(&self, descriptor: RequestDescriptor, page: u32) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		self.execute(self.paged(descriptor, page)).await
	}

	/// Walks every page of a list endpoint until a short page is returned.
	pub async fn read_all_pages<T>(&self, descriptor: RequestDescriptor) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		let page_size = self.page_size();
		let mut items = Vec::new();
		let mut page = 1;

		loop {
			let batch = self.read_page::<T>(descriptor.clone(), page).await?;
			let short = batch.len() < page_size as usize;

			items.extend(batch);

			if short {
				break;
			}

			page += 1;
		}

		tracing::debug!(pages = page, items = items.len(), "Read every page.");

		Ok(items)
	}

	fn page_size(&self) -> u32 {
		self.config().page_size.max(1)
	}

	fn paged(&self, mut descriptor: RequestDescriptor, page: u32) -> RequestDescriptor {
		descriptor.options.retain(|(key, _)| !is_paging_param(key));

		if let Some(path) = strip_paging_query(&descriptor.path) {
			descriptor.path = path;
		}

		descriptor
			.with_query(PAGE_SIZE_PARAM, self.page_size().to_string())
			.with_query(PAGE_PARAM, page.to_string())
	}
}

fn is_paging_param(key: &str) -> bool {
	key == PAGE_PARAM || key == PAGE_SIZE_PARAM
}

// Paging keys embedded in the path would otherwise be repeated by the query merge.
fn strip_paging_query(path: &str) -> Option<String> {
	let (path, query) = path.split_once('?')?;
	let kept = form_urlencoded::parse(query.as_bytes())
		.filter(|(key, _)| !is_paging_param(key))
		.collect::<Vec<_>>();

	if kept.is_empty() {
		return Some(path.to_owned());
	}

	let query = form_urlencoded::Serializer::new(String::new()).extend_pairs(kept).finish();

	Some(format!("{path}?{query}"))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn paging_keys_are_removed_from_the_path_query() {
		assert_eq!(
			strip_paging_query("/users?search=x&page=9&pageSize=5").as_deref(),
			Some("/users?search=x")
		);
		assert_eq!(strip_paging_query("/users?page=2").as_deref(), Some("/users"));
		assert_eq!(strip_paging_query("/users"), None);
	}
}
