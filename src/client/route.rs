//! URL resolution for the configured API dialect.

// self
use crate::{
	_prelude::*,
	config::{ApiDialect, ClientConfig},
	error::ConfigError,
	request::{RequestDescriptor, encode_query, merge_query},
};

/// Dialect resolved once at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Route {
	OneApi { base: Url },
	Legacy { base: Url, strip_prefix: String },
}
impl Route {
	pub(crate) fn from_config(config: &ClientConfig) -> Result<Self> {
		match &config.dialect {
			ApiDialect::OneApi => Ok(Self::OneApi { base: config.resolved_api_base()? }),
			ApiDialect::Legacy { base_url, strip_prefix } =>
				Ok(Self::Legacy { base: base_url.clone(), strip_prefix: strip_prefix.clone() }),
		}
	}

	/// Absolute URL for `descriptor`, with every query source merged in.
	///
	/// The tenant comes from the descriptor override, then the body's own tenant field, then
	/// the process-wide scope; it is only added when the query does not already carry one.
	pub(crate) fn resolve(
		&self,
		descriptor: &RequestDescriptor,
		tenant_param: &str,
		tenant_scope: Option<&str>,
	) -> Result<Url, ConfigError> {
		let (path, path_query) = match descriptor.path.split_once('?') {
			Some((path, query)) => (path, Some(query)),
			None => (descriptor.path.as_str(), None),
		};
		let (base, path) = match self {
			Self::OneApi { base } => (descriptor.base_url.as_ref().unwrap_or(base), path),
			Self::Legacy { base, strip_prefix } => (
				descriptor.base_url.as_ref().unwrap_or(base),
				path.strip_prefix(strip_prefix.as_str()).unwrap_or(path),
			),
		};
		let tenant = descriptor
			.tenant
			.clone()
			.or_else(|| descriptor.body.as_ref().and_then(|b| b.field(tenant_param)))
			.or_else(|| tenant_scope.map(ToOwned::to_owned));
		let query = merge_query(path_query, &descriptor.options, tenant_param, tenant.as_deref());
		let mut url = join(base, path)?;

		url.set_query(encode_query(&query).as_deref());

		Ok(url)
	}
}

fn join(base: &Url, path: &str) -> Result<Url, ConfigError> {
	let rendered =
		format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));

	Url::parse(&rendered).map_err(|source| ConfigError::InvalidUrl { url: rendered, source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::Credentials;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Test URL should parse.")
	}

	#[test]
	fn one_api_paths_keep_base_path_and_merge_queries() {
		let route = Route::OneApi { base: url("https://api.zsapi.net/zpa/mgmtconfig/v1/") };
		let descriptor = RequestDescriptor::get("/admin/customers/1/application?search=web")
			.with_query("page", "1");
		let resolved = route
			.resolve(&descriptor, "microtenantId", Some("55"))
			.expect("Descriptor should resolve.");

		assert_eq!(
			resolved.as_str(),
			"https://api.zsapi.net/zpa/mgmtconfig/v1/admin/customers/1/application?microtenantId=55&page=1&search=web"
		);
	}

	#[test]
	fn legacy_paths_drop_the_gateway_prefix() {
		let route = Route::Legacy {
			base: url("https://zsapi.zscaler.net/api/v1"),
			strip_prefix: "/zia/api/v1".into(),
		};
		let resolved = route
			.resolve(&RequestDescriptor::get("/zia/api/v1/users/7"), "microtenantId", None)
			.expect("Descriptor should resolve.");

		assert_eq!(resolved.as_str(), "https://zsapi.zscaler.net/api/v1/users/7");
	}

	#[test]
	fn body_tenant_outranks_process_scope() {
		let route = Route::OneApi { base: url("https://api.zsapi.net") };
		let descriptor = RequestDescriptor::post("/apps")
			.with_json(&serde_json::json!({ "name": "a", "microtenantId": "9" }))
			.expect("JSON body should serialize.");
		let resolved = route
			.resolve(&descriptor, "microtenantId", Some("1"))
			.expect("Descriptor should resolve.");

		assert_eq!(resolved.query(), Some("microtenantId=9"));
	}

	#[test]
	fn dialect_is_resolved_from_config() {
		let config = ClientConfig::builder(Credentials::new("c").with_vanity_domain("acme")).build();

		assert_eq!(
			Route::from_config(&config).expect("Default cloud should resolve."),
			Route::OneApi { base: url("https://api.zsapi.net") }
		);
	}
}
