// crates.io
use serde_json::Value;
use tokio::time::Instant;
// self
use oneapi_core::{
	CancellationToken,
	_preludet::*,
	auth::Credentials,
	config::{ClientConfig, ClientConfigBuilder},
	error::TransportError,
	request::RequestDescriptor,
	retry::{CONCURRENT_ACCESS_ERROR, RetryPolicy},
};

fn scripted_client(
	configure: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
) -> (ScriptedTestClient, ScriptedHttpClient) {
	let transport = ScriptedHttpClient::default();
	let config = ClientConfig::builder(
		Credentials::new("client-it").with_client_secret("secret-it").with_vanity_domain("acme"),
	)
	.token_endpoint(
		Url::parse("https://acme.zslogin.net/oauth2/v1/token")
			.expect("Token endpoint should parse successfully."),
	)
	.api_base(Url::parse("https://api.test.zsapi.net").expect("API base should parse successfully."))
	.background_tasks(false);

	(build_scripted_test_client(configure(config).build(), transport.clone()), transport)
}

fn error_body(id: &str) -> String {
	format!("{{\"id\":\"{id}\",\"message\":\"scripted\"}}")
}

#[tokio::test(start_paused = true)]
async fn unauthorized_response_triggers_one_reauthentication() {
	let (client, transport) = scripted_client(|b| b);

	transport
		.push_token(ScriptedReply::token("tok-1", 3600))
		.push_token(ScriptedReply::token("tok-2", 3600));
	transport
		.push(ScriptedReply::json(401, "{}"))
		.push(ScriptedReply::json(200, "{\"ok\":true}"));

	let body: Value = client.get("/users/1").await.expect("Retried read should succeed.");
	let authorizations =
		transport.data_requests().into_iter().map(|r| r.authorization).collect::<Vec<_>>();

	assert_eq!(body["ok"], true);
	assert_eq!(transport.token_requests().len(), 2);
	assert_eq!(
		authorizations,
		[Some("Bearer tok-1".to_owned()), Some("Bearer tok-2".to_owned())]
	);
}

#[tokio::test(start_paused = true)]
async fn second_rejection_after_reauthentication_is_terminal() {
	let (client, transport) = scripted_client(|b| b);

	transport
		.push_token(ScriptedReply::token("tok-1", 3600))
		.push_token(ScriptedReply::token("tok-2", 3600));
	transport.push(ScriptedReply::json(403, "{}")).push(ScriptedReply::json(403, "{}"));

	let err = client
		.get::<Value>("/users/1")
		.await
		.expect_err("Repeated rejection should surface.");

	assert_eq!(err.status(), Some(403));
	assert_eq!(transport.token_requests().len(), 2);
	assert_eq!(transport.data_requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_modification_conflict_is_retried() {
	let (client, transport) = scripted_client(|b| b);

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport
		.push(ScriptedReply::json(409, error_body(CONCURRENT_ACCESS_ERROR)))
		.push(ScriptedReply::json(200, "{\"id\":1}"));

	let body: Value = client
		.update_with_put("/users/1", &serde_json::json!({ "name": "n" }))
		.await
		.expect("Conflict should be retried.");

	assert_eq!(body["id"], 1);
	assert_eq!(transport.data_requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unrecognized_conflict_is_terminal() {
	let (client, transport) = scripted_client(|b| b);

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport.push(ScriptedReply::json(409, error_body("duplicate.item")));

	let err = client
		.create::<_, Value>("/users", &serde_json::json!({ "name": "n" }))
		.await
		.expect_err("Duplicate conflict should not be retried.");
	let api = err.as_api().expect("Failure should carry the endpoint response.");

	assert_eq!(api.status, 409);
	assert_eq!(api.method, "POST");
	assert_eq!(api.url, "https://api.test.zsapi.net/users");
	assert_eq!(api.error_id.as_deref(), Some("duplicate.item"));
	assert!(!api.correlation_id.is_empty());
	assert_eq!(transport.data_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn attempts_stop_at_the_ceiling() {
	let (client, transport) =
		scripted_client(|b| b.retry(RetryPolicy::default().with_max_attempts(3)));

	transport.push_token(ScriptedReply::token("tok-1", 3600));

	for _ in 0..5 {
		transport.push(ScriptedReply::json(503, "{}"));
	}

	let err = client
		.get::<Value>("/users")
		.await
		.expect_err("Persistent unavailability should exhaust the attempts.");

	assert_eq!(err.status(), Some(503));
	assert_eq!(transport.data_requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn disabled_policy_makes_a_single_attempt() {
	let (client, transport) = scripted_client(|b| b.retry(RetryPolicy::disabled()));

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport.push(ScriptedReply::json(503, "{}"));

	client.get::<Value>("/users").await.expect_err("Unavailability should surface immediately.");

	assert_eq!(transport.data_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_overrides_backoff_bounds() {
	let (client, transport) = scripted_client(|b| {
		b.retry(
			RetryPolicy::default().with_waits(StdDuration::from_secs(5), StdDuration::from_secs(10)),
		)
	});

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport
		.push(ScriptedReply::json(429, "{}").with_header("retry-after", "2"))
		.push(ScriptedReply::json(200, "{}"));

	let started = Instant::now();
	let _: Value = client.get("/users/1").await.expect("Throttled read should be retried.");
	let waited = started.elapsed();

	assert!(waited >= StdDuration::from_secs(2), "Waited {waited:?}.");
	assert!(waited < StdDuration::from_secs(5), "Waited {waited:?}.");
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_from_the_floor() {
	let (client, transport) = scripted_client(|b| {
		b.retry(
			RetryPolicy::default().with_waits(StdDuration::from_secs(1), StdDuration::from_secs(3)),
		)
	});

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport
		.push(ScriptedReply::json(500, "{}"))
		.push(ScriptedReply::json(500, "{}"))
		.push(ScriptedReply::json(500, "{}"))
		.push(ScriptedReply::json(200, "{}"));

	let started = Instant::now();
	let _: Value = client.get("/users/1").await.expect("Read should eventually succeed.");

	// 1s + 2s + min(4s, 3s).
	assert_eq!(started.elapsed().as_secs(), 6);
}

#[tokio::test(start_paused = true)]
async fn connection_failures_are_retried() {
	let (client, transport) = scripted_client(|b| b);

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport.push(ScriptedReply::ConnectionReset).push(ScriptedReply::json(200, "{\"id\":2}"));

	let body: Value = client.get("/users/2").await.expect("Reset should be retried.");

	assert_eq!(body["id"], 2);
	assert_eq!(transport.data_requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_connection_failures_surface_as_transport_errors() {
	let (client, transport) =
		scripted_client(|b| b.retry(RetryPolicy::default().with_max_attempts(2)));

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport.push(ScriptedReply::ConnectionReset).push(ScriptedReply::ConnectionReset);

	let err = client.get::<Value>("/users/2").await.expect_err("Resets should exhaust attempts.");

	assert!(matches!(err, Error::Transport(TransportError::Io(_))));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_a_pending_backoff() {
	let (client, transport) = scripted_client(|b| b);
	let cancel = CancellationToken::new();

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport.push(ScriptedReply::json(503, "{}").with_header("retry-after", "30"));

	let descriptor = RequestDescriptor::get("/users").with_cancellation(cancel.clone());
	let started = Instant::now();
	let (result, _) = tokio::join!(client.execute::<Value>(descriptor), async {
		tokio::time::sleep(StdDuration::from_secs(1)).await;
		cancel.cancel();
	});

	assert!(matches!(result, Err(Error::Cancelled)));
	assert!(started.elapsed() < StdDuration::from_secs(30));
	assert_eq!(transport.data_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_the_whole_request() {
	let (client, transport) = scripted_client(|b| b);

	transport.push_token(ScriptedReply::token("tok-1", 3600));
	transport.push(ScriptedReply::json(503, "{}").with_header("retry-after", "30"));

	let err = client
		.execute::<Value>(RequestDescriptor::get("/users").with_timeout(StdDuration::from_secs(5)))
		.await
		.expect_err("Deadline should elapse during the backoff.");

	assert!(matches!(err, Error::DeadlineExceeded));
}

#[tokio::test]
async fn cancelled_requests_never_reach_the_network() {
	let (client, transport) = scripted_client(|b| b);
	let cancel = CancellationToken::new();

	cancel.cancel();

	let err = client
		.execute::<Value>(RequestDescriptor::get("/users").with_cancellation(cancel))
		.await
		.expect_err("Pre-cancelled request should fail.");

	assert!(matches!(err, Error::Cancelled));
	assert!(transport.requests().is_empty());
}
