use loadgate::{
    config::{API_GATEWAY_URL, KEYCLOAK_URL, SEED, TEST_USERS},
    preset::{ERRORS, SUCCESSFUL_REQUESTS},
    Orchestrator, Preset, PresetKind, RunReport, Settings, Statistic,
};
use serde_json::json;
use std::{collections::HashMap, time::Duration};
use wiremock::{
    matchers::{any, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

const TOKEN_PATH: &str = "/realms/instaclone/protocol/openid-connect/token";

fn settings(server: &MockServer) -> Settings {
    let env: HashMap<&str, String> = HashMap::from([
        (API_GATEWAY_URL, server.uri()),
        (KEYCLOAK_URL, server.uri()),
        (TEST_USERS, "alice:pw".to_owned()),
        (SEED, "7".to_owned()),
    ]);
    Settings::from_lookup(|key| env.get(key).cloned()).unwrap()
}

/// Run the load preset compressed to two seconds.
async fn run_load(server: &MockServer) -> (usize, loadgate::RunOutcome, RunReport) {
    let preset = Preset::new(PresetKind::Load)
        .unwrap()
        .with_duration(Duration::from_secs(2));
    let mut orchestrator = Orchestrator::from_settings(&settings(server)).unwrap();

    let authenticated = orchestrator.setup().await;
    let outcome = orchestrator.run(&preset.profile, preset.scenario).await;
    let report = orchestrator.report(&outcome, &preset.thresholds, &preset.advisories);
    (authenticated, outcome, report)
}

async fn mount_token(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "access_token": "tok" })))
        .with_priority(1)
        .mount(server)
        .await;
}

async fn mount_healthy_gateway(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/Posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/Posts/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Account/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "username": "alice" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/Posts"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn healthy_gateway_passes() {
    let server = MockServer::start().await;
    mount_token(&server, 200).await;
    mount_healthy_gateway(&server).await;

    let (authenticated, outcome, report) = run_load(&server).await;

    assert_eq!(authenticated, 1);
    assert_eq!(outcome.snapshot.statistic(ERRORS, Statistic::Rate), Some(0.0));
    assert!(report.total_requests > 0);
    assert!(report.passed(), "{}", report.render_text());
    assert!(report.render_text().contains("Result: PASS"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_token_endpoint_runs_only_public_steps() {
    let server = MockServer::start().await;
    mount_token(&server, 401).await;
    mount_healthy_gateway(&server).await;

    let (authenticated, outcome, _) = run_load(&server).await;

    assert_eq!(authenticated, 0);
    assert!(
        outcome
            .snapshot
            .statistic(SUCCESSFUL_REQUESTS, Statistic::Count)
            .unwrap()
            > 0.0
    );

    let requests = server.received_requests().await.unwrap();
    let gated = requests.iter().filter(|r| {
        r.url.path() == "/api/Account/me"
            || (r.method.as_str() == "POST" && r.url.path() == "/api/Posts")
    });
    assert_eq!(gated.count(), 0);
    assert!(requests
        .iter()
        .filter(|r| r.url.path() != TOKEN_PATH)
        .all(|r| !r.headers.contains_key("authorization")));
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_gateway_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (authenticated, outcome, report) = run_load(&server).await;

    assert_eq!(authenticated, 0);
    assert_eq!(outcome.snapshot.statistic(ERRORS, Statistic::Rate), Some(1.0));
    assert_eq!(report.error_rate, Some(1.0));
    assert!(!report.passed());
    assert!(outcome.stats.elapsed < Duration::from_secs(10));

    let text = report.render_text();
    assert!(text.contains("FAIL  errors rate<0.01 (observed 1.00)"));
    assert!(text.contains("Result: FAIL"));
}
