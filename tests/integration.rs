use futures::StreamExt;
use parabola_backend::game::GameConfig;
use parabola_backend::routes::build_router;
use parabola_backend::build_state_with;
use serde_json::json;
use std::time::Duration;

async fn spawn_server_with(config: GameConfig) -> (String, reqwest::Client) {
    let state = build_state_with(config);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), reqwest::Client::new())
}

async fn spawn_server() -> (String, reqwest::Client) {
    spawn_server_with(GameConfig::default()).await
}

async fn create_session(base: &str, client: &reqwest::Client) -> String {
    let resp = client
        .post(format!("{}/api/v1/sessions", base))
        .json(&json!({ "teacherName": "Profe Marta", "equationSet": "basic" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["status"], "waiting");
    body["code"].as_str().unwrap().to_string()
}

async fn join(base: &str, client: &reqwest::Client, code: &str, name: &str) -> String {
    let resp = client
        .post(format!("{}/api/v1/teams/{}/join", base, code))
        .json(&json!({ "teamName": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn start(base: &str, client: &reqwest::Client, code: &str) {
    let resp = client
        .post(format!("{}/api/v1/sessions/{}/start", base, code))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

async fn state(base: &str, client: &reqwest::Client, code: &str) -> serde_json::Value {
    let resp = client
        .get(format!("{}/api/v1/sessions/{}/state", base, code))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn create_join_start_submit_state_flow() {
    let (base, client) = spawn_server().await;
    let code = create_session(&base, &client).await;
    let team_id = join(&base, &client, &code, "Las Parabólicas").await;
    assert_eq!(team_id, format!("{}:1", code));
    start(&base, &client, &code).await;

    // Basic set, m1 = -x^2+4x-3.
    let submit = client
        .post(format!("{}/api/v1/teams/{}/submit/m1", base, team_id))
        .json(&json!({ "concavity": "down", "vertex": { "x": 2, "y": 1 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(submit.status(), 200);
    let outcome = submit.json::<serde_json::Value>().await.unwrap();
    assert_eq!(outcome["ok"], true);
    assert!(outcome["score"].as_u64().unwrap() >= 10);
    assert!(outcome["details"]["vertex"]["ok"].as_bool().unwrap());

    let snapshot = state(&base, &client, &code).await;
    assert_eq!(snapshot["status"], "active");
    assert_eq!(snapshot["currentMission"], "m2");
    assert_eq!(snapshot["teams"][0]["progress"]["m1"]["isCorrect"], true);
    assert_eq!(snapshot["scoreboard"][0]["name"], "Las Parabólicas");
    // The final answer never leaves the server.
    assert!(snapshot["finalTarget"].get("polynomial").is_none());
}

#[tokio::test]
async fn error_envelope_and_lifecycle_conflicts() {
    let (base, client) = spawn_server().await;

    let missing = client
        .get(format!("{}/api/v1/sessions/ZZZZ99/state", base))
        .header("x-request-id", "req-404")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body = missing.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    assert_eq!(body["error"]["request_id"], "req-404");

    let code = create_session(&base, &client).await;
    start(&base, &client, &code).await;

    let late_join = client
        .post(format!("{}/api/v1/teams/{}/join", base, code))
        .json(&json!({ "teamName": "Tarde" }))
        .send()
        .await
        .unwrap();
    assert_eq!(late_join.status(), 409);
    let body = late_join.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["error"]["code"], "SESSION_ALREADY_STARTED");

    let late_timers = client
        .put(format!("{}/api/v1/sessions/{}/timers", base, code))
        .json(&json!({ "m2": 120 }))
        .send()
        .await
        .unwrap();
    assert_eq!(late_timers.status(), 409);
}

#[tokio::test]
async fn timers_merge_before_start_and_equation_sets_listing() {
    let (base, client) = spawn_server().await;
    let code = create_session(&base, &client).await;

    let resp = client
        .put(format!("{}/api/v1/sessions/{}/timers", base, code))
        .json(&json!({ "m1": 300, "final": 240 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let times = resp.json::<serde_json::Value>().await.unwrap();
    assert_eq!(times["m1"], 300);
    assert_eq!(times["m2"], 600);
    assert_eq!(times["final"], 240);

    let sets = client
        .get(format!("{}/api/v1/sessions/equation-sets", base))
        .send()
        .await
        .unwrap();
    assert_eq!(sets.status(), 200);
    let body = sets.text().await.unwrap();
    assert!(body.contains("basic") && body.contains("intermediate") && body.contains("advanced"));
}

#[tokio::test]
async fn full_game_through_final_phase() {
    let (base, client) = spawn_server().await;
    let code = create_session(&base, &client).await;
    let team_id = join(&base, &client, &code, "Vértice").await;
    start(&base, &client, &code).await;

    // Hint before solving m1 costs a point later.
    let hint = client
        .post(format!("{}/api/v1/teams/{}/hint/m1", base, team_id))
        .send()
        .await
        .unwrap();
    assert_eq!(hint.status(), 200);
    assert_eq!(hint.json::<serde_json::Value>().await.unwrap()["hints"], 1);

    for (key, payload) in [
        ("m1", json!({ "concavity": "down" })),
        ("m2", json!({ "roots": [4, 2] })),
        ("m3", json!({ "concavity": "up" })),
    ] {
        let resp = client
            .post(format!("{}/api/v1/teams/{}/submit/{}", base, team_id, key))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.json::<serde_json::Value>().await.unwrap()["ok"], true);
    }

    let snapshot = state(&base, &client, &code).await;
    assert_eq!(snapshot["currentMission"], "final");

    // Basic set target is x^2-4x+4.
    let wrong = client
        .post(format!("{}/api/v1/teams/{}/final", base, team_id))
        .json(&json!({ "equation": "x^2-4x+3", "justification": "cuadrado perfecto" }))
        .send()
        .await
        .unwrap();
    let wrong_body = wrong.json::<serde_json::Value>().await.unwrap();
    assert_eq!(wrong_body["ok"], false);
    assert_eq!(wrong_body["eqOk"], false);

    let right = client
        .post(format!("{}/api/v1/teams/{}/final", base, team_id))
        .json(&json!({ "equation": "(x-2)^2", "justification": "es un cuadrado perfecto" }))
        .send()
        .await
        .unwrap();
    let right_body = right.json::<serde_json::Value>().await.unwrap();
    assert_eq!(right_body["ok"], true);

    let snapshot = state(&base, &client, &code).await;
    assert_eq!(snapshot["status"], "finished");
    assert_eq!(snapshot["teams"][0]["progress"]["final"]["isCorrect"], true);
}

#[tokio::test]
async fn ws_streams_state_changes() {
    let (base, client) = spawn_server().await;
    let code = create_session(&base, &client).await;
    join(&base, &client, &code, "Observadores").await;

    let ws_url = base.replace("http://", "ws://");
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/ws/sessions/{}", ws_url, code))
        .await
        .unwrap();

    // Snapshot first, then live updates.
    let first = ws.next().await.unwrap().unwrap().into_text().unwrap();
    let env: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(env["event"], "session:update");
    assert_eq!(env["payload"]["status"], "waiting");

    start(&base, &client, &code).await;
    let update = ws.next().await.unwrap().unwrap().into_text().unwrap();
    let env: serde_json::Value = serde_json::from_str(&update).unwrap();
    assert_eq!(env["event"], "session:update");
    assert_eq!(env["payload"]["status"], "active");

    // Unknown codes are rejected before the upgrade.
    let denied =
        tokio_tungstenite::connect_async(format!("{}/ws/sessions/NOPE11", ws_url)).await;
    assert!(denied.is_err());
}

#[tokio::test]
async fn short_budget_timeout_advances_end_to_end() {
    let config = GameConfig {
        tick_interval: Duration::from_millis(25),
        ..Default::default()
    };
    let (base, client) = spawn_server_with(config).await;

    let resp = client
        .post(format!("{}/api/v1/sessions", base))
        .json(&json!({ "teacherName": "Profe", "timers": { "m1": 2 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let code = resp.json::<serde_json::Value>().await.unwrap()["code"]
        .as_str()
        .unwrap()
        .to_string();
    let team_id = join(&base, &client, &code, "Lentos").await;
    start(&base, &client, &code).await;

    // Two 25ms ticks drain the m1 budget; leave generous slack.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let snapshot = state(&base, &client, &code).await;
    assert_eq!(snapshot["currentMission"], "m2");
    assert_eq!(snapshot["status"], "active");
    let progress = &snapshot["teams"][0]["progress"]["m1"];
    assert_eq!(progress["timeExpired"], true);
    assert_eq!(progress["isCorrect"], false);
    assert_eq!(snapshot["teams"][0]["id"], team_id);
}
