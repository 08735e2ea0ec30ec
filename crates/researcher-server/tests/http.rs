use std::sync::Arc;

use axum_test::TestServer;
use researcher_core::engine::ScriptedEngineFactory;
use researcher_core::{
    AgentEntrypoint, FailurePolicy, ResearchPhase, Settings, SettingsProfile, SettingsSource,
};
use researcher_server::routes::build_router;
use researcher_server::state::AppState;
use serde_json::{Value, json};

fn state_with(factory: ScriptedEngineFactory, max_runs: usize) -> AppState {
    let factory = Arc::new(factory);
    let text_agent = AgentEntrypoint::new(
        "text-agent",
        SettingsSource::Fixed(Settings::defaults(SettingsProfile::TextAgent)),
        factory.clone(),
        FailurePolicy::Swallow,
    );
    let acp = AgentEntrypoint::new(
        "acp",
        SettingsSource::Fixed(Settings::defaults(SettingsProfile::Granite)),
        factory,
        FailurePolicy::Propagate,
    );
    AppState::from_entrypoints(text_agent, acp, max_runs)
}

fn server(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).unwrap()
}

/// Split an SSE body into `(event, data)` pairs, skipping keep-alive comments.
fn parse_events(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = serde_json::from_str(value.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

fn ask(query: &str) -> Value {
    json!({
        "input": [{"role": "user", "parts": [{"content": query}]}],
    })
}

#[tokio::test]
async fn health_reports_engine_and_capacity() {
    let server = server(state_with(ScriptedEngineFactory::default(), 3));

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "scripted");
    assert_eq!(body["capacity"]["max_concurrent_runs"], 3);
}

#[tokio::test]
async fn text_run_streams_progress_then_completed() {
    let server = server(state_with(ScriptedEngineFactory::default(), 2));

    let response = server
        .post("/text/runs")
        .json(&json!({ "text": "impact of tariffs" }))
        .await;
    assert_eq!(response.status_code(), 200);

    let events = parse_events(&response.text());
    let (last_name, last) = events.last().expect("stream carried no events");
    assert_eq!(last_name, "completed");

    let streamed: String = events
        .iter()
        .filter(|(name, _)| name == "progress")
        .filter_map(|(_, data)| data["text"].as_str())
        .collect();
    assert_eq!(last["text"].as_str(), Some(streamed.as_str()));
    assert!(streamed.starts_with("# impact of tariffs"));

    let log_deltas = events
        .iter()
        .filter(|(name, data)| {
            name == "progress" && data["logs"].as_array().is_some_and(|logs| logs.len() == 1)
        })
        .count();
    assert_eq!(Some(log_deltas), last["logs"].as_array().map(Vec::len));
}

#[tokio::test]
async fn text_run_swallows_engine_failure() {
    let factory = ScriptedEngineFactory::default().failing_on(ResearchPhase::WriteReport);
    let server = server(state_with(factory, 2));

    let response = server
        .post("/text/runs")
        .json(&json!({ "text": "impact of tariffs" }))
        .await;
    assert_eq!(response.status_code(), 200);

    let events = parse_events(&response.text());
    let (name, data) = events.last().expect("stream carried no events");
    assert_eq!(name, "completed");
    assert_eq!(data["text"], "");
    assert_eq!(data["logs"], json!([]));
}

#[tokio::test]
async fn empty_text_is_rejected() {
    let server = server(state_with(ScriptedEngineFactory::default(), 2));

    let response = server.post("/text/runs").json(&json!({ "text": "  " })).await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn acp_run_streams_protocol_events_and_records_status() {
    let server = server(state_with(ScriptedEngineFactory::default(), 2));

    let response = server.post("/acp/runs").json(&ask("impact of tariffs")).await;
    assert_eq!(response.status_code(), 200);

    let events = parse_events(&response.text());
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names.first(), Some(&"run.created"));
    assert_eq!(names.last(), Some(&"run.completed"));
    assert!(names.contains(&"generic"));
    assert!(names.contains(&"message.part"));

    for (name, data) in &events {
        if name == "generic" {
            assert!(data["message"].as_str().is_some_and(|msg| msg.ends_with('\n')));
        }
    }

    let report: String = events
        .iter()
        .filter(|(name, _)| name == "message.part")
        .filter_map(|(_, data)| data["content"].as_str())
        .collect();
    let (_, completed) = events.last().unwrap();
    assert_eq!(completed["output"][0]["parts"][0]["content"], report.as_str());

    let run_id = completed["run_id"].as_str().expect("run id missing");
    let status = server.get(&format!("/acp/runs/{run_id}")).await;
    assert_eq!(status.status_code(), 200);
    let status = status.json::<Value>();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["output"], report.as_str());
}

#[tokio::test]
async fn acp_run_failure_is_reported() {
    let factory = ScriptedEngineFactory::default().failing_on(ResearchPhase::ConductResearch);
    let server = server(state_with(factory, 2));

    let response = server.post("/acp/runs").json(&ask("impact of tariffs")).await;
    let events = parse_events(&response.text());
    let (name, data) = events.last().expect("stream carried no events");
    assert_eq!(name, "run.failed");
    assert!(
        data["error"]
            .as_str()
            .is_some_and(|error| error.contains("conduct_research"))
    );
    assert!(!events.iter().any(|(name, _)| name == "run.completed"));

    let run_id = data["run_id"].as_str().unwrap();
    let status = server.get(&format!("/acp/runs/{run_id}")).await.json::<Value>();
    assert_eq!(status["status"], "failed");
}

#[tokio::test]
async fn acp_rejects_invalid_options_before_streaming() {
    let server = server(state_with(ScriptedEngineFactory::default(), 2));

    let mut body = ask("impact of tariffs");
    body["tone"] = json!("sarcastic");
    let response = server.post("/acp/runs").json(&body).await;
    assert_eq!(response.status_code(), 400);
    let error = response.json::<Value>();
    assert!(error["error"].as_str().unwrap().contains("objective"));

    let mut body = ask("impact of tariffs");
    body["report_type"] = json!("essay");
    assert_eq!(server.post("/acp/runs").json(&body).await.status_code(), 400);
}

#[tokio::test]
async fn acp_unknown_agent_and_run_are_not_found() {
    let server = server(state_with(ScriptedEngineFactory::default(), 2));

    let mut body = ask("q");
    body["agent_name"] = json!("someone_else");
    assert_eq!(server.post("/acp/runs").json(&body).await.status_code(), 404);
    assert_eq!(server.get("/acp/runs/missing").await.status_code(), 404);
}

#[tokio::test]
async fn acp_agents_lists_documented_environment() {
    let server = server(state_with(ScriptedEngineFactory::default(), 2));

    let body = server.get("/acp/agents").await.json::<Value>();
    let agent = &body["agents"][0];
    assert_eq!(agent["name"], "granite_researcher");
    let env: Vec<&str> = agent["env"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert!(env.contains(&"LLM_MODEL"));
    assert!(env.contains(&"HYBRID"));
}

#[tokio::test]
async fn runs_beyond_capacity_get_429() {
    let state = state_with(ScriptedEngineFactory::default(), 1);
    let _held = state.try_acquire_run().expect("first slot");
    let server = server(state);

    let response = server
        .post("/text/runs")
        .json(&json!({ "text": "impact of tariffs" }))
        .await;
    assert_eq!(response.status_code(), 429);
    assert_eq!(server.post("/acp/runs").json(&ask("q")).await.status_code(), 429);
}
