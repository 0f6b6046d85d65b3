mod common;

use common::{MockServer, Reply, answer_to_summary, png, run_cli, run_ok, session_json, write_prefs};
use serde_json::{Value, json};
use std::fs;

fn plan(zone: &str, image_url: &str) -> Value {
    json!({
        "zone_type": zone,
        "compartments": ["Prep", "Dining"],
        "image_path": "",
        "image_url": image_url,
        "status": "success"
    })
}

fn created(plans: Vec<Value>) -> Reply {
    Reply::json(200, json!({ "status": "success", "results": plans }))
}

fn server_error(status: u16) -> Reply {
    Reply::json(status, json!({ "detail": "generator unavailable" }))
}

/// A session at the summary, pointed at `server`.
fn session_at_summary(server: &MockServer) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_prefs(dir.path(), &server.base_url);
    answer_to_summary(dir.path());
    dir
}

// ===================================================================
// Generation and retry
// ===================================================================

#[test]
fn generation_retries_server_errors_then_succeeds() {
    let server = MockServer::start(vec![(
        "/create_plan",
        vec![
            server_error(503),
            server_error(503),
            created(vec![plan("Galley", "/download/galley.png")]),
        ],
    )]);
    let dir = session_at_summary(&server);

    let stdout = run_ok(dir.path(), &["finalize"]);
    assert!(stdout.contains("Attempt 1 of 3 failed"), "{stdout}");
    assert!(stdout.contains("Retrying in 2ms"));
    assert!(stdout.contains("Attempt 2 of 3 failed"));
    assert!(stdout.contains("Retrying in 4ms"));
    assert!(stdout.contains("Generated 1 floor plan(s)"));
    assert!(!stdout.contains("Attempt 3"));

    let calls = server.requests_to("/create_plan");
    assert_eq!(calls.len(), 3);
    let body: Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert_eq!(
        body,
        json!({ "zones": [{ "type": "Galley", "compartments": ["Prep", "Dining"] }] })
    );

    let state = session_json(dir.path());
    assert_eq!(state["board"]["plans"][0]["zone_type"], "Galley");
    assert_eq!(state["board"]["activity"]["generating"], false);
}

#[test]
fn client_error_fails_after_one_attempt() {
    let server = MockServer::start(vec![("/create_plan", vec![server_error(404)])]);
    let dir = session_at_summary(&server);

    let (code, stdout, stderr) = run_cli(dir.path(), &["finalize"]);
    assert_eq!(code, 2);
    assert!(stderr.starts_with("habitat-planner: "), "{stderr}");
    assert!(stderr.contains("HTTP 404"));
    assert_eq!(stderr.matches("HTTP 404").count(), 1, "{stderr}");
    assert!(stderr.contains("generating floor plans: failed after 1 attempt: "));
    assert!(stdout.contains("failed after 1 attempt(s)"));
    assert!(!stdout.contains("Retrying"));
    assert_eq!(server.requests_to("/create_plan").len(), 1);

    // Back at the summary with nothing in flight, ready to try again.
    let state = session_json(dir.path());
    assert_eq!(state["questionnaire"]["step"], json!({ "step": "summary" }));
    assert_eq!(state["board"]["activity"]["generating"], false);
}

#[test]
fn exhausted_retries_report_the_attempt_count() {
    let server = MockServer::start(vec![("/create_plan", vec![server_error(500)])]);
    let dir = session_at_summary(&server);

    let (code, stdout, stderr) = run_cli(dir.path(), &["finalize"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("after 3 attempts"), "{stderr}");
    assert!(stdout.contains("failed after 3 attempt(s)"));
    assert_eq!(server.requests_to("/create_plan").len(), 3);
}

#[test]
fn missing_image_is_refreshed_once() {
    let server = MockServer::start(vec![(
        "/create_plan",
        vec![
            created(vec![plan("Galley", "")]),
            created(vec![plan("Galley", "/download/galley.png")]),
        ],
    )]);
    let dir = session_at_summary(&server);

    run_ok(dir.path(), &["finalize"]);
    assert_eq!(server.requests_to("/create_plan").len(), 2);

    let stdout = run_ok(dir.path(), &["plans"]);
    assert!(stdout.contains(&format!("{}/download/galley.png", server.base_url)));
    // Images are all present now: no further refresh.
    assert_eq!(server.requests_to("/create_plan").len(), 2);
}

#[test]
fn still_missing_image_does_not_refresh_again() {
    let server = MockServer::start(vec![("/create_plan", vec![created(vec![plan("Galley", "")])])]);
    let dir = session_at_summary(&server);

    run_ok(dir.path(), &["finalize"]);
    assert_eq!(server.requests_to("/create_plan").len(), 2);

    let stdout = run_ok(dir.path(), &["plans"]);
    assert!(stdout.contains("(image pending)"));
    assert_eq!(server.requests_to("/create_plan").len(), 2);
}

#[test]
fn refresh_that_moves_the_cursor_clears_marks() {
    let server = MockServer::start(vec![(
        "/create_plan",
        vec![
            created(vec![plan("Galley", "/a.png"), plan("Medical", "/b.png")]),
            created(vec![plan("Galley", "/a.png")]),
        ],
    )]);
    let dir = session_at_summary(&server);
    run_ok(dir.path(), &["finalize"]);
    run_ok(dir.path(), &["select", "1"]);
    run_ok(dir.path(), &["draw", "circle", "--at", "5,5", "--display", "50x50"]);

    // The first plan loses its image, so the next listing refreshes and
    // gets back a single plan.
    let mut state = session_json(dir.path());
    state["board"]["plans"][0]["image_url"] = json!("");
    fs::write(dir.path().join("session.json"), state.to_string()).unwrap();

    let listing = run_ok(dir.path(), &["plans"]);
    assert_eq!(server.requests_to("/create_plan").len(), 2);
    assert!(listing.contains("> [0] Galley"), "{listing}");
    assert_eq!(session_json(dir.path())["canvas"]["drawings"], json!([]));
}

#[test]
fn select_clamps_to_the_last_plan() {
    let server = MockServer::start(vec![(
        "/create_plan",
        vec![created(vec![plan("Galley", "/a.png"), plan("Medical", "/b.png")])],
    )]);
    let dir = session_at_summary(&server);
    run_ok(dir.path(), &["finalize"]);

    let stdout = run_ok(dir.path(), &["select", "9"]);
    assert!(stdout.contains("Selected plan 1: Medical"));
    let listing = run_ok(dir.path(), &["plans"]);
    assert!(listing.contains("> [1] Medical"));
}

// ===================================================================
// Annotation and edit
// ===================================================================

fn session_with_plan() -> (MockServer, tempfile::TempDir) {
    let server = MockServer::start(vec![
        ("/create_plan", vec![created(vec![plan("Galley", "/download/galley.png")])]),
        ("/download/galley.png", vec![Reply::bytes("image/png", png(100, 100))]),
        (
            "/edit",
            vec![Reply::json(
                200,
                json!({
                    "status": "success",
                    "action_type": "ADD",
                    "prompt": "Add a window",
                    "result_image_path": "outputs/edited.png",
                    "result_image_url": "/download/edited.png"
                }),
            )],
        ),
    ]);
    let dir = session_at_summary(&server);
    run_ok(dir.path(), &["finalize"]);
    (server, dir)
}

#[test]
fn apply_uploads_the_annotated_image() {
    let (server, dir) = session_with_plan();

    let stdout = run_ok(
        dir.path(),
        &["draw", "pen", "--points", "10,10 20,10 20,20", "--display", "50x50"],
    );
    assert!(stdout.contains("1 mark(s)"));
    run_ok(dir.path(), &["draw", "circle", "--at", "30,30"]);

    let stdout = run_ok(dir.path(), &["apply", "--action", "ADD", "--prompt", "Add a window"]);
    assert!(stdout.contains("you: ADD on Galley: Add a window"));
    assert!(stdout.contains("Edit applied"));

    let edits = server.requests_to("/edit");
    assert_eq!(edits.len(), 1);
    let edit = &edits[0];
    assert_eq!(edit.method, "POST");
    assert!(edit.headers["content-type"].starts_with("multipart/form-data"));
    let body = edit.body_text();
    assert!(body.contains("name=\"image_url\""));
    assert!(body.contains("/download/galley.png"));
    assert!(body.contains("name=\"action_type\""));
    assert!(body.contains("ADD"));
    assert!(body.contains("name=\"prompt\""));
    assert!(body.contains("Add a window"));
    assert!(body.contains("name=\"edited_image\"; filename=\"edited_image.png\""));
    assert!(body.contains("PNG"));
    assert!(!body.contains("reference_image"));

    let state = session_json(dir.path());
    assert_eq!(state["board"]["plans"][0]["image_url"], "/download/edited.png");
    assert_eq!(state["board"]["plans"][0]["image_path"], "outputs/edited.png");
    assert_eq!(state["canvas"]["drawings"], json!([]));
    assert_eq!(state["board"]["activity"]["editing"], false);
}

#[test]
fn apply_sends_an_optional_reference_image() {
    let (server, dir) = session_with_plan();
    let reference = dir.path().join("style.png");
    fs::write(&reference, png(4, 4)).unwrap();

    run_ok(dir.path(), &["draw", "circle", "--at", "25,25", "--display", "50x50"]);
    run_ok(
        dir.path(),
        &[
            "apply",
            "--action",
            "remove",
            "--prompt",
            "Remove this wall",
            "--reference",
            reference.to_str().unwrap(),
        ],
    );

    let body = server.requests_to("/edit")[0].body_text();
    assert!(body.contains("REMOVE"));
    assert!(body.contains("name=\"reference_image\"; filename=\"style.png\""));
}

#[test]
fn apply_without_marks_is_refused() {
    let (server, dir) = session_with_plan();
    let (code, _, stderr) = run_cli(dir.path(), &["apply", "--action", "ADD", "--prompt", "x"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("nothing is drawn"));
    assert!(server.requests_to("/edit").is_empty());
}

#[test]
fn selecting_another_plan_clears_marks() {
    let server = MockServer::start(vec![(
        "/create_plan",
        vec![created(vec![plan("Galley", "/a.png"), plan("Medical", "/b.png")])],
    )]);
    let dir = session_at_summary(&server);
    run_ok(dir.path(), &["finalize"]);
    run_ok(dir.path(), &["draw", "circle", "--at", "5,5", "--display", "50x50"]);
    assert_eq!(session_json(dir.path())["canvas"]["drawings"].as_array().unwrap().len(), 1);

    run_ok(dir.path(), &["select", "1"]);
    assert_eq!(session_json(dir.path())["canvas"]["drawings"], json!([]));
}

#[test]
fn edit_server_error_is_retried() {
    let server = MockServer::start(vec![
        ("/create_plan", vec![created(vec![plan("Galley", "/download/galley.png")])]),
        ("/download/galley.png", vec![Reply::bytes("image/png", png(20, 20))]),
        (
            "/edit",
            vec![
                server_error(502),
                Reply::json(
                    200,
                    json!({
                        "status": "success",
                        "action_type": "MODIFY",
                        "result_image_url": "/download/v2.png"
                    }),
                ),
            ],
        ),
    ]);
    let dir = session_at_summary(&server);
    run_ok(dir.path(), &["finalize"]);
    run_ok(dir.path(), &["draw", "circle", "--at", "10,10", "--display", "20x20"]);

    let stdout = run_ok(dir.path(), &["apply", "--action", "MODIFY", "--prompt", "Bigger"]);
    assert!(stdout.contains("Attempt 1 of 3 failed"));
    assert_eq!(server.requests_to("/edit").len(), 2);
    assert_eq!(session_json(dir.path())["board"]["plans"][0]["image_url"], "/download/v2.png");
}

// ===================================================================
// Service utilities
// ===================================================================

#[test]
fn health_reports_service_status() {
    let server = MockServer::start(vec![(
        "/health",
        vec![Reply::json(
            200,
            json!({ "status": "healthy", "message": "ok", "timestamp": "2025-01-01T00:00:00" }),
        )],
    )]);
    let dir = tempfile::tempdir().unwrap();
    write_prefs(dir.path(), &server.base_url);
    run_ok(dir.path(), &["show"]);

    let stdout = run_ok(dir.path(), &["health"]);
    assert!(stdout.contains("healthy (ok)"));
    assert_eq!(server.requests_to("/health")[0].method, "GET");
}

#[test]
fn download_writes_the_file() {
    let bytes = png(3, 3);
    let server = MockServer::start(vec![("/download/plan.png", vec![Reply::bytes("image/png", bytes.clone())])]);
    let dir = tempfile::tempdir().unwrap();
    write_prefs(dir.path(), &server.base_url);
    let out = dir.path().join("saved.png");

    let stdout = run_ok(dir.path(), &["download", "plan.png", "--out", out.to_str().unwrap()]);
    assert!(stdout.contains(&format!("Saved {} bytes", bytes.len())));
    assert_eq!(fs::read(&out).unwrap(), bytes);
}
