use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use serial_test::serial;
use turnscope_store::CollectorDb;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_turnscope")
}

/// Seeds a collector file with the sample call and closes it again so the
/// CLI can take the DuckDB lock.
fn seeded_db(temp: &Path) -> PathBuf {
    let db_path = temp.join("collector.duckdb");
    let db = CollectorDb::open(&db_path).unwrap();
    testkit::seed_collector(&db, "call-1", &testkit::sample_session("call-1")).unwrap();
    testkit::seed_collector(&db, "call-2", &testkit::sample_session("call-2")[..4]).unwrap();
    drop(db);
    db_path
}

fn turnscope(temp: &Path) -> Command {
    let mut cmd = Command::new(bin());
    cmd.env("TURNSCOPE_CONFIG", temp.join("absent.toml"))
        .env_remove("TURNSCOPE_REMOTE_URL")
        .env_remove("TURNSCOPE_DB_PATH")
        .env_remove("TURNSCOPE_PAGE_SIZE")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT");
    cmd
}

fn run(cmd: &mut Command) -> (Output, String) {
    let output = cmd.output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    (output, stdout)
}

#[test]
#[serial]
fn turns_human_output_lists_every_turn() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, stdout) = run(turnscope(temp.path())
        .arg("turns")
        .arg("call-1")
        .arg("--db-path")
        .arg(&db)
        .arg("--page-size")
        .arg("3"));

    assert!(output.status.success());
    assert!(stdout.contains("TRACE call-1 spans=10"));
    assert!(stdout.contains("#0 session_management title=\"start_agent_activity\""));
    assert!(stdout.contains("#1 user_turn"));
    assert!(stdout.contains("#2 assistant_turn title=\"assistant_turn\""));
    assert!(stdout.contains("duration=720ms spans=4"));
    assert!(stdout.contains("#4 session_management title=\"drain_agent_activity\""));
}

#[test]
#[serial]
fn turns_json_shape() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, stdout) = run(turnscope(temp.path())
        .arg("--json")
        .arg("--db-path")
        .arg(&db)
        .arg("turns")
        .arg("call-1"));
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["traceKey"], "call-1");
    let turns = value["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 5);
    assert_eq!(turns[1]["id"], "turn-1-user_turn");
    assert_eq!(turns[1]["spans"][1]["name"], "stt");
    assert_eq!(turns[1]["spans"][1]["level"], 1);
    assert_eq!(value["stats"]["errorCount"], 1);
}

#[test]
#[serial]
fn spans_are_indented_by_level() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, stdout) = run(turnscope(temp.path())
        .arg("spans")
        .arg("call-1")
        .arg("--db-path")
        .arg(&db));
    assert!(output.status.success());

    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines.contains(&"assistant_turn [general] (0ms)"));
    assert!(lines.contains(&"  llm [llm] (500ms)"));
    assert!(lines.contains(&"    tool [tool] (40ms) ERROR"));
    let llm = lines.iter().position(|l| l.trim_start().starts_with("llm")).unwrap();
    let tts = lines.iter().position(|l| l.trim_start().starts_with("tts")).unwrap();
    assert!(llm < tts);
}

#[test]
#[serial]
fn span_detail_and_count() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, stdout) = run(turnscope(temp.path())
        .arg("--json")
        .arg("--db-path")
        .arg(&db)
        .arg("span")
        .arg("call-1")
        .arg("7"));
    assert!(output.status.success());
    let span: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(span["name"], "tool");
    assert_eq!(span["status"], "error");
    assert_eq!(span["attributes"]["tool.name"], "lookup_order");

    let (output, _) = run(turnscope(temp.path())
        .arg("--db-path")
        .arg(&db)
        .arg("span")
        .arg("call-1")
        .arg("missing"));
    assert!(!output.status.success());

    let (_, stdout) = run(turnscope(temp.path())
        .arg("--db-path")
        .arg(&db)
        .arg("count")
        .arg("call-2"));
    assert!(stdout.contains("trace=call-2 spans=4"));
}

#[test]
#[serial]
fn traces_lists_the_collector_contents() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, stdout) = run(turnscope(temp.path())
        .arg("--db-path")
        .arg(&db)
        .arg("traces"));
    assert!(output.status.success());
    assert!(stdout.contains("trace=call-1 spans=10"));
    assert!(stdout.contains("trace=call-2 spans=4"));
    assert!(stdout.contains("-- 2 traces --"));
}

#[test]
#[serial]
fn follow_reports_progress_on_stderr() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, stdout) = run(turnscope(temp.path())
        .env("TURNSCOPE_AUTOLOAD_INTERVAL", "10ms")
        .arg("turns")
        .arg("call-1")
        .arg("--follow")
        .arg("--page-size")
        .arg("2")
        .arg("--db-path")
        .arg(&db));
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/10 spans"));
    assert!(stdout.contains("#2 assistant_turn"));
}

#[test]
#[serial]
fn zero_page_size_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());

    let (output, _) = run(turnscope(temp.path())
        .arg("turns")
        .arg("call-1")
        .arg("--page-size")
        .arg("0")
        .arg("--db-path")
        .arg(&db));
    assert!(!output.status.success());
}

fn spawn_server(temp: &Path, db: &Path) -> (Child, u16) {
    let port = free_port();
    let child = turnscope(temp)
        .arg("serve")
        .arg("--db-path")
        .arg(db)
        .arg("--http-addr")
        .arg(format!("127.0.0.1:{port}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    (child, port)
}

async fn wait_http_ready(port: u16, child: &mut Child) {
    let client = reqwest::Client::new();
    let mut ready = false;
    for _ in 0..100 {
        assert!(child.try_wait().unwrap().is_none(), "turnscope exited early");
        if client
            .get(format!("http://127.0.0.1:{port}/v1/traces"))
            .send()
            .await
            .is_ok()
        {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(ready, "query endpoint not ready");
}

#[tokio::test]
#[serial]
async fn serve_answers_http_and_remote_cli() {
    let temp = tempfile::tempdir().unwrap();
    let db = seeded_db(temp.path());
    let (mut child, port) = spawn_server(temp.path(), &db);
    wait_http_ready(port, &mut child).await;

    let turns: serde_json::Value = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/v1/traces/call-1/turns"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(turns["turns"].as_array().unwrap().len(), 5);

    let status = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/v1/traces/call-1/spans?cursor=x"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 400);

    let remote = format!("http://127.0.0.1:{port}");
    let output = turnscope(temp.path())
        .arg("turns")
        .arg("call-1")
        .arg("--remote")
        .arg(&remote)
        .arg("--page-size")
        .arg("3")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("#2 assistant_turn"));
    assert!(stdout.contains("duration=720ms"));

    let _ = child.kill();
    let _ = child.wait();
}
