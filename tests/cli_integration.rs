// CLI integration tests for fill, dump and info flows.
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_treewrap");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn parse_json_lines(output: &[u8]) -> Vec<Value> {
    std::str::from_utf8(output)
        .expect("utf8")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_json)
        .collect()
}

fn fill(store: &std::path::Path, columns: &[&str], input: &str) -> std::process::Output {
    let mut args = vec!["fill".to_string(), store.to_str().expect("path").to_string()];
    for column in columns {
        args.push("--column".to_string());
        args.push(column.to_string());
    }
    let mut child = cmd()
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn fill");
    // fill may exit before reading stdin when it rejects its arguments.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(input.as_bytes());
    }
    child.wait_with_output().expect("fill output")
}

#[test]
fn fill_then_dump_then_info() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("events.json");

    let filled = fill(
        &store,
        &["x:i32", "label:str"],
        "{\"x\":5,\"label\":\"a\"}\n{\"x\":7}\n",
    );
    assert!(filled.status.success(), "{}", String::from_utf8_lossy(&filled.stderr));
    let summary = parse_json(std::str::from_utf8(&filled.stdout).expect("utf8"));
    assert_eq!(summary["written"], 2);
    assert_eq!(summary["entries"], 2);

    let dump = cmd()
        .args(["dump", store.to_str().expect("path"), "--column", "x", "--column", "label"])
        .output()
        .expect("dump");
    assert!(dump.status.success());
    let records = parse_json_lines(&dump.stdout);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["entry"], 0);
    assert_eq!(records[0]["values"]["x"], 5);
    assert_eq!(records[0]["values"]["label"], "a");
    assert_eq!(records[1]["values"]["x"], 7);
    assert_eq!(records[1]["values"]["label"], "");

    let info = cmd()
        .args(["info", store.to_str().expect("path")])
        .output()
        .expect("info");
    assert!(info.status.success());
    let info_json = parse_json(std::str::from_utf8(&info.stdout).expect("utf8"));
    assert_eq!(info_json["entries"], 2);
    let kinds: Vec<&str> = info_json["columns"]
        .as_array()
        .expect("columns")
        .iter()
        .filter_map(|column| column["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["i32", "str"]);
}

#[test]
fn dump_reads_arrays_and_respects_bounds() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("tracks.json");
    std::fs::write(
        &store,
        r#"{"columns":[
            {"name":"n","kind":"u32","entries":[2,0,3]},
            {"name":"a","kind":"vec_i32","count_column":"n","entries":[[10,11],[],[20,21,22]]}
        ]}"#,
    )
    .expect("write store");

    let dump = cmd()
        .args(["dump", store.to_str().expect("path"), "--array", "n:a:2", "--read-all"])
        .output()
        .expect("dump");
    assert!(dump.status.success(), "{}", String::from_utf8_lossy(&dump.stderr));
    let records = parse_json_lines(&dump.stdout);
    let arrays: Vec<Value> = records.iter().map(|record| record["values"]["a"].clone()).collect();
    assert_eq!(
        arrays,
        vec![
            serde_json::json!([10, 11]),
            serde_json::json!([]),
            serde_json::json!([20, 21])
        ]
    );

    let bounded = cmd()
        .args(["dump", store.to_str().expect("path"), "--from", "1", "--stop-at", "1"])
        .output()
        .expect("dump");
    assert!(bounded.status.success());
    let records = parse_json_lines(&bounded.stdout);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["entry"], 1);
    assert_eq!(records[0]["values"]["n"], 0);
    assert_eq!(records[0]["values"]["a"], serde_json::json!([]));
}

#[test]
fn dump_chains_stores_and_reports_missing_columns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = temp.path().join("first.json");
    let second = temp.path().join("second.json");
    assert!(fill(&first, &["x:i64"], "{\"x\":1}\n{\"x\":2}\n").status.success());
    assert!(fill(&second, &["x:i64"], "{\"x\":3}\n").status.success());

    let dump = cmd()
        .args([
            "dump",
            first.to_str().expect("path"),
            "--chain",
            second.to_str().expect("path"),
            "--column",
            "x",
            "--column",
            "nope",
        ])
        .output()
        .expect("dump");
    assert!(dump.status.success());
    let values: Vec<i64> = parse_json_lines(&dump.stdout)
        .iter()
        .filter_map(|record| record["values"]["x"].as_i64())
        .collect();
    assert_eq!(values, vec![1, 2, 3]);

    let stderr = String::from_utf8_lossy(&dump.stderr);
    let notice = stderr
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find_map(|line| line.get("notice").cloned())
        .expect("notice");
    assert_eq!(notice["kind"], "unresolved_column");
    assert_eq!(notice["column"], "nope");
    assert_eq!(notice["role"], "scalar");
}

#[test]
fn dump_skips_array_with_missing_length_column() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("events.json");
    assert!(fill(&store, &["x:i32"], "{\"x\":1}\n").status.success());

    let dump = cmd()
        .args(["dump", store.to_str().expect("path"), "--column", "x", "--array", "n:a"])
        .output()
        .expect("dump");
    assert!(dump.status.success());
    let records = parse_json_lines(&dump.stdout);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["values"]["x"], 1);
    assert!(records[0]["values"].get("a").is_none());

    let notices: Vec<Value> = String::from_utf8_lossy(&dump.stderr)
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|line| line.get("notice").cloned())
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["column"], "n");
    assert_eq!(notices[0]["role"], "length");
}

#[test]
fn fill_refuses_existing_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("events.json");
    assert!(fill(&store, &["x:i32"], "{\"x\":1}\n").status.success());
    let again = fill(&store, &["x:i32"], "{\"x\":2}\n");
    assert_eq!(again.status.code(), Some(4));
    let err = parse_json(String::from_utf8_lossy(&again.stderr).trim());
    assert_eq!(err["error"]["kind"], "AlreadyExists");
}

#[test]
fn missing_store_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("missing.json");
    let info = cmd()
        .args(["info", missing.to_str().expect("path")])
        .output()
        .expect("info");
    assert_eq!(info.status.code(), Some(3));
}

#[test]
fn usage_exit_code() {
    let bad = cmd()
        .args(["fill", "out.json", "--column", "x:complex"])
        .output()
        .expect("fill");
    assert_eq!(bad.status.code(), Some(2));
    let err = parse_json(String::from_utf8_lossy(&bad.stderr).trim());
    assert_eq!(err["error"]["kind"], "Usage");
}
