use assert_cmd::Command;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("cooler-upload").unwrap();
    cmd.env_remove("ROBOFLOW_API_KEY")
        .env_remove("ROBOFLOW_WORKSPACE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn outputs_tool_name() {
    let mut cmd = cmd();
    cmd.arg("-V");
    cmd.assert().success().stdout("cooler-upload 0.1.0\n");
}

#[test]
fn missing_subcommand_fails_with_usage() {
    cmd()
        .assert()
        .failure()
        .stderr(predicates::str::contains("Usage"));
}

// Render subcommand tests

#[test]
fn render_prints_voc_xml() {
    let mut cmd = cmd();
    cmd.args(["render", "tests/fixtures/records_valid.json"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("<?xml version=\"1.0\" encoding=\"utf-8\"?>"))
        .stdout(predicates::str::contains("<name>door</name>"))
        .stdout(predicates::str::contains("<name>stacked_product</name>"))
        .stdout(predicates::str::contains("<width>2448</width>"))
        .stdout(predicates::str::contains("<product_name>M&amp;M_PEANUT</product_name>"))
        .stdout(predicates::str::contains("<confidence>0.77</confidence>"));
}

#[test]
fn render_writes_one_file_per_annotated_record() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let out_dir = temp.path().join("xml");

    let mut cmd = cmd();
    cmd.args(["render", "tests/fixtures/records_valid.json", "--out-dir"])
        .arg(&out_dir);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Rendered 1 of 2 record(s)"));

    let files: Vec<_> = std::fs::read_dir(&out_dir)
        .expect("read out dir")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("xml"));

    let xml = std::fs::read_to_string(&files[0]).expect("read xml");
    let doc = roxmltree::Document::parse(&xml).expect("well-formed xml");
    let objects = doc
        .descendants()
        .filter(|node| node.has_tag_name("object"))
        .count();
    assert_eq!(objects, 5);
}

#[test]
fn render_rejects_invalid_record() {
    let mut cmd = cmd();
    cmd.args(["render", "tests/fixtures/records_invalid.json"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Invalid record (item 2)"));
}

#[test]
fn render_rejects_non_array_input() {
    let mut cmd = cmd();
    cmd.args(["render", "tests/fixtures/records_not_array.json"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("JSON array"));
}

// Upload subcommand tests

#[test]
fn upload_requires_credentials() {
    let mut cmd = cmd();
    cmd.args(["upload", "tests/fixtures/records_valid.json"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("--api-key"));
}

#[test]
fn upload_reads_credentials_from_env() {
    // Invalid input fails before any network call, so the
    // unroutable base URL is never contacted.
    let mut cmd = cmd();
    cmd.env("ROBOFLOW_API_KEY", "test-key")
        .env("ROBOFLOW_WORKSPACE", "acme")
        .args([
            "upload",
            "tests/fixtures/records_invalid.json",
            "--base-url",
            "http://127.0.0.1:9",
        ]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Invalid record (item 2)"))
        .stderr(predicates::str::contains("http(s) URL"));
}

#[test]
fn upload_rejects_zero_batch_size() {
    let mut cmd = cmd();
    cmd.args([
        "upload",
        "tests/fixtures/records_valid.json",
        "--api-key",
        "k",
        "--workspace",
        "acme",
        "--batch-size",
        "0",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("--batch-size"));
}

#[test]
fn upload_missing_input_file_fails() {
    let mut cmd = cmd();
    cmd.args([
        "upload",
        "tests/fixtures/does_not_exist.json",
        "--api-key",
        "k",
        "--workspace",
        "acme",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("IO error"));
}
