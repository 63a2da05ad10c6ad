//! End-to-end CLI tests: real process, real files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

const BARS_CSV: &str = "\
time,open,high,low,close
2024-01-01,1.0,2.5,0.5,2.0
2024-01-02,2.0,4.5,1.5,4.0
2024-01-03,4.0,6.5,3.5,6.0
2024-01-04,6.0,8.5,5.5,8.0
";

#[test]
fn compiles_and_runs_a_hithink_script() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_file(&dir, "ma.tdx", "RESULT: ma(close, 3);\n");
    let data = write_file(&dir, "bars.csv", BARS_CSV);

    Command::cargo_bin("klinec")
        .unwrap()
        .args(["-d", "h"])
        .arg(&script)
        .arg("-D")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("time,RESULT"))
        .stdout(predicate::str::contains("20240103,4.000"))
        .stdout(predicate::str::contains("20240104,6.000"));
}

#[test]
fn emitted_bytecode_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_file(&dir, "ma.tdx", "RESULT: ma(close, 3);\n");
    let data = write_file(&dir, "bars.csv", BARS_CSV);
    let bytecode = dir.path().join("ma.klbc");

    let first = Command::cargo_bin("klinec")
        .unwrap()
        .arg(&script)
        .arg("-D")
        .arg(&data)
        .arg("--emit-bytecode")
        .arg(&bytecode)
        .assert()
        .success();
    let expected = String::from_utf8(first.get_output().stdout.clone()).unwrap();

    let listing = std::fs::read_to_string(&bytecode).unwrap();
    assert!(listing.contains("--- Validation ---"));

    Command::cargo_bin("klinec")
        .unwrap()
        .arg("--load")
        .arg(&bytecode)
        .arg("-D")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::eq(expected));
}

#[test]
fn tampered_bytecode_fails_with_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_file(&dir, "ma.tdx", "RESULT: ma(close, 3);\n");
    let data = write_file(&dir, "bars.csv", BARS_CSV);
    let bytecode = dir.path().join("ma.klbc");

    Command::cargo_bin("klinec")
        .unwrap()
        .arg(&script)
        .arg("-D")
        .arg(&data)
        .arg("--emit-bytecode")
        .arg(&bytecode)
        .assert()
        .success();

    let listing = std::fs::read_to_string(&bytecode).unwrap();
    let tampered = listing.replace("PUSH_CONST 1", "PUSH_CONST 2");
    assert_ne!(listing, tampered);
    std::fs::write(&bytecode, tampered).unwrap();

    Command::cargo_bin("klinec")
        .unwrap()
        .arg("--load")
        .arg(&bytecode)
        .arg("-D")
        .arg(&data)
        .assert()
        .failure()
        .stderr(predicate::str::contains("checksum"));
}

#[test]
fn syntax_errors_exit_nonzero_with_a_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_file(&dir, "bad.tdx", "RESULT: ;\n");
    let data = write_file(&dir, "bars.csv", BARS_CSV);

    Command::cargo_bin("klinec")
        .unwrap()
        .arg(&script)
        .arg("-D")
        .arg(&data)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[line 1]"));
}

#[test]
fn json_data_source_works_too() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_file(&dir, "ref.tdx", "RESULT: ref(close, 1);\n");
    let data = write_file(&dir, "bars.json", r#"{"close": [10, 20, 30]}"#);

    Command::cargo_bin("klinec")
        .unwrap()
        .arg(&script)
        .arg("-D")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("RESULT\n"))
        .stdout(predicate::str::contains("10.000"));
}

#[test]
fn missing_inputs_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_file(&dir, "bars.csv", BARS_CSV);

    Command::cargo_bin("klinec")
        .unwrap()
        .arg("-D")
        .arg(&data)
        .assert()
        .failure()
        .stderr(predicate::str::contains("script"));
}
