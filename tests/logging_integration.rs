use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const STARTUP_MESSAGE: &str = "loaded runtime configuration";

/// Runs the server with an unparsable bind address so it logs its
/// configuration and exits before listening.
fn run_startup(log_output: &str, log_format: &str, log_file_path: Option<&Path>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qa-chatbot"));
    cmd.env("BIND_ADDR", "not-an-address")
        .env("GROQ_API_KEY", "test-key")
        .env("QUOTA_LIMIT", "3")
        .env("RUST_LOG", "qa_chatbot=info")
        .env("LOG_OUTPUT", log_output)
        .env("LOG_FORMAT", log_format);

    match log_file_path {
        Some(path) => cmd.env("LOG_FILE_PATH", path),
        None => cmd.env_remove("LOG_FILE_PATH"),
    };

    let output = cmd.output().expect("failed to run qa-chatbot binary");
    assert!(
        !output.status.success(),
        "invalid bind address should abort startup"
    );
    output
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn scratch_dir(label: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock should be after unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "qa-chatbot-logging-{label}-{stamp}-{}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("failed to create temp directory");
    dir
}

/// `tracing-appender` suffixes the file name with the date.
fn read_rotated_log(dir: &Path, base_file_name: &str) -> String {
    let prefix = format!("{base_file_name}.");
    let newest = fs::read_dir(dir)
        .expect("failed to read temp directory")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .max()
        .expect("expected a rotated log file to be created");
    fs::read_to_string(newest).expect("failed to read rotated log file")
}

#[test]
fn json_format_emits_startup_event_with_quota_fields() {
    let output = run_startup("stderr", "json", None);
    let stderr = stderr_of(&output);

    let startup = stderr
        .lines()
        .filter(|line| line.trim_start().starts_with('{'))
        .map(|line| serde_json::from_str::<Value>(line).expect("line should be valid JSON"))
        .find(|entry| entry["fields"]["message"].as_str() == Some(STARTUP_MESSAGE))
        .unwrap_or_else(|| panic!("expected startup event in JSON output, got:\n{stderr}"));

    assert_eq!(startup["fields"]["quota_limit"], 3);
    assert_eq!(startup["fields"]["quota_window_secs"], 86_400);
    assert_eq!(startup["fields"]["default_api_key_set"], true);
}

#[test]
fn startup_error_names_the_bad_bind_address() {
    let output = run_startup("stderr", "pretty", None);
    let stderr = stderr_of(&output);
    assert!(
        stderr.contains("Invalid BIND_ADDR='not-an-address'"),
        "expected startup error on stderr:\n{stderr}"
    );
}

#[test]
fn file_output_keeps_logs_off_stderr() {
    let dir = scratch_dir("file");
    let output = run_startup("file", "pretty", Some(&dir.join("qa-chatbot.log")));

    let contents = read_rotated_log(&dir, "qa-chatbot.log");
    assert!(
        contents.contains(STARTUP_MESSAGE),
        "expected startup log message in file, got:\n{contents}"
    );

    let stderr = stderr_of(&output);
    assert!(
        !stderr.contains(STARTUP_MESSAGE),
        "did not expect logs on stderr in file-only mode:\n{stderr}"
    );
    assert!(
        stderr.contains("Invalid BIND_ADDR"),
        "expected the command error on stderr:\n{stderr}"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn both_output_writes_stderr_and_file() {
    let dir = scratch_dir("both");
    let output = run_startup("both", "pretty", Some(&dir.join("qa-chatbot.log")));

    let contents = read_rotated_log(&dir, "qa-chatbot.log");
    assert!(contents.contains(STARTUP_MESSAGE), "file:\n{contents}");

    let stderr = stderr_of(&output);
    assert!(stderr.contains(STARTUP_MESSAGE), "stderr:\n{stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unwritable_log_path_falls_back_to_stderr() {
    let dir = scratch_dir("fallback");
    let blocker = dir.join("not-a-directory");
    fs::write(&blocker, "block").expect("failed to create blocking file");

    let output = run_startup("file", "pretty", Some(&blocker.join("qa-chatbot.log")));
    let stderr = stderr_of(&output);

    assert!(
        stderr.contains("failed to initialize LOG_OUTPUT=file"),
        "expected fallback warning, got:\n{stderr}"
    );
    assert!(stderr.contains("using stderr instead"), "stderr:\n{stderr}");
    assert!(
        stderr.contains(STARTUP_MESSAGE),
        "expected logs to continue on stderr after fallback, got:\n{stderr}"
    );

    let _ = fs::remove_dir_all(&dir);
}
