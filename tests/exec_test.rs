//! Process executor tests. Use /bin/sh, so unix only.
#![cfg(unix)]

use std::time::Duration;
use workpull::config::Settings;
use workpull::engine::{
    ControlConfig, Controller, ExecConfig, ExecutionFailure, Executor, ProcessExecutor, RunMode,
    RunStatus,
};
use workpull::model::work::WorkItem;
use workpull::source::Configure;
use workpull::source::directory::DirectorySource;

fn sh(script: &str) -> ExecConfig {
    ExecConfig::new("/bin/sh").args(vec!["-c".to_string(), script.to_string(), "sh".to_string()])
}

fn settings(flags: &[(&str, &str)]) -> Settings {
    Settings::new(
        Vec::<(String, String)>::new(),
        flags.iter().map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

#[tokio::test]
async fn zero_exit_is_success() {
    let exec = ProcessExecutor::new(sh("exit 0"));

    assert_eq!(exec.execute(&WorkItem::from_payload("x")).await, Ok(()));
}

#[tokio::test]
async fn nonzero_exit_carries_code() {
    let exec = ProcessExecutor::new(sh("exit 3"));

    assert_eq!(
        exec.execute(&WorkItem::from_payload("x")).await,
        Err(ExecutionFailure::Exited(3))
    );
}

#[tokio::test]
async fn missing_program_is_spawn_failure() {
    let exec = ProcessExecutor::new(ExecConfig::new("/nonexistent/workpull-test-program"));

    assert!(matches!(
        exec.execute(&WorkItem::from_payload("x")).await,
        Err(ExecutionFailure::Spawn(_))
    ));
}

#[tokio::test]
async fn payload_and_key_are_exposed_as_variables() {
    let exec = ProcessExecutor::new(sh(r#"test "$WORK_PAYLOAD" = "hello" && test "$WORK_KEY" = "k1""#));
    let item = WorkItem::from_payload("hello").with_key("k1");

    assert_eq!(exec.execute(&item).await, Ok(()));
}

#[tokio::test]
async fn payload_can_be_appended_as_argument() {
    let config = sh(r#"test "$1" = "hello""#)
        .apply_settings(&settings(&[("payload-arg", "true")]))
        .unwrap();
    let exec = ProcessExecutor::new(config);

    assert_eq!(exec.execute(&WorkItem::from_payload("hello")).await, Ok(()));
}

#[tokio::test]
async fn payload_variable_name_is_configurable_and_can_be_disabled() {
    let renamed = sh(r#"test "$JOB" = "hello" && test -z "${WORK_PAYLOAD+set}""#)
        .apply_settings(&settings(&[("payload-env", "JOB")]))
        .unwrap();
    assert_eq!(
        ProcessExecutor::new(renamed)
            .execute(&WorkItem::from_payload("hello"))
            .await,
        Ok(())
    );

    let disabled = sh(r#"test -z "${WORK_PAYLOAD+set}""#)
        .apply_settings(&settings(&[("payload-env", "-")]))
        .unwrap();
    assert_eq!(
        ProcessExecutor::new(disabled)
            .execute(&WorkItem::from_payload("hello"))
            .await,
        Ok(())
    );
}

#[tokio::test]
async fn non_utf8_payload_reaches_program_unchanged() {
    let script = r#"test "$(printf '%s' "$WORK_PAYLOAD" | od -An -tx1 | tr -d ' \n')" = "ff41" \
        && test "$(printf '%s' "$1" | od -An -tx1 | tr -d ' \n')" = "ff41""#;
    let config = sh(script)
        .apply_settings(&settings(&[("payload-arg", "true")]))
        .unwrap();

    assert_eq!(
        ProcessExecutor::new(config)
            .execute(&WorkItem::from_payload(vec![0xff, 0x41]))
            .await,
        Ok(())
    );
}

#[tokio::test]
async fn nul_bytes_are_dropped_from_env_and_argument_alike() {
    let config = sh(r#"test "$WORK_PAYLOAD" = "ab" && test "$1" = "ab""#)
        .apply_settings(&settings(&[("payload-arg", "true")]))
        .unwrap();

    assert_eq!(
        ProcessExecutor::new(config)
            .execute(&WorkItem::from_payload(b"a\0b".to_vec()))
            .await,
        Ok(())
    );
}

#[tokio::test]
async fn extra_env_is_passed_without_host_environment() {
    let mut config = sh(r#"test "$EXTRA" = "1" && test -z "${HOME+set}""#)
        .apply_settings(&settings(&[("inherit-env", "false")]))
        .unwrap();
    config.env = vec![("EXTRA".to_string(), "1".to_string())];

    assert_eq!(
        ProcessExecutor::new(config)
            .execute(&WorkItem::from_payload("x"))
            .await,
        Ok(())
    );
}

// ---------------------------------------------------------------------------
// End to end: directory source + process executor + controller
// ---------------------------------------------------------------------------

async fn run_directory_once(script: &str, inbox: &std::path::Path, failed: &std::path::Path) -> RunStatus {
    let inbox = inbox.display().to_string();
    let failed = failed.display().to_string();
    let source = DirectorySource::configure(&settings(&[
        ("path", inbox.as_str()),
        ("failed-path", failed.as_str()),
    ]))
    .unwrap();
    let controller = Controller::new(
        Box::new(source),
        Box::new(ProcessExecutor::new(sh(script))),
        ControlConfig {
            mode: RunMode::Once,
            idle_interval: Duration::ZERO,
        },
    );
    controller.run().await.unwrap()
}

#[tokio::test]
async fn processed_file_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir(&inbox).unwrap();
    std::fs::write(inbox.join("job-1"), "hello").unwrap();

    let status = run_directory_once(r#"test "$WORK_PAYLOAD" = "hello""#, &inbox, &dir.path().join("failed")).await;

    assert_eq!(status, RunStatus::Success);
    assert!(!inbox.join("job-1").exists());
}

#[tokio::test]
async fn failed_file_is_moved_and_run_fails() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    let failed = dir.path().join("failed");
    std::fs::create_dir(&inbox).unwrap();
    std::fs::write(inbox.join("job-1"), "hello").unwrap();

    let status = run_directory_once("exit 1", &inbox, &failed).await;

    assert_eq!(status, RunStatus::Failure);
    assert!(failed.join("job-1").exists());
}

#[tokio::test]
async fn empty_inbox_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    let marker = dir.path().join("ran");
    std::fs::create_dir(&inbox).unwrap();

    let script = format!("touch {}", marker.display());
    let status = run_directory_once(&script, &inbox, &dir.path().join("failed")).await;

    assert_eq!(status, RunStatus::Success);
    assert!(!marker.exists());
}
