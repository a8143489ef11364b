//! Directory source tests against temporary directories.

use std::path::Path;
use workpull::config::Settings;
use workpull::error::Error;
use workpull::source::directory::DirectorySource;
use workpull::source::{Configure, WorkSource};

fn source(settings: &[(&str, String)]) -> DirectorySource {
    let flags: Vec<(String, String)> = settings
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    DirectorySource::configure(&Settings::new(Vec::<(String, String)>::new(), flags))
        .expect("valid directory settings")
}

fn path_of(dir: &Path) -> String {
    dir.display().to_string()
}

#[tokio::test]
async fn empty_directory_has_no_work() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = source(&[("path", path_of(dir.path()))]);

    src.connect().await.unwrap();
    assert!(src.fetch().await.unwrap().is_none());
}

#[tokio::test]
async fn fetch_takes_first_file_by_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.txt"), "second").unwrap();
    std::fs::write(dir.path().join("a.txt"), "first").unwrap();
    std::fs::write(dir.path().join(".0-hidden"), "skip").unwrap();
    std::fs::create_dir(dir.path().join("0-subdir")).unwrap();

    let mut src = source(&[("path", path_of(dir.path()))]);
    src.connect().await.unwrap();
    let item = src.fetch().await.unwrap().expect("a file");

    assert_eq!(item.payload, b"first");
    assert_eq!(item.key.as_deref(), Some(path_of(&dir.path().join("a.txt")).as_str()));
    let record = item.record.expect("file record");
    assert_eq!(record["name"], "a.txt");
    assert_eq!(record["size"], 5);
}

#[tokio::test]
async fn extension_filter_skips_other_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "text").unwrap();
    std::fs::write(dir.path().join("b.json"), "{}").unwrap();

    let mut src = source(&[("path", path_of(dir.path())), ("extension", ".json".to_string())]);
    src.connect().await.unwrap();
    let item = src.fetch().await.unwrap().expect("json file");

    assert_eq!(item.payload, b"{}");
}

#[tokio::test]
async fn acknowledge_deletes_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("job");
    std::fs::write(&file, "x").unwrap();

    let mut src = source(&[("path", path_of(dir.path()))]);
    src.connect().await.unwrap();
    let item = src.fetch().await.unwrap().unwrap();
    src.acknowledge(&item).await.unwrap();

    assert!(!file.exists());
    assert!(src.fetch().await.unwrap().is_none());
}

#[tokio::test]
async fn acknowledge_can_move_to_done_path() {
    let dir = tempfile::tempdir().unwrap();
    let done = dir.path().join("done");
    let inbox = dir.path().join("inbox");
    std::fs::create_dir(&inbox).unwrap();
    std::fs::write(inbox.join("job"), "x").unwrap();

    let mut src = source(&[
        ("path", path_of(&inbox)),
        ("on-success", "move".to_string()),
        ("done-path", path_of(&done)),
    ]);
    src.connect().await.unwrap();
    assert!(done.is_dir(), "connect creates done-path");

    let item = src.fetch().await.unwrap().unwrap();
    src.acknowledge(&item).await.unwrap();

    assert!(!inbox.join("job").exists());
    assert_eq!(std::fs::read_to_string(done.join("job")).unwrap(), "x");
}

#[tokio::test]
async fn failure_moves_to_failed_path() {
    let dir = tempfile::tempdir().unwrap();
    let failed = dir.path().join("failed");
    let inbox = dir.path().join("inbox");
    std::fs::create_dir(&inbox).unwrap();
    std::fs::write(inbox.join("job"), "x").unwrap();

    let mut src = source(&[("path", path_of(&inbox)), ("failed-path", path_of(&failed))]);
    src.connect().await.unwrap();
    let item = src.fetch().await.unwrap().unwrap();
    src.report_failure(&item).await.unwrap();

    assert!(!inbox.join("job").exists());
    assert!(failed.join("job").exists());
}

#[tokio::test]
async fn failure_without_failed_path_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("job"), "x").unwrap();

    let mut src = source(&[("path", path_of(dir.path()))]);
    src.connect().await.unwrap();
    let item = src.fetch().await.unwrap().unwrap();
    src.report_failure(&item).await.unwrap();

    assert!(dir.path().join("job").exists());
}

#[tokio::test]
async fn connect_fails_for_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = source(&[("path", path_of(&dir.path().join("nope")))]);

    assert!(matches!(src.connect().await, Err(Error::Connection(_))));
}

#[tokio::test]
async fn acknowledging_vanished_file_is_an_acknowledge_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("job");
    std::fs::write(&file, "x").unwrap();

    let mut src = source(&[("path", path_of(dir.path()))]);
    src.connect().await.unwrap();
    let item = src.fetch().await.unwrap().unwrap();
    std::fs::remove_file(&file).unwrap();

    assert!(matches!(src.acknowledge(&item).await, Err(Error::Acknowledge(_))));
}

#[tokio::test]
async fn file_taken_by_another_consumer_is_no_work() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("job"), "x").unwrap();

    let mut first = source(&[("path", path_of(dir.path()))]);
    let mut second = source(&[("path", path_of(dir.path()))]);
    first.connect().await.unwrap();
    second.connect().await.unwrap();

    let item = first.fetch().await.unwrap().unwrap();
    first.acknowledge(&item).await.unwrap();

    assert!(second.fetch().await.unwrap().is_none());
}
