use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::process::Stdio;

fn vnotes_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_vnotes"))
}

fn vnotes(notes: &Path, args: &[&str]) -> Output {
    Command::new(vnotes_binary())
        .arg("--notes-dir")
        .arg(notes)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn session(notes: &Path, input: &str) -> Output {
    let mut child = Command::new(vnotes_binary())
        .arg("--notes-dir")
        .arg(notes)
        .arg("session")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "Expected exit 0, got {:?}\nstdout: {}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
}

fn note_json(notes: &Path, id: &str) -> String {
    std::fs::read_to_string(notes.join(format!("{id}.json"))).unwrap()
}

#[test]
fn list_seeds_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();

    let output = vnotes(dir.path(), &["list"]);

    assert_success(&output);
    let out = stdout(&output);
    assert!(out.contains("Welcome to VoidNotes"), "stdout: {out}");
    assert!(out.contains("Markdown Tips"), "stdout: {out}");
    assert!(dir.path().join("1.json").is_file());
    assert!(dir.path().join("2.json").is_file());
}

#[test]
fn list_search_filters() {
    let dir = tempfile::tempdir().unwrap();
    assert_success(&vnotes(dir.path(), &["list"]));

    let output = vnotes(dir.path(), &["list", "--search", "tips"]);

    assert_success(&output);
    let out = stdout(&output);
    assert!(out.contains("Markdown Tips"));
    assert!(!out.contains("Welcome to VoidNotes"));
}

#[test]
fn new_writes_a_note_file() {
    let dir = tempfile::tempdir().unwrap();

    let output = vnotes(dir.path(), &["new", "--title", "Groceries", "--tag", "home"]);

    assert_success(&output);
    let id = stdout(&output).trim().to_string();
    assert!(!id.is_empty());
    let json = note_json(dir.path(), &id);
    assert!(json.contains("\"title\":\"Groceries\""), "json: {json}");
    assert!(json.contains("home"), "json: {json}");
    assert!(json.contains("Start writing..."), "json: {json}");
}

#[test]
fn delete_removes_the_note_file() {
    let dir = tempfile::tempdir().unwrap();
    assert_success(&vnotes(dir.path(), &["list"]));

    let output = vnotes(dir.path(), &["delete", "2"]);

    assert_success(&output);
    assert!(!dir.path().join("2.json").exists());
    assert!(dir.path().join("1.json").exists());
}

#[test]
fn delete_unknown_note_exits_one() {
    let dir = tempfile::tempdir().unwrap();

    let output = vnotes(dir.path(), &["delete", "does-not-exist"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No note with id does-not-exist"));
}

#[test]
fn session_edits_are_saved_on_quit() {
    let dir = tempfile::tempdir().unwrap();

    let output = session(dir.path(), "set Hello there\ntitle Greeting\nquit\n");

    assert_success(&output);
    let json = note_json(dir.path(), "1");
    assert!(json.contains("\"content\":\"Hello there\""), "json: {json}");
    assert!(json.contains("\"title\":\"Greeting\""), "json: {json}");
}

#[test]
fn session_end_of_input_flushes() {
    let dir = tempfile::tempdir().unwrap();

    let output = session(dir.path(), "open 2\ntype  and more\nshow\n");

    assert_success(&output);
    assert!(stdout(&output).contains("and more"));
    assert!(note_json(dir.path(), "2").contains("and more"));
}

#[test]
fn in_memory_leaves_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes");

    let output = Command::new(vnotes_binary())
        .args(["--in-memory", "list"])
        .env("VNOTES_NOTES_DIR", &notes)
        .output()
        .unwrap();

    assert_success(&output);
    assert!(stdout(&output).contains("Welcome to VoidNotes"));
    assert!(!notes.exists());
}
