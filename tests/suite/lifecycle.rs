//! Compiler lifecycle: start, stop, reset, clean and the output file.

use cmbridge_adapter::{AdapterError, AdapterEvent, CodeStatement, SessionState};

use crate::common::{Fixture, READY_LINE, drain, output_lines, until_output};

#[tokio::test]
async fn start_waits_for_ready_line() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();

    assert!(adapter.start().await.unwrap());
    assert_eq!(adapter.state(), SessionState::Running);
    assert!(output_lines(&drain(&mut rx)).contains(&READY_LINE));

    adapter.shutdown().await;
}

#[tokio::test]
async fn stop_writes_killed_banner() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();
    drain(&mut rx);

    adapter.stop().await;
    assert_eq!(adapter.state(), SessionState::Stopped);
    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&AdapterEvent::OutputCleared));
    assert!(output_lines(&events).contains(&"[INFO CM Killed]"));

    // Stopping again does nothing.
    adapter.stop().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn reset_starts_a_fresh_process() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();
    drain(&mut rx);

    assert!(adapter.reset().await.unwrap());
    assert_eq!(adapter.state(), SessionState::Running);
    assert!(output_lines(&drain(&mut rx)).contains(&READY_LINE));

    adapter.shutdown().await;
}

#[tokio::test]
async fn operations_start_the_compiler_on_demand() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();

    adapter.run("hello();").await.unwrap();
    assert_eq!(adapter.state(), SessionState::Running);
    until_output(&mut rx, "got:hello();").await;

    adapter.shutdown().await;
}

#[tokio::test]
async fn clean_always_leaves_stopped() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();
    drain(&mut rx);

    adapter.clean().await.unwrap();
    assert_eq!(adapter.state(), SessionState::Stopped);

    let events = drain(&mut rx);
    assert_eq!(
        output_lines(&events),
        vec![
            "Starting Clean...",
            "[INFO make clean-cm:]",
            "---------------------",
            "removed build",
            "---------------------",
            "[INFO CM Clean]",
        ]
    );

    // Clean from Stopped stays Stopped.
    adapter.clean().await.unwrap();
    assert_eq!(adapter.state(), SessionState::Stopped);
}

#[tokio::test]
async fn failing_clean_command_still_stops() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.clean_program = "no-such-make-binary".into();
    let (mut adapter, _rx) = cmbridge_adapter::CompilerAdapter::new(config);
    adapter.start().await.unwrap();

    let err = adapter.clean().await.unwrap_err();
    assert!(matches!(err, AdapterError::Clean(_)));
    assert_eq!(adapter.state(), SessionState::Stopped);
}

#[tokio::test]
async fn clean_cmx_removes_generated_files() {
    let fixture = Fixture::new();
    fixture.write("custom/acme/w.cmx", "package $dynamicPackageName;");
    let generated = fixture.write("custom/acme/w.cm", "package custom.acme;");
    let authored = fixture.write("custom/acme/plain.cm", "package custom.acme;");

    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();
    drain(&mut rx);

    adapter.clean_cmx().await.unwrap();
    assert_eq!(adapter.state(), SessionState::Stopped);
    assert!(!generated.exists());
    assert!(authored.exists());

    let events = drain(&mut rx);
    let lines = output_lines(&events);
    assert_eq!(lines.first(), Some(&"[INFO make clean-cmx:]"));
    assert_eq!(lines.last(), Some(&"[INFO CMX Clean]"));
}

#[tokio::test]
async fn stopping_releases_pending_statement() {
    let fixture = Fixture::new();
    let (mut adapter, _rx) = fixture.adapter();

    let statement = CodeStatement::new("wait();", "^never$").unwrap();
    let watch = adapter.submit_statement(statement).await.unwrap().unwrap();
    adapter.stop().await;

    assert!(matches!(watch.wait().await, Err(AdapterError::SessionEnded)));
}

#[tokio::test]
async fn quit_debug_only_when_running() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();

    adapter.quit_debug().await.unwrap();
    assert_eq!(adapter.state(), SessionState::Stopped);

    adapter.start().await.unwrap();
    adapter.quit_debug().await.unwrap();
    until_output(&mut rx, "debug quit").await;

    adapter.shutdown().await;
}

#[tokio::test]
async fn output_file_toggle() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();

    let path = adapter.start_writing_output_file().await.unwrap();
    assert_eq!(path, fixture.path("output.log"));
    assert!(adapter.is_writing_output_file().await);
    adapter.run_if_started("logged();").await.unwrap();
    until_output(&mut rx, "got:logged();").await;

    adapter.stop_writing_output_file().await;
    assert!(!adapter.is_writing_output_file().await);
    adapter.run_if_started("not_logged();").await.unwrap();
    let events = until_output(&mut rx, "got:not_logged();").await;
    assert!(output_lines(&events).contains(&"[Stopped writing output to file]"));

    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("got:logged();"));
    assert!(!content.contains("not_logged"));

    adapter.shutdown().await;
}

#[tokio::test]
async fn process_exit_is_reported() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.ready_pattern = None;
    config.args = vec!["-c".into(), "echo bye".into()];
    let (mut adapter, mut rx) = cmbridge_adapter::CompilerAdapter::new(config);
    adapter.start().await.unwrap();

    let events = until_output(&mut rx, "bye").await;
    assert!(output_lines(&events).contains(&"bye"));
    let stopped = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert!(matches!(stopped, Some(AdapterEvent::SessionStopped { .. })));

    adapter.shutdown().await;
}
