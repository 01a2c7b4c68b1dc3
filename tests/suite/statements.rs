//! Statements resolved by watching compiler output.

use std::time::{Duration, Instant};

use cmbridge_adapter::{AdapterError, CodeStatement, CompilerAdapter, SessionState, StatementOutcome};

use crate::common::Fixture;

#[tokio::test]
async fn statement_matching_before_deadline_resolves() {
    let fixture = Fixture::new();
    let (mut adapter, _rx) = fixture.adapter();
    adapter.start().await.unwrap();

    let started = Instant::now();
    let outcome = adapter
        .run_statement(CodeStatement::new("slow();", "^slow done$").unwrap())
        .await
        .unwrap();

    assert_eq!(outcome, StatementOutcome::Matched("slow done".into()));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
    assert!(elapsed < adapter.config().watch_timeout());

    adapter.shutdown().await;
}

#[tokio::test]
async fn statement_without_match_times_out() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.watch_timeout_ms = 300;
    let (mut adapter, _rx) = CompilerAdapter::new(config);
    adapter.start().await.unwrap();

    let started = Instant::now();
    let err = adapter
        .run_statement(CodeStatement::new("quiet();", "^never$").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Timeout(d) if d == Duration::from_millis(300)));
    assert!(started.elapsed() >= Duration::from_millis(300));
    // The compiler keeps running after a timeout.
    assert_eq!(adapter.state(), SessionState::Running);

    adapter.shutdown().await;
}

#[tokio::test]
async fn failure_pattern_rejects() {
    let fixture = Fixture::new();
    let (mut adapter, _rx) = fixture.adapter();

    let statement = CodeStatement::new("fail();", "^ok")
        .unwrap()
        .with_failure("^FAILED")
        .unwrap();
    let err = adapter.run_statement(statement).await.unwrap_err();
    assert!(matches!(err, AdapterError::StatementFailed(line) if line == "FAILED: fail();"));

    adapter.shutdown().await;
}

#[tokio::test]
async fn second_watch_supersedes_first() {
    let fixture = Fixture::new();
    let (mut adapter, _rx) = fixture.adapter();
    adapter.start().await.unwrap();

    let first = adapter
        .submit_statement(CodeStatement::new("first();", "^got:second").unwrap().keep_output())
        .await
        .unwrap()
        .unwrap();
    let second = adapter
        .submit_statement(CodeStatement::new("second();", "^got:second").unwrap().keep_output())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(first.wait().await, Err(AdapterError::Superseded)));
    assert_eq!(second.wait().await.unwrap(), "got:second();");

    adapter.shutdown().await;
}

#[tokio::test]
async fn statement_without_start_is_skipped_when_stopped() {
    let fixture = Fixture::new();
    let (mut adapter, _rx) = fixture.adapter();

    let statement = CodeStatement::new("x();", "^got:").unwrap().without_start();
    assert_eq!(
        adapter.run_statement(statement.clone()).await.unwrap(),
        StatementOutcome::Skipped
    );
    assert_eq!(adapter.state(), SessionState::Stopped);

    adapter.start().await.unwrap();
    assert_eq!(
        adapter.run_statement(statement).await.unwrap(),
        StatementOutcome::Matched("got:x();".into())
    );

    adapter.shutdown().await;
}

#[tokio::test]
async fn run_if_started_only_sends_when_running() {
    let fixture = Fixture::new();
    let (mut adapter, _rx) = fixture.adapter();

    assert!(!adapter.run_if_started("x();").await.unwrap());
    assert_eq!(adapter.state(), SessionState::Stopped);

    adapter.start().await.unwrap();
    assert!(adapter.run_if_started("x();").await.unwrap());

    adapter.shutdown().await;
}

#[tokio::test]
async fn commands_reach_the_compiler_in_order() {
    let fixture = Fixture::new();
    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();

    for n in 0..5 {
        adapter.run(&format!("step{n}();")).await.unwrap();
    }
    let events = crate::common::until_output(&mut rx, "got:step4();").await;
    let steps: Vec<&str> = crate::common::output_lines(&events)
        .into_iter()
        .filter(|l| l.starts_with("got:step"))
        .collect();
    assert_eq!(
        steps,
        vec!["got:step0();", "got:step1();", "got:step2();", "got:step3();", "got:step4();"]
    );

    adapter.shutdown().await;
}
