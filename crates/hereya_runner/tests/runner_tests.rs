//! Integration tests for the process execution layer.
//!
//! These tests exercise the mock runner the way the IaC and infrastructure
//! layers use it.

use hereya_runner::{CommandConfig, CommandRunner, MockResponse, MockRunner, RunnerError};

#[tokio::test]
async fn test_mock_runner_basic_execution() {
    let runner = MockRunner::new().add_response(MockResponse::success("Terraform v1.6.0"));

    let config = CommandConfig::new("terraform").arg("version");
    let result = runner.run(&config).await.unwrap();

    assert!(result.success());
    assert_eq!(result.stdout, "Terraform v1.6.0");
}

#[tokio::test]
async fn test_mock_runner_captures_config() {
    let runner = MockRunner::new();

    let config = CommandConfig::new("terraform")
        .args(["apply", "-auto-approve"])
        .workdir("/tmp/pkg")
        .env("TF_IN_AUTOMATION", "1");

    runner.run(&config).await.unwrap();

    let calls = runner.get_calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.program, "terraform");
    assert_eq!(call.args, vec!["apply", "-auto-approve"]);
    assert_eq!(call.workdir.as_deref(), Some(std::path::Path::new("/tmp/pkg")));
    assert_eq!(call.env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_rules_take_priority_over_queue() {
    let runner = MockRunner::new()
        .add_response(MockResponse::success("queued"))
        .respond_to("output -json", MockResponse::success("{}"));

    let output = runner
        .run(&CommandConfig::new("terraform").args(["output", "-json"]))
        .await
        .unwrap();
    let other = runner
        .run(&CommandConfig::new("terraform").arg("init"))
        .await
        .unwrap();

    assert_eq!(output.stdout, "{}");
    assert_eq!(other.stdout, "queued");
    assert_eq!(runner.calls_matching("terraform").len(), 2);
}

#[tokio::test]
async fn test_fail_fast_surfaces_exit_code() {
    let runner = MockRunner::new()
        .fail_fast()
        .add_response(MockResponse::failure(1, "Error: invalid provider"));

    let err = runner
        .run(&CommandConfig::new("terraform").arg("apply"))
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::NonZeroExit { exit_code: 1, .. }));
    assert!(err.to_string().contains("invalid provider"));
}

#[tokio::test]
async fn test_non_fail_fast_returns_result() {
    let runner = MockRunner::new().add_response(MockResponse::failure(2, "nope"));

    let result = runner
        .run(&CommandConfig::new("npx").arg("cdk"))
        .await
        .unwrap();

    assert!(!result.success());
    assert_eq!(result.failure_hint(), Some("nope"));
}

#[tokio::test]
async fn test_simulated_failure() {
    let runner = MockRunner::new().simulate_failure("git binary vanished");

    let err = runner.run(&CommandConfig::new("git")).await.unwrap_err();
    assert!(matches!(err, RunnerError::ExecutionFailed(_)));
    assert_eq!(runner.call_count(), 1);
}

#[tokio::test]
async fn test_availability() {
    let runner = MockRunner::new().set_unavailable("cdk");

    assert!(runner.is_available("terraform").await);
    assert!(!runner.is_available("cdk").await);
}
