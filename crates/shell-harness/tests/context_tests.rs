//! Integration tests for `TestContext` against a real `/bin/sh`.
//!
//! Commands are written so that the terminal's echo of the typed line never
//! contains the text being waited for (`${X}1` echoes, `ab1` is printed).

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shell_harness::prelude::*;
use shell_harness::{ContextState, OutcomeKind, SpawnError};

const PROMPT: &str = "sh-test> ";

fn sh_config() -> HarnessConfig {
    HarnessConfig::new("/bin/sh")
        .shell(
            ShellConfig::new("/bin/sh")
                .args(["-i"])
                .env("PS1", PROMPT)
                .env_remove("ENV"),
        )
        .prompt(PromptPattern::literal(PROMPT))
        .default_timeout(Duration::from_secs(5))
        .report(ReportFormat::Quiet)
}

async fn start(name: &str) -> TestContext {
    TestContext::start(name, &sh_config()).await.unwrap()
}

#[tokio::test]
async fn start_waits_for_first_prompt() {
    let mut ctx = start("startup").await;
    assert_eq!(ctx.state(), ContextState::Running);
    assert_eq!(ctx.buffer().peek_unconsumed(), b"");

    let result = ctx.finish().await;
    assert!(result.is_success());
    assert!(result.outcomes.is_empty());
}

#[tokio::test]
async fn matches_arrive_in_order() {
    let mut ctx = start("ordering").await;
    ctx.send_line("X=ab; echo ${X}1; echo ${X}2").await.unwrap();

    let first = ctx.expect_exact("ab1", None).await.unwrap();
    let second = ctx.expect_exact("ab2", None).await.unwrap();
    ctx.expect_prompt(None).await.unwrap();

    assert!(second.offset > first.offset);
    assert!(!second.before.contains("ab1"));

    let result = ctx.finish().await;
    assert!(result.is_success());
    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.outcomes[0].description, "exact \"ab1\"");
}

#[tokio::test]
async fn regex_expectation() {
    let mut ctx = start("regex").await;
    ctx.send_line("echo $((40 + 2))").await.unwrap();
    let found = ctx
        .expect_regex(r"\b42\b", Some("arithmetic works"))
        .await
        .unwrap();
    assert_eq!(found.as_str(), "42");
    ctx.finish().await;
}

#[tokio::test]
async fn invalid_regex_is_recorded() {
    let mut ctx = start("bad regex").await;
    let err = ctx.expect_regex("(", None).await.unwrap_err();
    assert!(matches!(err, HarnessError::InvalidPattern { .. }));
    assert_eq!(ctx.state(), ContextState::Running);

    let result = ctx.finish().await;
    assert!(!result.is_success());
}

#[tokio::test]
async fn timeout_waits_at_least_the_deadline() {
    let mut ctx = start("timeout").await;

    let started = Instant::now();
    let err = ctx
        .expect_exact_within("never printed", Duration::from_millis(400), None)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");

    // A timeout is not fatal: the shell is still usable.
    assert_eq!(ctx.state(), ContextState::Running);
    ctx.send_line("echo $((1 + 1))").await.unwrap();
    ctx.expect_prompt(None).await.unwrap();

    let result = ctx.finish().await;
    assert!(!result.is_success());
    let failure = result.failures().next().unwrap();
    assert_eq!(failure.expected.as_deref(), Some("exact \"never printed\""));
}

#[tokio::test]
async fn crash_is_reported_before_timeout() {
    let mut ctx = start("crash").await;
    ctx.send_line("kill -SEGV $$").await.unwrap();

    let started = Instant::now();
    let err = ctx.expect_prompt(None).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(3));
    match err {
        HarnessError::UnexpectedExit { state, .. } => {
            assert_eq!(state, ProcessState::Crashed { signal: 11 });
        }
        other => panic!("expected unexpected exit, got {other:?}"),
    }
    assert_eq!(ctx.state(), ContextState::Finalizing);
    assert!(matches!(
        ctx.send_line("echo").await,
        Err(HarnessError::SessionClosed)
    ));

    let result = ctx.finish().await;
    assert!(!result.is_success());
    assert!(result.failures().next().unwrap().actual.as_deref().unwrap().contains("crashed"));
}

#[tokio::test]
async fn exit_while_expecting_is_not_a_timeout() {
    let mut ctx = start("exit during expect").await;
    ctx.send_line("exit 0").await.unwrap();

    let err = ctx.expect_exact("never printed", None).await.unwrap_err();
    assert!(err.is_unexpected_exit());
    assert!(!err.is_timeout());
    ctx.finish().await;
}

#[tokio::test]
async fn expected_exit_passes() {
    let mut ctx = start("exit").await;
    ctx.send_line("exit 3").await.unwrap();

    let state = ctx.expect_exit(None).await.unwrap();
    assert_eq!(state, ProcessState::Exited { code: 3 });

    let err = ctx.send_line("echo too late").await.unwrap_err();
    assert!(matches!(err, HarnessError::Write { .. }));

    let result = ctx.finish().await;
    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.outcomes[1].kind, OutcomeKind::Send);
}

#[tokio::test]
async fn finish_is_idempotent() {
    let mut ctx = start("finish twice").await;
    let first = ctx.finish().await;
    let second = ctx.finish().await;
    assert_eq!(first, second);
    assert_eq!(ctx.state(), ContextState::Closed);
    assert!(ctx.session().is_closed());
}

#[tokio::test]
async fn cleanups_run_newest_first_and_failures_do_not_fail_the_test() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut ctx = start("cleanups").await;

    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        ctx.on_cleanup(name, move || {
            order.lock().unwrap().push(name);
            if name == "second" {
                Err(std::io::Error::other("disk on fire"))
            } else {
                Ok(())
            }
        });
    }

    let result = ctx.finish().await;
    assert_eq!(*order.lock().unwrap(), ["third", "second", "first"]);
    assert!(result.is_success());
    assert_eq!(result.cleanup_errors.len(), 1);
    assert!(result.cleanup_errors[0].contains("disk on fire"));
}

#[tokio::test]
async fn cd_and_pwd_in_temp_dir() {
    let mut ctx = start("cd").await;
    let dir = ctx.temp_dir("-cd").unwrap();
    let shown = dir.display().to_string();

    ctx.send_line(&format!("cd {shown}")).await.unwrap();
    ctx.expect_prompt(None).await.unwrap();
    ctx.send_line("pwd").await.unwrap();
    ctx.expect_exact(&shown, Some("pwd prints new directory"))
        .await
        .unwrap();
    ctx.expect_prompt(None).await.unwrap();

    let result = ctx.finish().await;
    assert!(result.is_success(), "{result:?}");
    assert!(!dir.exists());
}

#[tokio::test]
async fn temp_dir_is_removed_when_script_fails() {
    let seen: Arc<Mutex<Option<PathBuf>>> = Arc::default();
    let config = sh_config().default_timeout(Duration::from_millis(300));

    let seen_in_script = Arc::clone(&seen);
    let result = run_script("fixture on failure", &config, move |ctx| {
        Box::pin(async move {
            let dir = ctx.temp_dir("-fail")?;
            *seen_in_script.lock().unwrap() = Some(dir);
            ctx.expect_exact("never printed", None).await?;
            Ok(())
        })
    })
    .await;

    assert!(!result.is_success());
    // The failure is recorded once, by the expectation itself.
    assert_eq!(result.failures().count(), 1);
    let dir = seen.lock().unwrap().clone().unwrap();
    assert!(!dir.exists());
}

#[tokio::test]
async fn panicking_script_is_a_failure() {
    let result = run_script("panics", &sh_config(), |ctx| {
        Box::pin(async move {
            ctx.send_line("echo $((2 * 3))").await?;
            ctx.expect_exact("6", None).await?;
            panic!("boom");
        })
    })
    .await;

    assert!(!result.is_success());
    let last = result.outcomes.last().unwrap();
    assert_eq!(last.kind, OutcomeKind::Script);
    assert!(last.actual.as_deref().unwrap().contains("boom"));
    assert!(result.outcomes[0].passed);
}

#[tokio::test]
async fn panic_before_the_script_future_still_finishes() {
    let result = run_script("setup panics", &sh_config(), |ctx| {
        let fixture: Option<&str> = None;
        let line = fixture.expect("fixture line is missing");
        Box::pin(async move {
            ctx.send_line(line).await?;
            Ok(())
        })
    })
    .await;

    assert!(!result.is_success());
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].kind, OutcomeKind::Script);
    assert!(
        result.outcomes[0]
            .actual
            .as_deref()
            .unwrap()
            .contains("fixture line is missing")
    );
}

#[tokio::test]
async fn script_error_from_outside_the_context_is_recorded() {
    let result = run_script("io error", &sh_config(), |_ctx| {
        Box::pin(async move {
            std::fs::read("/nonexistent/fixture")?;
            Ok(())
        })
    })
    .await;

    assert!(!result.is_success());
    assert_eq!(result.outcomes[0].kind, OutcomeKind::Script);
}

#[tokio::test]
async fn missing_shell_fails_startup() {
    let err = TestContext::start("missing", &HarnessConfig::new("/nonexistent/cush"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Spawn(SpawnError::CommandNotFound { .. })
    ));

    let config = HarnessConfig::new("/nonexistent/cush").report(ReportFormat::Quiet);
    let result = run_script("missing", &config, |_ctx| Box::pin(async { Ok(()) })).await;
    assert!(!result.is_success());
    assert_eq!(result.outcomes[0].kind, OutcomeKind::Startup);
}

#[tokio::test]
async fn silent_program_times_out_at_startup() {
    let config = HarnessConfig::new("cat")
        .startup_timeout(Duration::from_millis(300))
        .report(ReportFormat::Quiet);

    let err = TestContext::start("no prompt", &config).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn drop_without_finish_still_cleans_up() {
    let ran = Arc::new(Mutex::new(false));
    {
        let mut ctx = start("dropped").await;
        let ran = Arc::clone(&ran);
        ctx.on_cleanup("flag", move || {
            *ran.lock().unwrap() = true;
            Ok(())
        });
    }
    assert!(*ran.lock().unwrap());
}
