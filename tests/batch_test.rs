mod common;

use std::sync::Arc;
use std::time::Duration;

use chat_pilot::config::{Config, StageTimeoutsConfig};
use chat_pilot::error::{OrchestratorError, SessionError};
use chat_pilot::models::job::{JobMode, JobSpec};
use chat_pilot::models::outcome::{JobStatus, Stage};
use chat_pilot::orchestrator::BatchOrchestrator;
use chat_pilot::workflow::ui_map::names;
use chat_pilot::workflow::{UiMap, WorkflowContext};
use chat_pilot::browser::ensure_authenticated;
use common::{test_flow, test_flow_with, FakeSession, PageScript};
use tokio_util::sync::CancellationToken;

fn standard(prompt: &str, timeout_secs: u64) -> JobSpec {
    JobSpec::new(format!("id-{}", prompt), prompt, JobMode::Standard, timeout_secs)
}

fn orchestrator(session: &Arc<FakeSession>, max_concurrent: usize) -> BatchOrchestrator {
    BatchOrchestrator::new(session.clone(), test_flow(), max_concurrent)
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_concurrency_limit() {
    let mut session = FakeSession::new();
    let prompts = ["p1", "p2", "p3", "p4", "p5", "p6", "p7"];
    for (i, prompt) in prompts.iter().enumerate() {
        let delay = Duration::from_secs(5 + i as u64 * 3);
        session = session.with_script(prompt, PageScript::delayed(delay));
    }
    let session = Arc::new(session);

    let jobs = prompts.iter().map(|p| standard(p, 600)).collect();
    let report = orchestrator(&session, 3)
        .run(jobs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 7);
    assert!(report.outcomes.iter().all(|o| o.status == JobStatus::Success));
    assert_eq!(session.stats.max_open(), 3);
    assert_eq!(session.stats.opened(), 7);
    assert_eq!(session.stats.closed(), 7);
    assert_eq!(session.stats.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn outcomes_follow_submission_order() {
    let delays = [30, 5, 20, 1, 12];
    let prompts = ["a", "b", "c", "d", "e"];
    let mut session = FakeSession::new();
    for (prompt, delay) in prompts.iter().zip(delays) {
        session = session.with_script(prompt, PageScript::delayed(Duration::from_secs(delay)));
    }
    let session = Arc::new(session);

    let jobs = prompts.iter().map(|p| standard(p, 600)).collect();
    let report = orchestrator(&session, 3)
        .run(jobs, CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<_> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["id-a", "id-b", "id-c", "id-d", "id-e"]);
    assert_eq!(report.outcomes[2].content.as_deref(), Some("answer to c"));
}

#[tokio::test(start_paused = true)]
async fn mode_toggle_without_active_indicator_is_ui_changed() {
    let session = Arc::new(FakeSession::new().with_script(
        "think hard",
        PageScript {
            toggle_activates: false,
            ..PageScript::default()
        },
    ));
    let job = JobSpec::new("t", "think hard", JobMode::DeepThink, 600);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::UiChanged);
    let last = outcome.stages.last().unwrap();
    assert_eq!(last.stage, Stage::ModeToggling);
    assert!(!last.ok);
    // 模式没有激活就不会提交
    assert!(!session.recorder.clicked("think hard").contains(&names::SEND_BUTTON.to_string()));
    assert_eq!(session.stats.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_confirmation_widget_proceeds_to_completion() {
    let session = Arc::new(FakeSession::new().with_script(
        "research",
        PageScript {
            confirm_widget: false,
            ..PageScript::default()
        },
    ));
    let job = JobSpec::new("r", "research", JobMode::DeepResearch, 900);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    let confirming = outcome.stages.iter().find(|s| s.stage == Stage::Confirming).unwrap();
    assert!(confirming.ok);
    let after = outcome
        .stages
        .iter()
        .skip_while(|s| s.stage != Stage::Confirming)
        .nth(1)
        .unwrap();
    assert_eq!(after.stage, Stage::AwaitingCompletion);
    assert!(!session.recorder.clicked("research").iter().any(|c| c.starts_with("confirm_button")));
}

#[tokio::test(start_paused = true)]
async fn confirmation_falls_back_to_second_locator() {
    let session = Arc::new(FakeSession::new().with_script(
        "research",
        PageScript::default().with_missing(names::CONFIRM_BUTTON),
    ));
    let job = JobSpec::new("r", "research", JobMode::DeepResearch, 900);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    let confirming = outcome.stages.iter().find(|s| s.stage == Stage::Confirming).unwrap();
    assert!(confirming.detail.as_deref().unwrap().contains("备用定位器"));
    assert!(session
        .recorder
        .clicked("research")
        .contains(&names::CONFIRM_BUTTON_FALLBACK.to_string()));
}

#[tokio::test(start_paused = true)]
async fn completion_wait_uses_job_timeout_in_seconds() {
    let session = Arc::new(FakeSession::new());
    let job = standard("long question", 600);

    orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let completion = UiMap::gemini().completion(JobMode::Standard);
    let waits = session.recorder.waits_for("long question");
    let wait = waits.iter().find(|w| w.condition == completion).unwrap();
    assert_eq!(wait.timeout, Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn mixed_batch_with_deep_research_keeps_order() {
    let session = Arc::new(
        FakeSession::new()
            .with_script("A", PageScript::delayed(Duration::from_secs(10)))
            .with_script("B", PageScript::delayed(Duration::from_secs(120)))
            .with_script("C", PageScript::delayed(Duration::from_secs(3))),
    );
    let jobs = vec![
        standard("A", 600),
        JobSpec::new("id-B", "B", JobMode::DeepResearch, 900),
        standard("C", 600),
    ];

    let report = orchestrator(&session, 2)
        .run(jobs, CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<_> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["id-A", "id-B", "id-C"]);
    assert!(report.outcomes.iter().all(|o| o.is_success()));
    assert!(session.stats.max_open() <= 2);
    assert!(session.recorder.clicked("B").contains(&names::CONFIRM_BUTTON.to_string()));
}

#[tokio::test(start_paused = true)]
async fn short_timeout_fails_only_that_job() {
    let session = Arc::new(FakeSession::new().with_script("slow", PageScript::never_completes()));
    let jobs = vec![standard("fast-1", 600), standard("slow", 5), standard("fast-2", 600)];

    let report = orchestrator(&session, 3)
        .run(jobs, CancellationToken::new())
        .await
        .unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(statuses, vec![JobStatus::Success, JobStatus::Timeout, JobStatus::Success]);
    let slow = &report.outcomes[1];
    assert_eq!(slow.stages.last().unwrap().stage, Stage::AwaitingCompletion);
    assert!(slow.duration <= Duration::from_secs(5));
    assert_eq!(session.stats.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn research_length_check_runs_only_at_deadline() {
    let session = Arc::new(FakeSession::new().with_script(
        "deep dive",
        PageScript {
            completes: false,
            long_content: true,
            ..PageScript::default()
        },
    ));
    let job = JobSpec::new("r", "deep dive", JobMode::DeepResearch, 900);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    assert_eq!(outcome.content.as_deref(), Some("answer to deep dive"));
    // 完成与否直到期限才决定
    assert!(outcome.duration >= Duration::from_secs(900));

    let ui = UiMap::gemini();
    let indicators = ui.completion(JobMode::DeepResearch);
    let fallback = ui.completion_fallback(JobMode::DeepResearch).unwrap();
    let waits = session.recorder.waits_for("deep dive");
    let polled = waits.iter().find(|w| w.condition == indicators).unwrap();
    assert_eq!(polled.timeout, Duration::from_secs(900));
    let checked_once: Vec<_> = waits.iter().filter(|w| w.condition == fallback).collect();
    assert_eq!(checked_once.len(), 1);
    assert_eq!(checked_once[0].timeout, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn research_without_indicators_or_content_times_out() {
    let session = Arc::new(
        FakeSession::new().with_script("stalled research", PageScript::never_completes()),
    );
    let job = JobSpec::new("r", "stalled research", JobMode::DeepResearch, 30);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Timeout);
    assert_eq!(outcome.stages.last().unwrap().stage, Stage::AwaitingCompletion);
}

#[tokio::test(start_paused = true)]
async fn research_waits_for_rendering_before_extracting() {
    let session = Arc::new(FakeSession::new());
    let job = JobSpec::new("r", "quick research", JobMode::DeepResearch, 900);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    assert!(outcome.duration >= Duration::from_secs(5));
    assert!(outcome.duration < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_login_wait_closes_the_new_page() {
    let session = Arc::new(FakeSession::new().with_stalled_login(Duration::from_secs(60)));
    let jobs = vec![standard("waiting", 600), standard("queued", 600)];
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.cancel();
    });

    let result = orchestrator(&session, 1).run(jobs, cancel).await;

    let Err(OrchestratorError::Cancelled { report }) = result else {
        panic!("batch should report cancellation");
    };
    assert!(report.outcomes.iter().all(|o| o.status == JobStatus::Cancelled));
    assert!(report.outcomes[0].duration < Duration::from_secs(60));
    assert_eq!(session.stats.opened(), 1);
    assert_eq!(session.stats.closed(), 1);
    assert_eq!(session.stats.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn huge_timeout_does_not_overflow_the_deadline() {
    let session = Arc::new(FakeSession::new());
    let job = JobSpec::new("big", "patient", JobMode::Standard, u64::MAX);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, JobStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_first_job_marks_the_rest_cancelled() {
    let cancel = CancellationToken::new();
    let session = Arc::new(FakeSession::new().with_script(
        "q1",
        PageScript {
            cancel_on_close: Some(cancel.clone()),
            ..PageScript::default()
        },
    ));
    let jobs = ["q1", "q2", "q3", "q4", "q5"].iter().map(|p| standard(p, 600)).collect();

    let result = orchestrator(&session, 1).run(jobs, cancel).await;

    let Err(OrchestratorError::Cancelled { report }) = result else {
        panic!("batch should report cancellation");
    };
    let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Success,
            JobStatus::Cancelled,
            JobStatus::Cancelled,
            JobStatus::Cancelled,
            JobStatus::Cancelled
        ]
    );
    // 未开始的任务不占用槽位，也不打开页面
    assert_eq!(session.stats.opened(), 1);
    assert_eq!(session.stats.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_in_flight_job_and_closes_its_page() {
    let session = Arc::new(FakeSession::new().with_script("stuck", PageScript::never_completes()));
    let jobs: Vec<_> = ["stuck", "q2", "q3", "q4", "q5"].iter().map(|p| standard(p, 600)).collect();
    let cancel = CancellationToken::new();

    let orchestrator = orchestrator(&session, 1);
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        trigger.cancel();
    });

    let result = orchestrator.run(jobs, cancel).await;

    let Err(OrchestratorError::Cancelled { report }) = result else {
        panic!("batch should report cancellation");
    };
    assert_eq!(report.outcomes.len(), 5);
    assert!(report.outcomes.iter().all(|o| o.status == JobStatus::Cancelled));
    assert!(report.outcomes[0].error_detail.as_deref().unwrap().contains("等待完成"));
    assert_eq!(session.stats.opened(), 1);
    assert_eq!(session.stats.closed(), 1);
    assert_eq!(session.stats.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_is_reported_per_job() {
    let session = Arc::new(FakeSession::new().with_auth_failure());
    let jobs = vec![standard("x", 600), standard("y", 600)];

    let report = orchestrator(&session, 2)
        .run(jobs, CancellationToken::new())
        .await
        .unwrap();

    assert!(report.outcomes.iter().all(|o| o.status == JobStatus::AuthFailure));
    assert_eq!(report.success_count(), 0);
}

#[tokio::test]
async fn unhealthy_session_fails_the_whole_batch() {
    let session = Arc::new(FakeSession::new().unhealthy());

    let result = orchestrator(&session, 2)
        .run(vec![standard("x", 600)], CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::SessionUnavailable(SessionError::Unavailable(_)))
    ));
    assert_eq!(session.stats.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn enhanced_extraction_includes_thinking_and_sources() {
    let session =
        Arc::new(FakeSession::new().with_script("explain", PageScript::default().with_extras()));
    let job = JobSpec::new("e", "explain", JobMode::DeepThink, 600);

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let content = report.outcomes[0].content.as_deref().unwrap();
    assert!(content.starts_with("<thinking>\nstep by step\n</thinking>"));
    assert!(content.contains("<output>\nanswer to explain\n</output>"));
    assert!(content.contains("<sources>"));
    assert!(content.contains("https://source.example"));
}

#[tokio::test(start_paused = true)]
async fn missing_prompt_input_is_ui_changed() {
    let session = Arc::new(FakeSession::new().with_default_script(missing_input_script()));

    let report = orchestrator(&session, 1)
        .run(vec![standard("lost", 600)], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::UiChanged);
    assert_eq!(outcome.stages.last().unwrap().stage, Stage::Entering);
    assert!(session.recorder.typed.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn prompt_input_fallback_is_used_when_primary_is_missing() {
    let config = Config {
        stage_timeouts: StageTimeoutsConfig {
            input_ready_secs: 2,
            ..Default::default()
        },
        ..Config::default()
    };
    let session = Arc::new(
        FakeSession::new()
            .with_default_script(PageScript::default().with_missing(names::PROMPT_INPUT)),
    );
    let mut ctx = WorkflowContext::new(standard("fallback", 600), 1, Box::new(session.driver()));

    let outcome = test_flow_with(&config).run(&mut ctx).await;

    assert_eq!(outcome.status, JobStatus::Success);
    let entering = &outcome.stages[0];
    assert_eq!(entering.stage, Stage::Entering);
    assert!(entering.detail.as_deref().unwrap().starts_with(names::PROMPT_INPUT_FALLBACK));
}

#[tokio::test]
async fn image_job_moves_downloaded_file() {
    let downloads = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let session = Arc::new(FakeSession::new().with_script(
        "a red fox",
        PageScript {
            download_to: Some(downloads.path().to_path_buf()),
            ..PageScript::default()
        },
    ));
    let job = JobSpec::new("img", "a red fox", JobMode::ImageGeneration, 120)
        .with_option("watch_dir", downloads.path().to_string_lossy().to_string())
        .with_option("destination", destination.path().to_string_lossy().to_string());

    let report = orchestrator(&session, 1)
        .run(vec![job], CancellationToken::new())
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    let saved = destination.path().join("generated.png");
    assert_eq!(outcome.content.as_deref(), Some(saved.to_string_lossy().as_ref()));
    assert!(saved.exists());
    assert!(!downloads.path().join("generated.png").exists());
}

#[tokio::test(start_paused = true)]
async fn login_page_without_chat_input_is_auth_failure() {
    let session = FakeSession::new().with_default_script(missing_input_script());
    let mut page = session.driver();
    page.url = "https://accounts.google.com/v3/signin".to_string();
    page.logged_in = false;

    let probe = UiMap::gemini().login_probe();
    let result = ensure_authenticated(&page, &probe, Duration::from_secs(60)).await;

    assert!(matches!(
        result,
        Err(SessionError::AuthFailure(ref detail)) if detail.contains("accounts.google.com")
    ));
}

fn missing_input_script() -> PageScript {
    PageScript::default()
        .with_missing(names::PROMPT_INPUT)
        .with_missing(names::PROMPT_INPUT_FALLBACK)
}
