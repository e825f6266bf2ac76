//! Lifecycle tests for the iteration engine.
//!
//! Drives the engine with a scripted agent against a scaffolded temp project
//! and checks run directories, fallback order, restart markers and counters.

use std::fs;
use std::ops::ControlFlow;
use std::thread;
use std::time::{Duration, Instant};

use vibepup::core::session::LoopMode;
use vibepup::core::types::{IterationStatus, TurnVerdict};
use vibepup::io::iteration_log::IterationMeta;
use vibepup::io::models::ModelCandidates;
use vibepup::looping::{Engine, LoopStop};
use vibepup::test_support::{ScriptedAgent, ScriptedTurn, TestProject, fast_settings};

fn candidates(models: &[&str]) -> ModelCandidates {
    let models: Vec<String> = models.iter().map(|m| m.to_string()).collect();
    ModelCandidates {
        plan: models.clone(),
        build: models,
    }
}

fn read_meta(project: &TestProject, index: u32) -> IterationMeta {
    let raw = fs::read_to_string(project.paths.iteration_dir(index).join("meta.json"))
        .expect("read meta.json");
    serde_json::from_str(&raw).expect("parse meta.json")
}

/// Verifies a completion sentinel on the first turn stops a bounded loop
/// after exactly one iteration.
#[test]
fn completion_stops_after_one_iteration() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new()
        .with_default_turn(ScriptedTurn::ok("all done\n<promise>COMPLETE</promise>\n"));
    let models = candidates(&["a/one"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 5 })
        .expect("session");

    let stop = engine.run(&mut session, |_| {}).expect("run");

    assert_eq!(stop, LoopStop::Complete { iteration: 1 });
    assert_eq!(project.iteration_dirs(), ["iter-0001"]);
    let run_dir = project.paths.iteration_dir(1);
    assert!(run_dir.join("progress.tail.log").is_file());
    assert!(
        fs::read_to_string(run_dir.join("agent_response.txt"))
            .expect("response")
            .contains("<promise>COMPLETE</promise>")
    );
    assert_eq!(read_meta(&project, 1).status, IterationStatus::Complete);
}

/// Verifies every candidate is tried once when all are unsupported, and the
/// iteration is recorded as failed.
#[test]
fn all_unsupported_models_fail_the_iteration() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new()
        .with_model_turn("a/one", ScriptedTurn::exit(1, "Error: model not supported"))
        .with_model_turn("b/two", ScriptedTurn::ok("ModelNotFoundError: b/two"))
        .with_model_turn("c/three", ScriptedTurn::ok("Make sure the model is enabled"));
    let models = candidates(&["a/one", "b/two", "c/three"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 1 })
        .expect("session");

    let stop = engine
        .run(&mut session, |pass| assert_eq!(pass.status, IterationStatus::Failed))
        .expect("run");

    assert_eq!(stop, LoopStop::MaxIterations { max_iterations: 1 });
    assert_eq!(agent.models_tried(), ["a/one", "b/two", "c/three"]);
    let meta = read_meta(&project, 1);
    assert_eq!(meta.status, IterationStatus::Failed);
    assert!(
        meta.attempts
            .iter()
            .all(|attempt| attempt.verdict == TurnVerdict::Unsupported)
    );
}

#[test]
fn failing_model_falls_back_to_next() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new()
        .with_model_turn("a/one", ScriptedTurn::exit(2, "crashed"))
        .with_model_turn("b/two", ScriptedTurn::ok("implemented login"));
    let models = candidates(&["a/one", "b/two", "c/three"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 1 })
        .expect("session");

    let ControlFlow::Continue(pass) = engine.step(&mut session).expect("step") else {
        panic!("expected a pass");
    };

    assert_eq!(pass.status, IterationStatus::Success);
    assert_eq!(pass.record.expect("record").model, "b/two");
    assert_eq!(agent.models_tried(), ["a/one", "b/two"]);
    assert_eq!(session.iteration, 2);
}

#[test]
fn empty_response_counts_as_failure() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new()
        .with_model_turn("a/one", ScriptedTurn::ok("   \n"))
        .with_model_turn("b/two", ScriptedTurn::ok("real work"));
    let models = candidates(&["a/one", "b/two"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 1 })
        .expect("session");

    engine.step(&mut session).expect("step");

    let meta = read_meta(&project, 1);
    assert_eq!(meta.attempts[0].verdict, TurnVerdict::Failed);
    assert_eq!(meta.attempts[1].verdict, TurnVerdict::Success);
}

/// Verifies an external edit in watch mode restarts the counter at 1 and
/// writes exactly one restart marker.
#[test]
fn watch_mode_edit_restarts_counter() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new().with_default_turn(ScriptedTurn::ok("progress"));
    let models = candidates(&["a/one"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine.start_session(LoopMode::Watch).expect("session");

    engine.step(&mut session).expect("step 1");
    engine.step(&mut session).expect("step 2");
    assert_eq!(session.iteration, 3);

    project.write_prd("- [ ] brand new task\n");
    let ControlFlow::Continue(pass) = engine.step(&mut session).expect("step 3") else {
        panic!("watch mode never stops");
    };

    assert_eq!(pass.iteration, 1);
    assert_eq!(session.iteration, 2);
    assert_eq!(project.restart_markers(), 1);

    engine.step(&mut session).expect("step 4");
    assert_eq!(project.restart_markers(), 1);
}

/// Verifies bounded mode records an external edit without resetting the counter.
#[test]
fn bounded_mode_edit_keeps_counter() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new().with_default_turn(ScriptedTurn::ok("progress"));
    let models = candidates(&["a/one"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 3 })
        .expect("session");

    engine.step(&mut session).expect("step 1");
    project.write_prd("- [ ] edited\n");
    let ControlFlow::Continue(pass) = engine.step(&mut session).expect("step 2") else {
        panic!("expected a pass");
    };

    assert_eq!(pass.iteration, 2);
    assert_eq!(project.restart_markers(), 1);
}

#[test]
fn max_iterations_stops_bounded_loop() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new().with_default_turn(ScriptedTurn::ok("progress"));
    let models = candidates(&["a/one"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 3 })
        .expect("session");

    let mut passes = Vec::new();
    let stop = engine
        .run(&mut session, |pass| passes.push(pass.iteration))
        .expect("run");

    assert_eq!(stop, LoopStop::MaxIterations { max_iterations: 3 });
    assert_eq!(passes, [1, 2, 3]);
    assert_eq!(project.iteration_dirs(), ["iter-0001", "iter-0002", "iter-0003"]);
    assert_eq!(agent.turn_calls().len(), 3);
}

/// Verifies watch mode idles after completion until the task file changes,
/// then restarts from iteration 1.
#[test]
fn watch_mode_completion_waits_for_edit() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new()
        .with_queued_turn(ScriptedTurn::ok("<promise>COMPLETE</promise>"))
        .with_default_turn(ScriptedTurn::ok("more work"));
    let models = candidates(&["a/one"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine.start_session(LoopMode::Watch).expect("session");

    let prd = project.paths.prd_path.clone();
    let editor = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        fs::write(prd, "- [ ] follow-up task\n").expect("edit prd");
    });

    let ControlFlow::Continue(pass) = engine.step(&mut session).expect("step 1") else {
        panic!("watch mode never stops");
    };
    editor.join().expect("editor thread");
    assert_eq!(pass.status, IterationStatus::Complete);

    let ControlFlow::Continue(next) = engine.step(&mut session).expect("step 2") else {
        panic!("watch mode never stops");
    };
    assert_eq!(next.iteration, 1);
    assert_eq!(next.status, IterationStatus::Success);
    assert_eq!(project.restart_markers(), 1);
}

#[cfg(unix)]
#[test]
fn latest_points_at_current_iteration() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new().with_default_turn(ScriptedTurn::ok("progress"));
    let models = candidates(&["a/one"]);
    let engine = Engine::new(&project.paths, &agent, &models, fast_settings());
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 2 })
        .expect("session");

    engine.run(&mut session, |_| {}).expect("run");

    assert_eq!(
        fs::canonicalize(&project.paths.latest_link).expect("latest"),
        fs::canonicalize(project.paths.iteration_dir(2)).expect("iter-0002")
    );
}

/// Verifies every pass waits the pacing delay, and a pass where every model
/// failed also waits the failure pause.
#[test]
fn failed_iteration_pauses_longer_than_successful_one() {
    let project = TestProject::new();
    let agent = ScriptedAgent::new()
        .with_queued_turn(ScriptedTurn::ok("progress"))
        .with_default_turn(ScriptedTurn::exit(1, "crashed"));
    let models = candidates(&["a/one"]);
    let mut settings = fast_settings();
    settings.iteration_delay = Duration::from_millis(150);
    settings.failure_pause = Duration::from_millis(300);
    let engine = Engine::new(&project.paths, &agent, &models, settings);
    let mut session = engine
        .start_session(LoopMode::Bounded { max_iterations: 3 })
        .expect("session");

    let started = Instant::now();
    let ControlFlow::Continue(ok) = engine.step(&mut session).expect("step 1") else {
        panic!("expected a pass");
    };
    let ok_elapsed = started.elapsed();

    let started = Instant::now();
    let ControlFlow::Continue(failed) = engine.step(&mut session).expect("step 2") else {
        panic!("expected a pass");
    };
    let failed_elapsed = started.elapsed();

    assert_eq!(ok.status, IterationStatus::Success);
    assert_eq!(failed.status, IterationStatus::Failed);
    assert!(ok_elapsed >= Duration::from_millis(150), "{ok_elapsed:?}");
    assert!(failed_elapsed >= Duration::from_millis(450), "{failed_elapsed:?}");
}
