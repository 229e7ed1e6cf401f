//! Job manager integration tests against real processes.
//!
//! All tests share one JobManager: its watcher thread reaps with
//! `waitpid(-1, ...)`, so a second manager in the same process would
//! steal terminations from the first.

use jush::error::JushError;
use jush::jobs::{status_raw, JobManager};
use jush::parser::ast::{Command, Expr, Pipeline};
use jush::store::VarStore;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::fs;
use std::sync::OnceLock;

fn manager() -> &'static JobManager {
    static MANAGER: OnceLock<JobManager> = OnceLock::new();
    MANAGER.get_or_init(|| {
        let manager = JobManager::new();
        manager.init().expect("jobs init");
        manager
    })
}

fn pipeline(stages: &[&[&str]]) -> Pipeline {
    Pipeline {
        commands: stages
            .iter()
            .map(|argv| Command {
                args: argv.iter().map(|a| Expr::Word(a.to_string())).collect(),
            })
            .collect(),
        input_file: None,
        output_file: None,
        capture_output: false,
    }
}

fn capturing(stages: &[&[&str]]) -> Pipeline {
    let mut p = pipeline(stages);
    p.capture_output = true;
    p
}

/// The `show` line for one job id, split into its tab fields.
fn show_fields(manager: &JobManager, id: u32) -> Vec<String> {
    let mut buf = Vec::new();
    manager.show(&mut buf).unwrap();
    let dump = String::from_utf8(buf).unwrap();
    let line = dump
        .lines()
        .find(|line| line.starts_with(&format!("{}\t", id)))
        .unwrap_or_else(|| panic!("no show line for job {}: {:?}", id, dump));
    line.split('\t').map(str::to_string).collect()
}

#[test]
fn test_captured_two_stage_pipeline_completes() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager
        .run(&capturing(&[&["printf", "hello"], &["cat"]]), &vars)
        .unwrap();
    let status = manager.wait(id).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 0)));
    assert_eq!(status_raw(status), 0);

    let fields = show_fields(manager, id);
    assert_eq!(fields.len(), 4);
    assert!(fields[1].parse::<i32>().unwrap() > 0);
    assert_eq!(fields[2], "completed");
    assert_eq!(fields[3], "printf hello | cat");

    assert_eq!(manager.get_output(id).as_deref(), Some(b"hello".as_ref()));

    manager.expunge(id).unwrap();
    assert!(manager.get_output(id).is_none());
    assert!(matches!(manager.poll(id), Err(JushError::UnknownJob(_))));
}

#[test]
fn test_failing_command_aborts() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["false"]]), &vars).unwrap();
    let status = manager.wait(id).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 1)));
    assert_eq!(show_fields(manager, id)[2], "aborted");
    assert!(manager.get_output(id).is_none());
    manager.expunge(id).unwrap();
}

#[test]
fn test_failing_early_stage_aborts_pipeline() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager
        .run(&pipeline(&[&["false"], &["cat"]]), &vars)
        .unwrap();
    let status = manager.wait(id).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 1)));
    assert_eq!(show_fields(manager, id)[2], "aborted");
    manager.expunge(id).unwrap();
}

#[test]
fn test_last_stage_exit_code_passes_through() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager
        .run(&pipeline(&[&["true"], &["sh", "-c", "exit 7"]]), &vars)
        .unwrap();
    let status = manager.wait(id).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 7)));
    assert_eq!(status_raw(status), 7 << 8);
    manager.expunge(id).unwrap();
}

#[test]
fn test_cancel_kills_the_process_group() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["sleep", "60"]]), &vars).unwrap();
    manager.cancel(id).unwrap();

    let status = manager.wait(id).unwrap();
    assert!(matches!(
        status,
        WaitStatus::Signaled(_, Signal::SIGKILL, _)
    ));
    assert_eq!(show_fields(manager, id)[2], "canceled");

    assert!(matches!(
        manager.cancel(id),
        Err(JushError::JobTerminated(_))
    ));
    manager.expunge(id).unwrap();
}

#[test]
fn test_second_cancel_of_running_job_fails() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["sleep", "60"]]), &vars).unwrap();
    manager.cancel(id).unwrap();
    assert!(matches!(
        manager.cancel(id),
        Err(JushError::AlreadyCanceled(_)) | Err(JushError::JobTerminated(_))
    ));
    manager.wait(id).unwrap();
    manager.expunge(id).unwrap();
}

#[test]
fn test_wait_is_idempotent() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["true"]]), &vars).unwrap();
    let first = manager.wait(id).unwrap();
    let second = manager.wait(id).unwrap();
    assert_eq!(first, second);
    manager.expunge(id).unwrap();
}

#[test]
fn test_job_ids_increase_and_are_never_reused() {
    let manager = manager();
    let vars = VarStore::new();

    let a = manager.run(&pipeline(&[&["true"]]), &vars).unwrap();
    let b = manager.run(&pipeline(&[&["true"]]), &vars).unwrap();
    assert!(b > a);

    manager.wait(a).unwrap();
    manager.expunge(a).unwrap();

    let c = manager.run(&pipeline(&[&["true"]]), &vars).unwrap();
    assert!(c > b);

    manager.wait(b).unwrap();
    manager.expunge(b).unwrap();
    manager.wait(c).unwrap();
    manager.expunge(c).unwrap();
}

#[test]
fn test_unknown_job_id_errors() {
    let manager = manager();
    assert!(matches!(
        manager.poll(99_999),
        Err(JushError::UnknownJob(_))
    ));
    assert!(matches!(
        manager.wait(99_999),
        Err(JushError::UnknownJob(_))
    ));
    assert!(matches!(
        manager.cancel(99_999),
        Err(JushError::UnknownJob(_))
    ));
    assert!(matches!(
        manager.expunge(99_999),
        Err(JushError::UnknownJob(_))
    ));
    assert!(manager.get_output(99_999).is_none());
}

#[test]
fn test_expunge_requires_termination() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["sleep", "60"]]), &vars).unwrap();
    assert!(matches!(
        manager.expunge(id),
        Err(JushError::JobNotTerminated(_))
    ));

    manager.cancel(id).unwrap();
    manager.wait(id).unwrap();
    manager.expunge(id).unwrap();
}

#[test]
fn test_poll_does_not_block() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["sleep", "60"]]), &vars).unwrap();
    assert!(matches!(
        manager.poll(id),
        Err(JushError::JobNotTerminated(_))
    ));

    manager.cancel(id).unwrap();
    manager.wait(id).unwrap();
    assert!(manager.poll(id).is_ok());
    manager.expunge(id).unwrap();
}

#[test]
fn test_pause_wakes_on_job_events() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&pipeline(&[&["sleep", "1"]]), &vars).unwrap();
    while manager.poll(id).is_err() {
        manager.pause().unwrap();
    }
    manager.expunge(id).unwrap();
}

#[test]
fn test_capture_of_silent_job_is_empty() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager.run(&capturing(&[&["true"]]), &vars).unwrap();
    manager.wait(id).unwrap();
    assert_eq!(manager.get_output(id).as_deref(), Some(b"".as_ref()));
    manager.expunge(id).unwrap();
}

#[test]
fn test_capture_is_byte_complete() {
    let manager = manager();
    let vars = VarStore::new();

    let id = manager
        .run(&capturing(&[&["seq", "1", "2000"], &["cat"]]), &vars)
        .unwrap();
    manager.wait(id).unwrap();

    let expected: String = (1..=2000).map(|n| format!("{}\n", n)).collect();
    assert_eq!(
        manager.get_output(id).as_deref(),
        Some(expected.as_bytes())
    );
    manager.expunge(id).unwrap();
}

#[test]
fn test_file_redirection() {
    let manager = manager();
    let vars = VarStore::new();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    fs::write(&input, "over the pipe\n").unwrap();

    let mut p = pipeline(&[&["cat"], &["cat"]]);
    p.input_file = Some(input.to_str().unwrap().to_string());
    p.output_file = Some(output.to_str().unwrap().to_string());

    let id = manager.run(&p, &vars).unwrap();
    let status = manager.wait(id).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 0)));
    manager.expunge(id).unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), "over the pipe\n");
}

#[test]
fn test_argument_expressions_are_evaluated() {
    let manager = manager();
    let mut vars = VarStore::new();
    vars.set_string("word", Some("resolved")).unwrap();

    let mut p = capturing(&[&["printf", "%s"]]);
    p.commands[0].args.push(Expr::Var("word".to_string()));

    let id = manager.run(&p, &vars).unwrap();
    manager.wait(id).unwrap();
    assert_eq!(
        manager.get_output(id).as_deref(),
        Some(b"resolved".as_ref())
    );
    manager.expunge(id).unwrap();
}
