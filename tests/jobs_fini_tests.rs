//! Lifecycle tests that need a manager of their own, in a process of
//! their own: fini tears the whole table down, which would race the
//! other job tests.

use jush::error::JushError;
use jush::jobs::JobManager;
use jush::parser::ast::{Command, Expr, Pipeline};
use jush::store::VarStore;

fn pipeline(argv: &[&str]) -> Pipeline {
    Pipeline {
        commands: vec![Command {
            args: argv.iter().map(|a| Expr::Word(a.to_string())).collect(),
        }],
        input_file: None,
        output_file: None,
        capture_output: false,
    }
}

#[test]
fn test_fini_cancels_and_expunges_everything() {
    let manager = JobManager::new();
    manager.init().unwrap();
    assert!(matches!(
        manager.init(),
        Err(JushError::AlreadyInitialized)
    ));

    let vars = VarStore::new();

    // One job still running, one already terminated but not expunged.
    let running = manager.run(&pipeline(&["sleep", "60"]), &vars).unwrap();
    let done = manager.run(&pipeline(&["true"]), &vars).unwrap();
    manager.wait(done).unwrap();

    manager.fini().unwrap();

    assert!(matches!(
        manager.poll(running),
        Err(JushError::UnknownJob(_))
    ));
    assert!(matches!(manager.poll(done), Err(JushError::UnknownJob(_))));

    let mut buf = Vec::new();
    manager.show(&mut buf).unwrap();
    assert!(buf.is_empty());
}
