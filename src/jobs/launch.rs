//! Pipeline launch protocol.
//!
//! The leader process forked here becomes its own process group
//! leader, forks one child per pipeline stage into that group, wires
//! the stages together with pipes, reaps them all, and exits with the
//! last stage's code when every earlier stage succeeded.
//!
//! Everything a child needs is prepared in the parent first: argument
//! expressions are evaluated and converted to `CString`s before any
//! fork, so the post-fork paths make only async-signal-safe calls.

use crate::error::JushError;
use crate::eval::eval_to_string;
use crate::parser::ast::Pipeline;
use crate::store::VarStore;
use nix::errno::Errno;
use nix::fcntl::{fcntl, open, FcntlArg, OFlag};
use nix::libc;
use nix::sys::stat::Mode;
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::os::fd::{IntoRawFd, RawFd};

/// A pipeline flattened to the exact values the fork paths consume.
pub(crate) struct ExecPlan {
    stages: Vec<StagePlan>,
    input_file: Option<CString>,
    output_file: Option<CString>,
    capture_output: bool,
}

struct StagePlan {
    argv: Vec<CString>,
}

impl ExecPlan {
    pub(crate) fn prepare(pipeline: &Pipeline, vars: &VarStore) -> Result<Self, JushError> {
        if pipeline.commands.is_empty() {
            return Err(JushError::EmptyPipeline);
        }
        let mut stages = Vec::with_capacity(pipeline.commands.len());
        for command in &pipeline.commands {
            if command.args.is_empty() {
                return Err(JushError::EmptyPipeline);
            }
            let argv = command
                .args
                .iter()
                .map(|arg| {
                    CString::new(eval_to_string(arg, vars)).map_err(|_| JushError::NulArgument)
                })
                .collect::<Result<Vec<_>, _>>()?;
            stages.push(StagePlan { argv });
        }
        Ok(Self {
            stages,
            input_file: path_cstring(pipeline.input_file.as_deref())?,
            output_file: path_cstring(pipeline.output_file.as_deref())?,
            capture_output: pipeline.capture_output,
        })
    }
}

fn path_cstring(path: Option<&str>) -> Result<Option<CString>, JushError> {
    path.map(|p| CString::new(p).map_err(|_| JushError::NulArgument))
        .transpose()
}

pub(crate) fn pipe_raw() -> nix::Result<(RawFd, RawFd)> {
    let (r, w) = unistd::pipe()?;
    Ok((r.into_raw_fd(), w.into_raw_fd()))
}

/// Mark the capture read end non-blocking and asynchronous, with SIGIO
/// routed to this process.
pub(crate) fn set_async(fd: RawFd) -> Result<(), JushError> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK | OFlag::O_ASYNC;
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    // F_SETOWN has no nix wrapper
    if unsafe { libc::fcntl(fd, libc::F_SETOWN, libc::getpid()) } < 0 {
        return Err(Errno::last().into());
    }
    Ok(())
}

/// Body of the leader process. Never returns.
pub(crate) fn exec_leader(plan: &ExecPlan, capture_r: RawFd, capture_w: RawFd) -> ! {
    if unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).is_err() {
        fail();
    }

    let mut prev_input = libc::STDIN_FILENO;
    let mut last_stage = Pid::from_raw(0);
    let stage_count = plan.stages.len();

    for (i, stage) in plan.stages.iter().enumerate() {
        let first = i == 0;
        let last = i + 1 == stage_count;
        let (r, w) = match pipe_raw() {
            Ok(ends) => ends,
            Err(_) => fail(),
        };
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                exec_stage(plan, stage, first, last, prev_input, r, w, capture_r, capture_w)
            }
            Ok(ForkResult::Parent { child }) => {
                if unistd::close(w).is_err() {
                    fail();
                }
                if prev_input != libc::STDIN_FILENO && unistd::close(prev_input).is_err() {
                    fail();
                }
                prev_input = r;
                last_stage = child;
            }
            Err(_) => fail(),
        }
    }

    // The read end of the last stage's pipe and both capture ends are
    // still open here; the stages already hold their own copies.
    if prev_input != libc::STDIN_FILENO && unistd::close(prev_input).is_err() {
        fail();
    }
    if unistd::close(capture_r).is_err() || unistd::close(capture_w).is_err() {
        fail();
    }

    let mut earlier_failed = false;
    let mut last_status: Option<WaitStatus> = None;
    loop {
        match wait() {
            Ok(status) => {
                let clean = matches!(status, WaitStatus::Exited(_, 0));
                if status.pid() == Some(last_stage) {
                    last_status = Some(status);
                } else if !clean {
                    earlier_failed = true;
                }
            }
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }

    // Success only when every stage exited cleanly; with clean earlier
    // stages the last stage's own code passes through.
    let code = match last_status {
        Some(WaitStatus::Exited(_, code)) if !earlier_failed => code,
        _ => 1,
    };
    exit_now(code)
}

/// Body of one stage child. Never returns.
#[allow(clippy::too_many_arguments)]
fn exec_stage(
    plan: &ExecPlan,
    stage: &StagePlan,
    first: bool,
    last: bool,
    prev_input: RawFd,
    r: RawFd,
    w: RawFd,
    capture_r: RawFd,
    capture_w: RawFd,
) -> ! {
    if unistd::setpgid(Pid::from_raw(0), unistd::getppid()).is_err() {
        fail();
    }

    if first {
        if let Some(path) = &plan.input_file {
            match open(path.as_c_str(), OFlag::O_RDONLY, Mode::empty()) {
                Ok(fd) => redirect(fd, libc::STDIN_FILENO),
                Err(_) => fail(),
            }
        }
    } else {
        redirect(prev_input, libc::STDIN_FILENO);
    }

    if last {
        if let Some(path) = &plan.output_file {
            let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
            match open(path.as_c_str(), flags, Mode::from_bits_truncate(0o644)) {
                Ok(fd) => redirect(fd, libc::STDOUT_FILENO),
                Err(_) => fail(),
            }
        } else if plan.capture_output && unistd::dup2(capture_w, libc::STDOUT_FILENO).is_err() {
            fail();
        }
    } else if unistd::dup2(w, libc::STDOUT_FILENO).is_err() {
        fail();
    }

    let _ = unistd::close(r);
    let _ = unistd::close(w);
    let _ = unistd::close(capture_r);
    let _ = unistd::close(capture_w);

    let _ = unistd::execvp(stage.argv[0].as_c_str(), &stage.argv);
    exit_now(127)
}

fn redirect(fd: RawFd, target: RawFd) {
    if fd == target {
        return;
    }
    if unistd::dup2(fd, target).is_err() {
        fail();
    }
    let _ = unistd::close(fd);
}

fn fail() -> ! {
    exit_now(1)
}

/// `_exit`: a forked child must not run the parent's atexit handlers
/// or flush its inherited stdio buffers.
fn exit_now(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}
