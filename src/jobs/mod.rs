//! Job manager: pipelines tracked as jobs.
//!
//! Every pipeline runs under a leader process that owns a dedicated
//! process group, so one SIGKILL can take down the whole pipeline.
//! Status changes and captured output arrive asynchronously: a watcher
//! thread blocks on SIGCHLD and SIGIO, reaps leaders, classifies their
//! exit, and drains capture pipes. The job table sits behind a mutex
//! shared with that thread; the paired condition variable wakes
//! `wait` and `pause` without busy-waiting or lost wakeups.

mod launch;

use crate::error::JushError;
use crate::parser::ast::Pipeline;
use crate::store::VarStore;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use signal_hook::consts::signal::{SIGCHLD, SIGIO};
use signal_hook::iterator::Signals;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    New,
    Running,
    Completed,
    Aborted,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Aborted => "aborted",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Completed, aborted and canceled jobs never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Aborted | JobStatus::Canceled
        )
    }
}

/// One tracked pipeline, owned by the job table from `run` to `expunge`.
#[derive(Debug)]
struct Job {
    id: u32,
    pgid: Pid,
    status: JobStatus,
    exit_status: Option<WaitStatus>,
    capture_fd: Option<OwnedFd>,
    pipeline: Pipeline,
    captured_output: Option<Vec<u8>>,
    cancel_requested: bool,
}

#[derive(Debug, Default)]
struct JobTable {
    jobs: Vec<Job>,
    next_id: u32,
    /// Bumped on every watcher pass; `pause` sleeps until it moves.
    events: u64,
}

impl JobTable {
    fn find(&self, id: u32) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    fn find_mut(&mut self, id: u32) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    /// Record the termination of a reaped child.
    ///
    /// Only leaders match a job's pgid; a pid nobody knows belonged to
    /// a stage, which its leader reaps, and is discarded here.
    fn note_child_exit(&mut self, pid: Pid, status: WaitStatus) {
        let Some(job) = self
            .jobs
            .iter_mut()
            .find(|job| job.pgid == pid && !job.status.is_terminal())
        else {
            return;
        };
        job.exit_status = Some(status);
        job.status = match status {
            WaitStatus::Exited(_, 0) => JobStatus::Completed,
            WaitStatus::Signaled(_, Signal::SIGKILL, _) if job.cancel_requested => {
                JobStatus::Canceled
            }
            _ => JobStatus::Aborted,
        };
        // Final drain: the last SIGIO may have coalesced with the
        // SIGCHLD that brought us here.
        drain_capture(job);
    }
}

/// Non-blocking drain of a job's capture pipe into its output buffer.
/// End-of-file leaves the fd open; expunge closes it.
fn drain_capture(job: &mut Job) {
    let Some(fd) = &job.capture_fd else {
        return;
    };
    let fd = fd.as_raw_fd();
    let mut buf = [0u8; 4096];
    loop {
        match unistd::read(fd, &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if let Some(output) = &mut job.captured_output {
                    output.extend_from_slice(&buf[..n]);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}

struct Shared {
    table: Mutex<JobTable>,
    cond: Condvar,
    initialized: AtomicBool,
}

impl Shared {
    /// SIGCHLD: coalescing reap loop, one pass for any number of
    /// pending terminations.
    fn handle_sigchld(&self) {
        let mut table = self.table.lock().unwrap();
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    if let Some(pid) = status.pid() {
                        table.note_child_exit(pid, status);
                    }
                }
                Err(_) => break,
            }
        }
        table.events += 1;
        drop(table);
        self.cond.notify_all();
    }

    /// SIGIO: some capture pipe became readable.
    fn handle_sigio(&self) {
        let mut table = self.table.lock().unwrap();
        for job in &mut table.jobs {
            drain_capture(job);
        }
        table.events += 1;
        drop(table);
        self.cond.notify_all();
    }
}

/// Process-wide job table with an asynchronous signal watcher.
pub struct JobManager {
    shared: Arc<Shared>,
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(JobTable::default()),
                cond: Condvar::new(),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Install the SIGCHLD/SIGIO watcher. Must be called exactly once
    /// before any other operation.
    pub fn init(&self) -> Result<(), JushError> {
        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            return Err(JushError::AlreadyInitialized);
        }
        // A manager whose watcher failed to install is still
        // uninitialized: clear the flag so init can be retried and so
        // wait/pause cannot block on a condvar nothing will signal.
        match self.spawn_watcher() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.initialized.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn spawn_watcher(&self) -> Result<(), JushError> {
        let mut signals = Signals::new([SIGCHLD, SIGIO])?;
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("jush-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    match signal {
                        SIGCHLD => shared.handle_sigchld(),
                        SIGIO => shared.handle_sigio(),
                        _ => {}
                    }
                }
            })?;
        Ok(())
    }

    /// Cancel and wait out every live job, then expunge everything.
    pub fn fini(&self) -> Result<(), JushError> {
        self.ensure_init()?;
        let ids: Vec<u32> = {
            let table = self.shared.table.lock().unwrap();
            table.jobs.iter().map(|job| job.id).collect()
        };
        for id in ids {
            if self.poll(id).is_err() {
                match self.cancel(id) {
                    Ok(()) => {}
                    // The leader may have died between the poll and
                    // the kill; wait picks the status up either way.
                    Err(JushError::JobTerminated(_))
                    | Err(JushError::AlreadyCanceled(_))
                    | Err(JushError::Sys(Errno::ESRCH)) => {}
                    Err(e) => return Err(e),
                }
                self.wait(id)?;
            }
            self.expunge(id)?;
        }
        Ok(())
    }

    /// Launch a pipeline asynchronously; returns the new job id.
    ///
    /// Argument expressions are evaluated against `vars` before the
    /// fork. The pipeline is deep-copied into the job record.
    pub fn run(&self, pipeline: &Pipeline, vars: &VarStore) -> Result<u32, JushError> {
        self.ensure_init()?;
        let plan = launch::ExecPlan::prepare(pipeline, vars)?;

        // Fork and publish under the table lock: the watcher takes the
        // same lock before reaping, so a leader that dies instantly
        // still finds its record in place.
        let mut table = self.shared.table.lock().unwrap();

        // The capture pipe exists whether or not output is captured;
        // the unused case is closed right after the fork.
        let (capture_r, capture_w) = launch::pipe_raw()?;
        let leader = match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => launch::exec_leader(&plan, capture_r, capture_w),
            Ok(ForkResult::Parent { child }) => child,
            Err(errno) => {
                let _ = unistd::close(capture_r);
                let _ = unistd::close(capture_w);
                return Err(errno.into());
            }
        };

        unistd::close(capture_w)?;
        let capture_fd = if pipeline.capture_output {
            if let Err(e) = launch::set_async(capture_r) {
                let _ = unistd::close(capture_r);
                return Err(e);
            }
            Some(unsafe { OwnedFd::from_raw_fd(capture_r) })
        } else {
            unistd::close(capture_r)?;
            None
        };

        let id = table.next_id;
        table.next_id += 1;
        let mut job = Job {
            id,
            pgid: leader,
            status: JobStatus::New,
            exit_status: None,
            captured_output: capture_fd.as_ref().map(|_| Vec::new()),
            capture_fd,
            pipeline: pipeline.clone(),
            cancel_requested: false,
        };
        job.status = JobStatus::Running;
        table.jobs.push(job);
        Ok(id)
    }

    /// Block until the job reaches a terminal status; returns the
    /// leader's wait status. Idempotent once terminal.
    pub fn wait(&self, id: u32) -> Result<WaitStatus, JushError> {
        self.ensure_init()?;
        let mut table = self.shared.table.lock().unwrap();
        loop {
            let job = table.find(id).ok_or(JushError::UnknownJob(id))?;
            if job.status.is_terminal() {
                if let Some(status) = job.exit_status {
                    return Ok(status);
                }
            }
            table = self.shared.cond.wait(table).unwrap();
        }
    }

    /// Non-blocking probe for a terminal status.
    pub fn poll(&self, id: u32) -> Result<WaitStatus, JushError> {
        self.ensure_init()?;
        let table = self.shared.table.lock().unwrap();
        let job = table.find(id).ok_or(JushError::UnknownJob(id))?;
        match (job.status.is_terminal(), job.exit_status) {
            (true, Some(status)) => Ok(status),
            _ => Err(JushError::JobNotTerminated(id)),
        }
    }

    /// Request cancellation: SIGKILL to the whole process group.
    ///
    /// The job stays running until the termination event arrives; a
    /// second cancel of the same job is an error.
    pub fn cancel(&self, id: u32) -> Result<(), JushError> {
        self.ensure_init()?;
        let mut table = self.shared.table.lock().unwrap();
        let job = table.find_mut(id).ok_or(JushError::UnknownJob(id))?;
        if job.status.is_terminal() {
            return Err(JushError::JobTerminated(id));
        }
        if job.cancel_requested {
            return Err(JushError::AlreadyCanceled(id));
        }
        killpg(job.pgid, Signal::SIGKILL)?;
        job.cancel_requested = true;
        Ok(())
    }

    /// Remove a terminated job, closing its capture fd and freeing the
    /// pipeline copy and captured output.
    pub fn expunge(&self, id: u32) -> Result<(), JushError> {
        self.ensure_init()?;
        let mut table = self.shared.table.lock().unwrap();
        let index = table
            .jobs
            .iter()
            .position(|job| job.id == id)
            .ok_or(JushError::UnknownJob(id))?;
        if !table.jobs[index].status.is_terminal() {
            return Err(JushError::JobNotTerminated(id));
        }
        table.jobs.remove(index);
        Ok(())
    }

    /// Captured output accumulated so far, if the job captures at all.
    /// Gone after expunge.
    pub fn get_output(&self, id: u32) -> Option<Vec<u8>> {
        let table = self.shared.table.lock().unwrap();
        table.find(id).and_then(|job| job.captured_output.clone())
    }

    /// Block until the watcher processes the next status or output
    /// event. Lets the dispatcher idle without spinning.
    pub fn pause(&self) -> Result<(), JushError> {
        self.ensure_init()?;
        let table = self.shared.table.lock().unwrap();
        let seen = table.events;
        let _table = self
            .shared
            .cond
            .wait_while(table, |t| t.events == seen)
            .unwrap();
        Ok(())
    }

    /// One line per job: `<id>\t<pgid>\t<status>\t<pipeline>`.
    pub fn show(&self, out: &mut dyn Write) -> io::Result<()> {
        let table = self.shared.table.lock().unwrap();
        for job in &table.jobs {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                job.id,
                job.pgid,
                job.status.as_str(),
                job.pipeline
            )?;
        }
        Ok(())
    }

    fn ensure_init(&self) -> Result<(), JushError> {
        if self.shared.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(JushError::NotInitialized)
        }
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Classic wait-status encoding of a reaped status, for display.
pub fn status_raw(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => (code & 0xff) << 8,
        WaitStatus::Signaled(_, signal, core) => signal as i32 | if core { 0x80 } else { 0 },
        WaitStatus::Stopped(_, signal) => ((signal as i32) << 8) | 0x7f,
        _ => -1,
    }
}
