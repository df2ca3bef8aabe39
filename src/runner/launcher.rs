//! Bounded execution of the external launcher
//!
//! The launcher runs through `sh -c` in its own process group so that a
//! timeout can take down every node process it spawned, not just the shell.
//! The group is also killed once the shell exits, so a node left running in
//! the background cannot hold the output pipes open past the bound.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output collection may run this far past the bound after a clean exit
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How one launcher invocation ended
#[derive(Debug)]
pub enum LaunchStatus {
    /// `code` is `None` when the shell was killed by a signal
    Exited { code: Option<i32>, output: String },
    TimedOut,
    Failed(std::io::Error),
}

/// The external launcher command
#[derive(Debug, Clone)]
pub struct Launcher {
    command: String,
}

impl Launcher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Rewrite relative path words of the command that exist under `base`
    /// as absolute paths, so the command works from any working directory
    pub fn resolved_against(&self, base: &Path) -> Self {
        let words: Vec<String> = self
            .command
            .split_whitespace()
            .map(|word| {
                let candidate = base.join(word);
                if Path::new(word).is_relative() && candidate.exists() {
                    candidate
                        .canonicalize()
                        .unwrap_or(candidate)
                        .to_string_lossy()
                        .into_owned()
                } else {
                    word.to_string()
                }
            })
            .collect();
        Self {
            command: words.join(" "),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Full shell command line for the given positional arguments
    pub fn command_line(&self, args: &[String]) -> String {
        let mut line = self.command.clone();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the launcher in `workdir`, killing its process group after `timeout`
    pub fn run(&self, workdir: &Path, args: &[String], timeout: Duration) -> LaunchStatus {
        let command_line = self.command_line(args);
        debug!("Launching `{}` in {}", command_line, workdir.display());

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return LaunchStatus::Failed(e),
        };

        let readers = OutputReaders::start(&mut child);
        let started = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    signal_group(pgid_of(&child));
                    let deadline = (started + timeout).max(Instant::now() + DRAIN_GRACE);
                    return LaunchStatus::Exited {
                        code: status.code(),
                        output: readers.collect(deadline),
                    };
                }
                Ok(None) if started.elapsed() >= timeout => {
                    kill_process_group(&mut child);
                    // readers of a killed group are left to finish on their own
                    drop(readers);
                    return LaunchStatus::TimedOut;
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_process_group(&mut child);
                    return LaunchStatus::Failed(e);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Background threads draining the child's stdout and stderr
struct OutputReaders {
    rx: Receiver<(Stream, String)>,
    pending: usize,
}

impl OutputReaders {
    fn start(child: &mut Child) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut pending = 0;
        if let Some(pipe) = child.stdout.take() {
            drain(pipe, Stream::Stdout, tx.clone());
            pending += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            drain(pipe, Stream::Stderr, tx);
            pending += 1;
        }
        Self { rx, pending }
    }

    /// Stdout followed by stderr. A stream still open at `deadline` is
    /// dropped and its reader thread detached.
    fn collect(self, deadline: Instant) -> String {
        let mut stdout = String::new();
        let mut stderr = String::new();
        for _ in 0..self.pending {
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(wait) {
                Ok((Stream::Stdout, text)) => stdout = text,
                Ok((Stream::Stderr, text)) => stderr = text,
                Err(_) => {
                    warn!("Launcher output still open at the deadline, discarding it");
                    break;
                }
            }
        }
        stdout.push_str(&stderr);
        stdout
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<(Stream, String)>) {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        // receiver is gone once the deadline passed
        let _ = tx.send((stream, String::from_utf8_lossy(&bytes).into_owned()));
    });
}

fn pgid_of(child: &Child) -> Pid {
    Pid::from_raw(child.id() as i32)
}

/// SIGKILL every process left in the group; an empty group is fine
fn signal_group(pgid: Pid) {
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

fn kill_process_group(child: &mut Child) {
    signal_group(pgid_of(child));
    let _ = child.wait();
}
