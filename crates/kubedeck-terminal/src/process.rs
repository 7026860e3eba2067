// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Child process wrapper with graceful and forced termination.
//!
//! Each process runs in its own process group so that signals reach anything
//! kubectl starts (auth plugins, exec helpers) as well as kubectl itself.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{TerminalError, TerminalResult};

/// How a process left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
	/// Exited on its own; `None` when it was ended by a signal.
	Exited(Option<i32>),
	/// Killed after exceeding its deadline.
	TimedOut,
	/// Killed through its [`ProcessControl`] or the owning scope.
	Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
	AlreadyExited,
	/// Exited within the grace period after SIGINT.
	Graceful,
	/// Still alive after the grace period and force killed.
	Forced,
}

/// Cloneable remote control for a [`ManagedProcess`].
#[derive(Clone)]
pub struct ProcessControl {
	pid: Option<u32>,
	kill: CancellationToken,
	interrupted: Arc<AtomicBool>,
	exited: watch::Receiver<bool>,
}

impl ProcessControl {
	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	pub fn has_exited(&self) -> bool {
		*self.exited.borrow()
	}

	/// Whether an interrupt was requested at any point.
	pub fn was_interrupted(&self) -> bool {
		self.interrupted.load(Ordering::SeqCst)
	}

	/// Ask the process group to stop (SIGINT). Without unix signals this
	/// is a kill.
	pub fn signal_graceful(&self) -> io::Result<()> {
		self.interrupted.store(true, Ordering::SeqCst);

		#[cfg(unix)]
		{
			if let Some(pid) = self.pid {
				let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGINT) };
				if rc != 0 {
					return Err(io::Error::last_os_error());
				}
			}
			Ok(())
		}
		#[cfg(not(unix))]
		{
			self.kill();
			Ok(())
		}
	}

	/// Request a forced kill. The owner of the [`ManagedProcess`] performs
	/// it while waiting.
	pub fn kill(&self) {
		self.kill.cancel();
	}

	/// Resolves once the owner has observed the exit and reaped the process.
	pub async fn wait_exited(&self) {
		let mut rx = self.exited.clone();
		// A dropped sender means the process was dropped, and kill_on_drop
		// has already ended it.
		let _ = rx.wait_for(|exited| *exited).await;
	}

	/// SIGINT, wait up to `grace`, then force kill and wait for the exit.
	pub async fn interrupt(&self, grace: Duration) -> InterruptOutcome {
		if self.has_exited() {
			return InterruptOutcome::AlreadyExited;
		}

		if let Err(e) = self.signal_graceful() {
			debug!(pid = ?self.pid, error = %e, "graceful signal failed");
		}

		if tokio::time::timeout(grace, self.wait_exited()).await.is_ok() {
			return InterruptOutcome::Graceful;
		}

		debug!(pid = ?self.pid, grace_ms = grace.as_millis() as u64, "grace period elapsed, killing");
		self.kill();
		self.wait_exited().await;
		InterruptOutcome::Forced
	}
}

/// A running child process with piped output.
pub struct ManagedProcess {
	child: Child,
	control: ProcessControl,
	exited_tx: watch::Sender<bool>,
}

enum Wake {
	Exited(io::Result<ExitStatus>),
	Killed,
	TimedOut,
}

impl ManagedProcess {
	/// Spawn `program args..`. The kill token is a child of `scope`, so
	/// cancelling the scope kills the process.
	pub fn start(program: &Path, args: &[String], scope: &CancellationToken) -> TerminalResult<Self> {
		let mut cmd = Command::new(program);
		cmd.args(args)
			.env_remove("KUBECONFIG")
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		#[cfg(unix)]
		cmd.process_group(0);

		let child = cmd.spawn().map_err(|e| TerminalError::ProcessSpawn {
			message: format!("{}: {e}", program.display()),
		})?;

		let (exited_tx, exited_rx) = watch::channel(false);
		let control = ProcessControl {
			pid: child.id(),
			kill: scope.child_token(),
			interrupted: Arc::new(AtomicBool::new(false)),
			exited: exited_rx,
		};

		debug!(pid = ?control.pid, program = %program.display(), "process started");

		Ok(Self {
			child,
			control,
			exited_tx,
		})
	}

	pub fn control(&self) -> ProcessControl {
		self.control.clone()
	}

	pub fn take_stdout(&mut self) -> TerminalResult<ChildStdout> {
		self.child.stdout.take().ok_or_else(|| TerminalError::Pipe {
			message: "stdout not captured".to_string(),
		})
	}

	pub fn take_stderr(&mut self) -> TerminalResult<ChildStderr> {
		self.child.stderr.take().ok_or_else(|| TerminalError::Pipe {
			message: "stderr not captured".to_string(),
		})
	}

	/// Wait for the process, killing it when `deadline` elapses or a kill is
	/// requested. Always reaps the process before returning.
	pub async fn wait(&mut self, deadline: Option<Duration>) -> ProcessExit {
		let kill = self.control.kill.clone();
		let sleep = async {
			match deadline {
				Some(d) => tokio::time::sleep(d).await,
				None => std::future::pending().await,
			}
		};

		let wake = tokio::select! {
			status = self.child.wait() => Wake::Exited(status),
			_ = kill.cancelled() => Wake::Killed,
			_ = sleep => Wake::TimedOut,
		};

		let exit = match wake {
			Wake::Exited(Ok(status)) => ProcessExit::Exited(status.code()),
			Wake::Exited(Err(e)) => {
				warn!(pid = ?self.control.pid, error = %e, "wait on process failed");
				self.force_kill().await;
				ProcessExit::Killed
			}
			Wake::Killed => {
				self.force_kill().await;
				ProcessExit::Killed
			}
			Wake::TimedOut => {
				self.force_kill().await;
				ProcessExit::TimedOut
			}
		};

		let _ = self.exited_tx.send(true);
		exit
	}

	async fn force_kill(&mut self) {
		#[cfg(unix)]
		if let Some(pid) = self.control.pid {
			unsafe {
				libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
			}
		}
		if let Err(e) = self.child.kill().await {
			debug!(pid = ?self.control.pid, error = %e, "kill after exit");
		}
	}
}
