// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The terminal session broker.
//!
//! A connection is handled in two steps. [`TerminalBroker::prepare`] runs
//! before the transport is upgraded: it resolves the namespace, consults the
//! permission gate and opens the audit session. [`TerminalBroker::run`] then
//! owns the upgraded connection, expressed as a pair of channels, until it
//! closes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kubedeck_audit::{
	AuditRecorder, CloseReason, CommandOutcome, CommandRecord, SessionAuditInfo,
};
use kubedeck_cluster::{ClusterHandle, ClusterRegistry, ConnectionFactory};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::command::{
	is_valid_namespace, parse_line, Builtin, CommandPlan, ParsedLine, HELP_TEXT,
};
use crate::credentials::CredentialFile;
use crate::error::{TerminalError, TerminalResult};
use crate::executor::{self, ExecutionLimits};
use crate::permission::{AllowAll, PermissionGate};
use crate::process::ManagedProcess;
use crate::protocol::{ClientMessage, TerminalMessage};
use crate::registry::SessionRegistry;
use crate::session::{RunningCommand, Session, SessionParams, DEFAULT_HISTORY_LIMIT};

/// How long to wait for a command task to publish its result after its
/// process is gone.
const FINISH_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone)]
pub struct TerminalConfig {
	pub kubectl_path: PathBuf,
	/// Deadline for non-streaming commands.
	pub command_timeout: Duration,
	/// Time between SIGINT and SIGKILL on interrupt.
	pub interrupt_grace: Duration,
	pub history_limit: usize,
	pub default_namespace: String,
	/// Where session kubeconfigs are written. `None` uses the system temp dir.
	pub credential_dir: Option<PathBuf>,
	pub audit_output_limit: usize,
	/// Check the API server answers before accepting a session.
	pub verify_connection: bool,
	/// Bound on that check.
	pub connect_timeout: Duration,
}

impl Default for TerminalConfig {
	fn default() -> Self {
		Self {
			kubectl_path: PathBuf::from("kubectl"),
			command_timeout: Duration::from_secs(60),
			interrupt_grace: Duration::from_secs(2),
			history_limit: DEFAULT_HISTORY_LIMIT,
			default_namespace: DEFAULT_NAMESPACE.to_string(),
			credential_dir: None,
			audit_output_limit: 64 * 1024,
			verify_connection: true,
			connect_timeout: Duration::from_secs(10),
		}
	}
}

/// Parameters of an incoming terminal connection.
#[derive(Debug, Clone)]
pub struct SessionRequest {
	pub cluster_id: String,
	pub namespace: Option<String>,
	pub user: String,
	pub remote_addr: Option<String>,
}

/// A request that passed the pre-upgrade checks.
#[derive(Debug, Clone)]
pub struct PendingSession {
	audit_session_id: String,
	info: SessionAuditInfo,
}

impl PendingSession {
	pub fn audit_session_id(&self) -> &str {
		&self.audit_session_id
	}

	pub fn cluster_id(&self) -> &str {
		&self.info.cluster_id
	}

	pub fn namespace(&self) -> &str {
		&self.info.namespace
	}
}

/// One frame read from the client transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
	Text(String),
	Close,
	/// The transport failed; the session tears down.
	Error(String),
}

#[derive(Clone)]
struct Outbound(mpsc::Sender<TerminalMessage>);

impl Outbound {
	async fn send(&self, message: TerminalMessage) -> TerminalResult<()> {
		self.0.send(message).await.map_err(|_| TerminalError::Transport)
	}

	fn sender(&self) -> &mpsc::Sender<TerminalMessage> {
		&self.0
	}
}

#[derive(Clone)]
pub struct TerminalBroker {
	clusters: Arc<dyn ClusterRegistry>,
	connections: ConnectionFactory,
	audit: Arc<dyn AuditRecorder>,
	permissions: Arc<dyn PermissionGate>,
	sessions: Arc<SessionRegistry>,
	config: Arc<TerminalConfig>,
	shutdown: CancellationToken,
}

impl TerminalBroker {
	pub fn new(
		clusters: Arc<dyn ClusterRegistry>,
		audit: Arc<dyn AuditRecorder>,
		sessions: Arc<SessionRegistry>,
		config: TerminalConfig,
	) -> Self {
		Self {
			clusters,
			connections: ConnectionFactory::new(),
			audit,
			permissions: Arc::new(AllowAll),
			sessions,
			config: Arc::new(config),
			shutdown: CancellationToken::new(),
		}
	}

	pub fn with_permissions(mut self, permissions: Arc<dyn PermissionGate>) -> Self {
		self.permissions = permissions;
		self
	}

	pub fn sessions(&self) -> &Arc<SessionRegistry> {
		&self.sessions
	}

	pub fn config(&self) -> &TerminalConfig {
		&self.config
	}

	/// Ends every session, current and future.
	pub async fn shutdown(&self) {
		self.shutdown.cancel();
		self.sessions.cancel_all().await;
	}

	/// Checks that run before the connection is upgraded.
	#[instrument(skip(self, request), fields(cluster_id = %request.cluster_id, user = %request.user))]
	pub async fn prepare(&self, request: SessionRequest) -> TerminalResult<PendingSession> {
		let namespace = request
			.namespace
			.filter(|ns| !ns.is_empty())
			.unwrap_or_else(|| self.config.default_namespace.clone());
		if !is_valid_namespace(&namespace) {
			return Err(TerminalError::InvalidNamespace { namespace });
		}

		self.permissions
			.authorize(&request.user, &request.cluster_id, &namespace)
			.await?;

		let info = SessionAuditInfo {
			user: request.user,
			cluster_id: request.cluster_id,
			namespace,
			remote_addr: request.remote_addr,
		};

		let audit_session_id = match self.audit.create_session(&info).await {
			Ok(id) => id,
			Err(e) => {
				warn!(error = %e, "audit session not recorded");
				uuid::Uuid::new_v4().to_string()
			}
		};

		Ok(PendingSession {
			audit_session_id,
			info,
		})
	}

	/// The upgrade failed after [`prepare`](Self::prepare); marks the audit
	/// session errored.
	pub fn abort(&self, pending: PendingSession, error: impl ToString) {
		let reason = CloseReason::UpgradeFailed(error.to_string());
		warn!(audit_session_id = %pending.audit_session_id, %reason, "terminal upgrade failed");
		self.audit
			.close_session(&pending.audit_session_id, &pending.info, reason);
	}

	/// Serve one upgraded connection until it closes.
	#[instrument(
		skip_all,
		fields(cluster_id = %pending.info.cluster_id, audit_session_id = %pending.audit_session_id)
	)]
	pub async fn run(
		&self,
		pending: PendingSession,
		mut inbound: mpsc::Receiver<InboundFrame>,
		outbound: mpsc::Sender<TerminalMessage>,
	) -> CloseReason {
		let out = Outbound(outbound);

		let session = match self.open_session(&pending).await {
			Ok(session) => Arc::new(session),
			Err(e) => {
				warn!(error = %e, "terminal session failed to open");
				let _ = out.send(TerminalMessage::error(e.user_message())).await;
				let reason = CloseReason::ConnectFailed(e.to_string());
				self.audit
					.close_session(&pending.audit_session_id, &pending.info, reason.clone());
				return reason;
			}
		};

		self.sessions.insert(session.clone()).await;
		info!(session_id = %session.id(), user = %session.user(), "terminal session opened");

		let reason = match self.greet(&session, &out).await {
			Ok(()) => self.read_loop(&session, &mut inbound, &out).await,
			Err(_) => CloseReason::TransportError("client went away before greeting".to_string()),
		};

		self.teardown(&session, reason.clone()).await;
		reason
	}

	async fn open_session(&self, pending: &PendingSession) -> TerminalResult<Session> {
		let cluster = self.clusters.get_cluster(&pending.info.cluster_id).await?;
		if self.config.verify_connection {
			let timeout = self.config.connect_timeout;
			tokio::time::timeout(timeout, self.connections.connect(&cluster))
				.await
				.map_err(|_| TerminalError::Connection {
					message: format!("cluster {} did not respond within {timeout:?}", cluster.id),
				})??;
		}

		let kubeconfig = self.connections.kubeconfig_for(&cluster);
		let credentials = CredentialFile::write(self.config.credential_dir.as_deref(), &kubeconfig)?;

		Ok(Session::new(
			SessionParams {
				cluster_id: cluster.id.clone(),
				cluster_name: display_name(&cluster),
				user: pending.info.user.clone(),
				remote_addr: pending.info.remote_addr.clone(),
				namespace: pending.info.namespace.clone(),
				audit_session_id: pending.audit_session_id.clone(),
				history_limit: self.config.history_limit,
			},
			credentials,
			self.shutdown.child_token(),
		))
	}

	async fn greet(&self, session: &Session, out: &Outbound) -> TerminalResult<()> {
		out.send(TerminalMessage::output(format!(
			"Connected to cluster {} ({})\r\n",
			session.cluster_name(),
			session.cluster_id()
		)))
		.await?;
		out.send(TerminalMessage::output(format!(
			"Namespace: {}\r\n",
			session.namespace()
		)))
		.await?;
		out.send(TerminalMessage::command_result()).await
	}

	async fn read_loop(
		&self,
		session: &Arc<Session>,
		inbound: &mut mpsc::Receiver<InboundFrame>,
		out: &Outbound,
	) -> CloseReason {
		loop {
			let frame = tokio::select! {
				_ = session.scope().cancelled() => return CloseReason::Shutdown,
				frame = inbound.recv() => frame,
			};

			let text = match frame {
				None | Some(InboundFrame::Close) => return CloseReason::ClientClosed,
				Some(InboundFrame::Error(e)) => return CloseReason::TransportError(e),
				Some(InboundFrame::Text(text)) => text,
			};

			let result = match ClientMessage::parse(&text) {
				Ok(message) => self.handle_message(session, message, out).await,
				Err(e) => self.report(session, out, e).await,
			};

			if let Err(e) = result {
				if e.is_fatal() {
					return CloseReason::TransportError(e.to_string());
				}
				// Errors are reported by the handlers; anything left is logged.
				debug!(session_id = %session.id(), error = %e, "message handling failed");
			}
		}
	}

	async fn handle_message(
		&self,
		session: &Arc<Session>,
		message: ClientMessage,
		out: &Outbound,
	) -> TerminalResult<()> {
		match message {
			ClientMessage::Input(keys) => {
				let echo = {
					let mut state = session.state();
					if state.running.is_some() {
						return Ok(());
					}
					state.buffer.apply(&keys)
				};
				if !echo.is_empty() {
					out.send(TerminalMessage::output(echo)).await?;
				}
				Ok(())
			}
			ClientMessage::Command => {
				let line = session.state().buffer.take();
				out.send(TerminalMessage::output("\r\n")).await?;
				self.dispatch(session, line, out).await
			}
			ClientMessage::QuickCommand(line) => {
				session.state().buffer.clear();
				self.dispatch(session, line, out).await
			}
			ClientMessage::Interrupt => self.interrupt(session, out).await,
			ClientMessage::ChangeNamespace(namespace) => self.change_namespace(session, namespace, out).await,
		}
	}

	/// Send an error, then re-prompt unless a command still holds the session.
	async fn report(&self, session: &Session, out: &Outbound, error: TerminalError) -> TerminalResult<()> {
		debug!(session_id = %session.id(), error = %error, "reporting terminal error");
		out.send(TerminalMessage::error(error.user_message())).await?;
		if !session.is_running() {
			out.send(TerminalMessage::command_result()).await?;
		}
		Ok(())
	}

	async fn dispatch(&self, session: &Arc<Session>, line: String, out: &Outbound) -> TerminalResult<()> {
		if session.is_running() {
			return self.report(session, out, TerminalError::Busy).await;
		}

		let line = line.trim().to_string();
		if line.is_empty() {
			return out.send(TerminalMessage::command_result()).await;
		}
		session.state().history.push(line.clone());

		match parse_line(&line) {
			ParsedLine::Empty => out.send(TerminalMessage::command_result()).await,
			ParsedLine::Builtin(builtin) => self.run_builtin(session, &line, builtin, out).await,
			ParsedLine::Kubectl(tokens) => self.start_command(session, line, &tokens, out).await,
		}
	}

	async fn run_builtin(
		&self,
		session: &Session,
		line: &str,
		builtin: Builtin,
		out: &Outbound,
	) -> TerminalResult<()> {
		match builtin {
			Builtin::Clear => out.send(TerminalMessage::clear()).await?,
			Builtin::Help => out.send(TerminalMessage::output(crate::protocol::to_crlf(HELP_TEXT))).await?,
			Builtin::History => {
				let listing = session.state().history.render();
				out.send(TerminalMessage::output(listing)).await?;
			}
			Builtin::ShowNamespace => {
				out.send(TerminalMessage::output(format!("{}\r\n", session.namespace())))
					.await?;
			}
			Builtin::SetNamespace(namespace) => {
				if let Err(e) = self.set_namespace(session, namespace, out).await {
					return if e.is_fatal() {
						Err(e)
					} else {
						self.report(session, out, e).await
					};
				}
			}
		}

		self.audit.record_command(
			session.audit_session_id(),
			&session.audit_info(),
			CommandRecord {
				input: line.to_string(),
				normalized: line.to_string(),
				namespace: session.namespace(),
				output: String::new(),
				outcome: CommandOutcome::Builtin,
				exit_code: None,
				duration_ms: 0,
			},
		);

		out.send(TerminalMessage::command_result()).await
	}

	async fn set_namespace(&self, session: &Session, namespace: String, out: &Outbound) -> TerminalResult<()> {
		if !is_valid_namespace(&namespace) {
			return Err(TerminalError::InvalidNamespace { namespace });
		}
		session.state().namespace = namespace.clone();
		debug!(session_id = %session.id(), %namespace, "namespace changed");
		out.send(TerminalMessage::namespace_changed(namespace)).await
	}

	async fn change_namespace(&self, session: &Session, namespace: String, out: &Outbound) -> TerminalResult<()> {
		match self.set_namespace(session, namespace, out).await {
			Err(e) if !e.is_fatal() => self.report(session, out, e).await,
			other => other,
		}
	}

	async fn start_command(
		&self,
		session: &Arc<Session>,
		line: String,
		tokens: &[String],
		out: &Outbound,
	) -> TerminalResult<()> {
		let namespace = session.namespace();
		let plan = CommandPlan::build(tokens, &namespace, session.credentials().path());

		let process = match ManagedProcess::start(&self.config.kubectl_path, &plan.args, session.scope()) {
			Ok(process) => process,
			Err(e) => {
				warn!(session_id = %session.id(), error = %e, "command failed to start");
				self.audit.record_command(
					session.audit_session_id(),
					&session.audit_info(),
					CommandRecord {
						input: line,
						normalized: plan.display(),
						namespace,
						output: String::new(),
						outcome: CommandOutcome::SpawnFailed,
						exit_code: None,
						duration_ms: 0,
					},
				);
				return self.report(session, out, e).await;
			}
		};

		let (finished_tx, finished_rx) = watch::channel(false);
		let command_id = {
			let mut state = session.state();
			let id = state.next_command_id();
			state.running = Some(RunningCommand {
				id,
				line: line.clone(),
				control: process.control(),
				finished: finished_rx,
				task: None,
			});
			id
		};

		debug!(
			session_id = %session.id(),
			command_id,
			command = %plan.display(),
			streaming = plan.streaming,
			"command started"
		);

		let task = tokio::spawn(self.clone().command_task(
			session.clone(),
			command_id,
			line,
			plan,
			process,
			out.clone(),
			finished_tx,
		));

		if let Some(running) = session.state().running.as_mut() {
			if running.id == command_id {
				running.task = Some(task);
			}
		}
		Ok(())
	}

	#[allow(clippy::too_many_arguments)]
	async fn command_task(
		self,
		session: Arc<Session>,
		command_id: u64,
		line: String,
		plan: CommandPlan,
		process: ManagedProcess,
		out: Outbound,
		finished: watch::Sender<bool>,
	) {
		let started = Instant::now();
		let limits = ExecutionLimits {
			timeout: self.config.command_timeout,
			audit_output_limit: self.config.audit_output_limit,
		};
		let namespace = plan
			.injected_namespace
			.clone()
			.unwrap_or_else(|| session.namespace());

		let report = executor::execute(process, plan.streaming, limits, out.sender()).await;
		let duration_ms = started.elapsed().as_millis() as u64;

		debug!(
			session_id = %session.id(),
			command_id,
			outcome = ?report.outcome,
			exit_code = ?report.exit_code,
			duration_ms,
			"command finished"
		);

		self.audit.record_command(
			session.audit_session_id(),
			&session.audit_info(),
			CommandRecord {
				input: line,
				normalized: plan.display(),
				namespace,
				output: report.output,
				outcome: report.outcome,
				exit_code: report.exit_code,
				duration_ms,
			},
		);

		let cleared = session.state().finish_command(command_id);
		if cleared {
			let _ = out.send(TerminalMessage::command_result()).await;
		}
		let _ = finished.send(true);
	}

	async fn interrupt(&self, session: &Session, out: &Outbound) -> TerminalResult<()> {
		let running = {
			let mut state = session.state();
			state.buffer.clear();
			state
				.running
				.as_ref()
				.map(|r| (r.id, r.control.clone(), r.finished.clone()))
		};

		out.send(TerminalMessage::output("^C\r\n")).await?;

		let Some((command_id, control, mut finished)) = running else {
			return out.send(TerminalMessage::command_result()).await;
		};

		let outcome = control.interrupt(self.config.interrupt_grace).await;
		debug!(session_id = %session.id(), command_id, ?outcome, "command interrupted");

		// The command task publishes command_result; only step in if it stalls.
		let published = tokio::time::timeout(FINISH_TIMEOUT, finished.wait_for(|done| *done))
			.await
			.is_ok();
		if !published {
			warn!(session_id = %session.id(), command_id, "command task did not finish, aborting");
			let task = {
				let mut state = session.state();
				let task = state.running.as_mut().and_then(|r| r.task.take());
				state.finish_command(command_id).then_some(task).flatten()
			};
			if let Some(task) = task {
				task.abort();
			}
			out.send(TerminalMessage::command_result()).await?;
		}
		Ok(())
	}

	/// Cancel the scope, wait for any command to die, delete credentials,
	/// deregister and close the audit session. Failures are logged only.
	async fn teardown(&self, session: &Session, reason: CloseReason) {
		session.scope().cancel();

		let running = session.state().running.take();
		if let Some(mut running) = running {
			let wait = self.config.interrupt_grace + FINISH_TIMEOUT;
			if tokio::time::timeout(wait, running.wait_finished()).await.is_err() {
				let e = TerminalError::SessionTeardown {
					message: format!("command {} did not stop", running.id),
				};
				warn!(session_id = %session.id(), error = %e, "aborting command task");
				if let Some(task) = running.task.take() {
					task.abort();
				}
			}
		}

		if let Err(e) = session.credentials().close() {
			warn!(session_id = %session.id(), error = %e, "credential cleanup failed");
		}

		self.sessions.remove(session.id()).await;
		self.audit
			.close_session(session.audit_session_id(), &session.audit_info(), reason.clone());

		info!(session_id = %session.id(), %reason, "terminal session closed");
	}
}

fn display_name(cluster: &ClusterHandle) -> String {
	if cluster.name.is_empty() {
		cluster.id.clone()
	} else {
		cluster.name.clone()
	}
}
