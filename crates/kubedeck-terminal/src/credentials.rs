// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{TerminalError, TerminalResult};

/// Per-session kubeconfig on disk.
///
/// Created owner-only (0600) and removed by [`CredentialFile::close`] or, on
/// any other exit path, when dropped.
pub struct CredentialFile {
	path: PathBuf,
	file: Mutex<Option<NamedTempFile>>,
}

impl CredentialFile {
	pub fn write(dir: Option<&Path>, contents: &str) -> TerminalResult<Self> {
		let mut builder = tempfile::Builder::new();
		builder.prefix("kubedeck-").suffix(".kubeconfig");

		let created = match dir {
			Some(dir) => builder.tempfile_in(dir),
			None => builder.tempfile(),
		};
		let mut file = created.map_err(|e| TerminalError::Connection {
			message: format!("failed to create credential file: {e}"),
		})?;

		file.write_all(contents.as_bytes())
			.and_then(|()| file.flush())
			.map_err(|e| TerminalError::Connection {
				message: format!("failed to write credential file: {e}"),
			})?;

		let path = file.path().to_path_buf();
		debug!(path = %path.display(), "credential file written");

		Ok(Self {
			path,
			file: Mutex::new(Some(file)),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Delete the file. Safe to call more than once.
	pub fn close(&self) -> TerminalResult<()> {
		let file = self
			.file
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.take();

		match file {
			Some(file) => file.close().map_err(|e| TerminalError::SessionTeardown {
				message: format!("failed to remove {}: {e}", self.path.display()),
			}),
			None => Ok(()),
		}
	}
}

impl std::fmt::Debug for CredentialFile {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CredentialFile")
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}
