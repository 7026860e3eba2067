// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Line parsing and kubectl argv planning.

use std::path::Path;

/// Subcommands that never take a namespace.
const CLUSTER_SCOPED: &[&str] = &[
	"version",
	"cluster-info",
	"api-resources",
	"api-versions",
	"config",
	"completion",
	"explain",
	"plugin",
	"options",
	"certificate",
	"cordon",
	"uncordon",
	"drain",
	"taint",
];

/// Subcommands whose output is produced over time rather than all at once.
const STREAMING: &[&str] = &["exec", "attach", "port-forward", "proxy", "top"];

/// Global flags that take the following word as their value when written
/// without `=`.
const VALUED_GLOBAL_FLAGS: &[&str] = &[
	"-n",
	"--namespace",
	"--context",
	"-s",
	"--server",
	"--kubeconfig",
	"--cluster",
	"--user",
	"--token",
	"--as",
	"--as-group",
	"--as-uid",
	"--request-timeout",
	"--certificate-authority",
	"--client-certificate",
	"--client-key",
	"--tls-server-name",
	"--cache-dir",
	"--log-file",
	"--profile",
	"--profile-output",
	"-v",
	"--v",
	"--vmodule",
];

const WATCH_FLAGS: &[&str] = &["-w", "--watch", "--watch-only", "--watch=true"];
const FOLLOW_FLAGS: &[&str] = &["-f", "--follow", "--follow=true"];

pub const HELP_TEXT: &str = "\
Commands are passed to kubectl; the leading `kubectl` is optional.

  get pods                 list pods in the current namespace
  logs -f <pod>            stream logs until Ctrl+C
  ns                       show the current namespace
  ns <name>                switch namespace
  history                  show previous commands
  clear                    clear the screen
  help                     show this help

Ctrl+C interrupts the running command.
";

/// Commands handled by the broker without starting a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
	Clear,
	Help,
	History,
	ShowNamespace,
	SetNamespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
	Empty,
	Builtin(Builtin),
	/// kubectl arguments, without the `kubectl` prefix.
	Kubectl(Vec<String>),
}

pub fn parse_line(line: &str) -> ParsedLine {
	let mut tokens = tokenize(line);
	if tokens.is_empty() {
		return ParsedLine::Empty;
	}

	let builtin = match (tokens[0].as_str(), tokens.len()) {
		("clear", 1) => Some(Builtin::Clear),
		("help", 1) => Some(Builtin::Help),
		("history", 1) => Some(Builtin::History),
		("ns", 1) => Some(Builtin::ShowNamespace),
		("ns", 2) => Some(Builtin::SetNamespace(tokens[1].clone())),
		_ => None,
	};
	if let Some(builtin) = builtin {
		return ParsedLine::Builtin(builtin);
	}

	if tokens[0] == "kubectl" {
		tokens.remove(0);
	}
	ParsedLine::Kubectl(tokens)
}

/// Splits a line into words. Single quotes are literal, double quotes allow
/// `\"` and `\\`, and a backslash outside quotes escapes the next character.
/// An unterminated quote runs to the end of the line.
pub fn tokenize(line: &str) -> Vec<String> {
	#[derive(PartialEq)]
	enum Quote {
		None,
		Single,
		Double,
	}

	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut in_token = false;
	let mut quote = Quote::None;
	let mut chars = line.chars();

	while let Some(c) = chars.next() {
		match quote {
			Quote::Single => {
				if c == '\'' {
					quote = Quote::None;
				} else {
					current.push(c);
				}
			}
			Quote::Double => match c {
				'"' => quote = Quote::None,
				'\\' => match chars.next() {
					Some(next @ ('"' | '\\')) => current.push(next),
					Some(next) => {
						current.push('\\');
						current.push(next);
					}
					None => current.push('\\'),
				},
				_ => current.push(c),
			},
			Quote::None => match c {
				c if c.is_whitespace() => {
					if in_token {
						tokens.push(std::mem::take(&mut current));
						in_token = false;
					}
				}
				'\'' => {
					quote = Quote::Single;
					in_token = true;
				}
				'"' => {
					quote = Quote::Double;
					in_token = true;
				}
				'\\' => {
					if let Some(next) = chars.next() {
						current.push(next);
					}
					in_token = true;
				}
				_ => {
					current.push(c);
					in_token = true;
				}
			},
		}
	}

	if in_token {
		tokens.push(current);
	}
	tokens
}

/// A kubectl invocation ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
	/// Full argv after the program name.
	pub args: Vec<String>,
	/// Output should be forwarded as it is produced, with no deadline.
	pub streaming: bool,
	/// The namespace added with `-n`, if one was.
	pub injected_namespace: Option<String>,
}

impl CommandPlan {
	/// Every plan starts with `--kubeconfig <path>`; `-n <namespace>` follows
	/// unless the subcommand is cluster scoped or the user chose a namespace.
	/// Injected flags go before the user's words so they never land after `--`.
	pub fn build(tokens: &[String], namespace: &str, kubeconfig: &Path) -> Self {
		let mut args = vec![
			"--kubeconfig".to_string(),
			kubeconfig.to_string_lossy().into_owned(),
		];

		let injected_namespace = if needs_namespace(tokens) {
			args.push("-n".to_string());
			args.push(namespace.to_string());
			Some(namespace.to_string())
		} else {
			None
		};

		args.extend(tokens.iter().cloned());

		Self {
			args,
			streaming: is_streaming(tokens),
			injected_namespace,
		}
	}

	/// The argv as it is audited, with the credential path elided.
	pub fn display(&self) -> String {
		let mut parts = vec!["kubectl".to_string()];
		let mut args = self.args.iter();
		while let Some(arg) = args.next() {
			if arg == "--kubeconfig" {
				args.next();
				continue;
			}
			parts.push(arg.clone());
		}
		parts.join(" ")
	}
}

/// Words before a `--` separator; everything after belongs to another program.
fn own_flags(tokens: &[String]) -> &[String] {
	match tokens.iter().position(|t| t == "--") {
		Some(idx) => &tokens[..idx],
		None => tokens,
	}
}

fn has_namespace_flag(tokens: &[String]) -> bool {
	own_flags(tokens).iter().any(|t| {
		t == "-A"
			|| t == "--all-namespaces"
			|| t.starts_with("--all-namespaces=")
			|| t == "--namespace"
			|| t.starts_with("--namespace=")
			|| t.starts_with("-n")
	})
}

/// The first word that is neither a flag nor the value of a leading global
/// flag, so `-n kube-system logs -f web` resolves to `logs`.
fn subcommand(tokens: &[String]) -> Option<&str> {
	let mut words = own_flags(tokens).iter();
	while let Some(word) = words.next() {
		if !word.starts_with('-') {
			return Some(word.as_str());
		}
		if VALUED_GLOBAL_FLAGS.contains(&word.as_str()) {
			words.next();
		}
	}
	None
}

fn needs_namespace(tokens: &[String]) -> bool {
	let scoped = subcommand(tokens)
		.map(|s| CLUSTER_SCOPED.contains(&s))
		.unwrap_or(false);
	!scoped && !has_namespace_flag(tokens)
}

fn is_streaming(tokens: &[String]) -> bool {
	let Some(subcommand) = subcommand(tokens) else {
		return false;
	};
	let flags = own_flags(tokens);

	if STREAMING.contains(&subcommand) {
		return true;
	}
	if subcommand == "logs" && flags.iter().any(|t| FOLLOW_FLAGS.contains(&t.as_str())) {
		return true;
	}
	flags.iter().any(|t| WATCH_FLAGS.contains(&t.as_str()))
}

/// DNS-1123 label, the form Kubernetes requires for namespace names.
pub fn is_valid_namespace(name: &str) -> bool {
	let bytes = name.as_bytes();
	if bytes.is_empty() || bytes.len() > 63 {
		return false;
	}
	let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
	edge_ok(bytes[0])
		&& edge_ok(bytes[bytes.len() - 1])
		&& bytes.iter().all(|&b| edge_ok(b) || b == b'-')
}
