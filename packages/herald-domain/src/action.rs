//! Target-status vocabulary.
//!
//! An [`Action`] names what a delivery announces (for example `live`) and which persisted status
//! values mean "already sent" and "failed". The sent value excludes a record from selection, and
//! so does the sent value of any later action sharing the same status column. Failed records are
//! picked up again by the next poll.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
	name: String,
	sent_status: String,
	failed_status: String,
	superseded_by: Vec<String>,
}
impl Action {
	/// `<name>:sent` / `<name>:failed`, the vocabulary used by the live event job.
	pub fn suffixed(name: &str) -> Self {
		Self::with_statuses(name, &format!("{name}:sent"), &format!("{name}:failed"))
	}

	pub fn with_statuses(name: &str, sent_status: &str, failed_status: &str) -> Self {
		Self {
			name: name.to_string(),
			sent_status: sent_status.to_string(),
			failed_status: failed_status.to_string(),
			superseded_by: Vec::new(),
		}
	}

	/// Marks `status` as a later terminal state. Records carrying it are no longer candidates
	/// and must not be overwritten by this action.
	pub fn superseded_by(mut self, status: &str) -> Self {
		self.superseded_by.push(status.to_string());

		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn sent_status(&self) -> &str {
		&self.sent_status
	}

	pub fn failed_status(&self) -> &str {
		&self.failed_status
	}

	pub fn superseding_statuses(&self) -> Vec<&str> {
		self.superseded_by.iter().map(String::as_str).collect()
	}

	/// Statuses that keep a record out of this action's selection.
	pub fn excluded_statuses(&self) -> Vec<&str> {
		let mut statuses = vec![self.sent_status.as_str()];

		statuses.extend(self.superseded_by.iter().map(String::as_str));

		statuses
	}

	pub fn status_for(&self, outcome: Outcome) -> &str {
		match outcome {
			Outcome::Sent => &self.sent_status,
			Outcome::Failed => &self.failed_status,
		}
	}

	pub fn is_terminal(&self, status: Option<&str>) -> bool {
		status.is_some_and(|status| self.excluded_statuses().contains(&status))
	}

	pub fn is_candidate(&self, status: Option<&str>) -> bool {
		!self.is_terminal(status)
	}

	/// Whether this action may replace `current`. A superseding status is never regressed.
	pub fn may_overwrite(&self, current: Option<&str>) -> bool {
		current.is_none_or(|current| !self.superseded_by.iter().any(|status| status == current))
	}
}
impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Sent,
	Failed,
}
