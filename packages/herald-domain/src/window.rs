use time::{Duration, OffsetDateTime};

/// Inclusive time range used to decide which records are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionWindow {
	pub start: OffsetDateTime,
	pub end: OffsetDateTime,
}
impl SelectionWindow {
	/// `[now - half_width, now + half_width]`. Consecutive polls overlap whenever the poll
	/// interval is shorter than the window, so a record is seen by several runs.
	pub fn around(now: OffsetDateTime, half_width: Duration) -> Self {
		Self { start: now - half_width, end: now + half_width }
	}

	/// `[now - horizon, now]`, for records that are due once their time has passed.
	pub fn trailing(now: OffsetDateTime, horizon: Duration) -> Self {
		Self { start: now - horizon, end: now }
	}

	pub fn contains(&self, at: OffsetDateTime) -> bool {
		self.start <= at && at <= self.end
	}
}
