pub mod action;
pub mod detail;
pub mod locator;
pub mod relays;
pub mod window;

pub use action::{Action, Outcome};
pub use window::SelectionWindow;

/// Maps blank strings to `None` so downstream code only sees meaningful values.
pub fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.trim().is_empty())
}
