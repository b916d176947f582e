use clap::{
	Args,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

/// Whether a job runs a single pass or keeps polling.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct PassArgs {
	/// Run one pass and exit.
	#[arg(long, conflicts_with = "repeat")]
	pub once: bool,
	/// Keep running a pass every poll interval until interrupted.
	#[arg(long = "loop")]
	pub repeat: bool,
}
impl PassArgs {
	/// Explicit flags win over the job's default.
	pub fn looping(&self, default: bool) -> bool {
		match (self.once, self.repeat) {
			(true, _) => false,
			(_, true) => true,
			_ => default,
		}
	}
}
