use clap::Args;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Args, Clone, Debug)]
pub struct Log {
	/// The level to log at when RUST_LOG isn't set.
	#[arg(long = "log-level", env = "FRAMEFLOW_LOG_LEVEL", default_value = "info")]
	pub level: LevelFilter,
}

impl Log {
	pub fn init(&self) {
		let filter = EnvFilter::builder()
			.with_default_directive(self.level.into())
			.from_env_lossy();

		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.init();
	}
}
