mod check_url;
mod run;

use anyhow::Result;

use crate::config::MonitorConfig;
use crate::monitor::ExitStatus;

pub use run::RunOptions;

/// What a single invocation should do.
pub enum Command {
    Run(RunOptions),
    CheckUrl(String),
}

pub async fn dispatch(config: &MonitorConfig, command: Command) -> Result<ExitStatus> {
    match command {
        Command::Run(opts) => run::run(config, &opts).await,
        Command::CheckUrl(url) => check_url::check_url(config, &url).await,
    }
}
