pub mod run;
pub mod validate;

use crate::cli::args::{Cli, Command};
use crate::exit_codes;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::execute(args).await,
        Command::Validate(args) => validate::execute(&args),
        Command::Version => {
            println!("medbench {}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}
