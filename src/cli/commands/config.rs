//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::cli::commands::CommandContext;
use crate::error::ModcacheResult;

/// Execute the config command
pub async fn execute(args: ConfigArgs, ctx: &CommandContext) -> ModcacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => {
            println!("{}", toml::to_string_pretty(&ctx.config)?);
        }
        Some(ConfigAction::Path) => println!("{}", ctx.manager.path().display()),
    }
    Ok(())
}
