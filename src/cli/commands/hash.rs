//! Hash command - print the build-wide version hash

use crate::cache::compute_version_hash;
use crate::cli::args::HashArgs;
use crate::cli::commands::CommandContext;
use crate::error::ModcacheResult;
use tracing::debug;

/// Execute the hash command
pub async fn execute(args: HashArgs, ctx: &CommandContext) -> ModcacheResult<()> {
    let mut dependencies = ctx.settings.dependencies.clone();
    dependencies.extend(args.deps);
    debug!("Hashing with {} extra dependencies", dependencies.len());

    let hash = compute_version_hash(&ctx.settings.project_dir, &dependencies).await?;
    println!("{}", hash);
    Ok(())
}
