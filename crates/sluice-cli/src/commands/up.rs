use anyhow::Result;
use sluice::Target;

use crate::utils::{ProjectArgs, execute, parse_target};

pub fn cmd_up(args: &ProjectArgs, target: Option<String>, dry_run: bool) -> Result<()> {
    let mut migrator = args.open()?;
    let target = parse_target(&migrator, target.as_deref())?;
    execute(&mut migrator, Target::Up(target), dry_run)
}
