use anyhow::Result;
use sluice::{RevertTarget, Target};

use crate::utils::{ProjectArgs, execute, parse_target};

pub fn cmd_down(args: &ProjectArgs, target: Option<String>, all: bool, dry_run: bool) -> Result<()> {
    let mut migrator = args.open()?;
    let revert = if all {
        RevertTarget::All
    } else {
        match parse_target(&migrator, target.as_deref())? {
            Some(version) => RevertTarget::Through(version),
            None => RevertTarget::Latest,
        }
    };
    execute(&mut migrator, Target::Down(revert), dry_run)
}
