use anyhow::Result;
use sluice::{RevertTarget, Target};

use crate::utils::{ProjectArgs, execute, parse_target};

pub fn cmd_migrate(args: &ProjectArgs, to: Option<String>, dry_run: bool) -> Result<()> {
    let mut migrator = args.open()?;
    // `--to 0` means "before the first migration" under either scheme.
    let target = match to.as_deref() {
        Some(tag) if !tag.is_empty() && tag.bytes().all(|b| b == b'0') => {
            Target::Down(RevertTarget::All)
        }
        tag => Target::To(parse_target(&migrator, tag)?),
    };
    execute(&mut migrator, target, dry_run)
}
