use anyhow::Result;
use colored::Colorize;

use crate::utils::ProjectArgs;

pub fn cmd_unlock(args: &ProjectArgs) -> Result<()> {
    let migrator = args.open()?;
    match migrator.unlock()? {
        Some(holder) => println!(
            "{} lock held by {} since {}",
            "Released".bright_green(),
            holder.owner.bright_white(),
            holder.acquired_at
        ),
        None => println!("{}", "No lock was held.".bright_green()),
    }
    Ok(())
}
