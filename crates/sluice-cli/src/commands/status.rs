use anyhow::{Result, bail};
use colored::Colorize;

use crate::utils::ProjectArgs;

pub fn cmd_status(args: &ProjectArgs) -> Result<()> {
    let migrator = args.open()?;
    let config = migrator.config();
    let snapshot = migrator.snapshot()?;
    let status = snapshot.planner().status();

    println!("{}", "Configuration:".bright_cyan().bold());
    println!(
        "  {} {}",
        "Database:".cyan(),
        config.database().display().to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Migrations directory:".cyan(),
        config.migrations_dir().display().to_string().bright_white()
    );
    println!("  {} {}", "Version scheme:".cyan(), config.scheme().as_str().bright_white());
    println!();

    println!(
        "{} {}",
        "Applied migrations:".bright_cyan().bold(),
        status.applied.len().to_string().bright_yellow()
    );
    for (record, script) in &status.applied {
        let marker = if script.is_some() { "" } else { " (script missing)" };
        println!(
            "  {} {} {}{}",
            record.version.to_string().bright_magenta(),
            record.name.bright_white(),
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed(),
            marker.red()
        );
    }
    println!();

    println!(
        "{} {}",
        "Pending migrations:".bright_cyan().bold(),
        status.pending.len().to_string().bright_yellow()
    );
    for script in &status.pending {
        println!("  {} {}", script.version.to_string().bright_magenta(), script.name.bright_white());
    }

    if !status.ignored.is_empty() {
        println!();
        println!(
            "{} {}",
            "Ignored (older than the latest applied):".yellow().bold(),
            status.ignored.len().to_string().bright_yellow()
        );
        for script in &status.ignored {
            println!("  {} {}", script.version.to_string().yellow(), script.name);
        }
    }

    if !status.is_consistent() {
        println!();
        println!("{}", "Consistency issues:".bright_red().bold());
        for issue in &status.issues {
            println!("  {} {}", "-".red(), issue);
        }
        bail!("{} consistency issue(s) found", status.issues.len());
    }

    println!();
    if status.is_up_to_date() {
        println!("{}", "Database is up to date.".bright_green());
    }
    Ok(())
}
