use anyhow::Result;
use colored::Colorize;
use sluice::ScriptLoader;

use crate::utils::ProjectArgs;

pub fn cmd_check(args: &ProjectArgs) -> Result<()> {
    let config = args.load()?;
    let loader = ScriptLoader::from_config(&config);

    let mut count = 0;
    let mut irreversible = Vec::new();
    for script in loader.scripts()? {
        let script = script?;
        if !script.body.is_reversible() {
            irreversible.push(script.label());
        }
        count += 1;
    }

    println!(
        "{} {} migration(s) in {}",
        "OK:".bright_green().bold(),
        count.to_string().bright_yellow(),
        loader.dir().display()
    );
    if !irreversible.is_empty() {
        println!(
            "  {} {}",
            "Without revert script:".yellow(),
            irreversible.join(", ")
        );
    }
    Ok(())
}
