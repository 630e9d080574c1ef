//! Project initialization — `qaforge init`.

use anyhow::Result;
use std::path::Path;

use qaforge::init::init_project;

pub fn cmd_init(project_dir: &Path, with_prompts: bool) -> Result<()> {
    let result = init_project(project_dir, with_prompts)?;

    if result.created {
        println!(
            "Initialized qaforge project at {}",
            result.qaforge_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .qaforge/");
        println!("  ├── qaforge.toml  # Generator and store settings");
        println!("  ├── runs/         # One directory per run");
        println!("  ├── prompts/      # Prompt overrides (<kind>.md)");
        println!("  └── logs/         # Daily log files");
        println!();
        println!("Next steps:");
        println!("  1. Set [generator] command in .qaforge/qaforge.toml");
        println!("  2. Run `qaforge intake <document>` to extract requirements");
        println!("  3. Run `qaforge risk` and `qaforge review`");
    } else {
        println!(
            "Project already initialized at {}",
            result.qaforge_dir.display()
        );
        println!("Directory structure verified.");
    }

    for path in &result.prompts_written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}
