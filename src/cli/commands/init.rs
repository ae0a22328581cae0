//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::CrawlRepository;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let existed = settings.database_exists();
    CrawlRepository::new(&settings.database_path())?;

    if existed {
        println!(
            "{} Database already present at {}",
            style("!").yellow(),
            settings.database_path().display()
        );
    }

    println!(
        "{} Initialized deckcrawl in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
