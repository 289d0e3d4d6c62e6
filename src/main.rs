use anyhow::Result;
use clap::Parser;
use colored::*;
use dialoguer::Input;
use std::time::Duration;

use page_localizer::localizer::default_log_dir;
use page_localizer::{HttpFetcher, LocalizeCommand, LocalizeOptions, PageLocalizer, WgetMirror};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = LocalizeCommand::parse();

    let url = match args.url {
        Some(url) => url,
        None => Input::<String>::new()
            .with_prompt("Website to clone")
            .interact_text()?,
    };
    let url = url.trim().to_string();

    println!("🚀 Localizing page: {}", url.blue());
    println!("📁 Output directory: {:?}", args.output_dir);

    if !args.skip_mirror {
        let mirror = WgetMirror::locate(&args.user_agent, args.wait)?;
        mirror.mirror_page(&url, &args.output_dir).await?;
    }

    let options = LocalizeOptions {
        log_dir: args
            .log_dir
            .clone()
            .unwrap_or_else(|| default_log_dir(&args.output_dir)),
        output_dir: args.output_dir.clone(),
        show_progress: !args.no_progress,
    };

    let fetcher = HttpFetcher::new(&args.user_agent, args.timeout.map(Duration::from_secs))?;
    let localizer = PageLocalizer::new(&url, fetcher, options)?;

    match localizer.run().await? {
        Some(summary) => {
            println!("📦 Localized resources: {}", summary.assets);
            if summary.failures == 0 {
                println!("{}", "✅ No missing resources".green());
            } else {
                println!(
                    "{} {}",
                    format!("⚠️  {} resources could not be downloaded, see", summary.failures).yellow(),
                    summary.report_path.display()
                );
            }
            println!("✅ Page saved to {}", summary.index_path.display());
        }
        None => {
            println!("{}", "⚠️  No index.html to localize; nothing was rewritten".yellow());
        }
    }

    Ok(())
}
