use clap::Parser;
use std::path::PathBuf;

use crate::downloader::DEFAULT_USER_AGENT;

#[derive(Parser, Debug)]
#[command(
    name = "page-localizer",
    about = "Turns a downloaded web page into a self-contained local bundle",
    version,
    long_about = "Mirrors a single page with wget, then pulls every inline and remote stylesheet, script, image, font and media file into local css/, js/ and asset/<category>/ folders and rewrites the page to use them. Resources that cannot be fetched are listed in a per-site log."
)]
pub struct LocalizeCommand {
    /// The URL of the page to localize (prompted for when omitted)
    pub url: Option<String>,

    /// Output directory for the bundle
    #[arg(short, long, default_value = "./dist")]
    pub output_dir: PathBuf,

    /// Directory for the missing-resource report (default: `log/` next to the output directory)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Timeout for resource requests in seconds (no timeout when omitted)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Seconds wget waits between requests while mirroring
    #[arg(long, default_value = "2")]
    pub wait: u64,

    /// Skip the wget step and localize the existing index.html
    #[arg(long)]
    pub skip_mirror: bool,

    /// Hide the download progress bar
    #[arg(long)]
    pub no_progress: bool,
}
