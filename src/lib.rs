pub mod category;
pub mod cli;
pub mod css_scanner;
pub mod downloader;
pub mod failures;
pub mod file_manager;
pub mod html_parser;
pub mod inline;
pub mod localizer;
pub mod mirror;
pub mod normalizer;
pub mod rewriter;

// Re-export main types for convenience
pub use category::AssetCategory;
pub use cli::LocalizeCommand;
pub use downloader::{Fetch, FetchError, HttpFetcher};
pub use failures::{FailureLedger, FailureRecord};
pub use file_manager::FileManager;
pub use html_parser::HtmlDocument;
pub use localizer::{LocalizeOptions, LocalizedPage, PageLocalizer, RunSummary};
pub use mirror::WgetMirror;
pub use rewriter::LocalAsset;
