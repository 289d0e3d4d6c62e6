use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::file_manager::FileManager;
use crate::html_parser::{get_node_attr, text_content, HtmlDocument};

/// Script `type` values that mark executable JavaScript. Anything else
/// (JSON-LD, templates, import maps) is data and stays inline.
const EXECUTABLE_SCRIPT_TYPES: &[&str] = &["", "text/javascript", "application/javascript"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InlineStats {
    pub styles: usize,
    pub scripts: usize,
}

/// Moves every `<style>` body to `css/inline-<n>.css` and every executable
/// inline `<script>` body to `js/inline-<n>.js`, leaving a reference behind.
pub fn extract_inline_resources(
    document: &mut HtmlDocument,
    file_manager: &FileManager,
) -> Result<InlineStats> {
    let mut stats = InlineStats::default();

    for (index, style) in document.find_elements("style").into_iter().enumerate() {
        let relative_path = format!("css/inline-{}.css", index + 1);
        file_manager.save_file(Path::new(&relative_path), text_content(&style).as_bytes())?;

        let href = format!("./{}", relative_path);
        let link = document.create_element("link", &[("rel", "stylesheet"), ("href", href.as_str())]);
        document.replace_node(&style, link);
        stats.styles += 1;
    }

    let inline_scripts = document
        .find_elements("script")
        .into_iter()
        .filter(|script| get_node_attr(script, "src").is_none());

    for script in inline_scripts {
        let script_type = get_node_attr(&script, "type").unwrap_or_default();
        if !is_executable_script_type(&script_type) {
            debug!("Keeping inline script of type {:?}", script_type);
            continue;
        }

        stats.scripts += 1;
        let relative_path = format!("js/inline-{}.js", stats.scripts);
        file_manager.save_file(Path::new(&relative_path), text_content(&script).as_bytes())?;

        let src = format!("./{}", relative_path);
        let replacement = document.create_element("script", &[("src", src.as_str())]);
        document.replace_node(&script, replacement);
    }

    Ok(stats)
}

fn is_executable_script_type(script_type: &str) -> bool {
    let script_type = script_type.trim().to_ascii_lowercase();
    EXECUTABLE_SCRIPT_TYPES.contains(&script_type.as_str())
}
