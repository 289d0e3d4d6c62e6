use log::debug;
use markup5ever_rcdom::{Handle, NodeData};

use crate::html_parser::{element_name, find_elements_by, get_node_attr, HtmlDocument};

/// Tags that belong in `<head>`, in the order they are relocated.
const HEAD_TAGS: &[&str] = &["title", "meta", "link", "style", "base"];
const JSON_LD_TYPE: &str = "application/ld+json";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub comments_removed: usize,
    pub moved_to_head: usize,
    pub moved_to_body: usize,
}

/// Rebuilds the tree as exactly one `<html>` holding one `<head>` followed by
/// one `<body>`. Missing wrappers are created, duplicates are merged, head-only
/// tags are pulled into `<head>` and everything else stray lands in `<body>`.
/// Comments are dropped.
pub fn normalize_document(document: &mut HtmlDocument) -> NormalizeStats {
    let mut stats = NormalizeStats::default();
    let root = document.document();

    let mut comments = Vec::new();
    collect_comments(&root, &mut comments);
    for comment in &comments {
        document.detach(comment);
    }
    stats.comments_removed = comments.len();

    let html = merge_html_roots(document, &root);
    let (head, body) = merge_sections(document, &html, &mut stats);

    for tag_name in HEAD_TAGS {
        let misplaced = find_elements_by(&body, &|node: &Handle| element_name(node) == Some(*tag_name));
        for element in misplaced {
            document.append_child(&head, &element);
            stats.moved_to_head += 1;
        }
    }

    let json_ld = find_elements_by(&body, &|node: &Handle| {
        element_name(node) == Some("script")
            && get_node_attr(node, "type")
                .map(|t| t.trim().eq_ignore_ascii_case(JSON_LD_TYPE))
                .unwrap_or(false)
    });
    for script in json_ld {
        document.append_child(&head, &script);
        stats.moved_to_head += 1;
    }

    debug!("Normalized document: {:?}", stats);
    stats
}

fn children_of(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

fn collect_comments(node: &Handle, comments: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        if let NodeData::Comment { .. } = child.data {
            comments.push(child.clone());
        } else {
            collect_comments(child, comments);
        }
    }
}

fn is_blank_text(node: &Handle) -> bool {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().trim().is_empty(),
        _ => false,
    }
}

/// Keeps the first top-level `<html>` (creating one if needed) and moves every
/// other top-level node into it. The doctype stays where it is.
fn merge_html_roots(document: &mut HtmlDocument, root: &Handle) -> Handle {
    let mut html: Option<Handle> = None;
    let mut strays = Vec::new();

    for node in children_of(root) {
        if let NodeData::Doctype { .. } = node.data {
            continue;
        }

        if element_name(&node) == Some("html") {
            match html.clone() {
                None => html = Some(node),
                Some(primary) => {
                    for child in children_of(&node) {
                        document.append_child(&primary, &child);
                    }
                    document.detach(&node);
                }
            }
        } else {
            strays.push(node);
        }
    }

    let html = match html {
        Some(html) => html,
        None => {
            let html = document.create_element("html", &[]);
            document.append_child(root, &html);
            html
        }
    };

    for stray in strays {
        if is_blank_text(&stray) {
            document.detach(&stray);
        } else {
            document.append_child(&html, &stray);
        }
    }

    html
}

/// Leaves `html` with exactly `[head, body]` as children.
fn merge_sections(document: &mut HtmlDocument, html: &Handle, stats: &mut NormalizeStats) -> (Handle, Handle) {
    let mut heads = Vec::new();
    let mut bodies = Vec::new();
    let mut others = Vec::new();

    for child in children_of(html) {
        match element_name(&child) {
            Some("head") => heads.push(child),
            Some("body") => bodies.push(child),
            _ => others.push(child),
        }
    }

    let head = match heads.first() {
        Some(head) => head.clone(),
        None => document.create_element("head", &[]),
    };
    let body = match bodies.first() {
        Some(body) => body.clone(),
        None => document.create_element("body", &[]),
    };

    for extra_head in heads.iter().skip(1) {
        for child in children_of(extra_head) {
            document.append_child(&head, &child);
        }
        document.detach(extra_head);
    }
    for extra_body in bodies.iter().skip(1) {
        for child in children_of(extra_body) {
            document.append_child(&body, &child);
        }
        document.detach(extra_body);
    }

    for other in others {
        if is_blank_text(&other) {
            document.detach(&other);
        } else {
            document.append_child(&body, &other);
            stats.moved_to_body += 1;
        }
    }

    document.append_child(html, &head);
    document.append_child(html, &body);

    (head, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(html: &str) -> String {
        let mut document = HtmlDocument::parse(html).unwrap();
        normalize_document(&mut document);
        document.serialize().unwrap()
    }

    #[test]
    fn test_fragment_gets_wrappers() {
        let html = normalized("<div>a</div><div>b</div>");
        assert_eq!(html, "<html><head></head><body><div>a</div><div>b</div></body></html>");
    }

    #[test]
    fn test_head_tags_move_to_head_by_type() {
        let html = normalized(
            r#"<html><head><title>t</title></head><body>
            <link rel="stylesheet" href="./css/a.css"><p>x</p>
            <meta name="a" content="1">
            <script type="application/ld+json">{"a":1}</script>
            <script src="./js/app.js"></script>
            </body></html>"#,
        );

        let head_end = html.find("</head>").unwrap();
        let head = &html[..head_end];
        let body = &html[head_end..];

        assert!(head.contains(r#"<meta name="a" content="1">"#));
        assert!(head.contains(r#"<link rel="stylesheet" href="./css/a.css">"#));
        assert!(head.contains(r#"<script type="application/ld+json">{"a":1}</script>"#));
        assert!(head.find("<meta").unwrap() < head.find("<link").unwrap());
        assert!(body.contains("<p>x</p>"));
        assert!(body.contains(r#"<script src="./js/app.js"></script>"#));
    }

    #[test]
    fn test_comments_are_removed() {
        let html = normalized("<!-- top --><html><body><!-- inner --><p>x<!-- deep --></p></body></html>");
        assert!(!html.contains("<!--"), "{}", html);
        assert!(html.contains("<p>x</p>"));
    }

    #[test]
    fn test_duplicate_roots_are_merged() {
        let mut document = HtmlDocument::parse("<p>first</p>").unwrap();
        let root = document.document();

        let extra_html = document.create_element("html", &[]);
        let extra_body = document.create_element("body", &[]);
        let para = document.create_element("p", &[]);
        let title = document.create_element("title", &[]);
        document.append_child(&root, &extra_html);
        document.append_child(&extra_html, &extra_body);
        document.append_child(&extra_body, &para);
        document.append_child(&extra_body, &title);
        let stray_div = document.create_element("div", &[]);
        document.append_child(&root, &stray_div);

        let stats = normalize_document(&mut document);
        let html = document.serialize().unwrap();

        assert_eq!(html.matches("<html>").count(), 1, "{}", html);
        assert_eq!(html.matches("<head>").count(), 1, "{}", html);
        assert_eq!(html.matches("<body>").count(), 1, "{}", html);
        assert_eq!(html, "<html><head><title></title></head><body><p>first</p><p></p><div></div></body></html>");
        assert_eq!(stats.moved_to_head, 1);
    }

    #[test]
    fn test_template_content_is_kept_without_comments() {
        let html = normalized(
            r#"<body><template><!-- secret --><p>x</p><link rel="stylesheet" href="t.css"></template></body>"#,
        );
        assert_eq!(
            html,
            r#"<html><head></head><body><template><p>x</p><link rel="stylesheet" href="t.css"></template></body></html>"#
        );
    }

    #[test]
    fn test_doctype_is_kept() {
        let html = normalized("<!DOCTYPE html><title>t</title><p>x</p>");
        assert!(html.starts_with("<!DOCTYPE html><html><head><title>t</title></head>"), "{}", html);
    }
}
