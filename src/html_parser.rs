use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use html5ever::interface::{Attribute, QualName};
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{create_element, NodeOrText, TreeSink};
use html5ever::{namespace_url, ns, parse_document, LocalName};
use log::debug;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

/// A parsed page. Wraps the mutable rcdom tree and the handful of tree
/// operations the localization passes need.
pub struct HtmlDocument {
    dom: RcDom,
    encoding: &'static Encoding,
}

impl HtmlDocument {
    pub fn parse(html_content: &str) -> Result<Self> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html_content.as_bytes())
            .context("Failed to parse HTML document")?;

        let mut document = Self { dom, encoding: UTF_8 };
        document.adopt_template_contents();
        Ok(document)
    }

    /// Parses raw page bytes, honouring a `<meta>` charset declaration. The
    /// declared encoding is kept for [`HtmlDocument::serialize_bytes`].
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        let document = Self::parse(&String::from_utf8_lossy(data))?;
        let Some(encoding) = document.declared_encoding() else {
            return Ok(document);
        };
        if encoding == UTF_8 {
            return Ok(document);
        }

        debug!("Decoding document as {}", encoding.name());
        let (decoded, _, _) = encoding.decode(data);
        let mut document = Self::parse(&decoded)?;
        document.encoding = encoding;
        Ok(document)
    }

    pub fn document(&self) -> Handle {
        self.dom.document.clone()
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn serialize(&self) -> Result<String> {
        let mut buf: Vec<u8> = Vec::new();
        let serializable: SerializableHandle = self.dom.document.clone().into();
        serialize(&mut buf, &serializable, SerializeOpts::default())
            .context("Failed to serialize HTML document")?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Serialized markup in the document's own encoding.
    pub fn serialize_bytes(&self) -> Result<Vec<u8>> {
        Ok(encode_html(&self.serialize()?, self.encoding))
    }

    fn declared_encoding(&self) -> Option<&'static Encoding> {
        self.find_elements("meta").iter().find_map(|meta| {
            let label = match get_node_attr(meta, "charset") {
                Some(charset) => charset,
                None if get_node_attr(meta, "http-equiv")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-type")) =>
                {
                    charset_from_content_type(&get_node_attr(meta, "content")?)?
                }
                None => return None,
            };
            Encoding::for_label_no_replacement(label.trim().as_bytes())
        })
    }

    /// Moves each `<template>` fragment into the element's own child list so
    /// the markup survives serialization and the comment pass can reach it.
    fn adopt_template_contents(&mut self) {
        let mut pending = vec![self.dom.document.clone()];
        while let Some(node) = pending.pop() {
            if let NodeData::Element { template_contents, .. } = &node.data {
                let fragment = template_contents.borrow_mut().take();
                if let Some(fragment) = fragment {
                    let contents = fragment.children.borrow().clone();
                    for child in &contents {
                        self.append_child(&node, child);
                    }
                }
            }
            pending.extend(node.children.borrow().iter().cloned());
        }
    }

    /// Elements named `tag_name` in document order.
    pub fn find_elements(&self, tag_name: &str) -> Vec<Handle> {
        find_elements_by(&self.dom.document, &|node: &Handle| element_name(node) == Some(tag_name))
    }

    /// Creates a detached HTML element carrying `attrs` in the given order.
    pub fn create_element(&mut self, tag_name: &str, attrs: &[(&str, &str)]) -> Handle {
        let attrs = attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: QualName::new(None, ns!(), LocalName::from(*name)),
                value: StrTendril::from_slice(value),
            })
            .collect();

        create_element(
            &mut self.dom,
            QualName::new(None, ns!(html), LocalName::from(tag_name)),
            attrs,
        )
    }

    /// Puts `replacement` where `target` was and detaches `target`.
    pub fn replace_node(&mut self, target: &Handle, replacement: Handle) {
        self.dom
            .append_before_sibling(target, NodeOrText::AppendNode(replacement));
        self.dom.remove_from_parent(target);
    }

    pub fn detach(&mut self, node: &Handle) {
        self.dom.remove_from_parent(node);
    }

    /// Moves `child` (attached or not) to the end of `parent`.
    pub fn append_child(&mut self, parent: &Handle, child: &Handle) {
        self.dom.remove_from_parent(child);
        self.dom.append(parent, NodeOrText::AppendNode(child.clone()));
    }
}

/// `charset` parameter of a `Content-Type` value such as `text/html; charset=utf-8`.
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    })
}

/// Encodes serialized markup; characters the encoding lacks become numeric
/// character references.
pub fn encode_html(html: &str, encoding: &'static Encoding) -> Vec<u8> {
    let (bytes, _, _) = encoding.encode(html);
    bytes.into_owned()
}

/// Depth-first, document-order search below (and including) `node`.
/// Template contents are not visited.
pub fn find_elements_by<P>(node: &Handle, predicate: &P) -> Vec<Handle>
where
    P: Fn(&Handle) -> bool,
{
    let mut found_nodes = Vec::new();
    collect_elements(node, predicate, &mut found_nodes);
    found_nodes
}

fn collect_elements<P>(node: &Handle, predicate: &P, found_nodes: &mut Vec<Handle>)
where
    P: Fn(&Handle) -> bool,
{
    if is_element(node) && predicate(node) {
        found_nodes.push(node.clone());
    }
    if element_name(node) == Some("template") {
        return;
    }

    for child_node in node.children.borrow().iter() {
        collect_elements(child_node, predicate, found_nodes);
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// Local name of an HTML-namespace element.
pub fn element_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } if name.ns == ns!(html) => Some(name.local.as_ref()),
        _ => None,
    }
}

pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// Overwrites an existing attribute or appends it.
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| &*attr.name.local == attr_name) {
            Some(attr) => attr.value = StrTendril::from_slice(attr_value),
            None => attrs.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: StrTendril::from_slice(attr_value),
            }),
        }
    }
}

/// Concatenated text of the direct text children, which is where the parser
/// puts the body of `<style>` and `<script>`.
pub fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    for child_node in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child_node.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_read_attributes() {
        let document = HtmlDocument::parse(
            r#"<html><head><link rel="stylesheet" href="/a.css"></head>
            <body><img src="/x.png"><img alt="none"></body></html>"#,
        )
        .unwrap();

        let images = document.find_elements("img");
        assert_eq!(images.len(), 2);
        assert_eq!(get_node_attr(&images[0], "src").as_deref(), Some("/x.png"));
        assert_eq!(get_node_attr(&images[1], "src"), None);
    }

    #[test]
    fn test_set_attr_and_serialize() {
        let document = HtmlDocument::parse(r#"<p><img src="https://example.com/x.png"></p>"#).unwrap();
        let img = &document.find_elements("img")[0];
        set_node_attr(img, "src", "./asset/img/x.png");
        set_node_attr(img, "alt", "x");

        let html = document.serialize().unwrap();
        assert!(html.contains(r#"<img src="./asset/img/x.png" alt="x">"#), "{}", html);
    }

    #[test]
    fn test_replace_node_keeps_position() {
        let mut document =
            HtmlDocument::parse("<body><p>one</p><style>p{}</style><p>two</p></body>").unwrap();
        let style = document.find_elements("style")[0].clone();
        assert_eq!(text_content(&style), "p{}");

        let link = document.create_element("link", &[("rel", "stylesheet"), ("href", "./css/inline-1.css")]);
        document.replace_node(&style, link);

        let html = document.serialize().unwrap();
        assert!(
            html.contains(r#"<p>one</p><link rel="stylesheet" href="./css/inline-1.css"><p>two</p>"#),
            "{}",
            html
        );
        assert!(!html.contains("<style>"));
    }

    #[test]
    fn test_template_markup_survives_serialization() {
        let document =
            HtmlDocument::parse("<body><template><p>x</p><!-- c --><img src=\"t.png\"></template></body>").unwrap();

        let html = document.serialize().unwrap();
        assert!(html.contains(r#"<template><p>x</p><!-- c --><img src="t.png"></template>"#), "{}", html);
        assert_eq!(document.find_elements("template").len(), 1);
        assert!(document.find_elements("img").is_empty());
    }

    #[test]
    fn test_declared_charset_round_trips() {
        let mut data = b"<html><head><meta charset=\"iso-8859-1\"></head><body><p>caf".to_vec();
        data.push(0xE9);
        data.extend_from_slice(b"</p></body></html>");

        let document = HtmlDocument::parse_bytes(&data).unwrap();
        assert_eq!(document.encoding().name(), "windows-1252");
        assert!(document.serialize().unwrap().contains("<p>café</p>"));

        let encoded = document.serialize_bytes().unwrap();
        assert!(encoded.windows(6).any(|w| w == b"caf\xE9</"));
    }

    #[test]
    fn test_charset_from_http_equiv() {
        let document = HtmlDocument::parse_bytes(
            br#"<meta http-equiv="Content-Type" content="text/html; charset='Shift_JIS'"><p>x</p>"#,
        )
        .unwrap();
        assert_eq!(document.encoding().name(), "Shift_JIS");

        let plain = HtmlDocument::parse_bytes(b"<p>x</p>").unwrap();
        assert_eq!(plain.encoding(), UTF_8);
    }
}
