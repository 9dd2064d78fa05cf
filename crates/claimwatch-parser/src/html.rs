//! Tolerant HTML scanner.
//!
//! Tooltip markup coming off the map is hand-assembled by a server plugin
//! and is frequently unbalanced: list items are left open, attributes are
//! unquoted, closing tags go missing. This module never rejects input. It
//! builds a small node arena that supports the handful of queries the
//! description parser needs: elements by tag in document order, attribute
//! lookup, text extraction, parent and following-sibling navigation.
//!
//! Nodes are stored in creation order, which is also document order.

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Index of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
enum NodeKind {
    Root,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed HTML fragment.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parse a fragment. Never fails; malformed markup is repaired or
    /// ignored.
    pub fn parse(html: &str) -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        };
        let mut open = vec![NodeId(0)];
        let mut rest = html;

        while !rest.is_empty() {
            if !starts_markup(rest) {
                let end = text_end(rest);
                let (text, tail) = rest.split_at(end);
                doc.push_text(&open, text);
                rest = tail;
                continue;
            }

            if let Some(after) = rest.strip_prefix("<!--") {
                rest = after
                    .find("-->")
                    .and_then(|i| after.get(i.saturating_add(3)..))
                    .unwrap_or("");
            } else if let Some(after) = rest.strip_prefix("</") {
                let (name, tail) = read_tag_name(after);
                rest = skip_past_gt(tail);
                if !name.is_empty() {
                    close_element(&doc, &mut open, &name);
                }
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                rest = skip_past_gt(rest);
            } else {
                let after = rest.get(1..).unwrap_or("");
                let (tag, tail) = read_tag_name(after);
                let (attrs, self_closing, tail) = read_attrs(tail);
                rest = tail;
                let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing;
                doc.open_element(&mut open, tag.clone(), attrs, self_closing);
                if raw {
                    rest = skip_raw_text(rest, &tag);
                    open.pop();
                }
            }
        }
        doc
    }

    /// All elements with the given (lowercase) tag, in document order.
    pub fn elements<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| matches!(&n.kind, NodeKind::Element { tag: t, .. } if t == tag))
            .map(|(i, _)| NodeId(i))
    }

    /// Tag name of an element node.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Value of an attribute on an element node.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Parent node. The top-level parent is the document root, which has no
    /// tag and no siblings.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent
    }

    /// First sibling after `id` that is an element with the given tag.
    pub fn next_sibling_element(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = &self.nodes.get(parent.0)?.children;
        siblings
            .iter()
            .skip_while(|&&s| s != id)
            .skip(1)
            .copied()
            .find(|&s| self.tag(s) == Some(tag))
    }

    /// All descendant elements of `id` with the given tag, in document order.
    pub fn descendants(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(id, |node_id, node| {
            if node_id != id && matches!(&node.kind, NodeKind::Element { tag: t, .. } if t == tag)
            {
                found.push(node_id);
            }
        });
        found
    }

    /// True when `ancestor` is `id` or one of its ancestors.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Concatenated descendant text, unmodified.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.walk(id, |_, node| {
            if let NodeKind::Text(t) = &node.kind {
                out.push_str(t);
            }
        });
        out
    }

    /// Concatenation of every descendant text node after trimming each one.
    pub fn stripped_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.walk(id, |_, node| {
            if let NodeKind::Text(t) = &node.kind {
                out.push_str(t.trim());
            }
        });
        out
    }

    fn walk<'a>(&'a self, id: NodeId, mut visit: impl FnMut(NodeId, &'a Node)) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current.0) else {
                continue;
            };
            visit(current, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    fn push_text(&mut self, open: &[NodeId], raw: &str) {
        let parent = open.last().copied().unwrap_or(NodeId(0));
        self.push(parent, NodeKind::Text(decode_entities(raw)));
    }

    fn open_element(
        &mut self,
        open: &mut Vec<NodeId>,
        tag: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    ) {
        if tag == "li" {
            close_open_item(self, open);
        }
        let void = self_closing || VOID_ELEMENTS.contains(&tag.as_str());
        let parent = open.last().copied().unwrap_or(NodeId(0));
        let id = self.push(parent, NodeKind::Element { tag, attrs });
        if !void {
            open.push(id);
        }
    }
}

/// An `<li>` left open is closed by the next `<li>` of the same list.
fn close_open_item(doc: &Document, open: &mut Vec<NodeId>) {
    for (depth, &id) in open.iter().enumerate().rev() {
        match doc.tag(id) {
            Some("li") => {
                open.truncate(depth);
                return;
            }
            Some("ul" | "ol") | None => return,
            Some(_) => {}
        }
    }
}

/// Pop the stack back to the innermost open element named `name`. Stray
/// closing tags are ignored.
fn close_element(doc: &Document, open: &mut Vec<NodeId>, name: &str) {
    let position = open
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|&(_, &id)| doc.tag(id) == Some(name))
        .map(|(depth, _)| depth);
    if let Some(depth) = position {
        open.truncate(depth);
    }
}

fn starts_markup(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

fn text_end(s: &str) -> usize {
    s.char_indices()
        .skip(1)
        .find(|&(i, c)| c == '<' && s.get(i..).is_some_and(starts_markup))
        .map_or(s.len(), |(i, _)| i)
}

fn skip_past_gt(s: &str) -> &str {
    s.find('>')
        .and_then(|i| s.get(i.saturating_add(1)..))
        .unwrap_or("")
}

fn skip_raw_text<'a>(s: &'a str, tag: &str) -> &'a str {
    let closing = format!("</{tag}");
    s.to_ascii_lowercase()
        .find(&closing)
        .and_then(|i| s.get(i..))
        .map_or("", skip_past_gt)
}

fn read_tag_name(s: &str) -> (String, &str) {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_')))
        .unwrap_or(s.len());
    let (name, tail) = s.split_at(end);
    (name.to_ascii_lowercase(), tail)
}

fn read_attrs(mut s: &str) -> (Vec<(String, String)>, bool, &str) {
    let mut attrs = Vec::new();
    loop {
        s = s.trim_start();
        if let Some(tail) = s.strip_prefix("/>") {
            return (attrs, true, tail);
        }
        if let Some(tail) = s.strip_prefix('>') {
            return (attrs, false, tail);
        }
        if s.is_empty() {
            return (attrs, false, s);
        }
        if let Some(tail) = s.strip_prefix('/').or_else(|| s.strip_prefix('=')) {
            s = tail;
            continue;
        }

        let name_end = s
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
            .unwrap_or(s.len());
        let (name, tail) = s.split_at(name_end);
        s = tail.trim_start();

        let mut value = String::new();
        if let Some(tail) = s.strip_prefix('=') {
            let (raw, tail) = read_attr_value(tail.trim_start());
            value = decode_entities(raw);
            s = tail;
        }
        attrs.push((name.to_ascii_lowercase(), value));
    }
}

fn read_attr_value(s: &str) -> (&str, &str) {
    for quote in ['"', '\''] {
        if let Some(body) = s.strip_prefix(quote) {
            return body.find(quote).map_or((body, ""), |i| {
                let (value, tail) = body.split_at(i);
                (value, tail.get(1..).unwrap_or(""))
            });
        }
    }
    let end = s
        .find(|c: char| c.is_whitespace() || c == '>')
        .unwrap_or(s.len());
    s.split_at(end)
}

/// Decode the named and numeric character references that show up in
/// tooltip markup. Unknown references are left as they are.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        let (head, tail) = rest.split_at(i);
        out.push_str(head);
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| Some((decode_entity(tail.get(1..end)?)?, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = tail.get(end.saturating_add(1)..).unwrap_or("");
            }
            None => {
                out.push('&');
                rest = tail.get(1..).unwrap_or("");
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Lowercase and drop all whitespace, for loose style comparisons.
pub fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unclosed_items_become_siblings() {
        let doc = Document::parse("<ul><li>one<li>two<li>three</ul>");
        let items: Vec<_> = doc.elements("li").collect();
        assert_eq!(items.len(), 3);
        let ul = doc.elements("ul").next().unwrap();
        for item in items {
            assert_eq!(doc.parent(item), Some(ul));
        }
    }

    #[test]
    fn nested_list_does_not_close_outer_item() {
        let doc = Document::parse("<ul><li>outer<ul><li>inner</li></ul></li></ul>");
        let outer = doc.elements("li").next().unwrap();
        assert_eq!(doc.stripped_text(outer), "outerinner");
    }

    #[test]
    fn stripped_text_trims_each_node() {
        let doc = Document::parse("<li>  等级: <b> 3 </b>\n</li>");
        let li = doc.elements("li").next().unwrap();
        assert_eq!(doc.stripped_text(li), "等级:3");
        assert_eq!(doc.text(li), "  等级:  3 \n");
    }

    #[test]
    fn quoted_attribute_may_contain_gt() {
        let doc = Document::parse(r#"<span title="a>b" style='font-size: 200%'>X</span>"#);
        let span = doc.elements("span").next().unwrap();
        assert_eq!(doc.attr(span, "title"), Some("a>b"));
        assert_eq!(doc.attr(span, "style"), Some("font-size: 200%"));
        assert_eq!(doc.text(span), "X");
    }

    #[test]
    fn unquoted_attribute_and_void_element() {
        let doc = Document::parse("<div class=tip>a<br>b</div>");
        let div = doc.elements("div").next().unwrap();
        assert_eq!(doc.attr(div, "class"), Some("tip"));
        assert_eq!(doc.text(div), "ab");
    }

    #[test]
    fn comments_and_scripts_are_skipped() {
        let doc = Document::parse("<div>a<!-- <li>x</li> --><script>if (a<b) {}</script>b</div>");
        assert_eq!(doc.elements("li").count(), 0);
        let div = doc.elements("div").next().unwrap();
        assert_eq!(doc.text(div), "ab");
    }

    #[test]
    fn stray_lt_is_text() {
        let doc = Document::parse("<div>a < b</div>");
        let div = doc.elements("div").next().unwrap();
        assert_eq!(doc.text(div), "a < b");
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(decode_entities("a&amp;b&nbsp;&#20013;&#x41;&bogus;"), "a&b 中A&bogus;");
    }

    #[test]
    fn next_sibling_skips_text_and_other_tags() {
        let doc =
            Document::parse("<div><p><strong>x</strong></p> text <hr><ul><li>y</li></ul></div>");
        let p = doc.elements("p").next().unwrap();
        let ul = doc.next_sibling_element(p, "ul").unwrap();
        assert_eq!(doc.stripped_text(ul), "y");
    }

    #[test]
    fn stray_close_tag_ignored() {
        let doc = Document::parse("<ul><li>a</span></li></ul>");
        let li = doc.elements("li").next().unwrap();
        assert_eq!(doc.text(li), "a");
    }

    #[test]
    fn squash_ignores_case_and_space() {
        assert_eq!(squash("Font-Size: 200 %;"), "font-size:200%;");
    }
}
