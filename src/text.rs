//! Post-processors applied to rendered message text.
//!
//! Processors only ever rewrite text nodes (and the inline elements they
//! produce); they never touch classes or structure owned by the view.

use linkify::{LinkFinder, LinkKind};
use url::Url;

use crate::{
    dom::{NodeId, ViewTree},
    error::TreeError,
    markup::{el, text, Fragment, Markup},
};

/// Rewrites the text beneath `node` in place.
pub trait TextProcessor {
    fn process(&self, tree: &mut ViewTree, node: NodeId) -> Result<(), TreeError>;
}

/// An emoji processor that leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainEmoji;

impl TextProcessor for PlainEmoji {
    fn process(&self, _tree: &mut ViewTree, _node: NodeId) -> Result<(), TreeError> {
        Ok(())
    }
}

/// Turns newlines into `<br>` and bare URLs into `<a href=... target="_blank">`.
///
/// Text that is already inside a link is left alone, so running this twice
/// over the same node changes nothing the second time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkifyText;

const LINKABLE_SCHEMES: &[&str] = &["http", "https", "ftp"];

fn is_linkable(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|url| LINKABLE_SCHEMES.contains(&url.scheme()))
}

fn push_lines(out: &mut Fragment, run: &str) {
    for (i, line) in run.split('\n').enumerate() {
        if i > 0 {
            out.push(el("br").into());
        }
        if !line.is_empty() {
            out.push(text(line));
        }
    }
}

/// Splits `input` into text runs, line breaks, and links.
pub fn linkify_fragment(input: &str) -> Fragment {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut out = Vec::new();
    let mut last = 0;
    for link in finder.links(input) {
        if !is_linkable(link.as_str()) {
            continue;
        }
        push_lines(&mut out, &input[last..link.start()]);
        out.push(
            el("a")
                .attr("href", link.as_str())
                .attr("target", "_blank")
                .text(link.as_str())
                .into()
        );
        last = link.end();
    }
    push_lines(&mut out, &input[last..]);
    out
}

impl TextProcessor for LinkifyText {
    fn process(&self, tree: &mut ViewTree, node: NodeId) -> Result<(), TreeError> {
        for text_node in tree.text_nodes(node) {
            let inside_link = tree
                .parent(text_node)
                .is_some_and(|p| tree.tag(p) == Some("a"));
            if inside_link {
                continue;
            }
            let Some(original) = tree.text(text_node) else { continue };
            let fragment = linkify_fragment(original);
            if matches!(fragment.as_slice(), [Markup::Text(t)] if t == original) {
                continue;
            }
            tree.replace_with_fragment(text_node, &fragment)?;
        }
        Ok(())
    }
}
