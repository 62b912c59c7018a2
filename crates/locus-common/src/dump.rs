//! uiautomator hierarchy dump parsing.

use crate::tree::{NodeId, UiTree, UiTreeBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Malformed hierarchy XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Hierarchy dump contains no nodes")]
    Empty,
}

/// Parse a dump such as
///
/// ```xml
/// <hierarchy rotation="0">
///   <node index="0" class="android.widget.FrameLayout" bounds="[0,0][1080,2400]">...</node>
/// </hierarchy>
/// ```
///
/// The root element becomes the tree root; every descendant element becomes a
/// node with its attributes kept in document order.
pub fn parse_dump(xml: &str) -> Result<UiTree, DumpError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let mut builder = UiTreeBuilder::new(root.tag_name().name());
    builder.set_root_attributes(collect_attributes(&root));

    let top = builder.root();
    let mut stack: Vec<(roxmltree::Node, NodeId)> = root
        .children()
        .filter(|n| n.is_element())
        .map(|n| (n, top))
        .collect();
    stack.reverse();

    let mut count = 0usize;
    while let Some((xml_node, parent)) = stack.pop() {
        let id = builder.push(parent, xml_node.tag_name().name(), collect_attributes(&xml_node));
        count += 1;
        let children: Vec<_> = xml_node.children().filter(|n| n.is_element()).collect();
        for child in children.into_iter().rev() {
            stack.push((child, id));
        }
    }

    if count == 0 {
        return Err(DumpError::Empty);
    }

    Ok(builder.build())
}

fn collect_attributes(node: &roxmltree::Node) -> Vec<(String, String)> {
    node.attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}
