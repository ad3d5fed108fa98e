//! uiautomator hierarchy dumps (`<hierarchy><node .../></hierarchy>`).

use anyhow::{Context, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{Bounds, UiNode};

/// Parses a uiautomator XML dump into a [`UiNode`] tree.
///
/// The `<hierarchy>` element becomes a synthetic root whose bounds are the
/// union of its children. Unparsable `bounds` attributes yield empty bounds;
/// malformed XML is an error.
pub fn parse_hierarchy(xml: &str) -> anyhow::Result<UiNode> {
    if xml.trim().is_empty() {
        bail!("empty hierarchy dump");
    }

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    // Open elements; the bottom entry is the synthetic root.
    let mut stack: Vec<UiNode> = vec![UiNode {
        class_name: "hierarchy".to_string(),
        enabled: true,
        ..Default::default()
    }];
    let mut saw_hierarchy = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .with_context(|| format!("XML error at byte {}", reader.buffer_position()))?
        {
            Event::Start(ref e) => match e.name().as_ref() {
                b"node" => stack.push(parse_node(e)?),
                b"hierarchy" => saw_hierarchy = true,
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"node" {
                    let node = parse_node(e)?;
                    attach(&mut stack, node);
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"node" {
                    if stack.len() < 2 {
                        bail!("unbalanced </node>");
                    }
                    if let Some(node) = stack.pop() {
                        attach(&mut stack, node);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        bail!("hierarchy ended with {} unclosed node(s)", stack.len() - 1);
    }
    let Some(mut root) = stack.pop() else {
        bail!("hierarchy produced no root");
    };
    if !saw_hierarchy && root.children.is_empty() {
        bail!("no <hierarchy> or <node> elements found");
    }

    root.bounds = root
        .children
        .iter()
        .map(|c| c.bounds)
        .reduce(|acc, b| acc.union(&b))
        .unwrap_or_default();
    root.renumber(0);
    Ok(root)
}

fn attach(stack: &mut [UiNode], node: UiNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn parse_node(e: &BytesStart) -> anyhow::Result<UiNode> {
    let mut node = UiNode {
        enabled: true,
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.context("bad attribute")?;
        let value = attr.unescape_value().context("bad attribute value")?;
        match attr.key.as_ref() {
            b"class" => node.class_name = value.into_owned(),
            b"resource-id" => node.resource_id = value.into_owned(),
            b"text" => node.text = value.into_owned(),
            b"content-desc" => node.content_description = value.into_owned(),
            b"bounds" => node.bounds = Bounds::parse(&value).unwrap_or_default(),
            b"clickable" => node.clickable = value == "true",
            b"enabled" => node.enabled = value != "false",
            _ => {}
        }
    }
    Ok(node)
}
