//! `207 Multi-Status` reader.
//!
//! Only `href`, `collection` and `getcontentlength` are extracted. Servers
//! disagree on prefixes (`d:`, `D:`, `lp1:`, default namespace), so elements
//! are matched on local name within the `DAV:` namespace.

use bridge_traits::storage::RemoteEntry;
use roxmltree::{Document, Node};

use crate::error::{Result, WebDavError};

const DAV_NS: &str = "DAV:";

fn is_dav(node: &Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local && node.tag_name().namespace() == Some(DAV_NS)
}

fn first_dav<'a, 'input>(node: &Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| is_dav(n, local))
}

/// Parse a PROPFIND response body into entries, in document order
pub fn parse_multistatus(body: &str) -> Result<Vec<RemoteEntry>> {
    let doc = Document::parse(body)
        .map_err(|e| WebDavError::InvalidResponse(format!("not XML: {}", e)))?;

    let root = doc.root_element();
    if !is_dav(&root, "multistatus") {
        return Err(WebDavError::InvalidResponse(
            "missing multistatus element".to_string(),
        ));
    }

    root.children()
        .filter(|n| is_dav(n, "response"))
        .map(|response| {
            let href = first_dav(&response, "href")
                .and_then(|n| n.text())
                .map(|raw| decode_href(raw.trim()))
                .ok_or_else(|| WebDavError::InvalidResponse("response without href".to_string()))?;

            let size = first_dav(&response, "getcontentlength")
                .and_then(|n| n.text())
                .and_then(|value| value.trim().parse::<u64>().ok());

            Ok(RemoteEntry {
                href,
                is_container: first_dav(&response, "collection").is_some(),
                size,
            })
        })
        .collect()
}

fn decode_href(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
