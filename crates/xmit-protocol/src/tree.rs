use std::collections::BTreeMap;

use minicbor::decode::{Decode, Decoder};
use minicbor::encode::{Encode, Encoder, Write};
use xmit_types::Hash;

/// One node of a manifest tree.
///
/// A node is either a directory (children, no hash) or a file (hash, no
/// children); the presence of the hash is the tag. The root of a manifest is
/// always a directory.
///
/// Children live in a `BTreeMap` so serialization order is a property of the
/// tree's contents alone: identical directory trees encode to bit-identical
/// manifests and therefore identical bundle IDs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub children: BTreeMap<String, Node>,
    pub hash: Option<Hash>,
}

impl Node {
    /// A directory node with the given children.
    pub fn dir(children: BTreeMap<String, Node>) -> Self {
        Node {
            children,
            hash: None,
        }
    }

    /// A file node referencing a content hash.
    pub fn file(hash: Hash) -> Self {
        Node {
            children: BTreeMap::new(),
            hash: Some(hash),
        }
    }

    pub fn is_file(&self) -> bool {
        self.hash.is_some()
    }
}

/// Serialize a manifest root to its canonical bytes.
///
/// The result's BLAKE3-256 is the bundle ID, so this encoding is part of the
/// wire contract: definite-length integer-keyed maps, children under key 1
/// (omitted when empty), hash under key 2 (omitted for directories).
pub fn encode_manifest(root: &Node) -> Result<Vec<u8>, minicbor::encode::Error<std::convert::Infallible>> {
    minicbor::to_vec(root)
}

/// Parse manifest bytes received from the service.
pub fn decode_manifest(bytes: &[u8]) -> Result<Node, minicbor::decode::Error> {
    minicbor::decode(bytes)
}

impl<C> Encode<C> for Node {
    fn encode<W: Write>(
        &self,
        e: &mut Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        let fields = u64::from(!self.children.is_empty()) + u64::from(self.hash.is_some());
        e.map(fields)?;
        if !self.children.is_empty() {
            e.u8(1)?;
            e.map(self.children.len() as u64)?;
            for (name, child) in &self.children {
                e.str(name)?;
                child.encode(e, ctx)?;
            }
        }
        if let Some(hash) = &self.hash {
            e.u8(2)?;
            hash.encode(e, ctx)?;
        }
        Ok(())
    }
}

/// Deepest tree a received manifest may describe. Bounds decoder recursion so
/// a hostile manifest cannot overflow the stack with nested maps.
const MAX_NESTING: u32 = 255;

impl<'b, C> Decode<'b, C> for Node {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        decode_node(d, 0)
    }
}

fn decode_node(d: &mut Decoder<'_>, depth: u32) -> Result<Node, minicbor::decode::Error> {
    if depth > MAX_NESTING {
        return Err(minicbor::decode::Error::message(
            "manifest nesting too deep",
        ));
    }
    let mut node = Node::default();
    let len = d.map()?;
    let mut remaining = len;
    loop {
        match remaining {
            Some(0) => break,
            Some(ref mut n) => *n -= 1,
            // Indefinite-length map: stop at the break byte.
            None => {
                if d.datatype()? == minicbor::data::Type::Break {
                    d.set_position(d.position() + 1);
                    break;
                }
            }
        }
        match d.u32()? {
            1 => {
                let children_len = d.map()?;
                let mut seen = 0u64;
                loop {
                    match children_len {
                        Some(n) if seen == n => break,
                        None if d.datatype()? == minicbor::data::Type::Break => {
                            d.set_position(d.position() + 1);
                            break;
                        }
                        _ => {}
                    }
                    let name = d.str()?.to_owned();
                    let child = decode_node(d, depth + 1)?;
                    node.children.insert(name, child);
                    seen += 1;
                }
            }
            2 => node.hash = Some(Hash::decode(d, &mut ())?),
            // Unknown keys are skipped for forward compatibility.
            _ => d.skip()?,
        }
    }
    Ok(node)
}
