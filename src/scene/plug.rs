//! Plugs en verbindingen tussen nodes.

use std::fmt;
use std::str::FromStr;

use super::node::NodeId;
use crate::instancing::SlotIndex;

/// Attribuut op een node dat verbonden kan worden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plug {
    /// Uitgang die elke node heeft.
    Message,
    /// Ingang van een instancer voor de curve.
    InputCurve,
    /// Ingang van een instancer voor het referentie-object.
    InputTransform,
    /// Element van de instance-lijst van een instancer.
    KnownInstance(SlotIndex),
}

impl Plug {
    /// Plugs die een verbinding kunnen ontvangen.
    #[must_use]
    pub const fn is_input(self) -> bool {
        !matches!(self, Self::Message)
    }
}

impl fmt::Display for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::InputCurve => f.write_str("inputCurve"),
            Self::InputTransform => f.write_str("inputTransform"),
            Self::KnownInstance(slot) => write!(f, "knownInstances[{slot}]"),
        }
    }
}

impl FromStr for Plug {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "message" => Ok(Self::Message),
            "inputCurve" => Ok(Self::InputCurve),
            "inputTransform" => Ok(Self::InputTransform),
            other => {
                let index = other
                    .strip_prefix("knownInstances[")
                    .and_then(|rest| rest.strip_suffix(']'))
                    .ok_or_else(|| format!("onbekende plug `{other}`"))?;
                index
                    .parse::<u32>()
                    .map(|slot| Self::KnownInstance(SlotIndex::new(slot)))
                    .map_err(|_| format!("ongeldige slot-index in `{other}`"))
            }
        }
    }
}

/// Plug op een specifieke node, geschreven als `node.plug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugRef {
    pub node: NodeId,
    pub plug: Plug,
}

impl PlugRef {
    #[must_use]
    pub const fn new(node: NodeId, plug: Plug) -> Self {
        Self { node, plug }
    }

    #[must_use]
    pub const fn message(node: NodeId) -> Self {
        Self::new(node, Plug::Message)
    }
}

impl fmt::Display for PlugRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.plug)
    }
}

impl FromStr for PlugRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, plug) = s
            .split_once('.')
            .ok_or_else(|| format!("plug-referentie `{s}` mist een punt"))?;
        let node = node
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("ongeldig node-id in `{s}`"))?;
        Ok(Self::new(NodeId::new(node), plug.parse()?))
    }
}

/// Verbinding van een bron-plug naar een doel-plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: PlugRef,
    pub to: PlugRef,
}

impl Connection {
    #[must_use]
    pub const fn new(from: PlugRef, to: PlugRef) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.from.node == node || self.to.node == node
    }
}
