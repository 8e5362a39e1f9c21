//! Minimale scene graph waarin instancers leven.
//!
//! De scene bewaart nodes, hun hiërarchie en de verbindingen tussen plugs.
//! De instance-lijst van een instancer bestaat volledig uit verbindingen, zodat
//! de slot-toestand met de scene mee wordt opgeslagen.

use std::collections::{HashMap, HashSet};
use std::fmt;

pub mod host;
pub mod node;
pub mod plug;
pub mod watch;

use crate::geom::{CurveGeometry, Transform};
use crate::instancing::{BatchOp, ChangeKind, MutationBatch, SlotIndex};

pub use host::InstancerView;
pub use node::{LocalTransform, MeshShape, NodeId, NodeKind, SceneNode};
pub use plug::{Connection, Plug, PlugRef};
pub use watch::{ChangeSignal, WatchId, WatchTable};

/// Nodes en verbindingen die bij een verwijdering zijn verdwenen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    pub nodes: Vec<NodeId>,
    pub connections: Vec<Connection>,
}

/// Scene container met indices voor snelle lookups.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    connections: Vec<Connection>,
    node_index: HashMap<NodeId, usize>,
    name_index: HashMap<String, NodeId>,
    watches: WatchTable,
    next_id: usize,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Voeg een node toe met een nieuw id. Een naam die op `#` eindigt krijgt
    /// het eerste vrije volgnummer.
    pub fn add_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SceneError> {
        if let Some(parent) = parent {
            self.require(parent)?;
        }
        let mut node = SceneNode::new(NodeId::new(self.next_id), self.unique_name(name), kind);
        node.parent = parent;
        self.insert_node(node)
    }

    /// Voeg een transform met een shape eronder toe. Geeft (transform, shape) terug.
    pub fn add_shaped(
        &mut self,
        name: &str,
        shape: NodeKind,
        parent: Option<NodeId>,
    ) -> Result<(NodeId, NodeId), SceneError> {
        if !shape.is_shape() {
            return Err(SceneError::NotAShape(shape.type_name()));
        }
        let transform = self.add_node(name, NodeKind::Transform { shape: None }, parent)?;
        let base = self.require(transform)?.name.clone();
        let shape_name = match base.find(|c: char| c.is_ascii_digit()) {
            Some(split) => format!("{}Shape{}", &base[..split], &base[split..]),
            None => format!("{base}Shape"),
        };
        let shape = self.add_node(&shape_name, shape, Some(transform))?;
        if let Some(node) = self.node_mut(transform) {
            node.kind = NodeKind::Transform { shape: Some(shape) };
        }
        Ok((transform, shape))
    }

    /// Voeg een node toe met een vooraf bepaald id en naam.
    pub fn insert_node(&mut self, node: SceneNode) -> Result<NodeId, SceneError> {
        let id = node.id;
        if self.node_index.contains_key(&id) {
            return Err(SceneError::DuplicateNode(id));
        }
        if self.name_index.contains_key(&node.name) {
            return Err(SceneError::DuplicateName(node.name));
        }

        self.next_id = self.next_id.max(id.0 + 1);
        self.node_index.insert(id, self.nodes.len());
        self.name_index.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Id dat de volgende `add_node` zal uitgeven.
    #[must_use]
    pub const fn peek_next_id(&self) -> NodeId {
        NodeId::new(self.next_id)
    }

    /// Maak van `template` een naam die nog niet in gebruik is.
    #[must_use]
    pub fn unique_name(&self, template: &str) -> String {
        let template = template.trim();
        let (stem, mut counter) = if let Some(stem) = template.strip_suffix('#') {
            (stem, 1_u64)
        } else {
            if !self.name_index.contains_key(template) {
                return template.to_owned();
            }
            let stem = template.trim_end_matches(|c: char| c.is_ascii_digit());
            let current = template[stem.len()..].parse::<u64>().unwrap_or(0);
            (stem, current + 1)
        };

        loop {
            let candidate = format!("{stem}{counter}");
            if !self.name_index.contains_key(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.node_index
            .get(&id)
            .and_then(|idx| self.nodes.get(*idx))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.node_index
            .get(&id)
            .copied()
            .and_then(move |idx| self.nodes.get_mut(idx))
    }

    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<&SceneNode> {
        self.name_index.get(name).and_then(|id| self.node(*id))
    }

    #[must_use]
    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn watches(&self) -> &WatchTable {
        &self.watches
    }

    pub fn watches_mut(&mut self) -> &mut WatchTable {
        &mut self.watches
    }

    fn require(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.node(id).ok_or(SceneError::UnknownNode(id))
    }

    /// Directe kinderen van een node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.parent == Some(id))
            .map(|node| node.id)
            .collect()
    }

    /// Alle nakomelingen van een node.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for child in self.children(current) {
                if seen.insert(child) {
                    found.push(child);
                    frontier.push(child);
                }
            }
        }
        found
    }

    /// Wereldtransformatie: de lokale transformaties van wortel tot node.
    #[must_use]
    pub fn world_transform(&self, id: NodeId) -> Transform {
        let mut chain = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            chain.push(node.transform.matrix());
            if chain.len() > self.nodes.len() {
                log::warn!("ouderketen van node {id} bevat een cyclus");
                break;
            }
            current = node.parent.and_then(|parent| self.node(parent));
        }
        chain
            .iter()
            .rev()
            .fold(Transform::identity(), |acc, local| acc.compose(*local))
    }

    /// Zet de lokale transformatie en meld dit aan watchers van de node en
    /// alles eronder.
    pub fn set_local_transform(
        &mut self,
        id: NodeId,
        transform: LocalTransform,
    ) -> Result<(), SceneError> {
        let node = self.node_mut(id).ok_or(SceneError::UnknownNode(id))?;
        node.transform = transform;

        self.watches.emit(id, ChangeKind::CurveTransform);
        for below in self.descendants(id) {
            self.watches.emit(below, ChangeKind::CurveTransform);
        }
        Ok(())
    }

    /// Vervang de geometrie van een curve. `id` mag de shape of zijn transform zijn.
    pub fn set_curve_geometry(
        &mut self,
        id: NodeId,
        geometry: CurveGeometry,
    ) -> Result<(), SceneError> {
        let shape = self.curve_shape(id).ok_or(SceneError::NotACurve(id))?;
        if let Some(node) = self.node_mut(shape) {
            node.kind = NodeKind::Curve(geometry);
        }
        self.watches.emit(shape, ChangeKind::CurveShape);
        Ok(())
    }

    /// Curve-shape onder `id`, als die er is.
    #[must_use]
    pub fn curve_shape(&self, id: NodeId) -> Option<NodeId> {
        let shape = self.node(id)?.shape()?;
        self.node(shape)?.curve().map(|_| shape)
    }

    /// Verbind een message-plug met een ingang van een instancer.
    pub fn connect(&mut self, from: PlugRef, to: PlugRef) -> Result<(), SceneError> {
        self.require(from.node)?;
        let target = self.require(to.node)?;
        if from.plug != Plug::Message || from.node == to.node {
            return Err(SceneError::InvalidPlug(from));
        }
        if !to.plug.is_input() {
            return Err(SceneError::InvalidPlug(to));
        }
        if target.instancer_params().is_none() {
            return Err(SceneError::NotAnInstancer(to.node));
        }
        if self.connections.iter().any(|conn| conn.to == to) {
            return Err(SceneError::PlugOccupied(to));
        }
        if matches!(to.plug, Plug::KnownInstance(_)) && self.slot_of(to.node, from.node).is_some() {
            return Err(SceneError::AlreadyInstanced {
                instance: from.node,
                instancer: to.node,
            });
        }

        self.connections.push(Connection::new(from, to));
        Ok(())
    }

    pub fn disconnect(&mut self, from: PlugRef, to: PlugRef) -> Result<(), SceneError> {
        let connection = Connection::new(from, to);
        let position = self
            .connections
            .iter()
            .position(|conn| *conn == connection)
            .ok_or(SceneError::MissingConnection(connection))?;
        self.connections.remove(position);
        Ok(())
    }

    /// Nodes die met `to` verbonden zijn.
    #[must_use]
    pub fn sources_of(&self, to: PlugRef) -> Vec<NodeId> {
        self.connections
            .iter()
            .filter(|conn| conn.to == to)
            .map(|conn| conn.from.node)
            .collect()
    }

    /// Slot waarin `instance` bij `instancer` zit.
    #[must_use]
    pub fn slot_of(&self, instancer: NodeId, instance: NodeId) -> Option<SlotIndex> {
        self.connections.iter().find_map(|conn| match conn.to.plug {
            Plug::KnownInstance(slot) if conn.to.node == instancer && conn.from.node == instance => {
                Some(slot)
            }
            _ => None,
        })
    }

    /// Verwijder een node met alles eronder. Shapes die nog door een andere
    /// transform gedeeld worden blijven bestaan en verhuizen naar die transform.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Removal, SceneError> {
        self.require(id)?;

        let mut doomed: HashSet<NodeId> = HashSet::from([id]);
        doomed.extend(self.descendants(id));

        let mut adopted = Vec::new();
        for node in &self.nodes {
            if let NodeKind::Transform { shape: Some(shape) } = node.kind {
                if !doomed.contains(&node.id) && doomed.contains(&shape) {
                    adopted.push((shape, node.id));
                }
            }
        }
        for (shape, new_parent) in adopted {
            if doomed.remove(&shape) {
                for below in self.descendants(shape) {
                    doomed.remove(&below);
                }
                if let Some(node) = self.node_mut(shape) {
                    node.parent = Some(new_parent);
                }
            }
        }

        let mut removal = Removal::default();
        self.connections.retain(|conn| {
            let touched = doomed.contains(&conn.from.node) || doomed.contains(&conn.to.node);
            if touched {
                removal.connections.push(*conn);
            }
            !touched
        });

        self.nodes.retain(|node| {
            let gone = doomed.contains(&node.id);
            if gone {
                removal.nodes.push(node.id);
            }
            !gone
        });
        for node in &mut self.nodes {
            match &mut node.kind {
                NodeKind::ShadingGroup { members } => members.retain(|m| !doomed.contains(m)),
                NodeKind::Transform { shape } if shape.is_some_and(|s| doomed.contains(&s)) => {
                    *shape = None;
                }
                _ => {}
            }
        }
        self.reindex();

        Ok(removal)
    }

    fn reindex(&mut self) {
        self.node_index.clear();
        self.name_index.clear();
        for (idx, node) in self.nodes.iter().enumerate() {
            self.node_index.insert(node.id, idx);
            self.name_index.insert(node.name.clone(), node.id);
        }
    }

    /// Dupliceer een object onder `parent`. De shape wordt gedeeld, niet gekopieerd.
    pub fn duplicate_instance(&mut self, source: NodeId, parent: NodeId) -> Result<NodeId, SceneError> {
        self.require(parent)?;
        let original = self.require(source)?.clone();
        let shape = match original.kind {
            NodeKind::Transform { shape } => shape,
            ref kind if kind.is_shape() => Some(source),
            _ => return Err(SceneError::NotDuplicable(source)),
        };

        let name = self.unique_name(&original.name);
        let mut node = SceneNode::new(self.peek_next_id(), name, NodeKind::Transform { shape });
        node.parent = Some(parent);
        node.transform = original.transform;
        node.overrides = original.overrides;
        self.insert_node(node)
    }

    /// Shading groups waar het object (of zijn shape) lid van is.
    #[must_use]
    pub fn shading_groups_of(&self, member: NodeId) -> Vec<NodeId> {
        let shape = self.node(member).and_then(SceneNode::shape);
        self.nodes
            .iter()
            .filter(|node| match &node.kind {
                NodeKind::ShadingGroup { members } => {
                    members.contains(&member) || shape.is_some_and(|s| members.contains(&s))
                }
                _ => false,
            })
            .map(|node| node.id)
            .collect()
    }

    pub fn add_group_member(&mut self, group: NodeId, member: NodeId) -> Result<(), SceneError> {
        self.require(member)?;
        let node = self.node_mut(group).ok_or(SceneError::UnknownNode(group))?;
        match &mut node.kind {
            NodeKind::ShadingGroup { members } => {
                members.insert(member);
                Ok(())
            }
            _ => Err(SceneError::NotAShadingGroup(group)),
        }
    }

    /// Voer alle operaties van `batch` uit op de instance-lijst van
    /// `instancer`. Faalt er één, dan blijft de scene onveranderd.
    pub fn apply_batch(
        &mut self,
        instancer: NodeId,
        batch: MutationBatch<NodeId>,
    ) -> Result<(), SceneError> {
        if batch.is_empty() {
            return Ok(());
        }
        let nodes = self.nodes.clone();
        let connections = self.connections.clone();

        let result = batch
            .into_iter()
            .try_for_each(|op| self.apply_op(instancer, op));

        if result.is_err() {
            self.nodes = nodes;
            self.connections = connections;
            self.reindex();
        }
        result
    }

    fn apply_op(&mut self, instancer: NodeId, op: BatchOp<NodeId>) -> Result<(), SceneError> {
        match op {
            BatchOp::ConnectSlot { instance, slot } => self.connect(
                PlugRef::message(instance),
                PlugRef::new(instancer, Plug::KnownInstance(slot)),
            ),
            BatchOp::DisconnectSlot { instance, slot } => self.disconnect(
                PlugRef::message(instance),
                PlugRef::new(instancer, Plug::KnownInstance(slot)),
            ),
            BatchOp::DeleteObject(instance) => self.delete_node(instance).map(|_| ()),
        }
    }

    /// Controleer ouders en verbindingen, bijvoorbeeld na het inlezen.
    pub fn validate(&self) -> Result<(), SceneError> {
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                self.require(parent)?;
            }
            if let NodeKind::Transform { shape: Some(shape) } = node.kind {
                self.require(shape)?;
            }
        }
        let mut seen = HashSet::new();
        for conn in &self.connections {
            self.require(conn.from.node)?;
            self.require(conn.to.node)?;
            if !seen.insert(conn.to) {
                return Err(SceneError::PlugOccupied(conn.to));
            }
        }
        Ok(())
    }

    /// Voeg een verbinding toe zoals die in een bestand stond.
    pub(crate) fn restore_connection(&mut self, connection: Connection) -> Result<(), SceneError> {
        self.connect(connection.from, connection.to)
    }
}

/// Fouten die kunnen optreden bij het bewerken van de scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    DuplicateNode(NodeId),
    DuplicateName(String),
    UnknownNode(NodeId),
    NotAnInstancer(NodeId),
    NotACurve(NodeId),
    NotAShadingGroup(NodeId),
    NotDuplicable(NodeId),
    NotAShape(&'static str),
    InvalidPlug(PlugRef),
    PlugOccupied(PlugRef),
    MissingConnection(Connection),
    AlreadyInstanced { instance: NodeId, instancer: NodeId },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode(id) => write!(f, "node {id} bestaat al in de scene"),
            Self::DuplicateName(name) => write!(f, "naam `{name}` is al in gebruik"),
            Self::UnknownNode(id) => write!(f, "node {id} niet gevonden in scene"),
            Self::NotAnInstancer(id) => write!(f, "node {id} is geen instancer"),
            Self::NotACurve(id) => write!(f, "node {id} bevat geen curve"),
            Self::NotAShadingGroup(id) => write!(f, "node {id} is geen shading group"),
            Self::NotDuplicable(id) => write!(f, "node {id} kan niet gedupliceerd worden"),
            Self::NotAShape(kind) => write!(f, "een {kind} is geen shape"),
            Self::InvalidPlug(plug) => write!(f, "plug {plug} kan hier niet gebruikt worden"),
            Self::PlugOccupied(plug) => write!(f, "plug {plug} is al verbonden"),
            Self::MissingConnection(conn) => {
                write!(f, "verbinding {} -> {} bestaat niet", conn.from, conn.to)
            }
            Self::AlreadyInstanced {
                instance,
                instancer,
            } => write!(f, "node {instance} zit al in de instance-lijst van {instancer}"),
        }
    }
}

impl std::error::Error for SceneError {}
