//! Undoable creation of an instancer from a selection.

use thiserror::Error;

use crate::instancing::InstancerParams;
use crate::scene::host::is_curve_bearing;
use crate::scene::{NodeId, Plug, PlugRef, SceneError};
use crate::session::{Session, SessionError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("select a curve and then the object to instance (got {0} selected)")]
    WrongSelection(usize),
    #[error("`{0}` is not a curve; select a curve first")]
    NotACurve(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<SceneError> for CommandError {
    fn from(err: SceneError) -> Self {
        Self::Session(err.into())
    }
}

/// One reversible scene edit recorded by a command.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneOp {
    CreateInstancer {
        id: NodeId,
        name: String,
        params: InstancerParams,
    },
    Connect {
        from: PlugRef,
        to: PlugRef,
    },
}

impl SceneOp {
    fn apply(&self, session: &mut Session) -> Result<(), SessionError> {
        match self {
            Self::CreateInstancer { id, name, params } => {
                session.restore_instancer(*id, name, *params)?;
            }
            Self::Connect { from, to } => session.connect(*from, *to)?,
        }
        Ok(())
    }

    fn revert(&self, session: &mut Session) -> Result<(), SessionError> {
        match self {
            Self::CreateInstancer { id, .. } => {
                session.delete_node(*id)?;
            }
            Self::Connect { from, to } => match session.disconnect(*from, *to) {
                Err(SessionError::Scene(SceneError::MissingConnection(conn))) => {
                    log::warn!("connection {} -> {} was already gone", conn.from, conn.to);
                }
                other => other?,
            },
        }
        Ok(())
    }
}

/// Creates an instancer and wires a curve and a reference object into it.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateInstancerCommand {
    instancer: NodeId,
    name: String,
    ops: Vec<SceneOp>,
}

impl CreateInstancerCommand {
    pub const NAME_TEMPLATE: &'static str = "curveInstancer#";

    /// Run the command for `selection`: the curve first, then the object.
    pub fn execute(session: &mut Session, selection: &[NodeId]) -> Result<Self, CommandError> {
        let &[curve, object] = selection else {
            return Err(CommandError::WrongSelection(selection.len()));
        };
        let scene = session.scene();
        if !is_curve_bearing(scene, curve) {
            let name = scene
                .node(curve)
                .map_or_else(|| curve.to_string(), |node| node.name.clone());
            return Err(CommandError::NotACurve(name));
        }
        if scene.node(object).is_none() {
            return Err(SceneError::UnknownNode(object).into());
        }

        let instancer = scene.peek_next_id();
        let name = scene.unique_name(Self::NAME_TEMPLATE);
        let ops = vec![
            SceneOp::CreateInstancer {
                id: instancer,
                name: name.clone(),
                params: InstancerParams::default(),
            },
            SceneOp::Connect {
                from: PlugRef::message(curve),
                to: PlugRef::new(instancer, Plug::InputCurve),
            },
            SceneOp::Connect {
                from: PlugRef::message(object),
                to: PlugRef::new(instancer, Plug::InputTransform),
            },
        ];

        let command = Self {
            instancer,
            name,
            ops,
        };
        command.apply_all(session)?;
        log::info!("created {}", command.name);
        Ok(command)
    }

    #[must_use]
    pub fn instancer(&self) -> NodeId {
        self.instancer
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ops(&self) -> &[SceneOp] {
        &self.ops
    }

    /// Reverse every recorded edit, last first.
    pub fn undo(&self, session: &mut Session) -> Result<(), CommandError> {
        for op in self.ops.iter().rev() {
            op.revert(session)?;
        }
        log::info!("undo: removed {}", self.name);
        Ok(())
    }

    /// Replay the recorded edits.
    pub fn redo(&self, session: &mut Session) -> Result<(), CommandError> {
        self.apply_all(session)?;
        log::info!("redo: recreated {}", self.name);
        Ok(())
    }

    fn apply_all(&self, session: &mut Session) -> Result<(), CommandError> {
        for (done, op) in self.ops.iter().enumerate() {
            if let Err(err) = op.apply(session) {
                for applied in self.ops[..done].iter().rev() {
                    if let Err(revert_err) = applied.revert(session) {
                        log::warn!("could not roll back {applied:?}: {revert_err}");
                    }
                }
                return Err(err.into());
            }
        }
        Ok(())
    }
}

/// Undo and redo stacks for creation commands.
#[derive(Debug, Default)]
pub struct CommandHistory {
    done: Vec<CreateInstancerCommand>,
    undone: Vec<CreateInstancerCommand>,
}

impl CommandHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a creation command and record it. Clears the redo stack.
    pub fn execute(&mut self, session: &mut Session, selection: &[NodeId]) -> Result<NodeId, CommandError> {
        let command = CreateInstancerCommand::execute(session, selection)?;
        let id = command.instancer();
        self.done.push(command);
        self.undone.clear();
        Ok(id)
    }

    /// Undo the latest command. Returns the instancer it removed, if any.
    pub fn undo(&mut self, session: &mut Session) -> Result<Option<NodeId>, CommandError> {
        let Some(command) = self.done.pop() else {
            return Ok(None);
        };
        if let Err(err) = command.undo(session) {
            self.done.push(command);
            return Err(err);
        }
        let id = command.instancer();
        self.undone.push(command);
        Ok(Some(id))
    }

    /// Redo the latest undone command. Returns the instancer it recreated, if any.
    pub fn redo(&mut self, session: &mut Session) -> Result<Option<NodeId>, CommandError> {
        let Some(command) = self.undone.pop() else {
            return Ok(None);
        };
        if let Err(err) = command.redo(session) {
            self.undone.push(command);
            return Err(err);
        }
        let id = command.instancer();
        self.done.push(command);
        Ok(Some(id))
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }
}
