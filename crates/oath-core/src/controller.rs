//! The automaton controller: owner of every node and of the current node of
//! each named subsystem.
//!
//! Nodes live in a single arena and are addressed by [`NodeId`]. Each
//! subsystem registers a root with [`AutomatonController::set_system_root`];
//! from then on [`AutomatonController::process_input`] walks its automaton,
//! running exit/enter hooks around every real transition and raising a
//! pull-based dirty flag that consumers clear explicitly.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use oath_types::TransitionInput;
use tracing::{debug, warn};

use crate::context::WorldContext;
use crate::node::{Action, NodeId, StateNode};

/// Errors from controller lookups and registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// No subsystem is registered under this name.
    #[error("unknown system: {system}")]
    UnknownSystem {
        /// The requested subsystem.
        system: String,
    },

    /// No node is registered under this name.
    #[error("unknown node: {node}")]
    UnknownNode {
        /// The requested node name.
        node: String,
    },

    /// A node with this name already exists.
    #[error("node already exists: {node}")]
    DuplicateNode {
        /// The conflicting name.
        node: String,
    },

    /// A handle does not refer to a node in this controller.
    #[error("invalid node handle {id}")]
    InvalidHandle {
        /// The stale or foreign handle.
        id: NodeId,
    },

    /// A node exists but cannot be reached from the subsystem's root.
    #[error("node {node} is not reachable from the root of {system}")]
    Unreachable {
        /// The subsystem.
        system: String,
        /// The node that was requested.
        node: String,
    },
}

/// Result of feeding one input to a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// A rule of the current node matched the input.
    pub handled: bool,
    /// The current node after processing.
    pub next: NodeId,
    /// The current node changed (a self-loop leaves this `false`).
    pub changed: bool,
}

#[derive(Debug, Clone, Copy)]
struct SystemSlot {
    root: NodeId,
    current: Option<NodeId>,
    changed: bool,
}

/// Arena of state nodes plus per-subsystem cursor and dirty flag.
#[derive(Debug, Default)]
pub struct AutomatonController {
    nodes: Vec<StateNode>,
    names: BTreeMap<String, NodeId>,
    systems: BTreeMap<String, SystemSlot>,
}

impl AutomatonController {
    /// Create an empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a node. Names are unique across the controller.
    pub fn create_node(&mut self, name: impl Into<String>) -> Result<NodeId, ControllerError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(ControllerError::DuplicateNode { node: name });
        }
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(StateNode::new(id, name.clone()));
        self.names.insert(name, id);
        Ok(id)
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> Option<&StateNode> {
        self.nodes.get(id.index())
    }

    /// Borrow a node mutably, e.g. to attach data, actions, or behaviour.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut StateNode> {
        self.nodes.get_mut(id.index())
    }

    /// Look a node up by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Name of a node, if the handle is valid.
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(StateNode::name)
    }

    /// Number of nodes in the arena.
    pub const fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a rule to `from` leading to `to`.
    pub fn add_transition(
        &mut self,
        from: NodeId,
        predicate: impl Fn(&TransitionInput) -> bool + Send + Sync + 'static,
        to: NodeId,
        description: impl Into<String>,
    ) -> Result<(), ControllerError> {
        if self.node(to).is_none() {
            return Err(ControllerError::InvalidHandle { id: to });
        }
        let node = self
            .node_mut(from)
            .ok_or(ControllerError::InvalidHandle { id: from })?;
        node.add_transition(predicate, to, description);
        Ok(())
    }

    /// Register `root` as both the root and the current node of `system`,
    /// raising its dirty flag. Re-registering a system resets it to the new
    /// root.
    pub fn set_system_root(
        &mut self,
        system: impl Into<String>,
        root: NodeId,
    ) -> Result<(), ControllerError> {
        if self.node(root).is_none() {
            return Err(ControllerError::InvalidHandle { id: root });
        }
        let system = system.into();
        debug!(system = %system, root = %root, "system root set");
        self.systems.insert(
            system,
            SystemSlot {
                root,
                current: Some(root),
                changed: true,
            },
        );
        Ok(())
    }

    /// Feed `input` to `system`'s current node.
    ///
    /// A subsystem without a current node is first reset to its root. When
    /// the first matching rule leads to a different node, the old node's exit
    /// hook runs, the cursor moves, the dirty flag is raised, and the new
    /// node's enter hook runs. Self-loops and non-matches leave everything
    /// untouched.
    pub fn process_input(
        &mut self,
        system: &str,
        input: &TransitionInput,
        world: &mut WorldContext,
    ) -> Result<TransitionOutcome, ControllerError> {
        let slot = self.slot(system)?;
        let current = match slot.current {
            Some(current) => current,
            None => {
                debug!(system, "lazily initialising system at its root");
                let root = slot.root;
                self.set_current(system, root)?;
                root
            }
        };

        let target = self
            .node(current)
            .ok_or(ControllerError::InvalidHandle { id: current })?
            .evaluate_transition(input);

        let Some(target) = target else {
            return Ok(TransitionOutcome {
                handled: false,
                next: current,
                changed: false,
            });
        };

        if target == current {
            return Ok(TransitionOutcome {
                handled: true,
                next: current,
                changed: false,
            });
        }

        if self.node(target).is_none() {
            return Err(ControllerError::InvalidHandle { id: target });
        }

        if let Some(node) = self.node_mut(current) {
            node.on_exit(world);
        }
        self.set_current(system, target)?;
        if let Some(node) = self.node_mut(target) {
            node.on_enter(world);
        }
        debug!(
            system,
            from = self.node_name(current).unwrap_or_default(),
            to = self.node_name(target).unwrap_or_default(),
            input = %input.kind,
            "transition"
        );

        Ok(TransitionOutcome {
            handled: true,
            next: target,
            changed: true,
        })
    }

    /// The current node of `system`, or `None` if the system is unknown or
    /// has been rewound.
    pub fn current_node(&self, system: &str) -> Option<NodeId> {
        self.systems.get(system).and_then(|slot| slot.current)
    }

    /// Name of the current node of `system`.
    pub fn current_node_name(&self, system: &str) -> Option<&str> {
        self.current_node(system).and_then(|id| self.node_name(id))
    }

    /// The root node of `system`.
    pub fn root_node(&self, system: &str) -> Option<NodeId> {
        self.systems.get(system).map(|slot| slot.root)
    }

    /// Whether `system`'s current node changed since the flag was last
    /// cleared. Unknown systems are reported and read as unchanged.
    pub fn has_changed(&self, system: &str) -> bool {
        match self.systems.get(system) {
            Some(slot) => slot.changed,
            None => {
                warn!(system, "has_changed on unknown system");
                false
            }
        }
    }

    /// Clear `system`'s dirty flag.
    pub fn reset_changed_flag(&mut self, system: &str) -> Result<(), ControllerError> {
        let slot = self.slot_mut(system)?;
        slot.changed = false;
        Ok(())
    }

    /// Actions offered by `system`'s current node (its root if rewound).
    pub fn available_actions(&self, system: &str) -> Result<Vec<Action>, ControllerError> {
        let slot = self.slot(system)?;
        let id = slot.current.unwrap_or(slot.root);
        let node = self
            .node(id)
            .ok_or(ControllerError::InvalidHandle { id })?;
        Ok(node.available_actions())
    }

    /// Names of every registered subsystem, in name order.
    pub fn systems(&self) -> impl Iterator<Item = &str> {
        self.systems.keys().map(String::as_str)
    }

    /// Whether `system` has a registered root.
    pub fn has_system(&self, system: &str) -> bool {
        self.systems.contains_key(system)
    }

    /// Move `system` straight to the node called `node_name` without running
    /// hooks. Used when restoring a saved game. The node must be reachable
    /// from the system's root. Raises the dirty flag.
    pub fn restore_current(
        &mut self,
        system: &str,
        node_name: &str,
    ) -> Result<NodeId, ControllerError> {
        let root = self.slot(system)?.root;
        let target = self
            .find_node(node_name)
            .ok_or_else(|| ControllerError::UnknownNode {
                node: node_name.to_owned(),
            })?;
        if !self.reachable_from(root).contains(&target) {
            return Err(ControllerError::Unreachable {
                system: system.to_owned(),
                node: node_name.to_owned(),
            });
        }
        self.set_current(system, target)?;
        Ok(target)
    }

    /// Drop `system`'s current node; the next input re-enters at the root.
    pub fn rewind(&mut self, system: &str) -> Result<(), ControllerError> {
        let slot = self.slot_mut(system)?;
        slot.current = None;
        Ok(())
    }

    fn reachable_from(&self, root: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else { continue };
            for rule in node.transitions() {
                if seen.insert(rule.target()) {
                    queue.push_back(rule.target());
                }
            }
        }
        seen
    }

    fn set_current(&mut self, system: &str, node: NodeId) -> Result<(), ControllerError> {
        let slot = self.slot_mut(system)?;
        slot.current = Some(node);
        slot.changed = true;
        Ok(())
    }

    fn slot(&self, system: &str) -> Result<SystemSlot, ControllerError> {
        self.systems.get(system).copied().ok_or_else(|| {
            warn!(system, "unknown system");
            ControllerError::UnknownSystem {
                system: system.to_owned(),
            }
        })
    }

    fn slot_mut(&mut self, system: &str) -> Result<&mut SystemSlot, ControllerError> {
        self.systems.get_mut(system).ok_or_else(|| {
            warn!(system, "unknown system");
            ControllerError::UnknownSystem {
                system: system.to_owned(),
            }
        })
    }
}
