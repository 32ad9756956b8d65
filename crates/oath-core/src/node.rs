//! State nodes: the vertices of every subsystem automaton.
//!
//! A node owns an ordered list of [`TransitionRule`]s, a small bag of typed
//! state data, the [`Action`]s it offers to a presentation layer, and an
//! optional [`NodeBehavior`] that runs when the controller enters or leaves
//! it. Nodes are created and owned by the
//! [`AutomatonController`](crate::controller::AutomatonController); everything
//! else refers to them by [`NodeId`].

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use oath_types::{StateValue, TransitionInput};

use crate::context::WorldContext;

/// Handle to a node in the controller's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Wrap a raw arena index.
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// The raw arena index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Predicate deciding whether a rule fires for an input.
pub type Predicate = Box<dyn Fn(&TransitionInput) -> bool + Send + Sync>;

/// A guarded edge out of a node.
pub struct TransitionRule {
    predicate: Predicate,
    target: NodeId,
    description: String,
}

impl TransitionRule {
    /// Whether this rule's predicate accepts `input`.
    pub fn matches(&self, input: &TransitionInput) -> bool {
        (self.predicate)(input)
    }

    /// The node this rule leads to.
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// Human-readable description of the rule.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for TransitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRule")
            .field("target", &self.target)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// An interaction a presentation layer can offer while a node is current.
///
/// The generator synthesizes the [`TransitionInput`] needed to attempt the
/// action, so a UI never has to know which predicates a node uses.
#[derive(Clone)]
pub struct Action {
    id: String,
    description: String,
    generator: Arc<dyn Fn() -> TransitionInput + Send + Sync>,
}

impl Action {
    /// Create an action with a custom input generator.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        generator: impl Fn() -> TransitionInput + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            generator: Arc::new(generator),
        }
    }

    /// Create an action that always produces the same input.
    pub fn fixed(
        id: impl Into<String>,
        description: impl Into<String>,
        input: TransitionInput,
    ) -> Self {
        Self::new(id, description, move || input.clone())
    }

    /// Stable identifier of the action.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Synthesize the input that attempts this action.
    pub fn input(&self) -> TransitionInput {
        (self.generator)()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Side effects attached to a node.
///
/// All methods default to no-ops; implement only what a node needs.
pub trait NodeBehavior: Send {
    /// Runs after the controller makes this node current.
    fn on_enter(&mut self, _world: &mut WorldContext) {}

    /// Runs before the controller leaves this node.
    fn on_exit(&mut self, _world: &mut WorldContext) {}

    /// Actions offered while this node is current. Defaults to the node's
    /// statically registered actions.
    fn available_actions(&self, node: &StateNode) -> Vec<Action> {
        node.actions().to_vec()
    }
}

/// A named vertex of a subsystem automaton.
pub struct StateNode {
    id: NodeId,
    name: String,
    rules: Vec<TransitionRule>,
    data: BTreeMap<String, StateValue>,
    actions: Vec<Action>,
    behavior: Option<Box<dyn NodeBehavior>>,
}

impl StateNode {
    pub(crate) const fn new(id: NodeId, name: String) -> Self {
        Self {
            id,
            name,
            rules: Vec::new(),
            data: BTreeMap::new(),
            actions: Vec::new(),
            behavior: None,
        }
    }

    /// This node's handle.
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// This node's name, unique within its controller.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a transition rule. Rules are evaluated in the order they were
    /// added; duplicates and unreachable rules are allowed.
    pub fn add_transition(
        &mut self,
        predicate: impl Fn(&TransitionInput) -> bool + Send + Sync + 'static,
        target: NodeId,
        description: impl Into<String>,
    ) {
        self.rules.push(TransitionRule {
            predicate: Box::new(predicate),
            target,
            description: description.into(),
        });
    }

    /// Target of the first rule matching `input`, or `None` to stay put.
    pub fn evaluate_transition(&self, input: &TransitionInput) -> Option<NodeId> {
        self.rules
            .iter()
            .find(|rule| rule.matches(input))
            .map(TransitionRule::target)
    }

    /// The rules in evaluation order.
    pub fn transitions(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// Descriptions of the rules in evaluation order.
    pub fn describe_transitions(&self) -> Vec<&str> {
        self.rules.iter().map(TransitionRule::description).collect()
    }

    /// Read a state data entry.
    pub fn data(&self, key: &str) -> Option<&StateValue> {
        self.data.get(key)
    }

    /// Write a state data entry, returning the previous value.
    pub fn set_data(
        &mut self,
        key: impl Into<String>,
        value: impl Into<StateValue>,
    ) -> Option<StateValue> {
        self.data.insert(key.into(), value.into())
    }

    /// All state data.
    pub const fn data_map(&self) -> &BTreeMap<String, StateValue> {
        &self.data
    }

    /// Register an action offered while this node is current.
    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// The statically registered actions.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Attach enter/exit behaviour, replacing any previous one.
    pub fn set_behavior(&mut self, behavior: impl NodeBehavior + 'static) {
        self.behavior = Some(Box::new(behavior));
    }

    /// Whether a behaviour is attached.
    pub const fn has_behavior(&self) -> bool {
        self.behavior.is_some()
    }

    /// Run the enter hook.
    pub fn on_enter(&mut self, world: &mut WorldContext) {
        if let Some(behavior) = self.behavior.as_mut() {
            behavior.on_enter(world);
        }
    }

    /// Run the exit hook.
    pub fn on_exit(&mut self, world: &mut WorldContext) {
        if let Some(behavior) = self.behavior.as_mut() {
            behavior.on_exit(world);
        }
    }

    /// Actions a presentation layer may offer right now.
    pub fn available_actions(&self) -> Vec<Action> {
        self.behavior.as_ref().map_or_else(
            || self.actions.clone(),
            |behavior| behavior.available_actions(self),
        )
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rules", &self.rules)
            .field("data", &self.data)
            .field("actions", &self.actions)
            .field("has_behavior", &self.behavior.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn node(index: usize, name: &str) -> StateNode {
        StateNode::new(NodeId::from_index(index), name.to_owned())
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut root = node(0, "root");
        root.add_transition(|i| i.is("buy"), NodeId::from_index(1), "to shop");
        root.add_transition(|i| i.is("buy"), NodeId::from_index(2), "to market");

        let input = TransitionInput::new("buy");
        assert_eq!(root.evaluate_transition(&input), Some(NodeId::from_index(1)));
    }

    #[test]
    fn no_match_means_stay() {
        let mut root = node(0, "root");
        root.add_transition(|i| i.is("buy"), NodeId::from_index(1), "to shop");
        assert_eq!(root.evaluate_transition(&TransitionInput::new("sell")), None);
    }

    #[test]
    fn describe_lists_rules_in_order() {
        let mut root = node(0, "root");
        root.add_transition(|_| false, NodeId::from_index(1), "never");
        root.add_transition(|_| true, NodeId::from_index(2), "always");
        assert_eq!(root.describe_transitions(), vec!["never", "always"]);
    }

    #[test]
    fn state_data_is_typed() {
        let mut n = node(0, "shop");
        assert!(n.set_data("open", true).is_none());
        n.set_data("stock", 12_i64);
        assert_eq!(n.data("open").and_then(StateValue::as_bool), Some(true));
        assert_eq!(n.data("stock").and_then(StateValue::as_int), Some(12));
        assert_eq!(n.data_map().len(), 2);
    }

    #[test]
    fn actions_generate_inputs() {
        let mut n = node(0, "shop");
        n.add_action(Action::fixed(
            "buy_bread",
            "Buy a loaf of bread",
            TransitionInput::new("buy").with("item", "bread"),
        ));
        let actions = n.available_actions();
        assert_eq!(actions.len(), 1);
        let action = actions.first().unwrap();
        assert_eq!(action.id(), "buy_bread");
        assert_eq!(action.input().text("item"), Some("bread"));
    }

    struct Counter {
        entered: u32,
    }

    impl NodeBehavior for Counter {
        fn on_enter(&mut self, world: &mut WorldContext) {
            self.entered = self.entered.saturating_add(1);
            world.set_extra("entered", i64::from(self.entered));
        }

        fn available_actions(&self, _node: &StateNode) -> Vec<Action> {
            vec![Action::fixed("leave", "Leave", TransitionInput::new("leave"))]
        }
    }

    #[test]
    fn behavior_hooks_run_and_override_actions() {
        let mut n = node(0, "tavern");
        n.add_action(Action::fixed("drink", "Drink", TransitionInput::new("drink")));
        n.set_behavior(Counter { entered: 0 });

        let mut world = WorldContext::new();
        n.on_enter(&mut world);
        n.on_enter(&mut world);
        n.on_exit(&mut world);

        assert_eq!(world.extra("entered").and_then(StateValue::as_int), Some(2));
        let ids: Vec<String> = n.available_actions().iter().map(|a| a.id().to_owned()).collect();
        assert_eq!(ids, vec!["leave"]);
    }
}
