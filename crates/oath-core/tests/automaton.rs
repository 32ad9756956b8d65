//! Behavioural properties of the automaton controller driven through its
//! public API: replay determinism, first-match ordering, and dirty-flag pull
//! semantics across a longer input sequence.

#![allow(clippy::unwrap_used)]

use oath_core::{Action, AutomatonController, NodeId, WorldContext};
use oath_types::TransitionInput;

/// A small crime automaton: lawful -> wanted -> jailed -> lawful.
fn crime_automaton() -> (AutomatonController, [NodeId; 3]) {
    let mut controller = AutomatonController::new();
    let lawful = controller.create_node("lawful").unwrap();
    let wanted = controller.create_node("wanted").unwrap();
    let jailed = controller.create_node("jailed").unwrap();

    controller
        .add_transition(
            lawful,
            |i| i.is("crime") && i.int("severity").unwrap_or(0) > 3,
            wanted,
            "serious crime makes you wanted",
        )
        .unwrap();
    controller
        .add_transition(lawful, |i| i.is("crime"), lawful, "minor crime is shrugged off")
        .unwrap();
    controller
        .add_transition(wanted, |i| i.is("pay_bounty"), lawful, "bounty paid")
        .unwrap();
    controller
        .add_transition(wanted, |i| i.is("arrest"), jailed, "arrested by guards")
        .unwrap();
    controller
        .add_transition(jailed, |i| i.is("serve"), lawful, "sentence served")
        .unwrap();

    controller.node_mut(wanted).unwrap().add_action(Action::fixed(
        "pay_bounty",
        "Pay off the bounty",
        TransitionInput::new("pay_bounty"),
    ));
    controller.set_system_root("crime", lawful).unwrap();
    (controller, [lawful, wanted, jailed])
}

fn script() -> Vec<TransitionInput> {
    vec![
        TransitionInput::new("crime").with("severity", 1_i64),
        TransitionInput::new("crime").with("severity", 5_i64),
        TransitionInput::new("serve"),
        TransitionInput::new("arrest"),
        TransitionInput::new("serve"),
        TransitionInput::new("crime").with("severity", 9_i64),
        TransitionInput::new("pay_bounty"),
    ]
}

fn replay(inputs: &[TransitionInput]) -> Vec<String> {
    let (mut controller, _) = crime_automaton();
    let mut world = WorldContext::new();
    inputs
        .iter()
        .map(|input| {
            controller.process_input("crime", input, &mut world).unwrap();
            controller.current_node_name("crime").unwrap().to_owned()
        })
        .collect()
}

#[test]
fn replaying_inputs_is_deterministic() {
    let inputs = script();
    let first = replay(&inputs);
    assert_eq!(first, replay(&inputs));
    assert_eq!(
        first,
        vec!["lawful", "wanted", "wanted", "jailed", "lawful", "wanted", "lawful"]
    );
}

#[test]
fn first_registered_matching_rule_wins() {
    let mut controller = AutomatonController::new();
    let root = controller.create_node("root").unwrap();
    let first = controller.create_node("first").unwrap();
    let second = controller.create_node("second").unwrap();
    controller.add_transition(root, |_| true, first, "r1").unwrap();
    controller.add_transition(root, |_| true, second, "r2").unwrap();
    controller.set_system_root("s", root).unwrap();

    let outcome = controller
        .process_input("s", &TransitionInput::new("anything"), &mut WorldContext::new())
        .unwrap();
    assert_eq!(outcome.next, first);
    assert_eq!(
        controller.node(root).unwrap().describe_transitions(),
        vec!["r1", "r2"]
    );
}

#[test]
fn dirty_flag_is_pull_based() {
    let (mut controller, [lawful, wanted, _]) = crime_automaton();
    let mut world = WorldContext::new();
    controller.reset_changed_flag("crime").unwrap();

    // Self-loop: handled but not a change.
    let minor = TransitionInput::new("crime").with("severity", 2_i64);
    let outcome = controller.process_input("crime", &minor, &mut world).unwrap();
    assert!(outcome.handled);
    assert_eq!(outcome.next, lawful);
    assert!(!controller.has_changed("crime"));

    let serious = TransitionInput::new("crime").with("severity", 7_i64);
    controller.process_input("crime", &serious, &mut world).unwrap();
    assert!(controller.has_changed("crime"));
    // Stays set until someone clears it.
    controller
        .process_input("crime", &TransitionInput::new("noise"), &mut world)
        .unwrap();
    assert!(controller.has_changed("crime"));
    controller.reset_changed_flag("crime").unwrap();
    assert!(!controller.has_changed("crime"));
    assert_eq!(controller.current_node("crime"), Some(wanted));
}

#[test]
fn actions_follow_the_current_node_and_drive_inputs() {
    let (mut controller, [lawful, ..]) = crime_automaton();
    let mut world = WorldContext::new();
    assert!(controller.available_actions("crime").unwrap().is_empty());

    let serious = TransitionInput::new("crime").with("severity", 7_i64);
    controller.process_input("crime", &serious, &mut world).unwrap();
    let actions = controller.available_actions("crime").unwrap();
    assert_eq!(actions.len(), 1);

    let input = actions.first().unwrap().input();
    let outcome = controller.process_input("crime", &input, &mut world).unwrap();
    assert_eq!(outcome.next, lawful);
}
