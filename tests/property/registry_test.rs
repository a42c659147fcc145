// tests/property/registry_test.rs

//! Property-based tests for the session registry.
//! Random sequences of adds, removals and room changes are checked against a
//! plain model of which sessions exist and where they are.

use proptest::prelude::*;
use roomcast::core::events::Event;
use roomcast::core::registry::{DEFAULT_ROOM, Registry, SessionChannels, SessionId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Add,
    Remove(usize),
    SetRoom(usize, String),
    Broadcast(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let room = prop::sample::select(vec!["", "general", "random", "dev"]).prop_map(String::from);
    prop_oneof![
        3 => Just(Op::Add),
        2 => any::<usize>().prop_map(Op::Remove),
        2 => (any::<usize>(), room.clone()).prop_map(|(i, r)| Op::SetRoom(i, r)),
        1 => room.prop_map(Op::Broadcast),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..=100)) {
        let registry = Registry::new(usize::MAX, 256);
        // Every id ever added, live or not, so removal of dead ids is exercised too.
        let mut known: Vec<SessionId> = Vec::new();
        let mut model: HashMap<SessionId, String> = HashMap::new();
        let mut channels: HashMap<SessionId, SessionChannels> = HashMap::new();

        for op in ops {
            match op {
                Op::Add => {
                    let c = registry.add(None).unwrap();
                    prop_assert!(!model.contains_key(&c.id));
                    known.push(c.id);
                    model.insert(c.id, DEFAULT_ROOM.to_string());
                    channels.insert(c.id, c);
                }
                Op::Remove(i) if !known.is_empty() => {
                    let id = known[i % known.len()];
                    prop_assert_eq!(registry.remove(id), model.remove(&id).is_some());
                }
                Op::SetRoom(i, room) if !known.is_empty() => {
                    let id = known[i % known.len()];
                    let live = model.contains_key(&id);
                    prop_assert_eq!(registry.set_room(id, &room), live);
                    if live {
                        model.insert(id, room);
                    }
                }
                Op::Broadcast(room) => {
                    let expected = model.values().filter(|r| **r == room).count();
                    let event = Event::new("room_check", &room).unwrap();
                    prop_assert_eq!(registry.broadcast_to_room(&room, event), expected);
                }
                _ => {}
            }

            prop_assert_eq!(registry.len(), model.len());
        }

        for (id, room) in &model {
            let actual = registry.room_of(*id);
            prop_assert_eq!(actual.as_deref(), Some(room.as_str()));
        }
        for room in ["", "general", "random", "dev"] {
            let mut members = registry.members_of(room);
            members.sort_unstable();
            let mut expected: Vec<SessionId> =
                model.iter().filter(|(_, r)| *r == room).map(|(id, _)| *id).collect();
            expected.sort_unstable();
            prop_assert_eq!(members, expected);
        }
        drop(channels);
    }
}
