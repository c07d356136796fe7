//! Property tests for check semantics
//!
//! - Monotonicity along the namespace action chain: admin ⇒ edit ⇒ view
//! - Hierarchy inheritance: read on a parent folder holds on its children
//! - Determinism: repeating a check against an unchanged store gives the same answer
//! - Termination on arbitrary, possibly cyclic, parent graphs

use proptest::prelude::*;
use rebac_engine::*;
use std::sync::Arc;

const USERS: [&str; 4] = ["u0", "u1", "u2", "u3"];
const ACTIONS: [&str; 3] = ["admin", "edit", "view"];

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn engine_with(tuples: Vec<Tuple>) -> AuthorizationEngine {
    let repo = Arc::new(InMemoryTupleRepository::with_tuples(tuples));
    AuthorizationEngine::dashboard(repo, EngineConfig::default()).unwrap()
}

/// Grants of one action to one user on one of two namespaces
fn arb_namespace_grants() -> impl Strategy<Value = Vec<Tuple>> {
    prop::collection::vec((0..2usize, 0..ACTIONS.len(), 0..USERS.len()), 0..10).prop_map(
        |grants| {
            grants
                .into_iter()
                .map(|(ns, action, user)| {
                    Tuple::new(
                        ObjectRef::new("namespace", &format!("n{}", ns)),
                        ACTIONS[action],
                        SubjectRef::user(USERS[user]),
                    )
                })
                .collect()
        },
    )
}

/// Parent edges between five folders, cycles included, plus read grants
fn arb_folder_graph() -> impl Strategy<Value = (Vec<(usize, usize)>, Vec<(usize, usize)>)> {
    (
        prop::collection::vec((0..5usize, 0..5usize), 0..8),
        prop::collection::vec((0..5usize, 0..USERS.len()), 0..4),
    )
}

fn folder(index: usize) -> ObjectRef {
    ObjectRef::new("folder2", &format!("f{}", index))
}

fn folder_tuples(edges: &[(usize, usize)], grants: &[(usize, usize)]) -> Vec<Tuple> {
    let parents = edges.iter().map(|(child, parent)| {
        Tuple::new(
            folder(*child),
            "parent",
            SubjectRef::new("folder2", &format!("f{}", parent)),
        )
    });
    let reads = grants
        .iter()
        .map(|(f, user)| Tuple::new(folder(*f), "read", SubjectRef::user(USERS[*user])));
    parents.chain(reads).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_action_chain_is_monotonic(tuples in arb_namespace_grants()) {
        let engine = engine_with(tuples);

        run(async {
            for ns in 0..2 {
                let object = ObjectRef::new("namespace", &format!("n{}", ns));
                for user in USERS {
                    let subject = SubjectRef::user(user);
                    let admin = engine.check(&object, "admin", &subject).await.unwrap();
                    let edit = engine.check(&object, "edit", &subject).await.unwrap();
                    let view = engine.check(&object, "view", &subject).await.unwrap();

                    prop_assert!(!admin || edit, "admin without edit for {} on {}", user, object);
                    prop_assert!(!edit || view, "edit without view for {} on {}", user, object);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_expand_agrees_with_check(tuples in arb_namespace_grants()) {
        let engine = engine_with(tuples);

        run(async {
            let object = ObjectRef::new("namespace", "n0");
            let subjects = engine.expand(&object, "view").await.unwrap();
            for user in USERS {
                let subject = SubjectRef::user(user);
                let allowed = engine.check(&object, "view", &subject).await.unwrap();
                prop_assert_eq!(allowed, subjects.contains(&subject));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_read_inherits_and_checks_terminate((edges, grants) in arb_folder_graph()) {
        let engine = engine_with(folder_tuples(&edges, &grants));

        run(async {
            for (child, parent) in &edges {
                for user in USERS {
                    let subject = SubjectRef::user(user);
                    let on_parent = engine.check(&folder(*parent), "read", &subject).await.unwrap();
                    let on_child = engine.check(&folder(*child), "read", &subject).await.unwrap();
                    prop_assert!(
                        !on_parent || on_child,
                        "f{} inherits from f{} but {} lost read",
                        child, parent, user
                    );
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_check_is_deterministic((edges, grants) in arb_folder_graph(), target in 0..5usize, user in 0..USERS.len()) {
        let engine = engine_with(folder_tuples(&edges, &grants));
        let subject = SubjectRef::user(USERS[user]);

        run(async {
            let first = engine.check(&folder(target), "read", &subject).await.unwrap();
            let second = engine.check(&folder(target), "read", &subject).await.unwrap();
            prop_assert_eq!(first, second);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
