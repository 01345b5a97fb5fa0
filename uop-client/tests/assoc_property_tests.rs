//! Property-Based Tests for Association Round-Trips
//!
//! **Property 1: Fresh Load**
//!
//! For any committed dataset, a new client reports exactly the committed
//! associations, with every role edge visible from both ends.
//!
//! **Property 2: Commit Round-Trip**
//!
//! For any sequence of association edits, the associations a client sees
//! before commit are the ones a fresh client sees after it.
//!
//! **Property 3: Abort Isolation**
//!
//! For any sequence of association edits followed by abort, the committed
//! store is unchanged.

use proptest::prelude::*;
use uop_client::{Assoc, AssocKind, ClientConfig, ClientState, MockStore, ObjectId};
use uop_test_utils::{arb_dataset, assert_index_consistent, init_test_tracing, Dataset};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn open_client(store: &MockStore) -> Result<ClientState<MockStore>, TestCaseError> {
    init_test_tracing();
    ClientState::new(store.clone(), ClientConfig::default())
        .map_err(|e| TestCaseError::fail(format!("Failed to open client: {}", e)))
}

/// Every association of every dataset object, sorted for comparison.
fn observed(
    client: &mut ClientState<MockStore>,
    objects: &[ObjectId],
) -> Result<Vec<(ObjectId, String, Option<ObjectId>)>, TestCaseError> {
    let mut seen = Vec::new();
    for id in objects {
        let Some((_, assocs)) = client
            .get_object_and_associations(*id)
            .map_err(|e| TestCaseError::fail(e.to_string()))?
        else {
            continue;
        };
        seen.extend(assocs.into_iter().map(|a| (a.subject, a.name, a.object)));
    }
    seen.sort();
    Ok(seen)
}

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

#[derive(Debug, Clone)]
enum Edit {
    Tag(usize, usize),
    Untag(usize, usize),
    Group(usize, usize),
    Ungroup(usize, usize),
    Relate(usize, usize, usize),
    Unrelate(usize, usize, usize),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..8, 0usize..3).prop_map(|(o, t)| Edit::Tag(o, t)),
        (0usize..8, 0usize..3).prop_map(|(o, t)| Edit::Untag(o, t)),
        (0usize..8, 0usize..4).prop_map(|(o, g)| Edit::Group(o, g)),
        (0usize..8, 0usize..4).prop_map(|(o, g)| Edit::Ungroup(o, g)),
        (0usize..4, 0usize..8, 0usize..8).prop_map(|(r, s, o)| Edit::Relate(r, s, o)),
        (0usize..4, 0usize..8, 0usize..8).prop_map(|(r, s, o)| Edit::Unrelate(r, s, o)),
    ]
}

/// Turn an index-based edit into an association. Role indices 2 and 3 use
/// the reverse names.
fn to_assoc(dataset: &Dataset, edit: &Edit) -> (bool, Assoc) {
    let object = |i: usize| dataset.objects[i % dataset.objects.len()];
    let role_name = |r: usize| {
        let role = &dataset.roles[r % dataset.roles.len()];
        if r >= dataset.roles.len() {
            role.reverse_name.clone().unwrap_or_else(|| role.name.clone())
        } else {
            role.name.clone()
        }
    };
    match *edit {
        Edit::Tag(o, t) => (true, Assoc::tag(object(o), dataset.tags[t % 3].name.clone())),
        Edit::Untag(o, t) => (false, Assoc::tag(object(o), dataset.tags[t % 3].name.clone())),
        Edit::Group(o, g) => (true, Assoc::group(object(o), dataset.groups[g % 4].name.clone())),
        Edit::Ungroup(o, g) => (false, Assoc::group(object(o), dataset.groups[g % 4].name.clone())),
        Edit::Relate(r, s, o) => (true, Assoc::role(object(s), role_name(r), object(o))),
        Edit::Unrelate(r, s, o) => (false, Assoc::role(object(s), role_name(r), object(o))),
    }
}

fn apply_edits(
    client: &mut ClientState<MockStore>,
    dataset: &Dataset,
    edits: &[Edit],
) -> Result<(), TestCaseError> {
    for edit in edits {
        let (add, assoc) = to_assoc(dataset, edit);
        let result = if add {
            client.associate(&assoc)
        } else {
            client.disassociate(&assoc)
        };
        result.map_err(|e| TestCaseError::fail(format!("{:?} failed: {}", edit, e)))?;
    }
    Ok(())
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// **Property 1: Fresh Load**
    #[test]
    fn prop_fresh_client_sees_committed_assocs(dataset in arb_dataset()) {
        let data = dataset.data().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut client = open_client(&dataset.store)?;
        let seen = observed(&mut client, &dataset.objects)?;

        let assocs: Vec<Assoc> = seen
            .iter()
            .map(|(subject, name, object)| {
                let kind = if object.is_some() {
                    AssocKind::Role
                } else if data.has_tag(name, *subject) {
                    AssocKind::Tag
                } else {
                    AssocKind::Group
                };
                Assoc { kind, subject: *subject, name: name.clone(), object: *object }
            })
            .collect();
        assert_index_consistent(&data, &assocs);

        let expected = data.tagged.len() + data.grouped.len() + 2 * data.related.len();
        prop_assert_eq!(seen.len(), expected);
        prop_assert!(client.verify().is_ok());
    }

    /// **Property 2: Commit Round-Trip**
    #[test]
    fn prop_commit_round_trips_assocs(
        dataset in arb_dataset(),
        edits in prop::collection::vec(edit_strategy(), 1..24),
    ) {
        let mut client = open_client(&dataset.store)?;
        client.begin_transaction().map_err(|e| TestCaseError::fail(e.to_string()))?;
        apply_edits(&mut client, &dataset, &edits)?;
        prop_assert!(client.verify().is_ok());

        let before = observed(&mut client, &dataset.objects)?;
        client.commit().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut fresh = open_client(&dataset.store)?;
        let after = observed(&mut fresh, &dataset.objects)?;
        prop_assert_eq!(before, after);
    }

    /// **Property 3: Abort Isolation**
    #[test]
    fn prop_abort_leaves_store_unchanged(
        dataset in arb_dataset(),
        edits in prop::collection::vec(edit_strategy(), 1..24),
    ) {
        let original = dataset.data().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut client = open_client(&dataset.store)?;
        client.begin_transaction().map_err(|e| TestCaseError::fail(e.to_string()))?;
        apply_edits(&mut client, &dataset, &edits)?;
        client.abort().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let after = dataset.data().map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(original == after, "store changed after abort");
        prop_assert!(!client.in_transaction());
    }
}
