//! End-to-end clone scenarios over small object graphs

use crate::*;
use std::any::TypeId;
use std::sync::Arc;

#[derive(Default)]
struct Root {
    child_a: Option<ObjRef>,
}

#[derive(Default)]
struct Node {
    value: i64,
    next: Option<ObjRef>,
}

#[derive(Default)]
struct Pair {
    left: Option<ObjRef>,
    right: Option<ObjRef>,
}

#[derive(Default)]
struct ListNode {
    value: i64,
    next: Option<ObjRef>,
}

fn base_registry() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.register(
        TypeDescriptor::of::<Root>("Root")
            .object_field(
                "child_a",
                |r: &Root| r.child_a.clone(),
                |r: &mut Root, v| r.child_a = v,
            )
            .build(),
    );
    // `next` is a back-reference into the surrounding graph, never owned.
    types.register(
        TypeDescriptor::of::<Node>("Node")
            .value_field("value", |s: &Node, t: &mut Node| t.value = s.value)
            .object_field_with(
                "next",
                FieldOverride::with_behavior(CloneBehavior::Reference),
                |n: &Node| n.next.clone(),
                |n: &mut Node, v| n.next = v,
            )
            .build(),
    );
    types.register(
        TypeDescriptor::of::<Pair>("Pair")
            .object_field(
                "left",
                |p: &Pair| p.left.clone(),
                |p: &mut Pair, v| p.left = v,
            )
            .object_field(
                "right",
                |p: &Pair| p.right.clone(),
                |p: &mut Pair, v| p.right = v,
            )
            .build(),
    );
    types.register(
        TypeDescriptor::of::<ListNode>("ListNode")
            .value_field("value", |s: &ListNode, t: &mut ListNode| t.value = s.value)
            .object_field(
                "next",
                |n: &ListNode| n.next.clone(),
                |n: &mut ListNode, v| n.next = v,
            )
            .build(),
    );
    types
}

fn provider_with(types: TypeRegistry) -> CloneProvider {
    CloneProvider::new(Arc::new(SurrogateRegistry::new()), Arc::new(types))
}

fn ctx() -> CloneProviderContext {
    CloneProviderContext::default()
}

#[test_log::test]
fn test_self_cycle_terminates_and_is_rewritten() {
    let provider = provider_with(base_registry());
    let root = new_obj(Pair::default());
    with_obj_mut(&root, |p: &mut Pair| p.left = Some(root.clone()));

    let cloned = provider.clone_object(&root, &ctx()).unwrap();

    assert!(!same_obj(&root, &cloned));
    with_obj(&cloned, |p: &Pair| {
        assert!(same_obj(p.left.as_ref().unwrap(), &cloned));
    })
    .unwrap();
}

#[test]
fn test_mutual_cycle_terminates() {
    let provider = provider_with(base_registry());
    let a = new_obj(Pair::default());
    let b = new_obj(Pair::default());
    with_obj_mut(&a, |p: &mut Pair| p.left = Some(b.clone()));
    with_obj_mut(&b, |p: &mut Pair| p.left = Some(a.clone()));

    let cloned_a = provider.clone_object(&a, &ctx()).unwrap();
    let cloned_b = with_obj(&cloned_a, |p: &Pair| p.left.clone().unwrap()).unwrap();
    assert!(!same_obj(&cloned_b, &b));
    let back = with_obj(&cloned_b, |p: &Pair| p.left.clone().unwrap()).unwrap();
    assert!(same_obj(&back, &cloned_a));
}

#[test_log::test]
fn test_reference_to_root_is_rewritten_to_new_root() {
    // Root{child_a: ChildObject -> Node{value: 5, next: Reference -> Root}}
    let provider = provider_with(base_registry());
    let root = new_obj(Root::default());
    let node = new_obj(Node {
        value: 5,
        next: Some(root.clone()),
    });
    with_obj_mut(&root, |r: &mut Root| r.child_a = Some(node.clone()));

    let cloned = provider.clone_object(&root, &ctx()).unwrap();

    let cloned_child = with_obj(&cloned, |r: &Root| r.child_a.clone().unwrap()).unwrap();
    assert!(!same_obj(&cloned_child, &node));
    with_obj(&cloned_child, |n: &Node| {
        assert_eq!(n.value, 5);
        assert!(same_obj(n.next.as_ref().unwrap(), &cloned));
    })
    .unwrap();
}

#[test]
fn test_shared_child_stays_shared() {
    let provider = provider_with(base_registry());
    let shared = new_obj(ListNode {
        value: 3,
        next: None,
    });
    let pair = new_obj(Pair {
        left: Some(shared.clone()),
        right: Some(shared.clone()),
    });

    let cloned = provider.clone_object(&pair, &ctx()).unwrap();

    let (left, right) = with_obj(&cloned, |p: &Pair| {
        (p.left.clone().unwrap(), p.right.clone().unwrap())
    })
    .unwrap();
    assert!(same_obj(&left, &right));
    assert!(!same_obj(&left, &shared));
}

#[test]
fn test_child_objects_are_always_new_instances() {
    let provider = provider_with(base_registry());
    let tail = new_obj(ListNode {
        value: 2,
        next: None,
    });
    let head = new_obj(ListNode {
        value: 1,
        next: Some(tail.clone()),
    });

    let cloned = provider.clone_object(&head, &ctx()).unwrap();

    assert!(!same_obj(&cloned, &head));
    let cloned_tail = with_obj(&cloned, |n: &ListNode| n.next.clone().unwrap()).unwrap();
    assert!(!same_obj(&cloned_tail, &tail));
}

#[test]
fn test_round_trip_structural_equality() {
    let provider = provider_with(base_registry());
    let mut head: Option<ObjRef> = None;
    for value in (0..5).rev() {
        head = Some(new_obj(ListNode { value, next: head }));
    }
    let head = head.unwrap();

    let cloned = provider.clone_object(&head, &ctx()).unwrap();

    let mut source_cursor = Some(head);
    let mut target_cursor = Some(cloned);
    while let (Some(source), Some(target)) = (source_cursor.clone(), target_cursor.clone()) {
        assert!(!same_obj(&source, &target));
        let (source_value, source_next) =
            with_obj(&source, |n: &ListNode| (n.value, n.next.clone())).unwrap();
        let (target_value, target_next) =
            with_obj(&target, |n: &ListNode| (n.value, n.next.clone())).unwrap();
        assert_eq!(source_value, target_value);
        assert_eq!(source_next.is_some(), target_next.is_some());
        source_cursor = source_next;
        target_cursor = target_next;
    }
}

#[test]
fn test_external_reference_is_preserved_verbatim() {
    // An object only reachable through a Reference field is external state
    // and must not be duplicated or rewritten.
    let provider = provider_with(base_registry());
    let external = new_obj(Node {
        value: 9,
        next: None,
    });
    let root = new_obj(Node {
        value: 1,
        next: Some(external.clone()),
    });

    let cloned = provider.clone_object(&root, &ctx()).unwrap();

    with_obj(&cloned, |n: &Node| {
        assert!(same_obj(n.next.as_ref().unwrap(), &external));
    })
    .unwrap();
}

#[test]
fn test_declared_external_type_is_shared_not_cloned() {
    struct Blob;
    let mut types = base_registry();
    types.declare_external::<Blob>();
    let provider = provider_with(types);

    let blob = new_obj(Blob);
    let pair = new_obj(Pair {
        left: Some(blob.clone()),
        right: None,
    });

    let cloned = provider.clone_object(&pair, &ctx()).unwrap();

    with_obj(&cloned, |p: &Pair| {
        assert!(same_obj(p.left.as_ref().unwrap(), &blob));
    })
    .unwrap();
}

#[test]
fn test_two_operations_are_independent() {
    let provider = provider_with(base_registry());
    let root = new_obj(ListNode {
        value: 4,
        next: None,
    });
    let first = provider.clone_object(&root, &ctx()).unwrap();
    let second = provider.clone_object(&root, &ctx()).unwrap();
    assert!(!same_obj(&first, &second));
}

#[test]
fn test_unmappable_skip_policy_drops_reference() {
    struct Mystery;
    let provider = provider_with(base_registry());
    let pair = new_obj(Pair {
        left: Some(new_obj(Mystery)),
        right: None,
    });

    let (cloned, stats) = provider
        .clone_object_with_stats(&pair, &ctx())
        .unwrap();

    with_obj(&cloned, |p: &Pair| assert!(p.left.is_none())).unwrap();
    assert_eq!(stats.unmappable_skipped, 1);
}

#[test]
fn test_unmappable_fail_policy_aborts() {
    struct Mystery;
    let provider = provider_with(base_registry());
    let pair = new_obj(Pair {
        left: Some(new_obj(Mystery)),
        right: None,
    });

    let err = provider
        .clone_object(&pair, &ctx().with_unmappable(UnmappablePolicy::Fail))
        .unwrap_err();
    match err {
        CloneError::UnmappableType { field_path, .. } => assert_eq!(field_path, "left"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unmappable_root_always_fails() {
    struct Mystery;
    let provider = provider_with(base_registry());
    let err = provider
        .clone_object(&new_obj(Mystery), &ctx())
        .unwrap_err();
    assert!(matches!(err, CloneError::UnmappableType { .. }));
}

#[derive(Default)]
struct Res {
    uid: u64,
    data: i64,
    cache: Option<ObjRef>,
    raw: Option<ObjRef>,
}

fn res_registry() -> TypeRegistry {
    let mut types = base_registry();
    types.register(
        TypeDescriptor::of::<Res>("Res")
            .value_field_flags(
                "uid",
                FieldOverride::with_flags(CloneFieldFlags::identity_relevant()),
                |s: &Res, t: &mut Res| t.uid = s.uid,
            )
            .value_field("data", |s: &Res, t: &mut Res| t.data = s.data)
            .object_field_with(
                "cache",
                FieldOverride::with_flags(CloneFieldFlags::skipped()),
                |r: &Res| r.cache.clone(),
                |r: &mut Res, v| r.cache = v,
            )
            .object_field_with(
                "raw",
                FieldOverride::with_flags(CloneFieldFlags::shallow()),
                |r: &Res| r.raw.clone(),
                |r: &mut Res, v| r.raw = v,
            )
            .build(),
    );
    types
}

#[test]
fn test_identity_relevant_field_follows_context() {
    let provider = provider_with(res_registry());
    let res = new_obj(Res {
        uid: 77,
        data: 5,
        cache: None,
        raw: None,
    });

    let preserved = provider.clone_object(&res, &ctx()).unwrap();
    with_obj(&preserved, |r: &Res| {
        assert_eq!(r.uid, 77);
        assert_eq!(r.data, 5);
    })
    .unwrap();

    let fresh = provider
        .clone_object(&res, &CloneProviderContext::new_identity())
        .unwrap();
    with_obj(&fresh, |r: &Res| {
        assert_eq!(r.uid, 0);
        assert_eq!(r.data, 5);
    })
    .unwrap();
}

#[test]
fn test_skip_flag_leaves_target_untouched() {
    let provider = provider_with(res_registry());
    let res = new_obj(Res {
        uid: 1,
        data: 0,
        cache: Some(new_obj(ListNode::default())),
        raw: None,
    });

    let cloned = provider.clone_object(&res, &ctx()).unwrap();
    with_obj(&cloned, |r: &Res| assert!(r.cache.is_none())).unwrap();
}

#[test]
fn test_shallow_flag_copies_reference_verbatim() {
    let provider = provider_with(res_registry());
    let original = new_obj(ListNode {
        value: 8,
        next: None,
    });
    let res = new_obj(Res {
        uid: 1,
        data: 0,
        cache: None,
        raw: Some(original.clone()),
    });

    let cloned = provider.clone_object(&res, &ctx()).unwrap();
    with_obj(&cloned, |r: &Res| {
        assert!(same_obj(r.raw.as_ref().unwrap(), &original));
    })
    .unwrap();
}

#[test]
fn test_clone_onto_reuses_target_instances() {
    let provider = provider_with(base_registry());
    let source = new_obj(ListNode {
        value: 1,
        next: Some(new_obj(ListNode {
            value: 5,
            next: None,
        })),
    });
    let target_child = new_obj(ListNode::default());
    let target = new_obj(ListNode {
        value: 0,
        next: Some(target_child.clone()),
    });

    provider.clone_onto(&source, &target, &ctx()).unwrap();

    with_obj(&target, |n: &ListNode| {
        assert_eq!(n.value, 1);
        assert!(same_obj(n.next.as_ref().unwrap(), &target_child));
    })
    .unwrap();
    with_obj(&target_child, |n: &ListNode| assert_eq!(n.value, 5)).unwrap();
}

#[test]
fn test_clone_onto_rejects_type_mismatch() {
    let provider = provider_with(base_registry());
    let source = new_obj(ListNode::default());
    let target = new_obj(Pair::default());
    let err = provider.clone_onto(&source, &target, &ctx()).unwrap_err();
    assert!(matches!(err, CloneError::TargetMismatch { .. }));
}

#[test]
fn test_clone_onto_rejects_source_as_target() {
    let provider = provider_with(base_registry());
    let source = new_obj(ListNode::default());
    let err = provider.clone_onto(&source, &source, &ctx()).unwrap_err();
    assert!(matches!(err, CloneError::TargetMismatch { .. }));
}

#[test]
fn test_clone_onto_unmappable_root_fails() {
    struct Mystery;
    let provider = provider_with(base_registry());
    let err = provider
        .clone_onto(&new_obj(Mystery), &new_obj(Mystery), &ctx())
        .unwrap_err();
    assert!(matches!(err, CloneError::UnmappableType { .. }));
}

#[derive(Default)]
struct MirrorCell {
    mate: Option<ObjRef>,
    tag: i64,
}

/// Surrogate whose target can only be built once the whole graph is mapped.
struct MirrorSurrogate;

impl CloneSurrogate for MirrorSurrogate {
    fn name(&self) -> &str {
        "mirror"
    }

    fn matches(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<MirrorCell>()
    }

    fn create_target(&self, _source: &ObjRef, _context: &CloneProviderContext) -> Result<ObjRef> {
        Ok(new_obj(MirrorCell::default()))
    }

    fn setup_targets(
        &self,
        source: &ObjRef,
        _target: &ObjRef,
        setup: &mut dyn CloneTargetSetup,
    ) -> Result<bool> {
        let mate = with_obj(source, |c: &MirrorCell| c.mate.clone()).flatten();
        setup.enter_field("mate");
        let result = setup.handle_object(mate.as_ref(), None, CloneBehavior::ChildObject);
        setup.leave_field();
        result?;
        Ok(true)
    }

    fn late_setup(
        &self,
        source: &ObjRef,
        target: &mut ObjRef,
        op: &dyn CloneOperation,
    ) -> Result<()> {
        let (mate, tag) = with_obj(source, |c: &MirrorCell| (c.mate.clone(), c.tag))
            .ok_or_else(|| CloneError::Custom("expected a MirrorCell".to_string()))?;
        let mate_target = mate.map(|m| op.get_target(&m));
        if let Some(mapped) = &mate_target {
            assert!(op.is_target(mapped));
        }
        *target = new_obj(MirrorCell {
            mate: mate_target,
            tag,
        });
        Ok(())
    }

    fn copy_data(
        &self,
        _source: Option<&ObjRef>,
        _target: &ObjRef,
        _op: &dyn CloneOperation,
    ) -> Result<()> {
        // The late-setup step already built the complete target.
        Ok(())
    }
}

#[test_log::test]
fn test_late_setup_replaces_provisional_target() {
    let mut surrogates = SurrogateRegistry::new();
    surrogates.register(Arc::new(MirrorSurrogate));
    let provider = CloneProvider::new(Arc::new(surrogates), Arc::new(base_registry()));

    let mate = new_obj(ListNode {
        value: 6,
        next: None,
    });
    let cell = new_obj(MirrorCell {
        mate: Some(mate.clone()),
        tag: 11,
    });

    let (cloned, stats) = provider.clone_object_with_stats(&cell, &ctx()).unwrap();

    assert_eq!(stats.late_setups, 1);
    with_obj(&cloned, |c: &MirrorCell| {
        assert_eq!(c.tag, 11);
        let cloned_mate = c.mate.as_ref().unwrap();
        assert!(!same_obj(cloned_mate, &mate));
        with_obj(cloned_mate, |n: &ListNode| assert_eq!(n.value, 6)).unwrap();
    })
    .unwrap();
}

#[derive(Default)]
struct Opaque {
    payload: Vec<u8>,
}

#[test]
fn test_explicit_hooks_bypass_field_table() {
    let mut types = base_registry();
    types.register(
        TypeDescriptor::of::<Opaque>("Opaque")
            .explicit(
                |_source, _target, _setup| Ok(false),
                |source, target, _op| {
                    let payload = with_obj(source, |o: &Opaque| o.payload.clone())
                        .ok_or_else(|| CloneError::Custom("expected an Opaque".to_string()))?;
                    with_obj_mut(target, move |o: &mut Opaque| o.payload = payload)
                        .ok_or_else(|| CloneError::Custom("expected an Opaque".to_string()))?;
                    Ok(())
                },
            )
            .build(),
    );
    let provider = provider_with(types);

    let opaque = new_obj(Opaque {
        payload: vec![1, 2, 3],
    });
    let cloned = provider.clone_object(&opaque, &ctx()).unwrap();

    assert!(!same_obj(&cloned, &opaque));
    with_obj(&cloned, |o: &Opaque| assert_eq!(o.payload, vec![1, 2, 3])).unwrap();
}

#[derive(Default, Clone)]
struct Anchor {
    label: String,
    link: Option<ObjRef>,
}

#[derive(Default)]
struct Holder {
    anchor: Anchor,
}

#[test]
fn test_value_member_with_nested_reference() {
    let mut types = base_registry();
    types.register(
        TypeDescriptor::of::<Anchor>("Anchor")
            .value_field("label", |s: &Anchor, t: &mut Anchor| {
                t.label = s.label.clone()
            })
            .object_field(
                "link",
                |a: &Anchor| a.link.clone(),
                |a: &mut Anchor, v| a.link = v,
            )
            .build(),
    );
    types.register(
        TypeDescriptor::of::<Holder>("Holder")
            .value_field_deep(
                "anchor",
                |h: &Holder, setup| {
                    setup.handle_object(h.anchor.link.as_ref(), None, CloneBehavior::Default)
                },
                |h: &Holder, t: &mut Holder, op| op.handle_value(&h.anchor, &mut t.anchor),
            )
            .build(),
    );
    let provider = provider_with(types);

    let linked = new_obj(ListNode {
        value: 13,
        next: None,
    });
    let holder = new_obj(Holder {
        anchor: Anchor {
            label: "anchor".to_string(),
            link: Some(linked.clone()),
        },
    });

    let cloned = provider.clone_object(&holder, &ctx()).unwrap();

    with_obj(&cloned, |h: &Holder| {
        assert_eq!(h.anchor.label, "anchor");
        let cloned_link = h.anchor.link.as_ref().unwrap();
        assert!(!same_obj(cloned_link, &linked));
        with_obj(cloned_link, |n: &ListNode| assert_eq!(n.value, 13)).unwrap();
    })
    .unwrap();
}

#[test]
fn test_stats_count_mapped_and_copied_pairs() {
    let provider = provider_with(base_registry());
    let root = new_obj(ListNode {
        value: 0,
        next: Some(new_obj(ListNode {
            value: 1,
            next: Some(new_obj(ListNode {
                value: 2,
                next: None,
            })),
        })),
    });

    let (_, stats) = provider.clone_object_with_stats(&root, &ctx()).unwrap();
    assert_eq!(stats.objects_mapped, 3);
    assert_eq!(stats.objects_copied, 3);
    assert_eq!(stats.late_setups, 0);
}
