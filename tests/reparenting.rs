use parallax_scene::{InsertPosition, ObjectKind, Scene, StructureEvent};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn top_then_bottom_at_index_zero_lands_second() {
    let mut scene = Scene::default();
    let parent = scene.create_object(ObjectKind::Group, None).expect("parent should be created");
    let existing = scene.create_object(ObjectKind::Point, Some(parent)).expect("child should be created");
    let moved = scene.create_object(ObjectKind::Point, None).expect("node should be created");

    scene.set_parent(moved, parent, 0, InsertPosition::TOP).expect("insert at top should succeed");
    assert_eq!(scene.object(parent).expect("parent should be live").children(), [moved, existing]);

    scene.set_parent(moved, parent, 0, InsertPosition::BOTTOM).expect("move to bottom should succeed");
    assert_eq!(scene.object(parent).expect("parent should be live").children(), [existing, moved]);
}

#[test]
fn center_appends_and_ignores_the_index() {
    let mut scene = Scene::default();
    let parent = scene.create_object(ObjectKind::Group, None).expect("parent should be created");
    let first = scene.create_object(ObjectKind::Point, Some(parent)).expect("child should be created");
    let second = scene.create_object(ObjectKind::Point, Some(parent)).expect("child should be created");
    let moved = scene.create_object(ObjectKind::Point, None).expect("node should be created");

    scene.set_parent(moved, parent, 0, InsertPosition::CENTER).expect("drop onto node should succeed");
    assert_eq!(
        scene.object(parent).expect("parent should be live").children(),
        [first, second, moved]
    );
}

#[test]
fn out_of_range_indices_clamp_to_the_end() {
    let mut scene = Scene::default();
    let parent = scene.create_object(ObjectKind::Group, None).expect("parent should be created");
    let existing = scene.create_object(ObjectKind::Point, Some(parent)).expect("child should be created");
    let moved = scene.create_object(ObjectKind::Point, None).expect("node should be created");

    scene.set_parent(moved, parent, 99, InsertPosition::TOP).expect("insert should clamp");
    assert_eq!(scene.object(parent).expect("parent should be live").children(), [existing, moved]);
}

#[test]
fn reparenting_detaches_from_the_previous_parent() {
    let mut scene = Scene::default();
    let a = scene.create_object(ObjectKind::Group, None).expect("group should be created");
    let b = scene.create_object(ObjectKind::Group, None).expect("group should be created");
    let node = scene.create_object(ObjectKind::Point, Some(a)).expect("node should be created");

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    scene.events.structure.subscribe(move |event: &StructureEvent| sink.borrow_mut().push(*event));

    scene.set_parent(node, b, 0, InsertPosition::TOP).expect("reparent should succeed");
    assert!(scene.object(a).expect("group should be live").children().is_empty());
    assert_eq!(scene.object(b).expect("group should be live").children(), [node]);
    assert_eq!(scene.object(node).expect("node should be live").parent(), Some(b));
    assert_eq!(*events.borrow(), vec![StructureEvent::Reparented { object: node }]);
}

#[test]
fn moving_a_selection_preserves_structure_across_unselected_links() {
    // a (selected) holds b (unselected) holds c (selected). Moving the
    // selection into a destination group must keep c under a, while b is
    // handed back to a's old parent.
    let mut scene = Scene::default();
    let a = scene.create_object(ObjectKind::Group, None).expect("group should be created");
    let b = scene.create_object(ObjectKind::Group, Some(a)).expect("group should be created");
    let c = scene.create_object(ObjectKind::Point, Some(b)).expect("node should be created");
    let destination = scene.create_object(ObjectKind::Group, None).expect("group should be created");

    scene.select(a).expect("selection should succeed");
    scene.add_to_selection(c).expect("selection should succeed");
    scene
        .move_selection_to(destination, 0, InsertPosition::TOP)
        .expect("structured move should succeed");

    assert_eq!(scene.object(a).expect("a should be live").parent(), Some(destination));
    assert_eq!(scene.object(b).expect("b should be live").parent(), Some(scene.root()));
    assert_eq!(scene.object(c).expect("c should be live").parent(), Some(a));
    assert_eq!(scene.object(a).expect("a should be live").children(), [c]);
    assert!(scene.object(b).expect("b should be live").children().is_empty());
}

#[test]
fn delete_all_empties_the_tree_and_notifies_first() {
    let mut scene = Scene::default();
    let group = scene.create_object(ObjectKind::Group, None).expect("group should be created");
    scene.create_object(ObjectKind::PolyLine, Some(group)).expect("line should be created");

    let cleared = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&cleared);
    scene.events.structure.subscribe(move |event: &StructureEvent| {
        if matches!(event, StructureEvent::Cleared) {
            *flag.borrow_mut() = true;
        }
    });

    scene.delete_all().expect("delete_all should succeed");
    assert!(*cleared.borrow());
    assert_eq!(scene.object_count(), 1, "only the root survives");
    assert!(scene.object(scene.root()).expect("root is live").children().is_empty());
    assert!(scene.objects().is_empty());
}
