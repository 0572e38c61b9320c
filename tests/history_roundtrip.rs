use glam::{Quat, Vec3};
use parallax_scene::{IdentityError, ObjectKind, Scene, SceneConfig, SourcePriority};

fn scene_with_limit(limit: usize) -> Scene {
    let _ = env_logger::builder().is_test(true).try_init();
    Scene::new(SceneConfig { history_limit: limit, ..SceneConfig::default() })
}

#[test]
fn rollback_restores_the_committed_state_bit_for_bit() {
    let mut scene = Scene::default();
    let group = scene.create_object(ObjectKind::Group, None).expect("group should be created");
    let line = scene.create_object(ObjectKind::PolyLine, Some(group)).expect("line should be created");
    scene
        .set_position(group, Vec3::new(1.0, 2.0, 3.0), SourcePriority::Tool)
        .expect("position write should land");
    scene
        .set_rotation(group, Quat::from_rotation_y(0.5), SourcePriority::Tool)
        .expect("rotation write should land");
    scene
        .set_vertices(line, vec![Vec3::X, Vec3::Y], SourcePriority::Tool)
        .expect("vertex write should land");
    scene.select(line).expect("selection should succeed");
    scene.commit().expect("baseline commit should succeed");

    let saved_position = scene.position(group).expect("group should be live");
    let saved_rotation = scene.rotation(group).expect("group should be live");
    let saved_vertices = scene.vertices(line).expect("line should be live");
    let saved_children = scene.object(group).expect("group should be live").children().to_vec();

    scene
        .set_position(group, Vec3::new(-9.0, 0.0, 0.0), SourcePriority::Input)
        .expect("edit should land");
    scene.add_vertex(line, Vec3::Z, SourcePriority::Input).expect("edit should land");
    scene.clear_selection();
    let extra = scene.create_object(ObjectKind::Point, Some(group)).expect("edit should succeed");
    scene.commit().expect("edit commit should succeed");

    assert!(scene.rollback().expect("rollback should succeed"), "there was a state to restore");
    assert_eq!(scene.position(group).expect("group should be live"), saved_position);
    assert_eq!(scene.rotation(group).expect("group should be live"), saved_rotation);
    assert_eq!(scene.vertices(line).expect("line should be live"), saved_vertices);
    assert_eq!(scene.object(group).expect("group should be live").children(), saved_children);
    assert_eq!(scene.selection(), [line], "the saved selection comes back");
    assert!(scene.resolve(extra).is_err(), "objects created after the snapshot are gone");
}

#[test]
fn repeat_after_rollback_restores_the_pre_rollback_state() {
    let mut scene = Scene::default();
    let line = scene.create_object(ObjectKind::PolyLine, None).expect("line should be created");
    scene.add_vertex(line, Vec3::X, SourcePriority::Tool).expect("vertex should be added");
    scene.commit().expect("baseline commit should succeed");

    scene.add_vertex(line, Vec3::Y, SourcePriority::Tool).expect("vertex should be added");
    scene.commit().expect("edit commit should succeed");
    let after_edit = scene.vertices(line).expect("line should be live");

    assert!(scene.rollback().expect("rollback should succeed"));
    assert_eq!(scene.vertices(line).expect("line should be live"), vec![Vec3::X]);

    assert!(scene.repeat().expect("repeat should succeed"));
    assert_eq!(scene.vertices(line).expect("line should be live"), after_edit);
}

#[test]
fn commit_after_rollback_discards_the_redo_branch() {
    let mut scene = Scene::default();
    let line = scene.create_object(ObjectKind::PolyLine, None).expect("line should be created");
    scene.commit().expect("baseline commit should succeed");
    scene.add_vertex(line, Vec3::X, SourcePriority::Tool).expect("vertex should be added");
    scene.commit().expect("edit commit should succeed");

    assert!(scene.rollback().expect("rollback should succeed"));
    assert_eq!(scene.redo_depth(), 1);

    scene.add_vertex(line, Vec3::Z, SourcePriority::Tool).expect("new edit should land");
    scene.commit().expect("commit after undo should succeed");
    assert_eq!(scene.redo_depth(), 0);
    assert!(!scene.repeat().expect("repeat should be a clean no-op"), "there is nothing to redo");
    assert_eq!(
        scene.vertices(line).expect("line should be live"),
        vec![Vec3::Z],
        "the new branch survives"
    );
}

#[test]
fn history_never_exceeds_its_bound_and_eviction_frees_the_objects() {
    let mut scene = scene_with_limit(2);
    let doomed = scene.create_object(ObjectKind::Point, None).expect("object should be created");
    scene.commit().expect("commit holding the object should succeed");

    scene.delete_object(doomed).expect("delete should succeed");
    assert!(
        scene.resolve(doomed).is_err(),
        "a deleted object is unreadable even while a snapshot still references it"
    );

    for _ in 0..2 {
        scene.commit().expect("commit should succeed");
    }
    assert_eq!(scene.undo_depth(), 2, "three commits with bound two leave two past entries");

    scene.commit().expect("commit should succeed");
    assert_eq!(scene.undo_depth(), 2, "the bound holds under further commits");
    assert_eq!(scene.object_count(), 1, "only the root is left alive");
}

#[test]
fn rollback_revives_a_deleted_subtree() {
    let mut scene = Scene::default();
    let group = scene.create_object(ObjectKind::Group, None).expect("group should be created");
    let leaf = scene.create_object(ObjectKind::Point, Some(group)).expect("leaf should be created");
    scene.commit().expect("baseline commit should succeed");

    scene.delete_object(group).expect("delete should succeed");
    scene.commit().expect("deletion commit should succeed");
    assert!(scene.resolve(leaf).is_err());

    assert!(scene.rollback().expect("rollback should succeed"));
    assert!(scene.resolve(group).is_ok(), "the group is hosted again");
    assert!(scene.resolve(leaf).is_ok(), "the leaf is hosted again");
    assert_eq!(scene.object(group).expect("group should be live").children(), [leaf]);
    assert_eq!(scene.object_count(), 3);
}

#[test]
fn suppressed_commits_do_nothing() {
    let mut scene = Scene::default();
    scene.create_object(ObjectKind::Point, None).expect("object should be created");
    scene.set_commits_suppressed(true);
    scene.commit().expect("suppressed commit should succeed");
    scene.commit().expect("suppressed commit should succeed");
    assert_eq!(scene.undo_depth(), 0);
    assert!(!scene.rollback().expect("rollback with no history is a no-op"));

    scene.set_commits_suppressed(false);
    scene.commit().expect("commit should succeed");
    scene.commit().expect("commit should succeed");
    assert_eq!(scene.undo_depth(), 1);
}

#[test]
fn clearing_history_releases_every_snapshot() {
    let mut scene = scene_with_limit(8);
    let node = scene.create_object(ObjectKind::Point, None).expect("object should be created");
    scene.commit().expect("commit should succeed");
    scene.delete_object(node).expect("delete should succeed");
    assert!(scene.resolve(node).is_err(), "the snapshot keeps a tombstone alive");

    scene.clear_history();
    assert_eq!(scene.undo_depth(), 0);
    assert!(!scene.rollback().expect("rollback on empty history is a no-op"));
    assert_eq!(
        scene.resolve(node).unwrap_err(),
        IdentityError::StaleHandle(node),
        "dropping the last snapshot frees the slot"
    );
}

#[test]
fn state_change_subscribers_hear_about_restores() {
    use std::cell::Cell;
    use std::rc::Rc;

    let mut scene = Scene::default();
    let restores = Rc::new(Cell::new(0));
    let counter = Rc::clone(&restores);
    let _token = scene.on_state_change(move |_| counter.set(counter.get() + 1));

    scene.create_object(ObjectKind::Point, None).expect("object should be created");
    scene.commit().expect("commit should succeed");
    scene.create_object(ObjectKind::Point, None).expect("object should be created");
    scene.commit().expect("commit should succeed");
    assert_eq!(restores.get(), 0, "commits alone do not notify");

    scene.rollback().expect("rollback should succeed");
    scene.repeat().expect("repeat should succeed");
    assert_eq!(restores.get(), 2);
}

#[test]
fn delete_hook_fires_exactly_once_per_object() {
    use std::cell::Cell;
    use std::rc::Rc;

    let mut scene = scene_with_limit(1);
    let deletions = Rc::new(Cell::new(0));
    let counter = Rc::clone(&deletions);
    scene.set_delete_hook(move |_, _| counter.set(counter.get() + 1));

    let object = scene.create_object(ObjectKind::Point, None).expect("object should be created");
    scene.commit().expect("commit should succeed");
    scene.delete_object(object).expect("delete should succeed");
    assert_eq!(deletions.get(), 1, "the hook runs when the object is destroyed");

    // Push the snapshot that still references the object out of history.
    scene.commit().expect("commit should succeed");
    scene.commit().expect("commit should succeed");
    scene.commit().expect("commit should succeed");
    assert_eq!(deletions.get(), 1, "evicting the snapshot must not re-destroy the object");
}
