//! Push reconciliation: uploads, id write-back and unit creation

mod common;

use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use common::*;
use coursesync::model::Course;
use coursesync::plan::{Action, Upload};
use coursesync::remote::SnapshotFile;
use coursesync::state::StateManager;
use coursesync::{Direction, Reconciler, SyncConfig, SyncError};

fn config(state: &TempDir) -> SyncConfig {
	SyncConfig { state_dir: state.path().to_path_buf(), ..Default::default() }
}

fn local_course() -> Course {
	let mut local = course(7, vec![lesson(1, "Intro", vec![task(10, "Hello", "Main.kt", "fun main() {}")])]);
	local.lessons_section_id = Some(77);
	local.add_lesson(lesson(0, "Loops", vec![task(0, "For", "Main.kt", "for (i in 0..3) {}")]));
	local.add_section(section(0, "Advanced", vec![lesson(0, "Generics", vec![task(0, "Box", "Box.kt", "class Box<T>")])]));
	local
}

fn server_course() -> Course {
	let mut server = course(7, vec![lesson(1, "Intro", vec![task(10, "Hello", "Main.kt", "fun main() {}")])]);
	server.lessons_section_id = Some(77);
	server
}

#[tokio::test]
async fn test_push_posts_new_items_and_writes_ids_back() {
	let state = TempDir::new().unwrap();
	let storage = MemoryStorage::new();
	let remote = FakeRemote::new(server_course());
	let mut local = local_course();

	let mut sync = Reconciler::builder()
		.config(config(&state))
		.remote(remote.clone())
		.storage(storage.clone())
		.build()
		.unwrap();
	let summary = sync.push(&mut local).await.unwrap();

	assert_eq!(
		remote.calls(),
		vec![
			"create_section Advanced -> 1000",
			"create_lesson Generics -> 1001",
			"create_unit 1001 at 1 in Some(1000)",
			"create_task Box in 1001 -> 1003",
			"create_lesson Loops -> 1004",
			"create_unit 1004 at 2 in Some(77)",
			"create_task For in 1004 -> 1006",
		]
	);

	let advanced = local.section(1000).unwrap();
	assert_eq!(advanced.name, "Advanced");
	let generics = local.lesson(1001).unwrap();
	assert_eq!(generics.unit_id, Some(1002));
	assert_eq!(generics.section_id, Some(1000));
	assert_eq!(local.task(1003).unwrap().lesson_id, 1001);
	let loops = local.lesson(1004).unwrap();
	assert_eq!(loops.unit_id, Some(1005));
	assert_eq!(loops.section_id, None);
	assert_eq!(local.task(1006).unwrap().name, "For");

	assert_eq!(summary.direction, Direction::Push);
	assert_eq!(summary.message(), "One section pushed.\nOne lesson pushed.");
	assert!(storage.files().is_empty());
	assert!(StateManager::new(state.path(), "default").load_baseline(7).await.unwrap().is_none());
}

#[tokio::test]
async fn test_push_uploads_changes_and_never_deletes() {
	let state = TempDir::new().unwrap();
	let mut server = server_course();
	server.add_lesson(lesson(3, "Legacy", vec![]));
	let remote = FakeRemote::new(server);

	let mut local = course(7, vec![lesson(1, "Introduction", vec![task(10, "Hello", "Main.kt", "fun main() = Unit")])]);
	local.lessons_section_id = Some(77);

	let mut sync = Reconciler::builder()
		.config(config(&state))
		.remote(remote.clone())
		.storage(MemoryStorage::new())
		.build()
		.unwrap();

	let (changes, plan) = sync.preview(&local, Direction::Push).await.unwrap();
	assert_eq!(changes.lessons.deleted.len(), 1);
	assert_eq!(
		plan.actions,
		vec![
			Action::UploadItem(Upload::UpdateLesson { id: 1 }),
			Action::UploadItem(Upload::UpdateTask { id: 10 }),
		]
	);

	let summary = sync.push(&mut local).await.unwrap();
	assert_eq!(remote.calls(), vec!["update_lesson 1", "update_task 10"]);
	assert_eq!(summary.message(), "One lesson updated\nOne task updated");
	assert!(local.lesson(3).is_none());
}

#[tokio::test]
async fn test_push_course_info() {
	let state = TempDir::new().unwrap();
	let remote = FakeRemote::new(server_course());
	let mut local = server_course();
	local.name = "Kotlin Koans 2".to_string();

	let mut sync = Reconciler::builder()
		.config(config(&state))
		.remote(remote.clone())
		.storage(MemoryStorage::new())
		.build()
		.unwrap();
	let summary = sync.push(&mut local).await.unwrap();

	assert_eq!(remote.calls(), vec!["update_course_info Kotlin Koans 2"]);
	assert!(summary.course_info_updated);
}

#[tokio::test]
async fn test_rejected_upload_is_a_partial_apply() {
	let state = TempDir::new().unwrap();
	let snapshot = state.path().join("server.json");
	std::fs::write(&snapshot, serde_json::to_string(&server_course()).unwrap()).unwrap();
	let notes: Arc<Mutex<Vec<String>>> = Arc::default();
	let sink = notes.clone();

	let mut sync = Reconciler::builder()
		.config(config(&state))
		.remote(SnapshotFile::new(&snapshot))
		.storage(MemoryStorage::new())
		.notifier(move |title: &str, _message: &str| sink.lock().unwrap().push(title.to_string()))
		.build()
		.unwrap();
	let mut local = local_course();
	let result = sync.push(&mut local).await;

	match result {
		Err(SyncError::PartialApply { applied: 0, total: 2, source }) => {
			assert!(matches!(*source, SyncError::Remote(_)));
		}
		other => panic!("expected a partial apply, got {:?}", other.map(|s| s.message())),
	}
	assert_eq!(notes.lock().unwrap().as_slice(), &["Sync incomplete".to_string()]);
	assert!(local.section(1000).is_none());
}

// vim: ts=4
