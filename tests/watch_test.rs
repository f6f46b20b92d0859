mod common;

use common::{harness, write_journal};
use journal2vec::search::query::QueryRequest;
use journal2vec::ui::watch::ChangeEvent;
use journal2vec::Granularity;

#[test]
fn created_event_indexes_the_file() {
    let h = harness();
    let path = write_journal(&h, "2025-08-06.md", "# Fresh entry\nmilk delivery");

    h.engine.apply_event(&ChangeEvent::Created(path)).unwrap();

    let status = h.engine.status();
    assert_eq!(status.indexed_files, 1);
    assert_eq!(status.indexed_segments.memory, 1);
    assert!(status.last_change_index.is_some());
}

#[test]
fn modified_event_replaces_previous_segments() {
    let h = harness();
    let path = write_journal(
        &h,
        "2025-08-06.md",
        "# Entry\nfirst version\n## Detail\n> a\n> b",
    );
    h.engine
        .apply_event(&ChangeEvent::Created(path.clone()))
        .unwrap();
    assert_eq!(h.engine.status().indexed_segments.line, 2);

    std::fs::write(&path, "# Entry\nsecond version\n> only one").unwrap();
    h.engine.apply_event(&ChangeEvent::Modified(path)).unwrap();

    let status = h.engine.status();
    // Counts reflect only the latest content
    assert_eq!(status.indexed_segments.line, 1);
    assert_eq!(status.indexed_segments.section, 0);
    assert_eq!(status.indexed_files, 1);

    let results = h
        .engine
        .query(&QueryRequest {
            text: "version".to_string(),
            mode: Some(Granularity::Memory),
            ..Default::default()
        })
        .unwrap();
    assert!(results[0].text.contains("second version"));
}

#[test]
fn deleted_event_removes_every_granularity() {
    let h = harness();
    let path = write_journal(
        &h,
        "2025-08-06.md",
        "# Entry\nbody\n## Detail\n> quoted",
    );
    h.engine
        .apply_event(&ChangeEvent::Created(path.clone()))
        .unwrap();

    std::fs::remove_file(&path).unwrap();
    h.engine.apply_event(&ChangeEvent::Deleted(path)).unwrap();

    let status = h.engine.status();
    assert_eq!(status.indexed_files, 0);
    for granularity in Granularity::ALL {
        assert_eq!(*status.indexed_segments.get(granularity), 0);
    }
}

#[test]
fn moved_event_reattributes_the_file() {
    let h = harness();
    let src = write_journal(&h, "2025-08-06.md", "# Entry\nmilk");
    h.engine
        .apply_event(&ChangeEvent::Created(src.clone()))
        .unwrap();

    let dest = h.docs_dir.join("2025-08-07.md");
    std::fs::rename(&src, &dest).unwrap();
    h.engine
        .apply_event(&ChangeEvent::Moved(src, dest.clone()))
        .unwrap();

    let status = h.engine.status();
    assert_eq!(status.indexed_files, 1);
    assert_eq!(status.indexed_segments.memory, 1);

    // The surviving segment belongs to the destination path, with its date
    let results = h.engine.query(&QueryRequest::new("milk")).unwrap();
    assert_eq!(
        results[0].date,
        chrono::NaiveDate::from_ymd_opt(2025, 8, 7)
    );
}

#[test]
fn deleting_a_never_indexed_file_is_a_noop() {
    let h = harness();
    h.engine
        .apply_event(&ChangeEvent::Deleted(h.docs_dir.join("ghost.md")))
        .unwrap();
    assert_eq!(h.engine.status().indexed_files, 0);
}

#[test]
fn created_event_for_missing_file_degrades_gracefully() {
    // The watcher can deliver a create for a file that vanished again;
    // the read failure is logged and skipped
    let h = harness();
    h.engine
        .apply_event(&ChangeEvent::Created(h.docs_dir.join("vanished.md")))
        .unwrap();
    assert_eq!(h.engine.status().indexed_files, 0);
}

#[test]
fn event_sequence_applies_in_order() {
    let h = harness();
    let path = write_journal(&h, "2025-08-06.md", "# One\nalpha");

    h.engine
        .apply_event(&ChangeEvent::Created(path.clone()))
        .unwrap();

    std::fs::write(&path, "# Two\nbeta").unwrap();
    h.engine
        .apply_event(&ChangeEvent::Modified(path.clone()))
        .unwrap();

    std::fs::remove_file(&path).unwrap();
    h.engine.apply_event(&ChangeEvent::Deleted(path)).unwrap();

    // The net effect of create → modify → delete is nothing indexed
    let status = h.engine.status();
    assert_eq!(status.indexed_files, 0);
    assert_eq!(status.indexed_segments.memory, 0);
}
