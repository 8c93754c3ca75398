use image::Rgba;

use super::*;

fn record(session: &str, step: &str) -> StepRecord {
    StepRecord {
        session_id: session.to_string(),
        step: step.to_string(),
        iteration: 1,
        attempt: 2,
        capability: "generator".to_string(),
        timestamp: now_rfc3339(),
        elapsed_ms: 12,
        request: serde_json::json!({ "prompt": "hello" }),
        response: None,
        outcome: StepOutcome::Transient,
        error: Some("timed out".to_string()),
    }
}

#[test]
fn labels_are_made_filename_safe() {
    assert_eq!(sanitize_label("Dr. Who/2"), "Dr__Who_2");
    assert_eq!(sanitize_label("iter3"), "iter3");
    assert_eq!(sanitize_label("  "), "unnamed");
    assert_eq!(sanitize_label("李_reference"), "李_reference");
    assert_eq!(sanitize_label("Zoë"), "Zoë");
}

#[test]
fn non_ascii_names_get_their_own_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FsArtifactStore::new(dir.path()).unwrap();
    let a = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
    let b = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));

    store.save_image("s", "1_李_reference", &a).unwrap();
    store.save_image("s", "2_王_reference", &b).unwrap();

    let pngs = fs::read_dir(store.root())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .count();
    assert_eq!(pngs, 2);
    let back = image::open(store.image_path("s", "1_李_reference")).unwrap().to_rgba8();
    assert_eq!(back, a);
}

#[test]
fn session_ids_follow_the_timestamp_layout() {
    let id = new_session_id();
    let parts: Vec<_> = id.split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 8);
    assert_eq!(parts[1].len(), 6);
    assert_eq!(parts[2].len(), 6);
    assert!(id.chars().all(|c| c.is_ascii_digit() || c == '_'));
}

#[test]
fn step_names_encode_iteration_and_attempt() {
    assert_eq!(StepRecord::step_name("critic", 3, 1), "critic_iter3_attempt1");
}

#[test]
fn filesystem_store_writes_every_artifact_kind() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FsArtifactStore::new(dir.path().join("out")).unwrap();

    let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
    store.save_image("s1", "Luna_reference", &img).unwrap();
    let png = store.image_path("s1", "Luna_reference");
    assert_eq!(png.file_name().unwrap(), "s1_Luna_reference.png");
    let back = image::open(&png).unwrap().to_rgba8();
    assert_eq!(back, img);

    store
        .record_step(&record("s1", "generator_iter1_attempt2"))
        .unwrap();
    let logs: Vec<_> = fs::read_dir(store.root().join("debug"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(logs.len(), 1);
    let name = logs[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("s1_generator_iter1_attempt2_"));
    let parsed: StepRecord = serde_json::from_slice(&fs::read(&logs[0]).unwrap()).unwrap();
    assert_eq!(parsed.outcome, StepOutcome::Transient);
    assert_eq!(parsed.error.as_deref(), Some("timed out"));

    store
        .write_metadata("s1", &serde_json::json!({ "accepted": true }))
        .unwrap();
    let meta: serde_json::Value =
        serde_json::from_slice(&fs::read(store.metadata_path("s1")).unwrap()).unwrap();
    assert_eq!(meta["accepted"], true);
}

#[test]
fn memory_store_can_simulate_a_broken_step_log() {
    let mut store = MemoryArtifactStore {
        fail_step_writes: true,
        ..Default::default()
    };
    assert!(store.record_step(&record("s", "critic_iter1_attempt1")).is_err());
    assert!(store.steps.is_empty());

    store.fail_step_writes = false;
    store.record_step(&record("s", "critic_iter1_attempt1")).unwrap();
    assert_eq!(store.steps.len(), 1);
}
