//! Gallery persistence and listing order
//!
//! Artifacts stored through the pipeline must come back newest first, with
//! public URLs under the static mount, and never overwrite each other.

mod common;

use common::{center_mask_png, room_jpeg, CountingFetcher, Harness, StubBehavior};
use image::DynamicImage;
use lumina_stage::{ArtifactKind, EditRequest, GalleryStore, GenerateRequest, PipelineConfig};
use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

fn backdate(path: &std::path::Path, seconds: u64) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(seconds))
        .unwrap();
}

#[tokio::test]
async fn test_pipeline_artifacts_list_newest_first() {
    let harness = Harness::new(StubBehavior::Succeed, CountingFetcher::unreachable());

    let first = harness
        .processor
        .generate_room(GenerateRequest {
            image: room_jpeg(320, 240),
            user_prompt: "loft".to_string(),
            style: None,
        })
        .await
        .unwrap();
    backdate(&first.artifact.stored_path, 300);

    let second = harness
        .processor
        .edit(EditRequest::new(room_jpeg(320, 240), center_mask_png(320, 240), ""))
        .await
        .unwrap();
    backdate(&second.artifact.stored_path, 100);

    let third = harness
        .processor
        .generate_room(GenerateRequest {
            image: room_jpeg(320, 240),
            user_prompt: "studio".to_string(),
            style: None,
        })
        .await
        .unwrap();

    let listed = harness.processor.context().gallery().list().await.unwrap();
    let names: Vec<_> = listed.iter().map(|entry| entry.filename.clone()).collect();
    assert_eq!(
        names,
        vec![
            third.artifact.filename.clone(),
            second.artifact.filename.clone(),
            first.artifact.filename.clone(),
        ]
    );
    assert!(listed
        .iter()
        .all(|entry| entry.public_url.starts_with("http://localhost:8000/static/gallery/")));
    assert!(listed.windows(2).all(|pair| pair[0].modified >= pair[1].modified));
}

#[tokio::test]
async fn test_concurrent_stores_never_collide() {
    let storage = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .storage_root(storage.path())
        .build()
        .unwrap();
    let store = GalleryStore::new(&config);

    let writes = (0..16).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .store(DynamicImage::new_rgb8(8, 8), ArtifactKind::Edit)
                .await
                .unwrap()
        })
    });
    let artifacts = futures_util::future::join_all(writes).await;

    let names: HashSet<_> = artifacts
        .into_iter()
        .map(|artifact| artifact.unwrap().filename)
        .collect();
    assert_eq!(names.len(), 16);
    assert_eq!(store.list().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_listing_includes_jpeg_and_skips_other_files() {
    let storage = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .storage_root(storage.path())
        .public_base_url("https://rooms.example.com/")
        .static_mount("assets")
        .build()
        .unwrap();
    let store = GalleryStore::new(&config);
    std::fs::create_dir_all(store.directory()).unwrap();

    std::fs::write(store.directory().join("legacy.JPG"), b"jpeg").unwrap();
    std::fs::write(store.directory().join("notes.md"), b"notes").unwrap();
    std::fs::create_dir_all(store.directory().join("nested.png")).unwrap();

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "legacy.JPG");
    assert_eq!(
        listed[0].public_url,
        "https://rooms.example.com/assets/gallery/legacy.JPG"
    );
}
