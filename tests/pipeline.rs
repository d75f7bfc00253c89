//! End-to-end pipeline tests: scaffold → post → build → deploy.
//!
//! Exercises the full build-and-publish path against real temp directories,
//! with the directory-backed store and CDN journal standing in for the
//! remote side.

use std::fs;
use std::path::Path;

use photoblog::engine::Engine;
use photoblog::invalidate::{self, FsCdnClient};
use photoblog::scaffold::scaffold;
use photoblog::sync::{self, Cancellation, FsObjectStore, SyncOptions};
use tempfile::TempDir;

fn add_text_post(root: &Path, dir: &str, title: &str, posted: &str) {
    let post_dir = root.join("posts").join(dir);
    fs::create_dir_all(&post_dir).unwrap();
    fs::write(
        post_dir.join("meta.toml"),
        format!("title = {title:?}\nposted = {posted:?}\ntags = [\"notes\"]\n"),
    )
    .unwrap();
    fs::write(post_dir.join("body.md"), format!("# {title}\n\nWords.\n")).unwrap();
}

fn add_image_post(root: &Path, dir: &str, title: &str, posted: &str) {
    let post_dir = root.join("posts").join(dir);
    fs::create_dir_all(&post_dir).unwrap();
    fs::write(
        post_dir.join("meta.toml"),
        format!("title = {title:?}\nposted = {posted:?}\n"),
    )
    .unwrap();
    image::RgbImage::from_pixel(96, 48, image::Rgb([10, 90, 170]))
        .save(post_dir.join("photo.jpg"))
        .unwrap();
}

#[test]
fn scaffold_post_build_produces_a_complete_site() {
    let blog = TempDir::new().unwrap();
    scaffold(blog.path(), "Field Notes", "Jo", "https://example.com").unwrap();
    add_text_post(blog.path(), "first", "First Post", "2021-03-04T10:00:00Z");
    add_image_post(blog.path(), "photo", "Golden Hour", "2021-03-05T10:00:00Z");

    let engine = Engine::new(blog.path()).unwrap();
    let posts = engine.build().unwrap();
    assert_eq!(posts.len(), 2);

    let out = engine.output_dir();
    assert!(out.join("2021/03/04/first-post/index.html").is_file());
    assert!(out.join("2021/03/05/golden-hour/index.html").is_file());
    assert!(out.join("2021/03/05/golden-hour/image-2048.jpg").is_file());
    assert!(out.join("2021/03/05/golden-hour/image-1024.jpg").is_file());
    assert!(out.join("2021/03/05/golden-hour/image-512.jpg").is_file());
    assert!(out.join("tags/notes/index.html").is_file());
    assert!(out.join("css/site.css").is_file());

    // newest-first on the index
    let index = fs::read_to_string(out.join("index.html")).unwrap();
    let photo = index.find("/2021/03/05/golden-hour/").unwrap();
    let text = index.find("/2021/03/04/first-post/").unwrap();
    assert!(photo < text);
}

#[test]
fn deploy_is_incremental_and_idempotent() {
    let blog = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    scaffold(blog.path(), "Field Notes", "Jo", "").unwrap();
    add_text_post(blog.path(), "first", "First Post", "2021-03-04T10:00:00Z");

    let engine = Engine::new(blog.path()).unwrap();
    engine.build().unwrap();

    let store = FsObjectStore::new(remote.path());
    let first = sync::sync(&engine.output_dir(), &store, &SyncOptions::default()).unwrap();
    assert!(first.contains(&"2021/03/04/first-post/index.html".to_string()));
    assert!(
        remote
            .path()
            .join("2021/03/04/first-post/index.html")
            .is_file()
    );

    // rebuild without changes, then sync again: nothing to upload
    engine.build().unwrap();
    let second = sync::sync(&engine.output_dir(), &store, &SyncOptions::default()).unwrap();
    assert!(second.is_empty(), "unexpected uploads: {second:?}");

    // edit one post, rebuild: exactly the touched pages go up
    fs::write(
        blog.path().join("posts/first/body.md"),
        "# First Post\n\nRevised words.\n",
    )
    .unwrap();
    engine.build().unwrap();
    let third = sync::sync(&engine.output_dir(), &store, &SyncOptions::default()).unwrap();
    assert!(third.contains(&"2021/03/04/first-post/index.html".to_string()));
    assert!(!third.contains(&"css/site.css".to_string()));
}

#[test]
fn dry_run_leaves_the_remote_untouched() {
    let blog = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    scaffold(blog.path(), "Field Notes", "Jo", "").unwrap();
    add_text_post(blog.path(), "first", "First Post", "2021-03-04T10:00:00Z");

    let engine = Engine::new(blog.path()).unwrap();
    engine.build().unwrap();

    let store = FsObjectStore::new(remote.path());
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };
    let planned = sync::sync(&engine.output_dir(), &store, &options).unwrap();
    assert!(!planned.is_empty());
    assert_eq!(fs::read_dir(remote.path()).unwrap().count(), 0);
}

#[test]
fn changed_paths_flow_into_invalidation() {
    let blog = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    scaffold(blog.path(), "Field Notes", "Jo", "").unwrap();
    add_text_post(blog.path(), "first", "First Post", "2021-03-04T10:00:00Z");

    let engine = Engine::new(blog.path()).unwrap();
    engine.build().unwrap();

    let store = FsObjectStore::new(remote.path());
    let cdn = FsCdnClient::new(remote.path());

    let changed = sync::sync(&engine.output_dir(), &store, &SyncOptions::default()).unwrap();
    let batches = invalidate::invalidate(&cdn, "dist-1", &changed, &Cancellation::new()).unwrap();
    assert_eq!(batches, 1);
    let log = fs::read_to_string(remote.path().join("invalidations.log")).unwrap();
    assert!(log.contains("/2021/03/04/first-post/index.html"));

    // second deploy: no changes, so no invalidation at all
    let changed = sync::sync(&engine.output_dir(), &store, &SyncOptions::default()).unwrap();
    let batches = invalidate::invalidate(&cdn, "dist-1", &changed, &Cancellation::new()).unwrap();
    assert_eq!(batches, 0);
    assert_eq!(
        fs::read_to_string(remote.path().join("invalidations.log")).unwrap(),
        log
    );
}
