//! Build orchestration.
//!
//! A build runs in fixed stages:
//!
//! 1. **Fatal setup** — parse the slug template and load every Tera template.
//!    Either failing aborts before any post work.
//! 2. **Discover** — enumerate the posts directory in name order, parse each
//!    post's `meta.toml` and payload (markdown body or source image).
//! 3. **Slug** — render the slug template per post, then sort the collection
//!    and link chronological neighbors.
//! 4. **Per-post work** — image variants and the post's HTML page, fanned out
//!    over a bounded rayon pool. Each worker owns exactly one post; neighbor
//!    data is snapshotted before the fan-out so workers stay disjoint. A
//!    failed post never stops its siblings: every post is attempted, and the
//!    earliest failure (in collection order) is surfaced after the drain.
//! 5. **Site pages** — index/pages, tag pages, and statics, after all
//!    per-post work has settled.
//!
//! The output tree is written unconditionally; change detection happens at
//! sync time, not build time.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{BlogConfig, ConfigError};
use crate::model::{ImagePayload, Meta, Post, Posts, TextPayload};
use crate::render::{NeighborView, RenderError, Renderer};
use crate::slug::{self, SlugError, SlugTemplate};
use crate::variants::{self, VariantError};

/// Filename of a post's metadata file inside its directory.
pub const META_FILENAME: &str = "meta.toml";
/// Filename of a text post's markdown body.
pub const BODY_FILENAME: &str = "body.md";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("invalid metadata in {path}: {source}")]
    Meta {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("post {0} has no payload: expected {BODY_FILENAME} or one image file")]
    MissingPayload(PathBuf),
    #[error("post {0} has more than one payload: keep either {BODY_FILENAME} or a single image")]
    AmbiguousPayload(PathBuf),
}

/// One blog root plus its parsed configuration.
pub struct Engine {
    root: PathBuf,
    config: BlogConfig,
}

impl Engine {
    /// Open the blog at `root`, loading and validating its configuration.
    pub fn new(root: &Path) -> Result<Self, EngineError> {
        let config = BlogConfig::load_from_root(root)?;
        config.validate()?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn config(&self) -> &BlogConfig {
        &self.config
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output_dir(&self.root)
    }

    /// Discover, slug, sort, and link the collection without rendering.
    ///
    /// Nothing is written: the output directory is not created and no
    /// templates are loaded. `build` starts from the same collection.
    pub fn collect(&self) -> Result<Posts, EngineError> {
        let slug_template = SlugTemplate::parse(&self.config.slug_template)?;
        let output_root = self.output_dir();

        let mut posts = self.discover()?;
        for post in posts.as_mut_slice() {
            post.slug = slug_template.render(&post.meta)?;
            post.output_path = output_root.join(&post.slug);
        }
        posts.sort(self.config.post_sort_key, self.config.post_sort_ascending);
        slug::link(&mut posts);
        Ok(posts)
    }

    /// Run a full build and return the final (sorted, linked) collection.
    pub fn build(&self) -> Result<Posts, EngineError> {
        let renderer = Renderer::load(&self.config, &self.root)?;
        let mut posts = self.collect()?;
        let output_root = self.output_dir();
        fs::create_dir_all(&output_root)?;

        self.build_posts(&mut posts, &renderer, &output_root)?;

        renderer.render_pages(&posts, &output_root)?;
        renderer.render_tags(&posts, &output_root)?;
        renderer.copy_statics(&output_root)?;

        Ok(posts)
    }

    /// Enumerate post directories in name order and parse each one.
    fn discover(&self) -> Result<Posts, EngineError> {
        let posts_dir = self.config.posts_dir(&self.root);
        let mut dirs: Vec<PathBuf> = fs::read_dir(&posts_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut posts = Posts::default();
        for (index, dir) in dirs.into_iter().enumerate() {
            posts.push(parse_post(&dir, index)?);
        }
        Ok(posts)
    }

    /// Variants and post pages under a bounded worker pool.
    ///
    /// Neighbor views are snapshotted from the linked collection up front so
    /// each worker touches only its own element. Worker results come back in
    /// collection order; the first error wins after every post has run.
    fn build_posts(
        &self,
        posts: &mut Posts,
        renderer: &Renderer,
        output_root: &Path,
    ) -> Result<(), EngineError> {
        let neighbors: Vec<(Option<NeighborView>, Option<NeighborView>)> = posts
            .iter()
            .map(|post| {
                let previous = post
                    .previous
                    .and_then(|i| posts.get(i))
                    .map(NeighborView::of);
                let next = post.next.and_then(|i| posts.get(i)).map(NeighborView::of);
                (previous, next)
            })
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_parallelism())
            .build()?;

        let config = &self.config;
        let results: Vec<Result<(), EngineError>> = pool.install(|| {
            posts
                .as_mut_slice()
                .par_iter_mut()
                .zip(neighbors.into_par_iter())
                .map(|(post, (previous, next))| {
                    if post.is_image() {
                        variants::generate(post, output_root, &config.images)?;
                    }
                    renderer.render_post(post, previous.as_ref(), next.as_ref(), output_root)?;
                    Ok(())
                })
                .collect()
        });

        match results.into_iter().find_map(|result| result.err()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Parse one post directory: required `meta.toml` plus exactly one payload.
fn parse_post(dir: &Path, index: usize) -> Result<Post, EngineError> {
    let meta_path = dir.join(META_FILENAME);
    let raw = fs::read_to_string(&meta_path)?;
    let meta: Meta = toml::from_str(&raw).map_err(|source| EngineError::Meta {
        path: meta_path,
        source,
    })?;

    let body_path = dir.join(BODY_FILENAME);
    let has_body = body_path.is_file();

    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && variants::is_image_file(path))
        .collect();
    images.sort();

    let mut post = Post {
        original_path: dir.to_path_buf(),
        index,
        meta,
        ..Post::default()
    };

    match (has_body, images.len()) {
        (true, 0) => {
            post.mod_time = fs::metadata(&body_path)?.modified().ok();
            post.text = Some(TextPayload {
                body: fs::read_to_string(&body_path)?,
                source: body_path,
            });
        }
        (false, 1) => {
            let source = images.remove(0);
            post.mod_time = fs::metadata(&source)?.modified().ok();
            post.image = Some(ImagePayload {
                capture_date: variants::capture_date(&source),
                source,
                ..ImagePayload::default()
            });
        }
        (false, 0) => return Err(EngineError::MissingPayload(dir.to_path_buf())),
        _ => return Err(EngineError::AmbiguousPayload(dir.to_path_buf())),
    }

    Ok(post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Lay down a complete, minimal blog root.
    fn seed_blog(root: &Path) {
        for dir in ["posts", "pages", "partials", "templates", "statics"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("partials/header.html"), "<html><body>").unwrap();
        fs::write(root.join("partials/footer.html"), "</body></html>").unwrap();
        fs::write(
            root.join("templates/post.html"),
            concat!(
                "{% include \"header\" %}<h1>{{ post.title }}</h1>",
                "{% if post.body %}{{ post.body | safe }}{% endif %}",
                "{% if post.image %}<img src=\"{{ post.image.large }}\">{% endif %}",
                "{% if previous %}<a rel=\"prev\" href=\"{{ previous.url }}\"></a>{% endif %}",
                "{% if next %}<a rel=\"next\" href=\"{{ next.url }}\"></a>{% endif %}",
                "{% include \"footer\" %}",
            ),
        )
        .unwrap();
        fs::write(
            root.join("templates/tag.html"),
            "<h1>{{ tag }}</h1>{% for post in posts %}{{ post.title }}{% endfor %}",
        )
        .unwrap();
        fs::write(
            root.join("pages/index.html"),
            concat!(
                "{% for post in posts %}<a href=\"{{ post.url }}\">{{ post.title }}</a>",
                "{% else %}<h2>No Posts.</h2>{% endfor %}",
            ),
        )
        .unwrap();
        fs::write(root.join("statics/site.css"), "body {}").unwrap();
    }

    fn write_text_post(root: &Path, dir: &str, title: &str, posted: &str, tags: &[&str]) {
        let post_dir = root.join("posts").join(dir);
        fs::create_dir_all(&post_dir).unwrap();
        let tag_list = tags
            .iter()
            .map(|t| format!("{t:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        fs::write(
            post_dir.join(META_FILENAME),
            format!("title = {title:?}\nposted = {posted:?}\ntags = [{tag_list}]\n"),
        )
        .unwrap();
        fs::write(post_dir.join(BODY_FILENAME), format!("Body of {title}.")).unwrap();
    }

    fn write_image_post(root: &Path, dir: &str, title: &str, posted: &str) {
        let post_dir = root.join("posts").join(dir);
        fs::create_dir_all(&post_dir).unwrap();
        fs::write(
            post_dir.join(META_FILENAME),
            format!("title = {title:?}\nposted = {posted:?}\n"),
        )
        .unwrap();
        image::RgbImage::from_pixel(64, 32, image::Rgb([120, 80, 40]))
            .save(post_dir.join("photo.jpg"))
            .unwrap();
    }

    // =========================================================================
    // Full builds
    // =========================================================================

    #[test]
    fn build_renders_posts_index_tags_and_statics() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        write_text_post(tmp.path(), "hello", "Hello", "2020-05-01T12:00:00Z", &["travel"]);
        write_image_post(tmp.path(), "photo", "A Photo", "2020-05-02T12:00:00Z");

        let engine = Engine::new(tmp.path()).unwrap();
        let posts = engine.build().unwrap();
        assert_eq!(posts.len(), 2);

        let out = engine.output_dir();
        assert!(out.join("2020/05/01/hello/index.html").is_file());
        assert!(out.join("2020/05/02/a-photo/index.html").is_file());
        assert!(out.join("2020/05/02/a-photo/image-2048.jpg").is_file());
        assert!(out.join("2020/05/02/a-photo/image-512.jpg").is_file());
        assert!(out.join("index.html").is_file());
        assert!(out.join("tags/travel/index.html").is_file());
        assert!(out.join("site.css").is_file());
    }

    #[test]
    fn posts_sort_newest_first_and_link_neighbors() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        write_text_post(tmp.path(), "old", "Old", "2020-01-01T00:00:00Z", &[]);
        write_text_post(tmp.path(), "new", "New", "2020-06-01T00:00:00Z", &[]);

        let engine = Engine::new(tmp.path()).unwrap();
        let posts = engine.build().unwrap();

        assert_eq!(posts.first().unwrap().meta.title, "New");
        let newest = fs::read_to_string(engine.output_dir().join("2020/06/01/new/index.html"))
            .unwrap();
        assert!(!newest.contains("rel=\"prev\""));
        assert!(newest.contains("rel=\"next\" href=\"/2020/01/01/old/\""));

        let oldest = fs::read_to_string(engine.output_dir().join("2020/01/01/old/index.html"))
            .unwrap();
        assert!(oldest.contains("rel=\"prev\" href=\"/2020/06/01/new/\""));
        assert!(!oldest.contains("rel=\"next\""));
    }

    #[test]
    fn collect_sorts_and_links_without_writing() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        write_text_post(tmp.path(), "old", "Old", "2020-01-01T00:00:00Z", &[]);
        write_text_post(tmp.path(), "new", "New", "2020-06-01T00:00:00Z", &[]);

        let engine = Engine::new(tmp.path()).unwrap();
        let posts = engine.collect().unwrap();

        assert_eq!(posts.first().unwrap().meta.title, "New");
        assert_eq!(posts.first().unwrap().slug, "2020/06/01/new");
        assert!(posts.has_next(0));
        assert!(!posts.has_previous(0));

        // No rendering happened: the output directory was never created.
        assert!(!engine.output_dir().exists());
    }

    #[test]
    fn empty_posts_dir_builds_placeholder_index() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());

        let engine = Engine::new(tmp.path()).unwrap();
        let posts = engine.build().unwrap();
        assert!(posts.is_empty());

        let html = fs::read_to_string(engine.output_dir().join("index.html")).unwrap();
        assert!(html.contains("No Posts."));
    }

    // =========================================================================
    // Discovery errors
    // =========================================================================

    #[test]
    fn missing_posts_dir_aborts() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        fs::remove_dir(tmp.path().join("posts")).unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        assert!(matches!(engine.build(), Err(EngineError::Io(_))));
    }

    #[test]
    fn missing_meta_is_an_error() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        fs::create_dir_all(tmp.path().join("posts/broken")).unwrap();
        fs::write(tmp.path().join("posts/broken/body.md"), "text").unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        assert!(matches!(engine.build(), Err(EngineError::Io(_))));
    }

    #[test]
    fn malformed_meta_names_the_file() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        let dir = tmp.path().join("posts/broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(META_FILENAME), "title = [not a string").unwrap();
        fs::write(dir.join(BODY_FILENAME), "text").unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        match engine.build() {
            Err(EngineError::Meta { path, .. }) => {
                assert!(path.ends_with("posts/broken/meta.toml"));
            }
            other => panic!("expected Meta error, got {other:?}"),
        }
    }

    #[test]
    fn post_with_body_and_image_is_ambiguous() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        let dir = tmp.path().join("posts/both");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(META_FILENAME),
            "title = \"Both\"\nposted = \"2020-05-01T00:00:00Z\"\n",
        )
        .unwrap();
        fs::write(dir.join(BODY_FILENAME), "text").unwrap();
        fs::write(dir.join("photo.jpg"), "not really a jpeg").unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        assert!(matches!(
            engine.build(),
            Err(EngineError::AmbiguousPayload(_))
        ));
    }

    #[test]
    fn post_without_payload_is_an_error() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        let dir = tmp.path().join("posts/hollow");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(META_FILENAME),
            "title = \"Hollow\"\nposted = \"2020-05-01T00:00:00Z\"\n",
        )
        .unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        assert!(matches!(engine.build(), Err(EngineError::MissingPayload(_))));
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    #[test]
    fn failed_post_does_not_stop_siblings() {
        let tmp = TempDir::new().unwrap();
        seed_blog(tmp.path());
        write_text_post(tmp.path(), "good", "Good", "2020-01-01T00:00:00Z", &[]);

        // An image post whose source cannot be decoded fails during variant
        // generation, after discovery succeeded.
        let dir = tmp.path().join("posts/bad");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(META_FILENAME),
            "title = \"Bad\"\nposted = \"2020-06-01T00:00:00Z\"\n",
        )
        .unwrap();
        fs::write(dir.join("photo.jpg"), "not a jpeg at all").unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        let err = engine.build().unwrap_err();
        assert!(matches!(err, EngineError::Variant(_)));

        // The healthy sibling still rendered.
        assert!(engine
            .output_dir()
            .join("2020/01/01/good/index.html")
            .is_file());
    }
}
