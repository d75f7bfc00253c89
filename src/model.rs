//! In-memory content model for a blog.
//!
//! A [`Post`] is a single content item — either a text post (markdown body)
//! or an image post (source photo plus generated variants). [`Posts`] is the
//! ordered collection that owns every post for a build.
//!
//! ## Lifecycle
//!
//! The collection is constructed once per build from directory enumeration,
//! sorted and linked exactly once, and treated as read-only during rendering.
//! The parallel build phase mutates posts through `par_iter_mut`, so each
//! worker owns a disjoint element and no locking is needed.
//!
//! ## The empty sentinel
//!
//! A post with neither payload is the valid zero-value placeholder
//! ([`Post::is_zero`]). Neighbor checks ([`Posts::has_previous`],
//! [`Posts::has_next`]) treat an empty neighbor the same as a missing one.
//!
//! ## Navigation links
//!
//! `previous`/`next` are indices into the owning collection, not references.
//! They are assigned by [`crate::slug::link`] after sorting; resolving them
//! goes through [`Posts::get`] so the sentinel check stays at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::selector::Selector;

/// Label value assigned to every tag key in a post's label map.
pub const TAG_SENTINEL: &str = "tagged";

/// Post metadata, parsed from `meta.toml` in the post's source directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub title: String,
    /// Publication timestamp (RFC 3339 in the metadata file).
    pub posted: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            title: String::new(),
            posted: DateTime::UNIX_EPOCH,
            location: None,
            tags: Vec::new(),
        }
    }
}

/// Markdown body of a text post.
#[derive(Debug, Clone, Default)]
pub struct TextPayload {
    /// Source file the body was read from.
    pub source: PathBuf,
    /// Raw markdown. Rendered to HTML at render time.
    pub body: String,
}

/// Named variant sizes for a post's source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Large,
    Medium,
    Small,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Large, Variant::Medium, Variant::Small];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Large => "large",
            Variant::Medium => "medium",
            Variant::Small => "small",
        }
    }
}

/// Source image of an image post plus its generated variants.
#[derive(Debug, Clone, Default)]
pub struct ImagePayload {
    /// Path to the original photo in the source tree.
    pub source: PathBuf,
    /// EXIF capture timestamp, if the source carried one.
    pub capture_date: Option<DateTime<Utc>>,
    /// Variant name → generated file path (relative to the output root).
    pub variants: BTreeMap<Variant, PathBuf>,
}

/// A single post.
#[derive(Debug, Clone, Default)]
pub struct Post {
    /// Source directory this post was parsed from.
    pub original_path: PathBuf,
    /// Output directory (`<output root>/<slug>`), computed during the build.
    pub output_path: PathBuf,
    /// Canonical URL path, derived from the posted date and title.
    pub slug: String,
    /// Position in source enumeration order.
    pub index: usize,
    /// Modification time of the payload source file.
    pub mod_time: Option<SystemTime>,

    pub meta: Meta,
    pub text: Option<TextPayload>,
    pub image: Option<ImagePayload>,

    /// Index of the chronologically adjacent posts in the owning collection.
    /// Assigned after sorting; `None` means no such neighbor.
    pub previous: Option<usize>,
    pub next: Option<usize>,
}

impl Post {
    /// The zero-value placeholder used where a real post may be absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A post with neither payload is the empty sentinel.
    pub fn is_zero(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }

    pub fn is_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn post_type(&self) -> &'static str {
        if self.is_text() { "text" } else { "image" }
    }

    /// Label map used for selector filtering.
    ///
    /// Fixed keys (`title`, `location`, `slug`, `postType`) plus one entry
    /// per tag mapped to [`TAG_SENTINEL`].
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("title".to_string(), self.meta.title.clone());
        labels.insert(
            "location".to_string(),
            self.meta.location.clone().unwrap_or_default(),
        );
        labels.insert("slug".to_string(), self.slug.clone());
        labels.insert("postType".to_string(), self.post_type().to_string());
        for tag in &self.meta.tags {
            labels.insert(tag.clone(), TAG_SENTINEL.to_string());
        }
        labels
    }

    /// Capture date with fallback to the posted timestamp.
    ///
    /// Used by the `capture-date` sort key: posts without EXIF data sort by
    /// their `posted` metadata instead.
    pub fn capture_or_posted(&self) -> DateTime<Utc> {
        self.image
            .as_ref()
            .and_then(|image| image.capture_date)
            .unwrap_or(self.meta.posted)
    }

    /// Output path of the post's rendered page, relative to the output root.
    pub fn index_path(&self) -> PathBuf {
        Path::new(&self.slug).join("index.html")
    }

    /// Output path for an image variant of the given width, relative to the
    /// output root. The source file's extension is preserved.
    pub fn image_path_for_width(&self, width: u32) -> PathBuf {
        let ext = self
            .image
            .as_ref()
            .and_then(|image| image.source.extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "jpg".to_string());
        Path::new(&self.slug).join(format!("image-{}.{}", width, ext))
    }
}

/// Sort key for the post collection.
///
/// Each key has a default direction: `posted` and `capture-date` sort
/// newest-first, `index` sorts by enumeration order. The `ascending` flag
/// passed to [`Posts::sort`] inverts the key's default direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Posted,
    CaptureDate,
    Index,
}

/// Ordered collection owning its posts.
#[derive(Debug, Clone, Default)]
pub struct Posts {
    posts: Vec<Post>,
}

impl Posts {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    pub fn push(&mut self, post: Post) {
        self.posts.push(post);
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Post> {
        self.posts.get(index)
    }

    pub fn first(&self) -> Option<&Post> {
        self.posts.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Post> {
        self.posts.iter()
    }

    /// Mutable slice access for the parallel build phase. Workers partition
    /// by element, so writes target disjoint posts by construction.
    pub fn as_mut_slice(&mut self) -> &mut [Post] {
        &mut self.posts
    }

    /// Stable sort by the given key.
    ///
    /// `ascending` inverts the key's default direction (newest-first for the
    /// date keys, enumeration order for `index`). Ties keep their relative
    /// order across repeated sorts of the same input.
    pub fn sort(&mut self, key: SortKey, ascending: bool) {
        self.posts.sort_by(|a, b| {
            let ordering = match key {
                SortKey::Posted => b.meta.posted.cmp(&a.meta.posted),
                SortKey::CaptureDate => b.capture_or_posted().cmp(&a.capture_or_posted()),
                SortKey::Index => a.index.cmp(&b.index),
            };
            if ascending { ordering.reverse() } else { ordering }
        });
    }

    /// Whether the post at `index` has a chronologically previous neighbor.
    ///
    /// True only if the link is set and resolves to a non-empty post.
    pub fn has_previous(&self, index: usize) -> bool {
        self.neighbor_exists(self.posts.get(index).and_then(|post| post.previous))
    }

    /// Whether the post at `index` has a chronologically next neighbor.
    pub fn has_next(&self, index: usize) -> bool {
        self.neighbor_exists(self.posts.get(index).and_then(|post| post.next))
    }

    fn neighbor_exists(&self, link: Option<usize>) -> bool {
        link.and_then(|i| self.posts.get(i))
            .is_some_and(|neighbor| !neighbor.is_zero())
    }

    /// Every post whose label map satisfies the selector, in the
    /// collection's current order.
    pub fn filter(&self, selector: &Selector) -> Vec<&Post> {
        self.posts
            .iter()
            .filter(|post| selector.matches(&post.labels()))
            .collect()
    }

    /// Distinct tag values mapped to the posts carrying each tag, as indices
    /// into this collection in its current order.
    ///
    /// Computed once per build to drive tag-page rendering, so the selector
    /// machinery stays out of the render hot path.
    pub fn tag_groups(&self) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, post) in self.posts.iter().enumerate() {
            for tag in &post.meta.tags {
                groups.entry(tag.clone()).or_default().push(index);
            }
        }
        groups
    }
}

impl<'a> IntoIterator for &'a Posts {
    type Item = &'a Post;
    type IntoIter = std::slice::Iter<'a, Post>;

    fn into_iter(self) -> Self::IntoIter {
        self.posts.iter()
    }
}
