//! Slug derivation and previous/next linking.
//!
//! A slug is the canonical, path-safe identifier for a post. It is a pure
//! function of the post's `posted` date and title, so rebuilds with
//! unchanged metadata always produce the same output paths — the sync
//! engine's idempotence depends on this.
//!
//! The slug template is parsed once per build ([`SlugTemplate::parse`]); a
//! malformed template is a fatal configuration error, never a per-post one.
//! The default template produces `YYYY/MM/DD/slugified-title`.
//!
//! ## Collisions
//!
//! Two posts with identical date and title resolve to the same slug and
//! silently overwrite each other in the output tree. This mirrors the
//! observed behavior of the format; it is deliberately not deduplicated
//! here.

use chrono::Datelike;
use tera::{Context, Tera};
use thiserror::Error;

use crate::model::{Meta, Posts};

#[derive(Error, Debug)]
pub enum SlugError {
    #[error("slug template parse error: {0}")]
    Parse(tera::Error),
    #[error("slug template render error for {title:?}: {source}")]
    Render {
        title: String,
        #[source]
        source: tera::Error,
    },
}

/// Internal template name inside the one-off Tera instance.
const TEMPLATE_NAME: &str = "slug";

/// A parsed slug template.
///
/// Placeholders available during render: `year`, `month`, `day` (zero-padded
/// decimal strings) and `title_slug` (the slugified title).
pub struct SlugTemplate {
    tera: Tera,
}

impl SlugTemplate {
    /// Parse the template once. Call this before any per-post work so a
    /// broken template surfaces as a single fatal error.
    pub fn parse(template: &str) -> Result<Self, SlugError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, template)
            .map_err(SlugError::Parse)?;
        Ok(Self { tera })
    }

    /// Derive the slug for a post's metadata. Deterministic: identical
    /// `(posted, title)` always yields the same slug.
    pub fn render(&self, meta: &Meta) -> Result<String, SlugError> {
        let mut context = Context::new();
        context.insert("year", &format!("{:04}", meta.posted.year()));
        context.insert("month", &format!("{:02}", meta.posted.month()));
        context.insert("day", &format!("{:02}", meta.posted.day()));
        context.insert("title_slug", &slugify(&meta.title));
        self.tera
            .render(TEMPLATE_NAME, &context)
            .map(|slug| slug.trim_matches('/').to_string())
            .map_err(|source| SlugError::Render {
                title: meta.title.clone(),
                source,
            })
    }
}

/// Make a title path-safe: lowercase, runs of whitespace and punctuation
/// collapsed to single hyphens, no leading or trailing hyphen.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Assign previous/next links across the collection in its current order.
///
/// Must run after sorting; the first post has no previous and the last has
/// no next. Links are indices into the collection (see [`crate::model`]).
pub fn link(posts: &mut Posts) {
    let len = posts.len();
    for (position, post) in posts.as_mut_slice().iter_mut().enumerate() {
        post.previous = position.checked_sub(1);
        post.next = if position + 1 < len {
            Some(position + 1)
        } else {
            None
        };
    }
}
