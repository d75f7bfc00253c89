//! HTML rendering.
//!
//! Expands Tera templates against the content model into the output file
//! tree. Templates are user-editable files in the source tree:
//!
//! - **Partials** (`partials/*.html`) — registered under their file stem, so
//!   `partials/header.html` is included as `{% include "header" %}`.
//! - **Post template** (`templates/post.html`) — rendered once per post to
//!   `<slug>/index.html` with `post`, `site`, `previous`, `next` in context.
//! - **Tag template** (`templates/tag.html`) — rendered once per tag to
//!   `tags/<tag>/index.html` with `tag` and the tag's `posts` in context.
//! - **Pages** (`pages/**`) — each rendered to the same relative path in the
//!   output root with the full `posts` list in context. `pages/index.html`
//!   becomes the site index.
//!
//! Iteration order is the collection's current (sorted) order. Templates use
//! `{% for post in posts %} … {% else %} … {% endfor %}` so an empty
//! collection renders a defined placeholder instead of an empty fragment.
//!
//! All templates are parsed together when the [`Renderer`] is built; a parse
//! failure is a fatal configuration error surfaced before any post work.
//! Rendering creates parent directories as needed and overwrites output
//! files unconditionally — only the sync engine diffs against the remote.

use pulldown_cmark::{Parser, html as md_html};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::BlogConfig;
use crate::model::{Post, Posts, Variant};
use crate::slug::slugify;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Registered name of the per-post template.
const POST_TEMPLATE: &str = "post";
/// Registered name of the per-tag template.
const TAG_TEMPLATE: &str = "tag";

/// Site-wide values available to every template as `site`.
#[derive(Debug, Clone, Serialize)]
pub struct SiteView {
    pub title: String,
    pub author: String,
    pub base_url: String,
}

/// The slice of a neighboring post that post templates link to.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborView {
    pub title: String,
    pub slug: String,
    pub url: String,
}

impl NeighborView {
    pub fn of(post: &Post) -> Self {
        Self {
            title: post.meta.title.clone(),
            slug: post.slug.clone(),
            url: format!("/{}/", post.slug),
        }
    }
}

/// Generated image variants as rooted URL paths.
#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    pub large: String,
    pub medium: String,
    pub small: String,
}

/// A post as seen by templates.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub title: String,
    pub slug: String,
    pub url: String,
    /// RFC 3339 timestamp for machine consumption.
    pub posted: String,
    /// Human-readable date, e.g. `December 11, 2018`.
    pub posted_display: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub post_type: String,
    /// Rendered HTML body for text posts.
    pub body: Option<String>,
    pub image: Option<ImageView>,
}

impl PostView {
    pub fn of(post: &Post) -> Self {
        let body = post.text.as_ref().map(|text| markdown_to_html(&text.body));
        let image = post.image.as_ref().map(|payload| ImageView {
            large: variant_url(payload.variants.get(&Variant::Large)),
            medium: variant_url(payload.variants.get(&Variant::Medium)),
            small: variant_url(payload.variants.get(&Variant::Small)),
        });
        Self {
            title: post.meta.title.clone(),
            slug: post.slug.clone(),
            url: format!("/{}/", post.slug),
            posted: post.meta.posted.to_rfc3339(),
            posted_display: post.meta.posted.format("%B %d, %Y").to_string(),
            location: post.meta.location.clone(),
            tags: post.meta.tags.clone(),
            post_type: post.post_type().to_string(),
            body,
            image,
        }
    }
}

/// Convert a variant's output path to a rooted URL with forward slashes.
fn variant_url(path: Option<&PathBuf>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

fn markdown_to_html(markdown: &str) -> String {
    let mut html = String::new();
    md_html::push_html(&mut html, Parser::new(markdown));
    html
}

/// Holds the parsed template set for one build.
///
/// Shared read-only across build workers; Tera rendering takes `&self`.
pub struct Renderer {
    tera: Tera,
    site: SiteView,
    /// Registered page template names, as output-relative paths.
    pages: Vec<String>,
    statics_dir: PathBuf,
}

impl Renderer {
    /// Read and parse every template under the blog root.
    ///
    /// All templates are added in one batch so partials and includes resolve
    /// regardless of registration order. Any parse failure aborts the build
    /// here, before per-post work starts.
    pub fn load(config: &BlogConfig, root: &Path) -> Result<Self, RenderError> {
        let mut templates: Vec<(String, String)> = Vec::new();

        let partials_dir = config.partials_dir(root);
        if partials_dir.is_dir() {
            for (relative, path) in template_files(&partials_dir)? {
                let name = Path::new(&relative)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or(relative);
                templates.push((name, fs::read_to_string(&path)?));
            }
        }

        templates.push((
            POST_TEMPLATE.to_string(),
            fs::read_to_string(root.join(&config.post_template))?,
        ));
        templates.push((
            TAG_TEMPLATE.to_string(),
            fs::read_to_string(root.join(&config.tag_template))?,
        ));

        let mut pages = Vec::new();
        let pages_dir = config.pages_dir(root);
        if pages_dir.is_dir() {
            for (relative, path) in template_files(&pages_dir)? {
                templates.push((relative.clone(), fs::read_to_string(&path)?));
                pages.push(relative);
            }
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)?;
        // Template output is trusted site HTML. Escaping would otherwise
        // depend on the registered name (pages keep their `.html` suffix,
        // post/tag do not), entity-mangling URLs on pages only.
        tera.autoescape_on(Vec::new());

        Ok(Self {
            tera,
            site: SiteView {
                title: config.title.clone(),
                author: config.author.clone(),
                base_url: config.base_url.clone(),
            },
            pages,
            statics_dir: config.statics_dir(root),
        })
    }

    /// Render one post's page to `<output_root>/<slug>/index.html`.
    pub fn render_post(
        &self,
        post: &Post,
        previous: Option<&NeighborView>,
        next: Option<&NeighborView>,
        output_root: &Path,
    ) -> Result<(), RenderError> {
        let mut context = self.base_context();
        context.insert("post", &PostView::of(post));
        context.insert("previous", &previous);
        context.insert("next", &next);

        let html = self.tera.render(POST_TEMPLATE, &context)?;
        write_output(&output_root.join(post.index_path()), &html)
    }

    /// Render every page template against the full (sorted) collection.
    pub fn render_pages(&self, posts: &Posts, output_root: &Path) -> Result<(), RenderError> {
        let views: Vec<PostView> = posts.iter().map(PostView::of).collect();
        let mut context = self.base_context();
        context.insert("posts", &views);

        for page in &self.pages {
            let html = self.tera.render(page, &context)?;
            write_output(&output_root.join(page), &html)?;
        }
        Ok(())
    }

    /// Render one page per distinct tag to `tags/<tag>/index.html`.
    ///
    /// Each tag's posts keep the collection's current order. Tag groupings
    /// are precomputed by [`Posts::tag_groups`], once per build.
    pub fn render_tags(&self, posts: &Posts, output_root: &Path) -> Result<(), RenderError> {
        for (tag, indices) in posts.tag_groups() {
            let views: Vec<PostView> = indices
                .iter()
                .filter_map(|&index| posts.get(index))
                .map(PostView::of)
                .collect();

            let mut context = self.base_context();
            context.insert("tag", &tag);
            context.insert("posts", &views);

            let html = self.tera.render(TAG_TEMPLATE, &context)?;
            let path = output_root
                .join("tags")
                .join(slugify(&tag))
                .join("index.html");
            write_output(&path, &html)?;
        }
        Ok(())
    }

    /// Copy the statics tree verbatim into the output root.
    pub fn copy_statics(&self, output_root: &Path) -> Result<(), RenderError> {
        if !self.statics_dir.is_dir() {
            return Ok(());
        }
        copy_dir_recursive(&self.statics_dir, output_root)?;
        Ok(())
    }

    fn base_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("site", &self.site);
        context
    }
}

/// Every regular file under `dir` as `(relative path, absolute path)`,
/// sorted by relative path for deterministic registration.
fn template_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, RenderError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, entry.path().to_path_buf()));
    }
    files.sort();
    Ok(files)
}

fn write_output(path: &Path, html: &str) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, html)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
