//! # Photoblog
//!
//! A build-and-publish pipeline for photo and text blogs. Your filesystem is
//! the data source: each directory under `posts/` is one post, holding a
//! `meta.toml` plus either a markdown body or a single source photo.
//!
//! # Architecture: Build, Then Publish
//!
//! The pipeline has two halves with a hard seam between them:
//!
//! ```text
//! 1. Build    posts/ + templates  →  dist/     (variants + rendered HTML)
//! 2. Publish  dist/               →  remote    (diffed upload + CDN purge)
//! ```
//!
//! The build writes the output tree unconditionally (image variants are
//! skipped when already newer than their source); the publish step is where
//! change detection lives. Sync diffs content signatures against the remote
//! listing, uploads only what differs, never deletes, and hands the changed
//! paths to batched CDN invalidation. Running deploy twice in a row uploads
//! nothing and invalidates nothing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Build orchestration — discover, slug, sort, fan out per-post work, render site pages |
//! | [`model`] | Content model: posts, metadata, variants, the sorted collection |
//! | [`config`] | `config.toml` loading, defaults, validation |
//! | [`slug`] | Slug template rendering, title slugification, neighbor linking |
//! | [`selector`] | Label selector grammar for filtering posts |
//! | [`variants`] | Image variant generation with mtime-based skipping, EXIF capture dates |
//! | [`render`] | Tera template expansion: post pages, site pages, tag pages, statics |
//! | [`sync`] | Signature-diffed incremental upload through the [`sync::ObjectStore`] seam |
//! | [`invalidate`] | Batched CDN invalidation through the [`invalidate::CdnClient`] seam |
//! | [`scaffold`] | `init` — new-blog skeleton with working starter templates |

pub mod config;
pub mod engine;
pub mod invalidate;
pub mod model;
pub mod render;
pub mod scaffold;
pub mod selector;
pub mod slug;
pub mod sync;
pub mod variants;
