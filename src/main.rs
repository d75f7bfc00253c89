use clap::{Parser, Subcommand};
use std::path::PathBuf;

use photoblog::engine::Engine;
use photoblog::invalidate::{self, FsCdnClient};
use photoblog::scaffold;
use photoblog::selector::Selector;
use photoblog::sync::{self, Cancellation, FsObjectStore, SyncOptions};

#[derive(Parser)]
#[command(name = "photoblog")]
#[command(about = "Build and publish a photo/text blog")]
#[command(long_about = "\
Build and publish a photo/text blog

Your filesystem is the data source. Each directory under posts/ is one post:
a meta.toml plus either a body.md or a single source photo.

Content structure:

  blog/
  ├── config.toml                  # Site config (all fields optional)
  ├── posts/
  │   ├── mt-tam/
  │   │   ├── meta.toml            # title, posted, location, tags
  │   │   └── DSC00001.jpg         # photo post: one source image
  │   └── field-notes/
  │       ├── meta.toml
  │       └── body.md              # text post: markdown body
  ├── pages/index.html             # site pages, rendered with all posts
  ├── partials/                    # included by file stem: {% include \"header\" %}
  ├── templates/post.html          # rendered once per post
  ├── templates/tag.html           # rendered once per tag
  └── statics/                     # copied into the output root verbatim

Posts render to <output>/<slug>/index.html with image variants alongside.
Deploy uploads only new or changed files and purges them from the CDN.")]
#[command(version)]
struct Cli {
    /// Blog root directory
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new blog skeleton
    Init {
        /// Directory to initialize
        name: PathBuf,
        /// Site title
        #[arg(long, default_value = "My Blog")]
        title: String,
        /// Site author
        #[arg(long, default_value = "")]
        author: String,
        /// Canonical site URL
        #[arg(long, default_value = "")]
        base_url: String,
    },
    /// Build the output tree: variants, post pages, site pages
    Build,
    /// Build, then sync the output tree to the remote and purge the CDN
    Deploy {
        /// Plan the sync and invalidation without uploading
        #[arg(long)]
        dry_run: bool,
    },
    /// List posts, optionally filtered by a label selector
    List {
        /// Label selector, e.g. 'postType = image, tag-travel'
        selector: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init {
            name,
            title,
            author,
            base_url,
        } => {
            scaffold::scaffold(&name, &title, &author, &base_url)?;
            println!("==> Initialized blog in {}", name.display());
        }
        Command::Build => {
            let engine = Engine::new(&cli.source)?;
            println!("==> Building {}", cli.source.display());
            let posts = engine.build()?;
            println!(
                "==> Build complete: {} posts → {}",
                posts.len(),
                engine.output_dir().display()
            );
        }
        Command::Deploy { dry_run } => {
            let engine = Engine::new(&cli.source)?;
            let deploy = engine.config().deploy.clone();
            if deploy.container.is_empty() {
                return Err("deploy.container is not set in config.toml".into());
            }

            println!("==> Stage 1: Building {}", cli.source.display());
            let posts = engine.build()?;
            println!("    {} posts rendered", posts.len());

            println!("==> Stage 2: Syncing → {}", deploy.container);
            let store = FsObjectStore::new(deploy.container.as_ref());
            let cancel = Cancellation::new();
            let options = SyncOptions {
                dry_run,
                fan_out: engine.config().effective_fan_out(),
                cancel: cancel.clone(),
                ..SyncOptions::default()
            };
            let changed = sync::sync(&engine.output_dir(), &store, &options)?;
            let verb = if dry_run { "would upload" } else { "uploaded" };
            println!("    {} {} files", verb, changed.len());

            if deploy.distribution.is_empty() {
                println!("==> No distribution configured, skipping invalidation");
            } else if changed.is_empty() {
                println!("==> Nothing changed, skipping invalidation");
            } else if dry_run {
                println!(
                    "==> Would invalidate {} paths on {}",
                    changed.len(),
                    deploy.distribution
                );
            } else {
                println!("==> Stage 3: Invalidating {} paths", changed.len());
                let cdn = FsCdnClient::new(deploy.container.as_ref());
                let batches =
                    invalidate::invalidate(&cdn, &deploy.distribution, &changed, &cancel)?;
                println!("    {batches} batches issued to {}", deploy.distribution);
            }
            println!("==> Deploy complete");
        }
        Command::List { selector } => {
            let engine = Engine::new(&cli.source)?;
            let posts = engine.collect()?;
            match selector {
                Some(raw) => {
                    let selector = Selector::parse(&raw)?;
                    for post in posts.filter(&selector) {
                        println!("{}\t{}", post.slug, post.meta.title);
                    }
                }
                None => {
                    for post in posts.iter() {
                        println!("{}\t{}", post.slug, post.meta.title);
                    }
                }
            }
        }
    }

    Ok(())
}
