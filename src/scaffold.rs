//! New-blog scaffolding.
//!
//! Lays down a working blog skeleton in a target directory: the source-tree
//! directories, a full `config.toml`, a starter template set, and a base
//! stylesheet. The seeded templates render as-is, so `build` succeeds on a
//! freshly initialized blog (with an empty-collection placeholder on the
//! index). Refuses to touch a directory that already holds a config file.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::{BlogConfig, CONFIG_FILENAME};

#[derive(Error, Debug)]
pub enum ScaffoldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serializing config: {0}")]
    Config(#[from] toml::ser::Error),
    #[error("{0} already contains a {CONFIG_FILENAME}")]
    AlreadyInitialized(std::path::PathBuf),
}

const HEADER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>{{ site.title }}</title>
    <meta name="author" content="{{ site.author }}">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <link rel="stylesheet" href="/css/site.css">
</head>
<body>
    <div class="content">
"#;

const FOOTER_HTML: &str = r#"    </div>
</body>
</html>
"#;

const INDEX_HTML: &str = r#"{% include "header" %}
{% for post in posts %}
    <div class="post">
        <a href="{{ post.url }}">
        {% if post.image %}<img src="{{ post.image.small }}" />{% else %}{{ post.title }}{% endif %}
        </a>
    </div>
{% else %}
    <h2>No Posts.</h2>
{% endfor %}
{% include "footer" %}
"#;

const POST_HTML: &str = r#"{% include "header" %}
<div class="post">
    <h1>{{ post.title }}</h1>
    {% if post.image %}<img src="{{ post.image.large }}" />{% endif %}
    {% if post.body %}{{ post.body | safe }}{% endif %}
    <p class="posted">{{ post.posted_display }}{% if post.location %} &mdash; {{ post.location }}{% endif %}</p>
    {% if previous %}<a rel="prev" href="{{ previous.url }}">{{ previous.title }}</a>{% endif %}
    {% if next %}<a rel="next" href="{{ next.url }}">{{ next.title }}</a>{% endif %}
</div>
{% include "footer" %}
"#;

const TAG_HTML: &str = r#"{% include "header" %}
<div class="tag">
    <h1>{{ tag }}</h1>
    {% for post in posts %}
    <div class="post">
        <a href="{{ post.url }}">
        {% if post.image %}<img src="{{ post.image.small }}" />{% else %}{{ post.title }}{% endif %}
        </a>
    </div>
    {% else %}
    <h2>No Posts For Tag.</h2>
    {% endfor %}
</div>
{% include "footer" %}
"#;

const SITE_CSS: &str = r#"body { font-family: 'sans-serif'; margin: 0; padding: 0; }

.post { display: inline-block; }

.post img {
    width: auto;
    max-width: calc(100vw - 20px);
    height: auto;
    max-height: calc(100vh - 20px);
}
"#;

/// Initialize a new blog under `root` with the given site identity.
pub fn scaffold(
    root: &Path,
    title: &str,
    author: &str,
    base_url: &str,
) -> Result<(), ScaffoldError> {
    if root.join(CONFIG_FILENAME).exists() {
        return Err(ScaffoldError::AlreadyInitialized(root.to_path_buf()));
    }

    let config = BlogConfig {
        title: title.to_string(),
        author: author.to_string(),
        base_url: base_url.to_string(),
        ..BlogConfig::default()
    };

    fs::create_dir_all(config.posts_dir(root))?;
    fs::create_dir_all(config.pages_dir(root))?;
    fs::create_dir_all(config.partials_dir(root))?;
    fs::create_dir_all(config.statics_dir(root).join("css"))?;
    fs::create_dir_all(root.join("templates"))?;

    fs::write(
        root.join(CONFIG_FILENAME),
        toml::to_string_pretty(&config)?,
    )?;
    fs::write(config.partials_dir(root).join("header.html"), HEADER_HTML)?;
    fs::write(config.partials_dir(root).join("footer.html"), FOOTER_HTML)?;
    fs::write(config.pages_dir(root).join("index.html"), INDEX_HTML)?;
    fs::write(root.join(&config.post_template), POST_HTML)?;
    fs::write(root.join(&config.tag_template), TAG_HTML)?;
    fs::write(
        config.statics_dir(root).join("css/site.css"),
        SITE_CSS,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use tempfile::TempDir;

    #[test]
    fn lays_down_the_full_skeleton() {
        let tmp = TempDir::new().unwrap();
        scaffold(tmp.path(), "Field Notes", "Jo", "https://example.com").unwrap();

        for path in [
            "config.toml",
            "posts",
            "pages/index.html",
            "partials/header.html",
            "partials/footer.html",
            "templates/post.html",
            "templates/tag.html",
            "statics/css/site.css",
        ] {
            assert!(tmp.path().join(path).exists(), "missing {path}");
        }
    }

    #[test]
    fn seeded_config_round_trips() {
        let tmp = TempDir::new().unwrap();
        scaffold(tmp.path(), "Field Notes", "Jo", "https://example.com").unwrap();

        let config = BlogConfig::load_from_root(tmp.path()).unwrap();
        assert_eq!(config.title, "Field Notes");
        assert_eq!(config.author, "Jo");
        assert_eq!(config.base_url, "https://example.com");
        assert_eq!(config.images.large, 2048);
    }

    #[test]
    fn refuses_an_initialized_directory() {
        let tmp = TempDir::new().unwrap();
        scaffold(tmp.path(), "A", "", "").unwrap();
        assert!(matches!(
            scaffold(tmp.path(), "B", "", ""),
            Err(ScaffoldError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn fresh_scaffold_builds_cleanly() {
        let tmp = TempDir::new().unwrap();
        scaffold(tmp.path(), "Field Notes", "Jo", "").unwrap();

        let engine = Engine::new(tmp.path()).unwrap();
        let posts = engine.build().unwrap();
        assert!(posts.is_empty());

        let html = std::fs::read_to_string(engine.output_dir().join("index.html")).unwrap();
        assert!(html.contains("No Posts."));
        assert!(engine.output_dir().join("css/site.css").is_file());
    }
}
