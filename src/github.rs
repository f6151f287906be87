//! GitHub repository archive source.
//!
//! Downloads a repository's branch archive as a zip, walks its entries, and
//! produces [`SourceItem`]s for the documentation files: include/exclude
//! globs select candidates, translation directories are filtered to English,
//! and YAML frontmatter is parsed into document metadata.
//!
//! The same entry walk works on a local archive file (`sync --archive`),
//! which is also how the integration tests exercise the pipeline without a
//! network.

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::Read;

use crate::config::{Config, GithubConfig};
use crate::models::SourceItem;

/// Download the branch archive zip for the configured repository.
pub async fn fetch_archive(config: &GithubConfig) -> Result<Vec<u8>> {
    let url = format!(
        "https://github.com/{}/{}/archive/refs/heads/{}.zip",
        config.owner, config.repo, config.branch
    );

    tracing::info!(url = %url, "downloading repository archive");

    let client = reqwest::Client::builder().build()?;
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to download repository archive: {}", url))?;

    let status = resp.status();
    if !status.is_success() {
        bail!("Failed to download repository archive: HTTP {}", status);
    }

    let bytes = resp.bytes().await?;
    tracing::info!(bytes = bytes.len(), "repository archive downloaded");
    Ok(bytes.to_vec())
}

/// Walk archive entries and produce one [`SourceItem`] per kept file.
///
/// Entries are filtered by the configured globs and the English-only
/// translation rules, their top-level `{repo}-{branch}/` prefix stripped,
/// and frontmatter split out of the body.
pub fn scan_archive(config: &Config, archive_bytes: &[u8]) -> Result<Vec<SourceItem>> {
    let gh = &config.github;
    let include_set = build_globset(&gh.include_globs)?;
    let exclude_set = build_globset(&gh.exclude_globs)?;

    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive_bytes))
        .context("Repository archive is not a valid zip")?;

    let mut items = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let full_name = entry.name().to_string();

        // The archive nests everything under `{repo}-{branch}/`.
        let rel_path = match full_name.split_once('/') {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => continue,
        };

        if exclude_set.is_match(&rel_path) || !include_set.is_match(&rel_path) {
            continue;
        }
        if !is_english_doc(&rel_path) {
            continue;
        }

        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        let content = String::from_utf8_lossy(&raw).into_owned();

        let updated_at = entry
            .last_modified()
            .and_then(|dt| {
                Utc.with_ymd_and_hms(
                    dt.year() as i32,
                    dt.month() as u32,
                    dt.day() as u32,
                    dt.hour() as u32,
                    dt.minute() as u32,
                    dt.second() as u32,
                )
                .single()
            })
            .unwrap_or_else(Utc::now);

        let (front, body) = split_frontmatter(&content);
        let meta = front.map(parse_frontmatter).unwrap_or_default();

        let file_name = rel_path
            .rsplit('/')
            .next()
            .unwrap_or(rel_path.as_str())
            .to_string();

        items.push(SourceItem {
            source: "github".to_string(),
            source_id: rel_path.clone(),
            source_url: Some(blob_url(gh, &rel_path)),
            title: meta.title.or(Some(file_name)),
            author: meta.author,
            created_at: updated_at,
            updated_at,
            content_type: "text/markdown".to_string(),
            body: body.to_string(),
            metadata_json: meta.extra_json,
        });
    }

    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    tracing::info!(documents = items.len(), "extracted documents from archive");
    Ok(items)
}

/// Web URL for a file on the configured branch, used for citations.
pub fn blob_url(config: &GithubConfig, rel_path: &str) -> String {
    format!(
        "https://github.com/{}/{}/blob/{}/{}",
        config.owner, config.repo, config.branch, rel_path
    )
}

/// English-only filter for repositories that vendor translated copies of
/// their docs. Translation, locale, and CI directories are skipped unless
/// the path itself is marked English.
fn is_english_doc(rel_path: &str) -> bool {
    // Anchor with a leading slash so top-level directories match the
    // same segment patterns as nested ones.
    let lower = format!("/{}", rel_path.to_lowercase());
    let marked_english = lower.contains("/en/") || lower.contains("/english/");

    if lower.contains("/translations/") && !marked_english {
        return false;
    }

    let localized_dirs = ["/locale/", "/i18n/", "/.github/"];
    if localized_dirs.iter().any(|d| lower.contains(d)) && !marked_english {
        return false;
    }

    true
}

// ============ Frontmatter ============

#[derive(Debug, Default)]
struct Frontmatter {
    title: Option<String>,
    author: Option<String>,
    extra_json: String,
}

impl Frontmatter {
    fn empty() -> Self {
        Self {
            title: None,
            author: None,
            extra_json: "{}".to_string(),
        }
    }
}

/// Split a `---` fenced YAML frontmatter block off the top of a document.
/// Returns `(Some(yaml), body)` when a fence pair is present, otherwise
/// `(None, original)`.
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let rest = match content.strip_prefix("---\n").or_else(|| {
        content.strip_prefix("---\r\n")
    }) {
        Some(r) => r,
        None => return (None, content),
    };

    for fence in ["\n---\n", "\n---\r\n"] {
        if let Some(pos) = rest.find(fence) {
            let yaml = &rest[..pos];
            let body = &rest[pos + fence.len()..];
            return (Some(yaml), body);
        }
    }
    // Closing fence at end of file without trailing newline
    if let Some(yaml) = rest.strip_suffix("\n---") {
        return (Some(yaml), "");
    }

    (None, content)
}

/// Parse a frontmatter block, pulling out `title` and `author` and keeping
/// the full mapping as JSON. Malformed YAML degrades to empty metadata
/// rather than failing the document.
fn parse_frontmatter(yaml: &str) -> Frontmatter {
    let value: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed frontmatter");
            return Frontmatter::empty();
        }
    };

    let mapping = match value.as_mapping() {
        Some(m) => m,
        None => return Frontmatter::empty(),
    };

    let get_str = |key: &str| -> Option<String> {
        mapping
            .get(serde_yaml::Value::String(key.to_string()))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    let extra_json = serde_json::to_string(mapping).unwrap_or_else(|_| "{}".to_string());

    Frontmatter {
        title: get_str("title"),
        author: get_str("author"),
        extra_json,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translations_skipped_unless_english() {
        assert!(is_english_doc("docs/intro.md"));
        assert!(is_english_doc("docs/translations/en/intro.md"));
        assert!(!is_english_doc("docs/translations/fr/intro.md"));
        assert!(!is_english_doc("docs/Translations/ja/intro.md"));
    }

    #[test]
    fn top_level_dirs_filtered_like_nested_ones() {
        // Repo-relative paths have no leading slash; the filter must still
        // catch these directories at the repository root.
        assert!(!is_english_doc(".github/ISSUE_TEMPLATE/bug.md"));
        assert!(!is_english_doc("translations/ja/intro.md"));
        assert!(!is_english_doc("locale/de/page.md"));
        assert!(!is_english_doc("i18n/zh/page.md"));
        assert!(is_english_doc("translations/en/intro.md"));
        assert!(is_english_doc("README.md"));
    }

    #[test]
    fn locale_and_ci_dirs_skipped() {
        assert!(!is_english_doc("site/locale/de/page.md"));
        assert!(!is_english_doc("site/i18n/zh/page.md"));
        assert!(!is_english_doc(".github/ISSUE_TEMPLATE/bug.md"));
        assert!(is_english_doc("site/locale/en/page.md"));
        assert!(is_english_doc("site/i18n/english/page.md"));
    }

    #[test]
    fn frontmatter_split_and_parse() {
        let content = "---\ntitle: Getting Started\nauthor: Ada\nstatus: draft\n---\n# Hello\n\nBody text.";
        let (front, body) = split_frontmatter(content);
        assert!(front.is_some());
        assert_eq!(body, "# Hello\n\nBody text.");

        let meta = parse_frontmatter(front.unwrap());
        assert_eq!(meta.title.as_deref(), Some("Getting Started"));
        assert_eq!(meta.author.as_deref(), Some("Ada"));
        assert!(meta.extra_json.contains("draft"));
    }

    #[test]
    fn document_without_frontmatter_kept_whole() {
        let content = "# Just a heading\n\nNo frontmatter here.";
        let (front, body) = split_frontmatter(content);
        assert!(front.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn unterminated_fence_is_not_frontmatter() {
        let content = "---\ntitle: broken\nno closing fence";
        let (front, body) = split_frontmatter(content);
        assert!(front.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn malformed_yaml_degrades_to_empty_metadata() {
        let meta = parse_frontmatter(": : not yaml : :");
        assert!(meta.title.is_none());
        assert_eq!(meta.extra_json, "{}");
    }

    #[test]
    fn blob_url_shape() {
        let gh = GithubConfig {
            owner: "microsoft".into(),
            repo: "ai-agents-for-beginners".into(),
            branch: "main".into(),
            include_globs: vec![],
            exclude_globs: vec![],
        };
        assert_eq!(
            blob_url(&gh, "01-intro/README.md"),
            "https://github.com/microsoft/ai-agents-for-beginners/blob/main/01-intro/README.md"
        );
    }
}
