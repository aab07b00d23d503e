//! Generates `sitemap.xml` from the pages already present in the output tree.

use crate::index::LANDING_PAGE;
use crate::post::HTML_EXTENSION;
use crate::util::{join_path, write_atomic};
use chrono::NaiveDate;
use pulldown_cmark::escape::escape_html;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;
use walkdir::WalkDir;

pub const SITEMAP: &str = "sitemap.xml";

/// One `<url>` element.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub loc: Url,
    pub priority: &'static str,
}

/// Lists the site root followed by every HTML page under `output_directory`
/// in path order. The root `index.html` is the site root itself and isn't
/// listed twice.
pub fn entries(site_root: &Url, output_directory: &Path) -> Result<Vec<Entry>> {
    let mut entries = vec![Entry {
        loc: site_root.clone(),
        priority: "1.0",
    }];
    let landing = output_directory.join(LANDING_PAGE);
    for result in WalkDir::new(output_directory).sort_by_file_name() {
        let entry = result?;
        let path = entry.path();
        let is_page = path.extension().map_or(false, |ext| ext == HTML_EXTENSION);
        if !entry.file_type().is_file() || !is_page || path == landing {
            continue;
        }
        let relative = path
            .strip_prefix(output_directory)
            .map_err(|_| Error::OutsideOutput(path.to_owned()))?;
        entries.push(Entry {
            loc: join_path(site_root, relative)?,
            priority: "0.5",
        });
    }
    Ok(entries)
}

/// Renders the sitemap document. Every entry shares `lastmod`.
pub fn render(entries: &[Entry], lastmod: NaiveDate) -> String {
    let lastmod = lastmod.format("%Y-%m-%d").to_string();
    let mut out = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        "\n",
        r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        "\n",
    ));
    for entry in entries {
        out.push_str("  <url>\n    <loc>");
        // writing into a String can't fail
        let _ = escape_html(&mut out, entry.loc.as_str());
        out.push_str("</loc>\n    <lastmod>");
        out.push_str(&lastmod);
        out.push_str("</lastmod>\n    <changefreq>always</changefreq>\n    <priority>");
        out.push_str(entry.priority);
        out.push_str("</priority>\n  </url>\n");
    }
    out.push_str("</urlset>\n");
    out
}

/// Walks `output_directory` and writes its sitemap, returning the number of
/// entries.
pub fn write_sitemap(site_root: &Url, output_directory: &Path, lastmod: NaiveDate) -> Result<usize> {
    let entries = entries(site_root, output_directory)?;
    let path = output_directory.join(SITEMAP);
    write_atomic(&path, render(&entries, lastmod).as_bytes()).map_err(|err| Error::Io {
        path: path.clone(),
        err,
    })?;
    tracing::debug!(entries = entries.len(), path = %path.display(), "wrote sitemap");
    Ok(entries.len())
}

/// The result of a fallible sitemap operation.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the output tree can't be walked.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("`{}` is outside the output directory", .0.display())]
    OutsideOutput(PathBuf),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error("writing `{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}
