//! Builds the aggregate pages: the landing page, the archive, and the
//! projects page.

use crate::documents::{Document, Documents};
use crate::post::Post;
use crate::projects::Project;
use crate::theme::{self, object, SiteContext};
use crate::util::write_atomic;
use gtmpl::{Template, Value};
use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LANDING_PAGE: &str = "index.html";
pub const ARCHIVE_PAGE: &str = "archive.html";
pub const PROJECTS_PAGE: &str = "projects.html";

/// Sorts posts most recent first. Posts sharing a timestamp keep their
/// relative order.
pub fn sort_by_recency<P: Borrow<Post>>(posts: &mut [P]) {
    posts.sort_by(|a, b| b.borrow().timestamp.cmp(&a.borrow().timestamp));
}

/// The `n` most recent posts.
pub fn recent(posts: &[Post], n: usize) -> Vec<&Post> {
    let mut posts: Vec<&Post> = posts.iter().collect();
    sort_by_recency(&mut posts);
    posts.truncate(n);
    posts
}

/// Everything shown on the landing page.
pub struct Landing<'a> {
    pub posts: Vec<&'a Post>,
    pub documents: &'a Documents,
    pub proof: &'a str,
    pub projects: &'a [Project],
}

/// Renders aggregate pages into the output root.
pub struct IndexWriter<'a> {
    pub site: &'a SiteContext,
    pub output_directory: &'a Path,
}

impl IndexWriter<'_> {
    fn posts_value(&self, posts: &[&Post]) -> Result<Value> {
        let site_root = &self.site.site_root;
        Ok(Value::Array(
            posts
                .iter()
                .map(|post| post.to_value(site_root))
                .collect::<std::result::Result<Vec<Value>, _>>()?,
        ))
    }

    fn write_page(&self, template: &Template, name: &str, value: Value) -> Result<PathBuf> {
        let path = self.output_directory.join(name);
        let contents = theme::render(template, self.site, value)?;
        write_atomic(&path, &contents).map_err(|err| Error::Io {
            path: path.clone(),
            err,
        })?;
        tracing::debug!(path = %path.display(), "wrote page");
        Ok(path)
    }

    /// Writes `index.html` with the fields `posts`, `documentation`,
    /// `research`, `proof`, and `projects`.
    pub fn write_landing(&self, template: &Template, landing: &Landing) -> Result<PathBuf> {
        let documents = |documents: &[Document]| {
            Value::Array(documents.iter().map(Document::to_value).collect())
        };
        let value = object([
            ("posts", self.posts_value(&landing.posts)?),
            ("documentation", documents(&landing.documents.documentation)),
            ("research", documents(&landing.documents.research)),
            ("proof", Value::String(landing.proof.to_owned())),
            ("projects", projects_value(landing.projects)),
        ]);
        self.write_page(template, LANDING_PAGE, value)
    }

    /// Writes `archive.html` listing every post most recent first in the
    /// field `posts`.
    pub fn write_archive(&self, template: &Template, posts: &[Post]) -> Result<PathBuf> {
        let mut posts: Vec<&Post> = posts.iter().collect();
        sort_by_recency(&mut posts);
        let value = object([("posts", self.posts_value(&posts)?)]);
        self.write_page(template, ARCHIVE_PAGE, value)
    }

    /// Writes `projects.html` listing every snapshot project in the field
    /// `projects`.
    pub fn write_projects(&self, template: &Template, projects: &[Project]) -> Result<PathBuf> {
        let value = object([("projects", projects_value(projects))]);
        self.write_page(template, PROJECTS_PAGE, value)
    }
}

fn projects_value(projects: &[Project]) -> Value {
    Value::Array(projects.iter().map(Project::to_value).collect())
}

/// The result of a fallible aggregate page operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error writing an aggregate page.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] theme::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error("writing `{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markdown::Renderer;
    use url::Url;

    fn post(name: &str, date: &str) -> Post {
        let input = format!(
            "---\ntitle: {name}\ndate: {date}\nauthor: Jane\npermalink: /{name}\n\
             description: about {name}\ntype: standalone\n---\nBody.\n"
        );
        Post::parse(&format!("{}.md", name), &input, &Renderer::new()).unwrap()
    }

    fn template(text: &str) -> Template {
        let mut template = Template::default();
        template.parse(text).unwrap();
        template
    }

    fn titles(posts: &[&Post]) -> Vec<String> {
        posts.iter().map(|p| p.title.clone()).collect()
    }

    #[test]
    fn test_sort_by_recency_is_stable() {
        let posts = vec![
            post("a", "2023-01-01"),
            post("b", "2023-03-01"),
            post("c", "2023-01-01"),
            post("d", "2022-12-31"),
        ];
        let mut sorted: Vec<&Post> = posts.iter().collect();
        sort_by_recency(&mut sorted);
        assert_eq!(vec!["b", "a", "c", "d"], titles(&sorted));
    }

    #[test]
    fn test_recent_is_prefix_of_archive_order() {
        let posts: Vec<Post> = (1..=9)
            .map(|day| post(&format!("p{}", day), &format!("2023-0{}-01", day)))
            .collect();
        let mut all: Vec<&Post> = posts.iter().collect();
        sort_by_recency(&mut all);
        for n in [0, 3, 5, 9, 20] {
            let top = recent(&posts, n);
            assert_eq!(titles(&all[..top.len()]), titles(&top));
            assert_eq!(n.min(posts.len()), top.len());
        }
    }

    #[test]
    fn test_write_landing_and_archive() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let site = SiteContext::new(Url::parse("https://example.org/")?);
        let writer = IndexWriter {
            site: &site,
            output_directory: dir.path(),
        };
        let posts = vec![
            post("old", "2021-01-01"),
            post("new", "2023-01-01"),
            post("mid", "2022-01-01"),
        ];
        let documents = Documents::default();
        let landing = Landing {
            posts: recent(&posts, 2),
            documents: &documents,
            proof: "signed\n",
            projects: &[],
        };

        let landing_template = template("{{range .posts}}{{.title}} {{end}}|{{.proof}}");
        writer.write_landing(&landing_template, &landing)?;
        assert_eq!(
            "new mid |signed\n",
            std::fs::read_to_string(dir.path().join(LANDING_PAGE)).unwrap()
        );

        let archive_template = template("{{range .posts}}<a href=\"{{.url}}\">{{.title}}</a>{{end}}");
        writer.write_archive(&archive_template, &posts)?;
        assert_eq!(
            concat!(
                "<a href=\"https://example.org/posts/new.html\">new</a>",
                "<a href=\"https://example.org/posts/mid.html\">mid</a>",
                "<a href=\"https://example.org/posts/old.html\">old</a>",
            ),
            std::fs::read_to_string(dir.path().join(ARCHIVE_PAGE)).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_write_projects() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let site = SiteContext::new(Url::parse("https://example.org/")?);
        let writer = IndexWriter {
            site: &site,
            output_directory: dir.path(),
        };
        let projects: Vec<Project> = serde_json::from_str(
            r#"[{"name": "tool", "language": "Rust", "licence": null, "url": "https://example.org/tool"}]"#,
        )
        .unwrap();
        writer.write_projects(&template("{{range .projects}}{{.name}}/{{.language}}{{end}}"), &projects)?;
        assert_eq!(
            "tool/Rust",
            std::fs::read_to_string(dir.path().join(PROJECTS_PAGE)).unwrap()
        );
        Ok(())
    }
}
