use crate::category::{self, existing_categories, Category, LIST_PAGE};
use crate::index::sort_by_recency;
use crate::post::{Post, HTML_EXTENSION};
use crate::theme::{self, object, SiteContext};
use crate::util::write_atomic;
use gtmpl::{Template, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The categories index page, written to the output root.
pub const CATEGORIES_PAGE: &str = "categories.html";

/// Responsible for templating and writing post pages, their per-category
/// copies, the category listing pages, and the categories index.
pub struct Writer<'a> {
    /// The template for post pages (canonical and copies alike).
    pub post_template: &'a Template,

    /// The template for the `list.html` page in each category directory.
    pub category_template: &'a Template,

    /// The template for the categories index.
    pub categories_template: &'a Template,

    pub site: &'a SiteContext,

    /// The root of the build output; the categories index lands here.
    pub output_directory: &'a Path,

    /// The directory receiving the canonical post pages, i.e.
    /// `{output_directory}/posts`.
    pub posts_output_directory: &'a Path,

    /// The directory holding one subdirectory per category, i.e.
    /// `{posts_output_directory}/categories`. The subdirectories must already
    /// exist when posts are written (see [`category::reconcile`]).
    pub categories_output_directory: &'a Path,
}

/// A category as listed on the categories index.
#[derive(Clone, Debug, PartialEq)]
pub struct CategorySummary {
    pub name: String,

    /// The number of post pages in the category's directory, not counting
    /// its listing page.
    pub count: usize,

    pub url: Url,
}

impl CategorySummary {
    fn to_value(&self) -> Value {
        object([
            ("name", Value::String(self.name.clone())),
            ("count", Value::from(self.count as i64)),
            ("url", Value::String(self.url.to_string())),
        ])
    }
}

impl Writer<'_> {
    /// Takes a template and a value, renders the page, and writes it to
    /// `file_path` atomically.
    fn write_page(&self, template: &Template, file_path: &Path, value: Value) -> Result<()> {
        let contents = theme::render(template, self.site, value)?;
        write_atomic(file_path, &contents).map_err(|err| Error::io(file_path, err))
    }

    /// Writes the canonical page for `post` and one copy into the directory
    /// of each of its categories. A missing category directory is an error
    /// for this post; it is never created here.
    pub fn write_post(&self, post: &Post) -> Result<()> {
        let dirs: Vec<PathBuf> = post
            .categories
            .iter()
            .map(|category| {
                let dir = self.categories_output_directory.join(category.name());
                match dir.is_dir() {
                    true => Ok(dir),
                    false => Err(Error::MissingCategoryDirectory {
                        post: post.source_name.clone(),
                        category: category.clone(),
                    }),
                }
            })
            .collect::<Result<_>>()?;

        let rendered = theme::render(self.post_template, self.site, post.to_value(&self.site.site_root)?)?;
        let canonical = self.posts_output_directory.join(&post.output_name);
        write_atomic(&canonical, &rendered).map_err(|err| Error::io(&canonical, err))?;
        for dir in &dirs {
            let copy = dir.join(&post.output_name);
            write_atomic(&copy, &rendered).map_err(|err| Error::io(&copy, err))?;
        }
        tracing::debug!(post = %post.output_name, copies = dirs.len(), "wrote post");
        Ok(())
    }

    /// Writes every post, attempting all of them before reporting those that
    /// failed.
    pub fn write_posts(&self, posts: &[Post]) -> Result<()> {
        std::fs::create_dir_all(self.posts_output_directory)
            .map_err(|err| Error::io(self.posts_output_directory, err))?;
        let failures: Vec<Error> = posts
            .iter()
            .filter_map(|post| self.write_post(post).err())
            .collect();
        match failures.is_empty() {
            true => Ok(()),
            false => Err(Error::Posts(failures)),
        }
    }

    /// Writes `list.html` into every category directory present on disk,
    /// listing the posts of that category most recent first. A directory
    /// without matching posts still gets an empty listing. Returns one
    /// summary per category directory, sorted by name.
    pub fn write_category_lists(&self, posts: &[Post]) -> Result<Vec<CategorySummary>> {
        let mut summaries = Vec::new();
        for name in existing_categories(self.categories_output_directory)? {
            let dir = self.categories_output_directory.join(&name);
            let mut members: Vec<&Post> = posts
                .iter()
                .filter(|post| post.categories.iter().any(|c| c.name() == name))
                .collect();
            sort_by_recency(&mut members);

            let site_root = &self.site.site_root;
            let category = Category::normalize(&name)?;
            let value = object([
                ("category", category.to_value(site_root)?),
                (
                    "posts",
                    Value::Array(
                        members
                            .iter()
                            .map(|post| post.to_value(site_root))
                            .collect::<std::result::Result<Vec<Value>, _>>()?,
                    ),
                ),
            ]);
            self.write_page(self.category_template, &dir.join(LIST_PAGE), value)?;

            summaries.push(CategorySummary {
                count: count_members(&dir)?,
                url: category.url(site_root)?,
                name,
            });
        }
        Ok(summaries)
    }

    /// Writes the categories index listing each category with its member
    /// count.
    pub fn write_categories_index(&self, summaries: &[CategorySummary]) -> Result<()> {
        let value = object([(
            "categories",
            Value::Array(summaries.iter().map(CategorySummary::to_value).collect()),
        )]);
        self.write_page(
            self.categories_template,
            &self.output_directory.join(CATEGORIES_PAGE),
            value,
        )
    }
}

/// Removes the canonical post pages in `dir` that don't belong to `posts`.
/// A missing `dir` has nothing to prune.
pub fn prune_stale_pages(dir: &Path, posts: &[Post]) -> Result<()> {
    let current: BTreeSet<&str> = posts.iter().map(|p| p.output_name.as_str()).collect();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Error::io(dir, err)),
    };
    for result in entries {
        let entry = result.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        let is_page = path.extension().map_or(false, |ext| ext == HTML_EXTENSION);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_page && path.is_file() && !current.contains(name.as_str()) {
            tracing::debug!(path = %path.display(), "removing stale post page");
            std::fs::remove_file(&path).map_err(|err| Error::io(&path, err))?;
        }
    }
    Ok(())
}

/// Counts the files in a category directory other than its listing page.
fn count_members(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for result in std::fs::read_dir(dir).map_err(|err| Error::io(dir, err))? {
        let entry = result.map_err(|err| Error::io(dir, err))?;
        if entry.file_name() != LIST_PAGE && entry.path().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn summarize(failures: &[Error]) -> String {
    let mut out = format!("{} post(s) could not be written", failures.len());
    for failure in failures {
        let _ = write!(out, "; {}", failure);
    }
    out
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a post belongs to a category whose directory doesn't
    /// exist.
    #[error("post `{post}`: category directory for `{category}` doesn't exist")]
    MissingCategoryDirectory { post: String, category: Category },

    /// Returned when one or more posts in a batch failed.
    #[error("{}", summarize(.0))]
    Posts(Vec<Error>),

    /// An error during templating.
    #[error(transparent)]
    Template(#[from] theme::Error),

    /// An error with a category directory.
    #[error(transparent)]
    Category(#[from] category::Error),

    /// Returned when a page URL can't be built.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// An error writing the output files.
    #[error("writing `{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

impl Error {
    fn io(path: impl AsRef<Path>, err: io::Error) -> Error {
        Error::Io {
            path: path.as_ref().to_owned(),
            err,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markdown::Renderer;

    fn template(text: &str) -> Template {
        let mut template = Template::default();
        template.parse(text).unwrap();
        template
    }

    fn post(name: &str, date: &str, categories: &str) -> Post {
        let input = format!(
            "---\ntitle: {name}\ndate: {date}\nauthor: Jane\npermalink: /{name}\n\
             description: about {name}\ntype: standalone\ncategories: {categories}\n---\nBody of {name}.\n"
        );
        Post::parse(&format!("{}.md", name), &input, &Renderer::new()).unwrap()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        post_template: Template,
        category_template: Template,
        categories_template: Template,
        site: SiteContext,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                dir: tempfile::tempdir().unwrap(),
                post_template: template("<h1>{{.title}}</h1>{{.body}}"),
                category_template: template("{{.category.name}}:{{range .posts}} {{.title}}{{end}}"),
                categories_template: template("{{range .categories}}{{.name}}={{.count}} {{end}}"),
                site: SiteContext::new(Url::parse("https://example.org/").unwrap()),
            }
        }

        fn posts_dir(&self) -> PathBuf {
            self.dir.path().join("posts")
        }

        fn categories_dir(&self) -> PathBuf {
            self.posts_dir().join("categories")
        }

        fn run<T>(&self, f: impl FnOnce(&Writer) -> T) -> T {
            let posts_dir = self.posts_dir();
            let categories_dir = self.categories_dir();
            let writer = Writer {
                post_template: &self.post_template,
                category_template: &self.category_template,
                categories_template: &self.categories_template,
                site: &self.site,
                output_directory: self.dir.path(),
                posts_output_directory: &posts_dir,
                categories_output_directory: &categories_dir,
            };
            f(&writer)
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_write_posts_and_copies() -> Result<()> {
        let fixture = Fixture::new();
        let posts = vec![post("first", "2023-01-01", "[Go]")];
        category::reconcile(&fixture.categories_dir(), &posts)?;
        fixture.run(|w| w.write_posts(&posts))?;

        let canonical = read(&fixture.posts_dir().join("first.html"));
        assert!(canonical.contains("<h1>first</h1>"));
        assert!(canonical.contains("<p>Body of first.</p>"));
        assert_eq!(canonical, read(&fixture.categories_dir().join("go").join("first.html")));
        Ok(())
    }

    #[test]
    fn test_missing_category_directory_fails_that_post_only() -> Result<()> {
        let fixture = Fixture::new();
        let posts = vec![post("lonely", "2023-01-01", "[Go]"), post("plain", "2023-01-02", "[]")];
        match fixture.run(|w| w.write_posts(&posts)) {
            Err(Error::Posts(failures)) => {
                assert_eq!(1, failures.len());
                assert!(matches!(failures[0], Error::MissingCategoryDirectory { .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(fixture.posts_dir().join("plain.html").exists());
        assert!(!fixture.posts_dir().join("lonely.html").exists());
        assert!(!fixture.categories_dir().join("go").exists());
        Ok(())
    }

    #[test]
    fn test_category_lists_and_index() -> Result<()> {
        let fixture = Fixture::new();
        let posts = vec![
            post("january", "2023-01-01", "[Go]"),
            post("june", "2023-06-01", "[go, Tooling]"),
        ];
        category::reconcile(&fixture.categories_dir(), &posts)?;
        std::fs::create_dir_all(fixture.categories_dir().join("empty")).unwrap();

        let summaries = fixture.run(|w| -> Result<Vec<CategorySummary>> {
            w.write_posts(&posts)?;
            let summaries = w.write_category_lists(&posts)?;
            w.write_categories_index(&summaries)?;
            Ok(summaries)
        })?;

        assert_eq!(
            vec![("empty", 0), ("go", 2), ("tooling", 1)],
            summaries
                .iter()
                .map(|s| (s.name.as_str(), s.count))
                .collect::<Vec<_>>()
        );
        assert_eq!(
            "https://example.org/posts/categories/go/list.html",
            summaries[1].url.as_str()
        );
        assert_eq!("go: june january", read(&fixture.categories_dir().join("go").join(LIST_PAGE)));
        assert_eq!("empty:", read(&fixture.categories_dir().join("empty").join(LIST_PAGE)));
        assert_eq!(
            "empty=0 go=2 tooling=1 ",
            read(&fixture.dir.path().join(CATEGORIES_PAGE))
        );
        Ok(())
    }

    #[test]
    fn test_prune_stale_pages() -> Result<()> {
        let fixture = Fixture::new();
        std::fs::create_dir_all(fixture.posts_dir()).unwrap();
        std::fs::write(fixture.posts_dir().join("deleted.html"), "old").unwrap();
        std::fs::write(fixture.posts_dir().join("style.css"), "keep").unwrap();
        let posts = vec![post("kept", "2023-01-01", "[]")];

        prune_stale_pages(&fixture.posts_dir(), &posts)?;
        fixture.run(|w| w.write_posts(&posts))?;
        assert!(fixture.posts_dir().join("kept.html").exists());
        assert!(fixture.posts_dir().join("style.css").exists());
        assert!(!fixture.posts_dir().join("deleted.html").exists());
        Ok(())
    }

    #[test]
    fn test_prune_missing_directory() -> Result<()> {
        let fixture = Fixture::new();
        prune_stale_pages(&fixture.posts_dir(), &[])?;
        assert!(!fixture.posts_dir().exists());
        Ok(())
    }
}
