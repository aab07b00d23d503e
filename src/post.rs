//! Defines the [`Post`], [`Loader`], and [`Error`] types, and the logic for
//! loading posts from the file system into memory. See [`Post::to_value`] for
//! how a post is presented to templates.

use crate::category::{self, Category};
use crate::markdown::{self, Renderer};
use crate::util::join_segments;
use chrono::NaiveDate;
use gtmpl::Value;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::read_dir;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The extension of post source files.
pub const MARKDOWN_EXTENSION: &str = "md";

/// The extension of rendered pages.
pub const HTML_EXTENSION: &str = "html";

/// Distinguishes standalone posts from posts belonging to a series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostType {
    Standalone,
    Series { name: String },
}

impl PostType {
    /// The label used in front matter and in templates.
    pub fn label(&self) -> &'static str {
        match self {
            PostType::Standalone => "standalone",
            PostType::Series { .. } => "series",
        }
    }

    pub fn series_name(&self) -> Option<&str> {
        match self {
            PostType::Standalone => None,
            PostType::Series { name } => Some(name),
        }
    }
}

/// One source document, parsed and rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub title: String,
    pub author: String,
    pub date: NaiveDate,

    /// Seconds since the epoch at UTC midnight of [`Post::date`]. Posts are
    /// ordered by this value.
    pub timestamp: i64,

    pub permalink: String,
    pub description: String,
    pub categories: BTreeSet<Category>,
    pub kind: PostType,

    /// The post body rendered to HTML.
    pub body_html: String,

    /// The file name of the rendered page, i.e. the source file name with its
    /// extension swapped for `.html`.
    pub output_name: String,

    /// The file name of the source document.
    pub source_name: String,
}

impl Post {
    /// Parses a post from the contents of the source file `source_name`.
    pub fn parse(source_name: &str, input: &str, renderer: &Renderer) -> Result<Post> {
        let (yaml_start, yaml_stop, body_start) = frontmatter_indices(input)?;
        let frontmatter: Frontmatter = serde_yaml::from_str(&input[yaml_start..yaml_stop])?;

        let date = required(frontmatter.date, "date")?;
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|err| Error::InvalidDate { date, err })?;
        let timestamp = date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc().timestamp())
            .unwrap_or_default();

        let kind = match required(frontmatter.kind, "type")? {
            FrontmatterType::Standalone => PostType::Standalone,
            FrontmatterType::Series => PostType::Series {
                name: required(frontmatter.series_name, "series_name")?,
            },
        };

        let categories = frontmatter
            .categories
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .iter()
            .map(|label| Category::normalize(label))
            .collect::<category::Result<BTreeSet<Category>>>()?;

        let mut body_html = String::new();
        renderer.to_html(&mut body_html, &input[body_start..])?;

        Ok(Post {
            title: required(frontmatter.title, "title")?,
            author: required(frontmatter.author, "author")?,
            permalink: required(frontmatter.permalink, "permalink")?,
            description: required(frontmatter.description, "description")?,
            date,
            timestamp,
            categories,
            kind,
            body_html,
            output_name: output_name(source_name),
            source_name: source_name.to_owned(),
        })
    }

    /// The URL of the post's canonical page.
    pub fn url(&self, site_root: &Url) -> std::result::Result<Url, url::ParseError> {
        join_segments(site_root, ["posts", self.output_name.as_str()])
    }

    /// Converts the post into a template value. The fields are `title`,
    /// `body`, `date`, `author`, `permalink`, `description`, `categories`
    /// (objects with `name` and `url`), `type`, `series_name` (nil for
    /// standalone posts), `source`, and `url`.
    pub fn to_value(&self, site_root: &Url) -> std::result::Result<Value, url::ParseError> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(self.title.clone()));
        m.insert("body".to_owned(), Value::String(self.body_html.clone()));
        m.insert("date".to_owned(), Value::String(self.date.format("%Y-%m-%d").to_string()));
        m.insert("author".to_owned(), Value::String(self.author.clone()));
        m.insert("permalink".to_owned(), Value::String(self.permalink.clone()));
        m.insert("description".to_owned(), Value::String(self.description.clone()));
        m.insert(
            "categories".to_owned(),
            Value::Array(
                self.categories
                    .iter()
                    .map(|c| c.to_value(site_root))
                    .collect::<std::result::Result<Vec<Value>, _>>()?,
            ),
        );
        m.insert("type".to_owned(), Value::String(self.kind.label().to_owned()));
        m.insert(
            "series_name".to_owned(),
            match self.kind.series_name() {
                Some(name) => Value::String(name.to_owned()),
                None => Value::Nil,
            },
        );
        m.insert("source".to_owned(), Value::String(self.source_name.clone()));
        m.insert("url".to_owned(), Value::String(self.url(site_root)?.to_string()));
        Ok(Value::Object(m))
    }
}

fn output_name(source_name: &str) -> String {
    Path::new(source_name)
        .with_extension(HTML_EXTENSION)
        .to_string_lossy()
        .into_owned()
}

fn required<T>(value: Option<T>, key: &'static str) -> Result<T> {
    value.ok_or(Error::MissingMetadata { key })
}

fn frontmatter_indices(input: &str) -> Result<(usize, usize, usize)> {
    const FENCE: &str = "---";
    if !input.starts_with(FENCE) {
        return Err(Error::FrontmatterMissingStartFence);
    }
    match input[FENCE.len()..].find("\n---") {
        None => Err(Error::FrontmatterMissingEndFence),
        Some(offset) => {
            let yaml_stop = FENCE.len() + offset + 1;
            Ok((
                FENCE.len(),             // yaml_start
                yaml_stop,               // yaml_stop
                yaml_stop + FENCE.len(), // body_start
            ))
        }
    }
}

/// The posts found by [`Loader::load`] alongside the documents that couldn't
/// be parsed. One bad document doesn't keep the others from loading.
#[derive(Debug, Default)]
pub struct Loaded {
    /// Valid posts, in source file name order.
    pub posts: Vec<Post>,

    /// One annotated error per malformed document.
    pub failures: Vec<Error>,
}

/// Loads [`Post`]s from a directory of source files.
pub struct Loader {
    renderer: Renderer,
}

impl Default for Loader {
    fn default() -> Self {
        Loader::new()
    }
}

impl Loader {
    pub fn new() -> Loader {
        Loader {
            renderer: Renderer::new(),
        }
    }

    /// Reads and parses the source file `path`. Errors are annotated with the
    /// file name.
    pub fn load_post(&self, path: &Path) -> Result<Post> {
        let annotate = |e: Error| Error::Annotated(format!("parsing post `{}`", path.display()), Box::new(e));
        let source_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| annotate(Error::InvalidFileName(path.to_owned())))?;
        let contents = std::fs::read_to_string(path).map_err(|e| annotate(Error::Io(e)))?;
        Post::parse(source_name, &contents, &self.renderer).map_err(annotate)
    }

    /// Loads every post file (extension `.md`) directly inside
    /// `source_directory`. Each post file must be structured as follows:
    ///
    /// 1. Initial frontmatter fence (`---`)
    /// 2. YAML frontmatter with fields `title`, `date`, `author`,
    ///    `permalink`, `description`, `type`, optionally `categories`, and
    ///    `series_name` when `type` is `series`
    /// 3. Terminal frontmatter fence (`---`)
    /// 4. Post body
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// title: Hello, world!
    /// date: 2021-04-16
    /// author: Jane
    /// permalink: /hello
    /// description: A greeting
    /// type: standalone
    /// categories: [greetings]
    /// ---
    /// # Hello
    ///
    /// World
    /// ```
    ///
    /// Files are visited in file name order. Failing to list the directory
    /// is an error; failing to parse a single document is recorded in
    /// [`Loaded::failures`].
    pub fn load(&self, source_directory: &Path) -> Result<Loaded> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for result in read_dir(source_directory)? {
            let entry = result?;
            let path = entry.path();
            if entry.file_type()?.is_file()
                && path.extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION)
            {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = Loaded::default();
        for path in paths {
            match self.load_post(&path) {
                Ok(post) => {
                    tracing::debug!(source = %post.source_name, "loaded post");
                    loaded.posts.push(post);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed post");
                    loaded.failures.push(e);
                }
            }
        }
        Ok(loaded)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum FrontmatterType {
    Standalone,
    Series,
}

#[derive(Deserialize)]
struct Frontmatter {
    title: Option<String>,
    date: Option<String>,
    author: Option<String>,
    permalink: Option<String>,
    description: Option<String>,
    categories: Option<OneOrMany>,

    #[serde(rename = "type")]
    kind: Option<FrontmatterType>,

    series_name: Option<String>,
}

/// Represents the result of a [`Post`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Post`] object.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a required front matter key is absent.
    #[error("missing required metadata `{key}`")]
    MissingMetadata { key: &'static str },

    /// Returned when the `date` key isn't a `YYYY-MM-DD` date.
    #[error("invalid date `{date}`: {err}")]
    InvalidDate {
        date: String,
        #[source]
        err: chrono::ParseError,
    },

    /// Returned when a post source file is missing its starting frontmatter
    /// fence (`---`).
    #[error("Post must begin with `---`")]
    FrontmatterMissingStartFence,

    /// Returned when a post source file is missing its terminal frontmatter
    /// fence (`---` i.e., the starting fence was found but the ending one was
    /// missing).
    #[error("Missing closing `---`")]
    FrontmatterMissingEndFence,

    /// Returned when there was an error parsing the frontmatter as YAML.
    #[error(transparent)]
    DeserializeYaml(#[from] serde_yaml::Error),

    /// Returned when a category label can't be normalized.
    #[error(transparent)]
    Category(#[from] category::Error),

    /// Returned when the body can't be rendered.
    #[error(transparent)]
    Markdown(#[from] markdown::Error),

    /// Returned when a source file name isn't valid UTF-8.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(PathBuf),

    /// Returned for other I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An error with an annotation.
    #[error("{0}: {1}")]
    Annotated(String, #[source] Box<Error>),
}

impl Error {
    /// Strips annotations, returning the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Annotated(_, err) => err.root(),
            err => err,
        }
    }
}
