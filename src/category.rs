//! Defines the [`Category`] type and the logic that keeps the on-disk category
//! directories in step with the categories referenced by the current posts.
//!
//! Computing the wanted directories ([`desired_categories`],
//! [`CategoryPlan::new`]) is kept apart from touching the filesystem
//! ([`CategoryPlan::apply`]) so the reconciliation can be checked without one.

use crate::post::Post;
use crate::util::{join_segments, rmdir};
use gtmpl::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The name of the listing page written into every category directory.
pub const LIST_PAGE: &str = "list.html";

/// A normalized category label. Two labels that normalize to the same string
/// (e.g., `Go Tooling` and `go-tooling`) are the same category.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category(String);

impl Category {
    /// Lowercases `label`, converts spaces to hyphens, and re-joins the
    /// non-empty hyphen-separated segments. Normalizing an already-normalized
    /// label returns it unchanged.
    ///
    /// The result names a directory in the output tree, so labels that
    /// normalize to nothing, to `.` or `..`, or to something containing a path
    /// separator are rejected.
    pub fn normalize(label: &str) -> Result<Category> {
        let name = label
            .to_lowercase()
            .replace(' ', "-")
            .split('-')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::InvalidCategory(label.to_owned()));
        }
        Ok(Category(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The URL of the category's listing page.
    pub fn url(&self, site_root: &Url) -> std::result::Result<Url, url::ParseError> {
        join_segments(site_root, ["posts", "categories", self.0.as_str(), LIST_PAGE])
    }

    /// Converts the category into a template value with `name` and `url`
    /// fields.
    pub fn to_value(&self, site_root: &Url) -> std::result::Result<Value, url::ParseError> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), Value::String(self.0.clone()));
        m.insert("url".to_owned(), Value::String(self.url(site_root)?.to_string()));
        Ok(Value::Object(m))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects every category referenced by at least one post.
pub fn desired_categories(posts: &[Post]) -> BTreeSet<Category> {
    posts
        .iter()
        .flat_map(|post| post.categories.iter().cloned())
        .collect()
}

/// Lists the category directories currently present under `dir`. A missing
/// `dir` has no categories.
pub fn existing_categories(dir: &Path) -> Result<BTreeSet<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        if entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_dir() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// The directory operations that bring a categories directory in line with
/// the current posts. Every existing directory is removed (current ones are
/// reset, stale ones dropped) before one empty directory per wanted category
/// is created.
#[derive(Debug, PartialEq)]
pub struct CategoryPlan {
    /// Directory names to delete recursively.
    pub remove: Vec<String>,

    /// Categories to create empty directories for.
    pub create: Vec<Category>,
}

impl CategoryPlan {
    pub fn new(desired: &BTreeSet<Category>, existing: &BTreeSet<String>) -> CategoryPlan {
        CategoryPlan {
            remove: existing.iter().cloned().collect(),
            create: desired.iter().cloned().collect(),
        }
    }

    /// Executes the plan against `dir`. All removals complete before the
    /// first directory is created.
    pub fn apply(&self, dir: &Path) -> Result<()> {
        for name in &self.remove {
            let path = dir.join(name);
            tracing::debug!(path = %path.display(), "resetting category directory");
            rmdir(&path).map_err(|e| Error::io(&path, e))?;
        }
        for category in &self.create {
            let path = dir.join(category.name());
            std::fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }
}

/// Reconciles the categories directory `dir` with the categories of `posts`
/// and returns the categories that now have a directory.
pub fn reconcile(dir: &Path, posts: &[Post]) -> Result<BTreeSet<Category>> {
    let desired = desired_categories(posts);
    let plan = CategoryPlan::new(&desired, &existing_categories(dir)?);
    plan.apply(dir)?;
    tracing::info!(
        removed = plan.remove.len(),
        created = plan.create.len(),
        "reconciled category directories"
    );
    Ok(desired)
}

/// The result of a fallible category operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error normalizing categories or managing their directories.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a label can't be used as a category directory name.
    #[error("invalid category `{0}`")]
    InvalidCategory(String),

    /// Returned when a category directory can't be listed, removed, or
    /// created.
    #[error("category directory `{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

impl Error {
    fn io(path: impl AsRef<Path>, err: std::io::Error) -> Error {
        Error::Io {
            path: path.as_ref().to_owned(),
            err,
        }
    }
}
