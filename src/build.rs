//! Exports the [`build_site`] function which stitches together the high-level
//! stages of building the output static site: loading the posts
//! ([`crate::post`]), writing post and category pages ([`crate::write`]),
//! writing the landing, archive, and projects pages ([`crate::index`]), and
//! finally generating the sitemap ([`crate::sitemap`]).
//!
//! Stages run in that order and are isolated from one another: a failing
//! stage is recorded in the [`BuildReport`] and the remaining stages still
//! run, unless [`Config::debug`] asks for the first failure instead.

use crate::category;
use crate::config::Config;
use crate::documents;
use crate::index::{self, recent, IndexWriter, Landing, ARCHIVE_PAGE, LANDING_PAGE, PROJECTS_PAGE};
use crate::post::{self, Loader, Post};
use crate::projects;
use crate::sitemap;
use crate::theme::{self, parse_template, SiteContext};
use crate::write::{self, Writer, CATEGORIES_PAGE};
use chrono::NaiveDate;
use gtmpl::Template;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The independently attempted steps of a build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Post pages, category copies and listings, and the categories index.
    Posts,

    /// The landing page.
    Index,

    Archive,

    /// The projects page.
    Projects,

    Sitemap,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Posts => "posts",
            Stage::Index => "index",
            Stage::Archive => "archive",
            Stage::Projects => "projects page",
            Stage::Sitemap => "sitemap",
        })
    }
}

/// A stage that failed and why.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: Error,
}

/// The outcome of every stage of one build, in execution order.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub succeeded: Vec<Stage>,
    pub failed: Vec<StageFailure>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.failed.iter().map(|failure| failure.stage).collect()
    }

    fn record(&mut self, stage: Stage, result: Result<()>, fail_fast: bool) -> Result<()> {
        match result {
            Ok(()) => {
                tracing::info!(%stage, "generated");
                self.succeeded.push(stage);
                Ok(())
            }
            Err(error) if fail_fast => Err(Error::Stage {
                stage,
                source: Box::new(error),
            }),
            Err(error) => {
                tracing::warn!(%stage, %error, "stage failed");
                self.failed.push(StageFailure { stage, error });
                Ok(())
            }
        }
    }
}

/// Builds the site from a [`Config`] object, dating the sitemap with today's
/// local date. See [`build_site_on`].
pub fn build_site(config: &Config) -> Result<BuildReport> {
    build_site_on(config, chrono::Local::now().date_naive())
}

/// Builds the site from a [`Config`] object, using `build_date` as the
/// sitemap's last-modified date. Stage failures end up in the returned
/// [`BuildReport`]; an `Err` means the output directory is unusable or, in
/// debug mode, carries the first stage failure.
pub fn build_site_on(config: &Config, build_date: NaiveDate) -> Result<BuildReport> {
    let output = &config.output_directory;
    std::fs::create_dir_all(output).map_err(|err| Error::io(output, err))?;

    let site = SiteContext::new(config.site_root.clone());
    let builder = Builder {
        config,
        site: &site,
    };
    let fail_fast = config.debug;
    let mut report = BuildReport::default();

    let (posts, result) = builder.posts();
    report.record(Stage::Posts, result, fail_fast)?;
    report.record(Stage::Index, builder.landing(&posts), fail_fast)?;
    report.record(Stage::Archive, builder.archive(&posts), fail_fast)?;
    report.record(Stage::Projects, builder.projects(), fail_fast)?;

    // last, so the walk sees every page written above
    let sitemap = sitemap::write_sitemap(&config.site_root, output, build_date)
        .map(|_| ())
        .map_err(Error::from);
    report.record(Stage::Sitemap, sitemap, fail_fast)?;

    Ok(report)
}

struct Builder<'a> {
    config: &'a Config,
    site: &'a SiteContext,
}

impl Builder<'_> {
    fn index_writer(&self) -> IndexWriter<'_> {
        IndexWriter {
            site: self.site,
            output_directory: &self.config.output_directory,
        }
    }

    /// Loads the posts and writes their pages. The valid posts are returned
    /// even when some documents were malformed so later stages can use them.
    fn posts(&self) -> (Vec<Post>, Result<()>) {
        let (posts, mut failures) = match Loader::new().load(&self.config.posts_source_directory) {
            Ok(loaded) => {
                tracing::info!(
                    posts = loaded.posts.len(),
                    malformed = loaded.failures.len(),
                    "loaded posts"
                );
                let failures: Vec<Error> = loaded.failures.into_iter().map(Error::from).collect();
                (loaded.posts, failures)
            }
            Err(err) => (Vec::new(), vec![Error::from(err)]),
        };
        if let Err(err) = self.write_posts(&posts) {
            failures.push(err);
        }
        (posts, collect(failures))
    }

    /// Resets the post and category pages of the previous build, then writes
    /// this build's. Nothing from the previous build survives a failure to
    /// load the templates.
    fn write_posts(&self, posts: &[Post]) -> Result<()> {
        self.remove_page(CATEGORIES_PAGE)?;
        let templates = self.post_templates();
        let current: &[Post] = if templates.is_ok() { posts } else { &[] };

        let posts_output_directory = self.config.posts_output_directory();
        let categories_output_directory = self.config.categories_output_directory();
        write::prune_stale_pages(&posts_output_directory, current)?;
        category::reconcile(&categories_output_directory, current)?;
        let (post_template, category_template, categories_template) = templates?;

        let writer = Writer {
            post_template: &post_template,
            category_template: &category_template,
            categories_template: &categories_template,
            site: self.site,
            output_directory: &self.config.output_directory,
            posts_output_directory: &posts_output_directory,
            categories_output_directory: &categories_output_directory,
        };
        let written = writer.write_posts(posts);
        let summaries = writer.write_category_lists(posts)?;
        writer.write_categories_index(&summaries)?;
        Ok(written?)
    }

    /// The post, category listing, and categories index templates.
    fn post_templates(&self) -> Result<(Template, Template, Template)> {
        let theme = &self.config.theme;
        Ok((
            parse_template(&theme.post)?,
            parse_template(&theme.category)?,
            parse_template(&theme.categories)?,
        ))
    }

    fn landing(&self, posts: &[Post]) -> Result<()> {
        let config = self.config;
        self.remove_page(LANDING_PAGE)?;
        let template = parse_template(&config.theme.landing)?;
        let projects = projects::load(&config.projects_file)?;
        let documents = documents::load(
            &config.documents_directory,
            &config.research_suffix,
            &config.documents_url,
        )?;
        let proof = documents::load_proof(&config.ownership_proof)?;
        let landing = Landing {
            posts: recent(posts, config.landing_page_size),
            documents: &documents,
            proof: &proof,
            projects: &projects,
        };
        self.index_writer().write_landing(&template, &landing)?;
        Ok(())
    }

    fn archive(&self, posts: &[Post]) -> Result<()> {
        self.remove_page(ARCHIVE_PAGE)?;
        let template = parse_template(&self.config.theme.archive)?;
        self.index_writer().write_archive(&template, posts)?;
        Ok(())
    }

    fn projects(&self) -> Result<()> {
        self.remove_page(PROJECTS_PAGE)?;
        let template = parse_template(&self.config.theme.projects)?;
        let projects = projects::load(&self.config.projects_file)?;
        self.index_writer().write_projects(&template, &projects)?;
        Ok(())
    }

    /// Removes an aggregate page from a previous build so a failing stage
    /// never leaves a stale copy behind.
    fn remove_page(&self, name: &str) -> Result<()> {
        let path = self.config.output_directory.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(&path, err)),
        }
    }
}

fn collect(mut failures: Vec<Error>) -> Result<()> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(Error::Many(failures)),
    }
}

fn summarize(failures: &[Error]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The result of a fallible build operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Each variant wraps the error of the
/// module doing the work.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for errors loading posts.
    #[error(transparent)]
    Post(#[from] post::Error),

    /// Returned for errors resetting category directories.
    #[error(transparent)]
    Category(#[from] category::Error),

    /// Returned for errors writing post and category pages.
    #[error(transparent)]
    Write(#[from] write::Error),

    /// Returned for errors loading templates.
    #[error(transparent)]
    Template(#[from] theme::Error),

    #[error(transparent)]
    Documents(#[from] documents::Error),

    /// Returned when the project snapshot is missing or malformed.
    #[error(transparent)]
    Projects(#[from] projects::Error),

    #[error(transparent)]
    Index(#[from] index::Error),

    #[error(transparent)]
    Sitemap(#[from] sitemap::Error),

    /// Returned when a stage fails for more than one reason.
    #[error("{}", summarize(.0))]
    Many(Vec<Error>),

    /// The first failing stage of a debug build.
    #[error("Unable to generate {stage}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    /// Returned for other I/O errors on the output directory.
    #[error("`{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

impl Error {
    fn io(path: &Path, err: std::io::Error) -> Error {
        Error::Io {
            path: path.to_owned(),
            err,
        }
    }
}
