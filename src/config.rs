//! Loads the project configuration. A project is a directory containing a
//! `pagewright.yaml` project file and a `theme/theme.yaml` theme file; see
//! [`Config::from_directory`].

use crate::util::open;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file searched for by [`Config::from_directory`].
pub const PROJECT_FILE: &str = "pagewright.yaml";

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(5)
    }
}

fn default_posts_directory() -> PathBuf {
    PathBuf::from("_posts")
}

fn default_projects_file() -> PathBuf {
    PathBuf::from("_data/_projects.json")
}

fn default_documents_directory() -> PathBuf {
    PathBuf::from("media/documentation/pdfs")
}

fn default_research_suffix() -> String {
    String::from("_research.pdf")
}

fn default_ownership_proof() -> PathBuf {
    PathBuf::from("keybase.txt")
}

#[derive(Deserialize)]
struct Project {
    pub site_root: Url,

    #[serde(default)]
    pub landing_page_size: PageSize,

    #[serde(default = "default_posts_directory")]
    pub posts_directory: PathBuf,

    #[serde(default = "default_projects_file")]
    pub projects_file: PathBuf,

    pub projects_api: Option<Url>,

    #[serde(default)]
    pub projects_exclude: Vec<String>,

    #[serde(default = "default_documents_directory")]
    pub documents_directory: PathBuf,

    #[serde(default = "default_research_suffix")]
    pub research_suffix: String,

    #[serde(default = "default_ownership_proof")]
    pub ownership_proof: PathBuf,
}

#[derive(Deserialize)]
struct Theme {
    landing_template: Vec<PathBuf>,
    archive_template: Vec<PathBuf>,
    post_template: Vec<PathBuf>,
    category_template: Vec<PathBuf>,
    categories_template: Vec<PathBuf>,
    projects_template: Vec<PathBuf>,
}

/// The template files for each kind of page. Each list is concatenated in
/// order before parsing so shared `{{define}}` blocks can live in their own
/// file.
#[derive(Clone, Debug)]
pub struct ThemeFiles {
    pub landing: Vec<PathBuf>,
    pub archive: Vec<PathBuf>,
    pub post: Vec<PathBuf>,
    pub category: Vec<PathBuf>,
    pub categories: Vec<PathBuf>,
    pub projects: Vec<PathBuf>,
}

/// Fully resolved build configuration. All paths are absolute or relative to
/// the working directory, never to the project file.
#[derive(Clone, Debug)]
pub struct Config {
    /// The directory holding the project file.
    pub project_root: PathBuf,

    /// The public URL of the site. Always ends in `/`.
    pub site_root: Url,

    pub posts_source_directory: PathBuf,

    /// The root of the build output. Everything under it is regenerated by
    /// each build.
    pub output_directory: PathBuf,

    /// Number of posts shown on the landing page.
    pub landing_page_size: usize,

    /// The project snapshot written by the refresher and read by the build.
    pub projects_file: PathBuf,

    /// The repository-listing endpoint queried by the refresher.
    pub projects_api: Option<Url>,

    /// Repositories the refresher leaves out of the snapshot.
    pub projects_exclude: Vec<String>,

    pub documents_directory: PathBuf,

    /// The public URL of [`Config::documents_directory`]. Always ends in `/`.
    pub documents_url: Url,

    /// Document file names ending with this suffix are research papers.
    pub research_suffix: String,

    pub ownership_proof: PathBuf,

    pub theme: ThemeFiles,

    /// Stop at the first failing stage and surface its full error instead
    /// of collecting failures.
    pub debug: bool,
}

impl Config {
    /// Searches `dir` and then each of its ancestors for a project file and
    /// loads the first one found. `output_directory` defaults to `_site`
    /// inside the project root.
    pub fn from_directory(dir: &Path, output_directory: Option<&Path>, debug: bool) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            match Config::from_project_file(&path, output_directory, debug) {
                Ok(config) => Ok(config),
                Err(e) => Err(anyhow!("Loading configuration: {:?}", e)),
            }
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, output_directory, debug),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    pub fn from_project_file(path: &Path, output_directory: Option<&Path>, debug: bool) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)?;
        let project_root = match path.parent() {
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided project file path '{:?}'",
                    path
                ))
            }
            Some(project_root) => project_root.to_owned(),
        };

        let theme_dir = project_root.join("theme");
        let theme: Theme = serde_yaml::from_reader(open(&theme_dir.join("theme.yaml"), "theme")?)?;
        let resolve = |files: Vec<PathBuf>| -> Vec<PathBuf> {
            files.iter().map(|relpath| theme_dir.join(relpath)).collect()
        };

        let output_directory = match output_directory {
            Some(dir) => dir.to_owned(),
            None => project_root.join("_site"),
        };
        check_output_directory(&project_root, &output_directory)?;

        let site_root = with_trailing_slash(project.site_root);
        let documents_url = crate::util::join_path(&site_root, &project.documents_directory)
            .map(with_trailing_slash)?;

        Ok(Config {
            posts_source_directory: project_root.join(project.posts_directory),
            output_directory,
            landing_page_size: project.landing_page_size.0,
            projects_file: project_root.join(project.projects_file),
            projects_api: project.projects_api,
            projects_exclude: project.projects_exclude,
            documents_directory: project_root.join(project.documents_directory),
            documents_url,
            research_suffix: project.research_suffix,
            ownership_proof: project_root.join(project.ownership_proof),
            theme: ThemeFiles {
                landing: resolve(theme.landing_template),
                archive: resolve(theme.archive_template),
                post: resolve(theme.post_template),
                category: resolve(theme.category_template),
                categories: resolve(theme.categories_template),
                projects: resolve(theme.projects_template),
            },
            site_root,
            project_root,
            debug,
        })
    }

    /// The directory holding the canonical post pages.
    pub fn posts_output_directory(&self) -> PathBuf {
        self.output_directory.join("posts")
    }

    /// The directory holding one subdirectory per category.
    pub fn categories_output_directory(&self) -> PathBuf {
        self.posts_output_directory().join("categories")
    }
}

/// Refuses output directories that would take the sources down with them
/// when the output tree is reset: the project root itself or any ancestor.
fn check_output_directory(project_root: &Path, output_directory: &Path) -> Result<()> {
    let root = absolute(project_root)?;
    let output = absolute(output_directory)?;
    if root.starts_with(&output) {
        return Err(anyhow!(
            "Output directory `{}` contains the project root `{}`",
            output_directory.display(),
            project_root.display()
        ));
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(_) => match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                Ok(absolute(parent)?.join(name))
            }
            _ => Ok(std::env::current_dir()?.join(path)),
        },
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn write_project(dir: &Path, project: &str) -> std::io::Result<()> {
        fs::create_dir_all(dir.join("theme"))?;
        fs::write(dir.join(PROJECT_FILE), project)?;
        fs::write(
            dir.join("theme").join("theme.yaml"),
            "landing_template: [base.html, landing.html]\n\
             archive_template: [archive.html]\n\
             post_template: [post.html]\n\
             category_template: [category.html]\n\
             categories_template: [categories.html]\n\
             projects_template: [projects.html]\n",
        )
    }

    #[test]
    fn test_from_directory_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_project(dir.path(), "site_root: https://example.org/blog\n")?;
        let nested = dir.path().join("_posts");
        fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested, None, false)?;
        assert_eq!("https://example.org/blog/", config.site_root.as_str());
        assert_eq!(5, config.landing_page_size);
        assert_eq!(dir.path().join("_site"), config.output_directory);
        assert_eq!(dir.path().join("_posts"), config.posts_source_directory);
        assert_eq!(
            "https://example.org/blog/media/documentation/pdfs/",
            config.documents_url.as_str()
        );
        assert_eq!(
            vec![
                dir.path().join("theme").join("base.html"),
                dir.path().join("theme").join("landing.html"),
            ],
            config.theme.landing
        );
        assert_eq!(
            dir.path().join("_site").join("posts").join("categories"),
            config.categories_output_directory()
        );
        Ok(())
    }

    #[test]
    fn test_rejects_output_containing_project() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_project(dir.path(), "site_root: https://example.org/\n")?;
        let project_file = dir.path().join(PROJECT_FILE);

        assert!(Config::from_project_file(&project_file, Some(dir.path()), false).is_err());
        let parent = dir.path().parent().unwrap();
        assert!(Config::from_project_file(&project_file, Some(parent), false).is_err());
        assert!(Config::from_project_file(&project_file, Some(&dir.path().join("out")), false).is_ok());
        Ok(())
    }
}
