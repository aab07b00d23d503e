//! The project snapshot: a local JSON copy of the owner's public repositories.
//! [`refresh`] fetches it from the repository-listing API and runs in its own
//! invocation; builds only ever [`load`] whatever snapshot is on disk.

use crate::theme::object;
use crate::util::write_atomic;
use gtmpl::Value;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// A repository's license as reported by the API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Licence {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub spdx_id: Option<String>,
}

/// One repository in the snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub language: Option<String>,
    pub licence: Option<Licence>,
    pub url: String,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub default_branch: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub html_url: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub topics: Vec<String>,

    /// A link to a zip archive of the default branch.
    #[serde(default)]
    pub zipped_repo: Option<String>,
}

impl Project {
    pub fn to_value(&self) -> Value {
        let optional = |s: &Option<String>| match s {
            Some(s) => Value::String(s.clone()),
            None => Value::Nil,
        };
        object([
            ("name", Value::String(self.name.clone())),
            ("language", optional(&self.language)),
            (
                "licence",
                optional(&self.licence.as_ref().and_then(|l| l.name.clone())),
            ),
            ("url", Value::String(self.url.clone())),
            ("owner", optional(&self.owner)),
            ("default_branch", optional(&self.default_branch)),
            ("description", optional(&self.description)),
            ("html_url", optional(&self.html_url)),
            (
                "size",
                match self.size {
                    Some(size) => Value::from(size as i64),
                    None => Value::Nil,
                },
            ),
            (
                "topics",
                Value::Array(self.topics.iter().map(|t| Value::String(t.clone())).collect()),
            ),
            ("zipped_repo", optional(&self.zipped_repo)),
        ])
    }
}

/// The snapshot as stored on disk.
pub type ProjectSnapshot = Vec<Project>;

/// Reads the snapshot at `path`. A missing file and a file that isn't a
/// valid snapshot are distinct errors.
pub fn load(path: &Path) -> Result<ProjectSnapshot> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::Missing(path.to_owned()))
        }
        Err(err) => {
            return Err(Error::Io {
                path: path.to_owned(),
                err,
            })
        }
    };
    serde_json::from_str(&contents).map_err(|err| Error::Malformed {
        path: path.to_owned(),
        err,
    })
}

#[derive(Deserialize)]
struct RemoteOwner {
    login: String,
}

/// A repository as returned by the listing API. Only the fields kept in the
/// snapshot are decoded.
#[derive(Deserialize)]
struct RemoteRepo {
    name: String,
    language: Option<String>,
    license: Option<Licence>,
    url: String,
    default_branch: Option<String>,
    description: Option<String>,
    html_url: Option<String>,
    owner: Option<RemoteOwner>,
    size: Option<u64>,
    #[serde(default)]
    topics: Vec<String>,
}

/// Converts API records into snapshot records, leaving out the repositories
/// named in `exclude`.
fn to_snapshot(repos: Vec<RemoteRepo>, exclude: &[String]) -> ProjectSnapshot {
    repos
        .into_iter()
        .filter(|repo| !exclude.contains(&repo.name))
        .map(|repo| {
            let owner = repo.owner.map(|owner| owner.login);
            let zipped_repo = match (&owner, &repo.default_branch) {
                (Some(owner), Some(branch)) => Some(format!(
                    "https://github.com/{}/{}/archive/refs/heads/{}.zip",
                    owner, repo.name, branch
                )),
                _ => None,
            };
            Project {
                name: repo.name,
                language: repo.language,
                licence: repo.license,
                url: repo.url,
                owner,
                default_branch: repo.default_branch,
                description: repo.description,
                html_url: repo.html_url,
                size: repo.size,
                topics: repo.topics,
                zipped_repo,
            }
        })
        .collect()
}

/// The HTTP client used to talk to the repository-listing API.
pub fn client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(RemoteFetchError::Transport)?;
    Ok(client)
}

/// Fetches the repository list from `api`. Anything but `200 OK` fails the
/// refresh.
pub fn fetch(client: &Client, api: &Url, exclude: &[String]) -> Result<ProjectSnapshot> {
    let response = client
        .get(api.clone())
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .map_err(RemoteFetchError::Transport)?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(RemoteFetchError::Status(response.status().as_u16()).into());
    }
    let repos: Vec<RemoteRepo> = response.json().map_err(RemoteFetchError::Transport)?;
    tracing::info!(count = repos.len(), "projects pulled from {}", api);
    Ok(to_snapshot(repos, exclude))
}

/// Fetches a fresh snapshot and writes it to `path`, replacing the old one
/// only once the whole snapshot is in hand.
pub fn refresh(client: &Client, api: &Url, exclude: &[String], path: &Path) -> Result<ProjectSnapshot> {
    let snapshot = fetch(client, api, exclude)?;
    write(path, &snapshot)?;
    Ok(snapshot)
}

/// Writes `snapshot` to `path` atomically, creating the parent directory.
pub fn write(path: &Path, snapshot: &[Project]) -> Result<()> {
    let io = |err| Error::Io {
        path: path.to_owned(),
        err,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let json = serde_json::to_vec_pretty(snapshot).map_err(|err| Error::Malformed {
        path: path.to_owned(),
        err,
    })?;
    tracing::info!(path = %path.display(), "writing project snapshot");
    write_atomic(path, &json).map_err(io)
}

/// Represents a failure talking to the repository-listing API.
#[derive(Debug, Error)]
pub enum RemoteFetchError {
    /// Returned when the API answers with anything but `200 OK`.
    #[error("unable to get repos: HTTP status {0}")]
    Status(u16),

    /// Returned for connection, TLS, and decoding failures.
    #[error("unable to get repos: {0}")]
    Transport(#[source] reqwest::Error),
}

/// The result of a fallible snapshot operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading, fetching, or writing the project snapshot.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when there is no snapshot file.
    #[error("project snapshot `{}` not found", .0.display())]
    Missing(PathBuf),

    /// Returned when the snapshot file isn't a valid snapshot.
    #[error("malformed project snapshot `{}`: {err}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },

    #[error(transparent)]
    RemoteFetch(#[from] RemoteFetchError),

    /// Returned for other I/O errors on the snapshot file.
    #[error("project snapshot `{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const API_RESPONSE: &str = r#"[
        {
            "name": "pwntools-scripts",
            "language": "Python",
            "license": {"key": "mit", "name": "MIT License", "spdx_id": "MIT"},
            "url": "https://api.github.com/repos/csr13/pwntools-scripts",
            "default_branch": "main",
            "description": "Exploit helpers",
            "html_url": "https://github.com/csr13/pwntools-scripts",
            "owner": {"login": "csr13", "id": 1},
            "size": 120,
            "topics": ["ctf", "exploit"],
            "stargazers_count": 3
        },
        {
            "name": "csr13.github.io",
            "language": "HTML",
            "license": null,
            "url": "https://api.github.com/repos/csr13/csr13.github.io",
            "default_branch": "master",
            "description": null,
            "html_url": "https://github.com/csr13/csr13.github.io",
            "owner": {"login": "csr13"},
            "size": 10,
            "topics": []
        }
    ]"#;

    #[test]
    fn test_to_snapshot() {
        let repos: Vec<RemoteRepo> = serde_json::from_str(API_RESPONSE).unwrap();
        let snapshot = to_snapshot(repos, &["csr13.github.io".to_owned()]);
        assert_eq!(1, snapshot.len());
        let project = &snapshot[0];
        assert_eq!("pwntools-scripts", project.name);
        assert_eq!(Some("csr13".to_owned()), project.owner);
        assert_eq!(
            Some("https://github.com/csr13/pwntools-scripts/archive/refs/heads/main.zip".to_owned()),
            project.zipped_repo
        );
        assert_eq!(Some("MIT License".to_owned()), project.licence.as_ref().and_then(|l| l.name.clone()));
        assert_eq!(vec!["ctf", "exploit"], project.topics);
    }

    #[test]
    fn test_write_then_load() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_data").join("_projects.json");
        let repos: Vec<RemoteRepo> = serde_json::from_str(API_RESPONSE).unwrap();
        let snapshot = to_snapshot(repos, &[]);
        write(&path, &snapshot)?;
        assert_eq!(snapshot, load(&path)?);
        Ok(())
    }

    #[test]
    fn test_load_minimal_record() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(
            &path,
            r#"[{"name": "a", "language": null, "licence": null, "url": "https://example.org/a"}]"#,
        )
        .unwrap();
        let snapshot = load(&path)?;
        assert_eq!(1, snapshot.len());
        assert!(snapshot[0].topics.is_empty());
        assert_eq!(None, snapshot[0].zipped_repo);
        Ok(())
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        assert!(matches!(load(&path), Err(Error::Missing(_))));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load(&path), Err(Error::Malformed { .. })));

        std::fs::write(&path, r#"{"name": "not an array"}"#).unwrap();
        assert!(matches!(load(&path), Err(Error::Malformed { .. })));
    }

    /// Answers a single request on a local port with `status` and `body` and
    /// returns the URL to request.
    fn serve_once(status: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("http://{}/users/csr13/repos", listener.local_addr().unwrap())).unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).unwrap() {
                    0 => break,
                    n => request.extend_from_slice(&buf[..n]),
                }
            }
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
        });
        url
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    fn existing_snapshot(dir: &Path) -> PathBuf {
        let path = dir.join("_projects.json");
        std::fs::write(&path, "[]").unwrap();
        path
    }

    #[test]
    fn test_refresh_rejects_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_snapshot(dir.path());
        let api = serve_once("404 Not Found", r#"{"message": "Not Found"}"#);

        let result = refresh(&local_client(), &api, &[], &path);
        assert!(
            matches!(result, Err(Error::RemoteFetch(RemoteFetchError::Status(404)))),
            "{:?}",
            result
        );
        assert_eq!("[]", std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_refresh_writes_snapshot() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_snapshot(dir.path());
        let api = serve_once("200 OK", API_RESPONSE);

        let snapshot = refresh(&local_client(), &api, &["csr13.github.io".to_owned()], &path)?;
        assert_eq!(vec!["pwntools-scripts"], snapshot.iter().map(|p| p.name.as_str()).collect::<Vec<_>>());
        assert_eq!(snapshot, load(&path)?);
        Ok(())
    }

    #[test]
    fn test_refresh_rejects_undecodable_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_snapshot(dir.path());
        let api = serve_once("200 OK", "<html>rate limited</html>");

        let result = refresh(&local_client(), &api, &[], &path);
        assert!(
            matches!(result, Err(Error::RemoteFetch(RemoteFetchError::Transport(_)))),
            "{:?}",
            result
        );
        assert_eq!("[]", std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_fetch_unreachable_api() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let api = Url::parse(&format!("http://{}/users/csr13/repos", addr)).unwrap();
        assert!(matches!(
            fetch(&local_client(), &api, &[]),
            Err(Error::RemoteFetch(RemoteFetchError::Transport(_)))
        ));
    }
}
