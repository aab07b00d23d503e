//! Reference documents and the ownership proof shown on the landing page.

use crate::theme::object;
use crate::util::join_segments;
use gtmpl::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

const PDF_EXTENSION: &str = ".pdf";

/// A PDF listed on the landing page.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The display title derived from the file name; see [`display_title`].
    pub title: String,
    pub file_name: String,
    pub url: Url,
}

impl Document {
    pub fn to_value(&self) -> Value {
        object([
            ("title", Value::String(self.title.clone())),
            ("file_name", Value::String(self.file_name.clone())),
            ("url", Value::String(self.url.to_string())),
        ])
    }
}

/// The documents split into research papers and general documentation.
#[derive(Debug, Default, PartialEq)]
pub struct Documents {
    pub documentation: Vec<Document>,
    pub research: Vec<Document>,
}

/// Turns a document file name into a display title by dropping the `.pdf`
/// extension, splitting on underscores, and capitalizing each segment, e.g.
/// `heap_exploitation_research.pdf` becomes `Heap Exploitation Research`.
pub fn display_title(file_name: &str) -> String {
    file_name
        .strip_suffix(PDF_EXTENSION)
        .unwrap_or(file_name)
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Classifies the file names: names ending in `research_suffix` are research,
/// every other PDF is documentation. Entries keep the order of `file_names`.
pub fn classify<'a>(
    file_names: impl IntoIterator<Item = &'a str>,
    research_suffix: &str,
    documents_url: &Url,
) -> Result<Documents> {
    let mut documents = Documents::default();
    for file_name in file_names {
        if !file_name.ends_with(PDF_EXTENSION) {
            continue;
        }
        let document = Document {
            title: display_title(file_name),
            file_name: file_name.to_owned(),
            url: join_segments(documents_url, [file_name])?,
        };
        match file_name.ends_with(research_suffix) {
            true => documents.research.push(document),
            false => documents.documentation.push(document),
        }
    }
    Ok(documents)
}

/// Lists and classifies the PDFs in `dir`, sorted by file name. A missing
/// directory has no documents.
pub fn load(dir: &Path, research_suffix: &str, documents_url: &Url) -> Result<Documents> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "no documents directory");
            return Ok(Documents::default());
        }
        Err(err) => return Err(Error::io(dir, err)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    classify(names.iter().map(String::as_str), research_suffix, documents_url)
}

/// Extracts the payload of an ownership proof: everything but its first four
/// and last two lines, concatenated verbatim.
pub fn proof_payload(contents: &str) -> String {
    let lines: Vec<&str> = contents.split_inclusive('\n').collect();
    if lines.len() <= 6 {
        return String::new();
    }
    lines[4..lines.len() - 2].concat()
}

/// Reads the ownership proof file and returns its payload.
pub fn load_proof(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|contents| proof_payload(&contents))
        .map_err(|err| Error::io(path, err))
}

/// The result of a fallible document operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error listing documents or reading the ownership proof.
#[derive(Debug, Error)]
pub enum Error {
    #[error("reading `{}`: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a document URL can't be built.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    fn io(path: &Path, err: std::io::Error) -> Error {
        Error::Io {
            path: path.to_owned(),
            err,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_title() {
        assert_eq!("Intro To Rust", display_title("intro_to_rust.pdf"));
        assert_eq!("Heap Exploitation Research", display_title("heap_exploitation_research.pdf"));
        assert_eq!("Notes", display_title("notes"));
    }

    #[test]
    fn test_classify() -> Result<()> {
        let url = Url::parse("https://example.org/media/documentation/pdfs/")?;
        let documents = classify(
            ["intro_to_rust.pdf", "heap_research.pdf", "readme.txt", "x86_cheatsheet.pdf"],
            "_research.pdf",
            &url,
        )?;
        assert_eq!(
            vec!["Intro To Rust", "X86 Cheatsheet"],
            documents.documentation.iter().map(|d| d.title.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(1, documents.research.len());
        assert_eq!(
            "https://example.org/media/documentation/pdfs/heap_research.pdf",
            documents.research[0].url.as_str()
        );
        Ok(())
    }

    #[test]
    fn test_load_missing_directory() -> Result<()> {
        let url = Url::parse("https://example.org/docs/")?;
        assert_eq!(
            Documents::default(),
            load(Path::new("/nonexistent/docs"), "_research.pdf", &url)?
        );
        Ok(())
    }

    #[test]
    fn test_proof_payload() {
        let proof = "==\n# header 1\n# header 2\n\nline one\nline two\n\n-- end\n";
        assert_eq!("line one\nline two\n", proof_payload(proof));
        assert_eq!("", proof_payload("a\nb\nc\n"));
    }
}
