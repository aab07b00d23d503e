//! Parses theme templates and renders pages with them. Site-wide values are
//! carried in an explicit [`SiteContext`] merged into every page instead of
//! living in a shared template environment.

use gtmpl::{Template, Value};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Values available to every template alongside the page's own fields.
#[derive(Clone, Debug)]
pub struct SiteContext {
    /// The site's home page, which is also the base for every other URL.
    pub site_root: Url,
}

impl SiteContext {
    pub fn new(site_root: Url) -> SiteContext {
        SiteContext { site_root }
    }

    fn insert_into(&self, fields: &mut HashMap<String, Value>) -> Result<()> {
        let url = |path: &str| -> Result<Value> {
            Ok(Value::String(self.site_root.join(path)?.to_string()))
        };
        fields.insert("site_root".to_owned(), Value::String(self.site_root.to_string()));
        fields.insert("archive_url".to_owned(), url("archive.html")?);
        fields.insert("categories_url".to_owned(), url("categories.html")?);
        fields.insert("projects_url".to_owned(), url("projects.html")?);
        Ok(())
    }
}

/// Loads the template file contents, concatenates them, and parses the result
/// into a template.
pub fn parse_template<P: AsRef<Path>>(template_files: impl IntoIterator<Item = P>) -> Result<Template> {
    let mut contents = String::new();
    for template_file in template_files {
        use std::io::Read;
        let template_file = template_file.as_ref();
        File::open(template_file)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|err| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err,
            })?;
        contents.push(' ');
    }

    let mut template = Template::default();
    template
        .parse(&contents)
        .map_err(|e| Error::ParseTemplate(e.to_string()))?;
    Ok(template)
}

/// Renders one page from `value`, typically a [`Value::Object`] of the page's
/// own fields. The site context is merged into objects without overriding
/// any of their fields.
pub fn render(template: &Template, site: &SiteContext, mut value: Value) -> Result<Vec<u8>> {
    if let Value::Object(fields) = &mut value {
        let mut site_fields = HashMap::new();
        site.insert_into(&mut site_fields)?;
        for (key, site_value) in site_fields {
            fields.entry(key).or_insert(site_value);
        }
    }

    let context = gtmpl::Context::from(value).map_err(|e| Error::Execute(e.to_string()))?;
    let mut out: Vec<u8> = Vec::new();
    template
        .execute(&mut out, &context)
        .map_err(|e| Error::Execute(e.to_string()))?;
    Ok(out)
}

/// Builds a [`Value::Object`] from `(field, value)` pairs.
pub fn object<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect(),
    )
}

/// The result of a fallible templating operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading or executing a template.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for I/O problems while opening template files.
    #[error("Opening template file '{}': {err}", path.display())]
    OpenTemplateFile {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned for errors parsing template files.
    #[error("parsing template: {0}")]
    ParseTemplate(String),

    /// Returned for errors executing a template.
    #[error("executing template: {0}")]
    Execute(String),

    /// Returned when a site URL can't be built.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_merges_site_context() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let define = dir.path().join("base.html");
        let page = dir.path().join("page.html");
        std::fs::write(&define, r#"{{define "title"}}<h1>{{.title}}</h1>{{end}}"#).unwrap();
        std::fs::write(&page, r#"{{template "title" .}}<a href="{{.archive_url}}">{{.site_root}}</a>"#).unwrap();

        let template = parse_template([&define, &page])?;
        let site = SiteContext::new(Url::parse("https://example.org/")?);
        let value = object([("title", Value::String("Hello".to_owned()))]);

        let out = String::from_utf8(render(&template, &site, value)?).unwrap();
        assert_eq!(
            r#"<h1>Hello</h1><a href="https://example.org/archive.html">https://example.org/</a>"#,
            out.trim()
        );
        Ok(())
    }

    #[test]
    fn test_missing_template_file() {
        let result = parse_template([Path::new("/nonexistent/template.html")]);
        assert!(matches!(result, Err(Error::OpenTemplateFile { .. })));
    }

    #[test]
    fn test_page_fields_win_over_site_context() -> Result<()> {
        let mut template = Template::default();
        template.parse("{{.site_root}}").map_err(|e| Error::ParseTemplate(e.to_string()))?;
        let site = SiteContext::new(Url::parse("https://example.org/")?);
        let value = object([("site_root", Value::String("override".to_owned()))]);
        assert_eq!(b"override".to_vec(), render(&template, &site, value)?);
        Ok(())
    }
}
