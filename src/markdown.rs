//! Converts post bodies from markdown to HTML. Fenced code blocks carrying a
//! language tag are highlighted into CSS-classed `<span>`s so the theme's
//! stylesheet controls the colors.

use pulldown_cmark::escape::escape_html;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag};
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use thiserror::Error;

/// Renders markdown, holding on to the syntax definitions between posts.
pub struct Renderer {
    syntaxes: SyntaxSet,
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer::new()
    }
}

impl Renderer {
    pub fn new() -> Renderer {
        Renderer {
            syntaxes: SyntaxSet::load_defaults_newlines(),
        }
    }

    /// Converts `markdown` to HTML, appending the result to `out`.
    pub fn to_html(&self, out: &mut String, markdown: &str) -> Result<(), Error> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut events: Vec<Event> = Vec::new();
        let mut code: Option<(String, String)> = None;
        for event in Parser::new_ext(markdown, options) {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) if code.is_none() => {
                    let lang = info.split_whitespace().next().unwrap_or("").to_owned();
                    if lang.is_empty() {
                        events.push(Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))));
                    } else {
                        code = Some((lang, String::new()));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, source)) = code.as_mut() {
                        source.push_str(&text);
                    }
                }
                Event::End(Tag::CodeBlock(_)) if code.is_some() => {
                    if let Some((lang, source)) = code.take() {
                        events.push(Event::Html(CowStr::from(self.highlight(&lang, &source)?)));
                    }
                }
                event => events.push(event),
            }
        }

        html::push_html(out, events.into_iter());
        Ok(())
    }

    fn highlight(&self, lang: &str, source: &str) -> Result<String, Error> {
        let syntax = self
            .syntaxes
            .find_syntax_by_token(lang)
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntaxes, ClassStyle::Spaced);
        for line in LinesWithEndings::from(source) {
            generator.parse_html_for_line_which_includes_newline(line)?;
        }
        let mut html = String::from("<pre><code class=\"language-");
        // writing into a String can't fail
        let _ = escape_html(&mut html, lang);
        html.push_str("\">");
        html.push_str(&generator.finalize());
        html.push_str("</code></pre>\n");
        Ok(html)
    }
}

/// Represents an error converting markdown to HTML.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a code block can't be highlighted.
    #[error("highlighting code block: {0}")]
    Highlight(#[from] syntect::Error),
}
