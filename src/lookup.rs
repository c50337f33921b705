use std::path::Path;

use htmd::HtmlToMarkdown;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use tracing::warn;

use crate::config::{self, SaveFormat};
use crate::dict::DictionaryReader;
use crate::resolve::ResolvedDictionarySet;
use crate::substitute::{self, CompiledRule};
use crate::template;

/// Returned verbatim when a group resolves to zero dictionaries.
pub const NO_DICTIONARY: &str = "No dictionary exists";
/// Result-slot placeholder for a word missing from one dictionary.
pub const WORD_NOT_FOUND: &str = "Word does not exist";
/// Result-slot placeholder for a dictionary that could not be opened.
pub const DICTIONARY_UNREADABLE: &str = "Dictionary could not be opened";

const TEXT_WRAP_COLUMNS: usize = 80;

/// Injected into every page the lookup server serves; posts the rendered
/// height to the embedding document.
pub const FRAME_CONTENT_RESIZE_JS: &str = r#"(function () {
  var post = function () {
    parent.postMessage({
      mdxglossFrame: window.location.href,
      mdxglossHeight: document.documentElement.scrollHeight
    }, '*');
  };
  window.addEventListener('load', post);
  if (window.ResizeObserver) {
    new ResizeObserver(post).observe(document.documentElement);
  }
})();"#;

/// Appended after templating in iframe mode; sizes each frame to the height
/// its content posts.
pub const FRAME_RESIZE_LISTENER_JS: &str = r#"window.addEventListener('message', function (event) {
  var data = event.data || {};
  if (!data.mdxglossFrame || !data.mdxglossHeight) { return; }
  var frames = document.querySelectorAll('iframe');
  for (var i = 0; i < frames.length; i++) {
    if (frames[i].src === data.mdxglossFrame) {
      frames[i].style.height = data.mdxglossHeight + 'px';
    }
  }
});"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markdown conversion failed: {0}")]
    Markdown(String),
    #[error("text conversion failed: {0}")]
    Text(String),
}

/// Everything one aggregated lookup needs, passed explicitly; there is no
/// ambient settings state.
pub struct LookupRequest<'a> {
    pub word: &'a str,
    pub group: &'a str,
    pub format: SaveFormat,
    /// User template; blank falls back to the format's default.
    pub template: &'a str,
    pub rules: &'a [CompiledRule],
    pub show_notice: bool,
    /// Lookup-server port, used for iframe endpoints and asset mounts.
    pub port: u16,
}

#[derive(Debug, Default)]
pub struct LookupOutcome {
    pub text: String,
    /// User-facing notices (missing words, unreadable files), populated only
    /// when the group asks for them.
    pub notices: Vec<String>,
}

/// Queries every dictionary in `resolved` in order and assembles the final
/// output for `request.format`: per-dictionary conversion, template
/// rendering, then the group's substitution rules.
pub fn lookup_all(
    reader: &dyn DictionaryReader,
    request: &LookupRequest<'_>,
    resolved: &ResolvedDictionarySet,
) -> Result<LookupOutcome, RenderError> {
    if resolved.is_empty() {
        return Ok(LookupOutcome {
            text: NO_DICTIONARY.to_string(),
            notices: Vec::new(),
        });
    }

    let mut notices = Vec::new();
    let results: Vec<String> = if request.format == SaveFormat::Iframe {
        // The server performs the actual lookups when each frame loads.
        resolved
            .dict_all_paths
            .iter()
            .map(|path| iframe_for(request, path))
            .collect()
    } else {
        let mut results = Vec::with_capacity(resolved.dict_all_paths.len());
        for path in &resolved.dict_all_paths {
            results.push(converted_definition(reader, request, path, &mut notices)?);
        }
        results
    };

    let template = if request.template.trim().is_empty() {
        config::default_template(request.format)
    } else {
        request.template
    };
    let mut output = template::render(template, request.word, &results, resolved);
    if request.format == SaveFormat::Iframe {
        output.push_str("\n<script type=\"text/javascript\">\n");
        output.push_str(FRAME_RESIZE_LISTENER_JS);
        output.push_str("\n</script>");
    }

    Ok(LookupOutcome {
        text: substitute::apply(&output, request.rules),
        notices,
    })
}

fn converted_definition(
    reader: &dyn DictionaryReader,
    request: &LookupRequest<'_>,
    path: &Path,
    notices: &mut Vec<String>,
) -> Result<String, RenderError> {
    let raw = match reader.lookup(request.word, path) {
        Ok(Some(html)) => html,
        Ok(None) => {
            push_notice(
                notices,
                request,
                format!("Word in dictionary {} does not exist", basename(path)),
            );
            return Ok(WORD_NOT_FOUND.to_string());
        }
        Err(err) => {
            warn!(dictionary = %path.display(), error = %err, "dictionary lookup failed");
            push_notice(
                notices,
                request,
                format!("Dictionary {} could not be opened", basename(path)),
            );
            return Ok(DICTIONARY_UNREADABLE.to_string());
        }
    };
    match request.format {
        SaveFormat::Markdown => to_markdown(&raw),
        SaveFormat::Text => to_text(&raw),
        SaveFormat::Raw | SaveFormat::Iframe => Ok(raw),
    }
}

fn to_markdown(html: &str) -> Result<String, RenderError> {
    HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style"])
        .build()
        .convert(html)
        .map_err(|err| RenderError::Markdown(err.to_string()))
}

fn to_text(html: &str) -> Result<String, RenderError> {
    html2text::from_read(html.as_bytes(), TEXT_WRAP_COLUMNS)
        .map_err(|err| RenderError::Text(err.to_string()))
}

fn iframe_for(request: &LookupRequest<'_>, path: &Path) -> String {
    format!(
        r#"<iframe src="{}" frameborder="0" style="width: 100%;"></iframe>"#,
        word_endpoint_url(request.port, request.word, request.group, path),
    )
}

/// URL of the lookup server's single-dictionary endpoint for `word`.
pub fn word_endpoint_url(port: u16, word: &str, group: &str, dict_path: &Path) -> String {
    format!(
        "http://127.0.0.1:{port}/word?word={}&name={}&dictPath={}",
        encode_component(word),
        encode_component(group),
        encode_component(&dict_path.display().to_string()),
    )
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn push_notice(notices: &mut Vec<String>, request: &LookupRequest<'_>, message: String) {
    if request.show_notice {
        notices.push(message);
    }
}
