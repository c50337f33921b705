use chrono::Local;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::resolve::ResolvedDictionarySet;

static FOR_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{#for\}\}(.*?)\{\{/for\}\}").expect("valid for-block pattern"));

/// Expands a user template against the word, the current local date, and one
/// loop-body instantiation per dictionary result.
///
/// Recognized placeholders: `{{word}}`, `{{date}}`, and inside the first
/// `{{#for}}…{{/for}}` region `{{result}}`, `{{path}}`, `{{basename}}`.
/// Anything else is left as literal text.
pub fn render(
    template: &str,
    word: &str,
    results: &[String],
    resolved: &ResolvedDictionarySet,
) -> String {
    // The date is stamped once per render, not once per loop iteration.
    let date = Local::now().format("%Y-%m-%d").to_string();
    render_with_date(template, word, &date, results, resolved)
}

fn render_with_date(
    template: &str,
    word: &str,
    date: &str,
    results: &[String],
    resolved: &ResolvedDictionarySet,
) -> String {
    let output = template.replace("{{word}}", word).replace("{{date}}", date);
    FOR_BLOCK
        .replace(&output, |caps: &Captures<'_>| {
            let body = &caps[1];
            let mut expanded = String::new();
            for (i, result) in results.iter().enumerate() {
                let path = resolved
                    .dict_all_paths
                    .get(i)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                let basename = resolved
                    .dict_all_paths
                    .get(i)
                    .and_then(|p| p.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                expanded.push_str(
                    &body
                        .replace("{{result}}", result)
                        .replace("{{path}}", &path)
                        .replace("{{basename}}", &basename),
                );
            }
            expanded
        })
        .into_owned()
}
