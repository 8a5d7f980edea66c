//! URL template resolution (spec §6 "URL template resolution", P5).
//! Only `{org_name}` and `{repo_name}` are defined placeholders; any
//! other `{...}` is passed through unchanged (spec Design Notes
//! "`mirrors.json` templates are positional").

use crate::types::FullName;

/// Substitute `{org_name}`/`{repo_name}` in every template, in order.
pub fn resolve_urls(templates: &[String], name: &FullName) -> Vec<String> {
    templates
        .iter()
        .map(|template| {
            template
                .replace("{org_name}", &name.namespace)
                .replace("{repo_name}", &name.name)
        })
        .collect()
}

/// Whether `name`'s full name (`namespace/name`) matches any of
/// `globs`. Globs support `*` (any run of characters) and `?` (any
/// single character); every other character matches literally (spec §6
/// "exclude_target_globs").
pub fn matches_any_glob(globs: &[String], name: &FullName) -> bool {
    let target = name.to_string();
    globs.iter().any(|pattern| glob_match(pattern, &target))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let mut regex_str = String::from("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            c => regex_str.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex_str.push('$');
    regex::Regex::new(&regex_str)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Try each resolved URL in order with `attempt`, returning the first
/// success. Mirrors the teacher's sequential-fetch-with-fallback idiom
/// (spec Design Notes "Sequential fetch with URL-list fallback"),
/// expressed as a fold rather than a loop with early return so each
/// discarded attempt is uniformly logged.
pub fn first_success<T, E>(
    urls: &[String],
    mut attempt: impl FnMut(&str) -> Result<T, E>,
) -> Result<T, Vec<(String, E)>> {
    let mut errors = Vec::new();
    for url in urls {
        match attempt(url) {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::debug!("mirror {url} failed, trying next");
                errors.push((url.clone(), e));
            }
        }
    }
    Err(errors)
}
