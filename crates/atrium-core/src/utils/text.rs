//! String utility functions.
//!
//! Case conversion and naive English pluralisation, used to derive default
//! table names from model names.

use regex::Regex;
use std::sync::OnceLock;

/// Converts `CamelCase`, `camelCase` and acronym-laden names to `snake_case`.
///
/// # Examples
///
/// ```
/// use atrium_core::utils::text::camel_to_snake;
///
/// assert_eq!(camel_to_snake("UserProfile"), "user_profile");
/// assert_eq!(camel_to_snake("HTTPRequestLog"), "http_request_log");
/// assert_eq!(camel_to_snake("post"), "post");
/// ```
pub fn camel_to_snake(name: &str) -> String {
    static WORD_START: OnceLock<Regex> = OnceLock::new();
    static LOWER_UPPER: OnceLock<Regex> = OnceLock::new();

    let word_start = WORD_START.get_or_init(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
    let lower_upper = LOWER_UPPER.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

    let s = word_start.replace_all(name, "${1}_${2}");
    let s = lower_upper.replace_all(&s, "${1}_${2}");
    s.to_lowercase()
}

/// Converts `snake_case` to `camelCase`, or to `PascalCase` when `pascal` is set.
///
/// # Examples
///
/// ```
/// use atrium_core::utils::text::snake_to_camel;
///
/// assert_eq!(snake_to_camel("user_profile", false), "userProfile");
/// assert_eq!(snake_to_camel("user_profile", true), "UserProfile");
/// ```
pub fn snake_to_camel(name: &str, pascal: bool) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').enumerate() {
        if i == 0 && !pascal {
            out.push_str(part);
        } else {
            out.push_str(&capfirst(part));
        }
    }
    out
}

/// Capitalizes the first character of a string.
pub fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        let mut result = c.to_uppercase().to_string();
        result.extend(chars);
        result
    })
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("datum", "data"),
    ("index", "indices"),
];

const UNCOUNTABLE: &[&str] = &["news", "series", "species", "information", "equipment", "data"];

/// Pluralises the last word of a `snake_case` noun.
///
/// # Examples
///
/// ```
/// use atrium_core::utils::text::plural;
///
/// assert_eq!(plural("post"), "posts");
/// assert_eq!(plural("category"), "categories");
/// assert_eq!(plural("address"), "addresses");
/// assert_eq!(plural("user_person"), "user_people");
/// ```
pub fn plural(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(idx) => word.split_at(idx + 1),
        None => ("", word),
    };
    if last.is_empty() {
        return word.to_string();
    }

    let lower = last.to_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, p)) = IRREGULAR.iter().find(|(s, _)| *s == lower) {
        return format!("{head}{p}");
    }

    let pluralised = if ["s", "x", "z", "ch", "sh"].iter().any(|e| lower.ends_with(e)) {
        format!("{last}es")
    } else if lower.ends_with('y')
        && !lower[..lower.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u'])
    {
        format!("{}ies", &last[..last.len() - 1])
    } else {
        format!("{last}s")
    };
    format!("{head}{pluralised}")
}

/// Normalises a model name into the plural `snake_case` table stem.
///
/// A trailing `_model` is dropped before pluralising.
///
/// # Examples
///
/// ```
/// use atrium_core::utils::text::normalize_model_name;
///
/// assert_eq!(normalize_model_name("UserProfileModel"), "user_profiles");
/// assert_eq!(normalize_model_name("Category"), "categories");
/// ```
pub fn normalize_model_name(model_name: &str) -> String {
    let snake = camel_to_snake(model_name);
    let stem = snake.strip_suffix("_model").unwrap_or(&snake);
    plural(stem)
}

/// Returns the default table name of a model: `<module>_<normalized name>`,
/// or just the normalized name when the module label is empty.
///
/// # Examples
///
/// ```
/// use atrium_core::utils::text::default_table_name;
///
/// assert_eq!(default_table_name("auth", "UserProfileModel"), "auth_user_profiles");
/// assert_eq!(default_table_name("", "Post"), "posts");
/// ```
pub fn default_table_name(module_label: &str, model_name: &str) -> String {
    let name = normalize_model_name(model_name);
    if module_label.is_empty() {
        name
    } else {
        format!("{module_label}_{name}")
    }
}
