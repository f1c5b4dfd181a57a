//! Folder naming schemes and destination sanitization.
//!
//! Classifiers hand back free-form folder suggestions such as
//! `"Work Projects/2024 Reports"`. Before one becomes a path under the source
//! root it is split into segments, each segment is reformatted by the
//! configured [`NamingScheme`], unsafe characters are replaced and `..`
//! segments are resolved lexically. A suggestion that would climb above the
//! root is rejected, never clamped.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Characters that are invalid in folder names on at least one platform.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Folder used when a suggestion sanitizes down to nothing.
const FALLBACK_FOLDER: &str = "other";

/// How words inside a folder name are joined and capitalized.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum NamingScheme {
    /// `work_projects`
    #[default]
    SnakeCase,
    /// `workProjects`
    CamelCase,
    /// `WorkProjects`
    PascalCase,
    /// `Work Projects`
    TitleCase,
    /// `work projects`
    LowerCase,
    /// Keep the suggestion as written, only replacing invalid characters.
    Preserve,
}

impl NamingScheme {
    /// Formats one folder name segment.
    ///
    /// ```
    /// use llm_organizer::naming::NamingScheme;
    ///
    /// assert_eq!(NamingScheme::SnakeCase.format("Tax Returns-2024"), "tax_returns_2024");
    /// assert_eq!(NamingScheme::PascalCase.format("tax returns"), "TaxReturns");
    /// assert_eq!(NamingScheme::CamelCase.format("Tax Returns"), "taxReturns");
    /// ```
    pub fn format(self, text: &str) -> String {
        if self == NamingScheme::Preserve {
            return text.trim().to_string();
        }

        let normalized: String = text
            .chars()
            .flat_map(|c| {
                let mapped: Vec<char> = if c.is_alphanumeric() {
                    c.to_lowercase().collect()
                } else {
                    vec![' ']
                };
                mapped
            })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();

        match self {
            NamingScheme::SnakeCase => words.join("_"),
            NamingScheme::CamelCase => words
                .iter()
                .enumerate()
                .map(|(i, w)| if i == 0 { w.to_string() } else { capitalize(w) })
                .collect(),
            NamingScheme::PascalCase => words.iter().map(|w| capitalize(w)).collect(),
            NamingScheme::TitleCase => words
                .iter()
                .map(|w| capitalize(w))
                .collect::<Vec<_>>()
                .join(" "),
            NamingScheme::LowerCase => words.join(" "),
            NamingScheme::Preserve => unreachable!("handled above"),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Naming rules applied to every destination folder in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    pub scheme: NamingScheme,
    /// Deeper suggestions are cut to this many segments.
    pub max_depth: usize,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            scheme: NamingScheme::SnakeCase,
            max_depth: 3,
        }
    }
}

/// A destination suggestion climbed above the source root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("destination folder '{0}' climbs above the source root")]
pub struct EscapesRoot(pub String);

/// Turns a suggested folder into a relative path that stays under the root.
///
/// ```
/// use llm_organizer::naming::{sanitize, NamingPolicy};
/// use std::path::PathBuf;
///
/// let policy = NamingPolicy::default();
/// assert_eq!(
///     sanitize("/Work Projects/../Reports", &policy).unwrap(),
///     PathBuf::from("reports")
/// );
/// assert!(sanitize("../outside", &policy).is_err());
/// ```
pub fn sanitize(folder: &str, policy: &NamingPolicy) -> Result<PathBuf, EscapesRoot> {
    let mut segments: Vec<String> = Vec::new();

    for raw in folder.split(['/', '\\']) {
        match raw.trim() {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(EscapesRoot(folder.to_string()));
                }
            }
            segment => {
                let cleaned = clean_segment(&policy.scheme.format(segment));
                if !cleaned.is_empty() {
                    segments.push(cleaned);
                }
            }
        }
    }

    segments.truncate(policy.max_depth.max(1));
    if segments.is_empty() {
        segments.push(clean_segment(&policy.scheme.format(FALLBACK_FOLDER)));
    }

    Ok(segments.iter().collect())
}

fn clean_segment(segment: &str) -> String {
    let replaced: String = segment
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    replaced.trim_matches(|c| c == ' ' || c == '.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(scheme: NamingScheme) -> NamingPolicy {
        NamingPolicy {
            scheme,
            max_depth: 3,
        }
    }

    #[test]
    fn test_schemes_format_words() {
        let text = "Family photos: summer-2023";
        assert_eq!(NamingScheme::SnakeCase.format(text), "family_photos_summer_2023");
        assert_eq!(NamingScheme::CamelCase.format(text), "familyPhotosSummer2023");
        assert_eq!(NamingScheme::PascalCase.format(text), "FamilyPhotosSummer2023");
        assert_eq!(NamingScheme::TitleCase.format(text), "Family Photos Summer 2023");
        assert_eq!(NamingScheme::LowerCase.format(text), "family photos summer 2023");
        assert_eq!(NamingScheme::Preserve.format(" Family photos "), "Family photos");
    }

    #[test]
    fn test_schemes_keep_non_ascii_letters() {
        assert_eq!(NamingScheme::SnakeCase.format("Études Été"), "études_été");
    }

    #[test]
    fn test_sanitize_nested_folder() {
        let path = sanitize("Work/Tax Returns", &policy(NamingScheme::PascalCase)).unwrap();
        assert_eq!(path, PathBuf::from("Work").join("TaxReturns"));
    }

    #[test]
    fn test_sanitize_strips_leading_separator_and_dots() {
        let path = sanitize("/./Notes/", &policy(NamingScheme::Preserve)).unwrap();
        assert_eq!(path, PathBuf::from("Notes"));

        let path = sanitize("\\Notes\\Drafts", &policy(NamingScheme::Preserve)).unwrap();
        assert_eq!(path, PathBuf::from("Notes").join("Drafts"));
    }

    #[test]
    fn test_sanitize_resolves_inner_parent_segments() {
        let path = sanitize("a/b/../c", &policy(NamingScheme::SnakeCase)).unwrap();
        assert_eq!(path, PathBuf::from("a").join("c"));
    }

    #[test]
    fn test_sanitize_rejects_escape() {
        assert_eq!(
            sanitize("../../etc", &policy(NamingScheme::SnakeCase)),
            Err(EscapesRoot("../../etc".to_string()))
        );
        assert!(sanitize("a/../../b", &policy(NamingScheme::SnakeCase)).is_err());
    }

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        let path = sanitize("C:<stuff>?", &policy(NamingScheme::Preserve)).unwrap();
        assert_eq!(path, PathBuf::from("C__stuff__"));
    }

    #[test]
    fn test_sanitize_truncates_depth() {
        let policy = NamingPolicy {
            scheme: NamingScheme::SnakeCase,
            max_depth: 2,
        };
        let path = sanitize("a/b/c/d", &policy).unwrap();
        assert_eq!(path, PathBuf::from("a").join("b"));
    }

    #[test]
    fn test_sanitize_empty_falls_back_to_other() {
        assert_eq!(
            sanitize("  ", &policy(NamingScheme::PascalCase)).unwrap(),
            PathBuf::from("Other")
        );
        assert_eq!(
            sanitize("!!!/...", &policy(NamingScheme::SnakeCase)).unwrap(),
            PathBuf::from("other")
        );
    }
}
