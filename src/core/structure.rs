//! Resource naming policies for locations.

use crate::core::models::Component;

/// Decides where a component lives inside a location.
pub trait Structure: Send + Sync {
    /// Resource identifier for `component`, given the names from its project
    /// down to its version.
    fn resource_identifier(&self, component: &Component, path: &[String]) -> String;
}

/// `<project>/<context>/.../<asset>/<version>/<component><file_type>`, with
/// every segment sanitised for use as a file or object name.
#[derive(Debug, Clone, Default)]
pub struct StandardStructure {
    pub prefix: Option<String>,
}

impl StandardStructure {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Lowercase, with anything outside `[a-z0-9._-]` replaced by `_`.
fn sanitise(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Never produce "." or ".." path segments.
    if cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

impl Structure for StandardStructure {
    fn resource_identifier(&self, component: &Component, path: &[String]) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(path.len() + 2);
        if let Some(prefix) = &self.prefix {
            parts.push(sanitise(prefix));
        }
        parts.extend(path.iter().map(|s| sanitise(s)));
        parts.push(format!(
            "{}{}",
            sanitise(&component.name),
            sanitise(&component.file_type)
        ));
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, file_type: &str) -> Component {
        Component {
            id: "c1".into(),
            name: name.into(),
            file_type: file_type.into(),
            version_id: "v1".into(),
            size: None,
        }
    }

    #[test]
    fn joins_path_and_component_name() {
        let structure = StandardStructure::new();
        let path = vec!["Show".to_string(), "sq010".to_string(), "plate".to_string(), "v003".to_string()];
        assert_eq!(
            structure.resource_identifier(&component("Main", ".EXR"), &path),
            "show/sq010/plate/v003/main.exr"
        );
    }

    #[test]
    fn sanitises_unsafe_segments() {
        let structure = StandardStructure {
            prefix: Some("root".into()),
        };
        let path = vec!["My Show!".to_string(), "..".to_string()];
        assert_eq!(
            structure.resource_identifier(&component("a/b", ""), &path),
            "root/my_show_/__/a_b"
        );
    }
}
