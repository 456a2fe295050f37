// Path decomposition - walks an absolute path one segment at a time
use crate::error::PathError;
use std::path::{Component, Path, PathBuf};

/// Decomposes `full` into the ordered segments found beneath `root`.
///
/// Both cursor operations share one cursor: consuming a relative segment also
/// advances the absolute path that `next_full_path` builds on.
#[derive(Debug, Clone)]
pub struct PathAnalyzer {
    built: PathBuf,
    segments: Vec<String>,
    cursor: usize,
}

impl PathAnalyzer {
    /// `root` must be a component-wise prefix of `full`, or empty. An empty root
    /// starts the walk at the path's own filesystem root (`/` or a drive).
    pub fn new(full: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<Self, PathError> {
        let full = full.as_ref();
        let root = root.as_ref();

        let (built, relative) = if root.as_os_str().is_empty() {
            let mut anchor = PathBuf::new();
            for component in full.components() {
                if matches!(component, Component::Prefix(_) | Component::RootDir) {
                    anchor.push(component.as_os_str());
                }
            }
            (anchor, full)
        } else {
            let relative = full.strip_prefix(root).map_err(|_| PathError::NotUnderRoot {
                path: full.to_path_buf(),
                root: root.to_path_buf(),
            })?;
            (root.to_path_buf(), relative)
        };

        Ok(Self {
            built,
            segments: normal_segments(relative),
            cursor: 0,
        })
    }

    pub fn has_next_level(&self) -> bool {
        self.cursor < self.segments.len()
    }

    /// Next single component, without building an absolute path.
    pub fn next_relative_segment(&mut self) -> Result<String, PathError> {
        let segment = self
            .segments
            .get(self.cursor)
            .cloned()
            .ok_or(PathError::ExhaustedPath)?;
        self.built.push(&segment);
        self.cursor += 1;
        Ok(segment)
    }

    /// Absolute path up to and including the next component.
    pub fn next_full_path(&mut self) -> Result<PathBuf, PathError> {
        self.next_relative_segment()?;
        Ok(self.built.clone())
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn remaining(&self) -> &[String] {
        &self.segments[self.cursor..]
    }
}

/// Plain name components of `path`; root, prefix and `.` parts are skipped.
pub fn normal_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Length of the shared leading run of two segment lists.
pub fn common_prefix_len(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

pub fn is_same_or_descendant(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

pub fn display_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references in address-bar text.
/// Unknown variables are left as typed.
pub fn expand_address_text(text: &str, home: Option<&Path>) -> String {
    let trimmed = text.trim();
    let expanded = match (trimmed.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            format!("{}{}", home.display(), rest)
        }
        _ => trimmed.to_string(),
    };

    let mut out = String::with_capacity(expanded.len());
    let mut rest = expanded.as_str();
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
