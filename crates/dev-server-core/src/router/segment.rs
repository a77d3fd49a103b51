//! URL segment parsing shared by both routing modes.

/// Classification of a single path segment drawn from a directory or file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// A plain, literal segment matched verbatim.
    Static(String),
    /// `[name]` -- matches exactly one URL segment, bound to `name`.
    Dynamic(String),
    /// `[...name]` -- matches one-or-more trailing segments, bound as a sequence.
    CatchAll(String),
    /// `[[...name]]` -- matches zero-or-more trailing segments, bound as a sequence.
    OptionalCatchAll(String),
    /// `(name)` -- a route group: URL-transparent, consumes no segment, may
    /// still contribute a layout.
    Group(String),
}

impl SegmentKind {
    /// Classifies a single directory/file basename (extension already stripped).
    pub fn classify(name: &str) -> SegmentKind {
        if let Some(inner) = name
            .strip_prefix("[[...")
            .and_then(|s| s.strip_suffix("]]"))
        {
            return SegmentKind::OptionalCatchAll(inner.to_string());
        }
        if let Some(inner) = name.strip_prefix("[...").and_then(|s| s.strip_suffix(']')) {
            return SegmentKind::CatchAll(inner.to_string());
        }
        if let Some(inner) = name.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            return SegmentKind::Group(inner.to_string());
        }
        if let Some(inner) = name.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return SegmentKind::Dynamic(inner.to_string());
        }
        SegmentKind::Static(name.to_string())
    }

    pub fn is_group(&self) -> bool {
        matches!(self, SegmentKind::Group(_))
    }
}

/// Splits a normalized, `/`-rooted pathname into non-empty segments.
/// `"/"` becomes an empty vector.
pub fn split_segments(pathname: &str) -> Vec<&str> {
    pathname
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// The bound route parameters resulting from a successful match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params(pub Vec<(String, ParamValue)>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl Params {
    pub fn get_single(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|(k, v)| {
            if k == key {
                match v {
                    ParamValue::Single(s) => Some(s.as_str()),
                    ParamValue::Multi(_) => None,
                }
            } else {
                None
            }
        })
    }

    pub fn get_multi(&self, key: &str) -> Option<&[String]> {
        self.0.iter().find_map(|(k, v)| {
            if k == key {
                match v {
                    ParamValue::Multi(s) => Some(s.as_slice()),
                    ParamValue::Single(_) => None,
                }
            } else {
                None
            }
        })
    }

    pub fn insert_single(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), ParamValue::Single(value.into())));
    }

    pub fn insert_multi(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.0.push((key.into(), ParamValue::Multi(values)));
    }
}
