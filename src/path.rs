use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// One element of a [`FieldPath`].
///
/// A segment is either a bare identifier (an object field name or a map key) or a bracketed
/// index such as `[web]`, which selects a list item by its merge key value or a map entry by
/// its key. What a segment means depends on the schema node it is evaluated against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment(String);

impl Segment {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bracketed index value, `None` for a bare identifier
    pub fn index(&self) -> Result<Option<&str>> {
        let s = self.0.as_str();
        match (s.strip_prefix('['), s.ends_with(']')) {
            (Some(rest), true) => Ok(rest.strip_suffix(']')),
            (None, false) => Ok(None),
            _ => Err(Error::MalformedIndex(self.0.clone())),
        }
    }

    /// Map key addressed by this segment. Both `[key]` and a bare `key` are accepted.
    pub fn key(&self) -> Result<&str> {
        Ok(self.index()?.unwrap_or(&self.0))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Location of a value inside a document, e.g. `spec.template.spec.containers[web].image`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First segment, which names a top-level field of the resource
    pub fn root(&self) -> Option<&Segment> {
        self.0.first()
    }
}

impl From<&[Segment]> for FieldPath {
    fn from(segments: &[Segment]) -> Self {
        Self(segments.to_vec())
    }
}

impl<'a> FromIterator<&'a str> for FieldPath {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(Segment::from).collect())
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !current.is_empty() {
                        segments.push(Segment(std::mem::take(&mut current)));
                    }
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(Segment(std::mem::take(&mut current)));
                    }
                    // Keys may contain dots, so read verbatim up to the closing bracket
                    let mut index = String::from("[");
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(c) => index.push(c),
                            None => return Err(Error::MalformedIndex(index)),
                        }
                    }
                    index.push(']');
                    segments.push(Segment(index));
                }
                ']' => return Err(Error::MalformedIndex(format!("{}]", current))),
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            segments.push(Segment(current));
        }
        if segments.is_empty() {
            return Err(Error::EmptyPath);
        }
        Ok(Self(segments))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 && !segment.as_str().starts_with('[') {
                f.write_str(".")?;
            }
            f.write_str(segment.as_str())?;
        }
        Ok(())
    }
}

/// Paths are written either as a dotted string or as a list of segments.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldPathRepr {
    Dotted(String),
    Segments(Vec<String>),
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match FieldPathRepr::deserialize(d)? {
            FieldPathRepr::Dotted(s) => s.parse().map_err(de::Error::custom),
            FieldPathRepr::Segments(v) if v.is_empty() => Err(de::Error::custom(Error::EmptyPath)),
            FieldPathRepr::Segments(v) => Ok(Self(v.into_iter().map(Segment).collect())),
        }
    }
}

impl Serialize for FieldPath {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let path: FieldPath = "spec.template.spec.containers[web].image".parse().unwrap();
        let segments: Vec<_> = path.segments().iter().map(Segment::as_str).collect();
        assert_eq!(
            segments,
            vec!["spec", "template", "spec", "containers", "[web]", "image"]
        );
        assert_eq!(path.to_string(), "spec.template.spec.containers[web].image");

        let path: FieldPath = "metadata.labels.[app.kubernetes.io/name]".parse().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(
            path.segments()[2].index().unwrap(),
            Some("app.kubernetes.io/name")
        );

        assert!(matches!(
            "spec.containers[web".parse::<FieldPath>(),
            Err(Error::MalformedIndex(_))
        ));
        assert!(matches!("..".parse::<FieldPath>(), Err(Error::EmptyPath)));
    }

    #[test]
    fn test_segment_index() {
        assert_eq!(Segment::from("[a]").index().unwrap(), Some("a"));
        assert_eq!(Segment::from("a").index().unwrap(), None);
        assert!(Segment::from("[a").index().is_err());
        assert!(Segment::from("a]").index().is_err());
        assert_eq!(Segment::from("cpu").key().unwrap(), "cpu");
        assert_eq!(Segment::from("[cpu]").key().unwrap(), "cpu");
    }

    #[test]
    fn test_deserialize() {
        let path: FieldPath = serde_yaml::from_str("spec.replicas").unwrap();
        assert_eq!(path.to_string(), "spec.replicas");
        let path: FieldPath = serde_yaml::from_str("[spec, selector, matchLabels]").unwrap();
        assert_eq!(path.to_string(), "spec.selector.matchLabels");
    }
}
