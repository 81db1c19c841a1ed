use serde::{Deserialize, Serialize};
use std::ops::Index;

/// One record: an ordered, immutable list of text fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Row(Vec<String>);

impl Row {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for Row {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl From<Vec<&str>> for Row {
    fn from(fields: Vec<&str>) -> Self {
        Self::new(fields)
    }
}

impl From<&[&str]> for Row {
    fn from(fields: &[&str]) -> Self {
        Self::new(fields.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Row {
    fn from(fields: [&str; N]) -> Self {
        Self::new(fields)
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Index<usize> for Row {
    type Output = str;

    fn index(&self, idx: usize) -> &str {
        &self.0[idx]
    }
}

impl PartialEq<csv::StringRecord> for Row {
    fn eq(&self, other: &csv::StringRecord) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_agree() {
        let a = Row::from(["A", "row"]);
        let b = Row::from(vec!["A", "row"]);
        let c = Row::from(vec!["A".to_string(), "row".to_string()]);
        let d: Row = ["A", "row"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
        assert_eq!(a.len(), 2);
        assert_eq!(&a[1], "row");
    }

    #[test]
    fn compares_with_string_record() {
        let row = Row::from(["x", "y,z"]);
        let rec = csv::StringRecord::from(vec!["x", "y,z"]);
        assert_eq!(row, rec);
        assert_ne!(Row::from(["x"]), rec);
    }
}
