use serde::{Deserialize, Serialize};

/// Case folding applied to a key name before the allow-list check and
/// composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCase {
    #[default]
    Preserve,
    Lower,
    Upper,
}

impl KeyCase {
    pub fn apply(&self, name: &str) -> String {
        match self {
            KeyCase::Preserve => name.to_string(),
            KeyCase::Lower => name.to_lowercase(),
            KeyCase::Upper => name.to_uppercase(),
        }
    }
}

fn default_delimiter() -> String {
    "-".to_string()
}

/// Prefix/suffix segments and delimiters that turn a base key name into the
/// final storage key. Composition is a pure function of this state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyNamespace {
    #[serde(default)]
    pub prefix: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub prefix_delimiter: String,
    #[serde(default)]
    pub suffix: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub suffix_delimiter: String,
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self {
            prefix: Vec::new(),
            prefix_delimiter: default_delimiter(),
            suffix: Vec::new(),
            suffix_delimiter: default_delimiter(),
        }
    }
}

impl KeyNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// `join(prefix, dp) + dp + name + ds + join(suffix, ds)`, with each
    /// side omitted entirely when its segment list is empty. An empty
    /// delimiter collapses segments together; that is the caller's problem.
    pub fn compose(&self, name: &str) -> String {
        let mut key = String::new();
        if !self.prefix.is_empty() {
            key.push_str(&self.prefix.join(&self.prefix_delimiter));
            key.push_str(&self.prefix_delimiter);
        }
        key.push_str(name);
        if !self.suffix.is_empty() {
            key.push_str(&self.suffix_delimiter);
            key.push_str(&self.suffix.join(&self.suffix_delimiter));
        }
        key
    }

    pub fn set_prefix_delimiter(&mut self, delimiter: impl Into<String>) -> &mut Self {
        self.prefix_delimiter = delimiter.into();
        self
    }

    pub fn append_prefix(&mut self, segment: impl Into<String>) -> &mut Self {
        self.prefix.push(segment.into());
        self
    }

    /// Overwrites the segment at `position`, growing the list when the
    /// position is past the end.
    pub fn set_prefix(&mut self, position: usize, segment: impl Into<String>) -> &mut Self {
        if position < self.prefix.len() {
            self.prefix[position] = segment.into();
        } else {
            self.prefix.push(segment.into());
        }
        self
    }

    pub fn remove_prefix(&mut self, position: usize) -> &mut Self {
        if position < self.prefix.len() {
            self.prefix.remove(position);
        }
        self
    }

    pub fn clear_prefix(&mut self) -> &mut Self {
        self.prefix.clear();
        self
    }

    pub fn set_suffix_delimiter(&mut self, delimiter: impl Into<String>) -> &mut Self {
        self.suffix_delimiter = delimiter.into();
        self
    }

    pub fn append_suffix(&mut self, segment: impl Into<String>) -> &mut Self {
        self.suffix.push(segment.into());
        self
    }

    pub fn set_suffix(&mut self, position: usize, segment: impl Into<String>) -> &mut Self {
        if position < self.suffix.len() {
            self.suffix[position] = segment.into();
        } else {
            self.suffix.push(segment.into());
        }
        self
    }

    pub fn remove_suffix(&mut self, position: usize) -> &mut Self {
        if position < self.suffix.len() {
            self.suffix.remove(position);
        }
        self
    }

    pub fn clear_suffix(&mut self) -> &mut Self {
        self.suffix.clear();
        self
    }
}
