use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-item value of a feature. Absent keys and JSON `null` are both unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tristate {
    True,
    False,
    Unknown,
}

impl Tristate {
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Tristate::True => Some(true),
            Tristate::False => Some(false),
            Tristate::Unknown => None,
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, Tristate::Unknown)
    }

    /// An item survives a definite answer when its value is unknown or equal.
    pub const fn is_compatible_with(self, wanted: bool) -> bool {
        match self {
            Tristate::Unknown => true,
            Tristate::True => wanted,
            Tristate::False => !wanted,
        }
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value { Tristate::True } else { Tristate::False }
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map(Tristate::from).unwrap_or(Tristate::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub themes: BTreeSet<String>,
    #[serde(default)]
    attrs: BTreeMap<String, Option<bool>>,
}

impl Item {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            themes: BTreeSet::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.themes.insert(theme.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Tristate>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Tristate>) {
        let value: Tristate = value.into();
        self.attrs.insert(key.into(), value.as_bool());
    }

    pub fn attr(&self, key: &str) -> Tristate {
        self.attrs.get(key).copied().flatten().into()
    }

    pub fn has_theme(&self, theme: &str) -> bool {
        self.themes.contains(theme)
    }

    /// Feature keys with a definite value, in key order.
    pub fn known_keys(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(key, _)| key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Item, Tristate};

    #[test]
    fn absent_and_null_are_unknown() {
        let item: Item = serde_json::from_str(
            r#"{"id": "cat", "label": "Cat", "themes": ["animals"], "attrs": {"mammal": true, "flies": false, "pet": null}}"#,
        )
        .unwrap();
        assert_eq!(item.attr("mammal"), Tristate::True);
        assert_eq!(item.attr("flies"), Tristate::False);
        assert_eq!(item.attr("pet"), Tristate::Unknown);
        assert_eq!(item.attr("swims"), Tristate::Unknown);
        assert!(item.has_theme("animals"));
        assert_eq!(item.known_keys().collect::<Vec<_>>(), vec!["flies", "mammal"]);
    }

    #[test]
    fn compatibility_keeps_unknown_and_equal() {
        assert!(Tristate::Unknown.is_compatible_with(true));
        assert!(Tristate::Unknown.is_compatible_with(false));
        assert!(Tristate::True.is_compatible_with(true));
        assert!(!Tristate::True.is_compatible_with(false));
        assert!(!Tristate::False.is_compatible_with(true));
    }

    #[test]
    fn builder_stores_unknown_as_null() {
        let item = Item::new("x", "X").with_attr("a", None).with_attr("b", true);
        assert_eq!(item.attr("a"), Tristate::Unknown);
        assert_eq!(item.attr("b"), Tristate::True);
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"a\":null"));
    }
}
