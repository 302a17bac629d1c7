use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ConfigurationError;

/// An entity with a unique name inside its container.
pub trait Named {
    /// Human-readable entity kind used in error messages.
    const KIND: &'static str;

    fn name(&self) -> &str;
}

/// An ordered registry of uniquely named entities.
///
/// Iteration follows insertion order. Adding an entity whose name is already
/// present is a [`ConfigurationError::DuplicateName`].
#[derive(Debug, Clone)]
pub struct Container<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Container<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Named> Container<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container from entities, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateName`] on the first repeat.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Result<Self, ConfigurationError> {
        let mut container = Self::new();
        container.extend(items)?;
        Ok(container)
    }

    /// Adds an entity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateName`] if the name is taken.
    pub fn add(&mut self, item: T) -> Result<(), ConfigurationError> {
        if self.index.contains_key(item.name()) {
            return Err(ConfigurationError::DuplicateName {
                kind: T::KIND,
                name: item.name().to_owned(),
            });
        }
        self.index.insert(item.name().to_owned(), self.items.len());
        self.items.push(item);
        Ok(())
    }

    /// Adds several entities, stopping at the first duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateName`] on the first repeat.
    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) -> Result<(), ConfigurationError> {
        items.into_iter().try_for_each(|item| self.add(item))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.items[i])
    }

    /// Mutable access to an entity; its name must not be changed.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.index.get(name).map(|&i| &mut self.items[i])
    }

    /// Removes an entity, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let position = self.index.remove(name)?;
        let item = self.items.remove(position);
        for i in self.index.values_mut() {
            if *i > position {
                *i -= 1;
            }
        }
        Some(item)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Position of an entity in insertion order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// The entities in insertion order; indices match [`Container::position`].
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Named::name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: PartialEq> PartialEq for Container<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<'a, T> IntoIterator for &'a Container<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for Container<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de> + Named> Deserialize<'de> for Container<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Self::from_items(items).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item(String);

    impl Named for Item {
        const KIND: &'static str = "item";

        fn name(&self) -> &str {
            &self.0
        }
    }

    fn item(name: &str) -> Item {
        Item(name.to_owned())
    }

    #[test]
    fn keeps_insertion_order_and_rejects_duplicates() {
        let mut c = Container::from_items([item("b"), item("a"), item("c")]).unwrap();
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["b", "a", "c"]);

        let err = c.add(item("a")).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DuplicateName { kind: "item", ref name } if name == "a"
        ));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn remove_reindexes_later_items() {
        let mut c = Container::from_items([item("x"), item("y"), item("z")]).unwrap();
        assert_eq!(c.remove("x"), Some(item("x")));
        assert_eq!(c.get("z"), Some(&item("z")));
        assert_eq!(c.position("y"), Some(0));
        assert!(c.remove("x").is_none());
    }

    #[test]
    fn deserializing_duplicates_fails() {
        let result: Result<Container<Item>, _> = serde_json::from_str(r#"["a", "a"]"#);
        assert!(result.is_err());
    }
}
