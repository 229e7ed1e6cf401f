use crate::error::JushError;
use std::io::{self, Write};

/// String-keyed variable store.
///
/// Values are kept as strings; the typed accessors convert on the way
/// in and out. A variable may be *unset*: the name stays known but
/// reads behave as if it had no value. Entries keep the position of
/// their first definition, which fixes the order of the debug dump.
#[derive(Debug, Default)]
pub struct VarStore {
    entries: Vec<VarEntry>,
}

#[derive(Debug, Clone)]
struct VarEntry {
    name: String,
    value: Option<String>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a variable, or `None` if unknown or unset.
    ///
    /// The returned slice borrows from the store and is invalidated by
    /// any later mutation of the entry.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.value.as_deref())
    }

    /// Current value of a variable interpreted as a signed integer.
    ///
    /// The whole value must parse: no surrounding whitespace, no
    /// trailing characters, and no leading `+`.
    pub fn get_int(&self, name: &str) -> Result<i64, JushError> {
        let value = self
            .get_string(name)
            .ok_or_else(|| JushError::UnsetVariable(name.to_string()))?;
        if value.is_empty() || value.starts_with('+') {
            return Err(JushError::NotAnInteger(name.to_string()));
        }
        value
            .parse::<i64>()
            .map_err(|_| JushError::NotAnInteger(name.to_string()))
    }

    /// Create or update a variable. `None` makes the variable unset.
    pub fn set_string(&mut self, name: &str, value: Option<&str>) -> Result<(), JushError> {
        if name.is_empty() {
            return Err(JushError::EmptyVarName);
        }
        let value = value.map(str::to_string);
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.value = value,
            None => self.entries.push(VarEntry {
                name: name.to_string(),
                value,
            }),
        }
        Ok(())
    }

    /// Set a variable to the canonical decimal rendering of `value`.
    pub fn set_int(&mut self, name: &str, value: i64) -> Result<(), JushError> {
        self.set_string(name, Some(&value.to_string()))
    }

    /// Debug dump: `{}` when empty, otherwise `{a=1, b }` where an
    /// unset variable renders as its name followed by a space.
    pub fn show(&self, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "{{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            match &entry.value {
                Some(value) => write!(out, "{}={}", entry.name, value)?,
                None => write!(out, "{} ", entry.name)?,
            }
        }
        write!(out, "}}")
    }
}
