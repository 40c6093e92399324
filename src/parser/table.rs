/*!
 * Macro tables keyed by name, one per mode.
 */

use std::collections::HashMap;

use anyhow::{Context, Result};

use super::events::MathMode;
use super::prototype::MacroPrototype;

/// Outcome of a table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// Defined for the requested mode
    Found(&'a MacroPrototype),
    /// Only defined for the other mode
    OtherMode(&'a MacroPrototype),
    /// Unknown to the table
    NotFound,
}

/// Registered text-mode and math-mode macros, plus active characters
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    text: HashMap<String, MacroPrototype>,
    math: HashMap<String, MacroPrototype>,
    active: HashMap<char, MacroPrototype>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a text-mode macro from prototype notation
    pub fn define_text(&mut self, name: &str, prototype: &str) -> Result<&mut Self> {
        let proto = prototype
            .parse()
            .with_context(|| format!("Invalid prototype for \\{}", name))?;
        self.text.insert(name.to_string(), proto);
        Ok(self)
    }

    /// Register a math-mode macro from prototype notation
    pub fn define_math(&mut self, name: &str, prototype: &str) -> Result<&mut Self> {
        let proto = prototype
            .parse()
            .with_context(|| format!("Invalid prototype for \\{}", name))?;
        self.math.insert(name.to_string(), proto);
        Ok(self)
    }

    /// Register an active character
    pub fn define_active(&mut self, c: char, prototype: &str) -> Result<&mut Self> {
        let proto = prototype
            .parse()
            .with_context(|| format!("Invalid prototype for active character '{}'", c))?;
        self.active.insert(c, proto);
        Ok(self)
    }

    /// Register an already built prototype
    pub fn insert(&mut self, name: &str, mode: MathMode, prototype: MacroPrototype) {
        let map = if mode.is_math() { &mut self.math } else { &mut self.text };
        map.insert(name.to_string(), prototype);
    }

    /// Look a macro up, preferring the definition for `mode`
    pub fn lookup(&self, name: &str, mode: MathMode) -> Lookup<'_> {
        let (same, other) = if mode.is_math() {
            (&self.math, &self.text)
        } else {
            (&self.text, &self.math)
        };
        if let Some(proto) = same.get(name) {
            Lookup::Found(proto)
        } else if let Some(proto) = other.get(name) {
            Lookup::OtherMode(proto)
        } else {
            Lookup::NotFound
        }
    }

    /// Prototype of an active character, if registered
    pub fn active(&self, c: char) -> Option<&MacroPrototype> {
        self.active.get(&c)
    }

    /// Whether `c` is a registered active character
    pub fn is_active(&self, c: char) -> bool {
        self.active.contains_key(&c)
    }
}
