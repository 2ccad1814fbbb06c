//! Ignition documents made of systemd units.
//!
//! Units are ordered lists of sections, and sections are ordered lists of
//! `key=value` lines, so serialization is deterministic.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::json;
use std::fmt;

pub const IGNITION_VERSION: &str = "2.1.0";

/// A `[Name]` block inside a unit file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    lines: Vec<String>,
}

impl Section {
    pub fn add(&mut self, key: &str, value: impl AsRef<str>) -> &mut Self {
        self.lines.push(format!("{}={}", key, value.as_ref()));
        self
    }
}

/// The text of a unit file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitContents {
    sections: Vec<Section>,
}

impl UnitContents {
    pub fn add_section(&mut self, name: &str) -> &mut Section {
        self.sections.push(Section {
            name: name.to_string(),
            lines: Vec::new(),
        });
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }
}

impl fmt::Display for UnitContents {
    /// Sections separated by a blank line, text terminated by a newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for line in &section.lines {
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub enabled: bool,
    pub contents: UnitContents,
}

impl Unit {
    /// Apply exact string replacements, in order, to the rendered contents.
    pub fn render_with(&self, replacements: &[(&str, &str)]) -> String {
        replacements
            .iter()
            .fold(self.contents.to_string(), |text, (from, to)| text.replace(from, to))
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Unit", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("enabled", &self.enabled)?;
        state.serialize_field("contents", &self.contents.to_string())?;
        state.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemdUnits {
    units: Vec<Unit>,
}

impl SystemdUnits {
    pub fn add(&mut self, name: &str) -> &mut Unit {
        self.units.push(Unit {
            name: name.to_string(),
            enabled: false,
            contents: UnitContents::default(),
        });
        let last = self.units.len() - 1;
        &mut self.units[last]
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Full ignition document; `replacements` are applied to every unit's
    /// contents.
    pub fn to_ignition(&self, replacements: &[(&str, &str)]) -> serde_json::Value {
        let units: Vec<serde_json::Value> = self
            .units
            .iter()
            .map(|unit| {
                json!({
                    "name": unit.name,
                    "enabled": unit.enabled,
                    "contents": unit.render_with(replacements),
                })
            })
            .collect();
        json!({
            "ignition": {"version": IGNITION_VERSION},
            "systemd": {"units": units},
        })
    }
}
