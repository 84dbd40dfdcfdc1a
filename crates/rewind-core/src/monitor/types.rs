//! Classification types

use serde::{Deserialize, Serialize};

/// Why a tool was judged to modify files or not
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Built-in table or explicit declaration
    Declared(bool),
    /// Keyword and parameter signals above the confidence threshold
    Heuristic { modifies: bool, confidence: f32 },
    /// No trustworthy signal; configured default
    Default(bool),
}

impl Classification {
    pub fn modifies_files(&self) -> bool {
        match self {
            Self::Declared(modifies) | Self::Default(modifies) => *modifies,
            Self::Heuristic { modifies, .. } => *modifies,
        }
    }
}

/// What the monitor knows about a tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    /// Explicit declaration by the tool itself
    pub modifies_files: Option<bool>,
    pub description: Option<String>,
    /// Parameter names from the tool schema
    pub parameters: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn declaring(mut self, modifies_files: bool) -> Self {
        self.modifies_files = Some(modifies_files);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }
}
