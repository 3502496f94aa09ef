//! Male and female measurement partitions.
//!
//! Both categories share one code path; each keeps its own definition and
//! detail tables so the data never mixes.

use serde::{Deserialize, Serialize};

use crate::db::FormType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Male,
    Female,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Male, Category::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Male => "male",
            Category::Female => "female",
        }
    }

    /// Table holding this category's measurement definitions
    pub fn definitions_table(&self) -> &'static str {
        match self {
            Category::Male => "male_measurements",
            Category::Female => "female_measurements",
        }
    }

    /// Table holding this category's measured values
    pub fn details_table(&self) -> &'static str {
        match self {
            Category::Male => "male_details",
            Category::Female => "female_details",
        }
    }

    /// Reference name and form link type for this category
    pub fn form_type(&self) -> FormType {
        match self {
            Category::Male => FormType::Male,
            Category::Female => FormType::Female,
        }
    }
}

impl From<FormType> for Category {
    fn from(form_type: FormType) -> Self {
        match form_type {
            FormType::Male => Category::Male,
            FormType::Female => Category::Female,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Category::Male),
            "female" => Ok(Category::Female),
            _ => Err(format!("Unknown measurement category: {}", s)),
        }
    }
}
