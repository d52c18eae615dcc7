//! Recipes ("books"): titled, ordered lists of instructions.
//!
//! Raw records are deserialized first and turned into `Instruction` values in a
//! separate validation step, so nothing malformed ever reaches the dispatcher.

use std::collections::HashSet;
use std::fs::File;
use std::slice;

use serde::Deserialize;

use crate::error::RaccoonError;
use crate::instruction::Instruction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub title: String,
    pub maintainer: String,
    instructions: Vec<Instruction>,
}

impl Recipe {
    pub fn new(title: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            title: title.into(),
            maintainer: String::new(),
            instructions,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl<'a> IntoIterator for &'a Recipe {
    type Item = &'a Instruction;
    type IntoIter = slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookSpec {
    #[serde(default, alias = "book_title")]
    title: String,
    #[serde(default)]
    maintainer: String,
    #[serde(default, alias = "commands")]
    instructions: Vec<InstructionSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstructionSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    instruction: Option<String>,
    source_path: Option<String>,
    dest_path: Option<String>,
    /// Render host values into the command or destination.
    #[serde(default)]
    template: bool,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl InstructionSpec {
    fn build(self, book: &str, index: usize) -> Result<Instruction, String> {
        let context = || format!("Instruction {} of recipe '{}'", index, book);
        let template = self.template;
        let instruction = match self.name.as_str() {
            "RUN" => {
                let command = required(self.instruction)
                    .ok_or_else(|| format!("{} (RUN) has no 'instruction'", context()))?;
                Instruction::run(self.description, command)
            }
            "ADD" => {
                let source = required(self.source_path)
                    .ok_or_else(|| format!("{} (ADD) has no 'sourcePath'", context()))?;
                let dest = required(self.dest_path)
                    .ok_or_else(|| format!("{} (ADD) has no 'destPath'", context()))?;
                Instruction::add(self.description, source, dest)
            }
            other => return Err(format!("{} has unknown name '{}'", context(), other)),
        };
        Ok(if template {
            instruction.templated()
        } else {
            instruction
        })
    }
}

/// Parse a YAML (or JSON) list of recipes.
pub fn parse_recipes(contents: &str) -> Result<Vec<Recipe>, RaccoonError> {
    let specs: Vec<BookSpec> = serde_yaml::from_str(contents).map_err(|e| RaccoonError::Parse {
        path: "<recipes>".to_string(),
        source: Box::new(e),
    })?;
    build_recipes(specs)
}

pub fn load_recipes(path: &str) -> Result<Vec<Recipe>, RaccoonError> {
    let file = File::open(path).map_err(|e| RaccoonError::Parse {
        path: path.to_string(),
        source: Box::new(e),
    })?;
    let specs: Vec<BookSpec> = serde_yaml::from_reader(file).map_err(|e| RaccoonError::Parse {
        path: path.to_string(),
        source: Box::new(e),
    })?;
    build_recipes(specs)
}

pub(crate) fn build_recipes(specs: Vec<BookSpec>) -> Result<Vec<Recipe>, RaccoonError> {
    let mut errors = vec![];
    let mut titles = HashSet::new();
    let mut recipes = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.title.trim().is_empty() {
            errors.push("Recipe title can't be blank".to_string());
        } else if !titles.insert(spec.title.clone()) {
            errors.push(format!("Recipe '{}' is defined more than once", spec.title));
        }
        let mut instructions = Vec::with_capacity(spec.instructions.len());
        for (index, raw) in spec.instructions.into_iter().enumerate() {
            match raw.build(&spec.title, index) {
                Ok(instruction) => instructions.push(instruction),
                Err(error) => errors.push(error),
            }
        }
        recipes.push(Recipe {
            title: spec.title,
            maintainer: spec.maintainer,
            instructions,
        });
    }

    if !errors.is_empty() {
        for error in &errors {
            tracing::error!(component = "parser", "{}", error);
        }
        return Err(RaccoonError::Invalid(errors));
    }
    Ok(recipes)
}
