//! Multi-step wizard over a form schema.
//!
//! The only mutable state is the current step index, always within
//! `0..steps.len()`. Forward moves are gated on the current step's fields;
//! backward moves are free and never validate. Advancing past the last step
//! does not move the pointer: it asks for submission instead.

use serde::Serialize;

use crate::models::Record;
use crate::schema::{self, FormSchema, ValidatedRecord, ValidationErrors};

/// Step name used when a schema declares no steps.
const SINGLE_STEP: &str = "form";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardStep {
    pub name: &'static str,
    pub fields: Vec<&'static str>,
}

/// Result of `Wizard::advance`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepTransition {
    Moved { from: usize, to: usize },
    /// Pointer unchanged; errors for the fields that failed.
    Blocked(ValidationErrors),
    /// Last step and the whole record validates. Hand it to persistence.
    Submit(ValidatedRecord),
}

#[derive(Debug, Clone)]
pub struct Wizard {
    steps: Vec<WizardStep>,
    current: usize,
}

impl Wizard {
    pub fn new(schema: &FormSchema) -> Self {
        let mut steps: Vec<WizardStep> = schema
            .steps
            .iter()
            .map(|&name| WizardStep {
                name,
                fields: schema.fields_in_step(name).map(|spec| spec.name).collect(),
            })
            .collect();

        if steps.is_empty() {
            steps.push(WizardStep {
                name: SINGLE_STEP,
                fields: schema.fields.iter().map(|spec| spec.name).collect(),
            });
        }

        Self { steps, current: 0 }
    }

    pub fn steps(&self) -> &[WizardStep] {
        &self.steps
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &WizardStep {
        &self.steps[self.current]
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.steps.len()
    }

    /// Validate the current step; move forward on success. On the last
    /// step, validate the full record instead.
    pub fn advance(&mut self, record: &Record, schema: &FormSchema) -> StepTransition {
        if self.is_last() {
            return match schema::validate(record, schema) {
                Ok(validated) => StepTransition::Submit(validated),
                Err(errors) => {
                    tracing::debug!(errors = errors.len(), "Final validation failed");
                    StepTransition::Blocked(errors)
                }
            };
        }

        let step = &self.steps[self.current];
        match schema::validate_fields(record, schema, &step.fields) {
            Ok(()) => {
                let from = self.current;
                self.current += 1;
                tracing::debug!(from, to = self.current, "Wizard advanced");
                StepTransition::Moved { from, to: self.current }
            }
            Err(errors) => {
                tracing::debug!(step = step.name, errors = errors.len(), "Step blocked");
                StepTransition::Blocked(errors)
            }
        }
    }

    /// Step back one. `false` only at the first step.
    pub fn retreat(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        true
    }

    /// Jump to an already-visited step. Forward jumps are ignored.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index > self.current {
            return false;
        }
        self.current = index;
        true
    }

    pub fn jump_to_named(&mut self, name: &str) -> bool {
        match self.steps.iter().position(|s| s.name == name) {
            Some(index) => self.jump_to(index),
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}
