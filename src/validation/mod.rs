//! Declarative request validation.
//!
//! A [`ValidationSchema`] is compiled once into a [`FieldValidator`] template. Every request
//! clones the template, feeds it the request data and evaluates it, so per-field state is
//! never shared between requests.

pub mod dates;
pub mod filters;
pub mod path;
pub mod required;
pub mod rules;
pub mod schema;

use crate::error::HttpError;
use crate::validation::filters::Filter;
use crate::validation::path::{resolve_field, write_field};
use crate::validation::required::RequiredRule;
use crate::validation::rules::Rule;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub use crate::validation::schema::{RuleArg, RuleArgs, RuleSpec, ValidationSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Rule,
    RequiredRule,
    Filter,
}

/// One failed check. Filter issues carry `filter`, rule issues carry `rule`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub(crate) fn new(
        key: impl Into<String>,
        kind: IssueKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let name = Some(name.into());
        let (rule, filter) = match kind {
            IssueKind::Filter => (None, name),
            _ => (name, None),
        };
        Self {
            key: key.into(),
            kind,
            rule,
            filter,
            message: message.into(),
        }
    }
}

/// What a rule sees of the running validation.
pub(crate) struct RuleContext<'a> {
    pub(crate) field: &'a str,
    pub(crate) fields: &'a Value,
    pub(crate) date_format: &'a mut Option<String>,
    pub(crate) required: &'a mut bool,
    pub(crate) issues: &'a mut Vec<ValidationIssue>,
}

impl RuleContext<'_> {
    pub(crate) fn add_error(&mut self, kind: IssueKind, name: &str, message: impl Into<String>) {
        self.issues
            .push(ValidationIssue::new(self.field, kind, name, message));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Rule(Rule),
    Required(RequiredRule),
    Invalid,
}

#[derive(Debug, Clone)]
struct RuleInvocation {
    name: String,
    kind: RuleKind,
    args: Vec<RuleArg>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
struct FilterInvocation {
    name: String,
    filter: Option<Filter>,
    args: Vec<RuleArg>,
}

/// Per-field state of one validation run.
#[derive(Debug, Clone)]
pub struct FieldState {
    field: String,
    value: Option<Value>,
    required: bool,
    date_format: Option<String>,
    rules: Vec<RuleInvocation>,
    before: Vec<FilterInvocation>,
    after: Vec<FilterInvocation>,
}

impl FieldState {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            value: None,
            required: false,
            date_format: None,
            rules: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn date_format(&self) -> Option<&str> {
        self.date_format.as_deref()
    }
}

/// A compiled validation schema plus the state of one run over request data.
#[derive(Debug, Clone, Default)]
pub struct FieldValidator {
    validations: Vec<FieldState>,
    fields: Value,
    errors: Vec<ValidationIssue>,
}

impl FieldValidator {
    /// Compiles a schema into a reusable template.
    ///
    /// # Behavior
    /// Rule names resolve to value rules first and required rules second; unknown names are
    /// kept and reported when the field is evaluated. Required rules move ahead of the
    /// value rules of their field. Fields appear in schema order, rule fields first.
    pub fn compile(schema: &ValidationSchema) -> Self {
        let mut validator = Self::default();
        for (field, spec) in schema.rules() {
            let index = validator.field_index(field);
            let state = &mut validator.validations[index];
            for entry in spec.entries() {
                let kind = match (Rule::from_name(&entry.name), RequiredRule::from_name(&entry.name)) {
                    (Some(rule), _) => RuleKind::Rule(rule),
                    (None, Some(required)) => RuleKind::Required(required),
                    (None, None) => RuleKind::Invalid,
                };
                let invocation = RuleInvocation {
                    name: entry.name.clone(),
                    kind,
                    args: entry.args.clone(),
                    message: message_for(schema.messages(), field, &entry.name),
                };
                if matches!(kind, RuleKind::Required(_)) {
                    state.required = true;
                    let position = state
                        .rules
                        .iter()
                        .take_while(|rule| matches!(rule.kind, RuleKind::Required(_)))
                        .count();
                    state.rules.insert(position, invocation);
                } else {
                    state.rules.push(invocation);
                }
            }
        }
        for (field, spec) in schema.before_filters() {
            let index = validator.field_index(field);
            validator.validations[index].before.extend(compile_filters(spec));
        }
        for (field, spec) in schema.after_filters() {
            let index = validator.field_index(field);
            validator.validations[index].after.extend(compile_filters(spec));
        }
        validator
    }

    fn field_index(&mut self, field: &str) -> usize {
        match self.validations.iter().position(|state| state.field == field) {
            Some(index) => index,
            None => {
                self.validations.push(FieldState::new(field));
                self.validations.len() - 1
            }
        }
    }

    /// Binds request data and resolves every field's value.
    pub fn prepare_data(&mut self, data: Value) {
        for state in &mut self.validations {
            state.value = resolve_field(&data, &state.field);
        }
        self.fields = data;
    }

    /// Evaluates every field. Returns `true` when no issue was recorded.
    pub fn validate(&mut self) -> bool {
        if self.fields.is_null() {
            self.fields = Value::Object(Map::new());
        }
        let Self {
            validations,
            fields,
            errors,
        } = self;
        for state in validations.iter_mut() {
            evaluate_field(state, fields, errors);
        }
        log::trace!(
            "Validated {} field(s), {} issue(s)",
            validations.len(),
            errors.len()
        );
        errors.is_empty()
    }

    pub fn validation_errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    /// Messages per field, joined with `\n`, fields in the order they first failed.
    pub fn error_message_info(&self) -> Vec<(String, String)> {
        let mut info: Vec<(String, String)> = Vec::new();
        for issue in &self.errors {
            match info.iter_mut().find(|(key, _)| *key == issue.key) {
                Some((_, message)) => {
                    message.push('\n');
                    message.push_str(&issue.message);
                }
                None => info.push((issue.key.clone(), issue.message.clone())),
            }
        }
        info
    }

    pub fn fields(&self) -> &[FieldState] {
        &self.validations
    }

    /// The request data, including values rewritten by filters.
    pub fn data(&self) -> &Value {
        &self.fields
    }

    pub fn take_data(&mut self) -> Value {
        std::mem::take(&mut self.fields)
    }
}

fn message_for(messages: &HashMap<String, String>, field: &str, rule: &str) -> Option<String> {
    messages
        .get(&format!("{field}.{rule}"))
        .or_else(|| messages.get(rule))
        .map(|message| message.replacen(":attribute", field, 1))
}

fn compile_filters(spec: &RuleSpec) -> impl Iterator<Item = FilterInvocation> + '_ {
    spec.entries().iter().map(|entry| FilterInvocation {
        name: entry.name.clone(),
        filter: Filter::from_name(&entry.name),
        args: entry.args.clone(),
    })
}

/// Runs before-filters, rules and after-filters for one field, stopping at the first
/// failing step.
fn evaluate_field(state: &mut FieldState, fields: &mut Value, errors: &mut Vec<ValidationIssue>) {
    let mut proceed = state.required || state.value.is_some();

    if state.value.is_some() && !run_filters(&state.field, &mut state.value, &state.before, fields, errors) {
        return;
    }
    if !proceed {
        return;
    }

    for rule in &state.rules {
        let args = RuleArgs::unwrap(&rule.args);
        let mut ctx = RuleContext {
            field: &state.field,
            fields: &*fields,
            date_format: &mut state.date_format,
            required: &mut state.required,
            issues: &mut *errors,
        };
        let value = state.value.as_ref();
        let message = rule.message.as_deref();
        proceed = match rule.kind {
            RuleKind::Rule(check) => check.check(&mut ctx, value, args, message),
            RuleKind::Required(check) => {
                check.check(&mut ctx, value, args, message)
                    && (state.required || !crate::value::is_empty_value(value))
            }
            RuleKind::Invalid => {
                ctx.add_error(
                    IssueKind::Rule,
                    &rule.name,
                    format!("Invalid Validation Rule: {} does not exist", rule.name),
                );
                false
            }
        };
        if !proceed {
            return;
        }
    }

    if state.value.is_some() {
        run_filters(&state.field, &mut state.value, &state.after, fields, errors);
    }
}

/// Applies filters in order and writes each result back into the request data.
/// Returns `false` when a filter failed or is unknown.
fn run_filters(
    field: &str,
    value: &mut Option<Value>,
    filters: &[FilterInvocation],
    fields: &mut Value,
    errors: &mut Vec<ValidationIssue>,
) -> bool {
    for invocation in filters {
        let Some(filter) = invocation.filter else {
            errors.push(ValidationIssue::new(
                field,
                IssueKind::Filter,
                &invocation.name,
                format!("Invalid filter: {} does not exist", invocation.name),
            ));
            return false;
        };
        let Some(current) = value.as_ref() else {
            return false;
        };
        let filtered = if field.contains(path::WILDCARD) {
            filter_elements(filter, field, current, &invocation.args, errors)
        } else {
            filter.apply(field, current, &invocation.args, errors)
        };
        match filtered {
            Some(filtered) => {
                write_field(fields, field, filtered.clone());
                *value = Some(filtered);
            }
            None => {
                *value = None;
                return false;
            }
        }
    }
    true
}

fn filter_elements(
    filter: Filter,
    field: &str,
    current: &Value,
    args: &[RuleArg],
    errors: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    match current {
        Value::Array(items) => items
            .iter()
            .map(|item| filter.apply(field, item, args, errors))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        other => filter.apply(field, other, args, errors),
    }
}

/// Validates `data` against a compiled template and returns the (filtered) data.
///
/// # Errors
/// A 422 [`HttpError`] carrying one joined message per failed field.
pub fn validate_request(template: &FieldValidator, data: Value) -> Result<Value, HttpError> {
    let mut validator = template.clone();
    validator.prepare_data(data);
    if !validator.validate() {
        log::debug!(
            "Request validation failed: {:?}",
            validator.validation_errors()
        );
        return Err(HttpError::validation(validator.error_message_info()));
    }
    Ok(validator.take_data())
}
