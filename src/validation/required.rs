use crate::validation::rules::coerced_equal;
use crate::validation::schema::{RuleArg, RuleArgs};
use crate::validation::{IssueKind, RuleContext};
use crate::value::is_empty_value;
use serde_json::Value;

/// Rules deciding whether a field must be present. They always run before the value rules
/// of the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredRule {
    Required,
    RequiredIf,
    RequiredNotIf,
    RequiredWith,
    RequiredWithout,
    RequiredWithAll,
    RequiredWithoutAll,
}

impl RequiredRule {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "required" => RequiredRule::Required,
            "requiredIf" => RequiredRule::RequiredIf,
            "requiredNotIf" => RequiredRule::RequiredNotIf,
            "requiredWith" => RequiredRule::RequiredWith,
            "requiredWithout" => RequiredRule::RequiredWithout,
            "requiredWithAll" => RequiredRule::RequiredWithAll,
            "requiredWithoutAll" => RequiredRule::RequiredWithoutAll,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            RequiredRule::Required => "required",
            RequiredRule::RequiredIf => "requiredIf",
            RequiredRule::RequiredNotIf => "requiredNotIf",
            RequiredRule::RequiredWith => "requiredWith",
            RequiredRule::RequiredWithout => "requiredWithout",
            RequiredRule::RequiredWithAll => "requiredWithAll",
            RequiredRule::RequiredWithoutAll => "requiredWithoutAll",
        }
    }

    pub fn takes_args(self) -> bool {
        self != RequiredRule::Required
    }

    /// Decides whether the field is required, records the decision on the field and
    /// fails when a required field is empty.
    ///
    /// # Behavior
    /// - `requiredIf`/`requiredNotIf` take `field, value` pairs; the field is required when
    ///   every named field is non-empty and equals (or, for `NotIf`, differs from) its value.
    /// - `requiredWith` requires the field when any named field is non-empty,
    ///   `requiredWithAll` when all are; `requiredWithout` when any named field is empty,
    ///   `requiredWithoutAll` when all are.
    ///
    /// Named fields are read as top-level keys of the request data.
    pub(crate) fn check(
        self,
        ctx: &mut RuleContext<'_>,
        value: Option<&Value>,
        args: RuleArgs<'_>,
        message: Option<&str>,
    ) -> bool {
        let field = ctx.field.to_string();
        let fail = |ctx: &mut RuleContext<'_>, default: String| {
            let message = message.map(str::to_string).unwrap_or(default);
            ctx.add_error(IssueKind::RequiredRule, self.name(), message);
            false
        };
        let mandatory = format!("Field '{field}' is mandatory.");

        if self == RequiredRule::Required {
            return if is_empty_value(value) { fail(ctx, mandatory) } else { true };
        }

        let args = args.as_list();
        let need_required = match self {
            RequiredRule::RequiredIf | RequiredRule::RequiredNotIf => {
                if args.len() < 2 {
                    return fail(ctx, format!("Field '{field}' required a minimum of two arguments"));
                }
                if args.len() % 2 != 0 {
                    return fail(
                        ctx,
                        format!(
                            "Field '{field}' has an incorrect number of arguments. The arguments length needs to be a multiple of 2"
                        ),
                    );
                }
                if args.chunks(2).any(|pair| pair[0].to_js_string() == field) {
                    return fail(
                        ctx,
                        format!("Field '{field}' needs to contain another field name in the args."),
                    );
                }
                let negate = self == RequiredRule::RequiredNotIf;
                args.chunks(2).all(|pair| {
                    let other = sibling(ctx.fields, &pair[0]);
                    let expected = pair[1].to_value();
                    !is_empty_value(other)
                        && other.is_some_and(|other| coerced_equal(other, &expected) != negate)
                })
            }
            _ => {
                if args.is_empty() {
                    return fail(
                        ctx,
                        format!("Field '{field}' requires at least one other field in the argument"),
                    );
                }
                let mut present = args.iter().map(|arg| !is_empty_value(sibling(ctx.fields, arg)));
                match self {
                    RequiredRule::RequiredWith => present.any(|present| present),
                    RequiredRule::RequiredWithAll => present.all(|present| present),
                    RequiredRule::RequiredWithout => present.any(|present| !present),
                    _ => present.all(|present| !present),
                }
            }
        };

        *ctx.required = need_required;
        if need_required && is_empty_value(value) {
            return fail(ctx, mandatory);
        }
        true
    }
}

fn sibling<'a>(fields: &'a Value, name: &RuleArg) -> Option<&'a Value> {
    fields.get(name.to_js_string())
}
