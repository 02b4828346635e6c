// Path: crates/mandate-policy/src/rules.rs

//! The rule evaluator (§4.4 "Rule language"). Total over [`Rule`]: there is
//! no operator outside the closed set, so evaluation never needs an
//! "unknown operator" error path. Unknown variables evaluate to `null`,
//! comparisons against `null` are `false`, arithmetic on non-numeric values
//! is `null`, and division by zero is `null`.

use mandate_types::policy::Rule;
use serde_json::Value;

/// Evaluates `rule` against `context`, a JSON document built by
/// [`crate::context`]. Never panics and never returns an error: every
/// malformed or partial input has a defined `null`/`false` result.
pub fn eval(rule: &Rule, context: &Value) -> Value {
    match rule {
        Rule::Lit { value } => value.clone(),
        Rule::Var { path } => lookup_path(path, context),
        Rule::Eq { args } => Value::Bool(eq_all(args, context)),
        Rule::Ne { args } => Value::Bool(!eq_all(args, context)),
        Rule::Lt { args } => Value::Bool(cmp_chain(args, context, |a, b| a < b)),
        Rule::Lte { args } => Value::Bool(cmp_chain(args, context, |a, b| a <= b)),
        Rule::Gt { args } => Value::Bool(cmp_chain(args, context, |a, b| a > b)),
        Rule::Gte { args } => Value::Bool(cmp_chain(args, context, |a, b| a >= b)),
        Rule::And { args } => Value::Bool(args.iter().all(|a| truthy(&eval(a, context)))),
        Rule::Or { args } => Value::Bool(args.iter().any(|a| truthy(&eval(a, context)))),
        Rule::Not { arg } => Value::Bool(!truthy(&eval(arg, context))),
        Rule::In { needle, haystack } => Value::Bool(is_in(&eval(needle, context), &eval(haystack, context))),
        Rule::NotIn { needle, haystack } => {
            Value::Bool(!is_in(&eval(needle, context), &eval(haystack, context)))
        }
        Rule::Add { args } => fold_numeric(args, context, 0.0, |a, b| a + b),
        Rule::Sub { args } => fold_numeric_non_empty(args, context, |a, b| a - b),
        Rule::Mul { args } => fold_numeric(args, context, 1.0, |a, b| a * b),
        Rule::Div { args } => div_chain(args, context),
        Rule::Some { array, predicate } => Value::Bool(
            as_array(&eval(array, context))
                .iter()
                .any(|item| truthy(&eval(predicate, item))),
        ),
        Rule::All { array, predicate } => Value::Bool(
            as_array(&eval(array, context))
                .iter()
                .all(|item| truthy(&eval(predicate, item))),
        ),
        Rule::If { cond, then, else_ } => {
            if truthy(&eval(cond, context)) {
                eval(then, context)
            } else {
                eval(else_, context)
            }
        }
    }
}

/// JSON-logic-style truthiness: `null`, `false`, `0`, `""`, and empty
/// arrays/objects are falsy; everything else is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Dotted-path lookup (`merchant.category`) into a JSON object. Missing
/// segments or a non-object intermediate both yield `null`.
pub fn lookup_path(path: &str, context: &Value) -> Value {
    if path.is_empty() {
        return context.clone();
    }
    let mut current = context;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn as_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

fn eq_all(args: &[Rule], context: &Value) -> bool {
    let values: Vec<Value> = args.iter().map(|a| eval(a, context)).collect();
    values.windows(2).all(|pair| values_equal(&pair[0], &pair[1]))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn cmp_chain(args: &[Rule], context: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    let values: Vec<Option<f64>> = args.iter().map(|a| as_number(&eval(a, context))).collect();
    if values.iter().any(|v| v.is_none()) {
        return false;
    }
    values
        .windows(2)
        .all(|pair| match (pair[0], pair[1]) {
            (Some(a), Some(b)) => op(a, b),
            _ => false,
        })
}

fn is_in(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            _ => false,
        },
        Value::Object(map) => match needle {
            Value::String(key) => map.contains_key(key),
            _ => false,
        },
        _ => false,
    }
}

fn fold_numeric(args: &[Rule], context: &Value, identity: f64, op: impl Fn(f64, f64) -> f64) -> Value {
    let mut acc = identity;
    for arg in args {
        match as_number(&eval(arg, context)) {
            Some(n) => acc = op(acc, n),
            None => return Value::Null,
        }
    }
    Value::from(acc)
}

fn fold_numeric_non_empty(args: &[Rule], context: &Value, op: impl Fn(f64, f64) -> f64) -> Value {
    let mut values = args.iter().map(|a| as_number(&eval(a, context)));
    let Some(Some(first)) = values.next() else {
        return Value::Null;
    };
    let mut acc = first;
    for next in values {
        match next {
            Some(n) => acc = op(acc, n),
            None => return Value::Null,
        }
    }
    Value::from(acc)
}

fn div_chain(args: &[Rule], context: &Value) -> Value {
    let mut values = args.iter().map(|a| as_number(&eval(a, context)));
    let Some(Some(first)) = values.next() else {
        return Value::Null;
    };
    let mut acc = first;
    for next in values {
        match next {
            Some(n) if n != 0.0 => acc /= n,
            _ => return Value::Null,
        }
    }
    Value::from(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn var(path: &str) -> Rule {
        Rule::Var { path: path.to_string() }
    }
    fn lit(v: Value) -> Rule {
        Rule::Lit { value: v }
    }

    #[test]
    fn var_resolves_dotted_path() {
        let ctx = json!({ "merchant": { "category": "office-supplies" } });
        assert_eq!(eval(&var("merchant.category"), &ctx), json!("office-supplies"));
    }

    #[test]
    fn unknown_var_is_null() {
        let ctx = json!({});
        assert_eq!(eval(&var("nope.nested"), &ctx), Value::Null);
    }

    #[test]
    fn comparison_against_null_is_false() {
        let ctx = json!({});
        let rule = Rule::Gt { args: vec![var("missing"), lit(json!(10))] };
        assert_eq!(eval(&rule, &ctx), json!(false));
    }

    #[test]
    fn gt_chain_evaluates_numerically() {
        let ctx = json!({ "amount": 150.0 });
        let rule = Rule::Gt { args: vec![var("amount"), lit(json!(100))] };
        assert_eq!(eval(&rule, &ctx), json!(true));
    }

    #[test]
    fn division_by_zero_is_null() {
        let rule = Rule::Div { args: vec![lit(json!(10)), lit(json!(0))] };
        assert_eq!(eval(&rule, &json!({})), Value::Null);
    }

    #[test]
    fn and_short_circuits_on_falsy() {
        let ctx = json!({ "amount": 10.0 });
        let rule = Rule::And {
            args: vec![
                Rule::Gt { args: vec![var("amount"), lit(json!(5))] },
                Rule::Lt { args: vec![var("amount"), lit(json!(1))] },
            ],
        };
        assert_eq!(eval(&rule, &ctx), json!(false));
    }

    #[test]
    fn in_checks_array_membership() {
        let ctx = json!({ "category": "travel" });
        let rule = Rule::In {
            needle: Box::new(var("category")),
            haystack: Box::new(lit(json!(["travel", "meals"]))),
        };
        assert_eq!(eval(&rule, &ctx), json!(true));
    }

    #[test]
    fn all_over_array_of_objects() {
        let ctx = json!({ "items": [{ "amount": 10 }, { "amount": 20 }] });
        let rule = Rule::All {
            array: Box::new(var("items")),
            predicate: Box::new(Rule::Lt { args: vec![var("amount"), lit(json!(100))] }),
        };
        assert_eq!(eval(&rule, &ctx), json!(true));
    }

    #[test]
    fn if_picks_branch_by_condition() {
        let ctx = json!({ "amount": 500.0 });
        let rule = Rule::If {
            cond: Box::new(Rule::Gte { args: vec![var("amount"), lit(json!(100))] }),
            then: Box::new(lit(json!("high"))),
            else_: Box::new(lit(json!("low"))),
        };
        assert_eq!(eval(&rule, &ctx), json!("high"));
    }
}
