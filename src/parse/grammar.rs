use winnow::ascii::{dec_int, till_line_ending};
use winnow::combinator::{alt, cut_err, delimited, fail, opt, preceded, repeat, separated};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::{CompareOp, ConditionDescriptor, FieldConfig, FieldKind, RuleConfig, Severity, Value};

use super::parser::ParsedConfig;

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

fn expected<O>(input: &mut &str, what: &'static str) -> ModalResult<O> {
    cut_err(fail)
        .context(StrContext::Expected(StrContextValue::Description(what)))
        .parse_next(input)
}

// -- Identifiers ------------------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    )
        .take()
        .parse_next(input)
}

// -- Values -----------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        match any.parse_next(input)? {
            '"' => return Ok(s),
            '\\' => match any.parse_next(input)? {
                '"' => s.push('"'),
                '\\' => s.push('\\'),
                'n' => s.push('\n'),
                't' => s.push('\t'),
                '{' => s.push('{'),
                other => {
                    s.push('\\');
                    s.push(other);
                }
            },
            c => s.push(c),
        }
    }
}

fn string_arg(input: &mut &str) -> ModalResult<String> {
    preceded(ws, cut_err(string_literal))
        .context(StrContext::Expected(StrContextValue::Description("quoted string")))
        .parse_next(input)
}

fn negative_number(input: &mut &str) -> ModalResult<Value> {
    let text = ('-', take_while(1.., |c: char| c.is_ascii_digit() || c == '.'))
        .take()
        .parse_next(input)?;
    if text.contains('.') {
        let f: f64 = text.parse().map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Value::Float(f))
    } else {
        let i: i64 = text.parse().map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Value::Int(i))
    }
}

fn float_literal(input: &mut &str) -> ModalResult<f64> {
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        '.',
        take_while(1.., |c: char| c.is_ascii_digit()),
    )
        .take()
        .try_map(|s: &str| s.parse::<f64>())
        .parse_next(input)
}

/// Operator symbols are accepted bare so `op = >=` reads naturally.
fn compare_op(input: &mut &str) -> ModalResult<CompareOp> {
    alt((
        ">=".value(CompareOp::Gte),
        ">".value(CompareOp::Gt),
        "<=".value(CompareOp::Lte),
        "<".value(CompareOp::Lt),
        "==".value(CompareOp::Eq),
        "!=".value(CompareOp::Neq),
    ))
    .parse_next(input)
}

fn list(input: &mut &str) -> ModalResult<Vec<Value>> {
    delimited(
        '[',
        separated(0.., value, (ws, ',')),
        (ws, cut_err(']')),
    )
    .parse_next(input)
}

fn value(input: &mut &str) -> ModalResult<Value> {
    ws.parse_next(input)?;
    alt((
        string_literal.map(Value::String),
        "true".value(Value::Bool(true)),
        "false".value(Value::Bool(false)),
        compare_op.map(|op| Value::String(op.to_string())),
        list.map(Value::List),
        negative_number,
        float_literal.map(Value::Float),
        dec_int::<_, i64, _>.map(Value::Int),
    ))
    .context(StrContext::Expected(StrContextValue::Description("value")))
    .parse_next(input)
}

// -- Conditions ---------------------------------------------------------------

enum Arg {
    Param(String, Value),
    Child(ConditionDescriptor),
}

fn named_param(input: &mut &str) -> ModalResult<Arg> {
    let (name, _, _) = (ident, ws, '=').parse_next(input)?;
    let v = cut_err(value).parse_next(input)?;
    Ok(Arg::Param(name.to_owned(), v))
}

fn argument(input: &mut &str) -> ModalResult<Arg> {
    ws.parse_next(input)?;
    alt((named_param, condition.map(Arg::Child))).parse_next(input)
}

/// `Type` or `Type(name = value, Child(..), ...)`.
fn condition(input: &mut &str) -> ModalResult<ConditionDescriptor> {
    ws.parse_next(input)?;
    let name = ident
        .context(StrContext::Expected(StrContextValue::Description("condition type")))
        .parse_next(input)?;
    let mut descriptor = ConditionDescriptor::new(name);
    let args: Option<Vec<Arg>> = opt(delimited(
        (ws, '('),
        separated(0.., argument, (ws, ',')),
        (ws, cut_err(')')),
    ))
    .parse_next(input)?;
    for arg in args.unwrap_or_default() {
        match arg {
            Arg::Param(key, v) => {
                descriptor.params.insert(key, v);
            }
            Arg::Child(child) => descriptor.children.push(child),
        }
    }
    Ok(descriptor)
}

// -- Rules ------------------------------------------------------------------

fn severity(input: &mut &str) -> ModalResult<Severity> {
    ws.parse_next(input)?;
    alt((
        "warning".value(Severity::Warning),
        "error".value(Severity::Error),
        "severe".value(Severity::Severe),
    ))
    .context(StrContext::Expected(StrContextValue::Description("severity")))
    .parse_next(input)
}

fn rule_setting(input: &mut &str) -> ModalResult<Box<dyn FnOnce(RuleConfig) -> RuleConfig>> {
    ws.parse_next(input)?;
    let checkpoint = input.checkpoint();
    let key = ident.parse_next(input)?;
    let apply: Box<dyn FnOnce(RuleConfig) -> RuleConfig> = match key {
        "code" => {
            let code = string_arg(input)?;
            Box::new(move |r: RuleConfig| r.code(&code))
        }
        "severity" => {
            let s = cut_err(severity).parse_next(input)?;
            Box::new(move |r: RuleConfig| r.severity(s))
        }
        "message" => {
            let m = string_arg(input)?;
            Box::new(move |r: RuleConfig| r.message(m))
        }
        "message_key" => {
            let k = string_arg(input)?;
            Box::new(move |r: RuleConfig| r.message_key(&k))
        }
        "summary" => {
            let m = string_arg(input)?;
            Box::new(move |r: RuleConfig| r.summary(m))
        }
        "summary_key" => {
            let k = string_arg(input)?;
            Box::new(move |r: RuleConfig| r.summary_key(&k))
        }
        "when" => {
            let enabler = cut_err(condition).parse_next(input)?;
            Box::new(move |r: RuleConfig| r.enabler(enabler))
        }
        "disabled" => Box::new(|r: RuleConfig| r.enabled(false)),
        _ => {
            input.reset(&checkpoint);
            return expected(input, "rule setting");
        }
    };
    Ok(apply)
}

fn rule_def(input: &mut &str) -> ModalResult<RuleConfig> {
    let descriptor = cut_err(condition).parse_next(input)?;
    let settings: Option<Vec<_>> = opt(delimited(
        (ws, '{'),
        repeat(0.., rule_setting),
        (ws, cut_err('}')),
    ))
    .parse_next(input)?;
    Ok(settings
        .unwrap_or_default()
        .into_iter()
        .fold(RuleConfig::new(descriptor), |rule, apply| apply(rule)))
}

// -- Fields -----------------------------------------------------------------

fn field_setting(input: &mut &str) -> ModalResult<Box<dyn FnOnce(FieldConfig) -> FieldConfig>> {
    ws.parse_next(input)?;
    let checkpoint = input.checkpoint();
    let key = ident.parse_next(input)?;
    let apply: Box<dyn FnOnce(FieldConfig) -> FieldConfig> = match key {
        "label" => {
            let label = string_arg(input)?;
            Box::new(move |f: FieldConfig| f.label(&label))
        }
        "group" => {
            let group = string_arg(input)?;
            Box::new(move |f: FieldConfig| f.group(&group))
        }
        "data_type" => {
            let data_type = string_arg(input)?;
            Box::new(move |f: FieldConfig| f.data_type(&data_type))
        }
        "initial" => {
            let v = cut_err(value).parse_next(input)?;
            Box::new(move |f: FieldConfig| f.initial_value(v))
        }
        "disabled" => Box::new(FieldConfig::disabled),
        "rule" => {
            let rule = rule_def(input)?;
            Box::new(move |f: FieldConfig| f.rule(rule))
        }
        _ => {
            input.reset(&checkpoint);
            return expected(input, "field setting");
        }
    };
    Ok(apply)
}

fn field_kind(input: &mut &str) -> ModalResult<FieldKind> {
    let checkpoint = input.checkpoint();
    let keyword = ident.parse_next(input)?;
    match keyword {
        "input" => Ok(FieldKind::Input),
        "property" => Ok(FieldKind::Property),
        "static" => Ok(FieldKind::Static),
        _ => {
            input.reset(&checkpoint);
            expected(input, "`input`, `property` or `static`")
        }
    }
}

/// `kind Name [: data_type] [= initial] [{ settings }]`
fn field_def(input: &mut &str) -> ModalResult<FieldConfig> {
    ws.parse_next(input)?;
    let kind = field_kind.parse_next(input)?;
    ws.parse_next(input)?;
    let name = cut_err(ident)
        .context(StrContext::Expected(StrContextValue::Description("field name")))
        .parse_next(input)?;
    let mut config = FieldConfig::new(name, kind);

    if let Some(data_type) = opt(preceded((ws, ':', ws), cut_err(ident))).parse_next(input)? {
        config = config.data_type(data_type);
    }
    if let Some(initial) = opt(preceded((ws, '='), cut_err(value))).parse_next(input)? {
        config = config.initial_value(initial);
    }
    let settings: Option<Vec<_>> = opt(delimited(
        (ws, '{'),
        repeat(0.., field_setting),
        (ws, cut_err('}')),
    ))
    .parse_next(input)?;
    Ok(settings
        .unwrap_or_default()
        .into_iter()
        .fold(config, |config, apply| apply(config)))
}

// -- Top-level parser -------------------------------------------------------

pub fn parse_config(input: &mut &str) -> ModalResult<ParsedConfig> {
    let fields: Vec<FieldConfig> = repeat(0.., field_def).parse_next(input)?;
    ws.parse_next(input)?;
    Ok(ParsedConfig { fields })
}
