//! The `${name[,default]}` token-expansion grammar (spec §4.1 / §9 "Macro
//! expansion: preserve the grammar ... as a standalone, pure function; test
//! it in isolation").
//!
//! Grammar, scanned left to right over the raw string:
//!
//! - `\$` is a literal `$` and is never treated as the start of a token.
//! - `${...}` opens a token; its contents run to the matching `}`, where
//!   nesting is tracked so a default value may itself contain `${...}`.
//! - Inside a token, a top-level `,` splits `name` from `default`; `default`
//!   is expanded recursively before being used, so defaults may reference
//!   other variables.
//! - `fn(arg)` where `fn` is one of `eval`, `expr`, `intexpr` evaluates `arg`
//!   (after expanding it) as a numeric expression over `+ - * / ( )` and
//!   decimal literals; `intexpr` truncates the result towards zero.
//! - Anything else is a plain variable name, looked up in `vars`.

use std::collections::BTreeMap;

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("unterminated ${{...}} token starting at byte {offset}"))]
    Unterminated { offset: usize },

    #[snafu(display("undefined variable {name:?}"))]
    UndefinedVariable { name: String },

    #[snafu(display("failed to evaluate numeric expression {expr:?}"))]
    Expression { expr: String },
}

/// Expands every `${...}` token in `input` against `vars`.
pub fn expand(input: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'$') => {
                out.push('$');
                i += 2;
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let (token, next) = read_token(input, i + 2)?;
                out.push_str(&expand_token(&token, vars)?);
                i = next;
            }
            _ => {
                // Advance by one UTF-8 char, not one byte.
                let ch = input[i..].chars().next().expect("valid utf-8 boundary");
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    Ok(out)
}

/// Reads the balanced `${...}` body starting right after `${`, returning the
/// raw (unexpanded) contents and the byte offset just past the closing `}`.
fn read_token(input: &str, start: usize) -> Result<(String, usize)> {
    let bytes = input.as_bytes();
    let mut depth = 1usize;
    let mut i = start;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'}' {
            depth -= 1;
            if depth == 0 {
                return Ok((input[start..i].to_string(), i + 1));
            }
            i += 1;
            continue;
        }
        i += 1;
    }

    UnterminatedSnafu { offset: start }.fail()
}

/// Splits `name,default` on the first top-level comma (not nested inside
/// another `${...}`).
fn split_name_default(token: &str) -> (&str, Option<&str>) {
    let bytes = token.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                i += 1;
                continue;
            }
            b',' if depth == 0 => return (&token[..i], Some(&token[i + 1..])),
            _ => {}
        }
        i += 1;
    }

    (token, None)
}

fn expand_token(token: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    if let Some(call) = parse_function_call(token) {
        let (func, arg) = call;
        let expanded_arg = expand(arg, vars)?;
        return evaluate_function(func, &expanded_arg);
    }

    let (name, default) = split_name_default(token);
    if let Some(value) = vars.get(name) {
        return Ok(value.clone());
    }

    match default {
        Some(default) => expand(default, vars),
        None => UndefinedVariableSnafu {
            name: name.to_string(),
        }
        .fail(),
    }
}

/// Recognises `fn(arg)` where `fn` is one of the built-ins, with no nested
/// top-level comma (a bare default-value comma would not parse as a call).
fn parse_function_call(token: &str) -> Option<(&str, &str)> {
    let open = token.find('(')?;
    if !token.ends_with(')') {
        return None;
    }
    let name = &token[..open];
    if !matches!(name, "eval" | "expr" | "intexpr") {
        return None;
    }
    let arg = &token[open + 1..token.len() - 1];
    Some((name, arg))
}

fn evaluate_function(func: &str, arg: &str) -> Result<String> {
    let value = eval_expr(arg).map_err(|()| Error::Expression {
        expr: arg.to_string(),
    })?;
    Ok(match func {
        "intexpr" => format!("{}", value.trunc() as i64),
        _ => format_number(value),
    })
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let mut s = format!("{value}");
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    }
}

/// A tiny recursive-descent evaluator for `+ - * / ( )` over decimal
/// literals — enough for the `eval`/`expr`/`intexpr` built-ins.
fn eval_expr(input: &str) -> std::result::Result<f64, ()> {
    struct Parser<'a> {
        chars: std::iter::Peekable<std::str::Chars<'a>>,
    }

    impl<'a> Parser<'a> {
        fn skip_ws(&mut self) {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.chars.next();
            }
        }

        fn parse_expr(&mut self) -> std::result::Result<f64, ()> {
            let mut value = self.parse_term()?;
            loop {
                self.skip_ws();
                match self.chars.peek() {
                    Some('+') => {
                        self.chars.next();
                        value += self.parse_term()?;
                    }
                    Some('-') => {
                        self.chars.next();
                        value -= self.parse_term()?;
                    }
                    _ => break,
                }
            }
            Ok(value)
        }

        fn parse_term(&mut self) -> std::result::Result<f64, ()> {
            let mut value = self.parse_factor()?;
            loop {
                self.skip_ws();
                match self.chars.peek() {
                    Some('*') => {
                        self.chars.next();
                        value *= self.parse_factor()?;
                    }
                    Some('/') => {
                        self.chars.next();
                        let rhs = self.parse_factor()?;
                        if rhs == 0.0 {
                            return Err(());
                        }
                        value /= rhs;
                    }
                    _ => break,
                }
            }
            Ok(value)
        }

        fn parse_factor(&mut self) -> std::result::Result<f64, ()> {
            self.skip_ws();
            match self.chars.peek() {
                Some('(') => {
                    self.chars.next();
                    let value = self.parse_expr()?;
                    self.skip_ws();
                    if self.chars.next() != Some(')') {
                        return Err(());
                    }
                    Ok(value)
                }
                Some('-') => {
                    self.chars.next();
                    Ok(-self.parse_factor()?)
                }
                _ => self.parse_number(),
            }
        }

        fn parse_number(&mut self) -> std::result::Result<f64, ()> {
            let mut s = String::new();
            while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
                s.push(self.chars.next().unwrap());
            }
            if s.is_empty() {
                return Err(());
            }
            s.parse().map_err(|_| ())
        }
    }

    let mut parser = Parser {
        chars: input.chars().peekable(),
    };
    let value = parser.parse_expr()?;
    parser.skip_ws();
    if parser.chars.peek().is_some() {
        return Err(());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_variable() {
        let vars = vars(&[("namespace", "prod")]);
        assert_eq!(expand("ns=${namespace}", &vars).unwrap(), "ns=prod");
    }

    #[test]
    fn default_used_when_missing() {
        let vars = vars(&[]);
        assert_eq!(expand("${missing,fallback}", &vars).unwrap(), "fallback");
    }

    #[test]
    fn default_overridden_when_present() {
        let vars = vars(&[("port", "8080")]);
        assert_eq!(expand("${port,80}", &vars).unwrap(), "8080");
    }

    #[test]
    fn nested_default() {
        let vars = vars(&[("basePort", "9000")]);
        assert_eq!(expand("${port,${basePort}}", &vars).unwrap(), "9000");
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let vars = vars(&[]);
        assert_eq!(expand(r"price: \$5", &vars).unwrap(), "price: $5");
    }

    #[test]
    fn missing_without_default_is_error() {
        let vars = vars(&[]);
        assert!(expand("${missing}", &vars).is_err());
    }

    #[test]
    fn expr_function() {
        let vars = vars(&[("replicas", "3")]);
        assert_eq!(
            expand("${expr(${replicas} * 2)}", &vars).unwrap(),
            "6"
        );
    }

    #[test]
    fn intexpr_truncates() {
        let vars = vars(&[]);
        assert_eq!(expand("${intexpr(7 / 2)}", &vars).unwrap(), "3");
    }

    #[test]
    fn eval_with_parens() {
        let vars = vars(&[]);
        assert_eq!(expand("${eval((1 + 2) * 3)}", &vars).unwrap(), "9");
    }

    #[test]
    fn unterminated_token_errors() {
        let vars = vars(&[]);
        assert!(expand("${unterminated", &vars).is_err());
    }
}
