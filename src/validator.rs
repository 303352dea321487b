//! Template/document/patch validation: the engine that runs inside the
//! directory's transactions to check configuration documents against a
//! declared shape and to apply in-place patches to them.

use crate::directory::Directory;
use crate::errors::{PatchError, PatchFlowError};
use crate::value::Value;
use indexmap::IndexMap;
use std::time::Duration;

/// A named, typed field within a template's body tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub kind: FieldKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Null,
    Boolean,
    Number,
    Text,
    List {
        item: Option<Box<Field>>,
        items: Option<Vec<Field>>,
    },
    Map {
        entry: Option<Box<Field>>,
        entries: Option<IndexMap<String, Field>>,
    },
}

/// A template: a fully-qualified name plus a root field describing the
/// shape every matching document's body must conform to.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    pub name: String,
    pub root: Field,
}

/// A stored configuration document.
///
/// Serializable so the patch flow can round-trip it through the directory's
/// opaque byte values (`serde_json`, matching [`crate::value::Value`]'s own
/// persistence story).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub name: String,
    pub body: Value,
    pub template: Option<String>,
}

/// An in-place modification to a document's body.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pub name: String,
    pub path: String,
    pub data: Value,
}

/// One failed check against a document.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub condition: String,
    pub path: Option<String>,
    pub error: Option<String>,
}

/// The outcome of validating one document: zero violations means the
/// document is "sound".
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Report {
    pub document: String,
    pub template: Option<String>,
    pub violations: Vec<Violation>,
}

impl Report {
    pub fn is_sound(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A condition expression attached to a field, e.g. `len > 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub text: String,
    ast: Expr,
}

impl Condition {
    pub fn parse(text: &str) -> Result<Condition, String> {
        let ast = Parser::new(text).parse_expr()?;
        Ok(Condition {
            text: text.to_string(),
            ast,
        })
    }
}

/// Per-condition evaluation timeout (§4.5): a thrown error or an expiring
/// evaluation both surface as a violation.
pub const CONDITION_TIMEOUT: Duration = Duration::from_millis(50);

/// Evaluates `condition` against `(entity, index_or_key, length)`, honoring
/// the 50 ms per-condition timeout. Each call runs against its own cloned
/// inputs: no state is shared between documents or between conditions.
pub async fn evaluate(condition: &Condition, entity: &Value, index_or_key: &str, length: usize) -> Result<bool, String> {
    let ast = condition.ast.clone();
    let entity = entity.clone();
    let index_or_key = index_or_key.to_string();

    let task = async move { ast.eval(&entity, &index_or_key, length) };

    match tokio::time::timeout(CONDITION_TIMEOUT, task).await {
        Ok(result) => result,
        Err(_) => Err("condition timed out".to_string()),
    }
}

// -- Expression language ------------------------------------------------
//
// A small, purpose-built boolean/numeric grammar: comparisons, boolean
// connectives, a handful of named predicates (`is_string`, `is_number`,
// `matches(regex)`), and the three bound names `entity`, `index_or_key`,
// `length`. Resolved per §9 design note in favor of a compiled AST over an
// embedded scripting runtime.

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Entity,
    IndexOrKey,
    Length,
    Number(f64),
    Str(String),
    Bool(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
enum EvalValue {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Expr {
    fn eval(&self, entity: &Value, index_or_key: &str, length: usize) -> Result<bool, String> {
        match self.eval_value(entity, index_or_key, length)? {
            EvalValue::Bool(b) => Ok(b),
            other => Err(format!("condition did not evaluate to a boolean: {:?}", other)),
        }
    }

    fn eval_value(&self, entity: &Value, index_or_key: &str, length: usize) -> Result<EvalValue, String> {
        match self {
            Expr::Entity => Ok(entity_to_eval(entity)),
            Expr::IndexOrKey => Ok(EvalValue::Str(index_or_key.to_string())),
            Expr::Length => Ok(EvalValue::Number(length as f64)),
            Expr::Number(n) => Ok(EvalValue::Number(*n)),
            Expr::Str(s) => Ok(EvalValue::Str(s.clone())),
            Expr::Bool(b) => Ok(EvalValue::Bool(*b)),
            Expr::Not(e) => Ok(EvalValue::Bool(!e.eval(entity, index_or_key, length)?)),
            Expr::And(a, b) => Ok(EvalValue::Bool(
                a.eval(entity, index_or_key, length)? && b.eval(entity, index_or_key, length)?,
            )),
            Expr::Or(a, b) => Ok(EvalValue::Bool(
                a.eval(entity, index_or_key, length)? || b.eval(entity, index_or_key, length)?,
            )),
            Expr::Eq(a, b) => Ok(EvalValue::Bool(
                a.eval_value(entity, index_or_key, length)? == b.eval_value(entity, index_or_key, length)?,
            )),
            Expr::Ne(a, b) => Ok(EvalValue::Bool(
                a.eval_value(entity, index_or_key, length)? != b.eval_value(entity, index_or_key, length)?,
            )),
            Expr::Lt(a, b) => cmp(a, b, entity, index_or_key, length, |o| o == std::cmp::Ordering::Less),
            Expr::Le(a, b) => cmp(a, b, entity, index_or_key, length, |o| o != std::cmp::Ordering::Greater),
            Expr::Gt(a, b) => cmp(a, b, entity, index_or_key, length, |o| o == std::cmp::Ordering::Greater),
            Expr::Ge(a, b) => cmp(a, b, entity, index_or_key, length, |o| o != std::cmp::Ordering::Less),
            Expr::Call(name, args) => call(name, args, entity, index_or_key, length),
        }
    }
}

fn entity_to_eval(entity: &Value) -> EvalValue {
    match entity {
        Value::Null => EvalValue::Bool(false),
        Value::Bool(b) => EvalValue::Bool(*b),
        Value::Number(n) => EvalValue::Number(*n),
        Value::Text(s) => EvalValue::Str(s.clone()),
        _ => EvalValue::Bool(true),
    }
}

fn cmp(
    a: &Expr,
    b: &Expr,
    entity: &Value,
    index_or_key: &str,
    length: usize,
    f: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<EvalValue, String> {
    let a = a.eval_value(entity, index_or_key, length)?;
    let b = b.eval_value(entity, index_or_key, length)?;
    match (a, b) {
        (EvalValue::Number(a), EvalValue::Number(b)) => {
            let ord = a.partial_cmp(&b).ok_or_else(|| "NaN comparison".to_string())?;
            Ok(EvalValue::Bool(f(ord)))
        }
        (EvalValue::Str(a), EvalValue::Str(b)) => Ok(EvalValue::Bool(f(a.cmp(&b)))),
        _ => Err("comparison requires two numbers or two strings".to_string()),
    }
}

fn call(name: &str, args: &[Expr], entity: &Value, index_or_key: &str, length: usize) -> Result<EvalValue, String> {
    match name {
        "is_string" => Ok(EvalValue::Bool(matches!(entity, Value::Text(_)))),
        "is_number" => Ok(EvalValue::Bool(matches!(entity, Value::Number(_)))),
        "len" => Ok(EvalValue::Number(length as f64)),
        "matches" => {
            let pattern = match args.first() {
                Some(Expr::Str(s)) => s.clone(),
                _ => return Err("matches() requires a string literal pattern".to_string()),
            };
            let re = regex::Regex::new(&pattern).map_err(|e| e.to_string())?;
            let text = match entity {
                Value::Text(s) => s.clone(),
                _ => return Ok(EvalValue::Bool(false)),
            };
            Ok(EvalValue::Bool(re.is_match(&text)))
        }
        other => Err(format!("unknown predicate '{}'", other)),
    }
}

/// A tiny recursive-descent parser for the condition grammar:
///
/// ```text
/// expr    := or
/// or      := and ("||" and)*
/// and     := cmp ("&&" cmp)*
/// cmp     := unary (("==" | "!=" | "<" | "<=" | ">" | ">=") unary)?
/// unary   := "!" unary | atom
/// atom    := "entity" | "index_or_key" | "length" | "true" | "false"
///          | number | string | ident "(" args ")" | "(" expr ")"
/// ```
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Parser<'a> {
        Parser { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let expr = self.or()?;
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(format!("unexpected trailing input at byte {}", self.pos));
        }
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and()?;
        loop {
            self.skip_ws();
            if self.eat("||") {
                let rhs = self.and()?;
                lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.cmp()?;
        loop {
            self.skip_ws();
            if self.eat("&&") {
                let rhs = self.cmp()?;
                lhs = Expr::And(Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn cmp(&mut self) -> Result<Expr, String> {
        let lhs = self.unary()?;
        self.skip_ws();
        for (op, ctor) in [
            ("==", Expr::Eq as fn(Box<Expr>, Box<Expr>) -> Expr),
            ("!=", Expr::Ne),
            ("<=", Expr::Le),
            (">=", Expr::Ge),
            ("<", Expr::Lt),
            (">", Expr::Gt),
        ] {
            if self.eat(op) {
                let rhs = self.unary()?;
                return Ok(ctor(Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        if self.eat("!") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        if self.eat("(") {
            let e = self.or()?;
            self.skip_ws();
            if !self.eat(")") {
                return Err("expected ')'".to_string());
            }
            return Ok(e);
        }

        if self.peek_is_digit() {
            return self.number();
        }

        if self.peek() == Some('"') {
            return self.string();
        }

        let ident = self.ident()?;
        self.skip_ws();
        if self.eat("(") {
            let mut args = Vec::new();
            self.skip_ws();
            if !self.eat(")") {
                loop {
                    args.push(self.or()?);
                    self.skip_ws();
                    if self.eat(",") {
                        continue;
                    }
                    if !self.eat(")") {
                        return Err("expected ',' or ')' in argument list".to_string());
                    }
                    break;
                }
            }
            return Ok(Expr::Call(ident, args));
        }

        match ident.as_str() {
            "entity" => Ok(Expr::Entity),
            "index_or_key" => Ok(Expr::IndexOrKey),
            "length" => Ok(Expr::Length),
            "true" => Ok(Expr::Bool(true)),
            "false" => Ok(Expr::Bool(false)),
            other => Err(format!("unknown identifier '{}'", other)),
        }
    }

    fn number(&mut self) -> Result<Expr, String> {
        let start = self.pos;
        while self.peek_is_digit() || self.peek() == Some('.') {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|e| e.to_string())
    }

    fn string(&mut self) -> Result<Expr, String> {
        self.pos += 1; // opening quote
        let start = self.pos;
        while self.peek().map_or(false, |c| c != '"') {
            self.pos += 1;
        }
        let s = self.input[start..self.pos].to_string();
        if !self.eat("\"") {
            return Err("unterminated string literal".to_string());
        }
        Ok(Expr::Str(s))
    }

    fn ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected identifier at byte {}", start));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_is_digit(&self) -> bool {
        self.peek().map_or(false, |c| c.is_ascii_digit())
    }

    fn skip_ws(&mut self) {
        while self.peek().map_or(false, |c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.input[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }
}

// -- Validation -----------------------------------------------------------

/// Looks up `template_name` in `registry` and, if found, recursively
/// validates `body` against it.
pub async fn validate(document_name: &str, template_name: Option<&str>, body: &Value, registry: &[Template]) -> Report {
    let mut report = Report {
        document: document_name.to_string(),
        template: template_name.map(str::to_string),
        violations: Vec::new(),
    };

    let template = match template_name.and_then(|name| registry.iter().find(|t| t.name == name)) {
        Some(t) => t,
        None => {
            report.violations.push(Violation {
                condition: "template != undefined".to_string(),
                path: Some(String::new()),
                error: None,
            });
            return report;
        }
    };

    validate_field(&template.root, body, "", "", 0, &mut report.violations).await;
    report
}

fn validate_field<'a>(
    field: &'a Field,
    entity: &'a Value,
    path: &'a str,
    index_or_key: &'a str,
    length: usize,
    violations: &'a mut Vec<Violation>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>> {
    Box::pin(async move {
        for condition in &field.conditions {
            match evaluate(condition, entity, index_or_key, length).await {
                Ok(true) => {}
                Ok(false) => violations.push(Violation {
                    condition: condition.text.clone(),
                    path: Some(path.to_string()),
                    error: None,
                }),
                Err(e) => violations.push(Violation {
                    condition: condition.text.clone(),
                    path: Some(path.to_string()),
                    error: Some(e),
                }),
            }
        }

        match &field.kind {
            FieldKind::Null => {
                if !entity.is_null() {
                    violations.push(type_violation("Null", path));
                }
            }
            FieldKind::Boolean => {
                if !matches!(entity, Value::Bool(_)) {
                    violations.push(type_violation("Boolean", path));
                }
            }
            FieldKind::Number => {
                if !matches!(entity, Value::Number(n) if n.is_finite()) {
                    violations.push(type_violation("Number", path));
                }
            }
            FieldKind::Text => {
                if !matches!(entity, Value::Text(_)) {
                    violations.push(type_violation("Text", path));
                }
            }
            FieldKind::List { item, items } => match entity {
                Value::List(list) => {
                    for (i, element) in list.iter().enumerate() {
                        let child_path = format!("{}[{}]", path, i);
                        let idx = i.to_string();
                        if let Some(item) = item {
                            validate_field(item, element, &child_path, &idx, list.len(), violations).await;
                        }
                        if let Some(positional) = items.as_ref().and_then(|items| items.get(i)) {
                            validate_field(positional, element, &child_path, &idx, list.len(), violations).await;
                        }
                    }
                }
                _ => violations.push(type_violation("List", path)),
            },
            FieldKind::Map { entry, entries } => match entity {
                Value::Map(map) => {
                    for (key, value) in map.iter() {
                        let child_path = format!("{}.{}", path, key);
                        if let Some(entry) = entry {
                            validate_field(entry, value, &child_path, key, map.len(), violations).await;
                        }
                        if let Some(per_key) = entries.as_ref().and_then(|entries| entries.get(key)) {
                            validate_field(per_key, value, &child_path, key, map.len(), violations).await;
                        }
                    }
                }
                _ => violations.push(type_violation("Map", path)),
            },
        }
    })
}

fn type_violation(expected: &str, path: &str) -> Violation {
    Violation {
        condition: format!("typeof entity == {}", expected),
        path: Some(path.to_string()),
        error: None,
    }
}

// -- Patch application ------------------------------------------------

/// Applies `patch` to `document`'s body in place.
pub fn apply_patch(document: &mut Document, patch: &Patch) -> Result<(), PatchError> {
    if document.name != patch.name {
        return Err(PatchError::MismatchedName {
            patch_name: patch.name.clone(),
            document_name: document.name.clone(),
        });
    }

    if patch.path.is_empty() {
        document.body = patch.data.clone();
        return Ok(());
    }

    let segments: Vec<&str> = patch.path.split('/').collect();
    let mut node = &mut document.body;

    for (i, segment) in segments.iter().enumerate() {
        let is_terminal = i == segments.len() - 1;
        let is_index = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());

        if is_index {
            let index: usize = segment.parse().map_err(|_| PatchError::InvalidSegment(segment.to_string()))?;
            if !matches!(node, Value::List(_)) {
                *node = Value::empty_list();
            }
            let list = match node {
                Value::List(l) => l,
                _ => unreachable!(),
            };
            while list.len() <= index {
                list.push(Value::Null);
            }
            if is_terminal {
                list[index] = patch.data.clone();
                return Ok(());
            }
            node = &mut list[index];
        } else {
            if segment.is_empty()
                || !segment
                    .chars()
                    .next()
                    .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
                || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(PatchError::InvalidSegment(segment.to_string()));
            }

            if !matches!(node, Value::Map(_)) {
                *node = Value::empty_map();
            }
            let map = match node {
                Value::Map(m) => m,
                _ => unreachable!(),
            };
            if is_terminal {
                map.insert(segment.to_string(), patch.data.clone());
                return Ok(());
            }
            node = map.entry(segment.to_string()).or_insert(Value::Null);
        }
    }

    Ok(())
}

// -- Patch flow -------------------------------------------------------

/// Each document is stored under its own name, one level below `directory`'s
/// root, as the `serde_json` encoding of a [`Document`].
fn document_key(name: &str) -> String {
    format!(".{}", name.trim_start_matches('.'))
}

/// The composed PATCH flow (§4.5 "as composed from the store service"):
/// reads the documents named by `patches` inside one read transaction,
/// applies each patch to its matching document, validates the mutated set
/// against `registry`, and — only if the aggregate violation count across
/// every report is zero — writes the mutated documents back inside one write
/// transaction. A patch naming a document that was not found contributes a
/// synthetic `DocumentExists("<name>")` violation instead of being applied,
/// which alone is enough to block the writeback.
pub async fn patch(directory: &Directory, patches: &[Patch], registry: &[Template]) -> Result<Vec<Report>, PatchFlowError> {
    let mut documents: IndexMap<String, Document> = IndexMap::new();
    directory.read(|reader| {
        for p in patches {
            if documents.contains_key(&p.name) {
                continue;
            }
            let key = document_key(&p.name);
            if let Some((_, bytes)) = reader.list(&[key.as_str()])?.into_iter().next() {
                let stored: Document = serde_json::from_slice(&bytes).map_err(crate::errors::DirectoryError::Encoding)?;
                documents.insert(p.name.clone(), stored);
            }
        }
        Ok(())
    })?;

    let mut missing: IndexMap<String, Vec<Violation>> = IndexMap::new();
    for p in patches {
        match documents.get_mut(&p.name) {
            Some(document) => apply_patch(document, p)?,
            None => missing.entry(p.name.clone()).or_default().push(Violation {
                condition: format!("DocumentExists(\"{}\")", p.name),
                path: None,
                error: None,
            }),
        }
    }

    let mut reports = Vec::with_capacity(documents.len() + missing.len());
    let mut total_violations = 0usize;

    for document in documents.values() {
        let mut report = validate(&document.name, document.template.as_deref(), &document.body, registry).await;
        total_violations += report.violations.len();
        if let Some(extra) = missing.shift_remove(&document.name) {
            total_violations += extra.len();
            report.violations.extend(extra);
        }
        reports.push(report);
    }
    for (name, violations) in missing {
        total_violations += violations.len();
        reports.push(Report {
            document: name,
            template: None,
            violations,
        });
    }

    if total_violations == 0 {
        directory.write(|writer| {
            let mut entries = Vec::with_capacity(documents.len());
            for document in documents.values() {
                let bytes = serde_json::to_vec(document).map_err(crate::errors::DirectoryError::Encoding)?;
                entries.push((document_key(&document.name), bytes));
            }
            writer.add(&entries)
        })?;
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_comparison_condition() {
        let c = Condition::parse("length > 0").unwrap();
        assert_eq!(c.text, "length > 0");
    }

    #[tokio::test]
    async fn evaluates_true_condition() {
        let c = Condition::parse("length > 0").unwrap();
        let ok = evaluate(&c, &Value::Null, "", 3).await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn evaluates_false_condition_as_no_error() {
        let c = Condition::parse("length > 10").unwrap();
        let ok = evaluate(&c, &Value::Null, "", 3).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn sound_document_has_no_violations() {
        let template = Template {
            name: "t".to_string(),
            root: Field {
                name: "root".to_string(),
                conditions: vec![],
                kind: FieldKind::Map {
                    entry: None,
                    entries: Some(IndexMap::from([(
                        "path".to_string(),
                        Field {
                            name: "path".to_string(),
                            conditions: vec![Condition::parse("length > 0").unwrap()],
                            kind: FieldKind::Text,
                        },
                    )])),
                },
            },
        };

        let mut body = IndexMap::new();
        body.insert("path".to_string(), Value::Text("/".to_string()));

        let report = validate("doc", Some("t"), &Value::Map(body), &[template]).await;
        assert!(report.is_sound());
    }

    #[test]
    fn patch_at_index_grows_a_list() {
        let mut document = Document {
            name: "doc".to_string(),
            body: Value::empty_map(),
            template: None,
        };

        let patch = Patch {
            name: "doc".to_string(),
            path: "3/name".to_string(),
            data: Value::Text("x".to_string()),
        };

        apply_patch(&mut document, &patch).unwrap();

        let list = document.body.as_list().unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[0], Value::Null);
        let entry = list[3].as_map().unwrap();
        assert_eq!(entry.get("name"), Some(&Value::Text("x".to_string())));
    }

    #[test]
    fn patch_rejects_mismatched_name() {
        let mut document = Document {
            name: "doc".to_string(),
            body: Value::Null,
            template: None,
        };
        let patch = Patch {
            name: "other".to_string(),
            path: "".to_string(),
            data: Value::Null,
        };
        assert!(matches!(apply_patch(&mut document, &patch), Err(PatchError::MismatchedName { .. })));
    }

    fn test_directory() -> (tempfile::TempDir, Directory) {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::cfg::DirectoryConfig {
            map_path: dir.path().to_path_buf(),
            map_size: 10 * 1024 * 1024,
            sub_database_name: "test".to_string(),
        };
        let directory = Directory::open(&config).unwrap();
        (dir, directory)
    }

    fn passthrough_template() -> Template {
        Template {
            name: "t".to_string(),
            root: Field {
                name: "root".to_string(),
                conditions: vec![],
                kind: FieldKind::Map { entry: None, entries: None },
            },
        }
    }

    #[tokio::test]
    async fn patch_flow_writes_back_when_sound() {
        let (_dir, directory) = test_directory();

        let initial = Document {
            name: "doc".to_string(),
            body: Value::empty_map(),
            template: Some("t".to_string()),
        };
        directory
            .write(|w| {
                let bytes = serde_json::to_vec(&initial).unwrap();
                w.add(&[(document_key(&initial.name), bytes)])
            })
            .unwrap();

        let patches = vec![Patch {
            name: "doc".to_string(),
            path: "name".to_string(),
            data: Value::Text("x".to_string()),
        }];

        let reports = patch(&directory, &patches, &[passthrough_template()]).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_sound());

        let stored = directory
            .read(|r| Ok(r.list(&[document_key("doc").as_str()])?.into_iter().next().unwrap().1))
            .unwrap();
        let doc: Document = serde_json::from_slice(&stored).unwrap();
        assert_eq!(doc.body.as_map().unwrap().get("name"), Some(&Value::Text("x".to_string())));
    }

    #[tokio::test]
    async fn patch_flow_writes_nothing_for_a_missing_document() {
        let (_dir, directory) = test_directory();

        let patches = vec![Patch {
            name: "absent".to_string(),
            path: "name".to_string(),
            data: Value::Text("x".to_string()),
        }];

        let reports = patch(&directory, &patches, &[passthrough_template()]).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].is_sound());
        assert_eq!(reports[0].violations[0].condition, "DocumentExists(\"absent\")");

        let remaining = directory.read(|r| r.list(&[document_key("absent").as_str()])).unwrap();
        assert!(remaining.is_empty());
    }
}
