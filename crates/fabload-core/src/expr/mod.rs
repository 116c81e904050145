//! Argument template expansion.
//!
//! Templates may embed function-like expressions that are replaced by literal
//! text before a call is issued:
//!
//! | Form | Result |
//! |---|---|
//! | `$seq()` | next value of the sequence counter; the body must be empty |
//! | `$rand(n)` | random integer in `[0, n)` |
//! | `$pad(n,chars)` | `chars` repeated `n` times, at most [`MAX_PAD_BYTES`] |
//! | `$file(path)` | contents of the file at `path` |
//! | `$set(name,value)` | stores `value` under `name`, yields `value` |
//! | `${name}` | value previously stored under `name` |
//!
//! Forms are resolved one after another in that fixed order, each by scanning
//! for its leftmost opening marker until none is left. A later form sees the
//! output of the earlier ones, which is what makes `$pad($seq(),X)` and
//! `Key_$set(x,$seq())=Val_${x}` work. Nesting that goes against the order is
//! not supported.
//!
//! An expression that cannot be resolved is left in the output verbatim and
//! reported as an [`ExpressionError`] diagnostic; it never aborts expansion.
//!
//! ```ignore
//! let evaluator = Evaluator::new(SequenceCounter::process(), Arc::new(VariableContext::new()));
//! let eval = evaluator.evaluate("val$pad(2,X)");
//! assert_eq!(eval.value, "valXX");
//! ```

pub mod context;
pub mod sequence;

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

pub use self::context::VariableContext;
pub use self::sequence::SequenceCounter;

/// Upper bound on the text a single `$pad` may produce.
pub const MAX_PAD_BYTES: usize = 1 << 20;

/// The expression forms, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionForm {
    Sequence,
    Random,
    Pad,
    File,
    Set,
    Variable,
}

impl ExpressionForm {
    /// Fixed evaluation pipeline.
    pub const PIPELINE: [ExpressionForm; 6] = [
        ExpressionForm::Sequence,
        ExpressionForm::Random,
        ExpressionForm::Pad,
        ExpressionForm::File,
        ExpressionForm::Set,
        ExpressionForm::Variable,
    ];

    pub fn opener(self) -> &'static str {
        match self {
            ExpressionForm::Sequence => "$seq(",
            ExpressionForm::Random => "$rand(",
            ExpressionForm::Pad => "$pad(",
            ExpressionForm::File => "$file(",
            ExpressionForm::Set => "$set(",
            ExpressionForm::Variable => "${",
        }
    }

    pub fn closer(self) -> &'static str {
        match self {
            ExpressionForm::Variable => "}",
            _ => ")",
        }
    }
}

impl fmt::Display for ExpressionForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.opener(), self.closer())
    }
}

/// Why an expression was left unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("expecting '{closer}' in expression '{expression}'", closer = .form.closer())]
    Unterminated {
        form: ExpressionForm,
        expression: String,
    },

    #[error("invalid number '{value}' in {form} expression")]
    InvalidNumber { form: ExpressionForm, value: String },

    #[error("invalid {form} expression '{expression}', expecting {expected}")]
    Malformed {
        form: ExpressionForm,
        expression: String,
        expected: &'static str,
    },

    #[error("cannot read file [{path}]: {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("variable [{0}] not set")]
    UnsetVariable(String),
}

/// Expanded template plus the diagnostics raised while expanding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub value: String,
    pub diagnostics: Vec<ExpressionError>,
}

/// Expands argument templates against a sequence counter and a variable
/// context.
#[derive(Debug, Clone)]
pub struct Evaluator {
    sequence: Arc<SequenceCounter>,
    context: Arc<VariableContext>,
}

impl Evaluator {
    pub fn new(sequence: Arc<SequenceCounter>, context: Arc<VariableContext>) -> Self {
        Self { sequence, context }
    }

    pub fn context(&self) -> &VariableContext {
        &self.context
    }

    /// Expand one template.
    pub fn evaluate(&self, template: &str) -> Evaluation {
        let mut rng = rand::thread_rng();
        self.evaluate_with(&mut rng, template)
    }

    /// Expand every argument of a call with one random source, logging each
    /// result and every diagnostic.
    pub fn evaluate_args(&self, args: &[String]) -> Vec<String> {
        let mut rng = rand::thread_rng();
        args.iter()
            .enumerate()
            .map(|(index, template)| {
                let eval = self.evaluate_with(&mut rng, template);
                for diagnostic in &eval.diagnostics {
                    tracing::warn!(index, template = %template, "unresolved expression: {diagnostic}");
                }
                tracing::debug!(index, arg = %eval.value, "expanded argument");
                eval.value
            })
            .collect()
    }

    fn evaluate_with<R: Rng>(&self, rng: &mut R, template: &str) -> Evaluation {
        let mut diagnostics = Vec::new();
        let mut value = template.to_string();
        for form in ExpressionForm::PIPELINE {
            value = expand(&value, form, &mut diagnostics, |body| {
                self.resolve(&mut *rng, form, body)
            });
        }
        Evaluation { value, diagnostics }
    }

    fn resolve<R: Rng>(
        &self,
        rng: &mut R,
        form: ExpressionForm,
        body: &str,
    ) -> Result<String, ExpressionError> {
        match form {
            ExpressionForm::Sequence if body.trim().is_empty() => {
                Ok(self.sequence.next().to_string())
            }
            ExpressionForm::Sequence => Err(ExpressionError::Malformed {
                form,
                expression: body.to_string(),
                expected: "$seq()",
            }),
            ExpressionForm::Random => {
                let n: i64 = body
                    .trim()
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ExpressionError::InvalidNumber {
                        form,
                        value: body.to_string(),
                    })?;
                Ok(rng.gen_range(0..n).to_string())
            }
            ExpressionForm::Pad => {
                let (count, chars) = split_pair(form, body, "$pad(n,chars)")?;
                let n: usize = count
                    .trim()
                    .parse()
                    .ok()
                    .filter(|n: &usize| {
                        n.checked_mul(chars.len())
                            .is_some_and(|len| len <= MAX_PAD_BYTES)
                    })
                    .ok_or_else(|| ExpressionError::InvalidNumber {
                        form,
                        value: count.to_string(),
                    })?;
                Ok(chars.repeat(n))
            }
            ExpressionForm::File => {
                std::fs::read_to_string(body).map_err(|e| ExpressionError::UnreadableFile {
                    path: body.to_string(),
                    reason: e.to_string(),
                })
            }
            ExpressionForm::Set => {
                let (name, value) = split_pair(form, body, "$set(var,value)")?;
                self.context.set(name, value);
                Ok(value.to_string())
            }
            ExpressionForm::Variable => self
                .context
                .get(body)
                .ok_or_else(|| ExpressionError::UnsetVariable(body.to_string())),
        }
    }
}

/// `a,b` with exactly one comma.
fn split_pair<'a>(
    form: ExpressionForm,
    body: &'a str,
    expected: &'static str,
) -> Result<(&'a str, &'a str), ExpressionError> {
    let mut parts = body.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(ExpressionError::Malformed {
            form,
            expression: body.to_string(),
            expected,
        }),
    }
}

/// Replace every occurrence of `form`, leftmost first, with what `resolve`
/// returns for its body.
///
/// A failed resolution keeps the expression text. A missing closer stops the
/// scan and keeps the rest of the input as is.
fn expand<F>(
    input: &str,
    form: ExpressionForm,
    diagnostics: &mut Vec<ExpressionError>,
    mut resolve: F,
) -> String
where
    F: FnMut(&str) -> Result<String, ExpressionError>,
{
    let (opener, closer) = (form.opener(), form.closer());
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(opener) {
        let body_start = start + opener.len();
        let Some(len) = rest[body_start..].find(closer) else {
            diagnostics.push(ExpressionError::Unterminated {
                form,
                expression: rest[start..].to_string(),
            });
            break;
        };
        let end = body_start + len;

        match resolve(&rest[body_start..end]) {
            Ok(replacement) => {
                out.push_str(&rest[..start]);
                out.push_str(&replacement);
            }
            Err(e) => {
                diagnostics.push(e);
                out.push_str(&rest[..end + closer.len()]);
            }
        }
        rest = &rest[end + closer.len()..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn evaluator() -> Evaluator {
        Evaluator::new(Arc::new(SequenceCounter::new()), Arc::new(VariableContext::new()))
    }

    #[rstest]
    #[case("plain")]
    #[case("")]
    #[case("$ not an expression")]
    #[case("{x} (y) $ seq()")]
    fn text_without_markers_is_unchanged(#[case] template: &str) {
        let eval = evaluator().evaluate(template);
        assert_eq!(eval.value, template);
        assert!(eval.diagnostics.is_empty());
    }

    #[test]
    fn seq_yields_one_to_n_in_call_order() {
        let ev = evaluator();
        let values: Vec<String> = (0..5).map(|_| ev.evaluate("$seq()").value).collect();
        assert_eq!(values, ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn seq_is_shared_between_evaluators_on_the_same_counter() {
        let seq = Arc::new(SequenceCounter::new());
        let a = Evaluator::new(Arc::clone(&seq), Arc::new(VariableContext::new()));
        let b = Evaluator::new(Arc::clone(&seq), Arc::new(VariableContext::new()));

        assert_eq!(a.evaluate("k$seq()").value, "k1");
        assert_eq!(b.evaluate("k$seq()").value, "k2");
        assert_eq!(a.evaluate("$seq()-$seq()").value, "3-4");
    }

    #[test]
    fn rand_stays_in_range() {
        let ev = evaluator();
        for _ in 0..500 {
            let v: i64 = ev.evaluate("$rand(3)").value.parse().unwrap();
            assert!((0..3).contains(&v));
        }
    }

    #[rstest]
    #[case("$pad(3,XYZ)", "XYZXYZXYZ")]
    #[case("val$pad(2,X)", "valXX")]
    #[case("$pad(0,X)", "")]
    #[case("a$pad(1,B)c$pad(2,D)", "aBcDD")]
    fn pad_repeats_chars(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(evaluator().evaluate(template).value, expected);
    }

    #[test]
    fn pad_length_is_n_times_chars() {
        let value = evaluator().evaluate("$pad(7,ab)").value;
        assert_eq!(value.len(), 7 * 2);
        assert_eq!(value, "ab".repeat(7));
    }

    #[test]
    fn pad_consumes_seq_output() {
        let ev = evaluator();
        assert_eq!(ev.evaluate("val$pad($seq(),X)").value, "valX");
        assert_eq!(ev.evaluate("val$pad($seq(),X)").value, "valXX");
        assert_eq!(ev.evaluate("val$pad($seq(),X)").value, "valXXX");
    }

    #[test]
    fn pad_consumes_rand_output() {
        let value = evaluator().evaluate("val$pad($rand(3),XYZ)").value;
        assert!(["val", "valXYZ", "valXYZXYZ"].contains(&value.as_str()));
    }

    #[test]
    fn set_then_reference_resolves() {
        let ev = evaluator();
        assert_eq!(ev.evaluate("Key_$set(x,$seq())=Val_${x}").value, "Key_1=Val_1");
        assert_eq!(ev.evaluate("Key_$set(x,$seq())=Val_${x}").value, "Key_2=Val_2");
        assert_eq!(ev.context().get("x").as_deref(), Some("2"));
    }

    #[test]
    fn set_in_one_argument_is_visible_in_a_later_one() {
        let ev = evaluator();
        let args = ev.evaluate_args(&["$set(owner,alice)".to_string(), "by ${owner}".to_string()]);
        assert_eq!(args, ["alice", "by alice"]);
    }

    #[test]
    fn unset_variable_is_kept_verbatim() {
        let eval = evaluator().evaluate("hello ${nobody}!");
        assert_eq!(eval.value, "hello ${nobody}!");
        assert_eq!(
            eval.diagnostics,
            vec![ExpressionError::UnsetVariable("nobody".to_string())]
        );
    }

    #[rstest]
    #[case("$rand(abc)")]
    #[case("$rand(0)")]
    #[case("$rand(-4)")]
    #[case("$pad(x,Y)")]
    #[case("$pad(-1,Y)")]
    #[case("$pad(3)")]
    #[case("$set(only_name)")]
    #[case("$set(a,b,c)")]
    #[case("$seq(7)")]
    #[case("$pad(18446744073709551615,ab)")]
    #[case("$pad(1048577,X)")]
    fn bad_expressions_are_kept_verbatim(#[case] template: &str) {
        let eval = evaluator().evaluate(&format!("pre-{template}-post"));
        assert_eq!(eval.value, format!("pre-{template}-post"));
        assert_eq!(eval.diagnostics.len(), 1);
    }

    #[test]
    fn bad_expression_does_not_stop_later_ones() {
        let eval = evaluator().evaluate("$pad(x,Y)|$pad(2,Z)");
        assert_eq!(eval.value, "$pad(x,Y)|ZZ");
        assert_eq!(eval.diagnostics.len(), 1);
    }

    #[test]
    fn unterminated_expression_keeps_the_rest() {
        let eval = evaluator().evaluate("a$pad(2,X)b$pad(3,Y");
        assert_eq!(eval.value, "aXXb$pad(3,Y");
        assert!(matches!(
            eval.diagnostics.as_slice(),
            [ExpressionError::Unterminated { form: ExpressionForm::Pad, .. }]
        ));
    }

    #[test]
    fn file_contents_are_inlined() {
        let path = std::env::temp_dir().join(format!("fabload-expr-{}.txt", ulid::Ulid::new()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "payload-body").unwrap();

        let eval = evaluator().evaluate(&format!("<$file({})>", path.display()));
        assert_eq!(eval.value, "<payload-body>");
        assert!(eval.diagnostics.is_empty());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unreadable_file_is_kept_verbatim() {
        let eval = evaluator().evaluate("$file(/definitely/not/here.txt)");
        assert_eq!(eval.value, "$file(/definitely/not/here.txt)");
        assert!(matches!(
            eval.diagnostics.as_slice(),
            [ExpressionError::UnreadableFile { .. }]
        ));
    }
}
