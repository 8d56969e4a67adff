//! Declaration taint contracts and the directive grammar.
//!
//! Directives arrive one per line, already stripped of any docblock
//! framing by the annotation collaborator:
//!
//! ```text
//! taint-sink <category> $param
//! taint-remove <category...>
//! pure
//! specialize-call
//! assert-untainted $var
//! ```
//!
//! `pure` implies specialization eligibility. `assert-untainted` accepts an
//! optional trailing category list and defaults to every known category.

use weir_core::errors::AnnotationError;
use weir_core::types::SmallVec4;

use crate::categories::{CategorySet, TaintCategory};

/// One parsed directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    SinkParam {
        category: TaintCategory,
        param: String,
    },
    Remove(CategorySet),
    Pure,
    SpecializeCall,
    AssertUntainted {
        var: String,
        /// Empty means every known category.
        categories: CategorySet,
    },
}

/// Immutable taint contract attached to a declaration.
#[derive(Debug, Clone, Default)]
pub struct TaintContract {
    /// Sink parameters by name, with their sensitive categories.
    pub sink_params: SmallVec4<(String, CategorySet)>,
    /// Categories removed from the routine's result.
    pub removed: CategorySet,
    /// Side-effect-free; implies `specialize`.
    pub pure: bool,
    /// Analyzed per call site.
    pub specialize: bool,
    /// Parameter asserted untainted at every call site, with the asserted
    /// categories (empty means all).
    pub assert_untainted: Option<(String, CategorySet)>,
}

impl TaintContract {
    /// Build a contract from directive lines.
    pub fn from_directives<'a>(
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, AnnotationError> {
        let mut contract = TaintContract::default();
        for line in lines {
            match parse_directive(line)? {
                Directive::SinkParam { category, param } => {
                    match contract
                        .sink_params
                        .iter_mut()
                        .find(|(name, _)| *name == param)
                    {
                        Some((_, categories)) => categories.insert(category),
                        None => {
                            let mut categories = CategorySet::new();
                            categories.insert(category);
                            contract.sink_params.push((param, categories));
                        }
                    }
                }
                Directive::Remove(categories) => contract.removed.union_with(&categories),
                Directive::Pure => {
                    contract.pure = true;
                    contract.specialize = true;
                }
                Directive::SpecializeCall => contract.specialize = true,
                Directive::AssertUntainted { var, categories } => {
                    contract.assert_untainted = Some((var, categories));
                }
            }
        }
        Ok(contract)
    }

    /// Whether this routine is eligible for per-call-site analysis.
    pub fn is_specializable(&self) -> bool {
        self.specialize || self.pure
    }

    pub fn is_empty(&self) -> bool {
        self.sink_params.is_empty()
            && self.removed.is_empty()
            && !self.pure
            && !self.specialize
            && self.assert_untainted.is_none()
    }
}

/// Parse a single directive line.
pub fn parse_directive(line: &str) -> Result<Directive, AnnotationError> {
    let mut tokens = line.split_whitespace();
    let head = tokens.next().unwrap_or("");
    match head {
        "taint-sink" => {
            let category = parse_category(tokens.next(), "taint-sink", "category")?;
            let param = parse_param(tokens.next(), "taint-sink")?;
            Ok(Directive::SinkParam { category, param })
        }
        "taint-remove" => {
            let mut categories = CategorySet::new();
            for token in tokens {
                categories.insert(parse_category(Some(token), "taint-remove", "category")?);
            }
            if categories.is_empty() {
                return Err(AnnotationError::MissingArgument {
                    directive: "taint-remove".to_string(),
                    what: "category",
                });
            }
            Ok(Directive::Remove(categories))
        }
        "pure" => Ok(Directive::Pure),
        "specialize-call" => Ok(Directive::SpecializeCall),
        "assert-untainted" => {
            let var = parse_param(tokens.next(), "assert-untainted")?;
            let mut categories = CategorySet::new();
            for token in tokens {
                categories.insert(parse_category(Some(token), "assert-untainted", "category")?);
            }
            Ok(Directive::AssertUntainted { var, categories })
        }
        other => Err(AnnotationError::UnknownDirective(other.to_string())),
    }
}

fn parse_category(
    token: Option<&str>,
    directive: &str,
    what: &'static str,
) -> Result<TaintCategory, AnnotationError> {
    let token = token.ok_or_else(|| AnnotationError::MissingArgument {
        directive: directive.to_string(),
        what,
    })?;
    token
        .parse()
        .map_err(|_| AnnotationError::UnknownCategory(token.to_string()))
}

fn parse_param(token: Option<&str>, directive: &str) -> Result<String, AnnotationError> {
    let token = token.ok_or_else(|| AnnotationError::MissingArgument {
        directive: directive.to_string(),
        what: "parameter",
    })?;
    match token.strip_prefix('$') {
        Some(name) if !name.is_empty() => Ok(format!("${name}")),
        _ => Err(AnnotationError::ExpectedParameter {
            directive: directive.to_string(),
            got: token.to_string(),
        }),
    }
}
