// validity.rs — Tri-state check outcomes and their combinators
//
// Every check in a processer or resolver yields a `Validity`: valid, valid
// with diagnostics, or invalid with diagnostics. Checks are chained with
// `validate` (runs the next check only while still valid), and finished with
// `merge` / `transform` into an `Outcome<T>`, an optional product carrying all
// accumulated diagnostics.
//
// Preconditions: none.
// Postconditions: diagnostics are never dropped by a combinator.
// Failure modes: none.
// Side effects: none.

use crate::diag::Diagnostic;

// ── Validity ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Validity {
    valid: bool,
    diagnostics: Vec<Diagnostic>,
}

impl Validity {
    pub fn valid() -> Self {
        Self {
            valid: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn invalid_without_diagnostics() -> Self {
        Self {
            valid: false,
            diagnostics: Vec::new(),
        }
    }

    /// Valid, surfacing `diagnostic` if the strategy produced one.
    pub fn valid_with(diagnostic: Option<Diagnostic>) -> Self {
        Self {
            valid: true,
            diagnostics: diagnostic.into_iter().collect(),
        }
    }

    pub fn valid_with_all(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            valid: true,
            diagnostics,
        }
    }

    pub fn invalid(diagnostic: Option<Diagnostic>) -> Self {
        Self {
            valid: false,
            diagnostics: diagnostic.into_iter().collect(),
        }
    }

    pub fn invalid_all(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            valid: false,
            diagnostics,
        }
    }

    /// Valid if `condition` holds; otherwise invalid with the lazily built diagnostic.
    pub fn conditional(condition: bool, diagnostic: impl FnOnce() -> Option<Diagnostic>) -> Self {
        if condition {
            Self::valid()
        } else {
            Self::invalid(diagnostic())
        }
    }

    pub fn conditional_without_diagnostics(condition: bool) -> Self {
        Self {
            valid: condition,
            diagnostics: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_invalid(&self) -> bool {
        !self.valid
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Run `next` only if still valid; concatenate its diagnostics.
    pub fn validate(self, next: impl FnOnce() -> Validity) -> Validity {
        if self.is_invalid() {
            return self;
        }
        self.and(next())
    }

    /// Combine with an already-computed check, regardless of state.
    pub fn and(mut self, other: Validity) -> Validity {
        self.valid &= other.valid;
        self.diagnostics.extend(other.diagnostics);
        self
    }

    /// Produce an outcome from `next` if still valid.
    pub fn merge<T>(self, next: impl FnOnce() -> Outcome<T>) -> Outcome<T> {
        if self.is_invalid() {
            return Outcome::empty_with_all(self.diagnostics);
        }
        let mut outcome = next();
        let mut diagnostics = self.diagnostics;
        diagnostics.append(&mut outcome.diagnostics);
        outcome.diagnostics = diagnostics;
        outcome
    }

    /// Produce a product from `build` if still valid.
    pub fn transform<T>(self, build: impl FnOnce() -> T) -> Outcome<T> {
        if self.is_invalid() {
            return Outcome::empty_with_all(self.diagnostics);
        }
        Outcome::result_with(build(), self.diagnostics)
    }

    /// Drop the product but keep the diagnostics.
    pub fn into_empty<T>(self) -> Outcome<T> {
        Outcome::empty_with_all(self.diagnostics)
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────

/// An optional product plus the diagnostics gathered while producing it.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Outcome<T> {
    result: Option<T>,
    diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn result(value: T) -> Self {
        Self {
            result: Some(value),
            diagnostics: Vec::new(),
        }
    }

    pub fn result_with(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            result: Some(value),
            diagnostics,
        }
    }

    pub fn empty() -> Self {
        Self {
            result: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn empty_with(diagnostic: Option<Diagnostic>) -> Self {
        Self {
            result: None,
            diagnostics: diagnostic.into_iter().collect(),
        }
    }

    pub fn empty_with_all(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            result: None,
            diagnostics,
        }
    }

    /// An optional value that may exist even when a diagnostic was raised.
    pub fn from_parts(result: Option<T>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            result,
            diagnostics,
        }
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn lacks_result(&self) -> bool {
        self.result.is_none()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Option<T>, Vec<Diagnostic>) {
        (self.result, self.diagnostics)
    }

    /// Move this outcome's diagnostics into `sink` and return the product.
    pub fn drain_into(self, sink: &mut Vec<Diagnostic>) -> Option<T> {
        sink.extend(self.diagnostics);
        self.result
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            result: self.result.map(f),
            diagnostics: self.diagnostics,
        }
    }

    /// Chain a dependent step; diagnostics of both steps are kept in order.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self.result {
            None => Outcome::empty_with_all(self.diagnostics),
            Some(value) => {
                let mut next = f(value);
                let mut diagnostics = self.diagnostics;
                diagnostics.append(&mut next.diagnostics);
                next.diagnostics = diagnostics;
                next
            }
        }
    }

    pub fn with_diagnostics(mut self, extra: impl IntoIterator<Item = Diagnostic>) -> Self {
        self.diagnostics.extend(extra);
        self
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::codes;
    use crate::types::{FileId, Location};

    fn diag(code: crate::diag::DiagCode) -> Diagnostic {
        Diagnostic::error(
            code,
            Location {
                file: FileId(0),
                start: 0,
                end: 0,
            },
            "x",
        )
    }

    #[test]
    fn validate_short_circuits_after_invalid() {
        let mut ran = false;
        let v = Validity::invalid(Some(diag(codes::E0101))).validate(|| {
            ran = true;
            Validity::valid()
        });
        assert!(!ran);
        assert!(v.is_invalid());
        assert_eq!(v.diagnostics().len(), 1);
    }

    #[test]
    fn validate_accumulates_valid_with_diagnostics() {
        let v = Validity::valid_with(Some(diag(codes::W0402)))
            .validate(|| Validity::valid_with(Some(diag(codes::W0414))))
            .validate(Validity::valid);
        assert!(v.is_valid());
        assert_eq!(v.diagnostics().len(), 2);
    }

    #[test]
    fn conditional_builds_diagnostic_lazily() {
        let v = Validity::conditional(true, || panic!("not called"));
        assert!(v.is_valid());
        let v = Validity::conditional(false, || Some(diag(codes::E0110)));
        assert!(v.is_invalid());
        assert_eq!(v.diagnostics().len(), 1);
    }

    #[test]
    fn transform_keeps_diagnostics() {
        let o = Validity::valid_with(Some(diag(codes::W0402))).transform(|| 3);
        assert_eq!(o.value(), Some(&3));
        assert_eq!(o.diagnostics().len(), 1);

        let o: Outcome<i32> = Validity::invalid(Some(diag(codes::E0400))).transform(|| 3);
        assert!(o.lacks_result());
        assert_eq!(o.diagnostics().len(), 1);
    }

    #[test]
    fn merge_concatenates_in_order() {
        let o = Validity::valid_with(Some(diag(codes::W0402)))
            .merge(|| Outcome::result_with(1, vec![diag(codes::E0411)]));
        let (value, diags) = o.into_parts();
        assert_eq!(value, Some(1));
        assert_eq!(
            diags.iter().map(|d| d.code.unwrap()).collect::<Vec<_>>(),
            vec![codes::W0402, codes::E0411]
        );
    }

    #[test]
    fn and_then_stops_on_empty() {
        let o: Outcome<i32> = Outcome::<i32>::empty_with(Some(diag(codes::E0510)))
            .and_then(|_| panic!("not called"));
        assert!(o.lacks_result());
        assert_eq!(o.diagnostics().len(), 1);
    }
}
