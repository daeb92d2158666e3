//! Severity-tagged diagnostics, source ranges, and the driver-visible
//! option surface (§6.2, §6.3, SPEC_FULL.md §3A).
//!
//! This is the ambient reporting surface threaded through the validator,
//! translator and type verifier. It is deliberately small: rendering,
//! terminal coloring and multi-span underlining belong to the driver
//! (§1 "out of scope"), which is exactly the split the teacher draws
//! between `rustc_errors::Diagnostic` (the data) and `EmitterWriter`
//! (the renderer) — only the former lives here.

use log::{log, Level as LogLevel};

/// Diagnostic severity (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Event,
    Message,
    Warning,
    Error,
}

impl Severity {
    fn as_log_level(self) -> LogLevel {
        match self {
            Severity::Event => LogLevel::Trace,
            Severity::Message => LogLevel::Info,
            Severity::Warning => LogLevel::Warn,
            Severity::Error => LogLevel::Error,
        }
    }
}

/// A front-end-owned document identifier plus a byte offset/length pair.
/// The core never opens or indexes into `document`'s contents; it is an
/// opaque key the driver uses to re-locate the text (§6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub document: String,
    pub start: u32,
    pub length: u32,
}

/// One reportable event: a severity, a short title, a message body, and
/// an optional source range (§6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub source: Option<SourceRange>,
}

impl Diagnostic {
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Diagnostic { severity, title: title.into(), body: body.into(), source: None }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, body)
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, body)
    }

    pub fn with_source(mut self, source: SourceRange) -> Self {
        self.source = Some(source);
        self
    }
}

/// The recognized driver-visible options (§6.2): `Werror`, `Wfatal-errors`,
/// `fmax-errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    pub werror: bool,
    pub wfatal_errors: bool,
    /// `0` means unlimited (§6.2).
    pub fmax_errors: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig { werror: false, wfatal_errors: false, fmax_errors: 0 }
    }
}

/// Accumulates [`Diagnostic`]s against a [`CompilerConfig`], promoting
/// warnings to errors under `werror` and raising
/// [`IrError::AbortCompilation`](crate::error::IrError::AbortCompilation)
/// once the configured limits are exceeded (§6.2, §7 propagation policy).
///
/// Every push goes through `log`'s macros first (grounded on the
/// teacher's `librustc_errors::Handler`, which always traces a diagnostic
/// before deciding whether to buffer or emit it), so a driver that
/// installs `env_logger` sees every diagnostic even if the sink later
/// aborts mid-pipeline.
#[derive(Debug, Default)]
pub struct ErrorSink {
    config: CompilerConfig,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl ErrorSink {
    pub fn new(config: CompilerConfig) -> Self {
        ErrorSink { config, diagnostics: Vec::new(), error_count: 0 }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Records `diag`, promoting it to an error under `werror` first.
    /// Returns `Err(AbortCompilation)` the moment `wfatal_errors` is set
    /// and this diagnostic is an error, or once `fmax_errors` (if nonzero)
    /// is exceeded.
    pub fn push(&mut self, mut diag: Diagnostic) -> crate::error::IrResult<()> {
        if self.config.werror && diag.severity == Severity::Warning {
            diag.severity = Severity::Error;
        }
        log!(diag.severity.as_log_level(), "{}: {}", diag.title, diag.body);
        let is_error = diag.severity == Severity::Error;
        self.diagnostics.push(diag);
        if is_error {
            self.error_count += 1;
            if self.config.wfatal_errors {
                return Err(crate::error::IrError::AbortCompilation {
                    reason: "-Wfatal-errors".to_string(),
                    error_count: self.error_count,
                });
            }
            if self.config.fmax_errors != 0 && self.error_count > self.config.fmax_errors {
                return Err(crate::error::IrError::AbortCompilation {
                    reason: format!("exceeded -fmax-errors={}", self.config.fmax_errors),
                    error_count: self.error_count,
                });
            }
        }
        Ok(())
    }

    /// Exit code for this compilation (§6.3): `0` if no errors were
    /// recorded, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() { 1 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IrError;

    #[test]
    fn werror_promotes_warnings() {
        let mut sink = ErrorSink::new(CompilerConfig { werror: true, ..Default::default() });
        sink.push(Diagnostic::warning("w", "body")).unwrap();
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.exit_code(), 1);
    }

    #[test]
    fn wfatal_errors_aborts_immediately() {
        let mut sink = ErrorSink::new(CompilerConfig { wfatal_errors: true, ..Default::default() });
        let result = sink.push(Diagnostic::error("e", "body"));
        assert!(matches!(result, Err(IrError::AbortCompilation { .. })));
    }

    #[test]
    fn fmax_errors_aborts_after_limit() {
        let mut sink = ErrorSink::new(CompilerConfig { fmax_errors: 2, ..Default::default() });
        sink.push(Diagnostic::error("e1", "body")).unwrap();
        sink.push(Diagnostic::error("e2", "body")).unwrap();
        let result = sink.push(Diagnostic::error("e3", "body"));
        assert!(matches!(result, Err(IrError::AbortCompilation { error_count: 3, .. })));
    }

    #[test]
    fn plain_warnings_do_not_count_as_errors() {
        let mut sink = ErrorSink::new(CompilerConfig::default());
        sink.push(Diagnostic::warning("w", "body")).unwrap();
        assert_eq!(sink.error_count(), 0);
        assert_eq!(sink.exit_code(), 0);
    }
}
