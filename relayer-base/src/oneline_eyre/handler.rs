use std::error::Error;
use std::fmt::{Debug, Formatter};
use std::{env, fmt, iter};

use backtrace::Backtrace;
use eyre::EyreHandler;

/// Separates the lines of one error message.
const LINE_SEPARATOR: &str = " ## ";
/// Separates the causes and the backtrace from the error.
const SECTION_SEPARATOR: &str = " ##$$## ";

/// A custom context type for minimal error reporting via `eyre`
pub struct Handler {
    backtrace: Option<Backtrace>,
}

impl Handler {
    /// Handler for a new report. A backtrace is captured when
    /// `RUST_LIB_BACKTRACE` or `RUST_BACKTRACE` is set to anything but `0`.
    pub(super) fn new() -> Self {
        let capture = env::var("RUST_LIB_BACKTRACE")
            .or_else(|_| env::var("RUST_BACKTRACE"))
            .is_ok_and(|val| val != "0");
        Self {
            backtrace: capture.then(Backtrace::new),
        }
    }

    /// Format a single error on a single line
    fn fmt_error(&self, error: &(dyn Error + 'static), f: &mut Formatter<'_>) -> fmt::Result {
        let err_str = format!("{error}").replace('\n', LINE_SEPARATOR);
        write!(f, "{err_str}")
    }

    /// Format the cause of an error on a single line.
    fn fmt_cause(&self, cause: &(dyn Error + 'static), f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{SECTION_SEPARATOR}Caused by:")?;

        let errors = iter::successors(Some(cause), |e| (*e).source());
        for (n, error) in errors.enumerate() {
            write!(f, "{LINE_SEPARATOR}({n}) ")?;
            self.fmt_error(error, f)?;
        }
        Ok(())
    }

    /// Format a backtrace onto a single line, one frame per symbol. Paths
    /// are shown relative to the working directory.
    fn fmt_backtrace(&self, backtrace: &Backtrace, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{SECTION_SEPARATOR}Stack backtrace:")?;

        let cwd = env::current_dir().ok();
        let symbols = backtrace
            .frames()
            .iter()
            .flat_map(|frame| frame.symbols());
        for (n, symbol) in symbols.enumerate() {
            write!(f, "{LINE_SEPARATOR}{n:>3}: ")?;
            match symbol.name() {
                Some(name) => write!(f, "{name:#}")?,
                None => write!(f, "<unknown>")?,
            }
            if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                let file = cwd
                    .as_ref()
                    .and_then(|cwd| file.strip_prefix(cwd).ok())
                    .unwrap_or(file);
                write!(f, " at {}:{line}", file.display())?;
            }
        }
        Ok(())
    }
}

impl EyreHandler for Handler {
    fn debug(&self, error: &(dyn Error + 'static), f: &mut Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return Debug::fmt(error, f);
        }

        self.fmt_error(error, f)?;

        if let Some(cause) = error.source() {
            self.fmt_cause(cause, f)?;
        }
        if let Some(backtrace) = &self.backtrace {
            self.fmt_backtrace(backtrace, f)?;
        }
        Ok(())
    }

    fn display(&self, error: &(dyn Error + 'static), f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", error)?;

        if f.alternate() {
            let errors = iter::successors(error.source(), |e| (*e).source());
            for error in errors {
                write!(f, "{LINE_SEPARATOR}{error}")?;
            }
        }

        Ok(())
    }
}
