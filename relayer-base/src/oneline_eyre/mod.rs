//! An `eyre` report handler that prints every error, its causes and an
//! optional backtrace on a single line, so log collectors keep a report in
//! one record.

use handler::Handler;

mod handler;

/// Install the one line handler as the global report hook.
pub fn install() -> eyre::Result<()> {
    eyre::set_hook(Box::new(|_| Box::new(Handler::new())))?;
    Ok(())
}
