// Event normalization
//
// Each raw trace source gets one adapter implementing `EventSource`. Adapters
// own every source-specific quirk (markers, field splitting, status code
// translation) so the correlator only ever sees `CallEvent`s.

mod debugger;
mod structured;

pub use debugger::DebuggerTrace;
pub use structured::StructuredLog;

use crate::config::FunctionCatalog;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::event::CallEvent;

/// A raw trace source that can be turned into an ordered event stream
pub trait EventSource {
    /// Whitelist of functions this source reports
    fn catalog(&self) -> &FunctionCatalog;

    /// Normalize the whole input, in source order
    ///
    /// Recoverable problems are pushed to `diagnostics`; a source contract
    /// violation aborts with an error.
    fn events(&self, input: &str, diagnostics: &mut Diagnostics) -> Result<Vec<CallEvent>>;
}
