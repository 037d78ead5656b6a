mod diagnostics;
pub mod mock;
mod wifi;
