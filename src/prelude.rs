/*!
Crate-wide imports for snafu-based error handling.
*/

pub use snafu::{ensure, OptionExt, ResultExt, Snafu};
