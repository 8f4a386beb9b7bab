//! Some string type helpers.
//!
//! Moved into a separate module, so we could experiment with different representations.

/// `Str` is a string that can be cloned cheaply. Flag keys, view names, and ids get cloned into
/// every event they appear on, so the cheap clone matters on hot paths.
pub type Str = faststr::FastStr;
