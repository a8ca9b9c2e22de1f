//! Utility functions for the atrium framework.
//!
//! - [`text`]: case conversion and pluralisation used for table naming.

pub mod text;
