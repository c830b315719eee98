//! Generic XML configuration tree primitives used by higher-level tools.
//!
//! * [`tree`] — the [`XmlNode`] element tree and entry/member helpers
//! * [`parser`] / [`writer`] — conversion between bytes and trees
//! * [`path`] — absolute `entry[@name='...']` xpaths resolved against a tree
//! * [`diff`] — keyed structural diff between two trees

pub mod diff;
pub mod parser;
pub mod path;
pub mod tree;
pub mod writer;

pub use diff::{diff, diff_with_options, DiffEntry, DiffOptions, KeyField};
pub use parser::{parse, parse_file, parse_fragment, ParseError};
pub use path::{Segment, XPath, XPathError};
pub use tree::{XmlNode, ENTRY_TAG, MEMBER_TAG, NAME_ATTR};
pub use writer::{write, write_compact, write_file, WriteError};
