//! scriptq-introspect: discover a script's command-line parameters without
//! running it.
//!
//! The source text is parsed as Python, then tokenized and scanned for
//! argument-declaration calls
//! (`parser.add_argument("--count", type=int, default=10)`). Each call with a
//! literal flag becomes a [`ParameterSpec`](scriptq_core::ParameterSpec).
//! Results are computed fresh on every call; nothing is cached, so edits to
//! a script are picked up immediately.
//!
//! ```rust,no_run
//! use scriptq_introspect::inspect;
//!
//! let found = inspect(std::path::Path::new("scripts/reconstruct.py"));
//! for p in &found.parameters {
//!     println!("{} [{}] {}", p.flag, p.param_type, p.help);
//! }
//! ```

pub mod error;
pub mod extract;
pub mod lexer;
pub mod scripts;

pub use error::{IntrospectError, Result};
pub use extract::{extract, try_extract, Introspection, DECLARE_METHOD};
pub use scripts::{inspect, list_scripts, try_inspect};
