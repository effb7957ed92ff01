//! Pure logic of the grading engine.
//!
//! Nothing here touches the filesystem or the workspace context: the language
//! front end, the splitter, the assertion collector, score normalization and
//! diff comparison all operate on in-memory data.

pub mod ast;
pub mod collector;
pub mod diff;
pub mod lexer;
pub mod parser;
pub mod score;
pub mod splitter;
pub mod value;
