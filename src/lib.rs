//! jush: a small command shell where every pipeline is a first-class
//! job with an id, an asynchronous status lifecycle, optional output
//! capture, and cancellation. Statements may also be stored under
//! line numbers and run as a program.

pub mod error;
pub mod eval;
pub mod interp;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod store;
