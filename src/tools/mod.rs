//! Small utilities shared by the binary and callers: CSV I/O for fiber sets,
//! matrices and run artifacts.

pub mod io;
