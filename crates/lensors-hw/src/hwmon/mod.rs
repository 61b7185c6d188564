//! Kernel hwmon backend.
//!
//! Reads `*_input` files under `/sys/class/hwmon/hwmonN`, one device per
//! directory, labelled by the adjacent `*_label` files.

mod source;

pub use source::{HwmonLink, HwmonSource};
