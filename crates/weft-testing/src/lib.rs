//! Testing utilities and harness for the weft reconciler

pub mod testing;

// Re-export testing utilities
pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use weft_core::{
        Child, Component, Context, Element, ElementRef, HostOp, Lanes, PropValue, RefObject,
        Teardown,
    };
}
