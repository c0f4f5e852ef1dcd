#![no_std]

extern crate alloc;

// Capture engine for the logic-analyser probe.
//
// This crate stays portable across MCU firmware and host tooling by avoiding
// the Rust standard library; hardware is reached only through the traits in
// `program`, `ring`, and `trigger`, and the `sim` module provides host-side
// implementations of all three.

pub mod controls;
pub mod probe;
pub mod program;
pub mod ring;
pub mod rle;
pub mod sim;
pub mod trigger;
